use std::fmt;

/// One unit of data passed over a stream, an ordered bag of named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    fields: Vec<(String, u64)>,
    next_delay: Option<u32>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: u64) -> Self {
        self.set(field, value);
        self
    }

    /// Hold the transaction back for `cycles` idle clock cycles before driving it.
    pub fn with_next_delay(mut self, cycles: u32) -> Self {
        self.next_delay = Some(cycles);
        self
    }

    pub fn set(&mut self, field: &str, value: u64) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, v)) => *v = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| *v)
    }

    /// The burst end flag, false if the transaction has no `last` field.
    pub fn last(&self) -> bool {
        self.get("last").map_or(false, |v| v != 0)
    }

    pub fn next_delay(&self) -> Option<u32> {
        self.next_delay
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, u64)> {
        self.fields.iter().map(|(name, v)| (name.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compare `self` as observed against `reference`. Only the reference's
    /// fields are checked. Returns a description of the first difference.
    pub fn diff_ref(&self, reference: &Transaction) -> Option<String> {
        for (field, expected) in reference.fields() {
            match self.get(field) {
                Some(v) if v == expected => {}
                Some(v) => {
                    return Some(format!(
                        "field {}: expected 0x{:x}, got 0x{:x}",
                        field, expected, v
                    ))
                }
                None => return Some(format!("field {} missing", field)),
            }
        }
        None
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: 0x{:x}", name, v)?;
        }
        write!(f, "}}")
    }
}

impl<const N: usize> From<[(&str, u64); N]> for Transaction {
    fn from(fields: [(&str, u64); N]) -> Self {
        fields
            .iter()
            .fold(Transaction::new(), |t, (name, v)| t.with(name, *v))
    }
}
