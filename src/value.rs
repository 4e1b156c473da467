use std::fmt;

/// Value carried by a successful task or test result.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i64),
    String(String),
    None,
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Val::Int(i) => write!(f, "{}", i),
            Val::String(s) => write!(f, "{}", s),
            Val::None => write!(f, "-"),
        }
    }
}
