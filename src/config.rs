use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::TbError;

// Read once per process, every run on every thread sees the same values.
static ENV_SEED: Lazy<Option<u64>> = Lazy::new(|| {
    std::env::var("STREAMTB_SEED")
        .ok()
        .and_then(|s| s.trim().parse().ok())
});
static ENV_JUNIT: Lazy<Option<PathBuf>> =
    Lazy::new(|| std::env::var_os("STREAMTB_JUNIT").map(PathBuf::from));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDecl {
    pub name: String,
    pub width: u32,
}

/// Configuration of one simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Name of the top level hierarchy object.
    pub top: String,
    /// Name of the test suite in reports.
    pub suite: String,
    /// Simulation time precision as power of ten (-12 = 1ps).
    pub precision: i8,
    pub seed: u64,
    /// Delta cycles allowed within one time step before giving up.
    pub max_delta_cycles: u32,
    pub junit_path: Option<PathBuf>,
    pub print_summary: bool,
    /// Signal surface of the design under test.
    pub signals: Vec<SignalDecl>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            top: "dut".to_string(),
            suite: "streamtb".to_string(),
            precision: -12,
            seed: 0,
            max_delta_cycles: 1000,
            junit_path: None,
            print_summary: true,
            signals: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with `STREAMTB_SEED` and `STREAMTB_JUNIT` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(seed) = *ENV_SEED {
            config.seed = seed;
        }
        config.junit_path = ENV_JUNIT.clone();
        config
    }

    pub fn top(mut self, top: &str) -> Self {
        self.top = top.to_string();
        self
    }
    pub fn suite(mut self, suite: &str) -> Self {
        self.suite = suite.to_string();
        self
    }
    pub fn precision(mut self, precision: i8) -> Self {
        self.precision = precision;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    pub fn max_delta_cycles(mut self, n: u32) -> Self {
        self.max_delta_cycles = n;
        self
    }
    pub fn junit(mut self, path: impl Into<PathBuf>) -> Self {
        self.junit_path = Some(path.into());
        self
    }
    pub fn print_summary(mut self, print: bool) -> Self {
        self.print_summary = print;
        self
    }

    pub fn signal(mut self, name: &str, width: u32) -> Self {
        self.signals.push(SignalDecl {
            name: name.to_string(),
            width,
        });
        self
    }

    /// Declare `<prefix>_valid`, `<prefix>_ready` and one `<prefix>_payload_<field>`
    /// per field.
    pub fn stream(mut self, prefix: &str, fields: &[(&str, u32)]) -> Self {
        self = self
            .signal(&format!("{}_valid", prefix), 1)
            .signal(&format!("{}_ready", prefix), 1);
        for (field, width) in fields {
            self = self.signal(&format!("{}_payload_{}", prefix, field), *width);
        }
        self
    }

    pub fn validate(&self) -> Result<(), TbError> {
        if self.top.is_empty() || self.top.contains('.') {
            return Err(TbError::Config(format!("invalid top name '{}'", self.top)));
        }
        if !(-15..=2).contains(&self.precision) {
            return Err(TbError::Config(format!(
                "precision 1e{} out of range",
                self.precision
            )));
        }
        if self.max_delta_cycles == 0 {
            return Err(TbError::Config("max_delta_cycles must be > 0".to_string()));
        }
        let mut names = HashSet::new();
        for s in &self.signals {
            if !(1..=64).contains(&s.width) {
                return Err(TbError::Config(format!(
                    "signal {} has unsupported width {}",
                    s.name, s.width
                )));
            }
            if !names.insert(s.name.as_str()) {
                return Err(TbError::Config(format!("signal {} declared twice", s.name)));
            }
        }
        Ok(())
    }
}
