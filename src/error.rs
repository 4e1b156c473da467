use std::fmt;

use crate::phase::Phase;

/// Everything that can make a testbench run fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TbError {
    /// An observed transaction differs from the reference it was matched to.
    Mismatch {
        scoreboard: String,
        index: u64,
        detail: String,
    },
    /// An observed transaction arrived while no reference was pending.
    OrderingViolation {
        scoreboard: String,
        index: u64,
        observed: String,
    },
    /// Payload or valid changed while valid was high and ready low.
    StabilityViolation { stream: String, detail: String },
    /// The watchdog expired before the run could finish.
    Timeout { phase: Phase, sim_time_ns: f64 },
    /// The run finished with references or observations left unmatched.
    Incomplete {
        scoreboard: String,
        refs_left: usize,
        uuts_left: usize,
    },
    /// No event was left to simulate but the test never completed.
    Stalled { sim_time_ns: f64 },
    Assertion { name: String, message: String },
    Signal(String),
    Sim(String),
    Config(String),
    Report(String),
    Cancelled,
    Failed(String),
}

impl TbError {
    /// True for failures that mean the run never reached a verdict.
    pub fn is_hung(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Stalled { .. })
    }
}

impl fmt::Display for TbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Mismatch {
                scoreboard,
                index,
                detail,
            } => write!(
                f,
                "mismatch in {} at transaction #{}: {}",
                scoreboard, index, detail
            ),
            Self::OrderingViolation {
                scoreboard,
                index,
                observed,
            } => write!(
                f,
                "ordering violation in {}: observed transaction #{} {} has no pending reference",
                scoreboard, index, observed
            ),
            Self::StabilityViolation { stream, detail } => {
                write!(f, "stability violation on {}: {}", stream, detail)
            }
            Self::Timeout { phase, sim_time_ns } => write!(
                f,
                "incomplete/hung: watchdog expired at {}ns during phase {:?}",
                sim_time_ns, phase
            ),
            Self::Incomplete {
                scoreboard,
                refs_left,
                uuts_left,
            } => write!(
                f,
                "incomplete: {} finished with {} unmatched references and {} unmatched observations",
                scoreboard, refs_left, uuts_left
            ),
            Self::Stalled { sim_time_ns } => write!(
                f,
                "incomplete/hung: simulation ran out of events at {}ns",
                sim_time_ns
            ),
            Self::Assertion { name, message } => {
                write!(f, "assertion {} failed: {}", name, message)
            }
            Self::Signal(msg) => write!(f, "signal error: {}", msg),
            Self::Sim(msg) => write!(f, "simulator error: {}", msg),
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Report(msg) => write!(f, "report error: {}", msg),
            Self::Cancelled => write!(f, "task was cancelled"),
            Self::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TbError {}

impl From<&str> for TbError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

impl From<String> for TbError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}
