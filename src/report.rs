use prettytable::{Cell, Row, Table};

use crate::scoreboard::ScoreboardStats;
use crate::TbResult;

/// Outcome of a single test.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub name: String,
    pub result: TbResult,
    pub real_secs: f64,
    pub sim_time_ns: f64,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of a whole simulation run.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub suite: String,
    pub seed: u64,
    pub tests: Vec<TestReport>,
    pub sim_time_ns: f64,
    pub real_secs: f64,
}

impl SimReport {
    /// True if there was at least one test and all of them passed.
    pub fn passed(&self) -> bool {
        !self.tests.is_empty() && self.tests.iter().all(|t| t.passed())
    }

    /// Process exit status, 0 on pass.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> Vec<&TestReport> {
        self.tests.iter().filter(|t| !t.passed()).collect()
    }

    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(
            ["TEST", "RESULT", "SIM TIME (ns)", "REAL TIME (s)", "SPEED (ns/s)", "DETAIL"]
                .iter()
                .map(|t| Cell::new(t))
                .collect(),
        ));
        for t in &self.tests {
            let (result, detail) = match &t.result {
                Ok(val) => ("PASS", val.to_string()),
                Err(e) => ("FAIL", e.to_string()),
            };
            table.add_row(Row::new(vec![
                Cell::new(&t.name),
                Cell::new(result),
                Cell::new(&format!("{:.3}", t.sim_time_ns)),
                Cell::new(&format!("{:.3}", t.real_secs)),
                Cell::new(&format!("{:.3}", speed(t.sim_time_ns, t.real_secs))),
                Cell::new(&detail),
            ]));
        }
        table.add_row(Row::new(vec![
            Cell::new("TOTAL"),
            Cell::new(if self.passed() { "PASS" } else { "FAIL" }),
            Cell::new(&format!("{:.3}", self.sim_time_ns)),
            Cell::new(&format!("{:.3}", self.real_secs)),
            Cell::new(&format!("{:.3}", speed(self.sim_time_ns, self.real_secs))),
            Cell::new(&format!("seed {}", self.seed)),
        ]));
        table
    }
}

fn speed(sim_time_ns: f64, real_secs: f64) -> f64 {
    if real_secs > 0.0 {
        sim_time_ns / real_secs
    } else {
        0.0
    }
}

/// Per-scoreboard counters and first failure.
pub fn scoreboard_table(stats: &[ScoreboardStats]) -> Table {
    let mut table = Table::new();
    table.set_titles(Row::new(
        ["SCOREBOARD", "REFS", "UUTS", "MATCHED", "MISMATCHES", "FIRST FAILURE"]
            .iter()
            .map(|t| Cell::new(t))
            .collect(),
    ));
    for s in stats {
        let first = match &s.first_failure {
            Some(e) => e.to_string(),
            None if s.refs_left > 0 || s.refs != s.uuts => "incomplete".to_string(),
            None => "-".to_string(),
        };
        table.add_row(Row::new(vec![
            Cell::new(&s.name),
            Cell::new(&s.refs.to_string()),
            Cell::new(&s.uuts.to_string()),
            Cell::new(&s.matched.to_string()),
            Cell::new(&s.mismatches.to_string()),
            Cell::new(&first),
        ]));
    }
    table
}
