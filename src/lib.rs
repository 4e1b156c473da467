//! Testbench harness for valid/ready stream protocols: drivers, monitors,
//! in-order scoreboards and a phase manager on top of a cooperative executor
//! and an in-process event-driven simulator.

mod assertion;
pub mod config;
mod error;
mod executor;
mod junit;
pub mod phase;
pub mod prelude;
pub mod report;
pub mod scoreboard;
mod signal;
pub mod sim;
pub mod sim_if;
pub mod source;
pub mod stream;
mod tb_obj;
mod test;
pub mod testbench;
pub mod transaction;
mod trigger;
pub mod utils;
mod value;

pub use assertion::{
    print_assertion_stats, run_all_assertions, run_assertion, stream_stability, Assertion,
    AssertionHandle,
};
pub use config::SimConfig;
pub use error::TbError;
pub use executor::{JoinHandle, Task};
pub use phase::{Agent, Infrastructure, Phase, PhaseHandle, PhaseManager, SignalCondition};
pub use report::{SimReport, TestReport};
pub use scoreboard::{Scoreboard, ScoreboardStats};
pub use signal::{ObjectKind, SimObject};
pub use sim_if::SimTime;
pub use source::{Next, QueueSource, TransactionSource};
pub use stream::{ReadyPolicy, Stream, StreamDriverMaster, StreamDriverSlave, StreamMonitor};
pub use tb_obj::TbObj;
pub use test::{Test, Tests};
pub use transaction::Transaction;
pub use trigger::{EdgeKind, Trigger};
pub use value::Val;

use sim_if::SIM_IF;
use std::cell::RefCell;
use std::time;

pub type TbResult = Result<Val, TbError>;

struct CurrentTest {
    task: Task,
    result: TbObj<Option<TbResult>>,
}

thread_local! {
    static CURRENT_TEST: RefCell<Option<CurrentTest>> = RefCell::new(None);
}

/// Passes the running test, unless it already ended.
pub fn pass_test(msg: &str) {
    finish_test(Ok(Val::String(msg.to_string())));
}

/// Fails the running test, unless it already ended.
pub fn fail_test(err: impl Into<TbError>) {
    finish_test(Err(err.into()));
}

pub fn test_running() -> bool {
    CURRENT_TEST.with(|c| c.borrow().is_some())
}

fn finish_test(result: TbResult) {
    if let Some(current) = CURRENT_TEST.with(|c| c.borrow_mut().take()) {
        current.result.with_mut(|r| {
            r.get_or_insert(result);
        });
        tear_down_test(current.task);
    }
}

fn tear_down_test(test: Task) {
    assertion::tear_down_assertions();
    trigger::cancel_all_triggers();
    test.cancel();
    executor::clear_all_tasks();
}

// Leftovers of a test that ended while one of its tasks was still running.
fn clean_slate() {
    trigger::cancel_all_triggers();
    executor::clear_all_tasks();
    sim::clear_callbacks();
    sim::reset_signal_values();
}

fn run_test(test: test::Test, dut: SimObject) -> TestReport {
    clean_slate();
    let time_start = time::Instant::now();
    let sim_time_start = SIM_IF.get_sim_time("ns");
    SIM_IF.log(&format!("TEST {} started", test.name));

    let result = TbObj::new(None);
    let fut = (test.generator)(dut);
    let handle = Task::spawn_from_future(
        async move {
            match fut.await {
                Ok(val) => finish_test(Ok(val)),
                Err(e) => fail_test(e),
            }
            Ok(Val::None)
        },
        &test.name,
    );
    if let Some(task) = handle.get_task() {
        let current = CurrentTest {
            task: *task,
            result: result.clone(),
        };
        CURRENT_TEST.with(|c| c.borrow_mut().replace(current));
    }

    match sim::run_sim() {
        Err(e) => fail_test(e),
        Ok(()) if test_running() => {
            let mut waiting = executor::task_names();
            waiting.sort();
            SIM_IF.log(&format!(
                "no events left, {} tasks still waiting: {}",
                waiting.len(),
                waiting.join(", ")
            ));
            fail_test(TbError::Stalled {
                sim_time_ns: SIM_IF.get_sim_time("ns"),
            });
        }
        Ok(()) => {}
    }

    let result = result
        .get_mut()
        .take()
        .unwrap_or_else(|| Err(TbError::Failed("test ended without result".to_string())));
    let report = TestReport {
        name: test.name,
        result,
        real_secs: time_start.elapsed().as_secs_f64(),
        sim_time_ns: SIM_IF.get_sim_time("ns") - sim_time_start,
    };
    match &report.result {
        Ok(val) => SIM_IF.log(&format!("TEST {} passed: {}", report.name, val)),
        Err(e) => SIM_IF.log(&format!("TEST {} failed: {}", report.name, e)),
    }
    report
}

/// Run all tests one after another in a fresh simulation on this thread.
pub fn run(config: &SimConfig, tests: Tests) -> SimReport {
    let sim_start = time::Instant::now();
    let mut reports = Vec::with_capacity(tests.len());

    let dut = sim::init(config).and_then(|_| SimObject::get_root());
    utils::seed(config.seed);
    match dut {
        Ok(dut) => {
            for test in tests {
                reports.push(run_test(test, dut));
            }
        }
        Err(e) => {
            SIM_IF.log(&format!("can't set up simulation: {}", e));
            for test in tests {
                reports.push(TestReport {
                    name: test.name,
                    result: Err(e.clone()),
                    real_secs: 0.0,
                    sim_time_ns: 0.0,
                });
            }
        }
    }
    clean_slate();

    let report = SimReport {
        suite: config.suite.clone(),
        seed: config.seed,
        tests: reports,
        sim_time_ns: SIM_IF.get_sim_time("ns"),
        real_secs: sim_start.elapsed().as_secs_f64(),
    };
    if config.print_summary {
        for line in report.table().to_string().lines() {
            SIM_IF.log(line);
        }
        assertion::print_assertion_stats();
    }
    if let Some(path) = &config.junit_path {
        if let Err(e) = junit::write_junit_xml(&report, path) {
            SIM_IF.log(&e.to_string());
        }
    }
    report
}

/// `run_tests!(config, test_a, test_b)` runs the listed async test functions.
#[macro_export]
macro_rules! run_tests {
    ($config:expr, $($test:path),+ $(,)?) => {{
        let tests = $crate::Tests::new()$(.add(stringify!($test), $test))+;
        $crate::run(&$config, tests)
    }};
}

#[inline]
#[cold]
fn cold() {}

#[inline]
fn unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}
