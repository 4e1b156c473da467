use std::cell::RefCell;

use crate::prelude::*;
use crate::stream::Stream;
use crate::tb_obj::TbObj;
use crate::transaction::Transaction;

type Check = Box<dyn FnMut() -> Result<(), TbError>>;

thread_local! {
    static ASSERTIONS: RefCell<Vec<TbObj<Assertion>>> = RefCell::new(Vec::new());
    // stats of assertions from tests that already ended
    static FINISHED: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// A check evaluated on every rising edge of a clock.
pub struct Assertion {
    name: String,
    clk: SimObject,
    enabled: bool,
    fatal: bool,
    running: bool,
    check: Check,
    triggered: u64,
    passed: u64,
    failed: u64,
}

#[derive(Clone)]
pub struct AssertionHandle(TbObj<Assertion>);

impl Assertion {
    /// Register a named assertion for the current test.
    pub fn add(
        name: &str,
        clk: SimObject,
        check: impl FnMut() -> Result<(), TbError> + 'static,
    ) -> Result<AssertionHandle, TbError> {
        let exists = ASSERTIONS.with(|a| a.borrow().iter().any(|x| x.get().name == name));
        if exists {
            return Err(TbError::Config(format!(
                "assertion {} registered twice",
                name
            )));
        }
        let assertion = TbObj::new(Assertion {
            name: name.to_string(),
            clk,
            enabled: true,
            fatal: true,
            running: false,
            check: Box::new(check),
            triggered: 0,
            passed: 0,
            failed: 0,
        });
        ASSERTIONS.with(|a| a.borrow_mut().push(assertion.clone()));
        Ok(AssertionHandle(assertion))
    }

    pub fn result_str(&self) -> String {
        format!(
            "Assertion {}: Triggered: {}, Passed: {}, Failed: {}.",
            self.name, self.triggered, self.passed, self.failed
        )
    }
}

impl AssertionHandle {
    /// A fatal assertion fails the test on its first failure (default).
    pub fn fatal(self, fatal: bool) -> Self {
        self.0.with_mut(|a| a.fatal = fatal);
        self
    }
    pub fn enable(&self, enabled: bool) {
        self.0.with_mut(|a| a.enabled = enabled);
    }
    pub fn triggered(&self) -> u64 {
        self.0.get().triggered
    }
    pub fn passed(&self) -> u64 {
        self.0.get().passed
    }
    pub fn failed(&self) -> u64 {
        self.0.get().failed
    }
    pub fn run(&self) {
        start(self.0.clone());
    }
}

fn start(assertion: TbObj<Assertion>) {
    let already = assertion.with_mut(|a| std::mem::replace(&mut a.running, true));
    if !already {
        let name = assertion.get().name.clone();
        Task::spawn_from_future(run(assertion), &name);
    }
}

async fn run(assertion: TbObj<Assertion>) -> TbResult {
    let clk = assertion.get().clk;
    loop {
        clk.rising_edge().await;
        let outcome = assertion.with_mut(|a| {
            if !a.enabled {
                return None;
            }
            a.triggered += 1;
            let result = (a.check)();
            match result {
                Ok(()) => {
                    a.passed += 1;
                    None
                }
                Err(e) => {
                    a.failed += 1;
                    Some((e, a.fatal, a.name.clone()))
                }
            }
        });
        if let Some((err, fatal, name)) = outcome {
            SIM_IF.log(&format!("Assertion {} failed: {}", name, err));
            if fatal {
                fail_test(err.clone());
                return Err(err);
            }
        }
    }
}

pub fn run_all_assertions() {
    let all = ASSERTIONS.with(|a| a.borrow().clone());
    for assertion in all {
        start(assertion);
    }
}

pub fn run_assertion(name: &str) -> Result<(), TbError> {
    let found = ASSERTIONS.with(|a| a.borrow().iter().find(|x| x.get().name == name).cloned());
    match found {
        Some(assertion) => {
            start(assertion);
            Ok(())
        }
        None => Err(TbError::Config(format!(
            "Can't run assertion {}. Assertion not registered!",
            name
        ))),
    }
}

pub(crate) fn tear_down_assertions() {
    let ended = ASSERTIONS.with(|a| std::mem::take(&mut *a.borrow_mut()));
    FINISHED.with(|f| {
        f.borrow_mut()
            .extend(ended.iter().map(|a| a.get().result_str()))
    });
}

pub fn print_assertion_stats() {
    let lines: Vec<String> = FINISHED
        .with(|f| f.borrow().clone())
        .into_iter()
        .chain(ASSERTIONS.with(|a| {
            a.borrow()
                .iter()
                .map(|x| x.get().result_str())
                .collect::<Vec<_>>()
        }))
        .collect();
    for line in lines {
        SIM_IF.log(&line);
    }
}

/// While valid is high and ready low, valid must stay high and the payload
/// must not change until the handshake completes.
pub fn stream_stability(
    stream: &Stream,
    clk: SimObject,
    reset: Option<SimObject>,
) -> Result<AssertionHandle, TbError> {
    let stream = stream.clone();
    let mut held: Option<Transaction> = None;
    let name = format!("{}_stability", stream.name());
    Assertion::add(&name, clk, move || {
        if reset.map_or(false, |r| r.is_high()) {
            held = None;
            return Ok(());
        }
        let valid = stream.valid().is_high();
        let now = stream.sample();
        let result = match &held {
            Some(prev) if !valid => Err(format!("valid dropped while {} was pending", prev)),
            Some(prev) if *prev != now => {
                Err(format!("payload changed from {} to {} while stalled", prev, now))
            }
            _ => Ok(()),
        };
        held = (valid && !stream.ready().is_high()).then_some(now);
        result.map_err(|detail| TbError::StabilityViolation {
            stream: stream.name().to_string(),
            detail,
        })
    })
}
