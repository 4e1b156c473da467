use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::Rc;

use crate::phase::{Agent, Phase};
use crate::signal::SimObject;
use crate::sim_if::SIM_IF;
use crate::tb_obj::TbObj;
use crate::transaction::Transaction;
use crate::value::Val;
use crate::{TbError, TbResult};

type Compare<T> = Box<dyn Fn(&T, &T) -> Option<String>>;

/// Matches observed items against reference items, strictly in order.
pub struct Scoreboard<T>(TbObj<ScoreboardInner<T>>);

impl<T> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Scoreboard(self.0.clone())
    }
}

struct ScoreboardInner<T> {
    name: String,
    refs: VecDeque<T>,
    refs_counter: u64,
    uuts_counter: u64,
    matched: u64,
    mismatches: u64,
    unexpected: u64,
    failures: Vec<TbError>,
    fatal_mismatch: bool,
    // (observed, reference) -> difference
    compare: Compare<T>,
}

/// Snapshot of a scoreboard for reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardStats {
    pub name: String,
    pub refs: u64,
    pub uuts: u64,
    pub matched: u64,
    pub mismatches: u64,
    pub refs_left: usize,
    pub first_failure: Option<TbError>,
}

impl<T: PartialEq + Debug + 'static> Scoreboard<T> {
    pub fn new(name: &str) -> Self {
        Self::with_predicate(name, |observed: &T, reference: &T| {
            (observed != reference)
                .then(|| format!("expected {:?}, got {:?}", reference, observed))
        })
    }
}

impl Scoreboard<Transaction> {
    /// Compares only the fields present in the reference.
    pub fn in_order(name: &str) -> Self {
        Self::with_predicate(name, |observed: &Transaction, reference: &Transaction| {
            observed
                .diff_ref(reference)
                .map(|d| format!("{} (expected {}, got {})", d, reference, observed))
        })
    }
}

impl<T: Debug + 'static> Scoreboard<T> {
    /// `compare(observed, reference)` returns a description of the difference.
    pub fn with_predicate(
        name: &str,
        compare: impl Fn(&T, &T) -> Option<String> + 'static,
    ) -> Self {
        Scoreboard(TbObj::new(ScoreboardInner {
            name: name.to_string(),
            refs: VecDeque::new(),
            refs_counter: 0,
            uuts_counter: 0,
            matched: 0,
            mismatches: 0,
            unexpected: 0,
            failures: Vec::new(),
            fatal_mismatch: false,
            compare: Box::new(compare),
        }))
    }

    /// Fail the running test on the first mismatch instead of at the end.
    pub fn fatal_mismatch(self, fatal: bool) -> Self {
        self.0.with_mut(|s| s.fatal_mismatch = fatal);
        self
    }

    pub fn name(&self) -> String {
        self.0.get().name.clone()
    }

    pub fn push_reference(&self, reference: T) {
        self.0.with_mut(|s| {
            s.refs.push_back(reference);
            s.refs_counter += 1;
        });
    }

    pub fn push_observed(&self, observed: T) {
        let fatal = self.0.with_mut(|s| {
            let index = s.uuts_counter;
            s.uuts_counter += 1;
            let (err, fatal) = match s.refs.pop_front() {
                Some(reference) => match (s.compare)(&observed, &reference) {
                    None => {
                        s.matched += 1;
                        return None;
                    }
                    Some(detail) => {
                        s.mismatches += 1;
                        let err = TbError::Mismatch {
                            scoreboard: s.name.clone(),
                            index,
                            detail,
                        };
                        (err, s.fatal_mismatch)
                    }
                },
                None => {
                    s.unexpected += 1;
                    let err = TbError::OrderingViolation {
                        scoreboard: s.name.clone(),
                        index,
                        observed: format!("{:?}", observed),
                    };
                    (err, true)
                }
            };
            SIM_IF.log(&err.to_string());
            s.failures.push(err.clone());
            fatal.then_some(err)
        });
        // outside of the borrow, failing tears down tasks holding this scoreboard
        if let Some(err) = fatal {
            crate::fail_test(err);
        }
    }

    /// Callback feeding observed items, for use with a monitor.
    pub fn observer(&self) -> impl FnMut(T) + 'static {
        let sb = self.clone();
        move |observed| sb.push_observed(observed)
    }

    pub fn is_drained(&self) -> bool {
        let s = self.0.get();
        s.refs_counter == s.uuts_counter
    }

    pub fn refs_counter(&self) -> u64 {
        self.0.get().refs_counter
    }

    pub fn uuts_counter(&self) -> u64 {
        self.0.get().uuts_counter
    }

    pub fn mismatches(&self) -> u64 {
        self.0.get().mismatches
    }

    pub fn failures(&self) -> Vec<TbError> {
        self.0.get().failures.clone()
    }

    pub fn passed(&self) -> bool {
        let s = self.0.get();
        s.failures.is_empty() && s.refs.is_empty() && s.refs_counter == s.uuts_counter
    }

    /// First recorded failure, or an incomplete run if items are left over.
    pub fn verdict(&self) -> Result<(), TbError> {
        let s = self.0.get();
        if let Some(err) = s.failures.first() {
            return Err(err.clone());
        }
        if !s.refs.is_empty() || s.refs_counter != s.uuts_counter {
            return Err(TbError::Incomplete {
                scoreboard: s.name.clone(),
                refs_left: s.refs.len(),
                uuts_left: s.unexpected as usize,
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> ScoreboardStats {
        let s = self.0.get();
        ScoreboardStats {
            name: s.name.clone(),
            refs: s.refs_counter,
            uuts: s.uuts_counter,
            matched: s.matched,
            mismatches: s.mismatches,
            refs_left: s.refs.len(),
            first_failure: s.failures.first().cloned(),
        }
    }

    pub async fn wait_drained(&self, clk: SimObject) -> TbResult {
        while !self.is_drained() {
            clk.rising_edge().await;
        }
        Ok(Val::None)
    }

    /// Shared handle for the phase tree.
    pub fn agent(&self) -> Rc<Self> {
        Rc::new(self.clone())
    }
}

impl<T: Debug + 'static> Agent for Scoreboard<T> {
    fn name(&self) -> String {
        Scoreboard::name(self)
    }
    // enough simulation once everything expected was seen
    fn can_phase_progress(&self, phase: Phase) -> bool {
        match phase {
            Phase::Sim | Phase::Drain => self.is_drained(),
            Phase::Setup | Phase::Done => true,
        }
    }
    fn start_phase(&self, phase: Phase) {
        if phase != Phase::Done {
            return;
        }
        if let Err(err @ TbError::Incomplete { .. }) = self.verdict() {
            SIM_IF.log(&err.to_string());
        }
    }
    fn activity(&self) -> u64 {
        self.uuts_counter()
    }
    fn verdict(&self) -> Result<(), TbError> {
        Scoreboard::verdict(self)
    }
    fn scoreboards(&self) -> Vec<ScoreboardStats> {
        vec![self.stats()]
    }
}
