use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::executor::Task;
use crate::report;
use crate::scoreboard::ScoreboardStats;
use crate::signal::SimObject;
use crate::sim_if::{SimTime, SIM_IF};
use crate::testbench::simulation_timeout;
use crate::value::Val;
use crate::{TbError, TbResult};

/// Lifecycle state of a test run. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Setup,
    Sim,
    Drain,
    Done,
}

impl Phase {
    fn next(self) -> Phase {
        match self {
            Phase::Setup => Phase::Sim,
            Phase::Sim => Phase::Drain,
            Phase::Drain | Phase::Done => Phase::Done,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Setup => "SETUP",
            Phase::Sim => "SIM",
            Phase::Drain => "DRAIN",
            Phase::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

/// Shared view of the current phase.
#[derive(Clone, Debug)]
pub struct PhaseHandle(Rc<Cell<Phase>>);

impl Default for PhaseHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseHandle {
    pub fn new() -> Self {
        PhaseHandle(Rc::new(Cell::new(Phase::Setup)))
    }

    pub fn get(&self) -> Phase {
        self.0.get()
    }

    pub fn is(&self, phase: Phase) -> bool {
        self.get() == phase
    }

    pub fn advance(&self, next: Phase) -> Result<(), TbError> {
        let current = self.get();
        if next <= current {
            return Err(TbError::Config(format!(
                "phase can't go from {} to {}",
                current, next
            )));
        }
        self.0.set(next);
        Ok(())
    }

    /// Jump to DONE from wherever the run is. Returns the phase that was left.
    pub fn force_done(&self) -> Phase {
        self.0.replace(Phase::Done)
    }
}

/// A participant of the phase tree.
///
/// Default implementations forward to `children()`, leaves only override what
/// they care about.
pub trait Agent {
    fn name(&self) -> String;

    fn children(&self) -> Vec<Rc<dyn Agent>> {
        Vec::new()
    }

    fn start_phase(&self, phase: Phase) {
        for child in self.children() {
            child.start_phase(phase);
        }
    }

    fn end_phase(&self, phase: Phase) {
        for child in self.children() {
            child.end_phase(phase);
        }
    }

    fn can_phase_progress(&self, phase: Phase) -> bool {
        self.children().iter().all(|c| c.can_phase_progress(phase))
    }

    /// Monotonic counter of observed traffic, used to detect a quiet drain.
    fn activity(&self) -> u64 {
        self.children().iter().map(|c| c.activity()).sum()
    }

    fn verdict(&self) -> Result<(), TbError> {
        for child in self.children() {
            child.verdict()?;
        }
        Ok(())
    }

    fn scoreboards(&self) -> Vec<ScoreboardStats> {
        self.children()
            .iter()
            .flat_map(|c| c.scoreboards())
            .collect()
    }
}

/// Named node of the agent tree.
pub struct Infrastructure {
    name: String,
    phase: PhaseHandle,
    children: RefCell<Vec<Rc<dyn Agent>>>,
}

impl Infrastructure {
    pub fn new(name: &str, phase: PhaseHandle) -> Rc<Self> {
        Rc::new(Infrastructure {
            name: name.to_string(),
            phase,
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn phase(&self) -> PhaseHandle {
        self.phase.clone()
    }

    pub fn add<A: Agent + 'static>(&self, agent: Rc<A>) -> Rc<A> {
        self.children.borrow_mut().push(agent.clone());
        agent
    }

    /// New child node sharing this node's phase.
    pub fn agent(&self, name: &str) -> Rc<Infrastructure> {
        self.add(Infrastructure::new(name, self.phase()))
    }
}

impl Agent for Infrastructure {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn children(&self) -> Vec<Rc<dyn Agent>> {
        self.children.borrow().clone()
    }
}

/// Holds SETUP until a DUT signal reaches a value, e.g. an init done flag.
pub struct SignalCondition {
    name: String,
    signal: SimObject,
    value: u64,
}

impl SignalCondition {
    pub fn new(name: &str, signal: SimObject, value: u64) -> Rc<Self> {
        Rc::new(SignalCondition {
            name: name.to_string(),
            signal,
            value,
        })
    }
}

impl Agent for SignalCondition {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn can_phase_progress(&self, phase: Phase) -> bool {
        phase != Phase::Setup || self.signal.u64() == self.value
    }
}

/// Runs the agent tree through SETUP, SIM, DRAIN and DONE.
///
/// Progress is checked once per rising clock edge, after the edge settled.
/// DRAIN ends once every agent agrees, or, with a drain settle time, once no
/// agent reported activity for that long.
pub struct PhaseManager {
    root: Rc<Infrastructure>,
    clk: SimObject,
    watchdog: Option<SimTime>,
    drain_settle: Option<SimTime>,
}

impl PhaseManager {
    pub fn new(clk: SimObject) -> Self {
        PhaseManager {
            root: Infrastructure::new("top", PhaseHandle::new()),
            clk,
            watchdog: None,
            drain_settle: None,
        }
    }

    pub fn with_watchdog(mut self, limit: SimTime) -> Self {
        self.watchdog = Some(limit);
        self
    }

    pub fn with_drain_settle(mut self, settle: SimTime) -> Self {
        self.drain_settle = Some(settle);
        self
    }

    pub fn phase(&self) -> PhaseHandle {
        self.root.phase()
    }

    pub fn root(&self) -> Rc<Infrastructure> {
        self.root.clone()
    }

    pub fn add<A: Agent + 'static>(&self, agent: Rc<A>) -> Rc<A> {
        self.root.add(agent)
    }

    pub fn agent(&self, name: &str) -> Rc<Infrastructure> {
        self.root.agent(name)
    }

    async fn wait_progress(&self, phase: Phase) -> TbResult {
        let root = self.root.clone();
        if phase == Phase::Drain {
            if let Some(settle) = self.drain_settle {
                let settle_steps = settle.steps();
                let mut last_activity = root.activity();
                let mut quiet_since = SIM_IF.get_sim_time_steps();
                loop {
                    self.clk.rising_edge_rw().await?;
                    let activity = root.activity();
                    let now = SIM_IF.get_sim_time_steps();
                    if activity != last_activity {
                        last_activity = activity;
                        quiet_since = now;
                    } else if now - quiet_since >= settle_steps {
                        return Ok(Val::None);
                    }
                }
            }
        }
        loop {
            if root.can_phase_progress(phase) {
                return Ok(Val::None);
            }
            self.clk.rising_edge_rw().await?;
        }
    }

    pub async fn run(&self) -> TbResult {
        let phase = self.phase();
        let watchdog = self
            .watchdog
            .map(|limit| Task::fork(simulation_timeout(limit, Some(phase.clone()))));
        let root = self.root.clone();

        SIM_IF.log(&format!("phase {}", phase.get()));
        root.start_phase(phase.get());
        for current in [Phase::Setup, Phase::Sim, Phase::Drain] {
            self.wait_progress(current).await?;
            // the watchdog may have ended the run in between
            if phase.is(Phase::Done) {
                break;
            }
            root.end_phase(current);
            let next = current.next();
            phase.advance(next)?;
            SIM_IF.log(&format!("phase {}", next));
            root.start_phase(next);
        }
        if let Some(watchdog) = watchdog {
            watchdog.cancel();
        }

        let stats = root.scoreboards();
        if !stats.is_empty() {
            for line in report::scoreboard_table(&stats).to_string().lines() {
                SIM_IF.log(line);
            }
        }
        root.verdict()?;
        Ok(Val::String(format!("{} scoreboards passed", stats.len())))
    }
}
