use std::cell::Cell;
use std::rc::Rc;

use crate::executor::Task;
use crate::phase::{Agent, Phase};
use crate::signal::SimObject;
use crate::source::{Next, TransactionSource};
use crate::tb_obj::TbObj;
use crate::transaction::Transaction;
use crate::utils;
use crate::{TbError, TbResult};

/// A valid/ready handshake channel with its payload signals.
#[derive(Clone, Debug)]
pub struct Stream {
    name: String,
    valid: SimObject,
    ready: SimObject,
    payload: Vec<(String, SimObject)>,
}

impl Stream {
    /// Bind `<prefix>_valid`, `<prefix>_ready` and every `<prefix>_payload_<field>`
    /// (or a plain `<prefix>_payload`) below `dut`.
    pub fn new(dut: SimObject, prefix: &str) -> Result<Self, TbError> {
        let valid = dut.get_child(&format!("{}_valid", prefix))?;
        let ready = dut.get_child(&format!("{}_ready", prefix))?;
        let plain = format!("{}_payload", prefix);
        let field_prefix = format!("{}_payload_", prefix);
        let mut payload = Vec::new();
        for sig in dut.discover_signals(&plain) {
            let short = sig.short_name();
            if short == plain {
                payload.push(("payload".to_string(), sig));
            } else if let Some(field) = short.strip_prefix(&field_prefix) {
                payload.push((field.to_string(), sig));
            }
        }
        Ok(Stream {
            name: prefix.to_string(),
            valid,
            ready,
            payload,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn valid(&self) -> SimObject {
        self.valid
    }

    pub fn ready(&self) -> SimObject {
        self.ready
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.payload.iter().map(|(name, _)| name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<SimObject> {
        self.payload
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, sig)| *sig)
    }

    /// valid and ready both high.
    pub fn fire(&self) -> bool {
        self.valid.is_high() && self.ready.is_high()
    }

    /// Current payload as a transaction.
    pub fn sample(&self) -> Transaction {
        self.payload
            .iter()
            .fold(Transaction::new(), |t, (name, sig)| t.with(name, sig.u64()))
    }

    /// Schedule the transaction's fields onto the payload signals.
    pub fn drive(&self, t: &Transaction) -> Result<(), TbError> {
        for (name, value) in t.fields() {
            let sig = self.field(name).ok_or_else(|| {
                TbError::Config(format!("stream {} has no payload field {}", self.name, name))
            })?;
            sig.try_set(value)?;
        }
        Ok(())
    }

    pub fn randomize_payload(&self) {
        for (_, sig) in &self.payload {
            sig.set(utils::rand_bits(sig.size()));
        }
    }
}

fn in_reset(reset: Option<SimObject>) -> bool {
    reset.map_or(false, |r| r.is_high())
}

struct MasterState {
    sent: u64,
    exhausted: bool,
    randomize_idle: bool,
}

/// Drives transactions from a source onto a stream, honouring backpressure.
///
/// Add it to a phase tree only if its source runs out: SIM then ends once the
/// source is exhausted.
#[derive(Clone)]
pub struct StreamDriverMaster {
    name: String,
    state: TbObj<MasterState>,
    task: Option<Task>,
}

impl StreamDriverMaster {
    pub fn start(
        stream: Stream,
        source: impl TransactionSource + 'static,
        clk: SimObject,
        reset: Option<SimObject>,
    ) -> Self {
        let state = TbObj::new(MasterState {
            sent: 0,
            exhausted: false,
            randomize_idle: true,
        });
        let name = format!("{}_master", stream.name());
        let handle = Task::spawn_from_future(
            master_loop(stream, source, clk, reset, state.clone()),
            &name,
        );
        StreamDriverMaster {
            name,
            state,
            task: handle.get_task().copied(),
        }
    }

    /// Drive random data on the payload while valid is low (default on).
    pub fn randomize_idle(&self, enable: bool) {
        self.state.with_mut(|s| s.randomize_idle = enable);
    }

    pub fn sent(&self) -> u64 {
        self.state.get().sent
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.get().exhausted
    }

    pub fn stop(&self) {
        if let Some(task) = self.task {
            task.cancel();
        }
    }

    pub fn agent(&self) -> Rc<Self> {
        Rc::new(self.clone())
    }
}

async fn master_loop(
    stream: Stream,
    mut source: impl TransactionSource,
    clk: SimObject,
    reset: Option<SimObject>,
    state: TbObj<MasterState>,
) -> TbResult {
    // owned by the driver until a handshake takes it, survives reset
    let mut held: Option<Transaction> = None;
    stream.valid.set(0);
    loop {
        clk.rising_edge().await;
        if in_reset(reset) {
            stream.valid.set(0);
            continue;
        }
        let valid = stream.valid.is_high();
        let ready = stream.ready.is_high();
        if valid && ready {
            held = None;
            state.with_mut(|s| s.sent += 1);
        } else if valid {
            // hold payload until the slave takes it
            continue;
        }
        stream.valid.set(0);
        if held.is_none() {
            if state.get().randomize_idle {
                stream.randomize_payload();
            }
            match source.next() {
                Next::Item(t) => {
                    for _ in 0..t.next_delay().unwrap_or(0) {
                        clk.rising_edge().await;
                    }
                    held = Some(t);
                    if in_reset(reset) {
                        continue;
                    }
                }
                Next::Idle => {}
                Next::Exhausted => state.with_mut(|s| s.exhausted = true),
            }
        }
        if let Some(t) = &held {
            if let Err(e) = stream.drive(t) {
                crate::fail_test(e.clone());
                return Err(e);
            }
            stream.valid.set(1);
        }
    }
}

impl Agent for StreamDriverMaster {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn can_phase_progress(&self, phase: Phase) -> bool {
        phase != Phase::Sim || self.is_exhausted()
    }
    fn activity(&self) -> u64 {
        self.sent()
    }
}

/// How a slave drives ready.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyPolicy {
    Always,
    Never,
    /// Ready with the given probability each cycle.
    Random { probability: f64 },
    /// Cyclic per-cycle pattern.
    Pattern(Vec<bool>),
}

/// Sink side of a stream, only drives ready.
#[derive(Clone)]
pub struct StreamDriverSlave {
    policy: TbObj<ReadyPolicy>,
    task: Option<Task>,
}

impl StreamDriverSlave {
    pub fn start(stream: Stream, clk: SimObject, reset: Option<SimObject>) -> Self {
        Self::with_policy(stream, clk, reset, ReadyPolicy::Always)
    }

    pub fn with_policy(
        stream: Stream,
        clk: SimObject,
        reset: Option<SimObject>,
        policy: ReadyPolicy,
    ) -> Self {
        let policy = TbObj::new(policy);
        let name = format!("{}_slave", stream.name());
        let handle = Task::spawn_from_future(
            slave_loop(stream.ready, clk, reset, policy.clone()),
            &name,
        );
        StreamDriverSlave {
            policy,
            task: handle.get_task().copied(),
        }
    }

    pub fn set_policy(&self, policy: ReadyPolicy) {
        *self.policy.get_mut() = policy;
    }

    pub fn stop(&self) {
        if let Some(task) = self.task {
            task.cancel();
        }
    }
}

async fn slave_loop(
    ready: SimObject,
    clk: SimObject,
    reset: Option<SimObject>,
    policy: TbObj<ReadyPolicy>,
) -> TbResult {
    let mut tick = 0usize;
    loop {
        let value = !in_reset(reset)
            && match &*policy.get() {
                ReadyPolicy::Always => true,
                ReadyPolicy::Never => false,
                ReadyPolicy::Random { probability } => utils::rand() < *probability,
                ReadyPolicy::Pattern(p) if p.is_empty() => true,
                ReadyPolicy::Pattern(p) => p[tick % p.len()],
            };
        ready.set_bool(value);
        tick += 1;
        clk.rising_edge().await;
    }
}

/// Reports every completed handshake of a stream to a callback, in order.
#[derive(Clone)]
pub struct StreamMonitor {
    name: String,
    observed: Rc<Cell<u64>>,
    task: Option<Task>,
}

impl StreamMonitor {
    pub fn start(
        stream: Stream,
        callback: impl FnMut(Transaction) + 'static,
        clk: SimObject,
        reset: Option<SimObject>,
    ) -> Self {
        let observed = Rc::new(Cell::new(0));
        let name = format!("{}_monitor", stream.name());
        let handle = Task::spawn_from_future(
            monitor_loop(stream, callback, clk, reset, observed.clone()),
            &name,
        );
        StreamMonitor {
            name,
            observed,
            task: handle.get_task().copied(),
        }
    }

    pub fn observed(&self) -> u64 {
        self.observed.get()
    }

    pub fn stop(&self) {
        if let Some(task) = self.task {
            task.cancel();
        }
    }

    pub fn agent(&self) -> Rc<Self> {
        Rc::new(self.clone())
    }
}

async fn monitor_loop(
    stream: Stream,
    mut callback: impl FnMut(Transaction),
    clk: SimObject,
    reset: Option<SimObject>,
    observed: Rc<Cell<u64>>,
) -> TbResult {
    loop {
        clk.rising_edge().await;
        // values seen here are the ones the flops sampled on this edge
        if in_reset(reset) || !stream.fire() {
            continue;
        }
        let t = stream.sample();
        observed.set(observed.get() + 1);
        callback(t);
    }
}

impl Agent for StreamMonitor {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn activity(&self) -> u64 {
        self.observed()
    }
}
