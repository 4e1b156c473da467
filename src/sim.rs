use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::config::SimConfig;
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};
use crate::{executor, unlikely, TbError};

thread_local! {
    static STATE: RefCell<SimState> = RefCell::new(SimState::new(&SimConfig::default()));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Active,
    ReadOnly,
}

#[derive(Clone, Copy, Debug)]
enum CbKind {
    Time(u64),
    Edge(usize),
    Rw,
    Ro,
}

struct SimEntry {
    name: String,
    kind: ObjectKind,
    value: u64,
}

struct SimState {
    time: u64,
    precision: i8,
    max_delta_cycles: u32,
    region: Region,
    // handle is the index, the root hierarchy is handle 0
    objects: Vec<SimEntry>,
    names: HashMap<String, usize>,
    pending: IntMap<u64>,
    pending_order: Vec<usize>,
    cb_hdl_cnt: usize,
    cb_hdl_map: IntMap<CbKind>,
    timers: BTreeMap<u64, Vec<usize>>,
    edges: IntMap<usize>,
    rw: Option<usize>,
    ro: Option<usize>,
}

impl SimState {
    fn new(config: &SimConfig) -> Self {
        let mut state = SimState {
            time: 0,
            precision: config.precision,
            max_delta_cycles: config.max_delta_cycles,
            region: Region::Active,
            objects: Vec::with_capacity(config.signals.len() + 1),
            names: HashMap::new(),
            pending: IntMap::new(),
            pending_order: Vec::new(),
            cb_hdl_cnt: 0,
            cb_hdl_map: IntMap::new(),
            timers: BTreeMap::new(),
            edges: IntMap::new(),
            rw: None,
            ro: None,
        };
        state.add_object(config.top.clone(), ObjectKind::Hier);
        for decl in &config.signals {
            state.add_object(
                format!("{}.{}", config.top, decl.name),
                ObjectKind::Int(decl.width),
            );
        }
        state
    }

    fn add_object(&mut self, name: String, kind: ObjectKind) {
        self.names.insert(name.clone(), self.objects.len());
        self.objects.push(SimEntry {
            name,
            kind,
            value: 0,
        });
    }

    fn entry(&self, handle: usize) -> Result<&SimEntry, TbError> {
        self.objects
            .get(handle)
            .ok_or_else(|| TbError::Signal(format!("invalid handle {}", handle)))
    }

    fn new_cb_hdl(&mut self, kind: CbKind) -> usize {
        self.cb_hdl_cnt += 1;
        self.cb_hdl_map.insert(self.cb_hdl_cnt as u64, kind);
        self.cb_hdl_cnt
    }
}

fn with_state<R>(f: impl FnOnce(&mut SimState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

/// Set up a fresh simulator with the signal surface of `config`.
pub(crate) fn init(config: &SimConfig) -> Result<(), TbError> {
    config.validate()?;
    with_state(|s| *s = SimState::new(config));
    Ok(())
}

/// Zero every signal and drop pending writes, simulation time keeps running.
pub(crate) fn reset_signal_values() {
    with_state(|s| {
        for entry in s.objects.iter_mut() {
            entry.value = 0;
        }
        s.pending = IntMap::new();
        s.pending_order.clear();
        s.region = Region::Active;
    });
}

pub(crate) fn clear_callbacks() {
    with_state(|s| {
        s.cb_hdl_map = IntMap::new();
        s.timers.clear();
        s.edges = IntMap::new();
        s.rw = None;
        s.ro = None;
    });
}

/// Declared signals as (full name, width), in declaration order.
pub fn signals() -> Vec<(String, u32)> {
    with_state(|s| {
        s.objects
            .iter()
            .filter_map(|e| match e.kind {
                ObjectKind::Int(width) => Some((e.name.clone(), width)),
                ObjectKind::Hier => None,
            })
            .collect()
    })
}

/// Apply pending writes. Returns the number of signals that changed and the
/// subset of changes somebody waits on.
fn commit_pending() -> (usize, Vec<(usize, EdgeKind)>) {
    with_state(|s| {
        let order = std::mem::take(&mut s.pending_order);
        let mut changed = 0;
        let mut edges = Vec::new();
        for sig in order {
            let Some(new) = s.pending.remove(sig as u64) else { continue };
            let entry = &mut s.objects[sig];
            if entry.value == new {
                continue;
            }
            entry.value = new;
            changed += 1;
            if s.edges.contains_key(sig as u64) {
                let edge = match entry.kind {
                    ObjectKind::Int(1) if new == 1 => EdgeKind::Rising,
                    ObjectKind::Int(1) => EdgeKind::Falling,
                    _ => EdgeKind::Any,
                };
                edges.push((sig, edge));
            }
        }
        (changed, edges)
    })
}

fn take_region_cb(ro: bool) -> bool {
    with_state(|s| {
        let hdl = if ro { s.ro.take() } else { s.rw.take() };
        match hdl {
            Some(h) => {
                s.cb_hdl_map.remove(h as u64);
                true
            }
            None => false,
        }
    })
}

fn set_region(region: Region) {
    with_state(|s| s.region = region);
}

// Run tasks and delta cycles until nothing changes anymore, then the read-write region.
fn settle() -> Result<(), TbError> {
    let mut deltas = 0;
    loop {
        executor::run_once();
        if !crate::test_running() {
            return Ok(());
        }
        let (changed, edges) = commit_pending();
        if changed > 0 {
            deltas += 1;
            let max = with_state(|s| s.max_delta_cycles);
            if unlikely(deltas > max) {
                return Err(TbError::Sim(format!(
                    "more than {} delta cycles at t={} steps, combinational loop?",
                    max,
                    with_state(|s| s.time)
                )));
            }
            for (sig, edge) in edges {
                trigger::react(SimCallback::Edge(sig), Some(edge));
            }
            continue;
        }
        if take_region_cb(false) {
            trigger::react(SimCallback::ReadWrite, None);
            continue;
        }
        return Ok(());
    }
}

fn pop_next_time() -> Option<u64> {
    with_state(|s| {
        let t = *s.timers.keys().next()?;
        for hdl in s.timers.remove(&t).unwrap_or_default() {
            s.cb_hdl_map.remove(hdl as u64);
        }
        s.time = t;
        Some(t)
    })
}

/// Advance the simulation while the current test is running and events are left.
pub(crate) fn run_sim() -> Result<(), TbError> {
    loop {
        settle()?;
        if !crate::test_running() {
            break;
        }
        if take_region_cb(true) {
            set_region(Region::ReadOnly);
            trigger::react(SimCallback::ReadOnly, None);
            set_region(Region::Active);
        }
        if !crate::test_running() {
            break;
        }
        match pop_next_time() {
            Some(t) => trigger::react(SimCallback::Time(t), None),
            None => break,
        }
    }
    Ok(())
}

/// Simulator backend running entirely inside the testbench process.
pub struct SoftSim;

impl SimIf for SoftSim {
    fn set_value(&self, obj: &SimObject, value: u64) -> Result<(), TbError> {
        with_state(|s| {
            let entry = s.entry(obj.handle())?;
            let width = match entry.kind {
                ObjectKind::Int(width) => width,
                ObjectKind::Hier => {
                    return Err(TbError::Signal(format!("{} has no value", entry.name)))
                }
            };
            if s.region == Region::ReadOnly {
                return Err(TbError::Sim(format!(
                    "write to {} in read-only region",
                    entry.name
                )));
            }
            let masked = if width >= 64 {
                value
            } else {
                value & ((1u64 << width) - 1)
            };
            if s.pending.insert(obj.handle() as u64, masked).is_none() {
                s.pending_order.push(obj.handle());
            }
            Ok(())
        })
    }
    fn get_value(&self, obj: &SimObject) -> Result<u64, TbError> {
        with_state(|s| s.entry(obj.handle()).map(|e| e.value))
    }
    fn get_object_by_name(&self, name: &str) -> Result<SimObject, TbError> {
        with_state(|s| match s.names.get(name) {
            Some(&handle) => Ok(SimObject {
                handle,
                kind: s.objects[handle].kind,
            }),
            None => Err(TbError::Signal(format!("no object named {}", name))),
        })
    }
    fn get_root_object(&self) -> Result<SimObject, TbError> {
        with_state(|s| {
            s.entry(0).map(|e| SimObject {
                handle: 0,
                kind: e.kind,
            })
        })
    }
    fn get_full_name(&self, obj: &SimObject) -> Result<String, TbError> {
        with_state(|s| s.entry(obj.handle()).map(|e| e.name.clone()))
    }
    fn discover_nets(&self, obj: &SimObject) -> Vec<SimObject> {
        with_state(|s| {
            let prefix = match s.entry(obj.handle()) {
                Ok(e) if matches!(e.kind, ObjectKind::Hier) => format!("{}.", e.name),
                _ => return Vec::new(),
            };
            s.objects
                .iter()
                .enumerate()
                .filter(|(_, e)| matches!(e.kind, ObjectKind::Int(_)) && e.name.starts_with(&prefix))
                .map(|(handle, e)| SimObject {
                    handle,
                    kind: e.kind,
                })
                .collect()
        })
    }
    fn get_sim_time_steps(&self) -> u64 {
        with_state(|s| s.time)
    }
    fn get_sim_precision(&self) -> i8 {
        with_state(|s| s.precision)
    }
    fn log(&self, msg: &str) {
        let t = self.get_sim_time("ns");
        let int = t.floor() as u64;
        let mut frac_str = format!("{:.3}", t % 1.0);
        frac_str.remove(0);
        println!(
            "{}{}ns {}",
            int.to_formatted_string(&Locale::en),
            frac_str,
            msg
        );
    }
    fn register_callback(&self, cb: SimCallback) -> Result<usize, TbError> {
        with_state(|s| {
            let hdl = match cb {
                SimCallback::Time(t) => {
                    let t_abs = s.time + t;
                    let hdl = s.new_cb_hdl(CbKind::Time(t_abs));
                    s.timers.entry(t_abs).or_default().push(hdl);
                    hdl
                }
                SimCallback::Edge(sig_hdl) => {
                    s.entry(sig_hdl)?;
                    let hdl = s.new_cb_hdl(CbKind::Edge(sig_hdl));
                    if let Some(old) = s.edges.insert(sig_hdl as u64, hdl) {
                        s.cb_hdl_map.remove(old as u64);
                    }
                    hdl
                }
                SimCallback::ReadWrite => {
                    let hdl = s.new_cb_hdl(CbKind::Rw);
                    if let Some(old) = s.rw.replace(hdl) {
                        s.cb_hdl_map.remove(old as u64);
                    }
                    hdl
                }
                SimCallback::ReadOnly => {
                    let hdl = s.new_cb_hdl(CbKind::Ro);
                    if let Some(old) = s.ro.replace(hdl) {
                        s.cb_hdl_map.remove(old as u64);
                    }
                    hdl
                }
            };
            Ok(hdl)
        })
    }
    fn cancel_callback(&self, cb_hdl: usize) -> Result<(), TbError> {
        with_state(|s| {
            let cb = s
                .cb_hdl_map
                .remove(cb_hdl as u64)
                .ok_or_else(|| TbError::Sim(format!("unknown callback handle {}", cb_hdl)))?;
            match cb {
                CbKind::Time(t_abs) => {
                    if let Some(handles) = s.timers.get_mut(&t_abs) {
                        handles.retain(|h| *h != cb_hdl);
                        if handles.is_empty() {
                            s.timers.remove(&t_abs);
                        }
                    }
                }
                CbKind::Edge(sig_hdl) => {
                    if s.edges.get(sig_hdl as u64) == Some(&cb_hdl) {
                        s.edges.remove(sig_hdl as u64);
                    }
                }
                CbKind::Rw => {
                    if s.rw == Some(cb_hdl) {
                        s.rw = None;
                    }
                }
                CbKind::Ro => {
                    if s.ro == Some(cb_hdl) {
                        s.ro = None;
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_if::SIM_IF;

    fn setup() {
        let config = SimConfig::new().signal("clk", 1).signal("data", 4);
        init(&config).unwrap();
    }

    #[test]
    fn writes_are_deferred_and_masked() {
        setup();
        let data = SIM_IF.get_object_by_name("dut.data").unwrap();
        SIM_IF.set_value(&data, 0x1f).unwrap();
        assert_eq!(SIM_IF.get_value(&data).unwrap(), 0);
        let (changed, edges) = commit_pending();
        assert_eq!(changed, 1);
        assert!(edges.is_empty());
        assert_eq!(SIM_IF.get_value(&data).unwrap(), 0xf);
    }

    #[test]
    fn edge_kind_follows_new_value() {
        setup();
        let clk = SIM_IF.get_object_by_name("dut.clk").unwrap();
        SIM_IF.register_callback(SimCallback::Edge(clk.handle())).unwrap();
        SIM_IF.set_value(&clk, 1).unwrap();
        assert_eq!(commit_pending().1, vec![(clk.handle(), EdgeKind::Rising)]);
        SIM_IF.set_value(&clk, 0).unwrap();
        assert_eq!(commit_pending().1, vec![(clk.handle(), EdgeKind::Falling)]);
        // same value, no change
        SIM_IF.set_value(&clk, 0).unwrap();
        assert_eq!(commit_pending().0, 0);
    }

    #[test]
    fn timers_pop_in_time_order_and_cancel() {
        setup();
        let a = SIM_IF.register_callback(SimCallback::Time(30)).unwrap();
        SIM_IF.register_callback(SimCallback::Time(10)).unwrap();
        SIM_IF.cancel_callback(a).unwrap();
        assert!(SIM_IF.cancel_callback(a).is_err());
        assert_eq!(pop_next_time(), Some(10));
        assert_eq!(SIM_IF.get_sim_time_steps(), 10);
        assert_eq!(pop_next_time(), None);
    }

    #[test]
    fn lookup_and_discovery() {
        setup();
        let root = SIM_IF.get_root_object().unwrap();
        assert_eq!(SIM_IF.get_full_name(&root).unwrap(), "dut");
        let nets = SIM_IF.discover_nets(&root);
        assert_eq!(nets.len(), 2);
        assert!(SIM_IF.get_object_by_name("dut.nope").is_err());
        assert!(SIM_IF.set_value(&root, 1).is_err());
        assert_eq!(signals(), vec![("dut.clk".to_string(), 1), ("dut.data".to_string(), 4)]);
    }

    #[test]
    fn read_only_region_rejects_writes() {
        setup();
        let data = SIM_IF.get_object_by_name("dut.data").unwrap();
        set_region(Region::ReadOnly);
        assert!(matches!(SIM_IF.set_value(&data, 1), Err(TbError::Sim(_))));
        set_region(Region::Active);
        assert!(SIM_IF.set_value(&data, 1).is_ok());
    }
}
