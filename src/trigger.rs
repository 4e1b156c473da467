use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::executor;
use crate::{
    signal::SimObject,
    sim_if::{SimCallback, SIM_IF},
    value::Val,
    TbResult,
};

// IntMap specializes on u64 keys, no hashing needed
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::empty());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::empty());
}

struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

impl CallbackHandles {
    fn empty() -> Self {
        CallbackHandles {
            handle: None,
            callbacks: VecDeque::new(),
        }
    }
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) fn cancel_all_triggers() {
    let mut handles = Vec::new();
    for region in [&READ_ONLY, &READ_WRITE] {
        region.with(|r| {
            let mut r = r.borrow_mut();
            r.callbacks = VecDeque::new();
            handles.extend(r.handle.take());
        });
    }
    for map in [&TIMER_MAP, &EDGE_MAP] {
        let drained: Vec<CallbackHandles> =
            map.with(|m| m.borrow_mut().drain().map(|(_, cb)| cb).collect());
        handles.extend(drained.into_iter().filter_map(|cb| cb.handle));
    }
    for handle in handles {
        let _ = SIM_IF.cancel_callback(handle);
    }
}

struct TrigState {
    fired: Cell<bool>,
    waker: RefCell<Waker>,
}

// If trigger is an edge, react needs to know which edge it waits for so an
// existing callback does not have to be rescheduled.
#[derive(Clone)]
struct TrigShared {
    state: Rc<TrigState>,
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.state.fired.set(true);
        self.state.waker.borrow().wake_by_ref();
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

pub struct Trigger {
    kind: TrigKind,
    registered: Option<Rc<TrigState>>,
}

// A clone is a fresh, not yet awaited trigger of the same kind.
impl Clone for Trigger {
    fn clone(&self) -> Self {
        Trigger {
            kind: self.kind,
            registered: None,
        }
    }
}

impl Trigger {
    fn from_kind(kind: TrigKind) -> Self {
        Trigger {
            kind,
            registered: None,
        }
    }
    pub fn timer(time: u64, unit: &str) -> Self {
        Trigger::from_kind(TrigKind::Timer(SIM_IF.get_sim_steps(time as f64, unit)))
    }
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::from_kind(TrigKind::Timer(steps))
    }
    pub async fn timer_ro(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit).await;
        Trigger::read_only().await;
        Ok(Val::None)
    }
    pub async fn timer_rw(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit).await;
        Trigger::read_write().await;
        Ok(Val::None)
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write() -> Self {
        Trigger::from_kind(TrigKind::ReadWrite)
    }
    pub fn read_only() -> Self {
        Trigger::from_kind(TrigKind::ReadOnly)
    }
    pub fn kind(&self) -> TrigKind {
        self.kind
    }

    fn register(&self, shared: TrigShared) {
        match self.kind {
            TrigKind::ReadWrite => READ_WRITE.with(|rw| {
                let mut rw = rw.borrow_mut();
                rw.callbacks.push_back(shared);
                if rw.handle.is_none() {
                    rw.handle = SIM_IF.register_callback(SimCallback::ReadWrite).ok();
                }
            }),
            TrigKind::ReadOnly => READ_ONLY.with(|ro| {
                let mut ro = ro.borrow_mut();
                ro.callbacks.push_back(shared);
                if ro.handle.is_none() {
                    ro.handle = SIM_IF.register_callback(SimCallback::ReadOnly).ok();
                }
            }),
            TrigKind::Timer(t) => {
                // keyed on absolute time since the simulator reports absolute time back
                let abs_time = t + SIM_IF.get_sim_time_steps();
                let exists = TIMER_MAP.with(|m| match m.borrow_mut().get_mut(abs_time) {
                    Some(callbacks) => {
                        callbacks.callbacks.push_back(shared.clone());
                        true
                    }
                    None => false,
                });
                if !exists {
                    let handle = SIM_IF.register_callback(SimCallback::Time(t)).ok();
                    let mut callbacks = VecDeque::new();
                    callbacks.push_back(shared);
                    TIMER_MAP.with(|m| {
                        m.borrow_mut()
                            .insert(abs_time, CallbackHandles { handle, callbacks });
                    });
                }
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                let shared = TrigShared { edge_kind, ..shared };
                let exists = EDGE_MAP.with(|m| match m.borrow_mut().get_mut(sig_hdl as u64) {
                    Some(callbacks) => {
                        callbacks.callbacks.push_back(shared.clone());
                        true
                    }
                    None => false,
                });
                if !exists {
                    let handle = SIM_IF.register_callback(SimCallback::Edge(sig_hdl)).ok();
                    let mut callbacks = VecDeque::new();
                    callbacks.push_back(shared);
                    EDGE_MAP.with(|m| {
                        m.borrow_mut()
                            .insert(sig_hdl as u64, CallbackHandles { handle, callbacks });
                    });
                }
            }
        }
    }
}

impl Future for Trigger {
    type Output = Val;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(state) = &self.registered {
            // may be polled spuriously, e.g. from within a select
            if state.fired.get() {
                return Poll::Ready(Val::None);
            }
            *state.waker.borrow_mut() = cx.waker().clone();
            return Poll::Pending;
        }
        let state = Rc::new(TrigState {
            fired: Cell::new(false),
            waker: RefCell::new(cx.waker().clone()),
        });
        self.register(TrigShared {
            state: state.clone(),
            edge_kind: EdgeKind::Any,
        });
        self.registered = Some(state);
        Poll::Pending
    }
}

/// Called by the simulator when a registered callback fires.
#[inline]
pub fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let mut vec_wake: VecDeque<TrigShared> = VecDeque::new();
    let mut cancel = None;

    match cb {
        SimCallback::ReadWrite => READ_WRITE.with(|rw| {
            let mut rw = rw.borrow_mut();
            rw.handle = None; // callback is done
            vec_wake = std::mem::take(&mut rw.callbacks);
        }),
        SimCallback::ReadOnly => READ_ONLY.with(|ro| {
            let mut ro = ro.borrow_mut();
            ro.handle = None;
            vec_wake = std::mem::take(&mut ro.callbacks);
        }),
        SimCallback::Time(t) => {
            if let Some(callbacks) = TIMER_MAP.with(|m| m.borrow_mut().remove(t)) {
                vec_wake = callbacks.callbacks;
            }
        }
        SimCallback::Edge(sig_hdl) => {
            if let Some(mut callbacks) = EDGE_MAP.with(|m| m.borrow_mut().remove(sig_hdl as u64))
            {
                let edge = edge.unwrap_or(EdgeKind::Any);
                let mut vec_resched: VecDeque<TrigShared> = VecDeque::new();
                for trig in callbacks.callbacks.drain(..) {
                    if trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge {
                        vec_wake.push_back(trig);
                    } else {
                        vec_resched.push_back(trig);
                    }
                }
                if vec_resched.is_empty() {
                    // nobody waits on this signal anymore
                    cancel = callbacks.handle;
                } else {
                    callbacks.callbacks = vec_resched;
                    EDGE_MAP.with(|m| {
                        m.borrow_mut().insert(sig_hdl as u64, callbacks);
                    });
                }
            }
        }
    }

    if let Some(handle) = cancel {
        let _ = SIM_IF.cancel_callback(handle);
    }
    if !vec_wake.is_empty() {
        for shared in vec_wake {
            shared.fire();
        }
        // execute woken tasks
        executor::run_once();
    }
}
