use crate::sim_if::SIM_IF;
use crate::trigger::Trigger;
use crate::value::Val;
use crate::{TbError, TbResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Int(u32),
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> String {
        SIM_IF
            .get_full_name(self)
            .unwrap_or_else(|_| format!("<handle {}>", self.handle))
    }

    /// Name relative to the parent hierarchy.
    pub fn short_name(&self) -> String {
        let name = self.name();
        match name.rsplit_once('.') {
            Some((_, short)) => short.to_string(),
            None => name,
        }
    }

    pub fn size(&self) -> u32 {
        match self.kind {
            ObjectKind::Int(size) => size,
            ObjectKind::Hier => 0,
        }
    }

    pub fn get_child(&self, name: &str) -> Result<Self, TbError> {
        let mut child_name = self.name();
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn from_name(full_name: &str) -> Result<Self, TbError> {
        SIM_IF.get_object_by_name(full_name)
    }

    pub fn get_root() -> Result<Self, TbError> {
        SIM_IF.get_root_object()
    }

    /// Signals below this hierarchy whose name starts with `prefix`, in declaration order.
    pub fn discover_signals(&self, prefix: &str) -> Vec<SimObject> {
        SIM_IF
            .discover_nets(self)
            .into_iter()
            .filter(|s| s.short_name().starts_with(prefix))
            .collect()
    }

    pub fn c(&self, name: &str) -> Self {
        self.get_child(name)
            .unwrap_or_else(|_| panic!("Could not get object with name {}.{}", self.name(), name))
    }

    pub fn try_u64(&self) -> Result<u64, TbError> {
        SIM_IF.get_value(self)
    }

    pub fn u64(&self) -> u64 {
        match SIM_IF.get_value(self) {
            Ok(v) => v,
            Err(e) => {
                crate::fail_test(e);
                0
            }
        }
    }

    pub fn u32(&self) -> u32 {
        self.u64() as u32
    }

    pub fn is_high(&self) -> bool {
        self.u64() != 0
    }

    /// Schedule a write, visible after the current delta cycle.
    pub fn try_set(&self, val: u64) -> Result<(), TbError> {
        SIM_IF.set_value(self, val)
    }

    pub fn set(&self, val: u64) {
        if let Err(e) = SIM_IF.set_value(self, val) {
            crate::fail_test(e);
        }
    }

    pub fn set_u32(&self, val: u32) {
        self.set(val as u64)
    }

    pub fn set_bool(&self, val: bool) {
        self.set(val as u64)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_only().await;
        Ok(Val::None)
    }
    pub async fn rising_edge_rw(self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_write().await;
        Ok(Val::None)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
