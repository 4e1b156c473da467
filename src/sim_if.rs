use crate::signal::SimObject;
use crate::sim::SoftSim;
use crate::TbError;

/// Interface of the simulator the testbench runs on.
pub static SIM_IF: &(dyn SimIf + Sync) = &SoftSim;

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: u64) -> Result<(), TbError>;
    fn get_value(&self, obj: &SimObject) -> Result<u64, TbError>;
    fn get_object_by_name(&self, name: &str) -> Result<SimObject, TbError>;
    fn get_root_object(&self) -> Result<SimObject, TbError>;
    fn get_full_name(&self, obj: &SimObject) -> Result<String, TbError>;
    fn discover_nets(&self, obj: &SimObject) -> Vec<SimObject>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn log(&self, msg: &str);
    fn register_callback(&self, cb: SimCallback) -> Result<usize, TbError>;
    fn cancel_callback(&self, cb_hdl: usize) -> Result<(), TbError>;
    fn get_sim_time(&self, unit: &str) -> f64 {
        // does not preserve precision, don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        ldexp10(t, precision - time_scale(unit).unwrap_or(precision))
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> u64 {
        let precision = self.get_sim_precision();
        let scale = time_scale(unit)
            .unwrap_or_else(|_| panic!("Unknown time unit '{}'", unit));
        let steps = ldexp10(time, scale - precision);
        if steps % 1.0 == 0.0 {
            steps as u64
        } else {
            panic!(
                "Can't convert time {} {} to sim steps without rounding (sim precision: {})",
                time,
                unit,
                scale_time(precision).unwrap_or_else(|_| precision.to_string())
            );
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> Result<i8, TbError> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(TbError::Config(format!("unknown time unit '{}'", unit))),
    }
}

fn scale_time(unit: i8) -> Result<String, TbError> {
    match unit {
        -15 => Ok("fs".to_string()),
        -12 => Ok("ps".to_string()),
        -9 => Ok("ns".to_string()),
        -6 => Ok("us".to_string()),
        -3 => Ok("ms".to_string()),
        0 => Ok("sec".to_string()),
        _ => Err(TbError::Config(format!("no unit for 1e{}", unit))),
    }
}

// Like math.ldexp, but base 10
fn ldexp10(frac: f64, exp: i8) -> f64 {
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}

/// A time value with its unit, e.g. `SimTime::ns(100)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTime {
    pub time: u64,
    pub unit: &'static str,
}

impl SimTime {
    pub fn new(time: u64, unit: &'static str) -> Self {
        SimTime { time, unit }
    }
    pub fn ps(time: u64) -> Self {
        Self::new(time, "ps")
    }
    pub fn ns(time: u64) -> Self {
        Self::new(time, "ns")
    }
    pub fn us(time: u64) -> Self {
        Self::new(time, "us")
    }
    pub fn ms(time: u64) -> Self {
        Self::new(time, "ms")
    }
    pub fn steps(&self) -> u64 {
        SIM_IF.get_sim_steps(self.time as f64, self.unit)
    }
}
