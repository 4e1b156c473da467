use std::time::Instant;

use crate::phase::{Phase, PhaseHandle};
use crate::prelude::*;

/*
 * CLOCK
 */
pub async fn clock(clk: SimObject, period: u32, unit: &str) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        SIM_IF.log(&format!("Warning: Clock period {period}{unit} not dividable by 2. High time will be {high}{unit}; low time will be {low}{unit}.", period=period, unit=unit, high=high_t, low=low_t));
    }
    loop {
        clk.set(0);
        Trigger::timer(low_t as u64, unit).await;
        clk.set(1);
        Trigger::timer(high_t as u64, unit).await;
    }
}

/// Hold an active-high reset for `reset_time`, then release it. The clock runs
/// from time zero.
pub async fn clock_domain_async_reset(
    clk: SimObject,
    reset: Option<SimObject>,
    reset_time: SimTime,
    period: u32,
    unit: &'static str,
) -> TbResult {
    if let Some(reset) = reset {
        reset.set(1);
        Task::fork(async move {
            Trigger::timer_steps(reset_time.steps()).await;
            reset.set(0);
            Ok(Val::None)
        });
    }
    clock(clk, period, unit).await
}

/*
 * WATCHDOG
 */
/// End the run with a timeout once `limit` of simulated time passed.
pub async fn simulation_timeout(limit: SimTime, phase: Option<PhaseHandle>) -> TbResult {
    Trigger::timer_steps(limit.steps()).await;
    let left = match phase {
        Some(phase) if phase.is(Phase::Done) => return Ok(Val::None),
        Some(phase) => phase.force_done(),
        None => Phase::Sim,
    };
    let err = TbError::Timeout {
        phase: left,
        sim_time_ns: SIM_IF.get_sim_time("ns"),
    };
    SIM_IF.log(&err.to_string());
    fail_test(err.clone());
    Err(err)
}

/// Log simulated clock cycles per wall clock second, about once a second.
pub async fn simulation_speed_printer(clk: SimObject) -> TbResult {
    let mut cycles = 0u64;
    let mut last = Instant::now();
    loop {
        clk.rising_edge().await;
        cycles += 1;
        let elapsed = last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            SIM_IF.log(&format!(
                "Sim speed: {:.3} kHz",
                cycles as f64 / elapsed / 1000.0
            ));
            cycles = 0;
            last = Instant::now();
        }
    }
}
