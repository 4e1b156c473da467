use rand as rnd;
use rnd::{rngs::StdRng, Rng, SeedableRng};
use std::cell::RefCell;

use crate::prelude::*;

// Each simulation thread owns its generator so runs are reproducible per seed.
thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

pub fn seed(seed: u64) {
    RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
}

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
    Ok(Val::None)
}

/// Check `cond` once per rising edge of `clk` until it holds.
pub async fn wait_until(clk: SimObject, mut cond: impl FnMut() -> bool) -> TbResult {
    while !cond() {
        clk.rising_edge().await;
    }
    Ok(Val::None)
}

/// Uniform in [0, 1).
#[inline]
pub fn rand() -> f64 {
    RNG.with(|r| r.borrow_mut().gen::<f64>())
}

#[inline]
pub fn rand_int(ceil: u32) -> u32 {
    if ceil == 0 {
        return 0;
    }
    RNG.with(|r| r.borrow_mut().gen_range(0..ceil))
}

#[inline]
pub fn rand_bits(width: u32) -> u64 {
    let v = RNG.with(|r| r.borrow_mut().gen::<u64>());
    match width {
        0 => 0,
        1..=63 => v & ((1u64 << width) - 1),
        _ => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        seed(42);
        let a: Vec<u64> = (0..8).map(|_| rand_bits(16)).collect();
        seed(42);
        let b: Vec<u64> = (0..8).map(|_| rand_bits(16)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| *v < 1 << 16));
    }

    #[test]
    fn ranges_hold() {
        seed(1);
        for _ in 0..100 {
            assert!(rand_int(7) < 7);
            let r = rand();
            assert!((0.0..1.0).contains(&r));
            assert!(rand_bits(1) <= 1);
        }
        assert_eq!(rand_int(0), 0);
        assert_eq!(rand_bits(0), 0);
    }
}
