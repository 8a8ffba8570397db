//! IRQ0 tick counter.
//!
//! The core only needs a monotonic tick count (the global kernel state
//! described in §9 Design Notes carries one); calibrated `mdelay`/`udelay`
//! against the PIT or TSC are a collaborator concern (§10.5) this CORE does
//! not implement, since nothing in §4 requires more timing precision than
//! the ATA driver's port-0x80 settle trick already provides.

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Advances the tick counter. Called once per IRQ0 from the timer handler.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Returns the number of timer ticks observed since boot.
#[must_use]
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_counter() {
        let before = ticks();
        tick();
        assert_eq!(ticks(), before + 1);
    }
}
