//! Monotonic cycle clock.
//!
//! Extends a narrow free-running hardware counter to 32 bits by adding the counter's
//! range on every overflow interrupt. Intervals are computed modulo 2^32, so any two
//! events less than one full 32-bit range apart yield the true elapsed cycle count.

use core::cell::Cell;

use critical_section::Mutex;
use mpg_traits::HardwareTimer;

/// Extended cycle count since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleTimestamp(pub u32);

impl CycleTimestamp {
    /// Cycles elapsed from `self` to `later`, correct across one wraparound.
    #[inline]
    #[must_use]
    pub const fn interval_to(self, later: Self) -> u32 {
        later.0.wrapping_sub(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, cycles: u32) -> Self {
        Self(self.0.wrapping_add(cycles))
    }
}

/// `b - a` modulo the timestamp range.
#[inline]
#[must_use]
pub const fn interval(a: CycleTimestamp, b: CycleTimestamp) -> u32 {
    a.interval_to(b)
}

pub struct CycleClock<T> {
    timer: T,
    overflow_base: Mutex<Cell<u32>>,
}

impl<T: HardwareTimer> CycleClock<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            overflow_base: Mutex::new(Cell::new(0)),
        }
    }

    /// Current extended count. Safe from both interrupt and main context.
    ///
    /// If the hardware counter has wrapped but the overflow interrupt has not yet run,
    /// the pending range is added here so the result never steps backwards.
    pub fn now(&self) -> CycleTimestamp {
        critical_section::with(|cs| {
            let base = self.overflow_base.borrow(cs).get();
            let range = self.timer.range();
            let count = self.timer.counter();
            let mut extended = base.wrapping_add(count);
            if self.timer.overflow_pending() && count < range - 1 {
                extended = extended.wrapping_add(range);
            }
            CycleTimestamp(extended)
        })
    }

    /// Overflow interrupt body: advance the extended base by one counter range.
    pub fn on_overflow(&self) {
        critical_section::with(|cs| {
            let base = self.overflow_base.borrow(cs);
            base.set(base.get().wrapping_add(self.timer.range()));
        });
    }

    /// Cycles per scheduler tick (one counter range).
    #[inline]
    pub fn tick_cycles(&self) -> u32 {
        self.timer.range()
    }

    #[inline]
    pub fn timer(&self) -> &T {
        &self.timer
    }
}

impl<T> core::fmt::Debug for CycleClock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let base = critical_section::with(|cs| self.overflow_base.borrow(cs).get());
        f.debug_struct("CycleClock")
            .field("overflow_base", &base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeTimer {
        count: AtomicU32,
        pending: AtomicBool,
    }

    impl HardwareTimer for FakeTimer {
        fn counter(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
        fn overflow_pending(&self) -> bool {
            self.pending.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn counts_overflows() {
        let clock = CycleClock::new(FakeTimer::default());
        clock.timer().count.store(10, Ordering::SeqCst);
        assert_eq!(clock.now(), CycleTimestamp(10));
        clock.on_overflow();
        clock.on_overflow();
        assert_eq!(clock.now(), CycleTimestamp(2 * 256 + 10));
    }

    #[test]
    fn pending_overflow_is_folded_in() {
        let clock = CycleClock::new(FakeTimer::default());
        // Counter wrapped to 3 but the interrupt has not run yet.
        clock.timer().count.store(3, Ordering::SeqCst);
        clock.timer().pending.store(true, Ordering::SeqCst);
        assert_eq!(clock.now(), CycleTimestamp(256 + 3));
    }

    #[test]
    fn pending_flag_ignored_at_top_of_range() {
        // Count 255 was read before the wrap; folding the range in would jump ahead.
        let clock = CycleClock::new(FakeTimer::default());
        clock.timer().count.store(255, Ordering::SeqCst);
        clock.timer().pending.store(true, Ordering::SeqCst);
        assert_eq!(clock.now(), CycleTimestamp(255));
    }

    #[test]
    fn interval_across_wrap() {
        let a = CycleTimestamp(u32::MAX - 9);
        let b = a.wrapping_add(25);
        assert_eq!(interval(a, b), 25);
        assert_eq!(interval(a, a), 0);
    }
}
