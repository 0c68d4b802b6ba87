/// Free-running hardware counter that the cycle clock extends to 32 bits.
///
/// - counter(): current native count, always `< range()`
/// - overflow_pending(): the counter wrapped but the overflow interrupt has not run yet
/// - range(): native counter range, a power of two (256 for an 8-bit timer)
pub trait HardwareTimer: Send + Sync {
    fn counter(&self) -> u32;
    fn overflow_pending(&self) -> bool;

    fn range(&self) -> u32 {
        256
    }
}

impl<T: HardwareTimer + ?Sized> HardwareTimer for std::sync::Arc<T> {
    #[inline]
    fn counter(&self) -> u32 {
        (**self).counter()
    }

    #[inline]
    fn overflow_pending(&self) -> bool {
        (**self).overflow_pending()
    }

    #[inline]
    fn range(&self) -> u32 {
        (**self).range()
    }
}
