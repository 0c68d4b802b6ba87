pub mod storage;
pub mod timer;

pub use storage::NonVolatile;
pub use timer::HardwareTimer;

/// Entry points the interrupt controller calls into.
///
/// Implementations run in interrupt context: they must finish in bounded time and
/// touch shared state only inside a critical section.
pub trait InterruptLines {
    /// Native hardware counter rolled over.
    fn timer_overflow(&self);
    /// Qualifying edge on the road-speed sensor line.
    fn vss_edge(&self);
    /// Injector driver went active (valve opening).
    fn injector_open(&self);
    /// Injector driver went inactive (valve closing).
    fn injector_close(&self);
    /// An analog conversion finished on `channel`.
    fn analog_sample(&self, channel: u8, value: u16);
}
