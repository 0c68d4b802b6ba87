//! Binds the hardware interrupt lines to the cycle clock and the capture arena.

use std::sync::Arc;

use mpg_traits::{HardwareTimer, InterruptLines};

use crate::capture::Capture;
use crate::clock::{CycleClock, CycleTimestamp};

/// Interrupt handlers: timestamp each event, then hand it to the capture state.
#[derive(Debug)]
pub struct Interrupts<T> {
    clock: CycleClock<T>,
    capture: Arc<Capture>,
}

impl<T: HardwareTimer> Interrupts<T> {
    pub fn new(timer: T, capture: Arc<Capture>) -> Self {
        Self {
            clock: CycleClock::new(timer),
            capture,
        }
    }

    #[inline]
    pub fn now(&self) -> CycleTimestamp {
        self.clock.now()
    }

    pub fn clock(&self) -> &CycleClock<T> {
        &self.clock
    }

    pub fn capture(&self) -> &Arc<Capture> {
        &self.capture
    }
}

impl<T: HardwareTimer> InterruptLines for Interrupts<T> {
    fn timer_overflow(&self) {
        self.clock.on_overflow();
        self.capture.on_tick(self.clock.now());
    }

    fn vss_edge(&self) {
        self.capture.on_vss_edge(self.clock.now());
    }

    fn injector_open(&self) {
        self.capture.on_injector_open(self.clock.now());
    }

    fn injector_close(&self) {
        self.capture.on_injector_close(self.clock.now());
    }

    fn analog_sample(&self, channel: u8, value: u16) {
        self.capture.set_analog(channel, value);
    }
}
