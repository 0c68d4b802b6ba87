//! Simulated counter and a steady-state drive replayed through the interrupt lines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use mpg_traits::{HardwareTimer, InterruptLines};

/// Free-running counter whose value the simulator sets before each interrupt.
#[derive(Debug)]
pub struct SimulatedTimer {
    counter: AtomicU32,
    pending: AtomicBool,
    range: u32,
}

impl Default for SimulatedTimer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SimulatedTimer {
    /// `range` must be a power of two.
    pub fn new(range: u32) -> Self {
        Self {
            counter: AtomicU32::new(0),
            pending: AtomicBool::new(false),
            range,
        }
    }

    pub fn set(&self, count: u32) {
        self.counter.store(count % self.range, Ordering::Relaxed);
    }

    pub fn set_overflow_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::Relaxed);
    }
}

impl HardwareTimer for SimulatedTimer {
    fn counter(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    fn overflow_pending(&self) -> bool {
        self.pending.load(Ordering::Relaxed)
    }

    fn range(&self) -> u32 {
        self.range
    }
}

/// Steady vehicle state, as event rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveProfile {
    /// Road-speed sensor pulses per second.
    pub vss_hz: f64,
    /// Injector openings per second.
    pub injector_hz: f64,
    /// Electrical open time of each injector pulse.
    pub pulse_us: f64,
    /// Analog samples delivered every tick.
    pub analog: [Option<u16>; 2],
}

impl DriveProfile {
    pub const PARKED: Self = Self {
        vss_hz: 0.0,
        injector_hz: 0.0,
        pulse_us: 0.0,
        analog: [None, None],
    };

    /// `speed` in distance units per hour, `rpm` in crank revolutions per minute.
    pub fn steady(
        speed: f64,
        pulses_per_distance: u32,
        rpm: f64,
        crank_revs: u32,
        pulse_us: f64,
    ) -> Self {
        Self {
            vss_hz: speed * f64::from(pulses_per_distance) / 3600.0,
            injector_hz: rpm / 60.0 / f64::from(crank_revs.max(1)),
            pulse_us,
            analog: [None, None],
        }
    }

    pub fn with_analog(mut self, channel: usize, value: u16) -> Self {
        if let Some(slot) = self.analog.get_mut(channel) {
            *slot = Some(value);
        }
        self
    }
}

/// Interrupt counts delivered by one [`DriveSimulator::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub ticks: u64,
    pub vss_edges: u64,
    pub injector_pulses: u64,
}

// Declaration order breaks ties: a tick lands before edges at the same cycle, and a
// close before the next open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Event {
    Tick,
    InjectorClose,
    InjectorOpen,
    Vss,
}

/// Generates interrupt calls in cycle order for a [`DriveProfile`].
#[derive(Debug)]
pub struct DriveSimulator {
    timer: Arc<SimulatedTimer>,
    cycles_per_second: u32,
    profile: DriveProfile,
    now: u64,
    next_tick: u64,
    next_vss: Option<f64>,
    next_open: Option<f64>,
    close_at: Option<u64>,
}

fn period(cycles_per_second: u32, hz: f64) -> Option<f64> {
    (hz > 0.0 && hz.is_finite()).then(|| f64::from(cycles_per_second) / hz)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn at(t: f64) -> u64 {
    t.ceil() as u64
}

impl DriveSimulator {
    pub fn new(timer: Arc<SimulatedTimer>, cycles_per_second: u32, profile: DriveProfile) -> Self {
        let range = u64::from(timer.range());
        let mut sim = Self {
            timer,
            cycles_per_second,
            profile: DriveProfile::PARKED,
            now: 0,
            next_tick: range,
            next_vss: None,
            next_open: None,
            close_at: None,
        };
        sim.set_profile(profile);
        sim
    }

    /// Change the drive from the current instant on.
    pub fn set_profile(&mut self, profile: DriveProfile) {
        let start = self.now as f64;
        self.next_vss = period(self.cycles_per_second, profile.vss_hz).map(|p| start + p);
        self.next_open = period(self.cycles_per_second, profile.injector_hz).map(|p| start + p);
        self.profile = profile;
        tracing::debug!(?profile, at = self.now, "drive profile");
    }

    pub fn profile(&self) -> &DriveProfile {
        &self.profile
    }

    /// Simulated cycles since start.
    pub fn now(&self) -> u64 {
        self.now
    }

    fn pulse_cycles(&self) -> u64 {
        let open = at(self.profile.pulse_us * f64::from(self.cycles_per_second) / 1e6);
        // an injector cannot stay open through its next opening
        let limit = period(self.cycles_per_second, self.profile.injector_hz)
            .map_or(u64::MAX, |p| at(p).saturating_sub(1));
        open.min(limit)
    }

    fn next_event(&self) -> (u64, Event) {
        let mut best = (self.next_tick, Event::Tick);
        let candidates = [
            (self.close_at, Event::InjectorClose),
            (self.next_open.map(at), Event::InjectorOpen),
            (self.next_vss.map(at), Event::Vss),
        ];
        for (t, ev) in candidates {
            if let Some(t) = t
                && (t, ev) < best
            {
                best = (t, ev);
            }
        }
        best
    }

    /// Deliver every interrupt due in the next `cycles` cycles.
    pub fn advance<L: InterruptLines + ?Sized>(&mut self, lines: &L, cycles: u64) -> SimStats {
        let end = self.now.saturating_add(cycles);
        let range = u64::from(self.timer.range());
        let mut stats = SimStats::default();

        loop {
            let (t, ev) = self.next_event();
            if t >= end {
                break;
            }
            #[allow(clippy::cast_possible_truncation)]
            let count = (t % range) as u32;
            self.timer.set(count);
            match ev {
                Event::Tick => {
                    lines.timer_overflow();
                    for (ch, v) in (0u8..).zip(self.profile.analog) {
                        if let Some(v) = v {
                            lines.analog_sample(ch, v);
                        }
                    }
                    self.next_tick += range;
                    stats.ticks += 1;
                }
                Event::Vss => {
                    lines.vss_edge();
                    let p = period(self.cycles_per_second, self.profile.vss_hz);
                    self.next_vss = self.next_vss.zip(p).map(|(n, p)| n + p);
                    stats.vss_edges += 1;
                }
                Event::InjectorOpen => {
                    lines.injector_open();
                    self.close_at = Some(t + self.pulse_cycles());
                    let p = period(self.cycles_per_second, self.profile.injector_hz);
                    self.next_open = self.next_open.zip(p).map(|(n, p)| n + p);
                }
                Event::InjectorClose => {
                    lines.injector_close();
                    self.close_at = None;
                    stats.injector_pulses += 1;
                }
            }
        }
        self.now = end;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_profile_rates() {
        // 60 mph at 10000 pulses per mile, 3000 rpm on a 4-stroke
        let p = DriveProfile::steady(60.0, 10_000, 3_000.0, 2, 2_000.0);
        assert!((p.vss_hz - 166.666_666).abs() < 1e-3);
        assert!((p.injector_hz - 25.0).abs() < 1e-9);
    }

    #[test]
    fn timer_wraps_values_into_range() {
        let t = SimulatedTimer::new(256);
        t.set(300);
        assert_eq!(t.counter(), 44);
    }
}
