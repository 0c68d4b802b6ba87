//! Interrupt-side pulse capture.
//!
//! Edge handlers credit the raw accumulators; the periodic tick drives every
//! software countdown (freshness, debounce, loop, sleep). All state lives behind one
//! critical-section mutex so each handler is a single short masked region, and the
//! main loop only ever touches it through [`Capture::drain`] and the `take_*` calls.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::clock::CycleTimestamp;
use crate::trip::Trip;
use crate::util::ANALOG_CHANNELS;

/// Capture parameters derived from the settings by the engine.
///
/// The zero value is inert: every injector event is rejected until real parameters
/// are installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureParams {
    /// Injector response time subtracted from every open duration.
    pub inj_settle_cycles: u32,
    /// Longest open-to-open interval still counted as a running engine.
    pub min_good_cycles: u32,
    /// Open-duration ceiling used when no recent engine cycle is known.
    pub max_good_inj_cycles: u32,
    /// Dynamic ceiling as a fraction of the engine cycle, over 1024.
    pub duty_ceiling: u32,
    pub inj_reset_ticks: u32,
    /// Road-speed debounce; 0 credits edges immediately.
    pub vss_pause_ticks: u32,
    pub vss_reset_ticks: u32,
    pub loop_ticks: u32,
    pub sleep_ticks: u32,
    /// Duplicate idle (no road speed) and EOC (no fuel) events into the idle buffer.
    pub track_idle: bool,
}

/// Scheduler transitions since the last [`Capture::take_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub woke: bool,
    pub fell_asleep: bool,
}

/// Snapshot of the freshness flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub good_vss: bool,
    pub good_inj: bool,
    pub inj_open_read: bool,
}

#[derive(Debug, Default)]
struct CaptureState {
    params: CaptureParams,
    raw: Trip,
    raw_idle: Trip,
    fresh: Freshness,

    last_vss: CycleTimestamp,
    last_inj_open: CycleTimestamp,
    this_inj_open: CycleTimestamp,
    inj_total_cycles: u32,
    inj_ceiling: u32,

    inj_reset_count: u32,
    vss_reset_count: u32,
    vss_debounce_count: u32,

    last_tick: Option<CycleTimestamp>,
    system_cycles: u64,
    loop_count: u32,
    loop_due: bool,
    awake: bool,
    sleep_count: u32,
    wake_request: bool,
    events: TickEvents,

    analog: [u16; ANALOG_CHANNELS],
}

impl CaptureState {
    fn credit_vss(&mut self, now: CycleTimestamp) {
        // the first edge after a pause only seeds the timestamp
        let cycles = if self.fresh.good_vss {
            self.last_vss.interval_to(now)
        } else {
            0
        };
        self.raw.credit_vss(cycles);
        if self.params.track_idle && !self.fresh.good_inj {
            self.raw_idle.credit_vss(cycles);
        }
        self.wake_request = true;
        self.vss_reset_count = self.params.vss_reset_ticks;
        self.fresh.good_vss = true;
        self.last_vss = now;
    }
}

#[derive(Debug)]
pub struct Capture {
    state: Mutex<RefCell<CaptureState>>,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new(CaptureParams::default())
    }
}

impl Capture {
    #[must_use]
    pub fn new(params: CaptureParams) -> Self {
        let cap = Self {
            state: Mutex::new(RefCell::new(CaptureState {
                awake: true,
                ..CaptureState::default()
            })),
        };
        cap.set_params(params);
        cap
    }

    fn with<R>(&self, f: impl FnOnce(&mut CaptureState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Install freshly derived parameters. Clears injector freshness so the next
    /// engine cycle is measured against the new thresholds.
    pub fn set_params(&self, params: CaptureParams) {
        self.with(|st| {
            st.params = params;
            st.fresh.good_inj = false;
            st.fresh.inj_open_read = false;
            st.inj_ceiling = params.max_good_inj_cycles;
            st.loop_count = params.loop_ticks.max(1);
            st.sleep_count = params.sleep_ticks;
        });
        tracing::debug!(?params, "capture parameters installed");
    }

    #[must_use]
    pub fn params(&self) -> CaptureParams {
        self.with(|st| st.params)
    }

    /// Road-speed edge.
    pub fn on_vss_edge(&self, now: CycleTimestamp) {
        self.with(|st| {
            if st.params.vss_pause_ticks == 0 {
                st.credit_vss(now);
            } else if st.vss_debounce_count == 0 {
                st.vss_debounce_count = st.params.vss_pause_ticks;
            }
        });
    }

    /// Injector opening edge: measures the engine cycle since the previous opening.
    pub fn on_injector_open(&self, now: CycleTimestamp) {
        self.with(|st| {
            st.last_inj_open = st.this_inj_open;
            st.this_inj_open = now;

            if st.fresh.good_inj {
                let total = st.last_inj_open.interval_to(now);
                if total < st.params.min_good_cycles {
                    st.inj_total_cycles = total;
                    let ceiling = (u64::from(total) * u64::from(st.params.duty_ceiling)) >> 10;
                    st.inj_ceiling = u32::try_from(ceiling).unwrap_or(u32::MAX);
                    st.wake_request = true;
                } else {
                    // engine presumed stopped
                    st.inj_total_cycles = 0;
                    st.fresh.good_inj = false;
                }
            }
            if !st.fresh.good_inj {
                st.inj_ceiling = st.params.max_good_inj_cycles;
            }

            st.fresh.inj_open_read = true;
            st.inj_reset_count = st.params.inj_reset_ticks;
        });
    }

    /// Injector closing edge: validates the open duration and credits the raw buffers.
    pub fn on_injector_close(&self, now: CycleTimestamp) {
        self.with(|st| {
            let idle = st.params.track_idle && !st.fresh.good_vss;
            let mut open = 0;

            if st.fresh.inj_open_read {
                let measured = st
                    .this_inj_open
                    .interval_to(now)
                    .checked_sub(st.params.inj_settle_cycles);
                match measured {
                    Some(cycles) if cycles < st.inj_ceiling => {
                        open = cycles;
                        st.fresh.good_inj = true;
                        st.wake_request = true;
                    }
                    _ => {
                        st.fresh.good_inj = false;
                        st.inj_reset_count = 0;
                    }
                }
                st.fresh.inj_open_read = false;
            }

            let total = st.inj_total_cycles;
            st.raw.credit_injector(open, total);
            if idle {
                st.raw_idle.credit_injector(open, total);
            }
            st.inj_total_cycles = 0;
        });
    }

    /// Periodic tick: countdowns, debounce, loop and sleep scheduling.
    pub fn on_tick(&self, now: CycleTimestamp) {
        self.with(|st| {
            if let Some(last) = st.last_tick {
                st.system_cycles = st.system_cycles.wrapping_add(u64::from(last.interval_to(now)));
            }
            st.last_tick = Some(now);

            if st.inj_reset_count > 0 {
                st.inj_reset_count -= 1;
                if st.inj_reset_count == 0 {
                    st.fresh.good_inj = false;
                    st.fresh.inj_open_read = false;
                }
            }

            if st.vss_reset_count > 0 {
                st.vss_reset_count -= 1;
                if st.vss_reset_count == 0 {
                    st.fresh.good_vss = false;
                }
            }

            if st.vss_debounce_count > 0 {
                st.vss_debounce_count -= 1;
                if st.vss_debounce_count == 0 {
                    st.credit_vss(now);
                }
            }

            st.loop_count = st.loop_count.saturating_sub(1);
            if st.loop_count == 0 {
                st.loop_due = true;
                st.loop_count = st.params.loop_ticks.max(1);
            }

            if st.sleep_count > 0 {
                st.sleep_count -= 1;
            } else if st.awake {
                st.awake = false;
                st.events.fell_asleep = true;
            }

            if st.wake_request {
                st.wake_request = false;
                if !st.awake {
                    st.events.woke = true;
                }
                st.awake = true;
                st.sleep_count = st.params.sleep_ticks;
            }
        });
    }

    /// Latest conversion result for `channel`; out-of-range channels are ignored.
    pub fn set_analog(&self, channel: u8, value: u16) {
        self.with(|st| {
            if let Some(slot) = st.analog.get_mut(usize::from(channel)) {
                *slot = value;
            }
        });
    }

    #[must_use]
    pub fn analog(&self, channel: u8) -> Option<u16> {
        self.with(|st| st.analog.get(usize::from(channel)).copied())
    }

    /// Ask the scheduler to wake (button press or host request); applied on the next tick.
    pub fn request_wake(&self) {
        self.with(|st| st.wake_request = true);
    }

    /// Take the raw and raw-idle buffers, leaving them zeroed.
    pub fn drain(&self) -> (Trip, Trip) {
        self.with(|st| {
            let out = (st.raw, st.raw_idle);
            st.raw.reset();
            st.raw_idle.reset();
            out
        })
    }

    /// Whether a main-loop cycle has elapsed since the last call.
    pub fn take_loop_due(&self) -> bool {
        self.with(|st| core::mem::take(&mut st.loop_due))
    }

    pub fn take_events(&self) -> TickEvents {
        self.with(|st| core::mem::take(&mut st.events))
    }

    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.with(|st| st.awake)
    }

    #[must_use]
    pub fn freshness(&self) -> Freshness {
        self.with(|st| st.fresh)
    }

    /// Cycles seen by the tick handler since boot.
    #[must_use]
    pub fn system_cycles(&self) -> u64 {
        self.with(|st| st.system_cycles)
    }

    /// Copy of the raw buffers without draining them.
    #[must_use]
    pub fn peek(&self) -> (Trip, Trip) {
        self.with(|st| (st.raw, st.raw_idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CaptureParams {
        CaptureParams {
            inj_settle_cycles: 172,
            min_good_cycles: 375_000,
            max_good_inj_cycles: 299_927,
            duty_ceiling: 819,
            inj_reset_ticks: 1_466,
            vss_pause_ticks: 0,
            vss_reset_ticks: 610,
            loop_ticks: 610,
            sleep_ticks: 1_000,
            track_idle: true,
        }
    }

    fn t(c: u32) -> CycleTimestamp {
        CycleTimestamp(c)
    }

    #[test]
    fn first_vss_edge_only_seeds() {
        let cap = Capture::new(params());
        cap.on_vss_edge(t(1_000));
        cap.on_vss_edge(t(1_500));
        cap.on_vss_edge(t(2_100));
        let (raw, _) = cap.drain();
        assert_eq!(raw.vss_pulses, 3);
        assert_eq!(raw.vss_cycles, 1_100);
        assert!(cap.peek().0.is_empty());
    }

    #[test]
    fn stale_vss_edge_restarts_interval() {
        let cap = Capture::new(CaptureParams {
            vss_reset_ticks: 2,
            ..params()
        });
        cap.on_vss_edge(t(0));
        cap.on_tick(t(256));
        cap.on_tick(t(512));
        assert!(!cap.freshness().good_vss);
        cap.on_vss_edge(t(10_000));
        let (raw, _) = cap.drain();
        assert_eq!(raw.vss_pulses, 2);
        assert_eq!(raw.vss_cycles, 0);
    }

    #[test]
    fn vss_interval_spans_counter_wrap() {
        let cap = Capture::new(params());
        cap.on_vss_edge(t(u32::MAX - 99));
        cap.on_vss_edge(t(100));
        assert_eq!(cap.drain().0.vss_cycles, 200);
    }

    #[test]
    fn debounced_edge_is_credited_on_the_tick() {
        let cap = Capture::new(CaptureParams {
            vss_pause_ticks: 2,
            ..params()
        });
        cap.on_vss_edge(t(10));
        // ignored while the countdown runs
        cap.on_vss_edge(t(20));
        cap.on_tick(t(256));
        assert_eq!(cap.peek().0.vss_pulses, 0);
        cap.on_tick(t(512));
        assert_eq!(cap.peek().0.vss_pulses, 1);
    }

    #[test]
    fn injector_pair_credits_open_and_cycle() {
        let cap = Capture::new(params());
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(1_000));
        cap.on_injector_open(t(20_000));
        cap.on_injector_close(t(21_000));
        let (raw, _) = cap.drain();
        assert_eq!(raw.injector_pulses, 2);
        assert_eq!(raw.injector_open_cycles, 2 * 828);
        assert_eq!(raw.injector_cycles, 20_000);
        assert!(cap.freshness().good_inj);
    }

    #[test]
    fn open_past_duty_ceiling_is_rejected() {
        let cap = Capture::new(params());
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(1_000));
        cap.on_injector_open(t(20_000));
        // ceiling is 20000 * 819 / 1024 = 15996 cycles
        cap.on_injector_close(t(20_000 + 172 + 15_996));
        let (raw, _) = cap.drain();
        assert_eq!(raw.injector_pulses, 1);
        assert_eq!(raw.injector_open_cycles, 828);
        assert_eq!(raw.injector_cycles, 20_000);
        assert!(!cap.freshness().good_inj);
    }

    #[test]
    fn open_shorter_than_settle_is_rejected() {
        let cap = Capture::new(params());
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(100));
        assert_eq!(cap.drain().0.injector_pulses, 0);
        assert!(!cap.freshness().good_inj);
    }

    #[test]
    fn slow_engine_cycle_is_not_counted() {
        let cap = Capture::new(params());
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(1_000));
        cap.on_injector_open(t(400_000));
        cap.on_injector_close(t(401_000));
        let (raw, _) = cap.drain();
        // open time still counts against the static ceiling, the cycle does not
        assert_eq!(raw.injector_pulses, 2);
        assert_eq!(raw.injector_cycles, 0);
    }

    #[test]
    fn injector_freshness_lapses() {
        let cap = Capture::new(CaptureParams {
            inj_reset_ticks: 1,
            ..params()
        });
        cap.on_injector_open(t(0));
        cap.on_tick(t(256));
        assert_eq!(cap.freshness(), Freshness::default());
        cap.on_injector_close(t(1_000));
        assert_eq!(cap.drain().0.injector_pulses, 0);
    }

    #[test]
    fn idle_events_are_duplicated() {
        let cap = Capture::new(params());
        // no road speed: fuel goes to the idle buffer too
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(1_000));
        // fuel is fresh by now, so this pulse is not engine-off coasting
        cap.on_vss_edge(t(2_000));
        let (raw, idle) = cap.drain();
        assert_eq!(raw.injector_pulses, 1);
        assert_eq!(idle.injector_pulses, 1);
        assert_eq!(raw.vss_pulses, 1);
        assert_eq!(idle.vss_pulses, 0);
    }

    #[test]
    fn loop_fires_every_loop_ticks() {
        let cap = Capture::new(CaptureParams {
            loop_ticks: 3,
            ..params()
        });
        let mut fired = Vec::new();
        for i in 1..=9u32 {
            cap.on_tick(t(i * 256));
            fired.push(cap.take_loop_due());
        }
        assert_eq!(fired.iter().filter(|f| **f).count(), 3);
        assert!(fired[2] && fired[5] && fired[8]);
        assert_eq!(cap.system_cycles(), 8 * 256);
    }

    #[test]
    fn sleeps_after_inactivity_and_wakes_on_pulse() {
        let cap = Capture::new(CaptureParams {
            sleep_ticks: 3,
            ..params()
        });
        for i in 1..=4u32 {
            cap.on_tick(t(i * 256));
        }
        assert!(!cap.is_awake());
        assert_eq!(cap.take_events(), TickEvents { woke: false, fell_asleep: true });
        cap.on_vss_edge(t(5_000));
        cap.on_tick(t(5_120));
        assert!(cap.is_awake());
        assert_eq!(cap.take_events(), TickEvents { woke: true, fell_asleep: false });
    }

    #[test]
    fn new_params_clear_injector_freshness() {
        let cap = Capture::new(params());
        cap.on_injector_open(t(0));
        cap.on_injector_close(t(1_000));
        assert!(cap.freshness().good_inj);
        cap.set_params(params());
        assert!(!cap.freshness().good_inj);
    }

    #[test]
    fn analog_channels_are_bounded() {
        let cap = Capture::default();
        cap.set_analog(1, 700);
        cap.set_analog(9, 1);
        assert_eq!(cap.analog(1), Some(700));
        assert_eq!(cap.analog(9), None);
    }
}
