use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mpg_hardware::{DriveProfile, DriveSimulator, SimulatedTimer};
use mpg_traits::{HardwareTimer, InterruptLines};
use rstest::rstest;

/// Rebuilds absolute time from overflows and counter reads, the way the cycle clock does.
struct Recorder {
    timer: Arc<SimulatedTimer>,
    base: AtomicU64,
    vss: AtomicU32,
    opens: AtomicU32,
    closes: AtomicU32,
    stamps: Mutex<Vec<u64>>,
    analog: Mutex<Vec<(u8, u16)>>,
}

impl Recorder {
    fn new(timer: Arc<SimulatedTimer>) -> Self {
        Self {
            timer,
            base: AtomicU64::new(0),
            vss: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            stamps: Mutex::new(Vec::new()),
            analog: Mutex::new(Vec::new()),
        }
    }

    fn stamp(&self) {
        let t = self.base.load(Ordering::Relaxed) + u64::from(self.timer.counter());
        self.stamps.lock().unwrap().push(t);
    }
}

impl InterruptLines for Recorder {
    fn timer_overflow(&self) {
        self.base
            .fetch_add(u64::from(self.timer.range()), Ordering::Relaxed);
        self.stamp();
    }
    fn vss_edge(&self) {
        self.vss.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }
    fn injector_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }
    fn injector_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
        self.stamp();
    }
    fn analog_sample(&self, channel: u8, value: u16) {
        self.analog.lock().unwrap().push((channel, value));
    }
}

const CPS: u32 = 312_500;

#[rstest]
#[case(60.0, 3_000.0)]
#[case(25.0, 1_200.0)]
#[case(0.0, 800.0)]
fn one_second_of_steady_driving(#[case] speed: f64, #[case] rpm: f64) {
    let timer = Arc::new(SimulatedTimer::default());
    let rec = Recorder::new(Arc::clone(&timer));
    let mut sim = DriveSimulator::new(
        Arc::clone(&timer),
        CPS,
        DriveProfile::steady(speed, 10_000, rpm, 2, 2_000.0),
    );
    let stats = sim.advance(&rec, u64::from(CPS));

    let want_vss = (speed * 10_000.0 / 3600.0).floor() as u64;
    let want_inj = (rpm / 120.0).floor() as u64;
    assert!(stats.vss_edges.abs_diff(want_vss) <= 1, "{stats:?}");
    assert!(stats.injector_pulses.abs_diff(want_inj) <= 1, "{stats:?}");
    assert_eq!(stats.ticks, u64::from(CPS / 256));
    assert_eq!(u64::from(rec.vss.load(Ordering::Relaxed)), stats.vss_edges);
    // every close matches an open
    let opens = rec.opens.load(Ordering::Relaxed);
    let closes = rec.closes.load(Ordering::Relaxed);
    assert!(opens - closes <= 1);
}

#[test]
fn interrupts_arrive_in_cycle_order() {
    let timer = Arc::new(SimulatedTimer::default());
    let rec = Recorder::new(Arc::clone(&timer));
    let mut sim = DriveSimulator::new(
        Arc::clone(&timer),
        CPS,
        DriveProfile::steady(70.0, 10_000, 2_500.0, 2, 4_000.0),
    );
    for _ in 0..50 {
        sim.advance(&rec, 1_000);
    }
    let stamps = rec.stamps.lock().unwrap();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(sim.now(), 50_000);
}

#[test]
fn parked_profile_only_ticks() {
    let timer = Arc::new(SimulatedTimer::default());
    let rec = Recorder::new(Arc::clone(&timer));
    let mut sim = DriveSimulator::new(
        Arc::clone(&timer),
        CPS,
        DriveProfile::PARKED.with_analog(1, 512),
    );
    let stats = sim.advance(&rec, 2_561);
    assert_eq!(stats.ticks, 10);
    assert_eq!(stats.vss_edges + stats.injector_pulses, 0);
    let analog = rec.analog.lock().unwrap();
    assert_eq!(analog.len(), 10);
    assert!(analog.iter().all(|s| *s == (1, 512)));
}

#[test]
fn profile_change_takes_effect_immediately() {
    let timer = Arc::new(SimulatedTimer::default());
    let rec = Recorder::new(Arc::clone(&timer));
    let mut sim = DriveSimulator::new(Arc::clone(&timer), CPS, DriveProfile::PARKED);
    assert_eq!(sim.advance(&rec, u64::from(CPS)).vss_edges, 0);
    sim.set_profile(DriveProfile::steady(36.0, 10_000, 0.0, 2, 0.0));
    let stats = sim.advance(&rec, u64::from(CPS));
    assert!(stats.vss_edges.abs_diff(100) <= 1, "{stats:?}");
    assert_eq!(stats.injector_pulses, 0);
}
