use mpg_core::capture::{Capture, CaptureParams};
use mpg_core::clock::CycleTimestamp;
use proptest::prelude::*;

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
        sleep_ticks: 146_484,
        track_idle: true,
    }
}

proptest! {
    #[test]
    fn evenly_spaced_edges_sum_their_intervals(
        start in any::<u32>(),
        spacing in 1u32..=1_000_000,
        n in 1u32..200,
    ) {
        let cap = Capture::new(params());
        for i in 0..n {
            cap.on_vss_edge(CycleTimestamp(start.wrapping_add(i.wrapping_mul(spacing))));
        }
        let (raw, _) = cap.drain();
        prop_assert_eq!(raw.vss_pulses, n);
        prop_assert_eq!(raw.vss_cycles, u64::from(n - 1) * u64::from(spacing));
    }

    #[test]
    fn open_time_is_pulse_less_settle(
        period in 4_000u32..300_000,
        pulse in 173u32..2_000,
        n in 2u32..50,
    ) {
        let cap = Capture::new(params());
        for i in 0..n {
            let open = CycleTimestamp(i * period);
            cap.on_injector_open(open);
            cap.on_injector_close(open.wrapping_add(pulse));
        }
        let (raw, _) = cap.drain();
        prop_assert_eq!(raw.injector_pulses, n);
        prop_assert_eq!(raw.injector_open_cycles, u64::from(n) * u64::from(pulse - 172));
        prop_assert_eq!(raw.injector_cycles, u64::from(n - 1) * u64::from(period));
    }
}

#[test]
fn pulse_past_the_dynamic_ceiling_is_dropped() {
    let cap = Capture::new(params());
    // 10_000-cycle engine period gives a 7_998-cycle ceiling
    let mut t = 0;
    for _ in 0..3 {
        cap.on_injector_open(CycleTimestamp(t));
        cap.on_injector_close(CycleTimestamp(t + 1_172));
        t += 10_000;
    }
    let before = cap.peek().0.injector_open_cycles;
    assert_eq!(before, 3_000);

    cap.on_injector_open(CycleTimestamp(t));
    cap.on_injector_close(CycleTimestamp(t + 9_000));
    let (raw, _) = cap.drain();
    // the rejected pulse adds neither a count nor open time
    assert_eq!(raw.injector_pulses, 3);
    assert_eq!(raw.injector_open_cycles, before);
    assert!(!cap.freshness().good_inj);
}
