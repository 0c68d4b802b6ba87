//! `From` implementations bridging `mpg_config` types to `mpg_core` types.

use mpg_config::{Config, Milli, Units};

use crate::arith::Arithmetic;
use crate::computer::FuelComputerBuilder;
use crate::settings::Setting;
use crate::util::saturate_u32;

impl From<mpg_config::ArithmeticMode> for Arithmetic {
    fn from(m: mpg_config::ArithmeticMode) -> Self {
        match m {
            mpg_config::ArithmeticMode::Native => Self::Native,
            mpg_config::ArithmeticMode::Primitive => Self::Primitive,
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

fn milli(m: Milli) -> u32 {
    saturate_u32(m.thousandths())
}

/// A fraction in thousandths to the /1024 scale of the duty-ceiling setting, half up.
fn per_1024(m: Milli) -> u32 {
    saturate_u32((m.thousandths() * 1024 + 500) / 1000)
}

/// The settings a config pins, in the order they must be applied.
///
/// The unit system comes first so the unit-bearing values that follow are taken in
/// the configured units; microseconds-per-quantity comes last so an explicit value
/// wins over one re-derived from the injector fields. Absent fields are left out and
/// keep whatever the store holds.
pub fn setting_overrides(c: &Config) -> Vec<(Setting, u32)> {
    let (v, i, b) = (&c.vehicle, &c.injectors, &c.behavior);
    let mut out = Vec::new();
    let mut put = |setting, value: Option<u32>| {
        if let Some(value) = value {
            out.push((setting, value));
        }
    };

    put(Setting::MetricMode, v.units.map(|u| u32::from(u == Units::Metric)));
    put(Setting::PulsesPerDistance, v.pulses_per_distance);
    put(Setting::TankSize, v.tank_size.map(milli));
    put(Setting::VssPause, v.vss_pause_ms);
    put(Setting::CrankRevs, v.crank_revs);
    put(Setting::MinGoodRpm, v.min_good_rpm);

    put(Setting::InjectorCount, i.count);
    put(Setting::InjectorSize, i.size_ml_min);
    put(Setting::InjectorSettle, i.settle_us);
    put(Setting::SysFuelPressure, i.sys_pressure.map(milli));
    put(Setting::RefFuelPressure, i.ref_pressure.map(milli));
    put(Setting::InjectorDutyCeiling, i.duty_ceiling.map(per_1024));

    put(Setting::ActivityTimeout, b.activity_timeout_s);
    put(Setting::WakeupResetCurrent, b.wakeup_reset_current.map(u32::from));
    put(Setting::WindowFilter, b.window_filter.map(u32::from));
    put(Setting::FeVsTimePeriod, b.fe_vs_time_period_s);
    put(Setting::AutoSaveActive, b.autosave_active.map(u32::from));
    put(Setting::AutoSaveIdle, b.autosave_idle.map(u32::from));
    put(Setting::BarLowSpeed, b.bar_low_speed.map(milli));
    put(Setting::BarSpeedQuantum, b.bar_speed_quantum.map(milli));
    put(Setting::FuelCost, b.fuel_cost.map(milli));

    put(Setting::MicrosPerQuantity, v.micros_per_quantity);
    out
}

// ── Builder ──────────────────────────────────────────────────────────────────

impl<S> FuelComputerBuilder<S> {
    /// Setting overrides, clock and backend from a validated config. The store is
    /// attached separately.
    pub fn with_config(self, c: &Config) -> Self {
        self.with_overrides(setting_overrides(c))
            .with_cycles_per_second(c.engine.cycles_per_second)
            .with_tick_cycles(c.engine.tick_cycles)
            .with_arithmetic(c.engine.arithmetic.into())
            .with_idle_tracking(c.engine.track_idle)
            .with_restore(c.engine.restore_trips)
    }
}
