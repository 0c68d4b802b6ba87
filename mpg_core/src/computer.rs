//! `FuelComputer`: the main-loop side of the system.
//!
//! Owns the settings table, the trip store, the calculator and the non-volatile
//! store, and shares the capture arena with the interrupt handlers. Each half-second
//! cycle drains the raw buffers into the trip instances; settings edits re-derive the
//! capture parameters through engine programs.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::WrapErr;
use mpg_traits::{HardwareTimer, NonVolatile};

use crate::arith::Arithmetic;
use crate::capture::{Capture, CaptureParams};
use crate::catalog::{Calculator, Evaluation, Fixed, Quantity};
use crate::error::{BuildError, ExecError, Result};
use crate::format;
use crate::isr::Interrupts;
use crate::persist::{self, SettingsImage, TRIP_SLOTS};
use crate::settings::{CONVERSIONS, SETTING_COUNT, Setting, Settings};
use crate::trip::{Trip, TripVar};
use crate::trips::{SpeedBucket, TRIP_COUNT, TripId, TripStore};
use crate::util::{
    DEFAULT_CYCLES_PER_SECOND, DEFAULT_TICK_CYCLES, LOOPS_PER_SECOND, loop_ticks, saturate_u32,
};
use crate::vm::{Environment, Program};

/// Depth of the fuel-economy-over-time history.
pub const FE_HISTORY_LEN: usize = 15;

/// Trip instances saved when the system falls asleep, with their slots.
pub const ACTIVE_AUTOSAVE: [(TripId, usize); 2] = [(TripId::Tank, 0), (TripId::Current, 1)];
pub const IDLE_AUTOSAVE: [(TripId, usize); 2] = [(TripId::IdleTank, 2), (TripId::IdleCurrent, 3)];

/// What one main-loop cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycles completed since construction, this one included.
    pub cycle: u64,
    pub awake: bool,
    /// FE-vs-speed bucket the instant trip was merged into.
    pub bucket: Option<u8>,
    /// Sample pushed into the FE-vs-time history this cycle.
    pub fe_sample: Option<Fixed>,
}

/// One program failure found by [`FuelComputer::check_catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFailure {
    pub program: Program,
    /// Context index the program ran with.
    pub index: u8,
    /// Register 2 on entry.
    pub input: u64,
    pub error: ExecError,
}

/// Register-2 inputs the helper subroutines are exercised with.
const HELPER_INPUTS: [u64; 4] = [0, 1, 123_456_789, u64::MAX];

/// Context indices and inputs [`FuelComputer::check_catalog`] runs `program` with.
fn check_plan(program: Program) -> (core::ops::Range<u8>, &'static [u64]) {
    #[allow(clippy::cast_possible_truncation)]
    let upto = |n: usize| 0..n.min(usize::from(u8::MAX)) as u8;
    match program {
        Program::Overflow
        | Program::Multiply
        | Program::Divide
        | Program::Adjust
        | Program::DivideRound
        | Program::MulDivRound
        | Program::ToMicros
        | Program::RemainingFuel
        | Program::FormatTime => (0..1, &HELPER_INPUTS),
        // decimal counts, 4 meaning raw
        Program::RoundOff | Program::FormatNumber => (0..5, &HELPER_INPUTS),
        Program::ConvertSetting => (upto(CONVERSIONS.len()), &[0]),
        Program::ReadSetting => (upto(SETTING_COUNT), &[0]),
        Program::FuelFactor
        | Program::SettleCycles
        | Program::MinGoodRpmCycles
        | Program::InjectorCeilingCycles
        | Program::SleepTicks
        | Program::VssPauseTicks => (0..1, &[0]),
        _ => (upto(TRIP_COUNT), &[0]),
    }
}

/// Engine context over the computer's state. Borrowed per run so the calculator and
/// the state it reads can be held at the same time.
struct EngineView<'a> {
    settings: &'a mut Settings,
    trips: &'a TripStore,
    capture: &'a Capture,
    cycles_per_second: u32,
    tick_cycles: u32,
}

impl Environment for EngineView<'_> {
    fn metric(&self) -> bool {
        self.settings.metric()
    }

    fn cycles_per_second(&self) -> u32 {
        self.cycles_per_second
    }

    fn tick_cycles(&self) -> u32 {
        self.tick_cycles
    }

    fn trip_var(&self, trip: u8, var: TripVar) -> Option<u64> {
        self.trips.by_index(trip).map(|t| t.get(var))
    }

    fn tank_fuel(&self) -> u64 {
        self.trips.get(TripId::Tank).injector_open_cycles
    }

    fn setting(&self, s: Setting) -> u32 {
        self.settings.get(s)
    }

    fn store_setting(&mut self, s: Setting, value: u64) {
        self.settings.store_saturating(s, value);
    }

    fn voltage(&self, channel: u8) -> Option<u16> {
        self.capture.analog(channel)
    }
}

pub struct FuelComputer {
    settings: Settings,
    trips: TripStore,
    calc: Calculator,
    capture: Arc<Capture>,
    storage: Box<dyn NonVolatile>,
    cycles_per_second: u32,
    tick_cycles: u32,
    track_idle: bool,
    fe_history: heapless::Deque<Fixed, FE_HISTORY_LEN>,
    period_cycles: u32,
    cycles: u64,
    pending_wake: bool,
    first_boot: bool,
}

impl core::fmt::Debug for FuelComputer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FuelComputer")
            .field("cycles_per_second", &self.cycles_per_second)
            .field("tick_cycles", &self.tick_cycles)
            .field("arithmetic", &self.calc.arithmetic())
            .field("metric", &self.settings.metric())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl FuelComputer {
    pub fn builder() -> FuelComputerBuilder<Missing> {
        FuelComputerBuilder::default()
    }

    /// Split borrow: the calculator plus a context over everything else.
    fn engine(&mut self) -> (&mut Calculator, EngineView<'_>) {
        (
            &mut self.calc,
            EngineView {
                settings: &mut self.settings,
                trips: &self.trips,
                capture: &self.capture,
                cycles_per_second: self.cycles_per_second,
                tick_cycles: self.tick_cycles,
            },
        )
    }

    /// Run a catalog program with context `index`; yields register 2.
    pub fn run_program(&mut self, program: Program, index: u8) -> core::result::Result<u64, ExecError> {
        let (calc, mut env) = self.engine();
        calc.run(&mut env, program, index)
    }

    pub fn evaluate(&mut self, quantity: Quantity, trip: TripId) -> Result<Evaluation> {
        let (calc, mut env) = self.engine();
        calc.evaluate(&mut env, quantity, trip.index())
            .wrap_err_with(|| format!("evaluating {quantity} on {trip}"))
    }

    pub fn format(&mut self, e: &Evaluation) -> Result<String> {
        Ok(format::evaluation(&mut self.calc, e)?)
    }

    /// Evaluate and render in one step.
    pub fn display(&mut self, quantity: Quantity, trip: TripId) -> Result<String> {
        let e = self.evaluate(quantity, trip)?;
        self.format(&e)
    }

    /// Re-derive the capture parameters from the current settings and install them.
    pub fn apply_derived(&mut self) -> Result<CaptureParams> {
        let settle = self.run_program(Program::SettleCycles, 0)?;
        let min_good = saturate_u32(self.run_program(Program::MinGoodRpmCycles, 0)?);
        let ceiling = self.run_program(Program::InjectorCeilingCycles, 0)?;
        let sleep = self.run_program(Program::SleepTicks, 0)?;
        let pause = self.run_program(Program::VssPauseTicks, 0)?;
        let per_loop = loop_ticks(self.cycles_per_second, self.tick_cycles);

        let params = CaptureParams {
            inj_settle_cycles: saturate_u32(settle),
            min_good_cycles: min_good,
            max_good_inj_cycles: saturate_u32(ceiling),
            duty_ceiling: self.settings.get(Setting::InjectorDutyCeiling),
            inj_reset_ticks: (min_good / self.tick_cycles).saturating_add(2),
            vss_pause_ticks: saturate_u32(pause),
            vss_reset_ticks: per_loop,
            loop_ticks: per_loop,
            sleep_ticks: saturate_u32(sleep),
            track_idle: self.track_idle,
        };
        self.capture.set_params(params);
        Ok(params)
    }

    /// Change one setting the way the settings editor does.
    ///
    /// Switching the unit system rescales every unit-bearing setting first; injector
    /// edits re-derive microseconds-per-quantity. Capture parameters are re-derived and
    /// the table is saved.
    pub fn set_setting(&mut self, setting: Setting, value: u32) -> Result<()> {
        self.change_setting(setting, value)?;
        if setting.affects_fuel_factor() {
            self.rederive_fuel_factor()?;
        }
        self.apply_derived()?;
        self.save_settings()
    }

    /// Table edit without re-derivation or saving.
    fn change_setting(&mut self, setting: Setting, value: u32) -> Result<()> {
        if setting == Setting::MetricMode && value <= 1 && (value != 0) != self.settings.metric() {
            // conversions read the mode being left
            for slot in (0u8..).take(CONVERSIONS.len()) {
                self.run_program(Program::ConvertSetting, slot)?;
            }
            tracing::info!(metric = value != 0, "unit system converted");
        }
        if let Err(e) = self.settings.set(setting, value) {
            tracing::warn!(%setting, value, error = %e, "setting rejected");
            return Err(e.into());
        }
        tracing::info!(%setting, value, "setting changed");
        Ok(())
    }

    /// Lay configured values over the loaded table. Returns whether anything changed.
    fn apply_overrides(&mut self, overrides: &[(Setting, u32)]) -> Result<bool> {
        let mut changed = false;
        let mut refuel = false;
        for &(setting, value) in overrides {
            if self.settings.get(setting) == value {
                continue;
            }
            self.change_setting(setting, value)?;
            changed = true;
            refuel |= setting.affects_fuel_factor();
        }
        let pinned = overrides
            .iter()
            .any(|&(s, _)| s == Setting::MicrosPerQuantity);
        if refuel && !pinned {
            self.rederive_fuel_factor()?;
        }
        Ok(changed)
    }

    fn rederive_fuel_factor(&mut self) -> Result<u32> {
        let raw = self.run_program(Program::FuelFactor, 0)?;
        if Fixed::from_raw(raw).is_overflow() {
            tracing::warn!("fuel factor not derivable, keeping previous value");
        }
        Ok(self.settings.get(Setting::MicrosPerQuantity))
    }

    /// Recompute microseconds-per-quantity from the injector settings, then re-derive
    /// and save as any settings edit would.
    pub fn derive_fuel_factor(&mut self) -> Result<u32> {
        let us = self.rederive_fuel_factor()?;
        tracing::info!(micros_per_quantity = us, "fuel factor derived");
        self.apply_derived()?;
        self.save_settings()?;
        Ok(us)
    }

    pub fn save_settings(&mut self) -> Result<()> {
        persist::save_settings(self.storage.as_mut(), &self.settings).wrap_err("saving settings")
    }

    /// One pass of the main loop. Returns `None` until the capture scheduler says a
    /// cycle is due.
    pub fn poll(&mut self) -> Result<Option<CycleReport>> {
        let events = self.capture.take_events();
        if events.woke {
            tracing::info!("woke up");
            self.pending_wake = true;
        }
        if events.fell_asleep {
            tracing::info!("fell asleep");
            self.autosave()?;
        }
        if !self.capture.take_loop_due() {
            return Ok(None);
        }
        self.run_cycle().map(Some)
    }

    fn run_cycle(&mut self) -> Result<CycleReport> {
        let awake = self.capture.is_awake();

        if core::mem::take(&mut self.pending_wake) && self.settings.flag(Setting::WakeupResetCurrent) {
            self.trips.reset(TripId::Current);
            tracing::debug!("current trip reset on wake");
        }

        let fe_sample = if awake { self.sample_fe_vs_time()? } else { None };

        let (raw, raw_idle) = self.capture.drain();
        self.trips.get_mut(TripId::Instant).transfer(&raw);
        for dst in [TripId::Tank, TripId::Current, TripId::Period] {
            self.trips.update(dst, TripId::Instant);
        }
        if self.track_idle {
            self.trips.get_mut(TripId::IdleInstant).transfer(&raw_idle);
            for dst in [TripId::IdleTank, TripId::IdleCurrent] {
                self.trips.update(dst, TripId::IdleInstant);
            }
        }

        let bucket = if awake { self.sample_fe_vs_speed()? } else { None };

        if awake && self.settings.flag(Setting::WindowFilter) {
            self.trips.apply_window_filter();
        }

        self.cycles += 1;
        tracing::trace!(cycle = self.cycles, awake, ?bucket, vss = raw.vss_pulses, inj = raw.injector_pulses, "cycle");
        Ok(CycleReport {
            cycle: self.cycles,
            awake,
            bucket,
            fe_sample,
        })
    }

    fn sample_fe_vs_time(&mut self) -> Result<Option<Fixed>> {
        let period = self
            .settings
            .get(Setting::FeVsTimePeriod)
            .saturating_mul(LOOPS_PER_SECOND);
        if period == 0 {
            return Ok(None);
        }
        self.period_cycles += 1;
        if self.period_cycles < period {
            return Ok(None);
        }
        self.period_cycles = 0;

        let fe = Fixed::from_raw(self.run_program(Program::FuelEcon, TripId::Period.index())?);
        let evicted = if self.fe_history.is_full() {
            self.fe_history.pop_front()
        } else {
            None
        };
        if let Err(lost) = self.fe_history.push_back(fe) {
            tracing::error!(?lost, "fe history rejected a sample");
        }
        tracing::trace!(?fe, ?evicted, "fe-vs-time sample");
        self.trips.reset(TripId::Period);
        Ok(Some(fe))
    }

    fn sample_fe_vs_speed(&mut self) -> Result<Option<u8>> {
        let bucket = self.run_program(Program::SpeedBucket, TripId::Instant.index())?;
        let Some(b) = u8::try_from(bucket).ok().and_then(SpeedBucket::new) else {
            return Ok(None);
        };
        self.trips.update(TripId::FeVsSpeed(b), TripId::Instant);
        Ok(Some(b.get()))
    }

    /// Seconds of system time, as stamped into saved trips.
    #[must_use]
    pub fn uptime_seconds(&self) -> u32 {
        saturate_u32(self.capture.system_cycles() / u64::from(self.cycles_per_second))
    }

    pub fn save_trip(&mut self, trip: TripId, slot: usize) -> Result<()> {
        let stamp = self.uptime_seconds();
        persist::save_trip(self.storage.as_mut(), slot, self.trips.get(trip), stamp)?;
        tracing::info!(%trip, slot, stamp, "trip saved");
        Ok(())
    }

    /// Load `slot` into `trip`. The trip is reset first and stays empty when the slot
    /// holds no valid image; returns whether anything was loaded.
    pub fn load_trip(&mut self, slot: usize, trip: TripId) -> Result<bool> {
        self.trips.reset(trip);
        match persist::load_trip(self.storage.as_ref(), slot)? {
            Some((stamp, saved)) => {
                self.trips.get_mut(trip).transfer(&saved);
                tracing::info!(%trip, slot, stamp, "trip loaded");
                Ok(true)
            }
            None => {
                tracing::debug!(%trip, slot, "no saved trip");
                Ok(false)
            }
        }
    }

    /// Every slot of the store, decoded.
    pub fn saved_trips(&self) -> Result<Vec<(usize, Option<(u32, Trip)>)>> {
        (0..TRIP_SLOTS)
            .map(|slot| Ok((slot, persist::load_trip(self.storage.as_ref(), slot)?)))
            .collect()
    }

    fn autosave_slots(&self) -> impl Iterator<Item = (TripId, usize)> + use<> {
        let active = self.settings.flag(Setting::AutoSaveActive);
        let idle = self.track_idle && self.settings.flag(Setting::AutoSaveIdle);
        ACTIVE_AUTOSAVE
            .into_iter()
            .filter(move |_| active)
            .chain(IDLE_AUTOSAVE.into_iter().filter(move |_| idle))
    }

    pub fn autosave(&mut self) -> Result<()> {
        for (trip, slot) in self.autosave_slots() {
            self.save_trip(trip, slot)?;
        }
        Ok(())
    }

    pub fn restore(&mut self) -> Result<()> {
        for (trip, slot) in self.autosave_slots() {
            self.load_trip(slot, trip)?;
        }
        Ok(())
    }

    pub fn reset_trip(&mut self, trip: TripId) {
        self.trips.reset(trip);
        tracing::info!(%trip, "trip reset");
    }

    /// Run every catalog program over the contexts it accepts and collect the faults.
    ///
    /// Quantities run against every trip instance, the helpers over a spread of
    /// inputs and the maintenance routines over every setting and conversion slot.
    /// Programs that store settings write to a scratch copy, so the live table is
    /// left as it was.
    pub fn check_catalog(&mut self) -> Vec<CheckFailure> {
        let mut scratch = self.settings.clone();
        let mut env = EngineView {
            settings: &mut scratch,
            trips: &self.trips,
            capture: &self.capture,
            cycles_per_second: self.cycles_per_second,
            tick_cycles: self.tick_cycles,
        };
        let mut failures = Vec::new();
        let mut runs = 0usize;
        for &program in Program::ALL {
            let (contexts, inputs) = check_plan(program);
            for index in contexts {
                for &input in inputs {
                    runs += 1;
                    if let Err(error) = self.calc.call(&mut env, program, index, input) {
                        failures.push(CheckFailure {
                            program,
                            index,
                            input,
                            error,
                        });
                    }
                }
            }
        }
        tracing::debug!(runs, faults = failures.len(), "catalog checked");
        failures
    }

    pub fn request_wake(&self) {
        self.capture.request_wake();
    }

    /// Interrupt handlers bound to this computer's capture arena.
    pub fn interrupts<T: HardwareTimer>(&self, timer: T) -> Interrupts<T> {
        Interrupts::new(timer, Arc::clone(&self.capture))
    }

    /// Oldest first.
    pub fn fe_history(&self) -> impl Iterator<Item = Fixed> + '_ {
        self.fe_history.iter().copied()
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The store held no valid settings block when this computer was built.
    pub const fn first_boot(&self) -> bool {
        self.first_boot
    }

    #[must_use]
    pub const fn trips(&self) -> &TripStore {
        &self.trips
    }

    pub fn trips_mut(&mut self) -> &mut TripStore {
        &mut self.trips
    }

    #[must_use]
    pub const fn capture(&self) -> &Arc<Capture> {
        &self.capture
    }

    #[must_use]
    pub fn storage(&self) -> &dyn NonVolatile {
        self.storage.as_ref()
    }

    #[must_use]
    pub const fn arithmetic(&self) -> Arithmetic {
        self.calc.arithmetic()
    }

    #[must_use]
    pub const fn cycles_per_second(&self) -> u32 {
        self.cycles_per_second
    }

    #[must_use]
    pub const fn tick_cycles(&self) -> u32 {
        self.tick_cycles
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for [`FuelComputer`]. `build()` needs a store; `try_build()` checks at runtime.
pub struct FuelComputerBuilder<S> {
    storage: Option<Box<dyn NonVolatile>>,
    settings: Option<Settings>,
    overrides: Vec<(Setting, u32)>,
    cycles_per_second: u32,
    tick_cycles: u32,
    arithmetic: Arithmetic,
    track_idle: bool,
    restore: bool,
    _s: PhantomData<S>,
}

impl Default for FuelComputerBuilder<Missing> {
    fn default() -> Self {
        Self {
            storage: None,
            settings: None,
            overrides: Vec::new(),
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            tick_cycles: DEFAULT_TICK_CYCLES,
            arithmetic: Arithmetic::default(),
            track_idle: true,
            restore: false,
            _s: PhantomData,
        }
    }
}

impl<S> FuelComputerBuilder<S> {
    /// Use these settings instead of the stored table; they are written back on build.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Values laid over the stored table on build; only those that differ are written.
    pub fn with_overrides(mut self, overrides: Vec<(Setting, u32)>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_cycles_per_second(mut self, cps: u32) -> Self {
        self.cycles_per_second = cps;
        self
    }

    pub fn with_tick_cycles(mut self, cycles: u32) -> Self {
        self.tick_cycles = cycles;
        self
    }

    pub fn with_arithmetic(mut self, arithmetic: Arithmetic) -> Self {
        self.arithmetic = arithmetic;
        self
    }

    pub fn with_idle_tracking(mut self, on: bool) -> Self {
        self.track_idle = on;
        self
    }

    /// Reload the autosaved trips on build.
    pub fn with_restore(mut self, on: bool) -> Self {
        self.restore = on;
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<FuelComputer> {
        let storage = self
            .storage
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStorage))?;
        if self.cycles_per_second == 0 {
            return Err(eyre::Report::new(BuildError::ZeroCycleRate));
        }
        if self.tick_cycles < 2 || !self.tick_cycles.is_power_of_two() {
            return Err(eyre::Report::new(BuildError::BadTickLength(self.tick_cycles)));
        }

        let explicit = self.settings.is_some();
        let (settings, first_boot) = match self.settings {
            Some(s) => (s, false),
            None => match persist::load_settings(storage.as_ref())? {
                SettingsImage::Stored(s) => (s, false),
                SettingsImage::Defaulted(s) => {
                    tracing::info!("first boot, writing default settings");
                    (s, true)
                }
            },
        };

        let mut computer = FuelComputer {
            settings,
            trips: TripStore::new(),
            calc: Calculator::new(self.arithmetic),
            capture: Arc::new(Capture::default()),
            storage,
            cycles_per_second: self.cycles_per_second,
            tick_cycles: self.tick_cycles,
            track_idle: self.track_idle,
            fe_history: heapless::Deque::new(),
            period_cycles: 0,
            cycles: 0,
            pending_wake: false,
            first_boot,
        };
        let changed = computer.apply_overrides(&self.overrides)?;
        if explicit || first_boot || changed {
            computer.save_settings()?;
        }
        let params = computer.apply_derived()?;
        if self.restore {
            computer.restore()?;
        }
        tracing::info!(
            cps = computer.cycles_per_second,
            arithmetic = ?computer.arithmetic(),
            metric = computer.settings.metric(),
            ?params,
            "fuel computer ready"
        );
        Ok(computer)
    }
}

impl FuelComputerBuilder<Missing> {
    pub fn with_storage(self, storage: impl NonVolatile + 'static) -> FuelComputerBuilder<Set> {
        FuelComputerBuilder {
            storage: Some(Box::new(storage)),
            settings: self.settings,
            overrides: self.overrides,
            cycles_per_second: self.cycles_per_second,
            tick_cycles: self.tick_cycles,
            arithmetic: self.arithmetic,
            track_idle: self.track_idle,
            restore: self.restore,
            _s: PhantomData,
        }
    }
}

impl FuelComputerBuilder<Set> {
    /// Validate and build. Only available once a store is attached.
    pub fn build(self) -> Result<FuelComputer> {
        self.try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::CycleTimestamp;
    use crate::error::{EngineError, SettingError};
    use crate::persist::IMAGE_LEN;
    use mpg_hardware::MemoryEeprom;

    /// Low clock rate so a loop is ten ticks.
    const FAST_CPS: u32 = 5_120;

    fn computer(settings: Settings) -> FuelComputer {
        FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .with_settings(settings)
            .with_cycles_per_second(FAST_CPS)
            .build()
            .unwrap()
    }

    /// Drive `n` ticks starting at `*t`, then one poll.
    fn tick(c: &mut FuelComputer, n: u32, t: &mut u32) -> Option<CycleReport> {
        for _ in 0..n {
            *t = t.wrapping_add(256);
            c.capture().on_tick(CycleTimestamp(*t));
        }
        c.poll().unwrap()
    }

    #[test]
    fn storage_is_required() {
        let err = FuelComputer::builder().try_build().unwrap_err();
        assert!(err.to_string().contains("storage"), "{err}");
    }

    #[test]
    fn clock_parameters_are_validated() {
        let zero = FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .with_cycles_per_second(0)
            .try_build()
            .unwrap_err();
        assert!(zero.downcast_ref::<BuildError>().is_some());

        let odd = FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .with_tick_cycles(100)
            .try_build()
            .unwrap_err();
        assert!(odd.to_string().contains("power of two"), "{odd}");
    }

    #[test]
    fn first_boot_writes_defaults() {
        let c = FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .build()
            .unwrap();
        assert_eq!(
            persist::load_settings(c.storage()).unwrap(),
            SettingsImage::Stored(Settings::default())
        );
    }

    #[test]
    fn derived_parameters_at_reference_clock() {
        let mut c = FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .build()
            .unwrap();
        let p = c.apply_derived().unwrap();
        assert_eq!(p.inj_settle_cycles, 172);
        assert_eq!(p.min_good_cycles, 375_000);
        assert_eq!(p.max_good_inj_cycles, 299_927);
        assert_eq!(p.inj_reset_ticks, 1_466);
        assert_eq!(p.sleep_ticks, 146_484);
        assert_eq!(p.vss_pause_ticks, 2);
        assert_eq!(p.loop_ticks, 610);
        assert_eq!(p.vss_reset_ticks, 610);
        assert_eq!(c.capture().params(), p);
    }

    #[test]
    fn metric_switch_converts_and_persists() {
        let mut c = computer(Settings::default());
        c.set_setting(Setting::MetricMode, 1).unwrap();
        assert_eq!(c.settings().get(Setting::TankSize), 68_137);
        assert!(c.settings().metric());
        let stored = persist::load_settings(c.storage()).unwrap().into_settings();
        assert_eq!(stored.get(Setting::TankSize), 68_137);

        // same mode again converts nothing
        c.set_setting(Setting::MetricMode, 1).unwrap();
        assert_eq!(c.settings().get(Setting::TankSize), 68_137);

        c.set_setting(Setting::MetricMode, 0).unwrap();
        assert_eq!(c.settings().get(Setting::TankSize), 18_000);
    }

    #[test]
    fn rejected_value_changes_nothing() {
        let mut c = computer(Settings::default());
        let err = c.set_setting(Setting::MetricMode, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingError>(),
            Some(SettingError::OutOfRange { .. })
        ));
        assert_eq!(c.settings(), &Settings::default());
    }

    #[test]
    fn injector_edit_rederives_fuel_factor() {
        let mut c = computer(Settings::default());
        c.set_setting(Setting::InjectorSize, 568).unwrap();
        let got = c.settings().get(Setting::MicrosPerQuantity);
        assert!((66_300_000..66_900_000).contains(&got), "{got}");
    }

    fn image_of(c: &FuelComputer) -> MemoryEeprom {
        let mut bytes = vec![0u8; IMAGE_LEN];
        c.storage().read(0, &mut bytes).unwrap();
        MemoryEeprom::from_bytes(bytes)
    }

    /// Power-cycle: a new computer over a copy of `c`'s image.
    fn reopen(c: &FuelComputer, overrides: Vec<(Setting, u32)>) -> FuelComputer {
        FuelComputer::builder()
            .with_storage(image_of(c))
            .with_overrides(overrides)
            .with_cycles_per_second(FAST_CPS)
            .build()
            .unwrap()
    }

    fn blank() -> FuelComputer {
        FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .with_cycles_per_second(FAST_CPS)
            .build()
            .unwrap()
    }

    #[test]
    fn edited_settings_survive_restart() {
        let mut c = blank();
        assert!(c.first_boot());
        c.set_setting(Setting::TankSize, 15_000).unwrap();

        let again = reopen(&c, Vec::new());
        assert!(!again.first_boot());
        assert_eq!(again.settings().get(Setting::TankSize), 15_000);
        assert_eq!(again.settings(), c.settings());
    }

    #[test]
    fn overrides_touch_only_what_they_name() {
        let mut c = blank();
        c.set_setting(Setting::TankSize, 15_000).unwrap();

        let again = reopen(&c, vec![(Setting::FuelCost, 2_000)]);
        assert_eq!(again.settings().get(Setting::TankSize), 15_000);
        assert_eq!(again.settings().get(Setting::FuelCost), 2_000);
        let stored = persist::load_settings(again.storage()).unwrap().into_settings();
        assert_eq!(&stored, again.settings());
    }

    #[test]
    fn unit_override_converts_stored_values() {
        let c = blank();
        let metric = reopen(&c, vec![(Setting::MetricMode, 1)]);
        assert!(metric.settings().metric());
        assert_eq!(metric.settings().get(Setting::TankSize), 68_137);

        // already metric: nothing to convert twice
        let again = reopen(&metric, vec![(Setting::MetricMode, 1)]);
        assert_eq!(again.settings().get(Setting::TankSize), 68_137);
    }

    #[test]
    fn injector_override_rederives_unless_pinned() {
        let c = blank();
        let derived = reopen(&c, vec![(Setting::InjectorSize, 568)]);
        let got = derived.settings().get(Setting::MicrosPerQuantity);
        assert!((66_300_000..66_900_000).contains(&got), "{got}");

        let pinned = reopen(
            &c,
            vec![(Setting::InjectorSize, 568), (Setting::MicrosPerQuantity, 5_000_000)],
        );
        assert_eq!(pinned.settings().get(Setting::MicrosPerQuantity), 5_000_000);
    }

    #[test]
    fn out_of_range_override_fails_the_build() {
        let err = FuelComputer::builder()
            .with_storage(MemoryEeprom::new(IMAGE_LEN))
            .with_overrides(vec![(Setting::InjectorCount, 300)])
            .build()
            .unwrap_err();
        assert!(err.downcast_ref::<SettingError>().is_some(), "{err}");
    }

    #[test]
    fn cycle_drains_raw_into_accumulators() {
        let mut s = Settings::default();
        s.set(Setting::VssPause, 0).unwrap();
        let mut c = computer(s);
        let cap = Arc::clone(c.capture());
        for k in 0..5u32 {
            cap.on_vss_edge(CycleTimestamp(k * 100));
        }
        let mut t = 0;
        let report = tick(&mut c, 10, &mut t).unwrap();
        assert_eq!(report.cycle, 1);
        assert!(report.awake);
        for id in [TripId::Instant, TripId::Tank, TripId::Current, TripId::Period] {
            assert_eq!(c.trips().get(id).vss_pulses, 5, "{id}");
            assert_eq!(c.trips().get(id).vss_cycles, 400, "{id}");
        }
        // nothing new: instant empties, accumulators hold
        tick(&mut c, 10, &mut t).unwrap();
        assert!(c.trips().get(TripId::Instant).is_empty());
        assert_eq!(c.trips().get(TripId::Tank).vss_pulses, 5);
        // the idle buffer saw the same pulses (no fuel flowing)
        assert_eq!(c.trips().get(TripId::IdleTank).vss_pulses, 5);
    }

    #[test]
    fn no_cycle_until_due() {
        let mut c = computer(Settings::default());
        let mut t = 0;
        assert_eq!(tick(&mut c, 9, &mut t), None);
        assert!(tick(&mut c, 1, &mut t).is_some());
    }

    #[test]
    fn speed_buckets_collect_instant_trips() {
        let mut s = Settings::default();
        s.set(Setting::VssPause, 0).unwrap();
        let mut c = computer(s);
        let cap = Arc::clone(c.capture());
        for k in 0..61u32 {
            cap.on_vss_edge(CycleTimestamp(k * 37));
        }
        let mut t = 0;
        let report = tick(&mut c, 10, &mut t).unwrap();
        // 61 pulses over 2220 cycles: about 50.6 mph
        assert_eq!(report.bucket, Some(5));
        assert_eq!(c.trips().get(TripId::FeVsSpeed(SpeedBucket::new(5).unwrap())).vss_pulses, 61);
        // stationary next cycle
        assert_eq!(tick(&mut c, 10, &mut t).unwrap().bucket, None);
    }

    #[test]
    fn fe_history_is_a_bounded_ring() {
        let mut s = Settings::default();
        s.set(Setting::FeVsTimePeriod, 1).unwrap();
        let mut c = computer(s);
        let mut t = 0;
        let mut samples = 0;
        for _ in 0..40 {
            if tick(&mut c, 10, &mut t).unwrap().fe_sample.is_some() {
                samples += 1;
            }
        }
        assert_eq!(samples, 20);
        assert_eq!(c.fe_history().count(), FE_HISTORY_LEN);
        // no fuel was measured
        assert!(c.fe_history().all(Fixed::is_overflow));
    }

    #[test]
    fn sleep_autosaves_and_restore_reloads() {
        let mut s = Settings::default();
        s.set(Setting::ActivityTimeout, 1).unwrap();
        let mut c = computer(s.clone());
        let tank = Trip {
            vss_pulses: 1_234,
            injector_open_cycles: 99_999,
            ..Trip::ZERO
        };
        c.trips_mut().get_mut(TripId::Tank).transfer(&tank);

        // one second of ticks without activity
        let mut t = 0;
        for _ in 0..3 {
            tick(&mut c, 10, &mut t);
        }
        assert!(!c.capture().is_awake());
        let (_, saved) = persist::load_trip(c.storage(), 0).unwrap().unwrap();
        assert_eq!(saved, tank);

        let mut store = MemoryEeprom::new(IMAGE_LEN);
        persist::save_trip(&mut store, 0, &tank, 7).unwrap();
        let restored = FuelComputer::builder()
            .with_storage(store)
            .with_settings(s)
            .with_restore(true)
            .build()
            .unwrap();
        assert_eq!(restored.trips().get(TripId::Tank), &tank);
        assert!(restored.trips().get(TripId::Current).is_empty());
    }

    #[test]
    fn wake_resets_current_trip() {
        let mut s = Settings::default();
        s.set(Setting::ActivityTimeout, 1).unwrap();
        let mut c = computer(s);
        let mut t = 0;
        for _ in 0..3 {
            tick(&mut c, 10, &mut t);
        }
        assert!(!c.capture().is_awake());
        c.trips_mut().get_mut(TripId::Current).vss_pulses = 50;
        c.trips_mut().get_mut(TripId::Tank).vss_pulses = 50;

        c.request_wake();
        let report = tick(&mut c, 10, &mut t).unwrap();
        assert!(report.awake);
        assert!(c.trips().get(TripId::Current).is_empty());
        assert_eq!(c.trips().get(TripId::Tank).vss_pulses, 50);
    }

    #[test]
    fn load_of_blank_slot_fails_closed() {
        let mut c = computer(Settings::default());
        c.trips_mut().get_mut(TripId::Current).vss_pulses = 3;
        assert!(!c.load_trip(5, TripId::Current).unwrap());
        assert!(c.trips().get(TripId::Current).is_empty());

        let err = c.save_trip(TripId::Tank, TRIP_SLOTS).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn catalog_runs_clean_on_every_trip() {
        for arith in [Arithmetic::Native, Arithmetic::Primitive] {
            let mut c = FuelComputer::builder()
                .with_storage(MemoryEeprom::new(IMAGE_LEN))
                .with_arithmetic(arith)
                .build()
                .unwrap();
            c.trips_mut().get_mut(TripId::Tank).injector_open_cycles = u64::MAX >> 8;
            assert_eq!(c.check_catalog(), vec![]);
        }
    }

    #[test]
    fn catalog_check_covers_helpers_and_maintenance() {
        for &program in Program::ALL {
            let (contexts, inputs) = check_plan(program);
            assert!(!contexts.is_empty() && !inputs.is_empty(), "{program} never runs");
        }
        assert_eq!(check_plan(Program::Divide).1, &HELPER_INPUTS);
        assert_eq!(check_plan(Program::FormatNumber).0, 0..5);
        assert_eq!(check_plan(Program::ConvertSetting).0, 0..6);
        assert_eq!(check_plan(Program::ReadSetting).0, 0..23);
        assert_eq!(check_plan(Program::FuelFactor).0, 0..1);
        assert_eq!(check_plan(Program::SpeedBucket).0, 0..27);
    }

    #[test]
    fn catalog_check_leaves_settings_alone() {
        let mut c = computer(Settings::default());
        c.set_setting(Setting::MetricMode, 1).unwrap();
        c.set_setting(Setting::MicrosPerQuantity, 5_000_000).unwrap();
        let before = c.settings().clone();
        assert_eq!(c.check_catalog(), vec![]);
        assert_eq!(c.settings(), &before);
    }

    #[test]
    fn display_formats_through_the_engine() {
        let mut c = computer(Settings::default());
        assert_eq!(c.display(Quantity::FuelEcon, TripId::Tank).unwrap(), format::OVERFLOW_TEXT);
        assert_eq!(c.display(Quantity::EngineRunTime, TripId::Tank).unwrap(), "00:00:00");
    }
}
