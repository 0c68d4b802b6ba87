//! Scaled-integer settings table.
//!
//! Every setting has a stable logical index, a bit width and a default. Programs read
//! settings through `LdSetting*` opcodes; the only program that writes them is the
//! unit conversion (and the fuel-factor derivation), through `StSetting*`.

use crate::error::SettingError;

macro_rules! settings_table {
    ($( $variant:ident = $idx:literal, $name:literal, $bits:literal, $default:literal; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Setting {
            $( $variant = $idx, )*
        }

        impl Setting {
            pub const ALL: [Self; SETTING_COUNT] = [ $( Self::$variant, )* ];

            #[must_use]
            pub const fn name(self) -> &'static str {
                match self { $( Self::$variant => $name, )* }
            }

            #[must_use]
            pub const fn bits(self) -> u8 {
                match self { $( Self::$variant => $bits, )* }
            }

            #[must_use]
            pub const fn default_value(self) -> u32 {
                match self { $( Self::$variant => $default, )* }
            }
        }
    };
}

/// Number of settings.
pub const SETTING_COUNT: usize = 23;

settings_table! {
    MetricMode = 0, "metric_mode", 1, 0;
    SysFuelPressure = 1, "sys_fuel_pressure", 32, 58015;
    RefFuelPressure = 2, "ref_fuel_pressure", 32, 58015;
    InjectorCount = 3, "injector_count", 8, 6;
    InjectorSize = 4, "injector_size", 16, 284;
    MicrosPerQuantity = 5, "micros_per_quantity", 32, 133_262_651;
    InjectorSettle = 6, "injector_settle_us", 16, 550;
    PulsesPerDistance = 7, "pulses_per_distance", 16, 10000;
    VssPause = 8, "vss_pause_ms", 8, 2;
    CrankRevs = 9, "crank_revs", 8, 2;
    MinGoodRpm = 10, "min_good_rpm", 16, 100;
    TankSize = 11, "tank_size", 24, 18000;
    InjectorDutyCeiling = 12, "injector_duty_ceiling", 10, 819;
    ActivityTimeout = 13, "activity_timeout_s", 16, 120;
    WakeupResetCurrent = 14, "wakeup_reset_current", 1, 1;
    WindowFilter = 15, "window_filter", 1, 1;
    FeVsTimePeriod = 16, "fe_vs_time_period_s", 16, 5;
    AutoSaveActive = 17, "autosave_active", 1, 1;
    AutoSaveIdle = 18, "autosave_idle", 1, 1;
    BarLowSpeed = 19, "bar_low_speed", 24, 25000;
    BarSpeedQuantum = 20, "bar_speed_quantum", 24, 5000;
    FuelCost = 21, "fuel_cost", 16, 3799;
    Scratchpad = 22, "scratchpad", 32, 0;
}

impl Setting {
    /// Largest value representable in this setting's width.
    #[must_use]
    pub const fn max_value(self) -> u32 {
        match self.bits() {
            32 => u32::MAX,
            b => (1u32 << b) - 1,
        }
    }

    /// Changing any of these re-derives microseconds-per-quantity.
    #[must_use]
    pub const fn affects_fuel_factor(self) -> bool {
        matches!(
            self,
            Self::SysFuelPressure | Self::RefFuelPressure | Self::InjectorCount | Self::InjectorSize
        )
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl TryFrom<u8> for Setting {
    type Error = SettingError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(v))
            .copied()
            .ok_or(SettingError::UnknownIndex(v))
    }
}

impl core::fmt::Display for Setting {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Unit conversion table ────────────────────────────────────────────────────

/// Conversion numbers; a factor is selected by index and its partner is `index ^ 1`.
pub const CONVERSION_NUMBERS: [u64; 4] = [1_000_000, 1_609_344, 1_000_000_000, 3_785_411_784];

const NUMER_DISTANCE: u8 = 0;
const DENOM_DISTANCE: u8 = 1;
const NUMER_VOLUME: u8 = 2;
const DENOM_VOLUME: u8 = 3;

/// One unit-dependent setting and the factor applied when leaving imperial units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub setting: Setting,
    factor: u8,
}

impl Conversion {
    /// Numerator applied when converting imperial to metric.
    #[must_use]
    pub const fn numer(self) -> u64 {
        CONVERSION_NUMBERS[self.factor as usize]
    }

    #[must_use]
    pub const fn denom(self) -> u64 {
        CONVERSION_NUMBERS[(self.factor ^ 1) as usize]
    }
}

/// Settings rewritten in place when the unit system changes, walked by context index.
pub const CONVERSIONS: [Conversion; 6] = [
    // pulses per mile -> pulses per km
    Conversion { setting: Setting::PulsesPerDistance, factor: NUMER_DISTANCE },
    // microseconds per gallon -> per litre
    Conversion { setting: Setting::MicrosPerQuantity, factor: NUMER_VOLUME },
    // gallons -> litres
    Conversion { setting: Setting::TankSize, factor: DENOM_VOLUME },
    // mph -> km/h
    Conversion { setting: Setting::BarLowSpeed, factor: DENOM_DISTANCE },
    Conversion { setting: Setting::BarSpeedQuantum, factor: DENOM_DISTANCE },
    // price per gallon -> per litre
    Conversion { setting: Setting::FuelCost, factor: NUMER_VOLUME },
];

// ── Settings store ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: [u32; SETTING_COUNT],
}

impl Default for Settings {
    fn default() -> Self {
        let mut values = [0u32; SETTING_COUNT];
        for s in Setting::ALL {
            values[s as usize] = s.default_value();
        }
        Self { values }
    }
}

impl Settings {
    #[inline]
    #[must_use]
    pub const fn get(&self, s: Setting) -> u32 {
        self.values[s as usize]
    }

    /// Editor path: rejects values wider than the setting.
    pub fn set(&mut self, s: Setting, value: u32) -> Result<(), SettingError> {
        if value > s.max_value() {
            return Err(SettingError::OutOfRange {
                setting: s,
                value,
                bits: s.bits(),
            });
        }
        self.values[s as usize] = value;
        Ok(())
    }

    /// Program path: values wider than the setting saturate.
    pub fn store_saturating(&mut self, s: Setting, value: u64) {
        let max = s.max_value();
        let v = u32::try_from(value).unwrap_or(u32::MAX).min(max);
        if u64::from(v) != value {
            tracing::warn!(setting = s.name(), value, stored = v, "setting saturated");
        }
        self.values[s as usize] = v;
    }

    #[inline]
    #[must_use]
    pub const fn metric(&self) -> bool {
        self.values[Setting::MetricMode as usize] != 0
    }

    #[inline]
    #[must_use]
    pub const fn flag(&self, s: Setting) -> bool {
        self.values[s as usize] != 0
    }

    /// `(setting, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Setting, u32)> + '_ {
        Setting::ALL.into_iter().map(|s| (s, self.get(s)))
    }
}
