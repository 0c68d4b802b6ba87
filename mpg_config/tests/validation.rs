use mpg_config::{ArithmeticMode, Milli, Units, load_toml};
use rstest::rstest;

const FULL: &str = r#"
[vehicle]
units = "metric"
pulses_per_distance = 6214
tank_size = "68.1"
vss_pause_ms = 2
crank_revs = 2
min_good_rpm = 100
micros_per_quantity = 35204800

[injectors]
count = 4
size_ml_min = 240
settle_us = 500
sys_pressure = 400
ref_pressure = "300"
duty_ceiling = "0.85"

[behavior]
activity_timeout_s = 60
wakeup_reset_current = false
window_filter = true
fe_vs_time_period_s = 10
autosave_active = true
autosave_idle = false
bar_low_speed = 40
bar_speed_quantum = "8"
fuel_cost = "1.859"

[engine]
cycles_per_second = 312500
tick_cycles = 256
arithmetic = "primitive"
track_idle = false

[storage]
image = "mpg.eeprom"

[logging]
level = "debug"
rotation = "daily"
"#;

#[test]
fn full_document_parses_and_validates() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.vehicle.units, Some(Units::Metric));
    assert_eq!(cfg.vehicle.tank_size, Some(Milli(68_100)));
    assert_eq!(cfg.vehicle.micros_per_quantity, Some(35_204_800));
    assert_eq!(cfg.injectors.count, Some(4));
    assert_eq!(cfg.injectors.sys_pressure, Some(Milli(400_000)));
    assert_eq!(cfg.injectors.duty_ceiling, Some(Milli(850)));
    assert_eq!(cfg.behavior.autosave_idle, Some(false));
    assert_eq!(cfg.behavior.fuel_cost, Some(Milli(1_859)));
    assert_eq!(cfg.engine.arithmetic, ArithmeticMode::Primitive);
    // omitted field keeps its default
    assert!(cfg.engine.restore_trips);
    assert_eq!(cfg.storage.image.as_deref(), Some("mpg.eeprom"));
}

#[rstest]
#[case("[vehicle]\npulses_per_distance = 0", "vehicle.pulses_per_distance must be in 1..=65535")]
#[case("[vehicle]\npulses_per_distance = 70000", "vehicle.pulses_per_distance must be in 1..=65535")]
#[case("[vehicle]\ntank_size = 20000", "vehicle.tank_size must be in")]
#[case("[vehicle]\ntank_size = \"16777.216\"", "vehicle.tank_size must be in")]
#[case("[vehicle]\ncrank_revs = 0", "vehicle.crank_revs must be in 1..=255")]
#[case("[vehicle]\nmin_good_rpm = 0", "vehicle.min_good_rpm must be in 1..=65535")]
#[case("[vehicle]\nmicros_per_quantity = 0", "vehicle.micros_per_quantity must be > 0")]
#[case("[injectors]\ncount = 0", "injectors.count must be in 1..=255")]
#[case("[injectors]\nsize_ml_min = 0", "injectors.size_ml_min must be in 1..=65535")]
#[case("[injectors]\nref_pressure = 0", "injectors.ref_pressure must be > 0")]
#[case("[injectors]\nduty_ceiling = \"1.0\"", "injectors.duty_ceiling must be in (0.0, 1.0)")]
#[case("[behavior]\nactivity_timeout_s = 0", "behavior.activity_timeout_s must be in 1..=65535")]
#[case("[behavior]\nbar_speed_quantum = 0", "behavior.bar_speed_quantum must be > 0")]
#[case("[behavior]\nfuel_cost = 70", "behavior.fuel_cost must be in [0.0, 65.535]")]
#[case("[engine]\ncycles_per_second = 0", "engine.cycles_per_second must be > 0")]
#[case("[engine]\ntick_cycles = 100", "engine.tick_cycles must be a power of two >= 2")]
#[case("[engine]\ntick_cycles = 1", "engine.tick_cycles must be a power of two >= 2")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of never|daily|hourly")]
fn rejects_out_of_range(#[case] toml: &str, #[case] want: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(want), "{err}");
}

#[test]
fn unknown_enum_value_fails_to_parse() {
    assert!(load_toml("[vehicle]\nunits = \"imperial\"").is_err());
    assert!(load_toml("[engine]\narithmetic = \"float\"").is_err());
}

#[test]
fn fe_vs_time_zero_disables() {
    let cfg = load_toml("[behavior]\nfe_vs_time_period_s = 0").expect("parse TOML");
    cfg.validate().expect("zero period is allowed");
}

#[rstest]
#[case("[vehicle]\ntank_size = 18.5")]
#[case("[vehicle]\ntank_size = -1")]
#[case("[injectors]\nduty_ceiling = \"0.8125\"")]
#[case("[behavior]\nfuel_cost = \"3,79\"")]
fn decimal_fields_refuse_floats_and_junk(#[case] toml: &str) {
    assert!(load_toml(toml).is_err(), "{toml} should not parse");
}

#[test]
fn absent_fields_stay_unset() {
    let cfg = load_toml("[vehicle]\ntank_size = \"15\"").expect("parse TOML");
    assert_eq!(cfg.vehicle.tank_size, Some(Milli(15_000)));
    assert!(cfg.vehicle.units.is_none());
    assert!(cfg.injectors.count.is_none());
    assert!(cfg.behavior.window_filter.is_none());
}
