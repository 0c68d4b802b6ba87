#![no_main]
use libfuzzer_sys::fuzz_target;
use mpg_core::FuelComputer;
use mpg_core::persist::IMAGE_LEN;
use mpg_hardware::MemoryEeprom;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    let Ok(cfg) = toml::from_str::<mpg_config::Config>(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // A validated config must always yield a working computer.
    let mut computer = FuelComputer::builder()
        .with_config(&cfg)
        .with_storage(MemoryEeprom::new(IMAGE_LEN))
        .build()
        .unwrap_or_else(|e| panic!("validated config rejected: {e:?}"));
    let _ = computer.apply_derived();
});
