//! Non-volatile image layout: the settings block followed by the saved trip slots.
//!
//! ```text
//! 0x000  u32 signature | 23 x u32 settings (big-endian)
//! 0x060  10 x 37-byte trip slots
//! ```

use mpg_traits::NonVolatile;

use crate::error::EngineError;
use crate::settings::{SETTING_COUNT, Setting, Settings};
use crate::trip::{TRIP_IMAGE_LEN, Trip};

/// Bumped whenever the settings table layout changes.
pub const SETTINGS_SIGNATURE: u32 = 0x4D50_4701;
pub const SETTINGS_BASE: usize = 0;
pub const SETTINGS_LEN: usize = 4 + 4 * SETTING_COUNT;
pub const TRIP_BASE: usize = SETTINGS_BASE + SETTINGS_LEN;
pub const TRIP_SLOTS: usize = 10;
/// Size of a complete image; file-backed stores are created at this length.
pub const IMAGE_LEN: usize = 1024;

const _: () = assert!(TRIP_BASE + TRIP_SLOTS * TRIP_IMAGE_LEN <= IMAGE_LEN);

fn storage(e: impl core::fmt::Display) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn slot_addr(slot: usize) -> Result<usize, EngineError> {
    if slot >= TRIP_SLOTS {
        return Err(EngineError::SlotOutOfRange {
            slot,
            max: TRIP_SLOTS,
        });
    }
    Ok(TRIP_BASE + slot * TRIP_IMAGE_LEN)
}

/// Outcome of reading the settings block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsImage {
    Stored(Settings),
    /// Signature missing or a value out of range: defaults were substituted.
    Defaulted(Settings),
}

impl SettingsImage {
    #[must_use]
    pub fn into_settings(self) -> Settings {
        match self {
            Self::Stored(s) | Self::Defaulted(s) => s,
        }
    }
}

pub fn load_settings(store: &dyn NonVolatile) -> Result<SettingsImage, EngineError> {
    let sig = store.read_u32_be(SETTINGS_BASE).map_err(storage)?;
    if sig != SETTINGS_SIGNATURE {
        tracing::info!(found = sig, "no settings signature, using defaults");
        return Ok(SettingsImage::Defaulted(Settings::default()));
    }
    let mut settings = Settings::default();
    for s in Setting::ALL {
        let v = store
            .read_u32_be(SETTINGS_BASE + 4 + 4 * s as usize)
            .map_err(storage)?;
        if let Err(e) = settings.set(s, v) {
            tracing::warn!(error = %e, "stored setting out of range, using defaults");
            return Ok(SettingsImage::Defaulted(Settings::default()));
        }
    }
    Ok(SettingsImage::Stored(settings))
}

pub fn save_settings(store: &mut dyn NonVolatile, settings: &Settings) -> Result<(), EngineError> {
    let mut image = [0u8; SETTINGS_LEN];
    image[..4].copy_from_slice(&SETTINGS_SIGNATURE.to_be_bytes());
    for (s, v) in settings.iter() {
        let at = 4 + 4 * s as usize;
        image[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }
    store.write(SETTINGS_BASE, &image).map_err(storage)
}

pub fn save_trip(
    store: &mut dyn NonVolatile,
    slot: usize,
    trip: &Trip,
    timestamp: u32,
) -> Result<(), EngineError> {
    let addr = slot_addr(slot)?;
    store.write(addr, &trip.encode(timestamp)).map_err(storage)
}

/// `None` when the slot holds no valid image.
pub fn load_trip(store: &dyn NonVolatile, slot: usize) -> Result<Option<(u32, Trip)>, EngineError> {
    let addr = slot_addr(slot)?;
    let mut image = [0u8; TRIP_IMAGE_LEN];
    store.read(addr, &mut image).map_err(storage)?;
    Ok(Trip::decode(&image))
}
