//! Host-side stand-ins for the fuel computer's hardware.
//!
//! - `MemoryEeprom` / `FileEeprom`: byte-addressed non-volatile stores
//! - `SimulatedTimer`: free-running counter the cycle clock extends
//! - `DriveSimulator`: replays a steady drive as timestamped interrupt calls
pub mod eeprom;
pub mod error;
pub mod sim;

pub use eeprom::{FileEeprom, MemoryEeprom};
pub use error::HwError;
pub use sim::{DriveProfile, DriveSimulator, SimStats, SimulatedTimer};
