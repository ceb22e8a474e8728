//! bbswitch-types: Shared data types for bbswitch.
//!
//! This crate contains pure data types (power states, sleep events, device
//! identifiers) shared across all bbswitch crates. It performs no I/O.

pub mod device;
pub mod power;
pub mod sleep;

// Re-export commonly used types at the crate root for convenience
pub use device::{AcpiHandle, BusAddress, INTEL_VENDOR_ID};
pub use power::{PciPowerState, PowerState};
pub use sleep::{SleepEvent, SleepPhase};
