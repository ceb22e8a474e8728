//! bbswitch-core: Discrete GPU power control.
//!
//! This crate contains the hardware-independent logic: locating the discrete
//! card, the Optimus `_DSM` call, the on/off state machine and suspend/resume
//! coordination. Platform access goes through the [`PciFunction`] and
//! [`AcpiEvaluator`] traits.

pub mod acpi;
pub mod control;
pub mod controller;
pub mod dsm;
pub mod error;
pub mod locator;
pub mod pci;
pub mod suspend;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use acpi::{AcpiEvaluator, AcpiObject};
pub use control::{parse_command, Bbswitch, Command, COMMAND_LIMIT};
pub use controller::{Outcome, PowerController};
pub use error::{BbswitchError, Result};
pub use locator::{is_display_class, locate, ManagedDevice};
pub use pci::{PciFunction, PciFunctionExt, SavedBusConfig};
pub use suspend::SuspendCoordinator;

// Re-export types used in trait signatures for convenience
pub use bbswitch_types::{AcpiHandle, BusAddress, PciPowerState, PowerState, SleepEvent};
