//! bbswitch-linux: Linux backends for bbswitch.
//!
//! PCI functions are reached through sysfs and ACPI methods through the
//! `acpi_call` kernel module.

mod acpi_call;
mod sysfs;

pub use acpi_call::{format_request, parse_response, AcpiCall, DEFAULT_ACPI_CALL_PATH};
pub use sysfs::{enumerate, SysfsPciDevice, DEFAULT_SYSFS_ROOT};

use anyhow::Result;
use bbswitch_core::ManagedDevice;
use std::path::Path;

/// Enumerate sysfs and select the discrete GPU
pub fn locate_discrete(
    sysfs_root: &Path,
    integrated_vendor: u16,
) -> Result<ManagedDevice<SysfsPciDevice>> {
    let devices = enumerate(sysfs_root)?;
    Ok(bbswitch_core::locate(devices, integrated_vendor)?)
}
