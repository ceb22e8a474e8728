//! Device identification types

use serde::{Deserialize, Serialize};
use std::fmt;

/// PCI vendor ID of Intel, the integrated graphics vendor on Optimus machines
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// Bus topology identifier such as `0000:01:00.0`
///
/// Opaque to the core; used for logging and the status line only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusAddress(String);

impl BusAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute path of a device node in the ACPI namespace, e.g. `\_SB_.PCI0.PEG0.PEGP`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcpiHandle(String);

impl AcpiHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Full path of a method below this node
    pub fn method_path(&self, method: &str) -> String {
        format!("{}.{}", self.0, method)
    }
}

impl fmt::Display for AcpiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
