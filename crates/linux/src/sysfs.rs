//! PCI functions exposed through sysfs

use anyhow::{Context, Result};
use bbswitch_core::PciFunction;
use bbswitch_types::{AcpiHandle, BusAddress, PciPowerState};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Default mount point of sysfs
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// A PCI function below `/sys/bus/pci/devices`
#[derive(Debug, Clone)]
pub struct SysfsPciDevice {
    path: PathBuf,
    address: BusAddress,
    vendor: u16,
    class: u32,
}

impl SysfsPciDevice {
    /// Open the function at `path`, reading its vendor and class
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid PCI device path {}", path.display()))?;

        let vendor = read_hex_file(&path.join("vendor"))? as u16;
        let class = read_hex_file(&path.join("class"))?;

        Ok(Self {
            path: path.to_path_buf(),
            address: BusAddress::new(name),
            vendor,
            class,
        })
    }

    fn config_path(&self) -> PathBuf {
        self.path.join("config")
    }

    /// Whether runtime PM has put the function to sleep
    ///
    /// The kernel resumes a suspended function for every config space
    /// access, which would power the card back up.
    fn runtime_suspended(&self) -> bool {
        fs::read_to_string(self.path.join("power/runtime_status"))
            .map(|status| status.trim() == "suspended")
            .unwrap_or(false)
    }
}

/// Read a hexadecimal value from a sysfs file
fn read_hex_file(path: &Path) -> Result<u32> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let trimmed = content.trim().trim_start_matches("0x");
    u32::from_str_radix(trimmed, 16)
        .with_context(|| format!("Failed to parse hex value from {}", path.display()))
}

/// Enumerate every PCI function under `sysfs_root`, in bus address order
///
/// Entries that cannot be read are logged and skipped.
pub fn enumerate(sysfs_root: &Path) -> Result<Vec<SysfsPciDevice>> {
    let devices_dir = sysfs_root.join("bus/pci/devices");
    let mut paths: Vec<PathBuf> = fs::read_dir(&devices_dir)
        .with_context(|| format!("Failed to list {}", devices_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    let mut devices = Vec::with_capacity(paths.len());
    for path in paths {
        match SysfsPciDevice::open(&path) {
            Ok(device) => devices.push(device),
            Err(e) => log::debug!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(devices)
}

impl PciFunction for SysfsPciDevice {
    fn address(&self) -> &BusAddress {
        &self.address
    }

    fn vendor(&self) -> u16 {
        self.vendor
    }

    fn class(&self) -> u32 {
        self.class
    }

    fn firmware_handle(&self) -> Option<AcpiHandle> {
        let content = fs::read_to_string(self.path.join("firmware_node/path")).ok()?;
        let path = content.trim();
        if path.is_empty() {
            None
        } else {
            Some(AcpiHandle::new(path))
        }
    }

    fn bound_driver(&self) -> Option<String> {
        let target = fs::read_link(self.path.join("driver")).ok()?;
        target.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<usize> {
        if self.runtime_suspended() {
            buf.fill(0xFF);
            return Ok(buf.len());
        }

        let file = fs::File::open(self.config_path())?;
        let mut total = 0;
        while total < buf.len() {
            let read = file.read_at(&mut buf[total..], offset as u64 + total as u64)?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }

    fn write_config(&mut self, offset: u16, data: &[u8]) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(self.config_path())?;
        file.write_all_at(data, offset as u64)
    }

    /// Hand the function to runtime PM: forced on for D0, `auto` once it
    /// reached a low-power state so the platform may remove power.
    fn platform_power(&mut self, state: PciPowerState) -> io::Result<()> {
        let control = self.path.join("power/control");
        if !control.exists() {
            return Ok(());
        }
        let value = match state {
            PciPowerState::D0 => "on",
            _ => "auto",
        };
        fs::write(&control, value)
    }
}
