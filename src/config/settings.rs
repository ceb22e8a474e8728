//! Daemon configuration

use anyhow::{Context, Result};
use bbswitch_types::{PowerState, INTEL_VENDOR_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Default path of the control socket
pub const DEFAULT_SOCKET_PATH: &str = "/run/bbswitch.sock";

/// Daemon-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    /// Where sysfs is mounted
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// The `acpi_call` interface file
    #[serde(default = "default_acpi_call_path")]
    pub acpi_call_path: PathBuf,
    /// Control socket location
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Vendor ID of the integrated GPU, never selected for control
    #[serde(default = "default_integrated_vendor")]
    pub integrated_vendor: u16,
    /// State to switch the card to when the daemon starts
    #[serde(default)]
    pub load_state: Option<PowerState>,
    /// State to switch the card to when the daemon stops
    #[serde(default)]
    pub unload_state: Option<PowerState>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(bbswitch_linux::DEFAULT_SYSFS_ROOT)
}

fn default_acpi_call_path() -> PathBuf {
    PathBuf::from(bbswitch_linux::DEFAULT_ACPI_CALL_PATH)
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_integrated_vendor() -> u16 {
    INTEL_VENDOR_ID
}

impl DaemonConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "bbswitch", "bbswitch")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sysfs_root: default_sysfs_root(),
            acpi_call_path: default_acpi_call_path(),
            socket_path: default_socket_path(),
            integrated_vendor: INTEL_VENDOR_ID,
            load_state: None,
            unload_state: None,
        }
    }
}
