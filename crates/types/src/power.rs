//! Power state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observable power state of the discrete card
///
/// Never stored: always derived from the first configuration word of the
/// device, which reads as all-ones once the card has lost power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Derive the state from the vendor/device configuration word
    pub fn from_config_word(word: u32) -> Self {
        if word == u32::MAX {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "ON",
            PowerState::Off => "OFF",
        }
    }

    /// Lowercase form used in startup log lines
    pub fn as_lower_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(PowerState::On),
            "off" => Ok(PowerState::Off),
            other => Err(format!("Unknown power state: {}", other)),
        }
    }
}

/// PCI bus power states (PMCSR bits 1:0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PciPowerState {
    D0,
    D1,
    D2,
    D3Hot,
}

impl PciPowerState {
    /// Raw PowerState field value in the PMCSR register
    pub fn bits(&self) -> u16 {
        match self {
            PciPowerState::D0 => 0,
            PciPowerState::D1 => 1,
            PciPowerState::D2 => 2,
            PciPowerState::D3Hot => 3,
        }
    }

    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => PciPowerState::D0,
            1 => PciPowerState::D1,
            2 => PciPowerState::D2,
            _ => PciPowerState::D3Hot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PciPowerState::D0 => "D0",
            PciPowerState::D1 => "D1",
            PciPowerState::D2 => "D2",
            PciPowerState::D3Hot => "D3hot",
        }
    }
}

impl fmt::Display for PciPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ones_is_off() {
        assert_eq!(PowerState::from_config_word(0xFFFF_FFFF), PowerState::Off);
    }

    #[test]
    fn test_any_other_word_is_on() {
        for word in [0, 0x0DE1_10DE, 0xFFFF_FFFE, 0x7FFF_FFFF, 0xFFFF_0000] {
            assert_eq!(PowerState::from_config_word(word), PowerState::On);
        }
    }

    #[test]
    fn test_power_state_parse() {
        assert_eq!("ON".parse::<PowerState>().unwrap(), PowerState::On);
        assert_eq!(" off\n".parse::<PowerState>().unwrap(), PowerState::Off);
        assert!("maybe".parse::<PowerState>().is_err());
    }

    #[test]
    fn test_power_state_serde() {
        let json = serde_json::to_string(&PowerState::Off).unwrap();
        assert_eq!(json, "\"off\"");
    }

    #[test]
    fn test_pci_power_state_bits() {
        assert_eq!(PciPowerState::D3Hot.bits(), 3);
        assert_eq!(PciPowerState::from_bits(0x0103), PciPowerState::D3Hot);
        assert_eq!(PciPowerState::from_bits(0x0100), PciPowerState::D0);
    }
}
