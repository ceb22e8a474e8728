//! PCI configuration space access and bus-level power operations
//!
//! Backends only provide raw config-space reads and writes through
//! [`PciFunction`]; every bus operation the power controller needs (state
//! save/restore, bus mastering, decode enable, PM capability transitions) is
//! derived from those in [`PciFunctionExt`].

use crate::error::{BbswitchError, Result};
use bbswitch_types::{AcpiHandle, BusAddress, PciPowerState, PowerState};
use std::io;
use std::time::Duration;

/// Standard PCI configuration-space register offsets and bits
pub mod regs {
    /// Vendor ID (16-bit, offset 0x00), followed by the device ID
    pub const VENDOR_ID: u16 = 0x00;
    /// Command register (16-bit, offset 0x04)
    pub const COMMAND: u16 = 0x04;
    /// Status register (16-bit, offset 0x06)
    pub const STATUS: u16 = 0x06;
    /// Capabilities pointer (8-bit, offset 0x34)
    pub const CAPABILITIES_PTR: u16 = 0x34;

    /// Command bit 0: respond to I/O space accesses
    pub const COMMAND_IO: u16 = 1 << 0;
    /// Command bit 1: respond to memory space accesses
    pub const COMMAND_MEMORY: u16 = 1 << 1;
    /// Command bit 2: bus master enable
    pub const COMMAND_MASTER: u16 = 1 << 2;

    /// Status bit 4: capabilities list present
    pub const STATUS_CAPABILITIES_LIST: u16 = 1 << 4;

    /// Power management capability ID
    pub const CAP_ID_PM: u8 = 0x01;
    /// PMCSR offset within the PM capability
    pub const PM_CTRL: u16 = 0x04;
    /// PowerState field of PMCSR
    pub const PM_CTRL_STATE_MASK: u16 = 0x0003;

    /// Size of the standard type 0 header
    pub const HEADER_SIZE: usize = 64;
    /// Size of the conventional configuration space
    pub const CONFIG_SPACE_SIZE: usize = 256;
}

/// Upper bound on capability list entries, guards against looping lists
const CAPABILITY_TTL: usize = 48;

/// Settle time after leaving D3hot
const D3_RECOVERY_DELAY: Duration = Duration::from_millis(10);

/// A single PCI function as seen by the core
///
/// Implemented by platform backends (sysfs on Linux) and by test fakes.
pub trait PciFunction {
    /// Bus topology identifier, used for logging and the status line
    fn address(&self) -> &BusAddress;

    /// PCI vendor ID as enumerated
    fn vendor(&self) -> u16;

    /// 24-bit class code (base class, subclass, programming interface)
    fn class(&self) -> u32;

    /// ACPI node associated with this function, if the firmware describes one
    fn firmware_handle(&self) -> Option<AcpiHandle>;

    /// Name of the driver currently bound to the function, if any
    ///
    /// Queried live on every call.
    fn bound_driver(&self) -> Option<String>;

    /// Read raw config space starting at `offset`, returning the number of bytes read
    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<usize>;

    /// Write raw config space starting at `offset`
    fn write_config(&mut self, offset: u16, data: &[u8]) -> io::Result<()>;

    /// Platform assistance around a bus power transition
    ///
    /// Called before the PMCSR write when entering D0 and after it when
    /// entering any lower state.
    fn platform_power(&mut self, _state: PciPowerState) -> io::Result<()> {
        Ok(())
    }
}

/// Snapshot of a function's configuration space taken before power-down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBusConfig {
    bytes: Vec<u8>,
}

impl SavedBusConfig {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Dword `index` of the saved header
    pub fn dword(&self, index: usize) -> Option<u32> {
        let start = index * 4;
        let chunk = self.bytes.get(start..start + 4)?;
        Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }
}

/// Entry of the capability linked list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCapability {
    pub id: u8,
    pub offset: u8,
}

/// Iterator over the capability linked list of a function
pub struct CapabilityIter<'a, T: ?Sized> {
    function: &'a T,
    next_offset: u8,
    remaining: usize,
}

impl<'a, T: PciFunction + ?Sized> Iterator for CapabilityIter<'a, T> {
    type Item = RawCapability;

    fn next(&mut self) -> Option<Self::Item> {
        // dword-aligned, and never inside the standard header
        let offset = self.next_offset & 0xFC;
        if offset < 0x40 || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let id = self.function.read_config_byte(offset as u16);
        if id == 0xFF {
            return None;
        }
        self.next_offset = self.function.read_config_byte(offset as u16 + 1);

        Some(RawCapability { id, offset })
    }
}

/// Bus operations derived from raw config access
///
/// Reads that fail are reported as all-ones, the value a PCI read returns
/// from a function that does not answer.
pub trait PciFunctionExt: PciFunction {
    fn read_config_dword(&self, offset: u16) -> u32 {
        let mut buf = [0u8; 4];
        match self.read_config(offset, &mut buf) {
            Ok(4) => u32::from_le_bytes(buf),
            Ok(n) => {
                log::debug!("{}: short config read at {:#x} ({} bytes)", self.address(), offset, n);
                u32::MAX
            }
            Err(e) => {
                log::debug!("{}: config read at {:#x} failed: {}", self.address(), offset, e);
                u32::MAX
            }
        }
    }

    fn read_config_word(&self, offset: u16) -> u16 {
        let mut buf = [0u8; 2];
        match self.read_config(offset, &mut buf) {
            Ok(2) => u16::from_le_bytes(buf),
            _ => u16::MAX,
        }
    }

    fn read_config_byte(&self, offset: u16) -> u8 {
        let mut buf = [0u8; 1];
        match self.read_config(offset, &mut buf) {
            Ok(1) => buf[0],
            _ => u8::MAX,
        }
    }

    fn write_config_word(&mut self, offset: u16, value: u16) -> io::Result<()> {
        self.write_config(offset, &value.to_le_bytes())
    }

    fn write_config_dword(&mut self, offset: u16, value: u32) -> io::Result<()> {
        self.write_config(offset, &value.to_le_bytes())
    }

    /// Live power state derived from the vendor/device word
    fn power_state(&self) -> PowerState {
        PowerState::from_config_word(self.read_config_dword(regs::VENDOR_ID))
    }

    /// Walk the capability list; empty if the function advertises none
    fn capabilities(&self) -> CapabilityIter<'_, Self> {
        let status = self.read_config_word(regs::STATUS);
        let next_offset = if status != u16::MAX && status & regs::STATUS_CAPABILITIES_LIST != 0 {
            self.read_config_byte(regs::CAPABILITIES_PTR)
        } else {
            0
        };

        CapabilityIter {
            function: self,
            next_offset,
            remaining: CAPABILITY_TTL,
        }
    }

    fn find_capability(&self, id: u8) -> Option<u8> {
        self.capabilities().find(|cap| cap.id == id).map(|cap| cap.offset)
    }

    /// Snapshot config space (full 256 bytes when the backend allows it)
    fn save_state(&self) -> io::Result<SavedBusConfig> {
        let mut bytes = vec![0u8; regs::CONFIG_SPACE_SIZE];
        let read = self.read_config(0, &mut bytes)?;
        if read < regs::HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("only {} bytes of config space readable", read),
            ));
        }
        bytes.truncate(read);
        Ok(SavedBusConfig::from_bytes(bytes))
    }

    /// Write the saved header back, highest dword first, skipping unchanged dwords
    ///
    /// Dword 0 holds the read-only vendor/device IDs and is never written.
    fn restore_state(&mut self, saved: &SavedBusConfig) -> io::Result<()> {
        for index in (1..regs::HEADER_SIZE / 4).rev() {
            let Some(value) = saved.dword(index) else {
                continue;
            };
            let offset = (index * 4) as u16;
            if self.read_config_dword(offset) != value {
                self.write_config_dword(offset, value)?;
            }
        }
        Ok(())
    }

    fn update_command(&mut self, set: u16, clear: u16) -> io::Result<()> {
        let command = self.read_config_word(regs::COMMAND);
        let updated = (command & !clear) | set;
        if updated != command {
            self.write_config_word(regs::COMMAND, updated)?;
        }
        Ok(())
    }

    fn set_master(&mut self) -> io::Result<()> {
        self.update_command(regs::COMMAND_MASTER, 0)
    }

    fn clear_master(&mut self) -> io::Result<()> {
        self.update_command(0, regs::COMMAND_MASTER)
    }

    /// Stop the function decoding I/O and memory accesses
    fn disable_device(&mut self) -> io::Result<()> {
        self.update_command(0, regs::COMMAND_IO | regs::COMMAND_MEMORY)
    }

    fn enable_device(&mut self) -> io::Result<()> {
        self.update_command(regs::COMMAND_IO | regs::COMMAND_MEMORY, 0)
    }

    /// Move the function to `state` through its PM capability
    fn set_power_state(&mut self, state: PciPowerState) -> Result<()> {
        if state == PciPowerState::D0 {
            self.platform_power(state)?;
        }

        let cap = self
            .find_capability(regs::CAP_ID_PM)
            .ok_or(BbswitchError::NoPowerManagement)?;
        let pmcsr_offset = cap as u16 + regs::PM_CTRL;
        let pmcsr = self.read_config_word(pmcsr_offset);
        let current = PciPowerState::from_bits(pmcsr);

        if current != state {
            let updated = (pmcsr & !regs::PM_CTRL_STATE_MASK) | state.bits();
            self.write_config_word(pmcsr_offset, updated)?;
            if current == PciPowerState::D3Hot || state == PciPowerState::D3Hot {
                std::thread::sleep(D3_RECOVERY_DELAY);
            }
            log::debug!("{}: {} -> {}", self.address(), current, state);
        }

        if state != PciPowerState::D0 {
            self.platform_power(state)?;
        }
        Ok(())
    }
}

impl<T: PciFunction + ?Sized> PciFunctionExt for T {}
