//! In-memory PCI function and firmware used by the unit tests

use crate::acpi::{AcpiEvaluator, AcpiObject};
use crate::error::{BbswitchError, Result};
use crate::pci::{regs, PciFunction};
use bbswitch_types::{AcpiHandle, BusAddress, PciPowerState};
use std::io;

/// A display function with a 256-byte config space
///
/// Loses power when its PMCSR is set to D3hot and comes back with reset
/// command/BAR registers when the platform brings it to D0.
#[derive(Debug, Clone)]
pub struct FakeGpu {
    pub address: BusAddress,
    pub vendor: u16,
    pub class: u32,
    pub handle: Option<AcpiHandle>,
    pub driver: Option<String>,
    pub config: [u8; regs::CONFIG_SPACE_SIZE],
    pub powered: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub readable_len: usize,
    pub platform_calls: Vec<PciPowerState>,
}

impl FakeGpu {
    pub const PM_CAP_OFFSET: u8 = 0x60;
    const MSI_CAP_OFFSET: u8 = 0x68;
    pub const INITIAL_COMMAND: u16 = regs::COMMAND_IO | regs::COMMAND_MEMORY | regs::COMMAND_MASTER;
    const BAR0: u32 = 0xF200_0000;

    pub fn new(address: &str, vendor: u16, device: u16, class: u32) -> Self {
        let mut config = [0u8; regs::CONFIG_SPACE_SIZE];
        config[0..2].copy_from_slice(&vendor.to_le_bytes());
        config[2..4].copy_from_slice(&device.to_le_bytes());
        config[4..6].copy_from_slice(&Self::INITIAL_COMMAND.to_le_bytes());
        config[6..8].copy_from_slice(&regs::STATUS_CAPABILITIES_LIST.to_le_bytes());
        config[0x09] = (class & 0xFF) as u8;
        config[0x0A] = ((class >> 8) & 0xFF) as u8;
        config[0x0B] = ((class >> 16) & 0xFF) as u8;
        config[0x10..0x14].copy_from_slice(&Self::BAR0.to_le_bytes());
        config[regs::CAPABILITIES_PTR as usize] = Self::PM_CAP_OFFSET;

        let pm = Self::PM_CAP_OFFSET as usize;
        config[pm] = regs::CAP_ID_PM;
        config[pm + 1] = Self::MSI_CAP_OFFSET;
        config[pm + 2] = 0x03;
        config[pm + 4] = 0x08;

        let msi = Self::MSI_CAP_OFFSET as usize;
        config[msi] = 0x05;
        config[msi + 1] = 0x00;

        Self {
            address: BusAddress::new(address),
            vendor,
            class,
            handle: None,
            driver: None,
            config,
            powered: true,
            fail_reads: false,
            fail_writes: false,
            readable_len: regs::CONFIG_SPACE_SIZE,
            platform_calls: Vec::new(),
        }
    }

    pub fn nvidia(address: &str) -> Self {
        Self::new(address, 0x10DE, 0x0DF4, 0x03_00_00).with_handle("\\_SB_.PCI0.PEG0.PEGP")
    }

    pub fn intel(address: &str) -> Self {
        Self::new(address, 0x8086, 0x0166, 0x03_00_00).with_handle("\\_SB_.PCI0.GFX0")
    }

    pub fn with_handle(mut self, path: &str) -> Self {
        self.handle = Some(AcpiHandle::new(path));
        self
    }

    fn pmcsr_offset() -> usize {
        Self::PM_CAP_OFFSET as usize + regs::PM_CTRL as usize
    }

    fn power_up(&mut self) {
        self.powered = true;
        self.config[4..6].copy_from_slice(&0u16.to_le_bytes());
        self.config[0x10..0x14].copy_from_slice(&0u32.to_le_bytes());
        let pmcsr = Self::pmcsr_offset();
        self.config[pmcsr] &= !(regs::PM_CTRL_STATE_MASK as u8);
    }
}

impl PciFunction for FakeGpu {
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
        self.handle.clone()
    }

    fn bound_driver(&self) -> Option<String> {
        self.driver.clone()
    }

    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read refused"));
        }
        let start = offset as usize;
        let available = self.readable_len.saturating_sub(start);
        let len = buf.len().min(available);
        if self.powered {
            buf[..len].copy_from_slice(&self.config[start..start + len]);
        } else {
            buf[..len].fill(0xFF);
        }
        Ok(len)
    }

    fn write_config(&mut self, offset: u16, data: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write refused"));
        }
        if !self.powered {
            return Ok(());
        }
        let start = offset as usize;
        let end = (start + data.len()).min(regs::CONFIG_SPACE_SIZE);
        self.config[start..end].copy_from_slice(&data[..end - start]);

        let pmcsr = Self::pmcsr_offset();
        if (start..end).contains(&pmcsr)
            && PciPowerState::from_bits(self.config[pmcsr] as u16) == PciPowerState::D3Hot
        {
            self.powered = false;
        }
        Ok(())
    }

    fn platform_power(&mut self, state: PciPowerState) -> io::Result<()> {
        self.platform_calls.push(state);
        if state == PciPowerState::D0 && !self.powered {
            self.power_up();
        }
        Ok(())
    }
}

/// A recorded `evaluate` call
#[derive(Debug, Clone, PartialEq)]
pub struct FirmwareCall {
    pub handle: AcpiHandle,
    pub method: String,
    pub args: Vec<AcpiObject>,
}

/// Firmware answering every evaluation the same way
#[derive(Debug, Clone)]
pub struct FakeFirmware {
    pub response: std::result::Result<AcpiObject, String>,
    pub calls: Vec<FirmwareCall>,
}

impl FakeFirmware {
    pub fn answering(response: AcpiObject) -> Self {
        Self {
            response: Ok(response),
            calls: Vec::new(),
        }
    }

    pub fn failing(diagnostic: &str) -> Self {
        Self {
            response: Err(diagnostic.to_string()),
            calls: Vec::new(),
        }
    }

    /// Firmware that accepts the Optimus power-off request
    pub fn optimus() -> Self {
        Self::answering(AcpiObject::Buffer(vec![0x01, 0x00, 0x00, 0x00]))
    }
}

impl AcpiEvaluator for FakeFirmware {
    fn evaluate(
        &mut self,
        handle: &AcpiHandle,
        method: &str,
        args: &[AcpiObject],
    ) -> Result<AcpiObject> {
        self.calls.push(FirmwareCall {
            handle: handle.clone(),
            method: method.to_string(),
            args: args.to_vec(),
        });
        self.response.clone().map_err(BbswitchError::Firmware)
    }
}
