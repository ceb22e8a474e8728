//! Discrete GPU discovery

use crate::error::{BbswitchError, Result};
use crate::pci::PciFunction;
use bbswitch_types::{AcpiHandle, BusAddress};

/// Display controller base class
pub const PCI_BASE_CLASS_DISPLAY: u32 = 0x03;
/// VGA compatible controller subclass
pub const PCI_SUBCLASS_DISPLAY_VGA: u32 = 0x00;
/// 3D controller subclass, used by most render-only Optimus GPUs
pub const PCI_SUBCLASS_DISPLAY_3D: u32 = 0x02;

/// The discrete GPU under control together with its ACPI node
#[derive(Debug)]
pub struct ManagedDevice<D> {
    device: D,
    handle: AcpiHandle,
    vendor: u16,
}

impl<D: PciFunction> ManagedDevice<D> {
    pub fn new(device: D, handle: AcpiHandle) -> Self {
        let vendor = device.vendor();
        Self {
            device,
            handle,
            vendor,
        }
    }

    pub fn address(&self) -> &BusAddress {
        self.device.address()
    }

    pub fn firmware_handle(&self) -> &AcpiHandle {
        &self.handle
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor
    }

    /// Driver currently attached to the device, read live
    pub fn bound_driver(&self) -> Option<String> {
        self.device.bound_driver()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

/// Whether a class code names a VGA or 3D display controller
pub fn is_display_class(class: u32) -> bool {
    let base = (class >> 16) & 0xFF;
    let sub = (class >> 8) & 0xFF;
    base == PCI_BASE_CLASS_DISPLAY
        && (sub == PCI_SUBCLASS_DISPLAY_VGA || sub == PCI_SUBCLASS_DISPLAY_3D)
}

/// Select the managed device among enumerated PCI functions
///
/// Functions that are not display controllers, have no ACPI node, or belong
/// to `integrated_vendor` are skipped. When several functions qualify the
/// last one enumerated is kept.
pub fn locate<D, I>(devices: I, integrated_vendor: u16) -> Result<ManagedDevice<D>>
where
    D: PciFunction,
    I: IntoIterator<Item = D>,
{
    let mut selected: Option<ManagedDevice<D>> = None;

    for device in devices {
        if !is_display_class(device.class()) {
            continue;
        }

        let Some(handle) = device.firmware_handle() else {
            log::debug!("{}: no ACPI handle, skipping", device.address());
            continue;
        };

        if device.vendor() == integrated_vendor {
            log::debug!(
                "{}: integrated graphics (vendor {:04x}), skipping",
                device.address(),
                device.vendor()
            );
            continue;
        }

        log::info!("Found discrete VGA device {}: {}", device.address(), handle);
        if let Some(previous) = &selected {
            log::warn!(
                "Multiple discrete VGA devices, {} replaces {}",
                device.address(),
                previous.address()
            );
        }
        selected = Some(ManagedDevice::new(device, handle));
    }

    selected.ok_or_else(|| {
        log::error!("No discrete VGA device found");
        BbswitchError::NotFound
    })
}
