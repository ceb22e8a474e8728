//! On/off state machine for the discrete GPU

use crate::acpi::AcpiEvaluator;
use crate::dsm;
use crate::error::Result;
use crate::locator::ManagedDevice;
use crate::pci::{PciFunction, PciFunctionExt, SavedBusConfig};
use bbswitch_types::{PciPowerState, PowerState};

/// What a transition request ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The device changed state
    Changed,
    /// The device was already in the requested state
    Unchanged,
    /// Power-down was refused because a driver is bound
    Refused { driver: String },
}

/// Drives power transitions of the managed device
///
/// State is never cached: every decision re-reads the device's first
/// configuration word, since firmware can switch the card behind our back.
pub struct PowerController<D, F> {
    device: ManagedDevice<D>,
    firmware: F,
    saved: Option<SavedBusConfig>,
}

impl<D, F> PowerController<D, F>
where
    D: PciFunction,
    F: AcpiEvaluator,
{
    pub fn new(device: ManagedDevice<D>, firmware: F) -> Self {
        Self {
            device,
            firmware,
            saved: None,
        }
    }

    pub fn device(&self) -> &ManagedDevice<D> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut ManagedDevice<D> {
        &mut self.device
    }

    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Whether a config snapshot from the last power-down is pending restore
    pub fn has_saved_config(&self) -> bool {
        self.saved.is_some()
    }

    /// Live power state of the card
    pub fn query_state(&self) -> PowerState {
        self.device.device().power_state()
    }

    /// Request `state`, dispatching to [`Self::power_on`] or [`Self::power_off`]
    pub fn apply(&mut self, state: PowerState) -> Result<Outcome> {
        match state {
            PowerState::On => self.power_on(),
            PowerState::Off => self.power_off(),
        }
    }

    /// Cut power to the card
    ///
    /// Bus state is only touched once the firmware call succeeded. If a bus
    /// step fails after that, the card is brought back up and the error is
    /// returned, so it never stays powered with decode disabled.
    pub fn power_off(&mut self) -> Result<Outcome> {
        if self.query_state() == PowerState::Off {
            return Ok(Outcome::Unchanged);
        }

        let address = self.device.address().clone();

        // powering down a device in use can lock up the host bus
        if let Some(driver) = self.device.bound_driver() {
            log::warn!(
                "device {} is in use by driver '{}', refusing OFF",
                address,
                driver
            );
            return Ok(Outcome::Refused { driver });
        }

        log::info!("disabling discrete graphics");

        let handle = self.device.firmware_handle().clone();
        if let Err(e) = dsm::power_off(&mut self.firmware, &handle) {
            log::warn!("ACPI call failed, the device is not disabled");
            return Err(e);
        }

        let device = self.device.device_mut();

        // without a snapshot the card could not be restored on power-on
        let saved = match device.save_state() {
            Ok(saved) => saved,
            Err(e) => {
                log::warn!("{}: failed to save config space, not disabling: {}", address, e);
                return Err(e.into());
            }
        };

        if let Err(e) = Self::shut_down(device) {
            log::warn!("{}: failed to power down, re-enabling: {}", address, e);
            Self::roll_back(device, &saved);
            return Err(e);
        }

        self.saved = Some(saved);
        Ok(Outcome::Changed)
    }

    fn shut_down(device: &mut D) -> Result<()> {
        device.clear_master()?;
        device.disable_device()?;
        device.set_power_state(PciPowerState::D3Hot)
    }

    /// Best effort return to a working D0 after a failed power-down
    fn roll_back(device: &mut D, saved: &SavedBusConfig) {
        let address = device.address().clone();
        if let Err(e) = device.restore_state(saved) {
            log::warn!("{}: failed to restore config space: {}", address, e);
        }
        if let Err(e) = device.enable_device() {
            log::warn!("{}: failed to enable device: {}", address, e);
        }
        if let Err(e) = device.set_master() {
            log::warn!("{}: failed to set bus master: {}", address, e);
        }
    }

    /// Bring the card back to D0 and restore its configuration
    pub fn power_on(&mut self) -> Result<Outcome> {
        if self.query_state() == PowerState::On {
            return Ok(Outcome::Unchanged);
        }

        let address = self.device.address().clone();
        log::info!("enabling discrete graphics");

        let handle = self.device.firmware_handle().clone();
        dsm::power_on(&mut self.firmware, &handle)?;

        let device = self.device.device_mut();

        if let Err(e) = device.set_power_state(PciPowerState::D0) {
            log::warn!("{}: failed to enter D0: {}", address, e);
        }
        match self.saved.take() {
            Some(saved) => {
                if let Err(e) = device.restore_state(&saved) {
                    log::warn!("{}: failed to restore config space: {}", address, e);
                }
            }
            None => log::error!("{}: no saved config space to restore, skipping", address),
        }
        if device.enable_device().is_err() {
            log::warn!("failed to enable {}", address);
        }
        if let Err(e) = device.set_master() {
            log::warn!("{}: failed to set bus master: {}", address, e);
        }

        Ok(Outcome::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BbswitchError;
    use crate::fake::{FakeFirmware, FakeGpu};
    use crate::pci::regs;
    use crate::AcpiObject;
    use bbswitch_types::AcpiHandle;

    fn controller(firmware: FakeFirmware) -> PowerController<FakeGpu, FakeFirmware> {
        let gpu = FakeGpu::nvidia("0000:01:00.0");
        let handle = AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP");
        PowerController::new(ManagedDevice::new(gpu, handle), firmware)
    }

    #[test]
    fn test_power_off_sequence() {
        let mut ctl = controller(FakeFirmware::optimus());
        assert_eq!(ctl.query_state(), PowerState::On);

        assert_eq!(ctl.power_off().unwrap(), Outcome::Changed);

        assert_eq!(ctl.query_state(), PowerState::Off);
        assert_eq!(ctl.firmware().calls.len(), 1);
        assert!(ctl.has_saved_config());
        assert_eq!(ctl.device().device().platform_calls, vec![PciPowerState::D3Hot]);
    }

    #[test]
    fn test_power_off_is_idempotent() {
        let mut ctl = controller(FakeFirmware::optimus());
        assert_eq!(ctl.power_off().unwrap(), Outcome::Changed);
        assert_eq!(ctl.power_off().unwrap(), Outcome::Unchanged);
        assert_eq!(ctl.firmware().calls.len(), 1);
        assert_eq!(ctl.device().device().platform_calls.len(), 1);
    }

    #[test]
    fn test_power_off_refused_with_driver_bound() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.device_mut().device_mut().driver = Some("nouveau".to_string());

        let outcome = ctl.power_off().unwrap();

        assert_eq!(outcome, Outcome::Refused { driver: "nouveau".to_string() });
        assert!(ctl.firmware().calls.is_empty());
        assert_eq!(ctl.query_state(), PowerState::On);
    }

    #[test]
    fn test_firmware_failure_leaves_bus_untouched() {
        let mut ctl = controller(FakeFirmware::failing("AE_NOT_FOUND"));
        let before = ctl.device().device().config;

        let err = ctl.power_off().unwrap_err();

        assert!(matches!(err, BbswitchError::Firmware(_)));
        assert_eq!(ctl.query_state(), PowerState::On);
        assert_eq!(ctl.device().device().config, before);
        assert!(!ctl.has_saved_config());
    }

    #[test]
    fn test_failed_snapshot_leaves_bus_untouched() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.device_mut().device_mut().readable_len = 16;

        let err = ctl.power_off().unwrap_err();

        assert!(matches!(err, BbswitchError::Io(_)));
        assert_eq!(ctl.query_state(), PowerState::On);
        let command = ctl.device().device().read_config_word(regs::COMMAND);
        assert_eq!(command, FakeGpu::INITIAL_COMMAND);
        assert!(!ctl.has_saved_config());
        assert!(ctl.device().device().platform_calls.is_empty());
    }

    #[test]
    fn test_missing_pm_capability_rolls_back() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.device_mut().device_mut().config[regs::STATUS as usize] = 0;

        let err = ctl.power_off().unwrap_err();

        assert!(matches!(err, BbswitchError::NoPowerManagement));
        let gpu = ctl.device().device();
        assert_eq!(ctl.query_state(), PowerState::On);
        assert_eq!(gpu.read_config_word(regs::COMMAND), FakeGpu::INITIAL_COMMAND);
        assert!(!ctl.has_saved_config());

        // the card is still usable, so a later power-on has nothing to do
        assert_eq!(ctl.power_on().unwrap(), Outcome::Unchanged);
        let command = ctl.device().device().read_config_word(regs::COMMAND);
        assert_eq!(command, FakeGpu::INITIAL_COMMAND);
    }

    #[test]
    fn test_rejected_config_write_fails_power_off() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.device_mut().device_mut().fail_writes = true;

        let err = ctl.power_off().unwrap_err();

        assert!(matches!(err, BbswitchError::Io(_)));
        assert_eq!(ctl.query_state(), PowerState::On);
        assert!(!ctl.has_saved_config());
        assert!(ctl.device().device().platform_calls.is_empty());
    }

    #[test]
    fn test_unsupported_function_aborts() {
        let mut ctl = controller(FakeFirmware::answering(AcpiObject::Integer(0x8000_0002)));
        let err = ctl.power_off().unwrap_err();
        assert!(matches!(err, BbswitchError::NotSupported));
        assert_eq!(ctl.query_state(), PowerState::On);
    }

    #[test]
    fn test_power_on_restores_config() {
        let mut ctl = controller(FakeFirmware::optimus());
        let original = ctl.device().device().config;
        ctl.power_off().unwrap();

        assert_eq!(ctl.power_on().unwrap(), Outcome::Changed);

        let gpu = ctl.device().device();
        assert_eq!(ctl.query_state(), PowerState::On);
        assert_eq!(gpu.config[0x10..0x14], original[0x10..0x14]);
        let command = gpu.read_config_word(regs::COMMAND);
        assert_eq!(command, FakeGpu::INITIAL_COMMAND);
        assert!(!ctl.has_saved_config());
        // power-on never needs the firmware
        assert_eq!(ctl.firmware().calls.len(), 1);
    }

    #[test]
    fn test_power_on_when_already_on() {
        let mut ctl = controller(FakeFirmware::optimus());
        assert_eq!(ctl.power_on().unwrap(), Outcome::Unchanged);
        assert!(ctl.device().device().platform_calls.is_empty());
    }

    #[test]
    fn test_power_on_without_snapshot_still_enables() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.device_mut().device_mut().powered = false;

        assert_eq!(ctl.power_on().unwrap(), Outcome::Changed);

        let gpu = ctl.device().device();
        assert_eq!(ctl.query_state(), PowerState::On);
        assert_eq!(gpu.read_config_word(regs::COMMAND), FakeGpu::INITIAL_COMMAND);
    }

    #[test]
    fn test_apply_dispatches() {
        let mut ctl = controller(FakeFirmware::optimus());
        ctl.apply(PowerState::Off).unwrap();
        assert_eq!(ctl.query_state(), PowerState::Off);
        ctl.apply(PowerState::On).unwrap();
        assert_eq!(ctl.query_state(), PowerState::On);
    }
}
