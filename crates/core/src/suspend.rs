//! Suspend/resume coordination
//!
//! Firmware suspend routines may save the card's config space incorrectly
//! while it is powered down, so a card that is off gets switched on before
//! sleep and switched off again after resume.

use crate::acpi::AcpiEvaluator;
use crate::controller::PowerController;
use crate::pci::PciFunction;
use bbswitch_types::{PowerState, SleepEvent, SleepPhase};

/// Tracks the pre-sleep state of the card across one sleep cycle
#[derive(Debug, Default)]
pub struct SuspendCoordinator {
    was_disabled_before_suspend: bool,
}

impl SuspendCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value recorded by the last prepare event
    pub fn was_disabled_before_suspend(&self) -> bool {
        self.was_disabled_before_suspend
    }

    /// React to a sleep lifecycle notification
    ///
    /// Transition failures are logged and swallowed; a notification never fails.
    pub fn handle<D, F>(&mut self, event: SleepEvent, controller: &mut PowerController<D, F>)
    where
        D: PciFunction,
        F: AcpiEvaluator,
    {
        match event.phase() {
            SleepPhase::PrepareSleep => {
                self.was_disabled_before_suspend = controller.query_state() == PowerState::Off;
                log::info!(
                    "{}: discrete card is {} before sleep",
                    event,
                    controller.query_state().as_lower_str()
                );
                if self.was_disabled_before_suspend {
                    if let Err(e) = controller.power_on() {
                        log::warn!("{}: failed to enable discrete graphics: {}", event, e);
                    }
                }
            }
            SleepPhase::PostResume => {
                if self.was_disabled_before_suspend {
                    if let Err(e) = controller.power_off() {
                        log::warn!("{}: failed to disable discrete graphics: {}", event, e);
                    }
                }
            }
            // an image restore is always followed by a post event doing the work
            SleepPhase::RestorePrepare => {
                log::debug!("{}: nothing to do", event);
            }
            SleepPhase::Other => {
                log::debug!("ignoring sleep event {}", event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeFirmware, FakeGpu};
    use crate::locator::ManagedDevice;
    use bbswitch_types::AcpiHandle;

    fn controller() -> PowerController<FakeGpu, FakeFirmware> {
        let gpu = FakeGpu::nvidia("0000:01:00.0");
        let handle = AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP");
        PowerController::new(ManagedDevice::new(gpu, handle), FakeFirmware::optimus())
    }

    #[test]
    fn test_card_off_is_cycled_around_suspend() {
        let mut ctl = controller();
        ctl.power_off().unwrap();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::SuspendPrepare, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::On);
        assert!(coordinator.was_disabled_before_suspend());

        coordinator.handle(SleepEvent::PostSuspend, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::Off);
        assert_eq!(ctl.firmware().calls.len(), 2);
    }

    #[test]
    fn test_card_on_is_left_alone() {
        let mut ctl = controller();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::HibernationPrepare, &mut ctl);
        assert!(!coordinator.was_disabled_before_suspend());
        coordinator.handle(SleepEvent::PostHibernation, &mut ctl);

        assert_eq!(ctl.query_state(), PowerState::On);
        assert!(ctl.firmware().calls.is_empty());
        assert!(ctl.device().device().platform_calls.is_empty());
    }

    #[test]
    fn test_restore_prepare_is_a_no_op() {
        let mut ctl = controller();
        ctl.power_off().unwrap();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::RestorePrepare, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::Off);

        let mut ctl = controller();
        coordinator.handle(SleepEvent::RestorePrepare, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::On);
    }

    #[test]
    fn test_image_restore_cycle() {
        let mut ctl = controller();
        ctl.power_off().unwrap();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::HibernationPrepare, &mut ctl);
        coordinator.handle(SleepEvent::RestorePrepare, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::On);
        coordinator.handle(SleepEvent::PostRestore, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::Off);
    }

    #[test]
    fn test_unknown_event_ignored() {
        let mut ctl = controller();
        ctl.power_off().unwrap();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::Unknown, &mut ctl);
        assert_eq!(ctl.query_state(), PowerState::Off);
        assert!(!coordinator.was_disabled_before_suspend());
    }

    #[test]
    fn test_driver_bound_after_resume_keeps_card_on() {
        let mut ctl = controller();
        ctl.power_off().unwrap();
        let mut coordinator = SuspendCoordinator::new();

        coordinator.handle(SleepEvent::SuspendPrepare, &mut ctl);
        ctl.device_mut().device_mut().driver = Some("nvidia".to_string());
        coordinator.handle(SleepEvent::PostSuspend, &mut ctl);

        assert_eq!(ctl.query_state(), PowerState::On);
    }
}
