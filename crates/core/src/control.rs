//! Control surface and process-wide context
//!
//! The control surface is a tiny text channel: writes carry `ON` or `OFF`,
//! reads return `<bus-address> <ON|OFF>`.

use crate::acpi::AcpiEvaluator;
use crate::controller::{Outcome, PowerController};
use crate::error::{BbswitchError, Result};
use crate::locator::ManagedDevice;
use crate::pci::PciFunction;
use crate::suspend::SuspendCoordinator;
use bbswitch_types::{PowerState, SleepEvent};

/// Writes of this many bytes or more are rejected
pub const COMMAND_LIMIT: usize = 8;

/// A recognized control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
}

impl Command {
    pub fn target(&self) -> PowerState {
        match self {
            Command::On => PowerState::On,
            Command::Off => PowerState::Off,
        }
    }
}

/// Parse a control write
///
/// Only the leading bytes are compared, so `OFFX` still means `OFF`.
/// Unrecognized content is accepted and yields `None`.
pub fn parse_command(input: &[u8]) -> Result<Option<Command>> {
    if input.len() >= COMMAND_LIMIT {
        log::error!("Input too large ({})", input.len());
        return Err(BbswitchError::CommandTooLarge(input.len()));
    }

    if input.starts_with(b"OFF") {
        Ok(Some(Command::Off))
    } else if input.starts_with(b"ON") {
        Ok(Some(Command::On))
    } else {
        Ok(None)
    }
}

/// Everything the process needs to control the card
///
/// Owns the single managed device (through the power controller) and the
/// suspend memo. Entry points take `&mut self`; callers that can be reached
/// from several tasks must serialize access around the whole context.
pub struct Bbswitch<D, F> {
    controller: PowerController<D, F>,
    coordinator: SuspendCoordinator,
}

impl<D, F> Bbswitch<D, F>
where
    D: PciFunction,
    F: AcpiEvaluator,
{
    pub fn new(device: ManagedDevice<D>, firmware: F) -> Self {
        let controller = PowerController::new(device, firmware);
        log::info!(
            "Discrete card {} is {}",
            controller.device().address(),
            controller.query_state().as_lower_str()
        );
        Self {
            controller,
            coordinator: SuspendCoordinator::new(),
        }
    }

    pub fn controller(&self) -> &PowerController<D, F> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PowerController<D, F> {
        &mut self.controller
    }

    pub fn coordinator(&self) -> &SuspendCoordinator {
        &self.coordinator
    }

    pub fn query_state(&self) -> PowerState {
        self.controller.query_state()
    }

    /// Handle a control write, returning the number of bytes consumed
    ///
    /// Transition failures are logged, not returned: the next read reports
    /// the real state.
    pub fn write_command(&mut self, input: &[u8]) -> Result<usize> {
        if let Some(command) = parse_command(input)? {
            self.request(command.target());
        }
        Ok(input.len())
    }

    /// Apply a state request, logging failures
    pub fn request(&mut self, state: PowerState) -> Option<Outcome> {
        match self.controller.apply(state) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("switching discrete graphics {} failed: {}", state, e);
                None
            }
        }
    }

    /// Status line, e.g. `0000:01:00.0 ON`
    pub fn read_status(&self) -> String {
        format!("{} {}\n", self.controller.device().address(), self.query_state())
    }

    pub fn notify_sleep(&mut self, event: SleepEvent) {
        self.coordinator.handle(event, &mut self.controller);
    }
}
