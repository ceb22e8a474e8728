//! Error taxonomy for discrete GPU control

use thiserror::Error;

/// Errors raised by the core
///
/// None of these are fatal to a running daemon except [`BbswitchError::NotFound`],
/// which means there is nothing to control.
#[derive(Debug, Error)]
pub enum BbswitchError {
    #[error("No discrete VGA device found")]
    NotFound,

    /// The firmware method could not be evaluated or answered with an
    /// undecodable object
    #[error("firmware method failed: {0}")]
    Firmware(String),

    /// The firmware reports the Optimus function as unknown
    #[error("Optimus function not found")]
    NotSupported,

    #[error("Input too large ({0})")]
    CommandTooLarge(usize),

    #[error("device has no PCI power management capability")]
    NoPowerManagement,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BbswitchError>;
