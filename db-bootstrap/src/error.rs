use thiserror::Error;

use crate::handoff::HandoffError;
use crate::migrate::MigrationError;
use crate::readiness::WaitError;

/// Exit status for configuration errors, `EX_CONFIG` from sysexits.h.
pub const EXIT_CONFIG: u8 = 78;

/// Enumeration of everything that can stop the bootstrap before the service starts.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Config(_) => EXIT_CONFIG,
            BootstrapError::Wait(_) => 1,
            BootstrapError::Migration(error) => error.exit_code(),
            BootstrapError::Handoff(error) => error.exit_code(),
        }
    }
}
