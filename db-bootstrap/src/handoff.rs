use std::convert::Infallible;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("no service command given, usage: db-bootstrap [--] <command> [args...]")]
    MissingCommand,
    #[error("failed to exec {program:?}: {error}")]
    Exec { program: OsString, error: io::Error },
}

impl HandoffError {
    pub fn exit_code(&self) -> u8 {
        match self {
            HandoffError::MissingCommand => 64,
            HandoffError::Exec { error, .. } if error.kind() == io::ErrorKind::NotFound => 127,
            HandoffError::Exec { .. } => 126,
        }
    }
}

/// The argument vector of the long-running service, forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    argv: Vec<OsString>,
}

impl ServiceCommand {
    /// Build from our own arguments, program name excluded. One leading `--` separator is dropped.
    pub fn from_args<I>(args: I) -> Result<Self, HandoffError>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let mut argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if argv.first().is_some_and(|first| first == "--") {
            argv.remove(0);
        }

        if argv.is_empty() {
            return Err(HandoffError::MissingCommand);
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &OsString {
        &self.argv[0]
    }

    pub fn args(&self) -> &[OsString] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }
}

/// Terminal phase: turn this process into the service.
///
/// The success type is uninhabited, so nothing after a successful handoff can run.
pub trait Handoff: Send + Sync {
    fn handoff(&self, command: &ServiceCommand) -> Result<Infallible, HandoffError>;
}

/// Replaces the process image in place with `execvp`, keeping our PID.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecHandoff;

impl Handoff for ExecHandoff {
    fn handoff(&self, command: &ServiceCommand) -> Result<Infallible, HandoffError> {
        let error = Command::new(command.program())
            .args(command.args())
            .exec();

        Err(HandoffError::Exec {
            program: command.program().clone(),
            error,
        })
    }
}
