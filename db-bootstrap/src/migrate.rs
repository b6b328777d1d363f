use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use crate::config::{ConnectionTarget, NonEmptyString};

/// Enumeration of errors raised while advancing the schema. None of them are retried.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("failed to start migration tool {program}: {error}")]
    Spawn { program: String, error: io::Error },
    #[error("migration tool exited with status {0}")]
    Exited(i32),
    #[error("migration tool was terminated by signal {0}")]
    Signaled(i32),
    #[error("could not connect to the database to migrate: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("failed to apply migrations from {path}: {error}")]
    Migrate { path: PathBuf, error: MigrateError },
}

impl MigrationError {
    /// The status the bootstrap process should exit with, propagating the tool's own where possible.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrationError::Spawn { error, .. } if error.kind() == io::ErrorKind::NotFound => 127,
            MigrationError::Spawn { .. } => 126,
            MigrationError::Exited(code) => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
            MigrationError::Signaled(signal) => u8::try_from(128 + signal).unwrap_or(1),
            MigrationError::Connect(_) | MigrationError::Migrate { .. } => 1,
        }
    }

    fn from_status(status: ExitStatus) -> Option<Self> {
        match (status.code(), status.signal()) {
            (Some(0), _) => None,
            (Some(code), _) => Some(MigrationError::Exited(code)),
            (None, Some(signal)) => Some(MigrationError::Signaled(signal)),
            (None, None) => Some(MigrationError::Exited(1)),
        }
    }
}

/// Brings persisted schema state to the version the service expects.
///
/// Implementations must be idempotent: an already current schema is a success.
#[async_trait]
pub trait SchemaAdvancer: Send + Sync {
    async fn advance(&self, target: &ConnectionTarget) -> Result<(), MigrationError>;

    /// Short human readable description for logs.
    fn describe(&self) -> String;
}

/// Runs an external migration tool, `alembic upgrade head` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAdvancer {
    program: String,
    args: Vec<String>,
}

impl CommandAdvancer {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    /// Split a whitespace separated command line into program and arguments.
    ///
    /// There is no shell quoting: `a "b c"` is three words. Wrap anything that needs quoting
    /// in a script and point the command at that.
    pub fn parse(command: &NonEmptyString) -> Self {
        let mut words = command.as_str().split_whitespace().map(str::to_owned);
        // NonEmptyString guarantees at least one word.
        let program = words.next().unwrap_or_default();

        Self {
            program,
            args: words.collect(),
        }
    }
}

#[async_trait]
impl SchemaAdvancer for CommandAdvancer {
    async fn advance(&self, target: &ConnectionTarget) -> Result<(), MigrationError> {
        // The tool writes straight to our stdout/stderr, its errors are never rewrapped.
        let status = Command::new(&self.program)
            .args(&self.args)
            .envs(target.env_vars())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|error| MigrationError::Spawn {
                program: self.program.clone(),
                error,
            })?;

        match MigrationError::from_status(status) {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Applies a directory of sqlx migrations through a one-connection pool.
#[derive(Debug, Clone)]
pub struct SqlxAdvancer {
    migrations_dir: PathBuf,
}

impl SqlxAdvancer {
    pub fn new(migrations_dir: PathBuf) -> Self {
        Self { migrations_dir }
    }
}

#[async_trait]
impl SchemaAdvancer for SqlxAdvancer {
    async fn advance(&self, target: &ConnectionTarget) -> Result<(), MigrationError> {
        let migrate_error = |error| MigrationError::Migrate {
            path: self.migrations_dir.clone(),
            error,
        };

        let migrator = Migrator::new(self.migrations_dir.as_path())
            .await
            .map_err(migrate_error)?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(target.connect_options())
            .await
            .map_err(MigrationError::Connect)?;

        info!(
            migrations = migrator.iter().count(),
            "applying pending sqlx migrations"
        );
        let result = migrator.run(&pool).await.map_err(migrate_error);
        pool.close().await;
        result
    }

    fn describe(&self) -> String {
        format!("sqlx migrations in {}", self.migrations_dir.display())
    }
}

/// For images whose schema is owned by someone else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvancer;

#[async_trait]
impl SchemaAdvancer for NoopAdvancer {
    async fn advance(&self, _target: &ConnectionTarget) -> Result<(), MigrationError> {
        info!("schema migrations disabled, skipping");
        Ok(())
    }

    fn describe(&self) -> String {
        "no migrations".to_owned()
    }
}
