use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use sqlx::postgres::PgConnectOptions;

use crate::migrate::{CommandAdvancer, NoopAdvancer, SchemaAdvancer, SqlxAdvancer};
use crate::readiness::WaitSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "DB_HOST")]
    pub db_host: NonEmptyString,

    #[envconfig(from = "DB_PORT")]
    pub db_port: u16,

    #[envconfig(from = "DB_USER")]
    pub db_user: NonEmptyString,

    #[envconfig(from = "DB_PASS")]
    pub db_pass: Option<String>,

    #[envconfig(from = "DB_NAME")]
    pub db_name: NonEmptyString,

    #[envconfig(from = "BOOTSTRAP_POLL_INTERVAL", default = "2000")]
    pub poll_interval: NonZeroEnvMsDuration,

    #[envconfig(from = "BOOTSTRAP_PROBE_TIMEOUT", default = "5000")]
    pub probe_timeout: NonZeroEnvMsDuration,

    /// Upper bound on the readiness wait. Unset means wait forever.
    #[envconfig(from = "BOOTSTRAP_DEADLINE")]
    pub deadline: Option<EnvMsDuration>,

    #[envconfig(from = "BOOTSTRAP_FAIL_ON_MISCONFIGURED", default = "false")]
    pub fail_on_misconfigured: bool,

    #[envconfig(from = "BOOTSTRAP_MIGRATOR", default = "command")]
    pub migrator: MigratorKind,

    /// Program and arguments split on whitespace. Quotes are not interpreted.
    #[envconfig(from = "BOOTSTRAP_MIGRATE_COMMAND", default = "alembic upgrade head")]
    pub migrate_command: NonEmptyString,

    #[envconfig(from = "BOOTSTRAP_MIGRATIONS_DIR", default = "./migrations")]
    pub migrations_dir: PathBuf,

    /// The port the service will listen on. Declared only, never bound here.
    #[envconfig(from = "SERVICE_PORT", default = "8000")]
    pub service_port: u16,
}

impl Config {
    /// Build the immutable datastore target handed to every phase.
    pub fn connection_target(&self) -> ConnectionTarget {
        ConnectionTarget {
            host: self.db_host.as_str().to_owned(),
            port: self.db_port,
            user: self.db_user.as_str().to_owned(),
            password: self.db_pass.clone().filter(|p| !p.is_empty()),
            database: self.db_name.as_str().to_owned(),
        }
    }

    pub fn wait_settings(&self) -> WaitSettings {
        WaitSettings {
            poll_interval: self.poll_interval.0,
            deadline: self.deadline.map(|d| d.0),
            fail_on_misconfigured: self.fail_on_misconfigured,
        }
    }

    /// Produce the schema advancer selected by `BOOTSTRAP_MIGRATOR`.
    pub fn schema_advancer(&self) -> Box<dyn SchemaAdvancer> {
        match self.migrator {
            MigratorKind::Command => Box::new(CommandAdvancer::parse(&self.migrate_command)),
            MigratorKind::Sqlx => Box::new(SqlxAdvancer::new(self.migrations_dir.clone())),
            MigratorKind::None => Box::new(NoopAdvancer),
        }
    }
}

/// Where and as whom to reach the datastore. Built once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl ConnectionTarget {
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    /// Variables exported to external migration tools, mirroring the ones we were configured with.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("DB_HOST", self.host.clone()),
            ("DB_PORT", self.port.to_string()),
            ("DB_USER", self.user.clone()),
            ("DB_NAME", self.database.clone()),
        ];
        if let Some(password) = &self.password {
            vars.push(("DB_PASS", password.clone()));
        }
        vars
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratorKind {
    Command,
    Sqlx,
    None,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseMigratorKindError(String);

impl fmt::Display for ParseMigratorKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown migrator {:?}, expected one of: command, sqlx, none",
            self.0
        )
    }
}

impl FromStr for MigratorKind {
    type Err = ParseMigratorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(MigratorKind::Command),
            "sqlx" => Ok(MigratorKind::Sqlx),
            "none" => Ok(MigratorKind::None),
            _ => Err(ParseMigratorKindError(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a duration in milliseconds")
    }
}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// Like `EnvMsDuration`, but zero is rejected. A zero poll interval would spin on the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonZeroEnvMsDuration(pub time::Duration);

impl FromStr for NonZeroEnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<EnvMsDuration>()? {
            EnvMsDuration(duration) if duration.is_zero() => Err(ParseEnvMsDurationError),
            EnvMsDuration(duration) => Ok(NonZeroEnvMsDuration(duration)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl fmt::Display for StringIsEmptyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value must not be empty")
    }
}

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
