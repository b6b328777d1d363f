use std::time;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use thiserror::Error;

use crate::config::ConnectionTarget;

/// Enumeration of reasons a readiness probe can fail.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("database is not accepting connections: {0}")]
    Unreachable(String),
    #[error("probe did not complete within {0:?}")]
    TimedOut(time::Duration),
    #[error("database rejected the connection target: {0}")]
    Misconfigured(String),
}

impl ProbeError {
    /// Whether waiting longer could plausibly make the probe succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProbeError::Misconfigured(_))
    }
}

impl From<sqlx::Error> for ProbeError {
    fn from(error: sqlx::Error) -> Self {
        let misconfigured = match &error {
            sqlx::Error::Configuration(_) => true,
            sqlx::Error::Database(db) => db
                .code()
                .map(|code| is_misconfigured_sqlstate(&code))
                .unwrap_or(false),
            _ => false,
        };

        if misconfigured {
            ProbeError::Misconfigured(error.to_string())
        } else {
            ProbeError::Unreachable(error.to_string())
        }
    }
}

/// SQLSTATE codes that will not clear up by waiting: class 28 covers bad roles and passwords,
/// 3D000 an unknown database.
pub fn is_misconfigured_sqlstate(code: &str) -> bool {
    code.starts_with("28") || code == "3D000"
}

/// A lightweight liveness check against the datastore.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `budget` is the time left before the readiness deadline, if there is one.
    /// Implementations must not run past it.
    async fn probe(
        &self,
        target: &ConnectionTarget,
        budget: Option<time::Duration>,
    ) -> Result<(), ProbeError>;
}

/// Probe that opens one PostgreSQL connection, runs `SELECT 1` and closes it.
#[derive(Debug, Clone, Copy)]
pub struct PgProbe {
    timeout: time::Duration,
}

impl PgProbe {
    pub fn new(timeout: time::Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for PgProbe {
    async fn probe(
        &self,
        target: &ConnectionTarget,
        budget: Option<time::Duration>,
    ) -> Result<(), ProbeError> {
        let options = target.connect_options();
        let timeout = budget.map_or(self.timeout, |budget| budget.min(self.timeout));

        match tokio::time::timeout(timeout, select_one(&options)).await {
            Ok(result) => result.map_err(ProbeError::from),
            Err(_) => Err(ProbeError::TimedOut(timeout)),
        }
    }
}

async fn select_one(options: &PgConnectOptions) -> Result<(), sqlx::Error> {
    let mut conn = PgConnection::connect_with(options).await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await
}
