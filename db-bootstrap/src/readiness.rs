use std::time;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ConnectionTarget;
use crate::probe::{Probe, ProbeError};

/// How the readiness waiter paces and bounds its probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Fixed sleep between a failed probe and the next attempt.
    pub poll_interval: time::Duration,
    /// Give up once this much time has passed since the first probe. `None` waits forever.
    pub deadline: Option<time::Duration>,
    /// Abort on the first probe failure that waiting cannot fix, such as a rejected password.
    pub fail_on_misconfigured: bool,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: time::Duration::from_secs(2),
            deadline: None,
            fail_on_misconfigured: false,
        }
    }
}

/// The datastore accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Probes issued, including the successful one.
    pub attempts: u32,
    pub elapsed: time::Duration,
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("database was not ready after {attempts} attempts within {deadline:?}: {last_error}")]
    TimedOut {
        attempts: u32,
        deadline: time::Duration,
        last_error: ProbeError,
    },
    #[error("giving up on database after {attempts} attempts: {error}")]
    Misconfigured { attempts: u32, error: ProbeError },
}

/// Poll `target` with `probe` until it accepts a connection.
///
/// Every failed probe is followed by one sleep of `poll_interval`, cut short at the deadline.
/// Each probe is given whatever time is left before the deadline. Without a deadline this
/// only returns on success.
pub async fn wait_until_ready<P, C>(
    probe: &P,
    clock: &C,
    target: &ConnectionTarget,
    settings: &WaitSettings,
) -> Result<Ready, WaitError>
where
    P: Probe + ?Sized,
    C: Clock + ?Sized,
{
    info!(%target, "Waiting for database...");

    let started = clock.now();
    let remaining = |deadline: time::Duration| {
        deadline.saturating_sub(clock.now().duration_since(started))
    };
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        let budget = settings.deadline.map(remaining);
        let error = match probe.probe(target, budget).await {
            Ok(()) => {
                let elapsed = clock.now().duration_since(started);
                info!(attempts, elapsed_ms = elapsed.as_millis() as u64, "Database is ready");
                return Ok(Ready { attempts, elapsed });
            }
            Err(error) => error,
        };

        if error.is_transient() {
            debug!(attempts, %error, "database not ready yet");
        } else {
            warn!(attempts, %error, "database rejected the connection target");
            if settings.fail_on_misconfigured {
                return Err(WaitError::Misconfigured { attempts, error });
            }
        }

        let Some(deadline) = settings.deadline else {
            clock.sleep(settings.poll_interval).await;
            continue;
        };

        // Never sleep or probe past the deadline.
        let left = remaining(deadline);
        if !left.is_zero() {
            clock.sleep(settings.poll_interval.min(left)).await;
        }
        if remaining(deadline).is_zero() {
            return Err(WaitError::TimedOut {
                attempts,
                deadline,
                last_error: error,
            });
        }
    }
}
