use std::convert::Infallible;
use std::fmt;

use tracing::{error, info};

use crate::clock::Clock;
use crate::config::ConnectionTarget;
use crate::error::BootstrapError;
use crate::handoff::{Handoff, ServiceCommand};
use crate::migrate::SchemaAdvancer;
use crate::probe::Probe;
use crate::readiness::{wait_until_ready, WaitError, WaitSettings};

/// Where the bootstrap currently is. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    WaitingDb,
    Ready,
    Migrating,
    Migrated,
    HandedOff,
    FatalTimeout,
    FatalMisconfigured,
    FatalMigration,
    FatalHandoff,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::HandedOff
                | Phase::FatalTimeout
                | Phase::FatalMisconfigured
                | Phase::FatalMigration
                | Phase::FatalHandoff
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::WaitingDb => "waiting_db",
            Phase::Ready => "ready",
            Phase::Migrating => "migrating",
            Phase::Migrated => "migrated",
            Phase::HandedOff => "handed_off",
            Phase::FatalTimeout => "fatal_timeout",
            Phase::FatalMisconfigured => "fatal_misconfigured",
            Phase::FatalMigration => "fatal_migration",
            Phase::FatalHandoff => "fatal_handoff",
        };
        f.write_str(name)
    }
}

/// Runs the three bootstrap phases in order: wait for the datastore, advance the schema,
/// become the service.
pub struct Sequencer<'a> {
    target: ConnectionTarget,
    settings: WaitSettings,
    probe: &'a dyn Probe,
    clock: &'a dyn Clock,
    advancer: &'a dyn SchemaAdvancer,
    handoff: &'a dyn Handoff,
    history: Vec<Phase>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        target: ConnectionTarget,
        settings: WaitSettings,
        probe: &'a dyn Probe,
        clock: &'a dyn Clock,
        advancer: &'a dyn SchemaAdvancer,
        handoff: &'a dyn Handoff,
    ) -> Self {
        Self {
            target,
            settings,
            probe,
            clock,
            advancer,
            handoff,
            history: vec![Phase::Init],
        }
    }

    pub fn phase(&self) -> Phase {
        *self.history.last().unwrap_or(&Phase::Init)
    }

    /// Every phase entered so far, starting with `Init`.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            !self.phase().is_terminal(),
            "left terminal phase {}",
            self.phase()
        );
        tracing::debug!(from = %self.phase(), to = %next, "bootstrap phase transition");
        self.history.push(next);
    }

    /// Run the bootstrap to completion. Only returns if a phase failed.
    pub async fn run(&mut self, command: &ServiceCommand) -> Result<Infallible, BootstrapError> {
        self.enter(Phase::WaitingDb);
        match wait_until_ready(self.probe, self.clock, &self.target, &self.settings).await {
            Ok(_) => self.enter(Phase::Ready),
            Err(e) => {
                self.enter(match e {
                    WaitError::TimedOut { .. } => Phase::FatalTimeout,
                    WaitError::Misconfigured { .. } => Phase::FatalMisconfigured,
                });
                error!("aborting bootstrap, the service will not start: {}", e);
                return Err(e.into());
            }
        }

        self.enter(Phase::Migrating);
        info!(migrator = %self.advancer.describe(), "advancing schema");
        if let Err(e) = self.advancer.advance(&self.target).await {
            self.enter(Phase::FatalMigration);
            error!("schema migration failed, the service will not start: {}", e);
            return Err(e.into());
        }
        self.enter(Phase::Migrated);
        info!("schema is up to date");

        // HandedOff is never recorded: on success nothing of ours runs to observe it.
        info!(phase = %Phase::HandedOff, command = ?command.argv(), "handing off to service");
        match self.handoff.handoff(command) {
            Ok(never) => match never {},
            Err(e) => {
                self.enter(Phase::FatalHandoff);
                error!("could not start the service: {}", e);
                Err(e.into())
            }
        }
    }
}
