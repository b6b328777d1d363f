#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::subscriber::DefaultGuard;

use db_bootstrap::clock::Clock;
use db_bootstrap::config::ConnectionTarget;
use db_bootstrap::handoff::{Handoff, HandoffError, ServiceCommand};
use db_bootstrap::migrate::{MigrationError, SchemaAdvancer};
use db_bootstrap::probe::{Probe, ProbeError};

pub fn target() -> ConnectionTarget {
    ConnectionTarget {
        host: "db".to_owned(),
        port: 5432,
        user: "app".to_owned(),
        password: None,
        database: "directory".to_owned(),
    }
}

/// Events observed across all fakes, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Probe,
    Sleep(Duration),
    Migrate,
    Handoff(Vec<OsString>),
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(journal: &Journal) -> Vec<Event> {
    journal.lock().unwrap().clone()
}

/// Fails `failures` times with `error`, then succeeds forever.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeError>>,
    budgets: Mutex<Vec<Option<Duration>>>,
    journal: Journal,
}

impl ScriptedProbe {
    pub fn failing(failures: usize, journal: &Journal) -> Self {
        Self::with_errors(
            (0..failures)
                .map(|_| ProbeError::Unreachable("connection refused".to_owned()))
                .collect(),
            journal,
        )
    }

    pub fn with_errors(errors: Vec<ProbeError>, journal: &Journal) -> Self {
        Self {
            script: Mutex::new(errors.into()),
            budgets: Mutex::new(Vec::new()),
            journal: journal.clone(),
        }
    }

    /// The deadline budget handed to each call, in order.
    pub fn budgets(&self) -> Vec<Option<Duration>> {
        self.budgets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(
        &self,
        _target: &ConnectionTarget,
        budget: Option<Duration>,
    ) -> Result<(), ProbeError> {
        self.journal.lock().unwrap().push(Event::Probe);
        self.budgets.lock().unwrap().push(budget);
        match self.script.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Never succeeds.
pub struct DownProbe {
    pub misconfigured: bool,
    journal: Journal,
}

impl DownProbe {
    pub fn new(misconfigured: bool, journal: &Journal) -> Self {
        Self {
            misconfigured,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Probe for DownProbe {
    async fn probe(
        &self,
        _target: &ConnectionTarget,
        _budget: Option<Duration>,
    ) -> Result<(), ProbeError> {
        self.journal.lock().unwrap().push(Event::Probe);
        if self.misconfigured {
            Err(ProbeError::Misconfigured(
                "password authentication failed for user \"app\"".to_owned(),
            ))
        } else {
            Err(ProbeError::Unreachable("connection refused".to_owned()))
        }
    }
}

/// Time only moves when slept on.
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
    journal: Journal,
}

impl ManualClock {
    pub fn new(journal: &Journal) -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            journal: journal.clone(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.journal.lock().unwrap().push(Event::Sleep(duration));
        *self.offset.lock().unwrap() += duration;
    }
}

pub struct RecordingAdvancer {
    exit_code: i32,
    journal: Journal,
}

impl RecordingAdvancer {
    pub fn exiting_with(exit_code: i32, journal: &Journal) -> Self {
        Self {
            exit_code,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl SchemaAdvancer for RecordingAdvancer {
    async fn advance(&self, _target: &ConnectionTarget) -> Result<(), MigrationError> {
        self.journal.lock().unwrap().push(Event::Migrate);
        match self.exit_code {
            0 => Ok(()),
            code => Err(MigrationError::Exited(code)),
        }
    }

    fn describe(&self) -> String {
        "recording advancer".to_owned()
    }
}

/// Records the argv and then fails the way a missing binary would, since a test cannot exec.
pub struct RecordingHandoff {
    journal: Journal,
}

impl RecordingHandoff {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl Handoff for RecordingHandoff {
    fn handoff(&self, command: &ServiceCommand) -> Result<Infallible, HandoffError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Handoff(command.argv().to_vec()));
        Err(HandoffError::Exec {
            program: command.program().clone(),
            error: io::Error::from(io::ErrorKind::NotFound),
        })
    }
}

#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture this thread's log output at info level. Tests run on tokio's current-thread runtime,
/// so the guard covers every await in the test body.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    (buffer, tracing::subscriber::set_default(subscriber))
}

pub fn argv(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}
