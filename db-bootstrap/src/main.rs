//! Wait for the database, migrate it, then become the service.
use std::convert::Infallible;
use std::process::ExitCode;

use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use db_bootstrap::clock::TokioClock;
use db_bootstrap::config::Config;
use db_bootstrap::error::BootstrapError;
use db_bootstrap::handoff::{ExecHandoff, HandoffError, ServiceCommand};
use db_bootstrap::probe::PgProbe;
use db_bootstrap::sequencer::Sequencer;

async fn bootstrap() -> Result<Infallible, BootstrapError> {
    let command = ServiceCommand::from_args(std::env::args_os().skip(1))?;
    let config = Config::init_from_env()?;

    let target = config.connection_target();
    info!(
        service_port = config.service_port,
        program = ?command.program(),
        "bootstrapping service"
    );

    let probe = PgProbe::new(config.probe_timeout.0);
    let advancer = config.schema_advancer();

    let mut sequencer = Sequencer::new(
        target,
        config.wait_settings(),
        &probe,
        &TokioClock,
        advancer.as_ref(),
        &ExecHandoff,
    );

    let never = sequencer.run(&command).await?;
    match never {}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match bootstrap().await {
        Ok(never) => match never {},
        Err(e) => {
            // Failures inside the sequence are logged where they happen.
            if matches!(
                e,
                BootstrapError::Config(_) | BootstrapError::Handoff(HandoffError::MissingCommand)
            ) {
                error!("{}", e);
            }
            ExitCode::from(e.exit_code())
        }
    }
}
