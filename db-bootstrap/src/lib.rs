//! Container entrypoint that gates a service on its PostgreSQL datastore: wait until the
//! database accepts connections, advance the schema, then exec the service in place.
pub mod clock;
pub mod config;
pub mod error;
pub mod handoff;
pub mod migrate;
pub mod probe;
pub mod readiness;
pub mod sequencer;
