//! Completion listener service for first blood awards.
//!
//! Wires the arbitrator to the host's completion notifications. The host
//! publishes each confirmed solve on NATS; the listener acknowledges it
//! immediately, arbitrates on a spawned task, and announces new awards.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `firstblood-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Build the configured award store (and connect to Dragonfly if needed)
//! 5. Connect to NATS and subscribe to completions
//! 6. Route notifications until the subscription ends or Ctrl-C
//! 7. Wait for in-flight arbitrations, then flush NATS and close the pools

mod error;
mod nats;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use firstblood_core::config::{LogFormat, LoggingConfig};
use firstblood_core::{Arbitrator, AwardStore, CompletionListener, FirstBloodConfig, OutcomeSink};
use firstblood_db::{PostgresConfig, PostgresPool};
use firstblood_types::CompletionNotification;
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ListenerError;
use crate::nats::{AwardPublisher, CompletionAck, NatsClient};
use crate::store::ConfiguredStore;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "firstblood-config.yaml";

type Listener = CompletionListener<ConfiguredStore, AwardPublisher>;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails. Individual
/// arbitration failures never end the process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        challenge_types = ?config.challenge_types,
        strategy = ?config.arbitration.strategy,
        award_value = config.award.value,
        "firstblood-listener starting"
    );

    // 3. Connect to PostgreSQL.
    let postgres =
        PostgresPool::connect(&PostgresConfig::from_infrastructure(&config.infrastructure))
            .await?;
    if config.infrastructure.run_migrations {
        postgres.run_migrations().await?;
    }

    // 4. Build the award store and arbitrator.
    let store =
        ConfiguredStore::connect(&postgres, &config.arbitration, &config.infrastructure).await?;
    let arbitrator = Arc::new(Arbitrator::new(store.clone(), config.award.clone()));

    // 5. Connect to NATS.
    let nats = NatsClient::connect(&config.infrastructure.nats_url).await?;
    let publisher = Arc::new(nats.award_publisher(&config.notifications.award_subject_prefix));
    let listener = CompletionListener::new(
        arbitrator,
        config.challenge_types.iter().cloned(),
        publisher,
    );
    let mut completions = nats
        .subscribe_completions(&config.notifications.completion_subject)
        .await?;

    // 6. Route notifications.
    info!("listening for completions");
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    loop {
        tokio::select! {
            message = completions.next() => {
                let Some(message) = message else {
                    warn!("completion subscription closed");
                    break;
                };
                in_flight.retain(|task| !task.is_finished());
                in_flight.extend(handle_message(&nats, &listener, message).await);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    // 7. Shut down. Arbitrations and their award announcements finish
    // before the connections they use are closed.
    drain(in_flight).await;
    nats.flush().await;
    postgres.close().await;
    store.close().await;
    info!("firstblood-listener shutdown complete");

    Ok(())
}

/// Start arbitration for one message and acknowledge it. Returns the
/// arbitration task, if one was spawned.
async fn handle_message(
    nats: &NatsClient,
    listener: &Listener,
    message: async_nats::Message,
) -> Option<JoinHandle<()>> {
    let (ack, task) = dispatch(listener, &message.subject, &message.payload);
    if let Some(reply) = message.reply {
        nats.acknowledge(reply, ack).await;
    }
    task
}

/// Parse a completion payload and hand it to the listener. Every payload
/// gets an ack, including ones that cannot be parsed.
fn dispatch<S, O>(
    listener: &CompletionListener<S, O>,
    subject: &str,
    payload: &[u8],
) -> (CompletionAck, Option<JoinHandle<()>>)
where
    S: AwardStore + 'static,
    O: OutcomeSink,
{
    match serde_json::from_slice::<CompletionNotification>(payload) {
        Ok(notification) => {
            let task = listener.on_completion(notification);
            (CompletionAck::received(task.is_some()), task)
        }
        Err(e) => {
            warn!(
                subject = subject,
                error = %e,
                "discarding malformed completion notification"
            );
            (CompletionAck::malformed(), None)
        }
    }
}

/// Wait for every arbitration task still running.
async fn drain(in_flight: Vec<JoinHandle<()>>) {
    if in_flight.is_empty() {
        return;
    }
    info!(pending = in_flight.len(), "waiting for in-flight arbitrations");
    for result in futures::future::join_all(in_flight).await {
        if let Err(e) = result {
            warn!(error = %e, "arbitration task did not complete");
        }
    }
}

/// Load configuration from `FIRSTBLOOD_CONFIG` or the default path, falling
/// back to built-in defaults (plus env overrides) when no file exists.
fn load_config() -> Result<FirstBloodConfig, ListenerError> {
    let path = std::env::var("FIRSTBLOOD_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok(FirstBloodConfig::from_file(&path)?)
    } else {
        Ok(FirstBloodConfig::parse("")?)
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::future::{self, Future};

    use firstblood_core::{ArbitrationError, AwardConfig, InMemoryAwardStore};
    use firstblood_types::ArbitrationOutcome;

    use super::*;

    struct NoSink;

    impl OutcomeSink for NoSink {
        fn on_outcome(
            &self,
            _notification: &CompletionNotification,
            _result: &Result<ArbitrationOutcome, ArbitrationError>,
        ) -> impl Future<Output = ()> + Send {
            future::ready(())
        }
    }

    fn listener() -> CompletionListener<InMemoryAwardStore, NoSink> {
        let arbitrator = Arc::new(Arbitrator::new(
            InMemoryAwardStore::new(),
            AwardConfig::default(),
        ));
        CompletionListener::new(arbitrator, ["standard"], Arc::new(NoSink))
    }

    fn payload(claimant: &str, challenge_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "challenge": { "category": "pwn", "name": "baby-rop" },
            "claimant_id": claimant,
            "challenge_type": challenge_type,
            "solved_at": "2026-03-01T12:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_without_arbitration() {
        let listener = listener();

        let (ack, task) = dispatch(&listener, "ctf.challenge.solved", b"{not json");

        assert_eq!(ack, CompletionAck::malformed());
        assert!(ack.acknowledged);
        assert!(task.is_none());
        assert_eq!(listener.arbitrator().store().insert_attempts(), 0);
    }

    #[tokio::test]
    async fn tracked_payload_reports_arbitrating() {
        let listener = listener();

        let (ack, task) = dispatch(&listener, "ctf.challenge.solved", &payload("A", "standard"));

        assert_eq!(ack, CompletionAck::received(true));
        drain(task.into_iter().collect()).await;
        assert_eq!(listener.arbitrator().store().awards().len(), 1);
    }

    #[tokio::test]
    async fn untracked_or_blank_payloads_are_acknowledged_only() {
        let listener = listener();

        let (untracked, task) = dispatch(&listener, "s", &payload("A", "manual"));
        assert_eq!(untracked, CompletionAck::received(false));
        assert!(task.is_none());

        let (blank, task) = dispatch(&listener, "s", &payload("  ", "standard"));
        assert_eq!(blank, CompletionAck::received(false));
        assert!(task.is_none());

        assert_eq!(listener.arbitrator().store().insert_attempts(), 0);
    }

    #[tokio::test]
    async fn drain_waits_for_every_pending_arbitration() {
        let listener = listener();
        let tasks: Vec<_> = ["A", "B", "C"]
            .into_iter()
            .filter_map(|claimant| dispatch(&listener, "s", &payload(claimant, "standard")).1)
            .collect();
        assert_eq!(tasks.len(), 3);

        drain(tasks).await;

        assert_eq!(listener.arbitrator().store().insert_attempts(), 3);
        assert_eq!(listener.arbitrator().store().awards().len(), 1);
    }
}
