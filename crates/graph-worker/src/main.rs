//! Friendlink Graph Worker
//!
//! Keeps the graph stores current:
//! 1. Consumes graph events from SQS (friendships, interactions, withdrawals)
//! 2. Applies them idempotently to the Redis stores
//! 3. Runs the periodic interaction score decay

mod processor;

use crate::processor::{Disposition, EventProcessor};
use friendlink_common::{
    config::AppConfig,
    graph::{
        DecayScheduler, EventOutcome, FriendshipGraphStore, GraphEventHandler, InteractionScoreStore,
        RedisFriendStore, RedisInteractionStore,
    },
    kv::RedisStore,
    metrics, observability,
    queue::EventQueue,
    VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const MAX_FAILURES: u32 = 5;
const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    observability::init_tracing(&config.observability);
    info!("Starting Friendlink Graph Worker v{}", VERSION);
    observability::install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    info!("Connecting to Redis...");
    let redis = RedisStore::connect(&config.redis).await?;

    let friends: Arc<dyn FriendshipGraphStore> =
        Arc::new(RedisFriendStore::new(redis.clone(), &config.graph));
    let interactions: Arc<dyn InteractionScoreStore> = Arc::new(RedisInteractionStore::new(
        redis,
        config.interaction.clone(),
        &config.graph,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Decay runs alongside the consumer and never blocks it
    let decay = DecayScheduler::new(interactions.clone(), config.decay_interval());
    let decay_task = tokio::spawn(decay.run(shutdown_rx.clone()));

    match config.queue.event_queue_url.clone() {
        Some(url) => {
            info!(url = %url, "Connecting to graph event queue...");
            let queue = EventQueue::new(url, config.queue.clone()).await?;
            let processor = EventProcessor::new(
                GraphEventHandler::new(friends, interactions),
                config.queue.dlq_url.is_some(),
            );
            consume(&queue, &processor, shutdown_rx).await;
        }
        None => {
            warn!("Event queue URL not set, running decay only until shutdown...");
            let mut shutdown = shutdown_rx;
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = decay_task.await {
        error!(error = %e, "Decay task ended abnormally");
    }

    info!("Graph worker shutting down");
    Ok(())
}

/// Poll, apply, delete. Pauses after repeated failures.
async fn consume(queue: &EventQueue, processor: &EventProcessor, mut shutdown: watch::Receiver<bool>) {
    let mut consecutive_failures = 0;

    info!("Graph worker ready, starting queue polling...");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(failures = consecutive_failures, "Circuit breaker open, pausing...");
            tokio::select! {
                _ = tokio::time::sleep(CIRCUIT_BREAK_DURATION) => {}
                _ = shutdown.changed() => break,
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = shutdown.changed() => {
                info!("Shutdown signal received");
                break;
            }
            result = queue.receive() => {
                match result {
                    Ok(messages) => {
                        let received = messages.len();
                        let mut applied = 0;
                        for message in messages {
                            let disposition = processor.process(&message).await;
                            match &disposition {
                                Disposition::Done(outcome) => {
                                    consecutive_failures = 0;
                                    if *outcome == EventOutcome::Applied {
                                        applied += 1;
                                    }
                                }
                                // Only infrastructure failures trip the breaker
                                Disposition::Failed(e) if e.is_transient() => consecutive_failures += 1,
                                Disposition::Failed(_) | Disposition::Malformed { .. } => {}
                            }

                            if !disposition.should_delete() {
                                continue;
                            }
                            match message.receipt_handle.as_deref() {
                                Some(handle) => {
                                    if let Err(e) = queue.delete(handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                }
                                None => warn!(message_id = ?message.message_id, "Message has no receipt handle"),
                            }
                        }
                        if received > 0 {
                            debug!(received, applied, "Batch processed");
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, "Failed to receive messages from queue");
                        tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                    }
                }
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
