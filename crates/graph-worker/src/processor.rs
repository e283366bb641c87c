//! Graph event processing
//!
//! Decides what happens to each received message: applied events are
//! deleted, store failures stay on the queue for redelivery, undecodable
//! bodies go to the dead-letter queue when one is configured.

use friendlink_common::errors::{AppError, Result};
use friendlink_common::graph::{EventOutcome, GraphEvent, GraphEventHandler};
use friendlink_common::queue::ReceivedEvent;
use tracing::{debug, error, warn};

/// Fate of one message
#[derive(Debug)]
pub enum Disposition {
    /// Applied or absorbed
    Done(EventOutcome),
    /// Body could not be decoded
    Malformed { drop: bool },
    /// Store failure; redelivery retries it
    Failed(AppError),
}

impl Disposition {
    pub fn should_delete(&self) -> bool {
        match self {
            Disposition::Done(_) => true,
            Disposition::Malformed { drop } => *drop,
            Disposition::Failed(_) => false,
        }
    }
}

pub struct EventProcessor {
    handler: GraphEventHandler,
    dead_letter_configured: bool,
}

impl EventProcessor {
    /// Without a dead-letter queue, malformed messages are dropped instead
    /// of cycling through redelivery forever.
    pub fn new(handler: GraphEventHandler, dead_letter_configured: bool) -> Self {
        Self {
            handler,
            dead_letter_configured,
        }
    }

    pub async fn process(&self, received: &ReceivedEvent) -> Disposition {
        let message_id = received.message_id.as_deref().unwrap_or("-");

        match &received.event {
            Ok(event) => self.apply(event, message_id).await,
            Err(e) => {
                error!(
                    message_id,
                    error = %e,
                    dead_letter = self.dead_letter_configured,
                    "Undecodable graph event"
                );
                Disposition::Malformed {
                    drop: !self.dead_letter_configured,
                }
            }
        }
    }

    async fn apply(&self, event: &GraphEvent, message_id: &str) -> Disposition {
        let result: Result<EventOutcome> = self.handler.apply(event).await;
        match result {
            Ok(outcome) => {
                debug!(message_id, event = event.label(), outcome = outcome.as_str(), "Graph event processed");
                Disposition::Done(outcome)
            }
            Err(e) => {
                warn!(
                    message_id,
                    event = event.label(),
                    transient = e.is_transient(),
                    error = %e,
                    "Graph event failed, leaving for redelivery"
                );
                Disposition::Failed(e)
            }
        }
    }
}
