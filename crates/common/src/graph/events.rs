//! Domain events that mutate the graph stores
//!
//! Producers elsewhere in the platform publish these with at-least-once
//! delivery. Applying an event twice must leave the stores unchanged the
//! second time: friend sets absorb repeats, interaction increments are
//! deduplicated by the event's dedup key.

use super::{FriendshipGraphStore, InteractionScoreStore, MemberId};
use crate::errors::Result;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Social action that contributes to an interaction score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PostLike,
    Comment,
    CommentLike,
    Reply,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::PostLike => "post_like",
            InteractionKind::Comment => "comment",
            InteractionKind::CommentLike => "comment_like",
            InteractionKind::Reply => "reply",
        }
    }
}

/// Graph mutation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    FriendAccepted {
        member_id: MemberId,
        friend_id: MemberId,
    },
    FriendRemoved {
        member_id: MemberId,
        friend_id: MemberId,
    },
    /// `actor_id` acted on `entity_id`, which belongs to `target_id`
    Interaction {
        kind: InteractionKind,
        entity_id: i64,
        actor_id: MemberId,
        target_id: MemberId,
    },
    MemberWithdrawn {
        member_id: MemberId,
    },
}

impl GraphEvent {
    /// Metric/log label
    pub fn label(&self) -> &'static str {
        match self {
            GraphEvent::FriendAccepted { .. } => "friend_accepted",
            GraphEvent::FriendRemoved { .. } => "friend_removed",
            GraphEvent::Interaction { .. } => "interaction",
            GraphEvent::MemberWithdrawn { .. } => "member_withdrawn",
        }
    }

    /// Identity of the originating action: `kind:entity:actor`
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            GraphEvent::Interaction {
                kind,
                entity_id,
                actor_id,
                ..
            } => Some(format!("{}:{}:{}", kind.as_str(), entity_id, actor_id)),
            _ => None,
        }
    }
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Duplicate,
    Ignored,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Duplicate => "duplicate",
            EventOutcome::Ignored => "ignored",
        }
    }
}

/// Routes graph events to the stores
#[derive(Clone)]
pub struct GraphEventHandler {
    friends: Arc<dyn FriendshipGraphStore>,
    interactions: Arc<dyn InteractionScoreStore>,
}

impl GraphEventHandler {
    pub fn new(
        friends: Arc<dyn FriendshipGraphStore>,
        interactions: Arc<dyn InteractionScoreStore>,
    ) -> Self {
        Self {
            friends,
            interactions,
        }
    }

    /// Apply one event
    pub async fn apply(&self, event: &GraphEvent) -> Result<EventOutcome> {
        let outcome = match event {
            GraphEvent::FriendAccepted {
                member_id,
                friend_id,
            } => {
                if member_id == friend_id {
                    EventOutcome::Ignored
                } else {
                    self.friends.add_friend(*member_id, *friend_id).await?;
                    EventOutcome::Applied
                }
            }
            GraphEvent::FriendRemoved {
                member_id,
                friend_id,
            } => {
                self.friends.remove_friend(*member_id, *friend_id).await?;
                EventOutcome::Applied
            }
            GraphEvent::Interaction {
                actor_id,
                target_id,
                ..
            } => {
                if actor_id == target_id {
                    EventOutcome::Ignored
                } else {
                    let key = event.dedup_key().unwrap_or_default();
                    if self
                        .interactions
                        .add_interaction_score(*actor_id, *target_id, &key)
                        .await?
                    {
                        EventOutcome::Applied
                    } else {
                        EventOutcome::Duplicate
                    }
                }
            }
            GraphEvent::MemberWithdrawn { member_id } => {
                self.friends.delete_on_withdraw(*member_id).await?;
                self.interactions.delete_on_withdraw(*member_id).await?;
                info!(member = %member_id, "Withdrawn member removed from graph");
                EventOutcome::Applied
            }
        };

        debug!(event = event.label(), outcome = outcome.as_str(), "Graph event handled");
        metrics::record_graph_event(event.label(), outcome.as_str());
        Ok(outcome)
    }
}
