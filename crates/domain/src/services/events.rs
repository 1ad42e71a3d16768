//! Membership domain events.
//!
//! Engines publish an event after a state change has been committed. Sinks must
//! not block: delivery happens elsewhere and the engines never await it.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GroupRole;

/// Kind of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipEventKind {
    Promoted,
    Demoted,
    Removed,
    Left,
    /// A plain member was promoted because the group lost its last authority-holder.
    SuccessionPromoted,
}

impl MembershipEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipEventKind::Promoted => "promoted",
            MembershipEventKind::Demoted => "demoted",
            MembershipEventKind::Removed => "removed",
            MembershipEventKind::Left => "left",
            MembershipEventKind::SuccessionPromoted => "succession_promoted",
        }
    }
}

impl std::fmt::Display for MembershipEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MembershipEvent {
    pub kind: MembershipEventKind,
    /// `None` for system-initiated changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub target_id: Uuid,
    pub group_id: Uuid,
    /// Role after the change; `None` when the target no longer has a row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_role: Option<GroupRole>,
    pub occurred_at: DateTime<Utc>,
}

impl MembershipEvent {
    pub fn new(
        kind: MembershipEventKind,
        actor_id: Option<Uuid>,
        target_id: Uuid,
        group_id: Uuid,
        new_role: Option<GroupRole>,
    ) -> Self {
        Self {
            kind,
            actor_id,
            target_id,
            group_id,
            new_role,
            occurred_at: Utc::now(),
        }
    }
}

/// Receiver of committed membership events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: MembershipEvent);
}

/// Sink that only logs events.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: MembershipEvent) {
        tracing::info!(
            kind = %event.kind,
            group_id = %event.group_id,
            target_user_id = %event.target_id,
            actor_user_id = ?event.actor_id,
            new_role = ?event.new_role,
            "Membership event"
        );
    }
}

/// Sink that keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<MembershipEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, oldest first.
    pub fn events(&self) -> Vec<MembershipEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<MembershipEventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: MembershipEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
