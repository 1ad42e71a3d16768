//! Succession engine.
//!
//! Keeps every group with accepted members under at least one accepted
//! authority-holder. A departure runs as one unit of work: the row is deleted,
//! remaining authority is counted, and if none is left the best-ranked plain
//! member is promoted to admin. Any failure rolls the whole departure back.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::events::{EventSink, MembershipEvent, MembershipEventKind};
use crate::error::DomainError;
use crate::models::{GroupMember, GroupRole};
use crate::store::{MembershipStore, SuccessionScope, SuccessorCandidate};

/// What triggers a succession run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// An accepted member removes themself.
    Leave(Uuid),
    /// System-initiated removal; a missing row makes the run a no-op.
    External(Uuid),
    /// No row is removed; authority is only re-established.
    Repair,
}

impl Departure {
    /// The user whose row this run deletes.
    pub fn departing_user(&self) -> Option<Uuid> {
        match self {
            Departure::Leave(user_id) | Departure::External(user_id) => Some(*user_id),
            Departure::Repair => None,
        }
    }
}

/// Result of one committed succession run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SuccessionOutcome {
    pub group_id: Uuid,
    /// The deleted row, if any.
    pub departed: Option<GroupMember>,
    /// Member promoted to admin by this run.
    pub successor: Option<Uuid>,
    /// New holder of the creator reference when it moved.
    pub creator_reference: Option<Uuid>,
    /// The group has no accepted members left.
    pub ownerless: bool,
}

/// Orders candidates by most authored content, then earliest acceptance,
/// then smallest user id.
fn rank(a: &SuccessorCandidate, b: &SuccessorCandidate) -> Ordering {
    b.authored_count
        .cmp(&a.authored_count)
        .then_with(|| a.accepted_at.cmp(&b.accepted_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Picks exactly one successor, or `None` when there are no candidates.
pub fn select_successor(candidates: &[SuccessorCandidate]) -> Option<&SuccessorCandidate> {
    candidates.iter().min_by(|a, b| rank(a, b))
}

/// Runs one departure inside `scope`. The caller commits or rolls back.
pub async fn run_succession<T>(
    scope: &mut T,
    group_id: Uuid,
    departure: Departure,
) -> Result<SuccessionOutcome, DomainError>
where
    T: SuccessionScope + ?Sized,
{
    let group = scope
        .lock_group(group_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Group not found".into()))?;

    let departed = match departure {
        Departure::Leave(user_id) => {
            let removed = scope.delete_member(group_id, user_id).await?;
            match removed {
                Some(row) if row.is_accepted() => Some(row),
                // Repeating a leave that already emptied the group changes nothing.
                None if is_ownerless(scope, group_id).await? => {
                    return Ok(SuccessionOutcome {
                        group_id,
                        departed: None,
                        successor: None,
                        creator_reference: None,
                        ownerless: true,
                    })
                }
                _ => {
                    return Err(DomainError::NotFound(
                        "Accepted membership not found".into(),
                    ))
                }
            }
        }
        Departure::External(user_id) => scope.delete_member(group_id, user_id).await?,
        Departure::Repair => None,
    };

    let holders = scope.authority_holders(group_id).await?;

    let mut successor = None;
    let mut ownerless = false;
    if holders.is_empty() {
        let candidates = scope.successor_candidates(group_id).await?;
        match select_successor(&candidates) {
            Some(candidate) => {
                scope
                    .set_role(group_id, candidate.user_id, GroupRole::Admin)
                    .await?;
                successor = Some(candidate.user_id);
            }
            None => ownerless = true,
        }
    }

    // The reference follows authority; an ownerless group keeps its last holder.
    let mut creator_reference = None;
    if !holders.iter().any(|m| m.user_id == group.creator_id) {
        let next = successor.or_else(|| holders.first().map(|m| m.user_id));
        if let Some(next) = next.filter(|next| *next != group.creator_id) {
            scope.set_creator_reference(group_id, next).await?;
            creator_reference = Some(next);
        }
    }

    Ok(SuccessionOutcome {
        group_id,
        departed,
        successor,
        creator_reference,
        ownerless,
    })
}

async fn is_ownerless<T>(scope: &mut T, group_id: Uuid) -> Result<bool, DomainError>
where
    T: SuccessionScope + ?Sized,
{
    Ok(scope.authority_holders(group_id).await?.is_empty()
        && scope.successor_candidates(group_id).await?.is_empty())
}

/// Opens units of work on the store and publishes their events.
#[derive(Clone)]
pub struct SuccessionEngine<S> {
    store: S,
    events: Arc<dyn EventSink>,
}

impl<S> SuccessionEngine<S>
where
    S: MembershipStore + Clone,
{
    pub fn new(store: S, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Removes an accepted member at their own request.
    pub async fn leave(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        let outcome = self
            .execute_with_retry(group_id, Departure::Leave(user_id))
            .await?;
        self.publish(&outcome, Some(user_id));
        Ok(outcome)
    }

    /// Removes a member without a caller, e.g. on account deletion.
    pub async fn depart(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        let outcome = self
            .execute_with_retry(group_id, Departure::External(user_id))
            .await?;
        self.publish(&outcome, None);
        Ok(outcome)
    }

    /// Re-establishes authority in a group that lost it outside the engine.
    pub async fn restore_authority(&self, group_id: Uuid) -> Result<SuccessionOutcome, DomainError> {
        let outcome = self.execute_with_retry(group_id, Departure::Repair).await?;
        self.publish(&outcome, None);
        Ok(outcome)
    }

    async fn execute_with_retry(
        &self,
        group_id: Uuid,
        departure: Departure,
    ) -> Result<SuccessionOutcome, DomainError> {
        match self.execute(group_id, departure).await {
            Err(DomainError::Conflict(reason)) => {
                tracing::debug!(
                    group_id = %group_id,
                    reason = %reason,
                    "Succession conflicted, retrying once"
                );
                self.execute(group_id, departure).await
            }
            other => other,
        }
    }

    async fn execute(
        &self,
        group_id: Uuid,
        departure: Departure,
    ) -> Result<SuccessionOutcome, DomainError> {
        let mut scope = self.store.begin_succession().await?;

        match run_succession(&mut scope, group_id, departure).await {
            Ok(outcome) => {
                scope.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    tracing::warn!(
                        group_id = %group_id,
                        error = %rollback_err,
                        "Failed to roll back succession"
                    );
                }
                Err(err)
            }
        }
    }

    fn publish(&self, outcome: &SuccessionOutcome, actor_id: Option<Uuid>) {
        if let Some(departed) = &outcome.departed {
            tracing::info!(
                group_id = %outcome.group_id,
                user_id = %departed.user_id,
                previous_role = %departed.role,
                "Member left group"
            );
            self.events.publish(MembershipEvent::new(
                MembershipEventKind::Left,
                actor_id,
                departed.user_id,
                outcome.group_id,
                None,
            ));
        }

        if let Some(successor) = outcome.successor {
            tracing::info!(
                group_id = %outcome.group_id,
                successor_user_id = %successor,
                departed_user_id = ?outcome.departed.as_ref().map(|m| m.user_id),
                "Promoted successor to admin"
            );
            self.events.publish(MembershipEvent::new(
                MembershipEventKind::SuccessionPromoted,
                None,
                successor,
                outcome.group_id,
                Some(GroupRole::Admin),
            ));
        }

        if outcome.ownerless && outcome.departed.is_some() {
            tracing::info!(group_id = %outcome.group_id, "Group is now ownerless");
        }

        if let Some(holder) = outcome.creator_reference {
            tracing::debug!(
                group_id = %outcome.group_id,
                creator_user_id = %holder,
                departed_user_id = ?outcome.departed.as_ref().map(|m| m.user_id),
                "Moved creator reference"
            );
        }
    }
}
