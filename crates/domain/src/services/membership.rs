//! Membership role engine.
//!
//! Owns the (role, status) state machine of a user's relationship to a group
//! and decides who may promote, demote and remove whom. Role changes are
//! checked and written in one unit of work that holds the group lock, the same
//! lock succession takes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::events::{EventSink, MembershipEvent, MembershipEventKind};
use super::succession::{SuccessionEngine, SuccessionOutcome};
use crate::error::{DomainError, StoreError};
use crate::models::{
    CreateGroupRequest, Group, GroupMember, GroupPrivacy, GroupRole, MembershipStatus, NewMember,
    RemovedMember, RoleChange, StatusTransition,
};
use crate::store::{SocialStore, SuccessionScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleAction {
    Promote,
    Demote,
    Remove,
}

enum RoleOutcome {
    Changed(GroupMember),
    Removed,
}

/// Checks and applies `action` inside a scope that holds the group lock. The
/// caller's authority and the target's row are read under that lock, so two
/// concurrent changes cannot both act on a state the other has replaced.
async fn apply_role_action<T>(
    scope: &mut T,
    action: RoleAction,
    group_id: Uuid,
    target_id: Uuid,
    caller_id: Uuid,
) -> Result<RoleOutcome, DomainError>
where
    T: SuccessionScope + ?Sized,
{
    scope
        .lock_group(group_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Group not found".into()))?;

    let caller = scope.get_member(group_id, caller_id).await?;
    if !caller.as_ref().is_some_and(GroupMember::holds_authority) {
        debug!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            "Caller lacks group authority"
        );
        return Err(DomainError::Forbidden(
            "Only group admins can manage members".into(),
        ));
    }

    if target_id == caller_id {
        match action {
            RoleAction::Promote => {}
            RoleAction::Demote => {
                return Err(DomainError::Forbidden(
                    "Cannot demote yourself; leave the group instead".into(),
                ))
            }
            RoleAction::Remove => {
                return Err(DomainError::Forbidden(
                    "Cannot remove yourself; leave the group instead".into(),
                ))
            }
        }
    }

    let target = match scope.get_member(group_id, target_id).await? {
        Some(member) if member.is_accepted() => member,
        _ => return Err(DomainError::NotFound("Member not found".into())),
    };

    match action {
        RoleAction::Promote => {
            if target.role.is_authority() {
                return Err(DomainError::InvalidState(format!(
                    "User is already {}",
                    target.role
                )));
            }
            scope
                .update_member_role(group_id, target_id, GroupRole::Member, GroupRole::Admin)
                .await?
                .map(RoleOutcome::Changed)
                .ok_or_else(|| DomainError::InvalidState("Membership changed concurrently".into()))
        }
        RoleAction::Demote => {
            match target.role {
                GroupRole::Admin => {}
                GroupRole::Creator => {
                    return Err(DomainError::InvalidState(
                        "The group creator cannot be demoted".into(),
                    ))
                }
                GroupRole::Member => {
                    return Err(DomainError::InvalidState("User is not an admin".into()))
                }
            }
            let holders = scope.authority_holders(group_id).await?;
            if !holders.iter().any(|m| m.user_id != target_id) {
                return Err(DomainError::InvalidState(
                    "Demotion would leave the group without an admin".into(),
                ));
            }
            scope
                .update_member_role(group_id, target_id, GroupRole::Admin, GroupRole::Member)
                .await?
                .map(RoleOutcome::Changed)
                .ok_or_else(|| DomainError::InvalidState("Membership changed concurrently".into()))
        }
        RoleAction::Remove => {
            if target.role.is_authority() {
                debug!(
                    group_id = %group_id,
                    actor_user_id = %caller_id,
                    target_user_id = %target_id,
                    target_role = %target.role,
                    "Refused to remove an authority-holder"
                );
                return Err(DomainError::Forbidden(
                    "Admins must be demoted before they can be removed".into(),
                ));
            }
            if !scope.delete_plain_member(group_id, target_id).await? {
                return Err(DomainError::InvalidState(
                    "Membership changed concurrently".into(),
                ));
            }
            Ok(RoleOutcome::Removed)
        }
    }
}

#[derive(Clone)]
pub struct MembershipEngine<S> {
    store: S,
    succession: SuccessionEngine<S>,
    events: Arc<dyn EventSink>,
}

impl<S: SocialStore> MembershipEngine<S> {
    pub fn new(store: S, events: Arc<dyn EventSink>) -> Self {
        Self {
            succession: SuccessionEngine::new(store.clone(), Arc::clone(&events)),
            store,
            events,
        }
    }

    /// Creates a group owned by `caller_id`, who becomes its accepted creator.
    pub async fn create_group(
        &self,
        caller_id: Uuid,
        request: CreateGroupRequest,
    ) -> Result<Group, DomainError> {
        request.validate()?;

        if self.store.find_user(caller_id).await?.is_none() {
            return Err(DomainError::NotFound("User not found".into()));
        }

        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            description: request.description,
            privacy: request.privacy,
            creator_id: caller_id,
            created_at: now,
            updated_at: now,
        };
        self.store.create_group(&group).await?;

        info!(
            group_id = %group.id,
            creator_user_id = %caller_id,
            privacy = %group.privacy,
            "Group created"
        );

        Ok(group)
    }

    /// Grants `admin` to an accepted plain member.
    pub async fn promote(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleChange, DomainError> {
        let RoleOutcome::Changed(updated) = self
            .change_under_lock(RoleAction::Promote, group_id, target_id, caller_id)
            .await?
        else {
            return Err(DomainError::InvalidState("Membership changed concurrently".into()));
        };

        info!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            target_user_id = %target_id,
            "Member promoted to admin"
        );
        self.events.publish(MembershipEvent::new(
            MembershipEventKind::Promoted,
            Some(caller_id),
            target_id,
            group_id,
            Some(GroupRole::Admin),
        ));

        Ok(RoleChange {
            group_id,
            user_id: target_id,
            previous_role: GroupRole::Member,
            role: updated.role,
            updated_at: updated.updated_at,
        })
    }

    /// Returns an admin to plain membership. The creator role is never demoted.
    pub async fn demote(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleChange, DomainError> {
        let RoleOutcome::Changed(updated) = self
            .change_under_lock(RoleAction::Demote, group_id, target_id, caller_id)
            .await?
        else {
            return Err(DomainError::InvalidState("Membership changed concurrently".into()));
        };

        info!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            target_user_id = %target_id,
            "Admin demoted to member"
        );
        self.events.publish(MembershipEvent::new(
            MembershipEventKind::Demoted,
            Some(caller_id),
            target_id,
            group_id,
            Some(GroupRole::Member),
        ));

        Ok(RoleChange {
            group_id,
            user_id: target_id,
            previous_role: GroupRole::Admin,
            role: updated.role,
            updated_at: updated.updated_at,
        })
    }

    /// Removes an accepted plain member. Authority-holders must be demoted first.
    pub async fn remove(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RemovedMember, DomainError> {
        self.change_under_lock(RoleAction::Remove, group_id, target_id, caller_id)
            .await?;

        info!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            removed_user_id = %target_id,
            "Member removed from group"
        );
        self.events.publish(MembershipEvent::new(
            MembershipEventKind::Removed,
            Some(caller_id),
            target_id,
            group_id,
            None,
        ));

        Ok(RemovedMember {
            group_id,
            user_id: target_id,
            removed_by: caller_id,
        })
    }

    /// Runs one authority-checked change in a unit of work holding the group
    /// lock. A serialization conflict is retried once.
    async fn change_under_lock(
        &self,
        action: RoleAction,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleOutcome, DomainError> {
        match self
            .try_change_under_lock(action, group_id, target_id, caller_id)
            .await
        {
            Err(DomainError::Conflict(reason)) => {
                debug!(
                    group_id = %group_id,
                    action = ?action,
                    reason = %reason,
                    "Role change conflicted, retrying once"
                );
                self.try_change_under_lock(action, group_id, target_id, caller_id)
                    .await
            }
            other => other,
        }
    }

    async fn try_change_under_lock(
        &self,
        action: RoleAction,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleOutcome, DomainError> {
        let mut scope = self.store.begin_succession().await?;
        match apply_role_action(&mut scope, action, group_id, target_id, caller_id).await {
            Ok(outcome) => {
                scope.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(
                        group_id = %group_id,
                        error = %rollback_err,
                        "Failed to roll back role change"
                    );
                }
                Err(err)
            }
        }
    }

    /// Removes the caller from the group, running succession.
    pub async fn leave(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        self.succession.leave(group_id, caller_id).await
    }

    /// System-initiated departure with no caller.
    pub async fn depart(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        self.succession.depart(group_id, user_id).await
    }

    pub async fn restore_authority(&self, group_id: Uuid) -> Result<SuccessionOutcome, DomainError> {
        self.succession.restore_authority(group_id).await
    }

    /// Asks to join. An outstanding invitation is accepted instead.
    pub async fn request_join(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        self.require_group(group_id).await?;

        let existing = self.store.get_member(group_id, caller_id).await?;
        let member = match existing.map(|m| m.status) {
            None => {
                self.insert_member(NewMember {
                    group_id,
                    user_id: caller_id,
                    role: GroupRole::Member,
                    status: MembershipStatus::Pending,
                    invited_by: None,
                })
                .await?
            }
            Some(MembershipStatus::Rejected) => {
                self.transition(
                    group_id,
                    caller_id,
                    MembershipStatus::Rejected,
                    MembershipStatus::Pending,
                    None,
                )
                .await?
            }
            Some(MembershipStatus::Invited) => {
                self.transition(
                    group_id,
                    caller_id,
                    MembershipStatus::Invited,
                    MembershipStatus::Accepted,
                    None,
                )
                .await?
            }
            Some(MembershipStatus::Pending) => {
                return Err(DomainError::InvalidState(
                    "A join request is already pending".into(),
                ))
            }
            Some(MembershipStatus::Accepted) => {
                return Err(DomainError::InvalidState("Already a member".into()))
            }
        };

        info!(
            group_id = %group_id,
            user_id = %caller_id,
            status = %member.status,
            "Join requested"
        );
        Ok(member)
    }

    /// Invites `target_id`. Any accepted member may invite.
    pub async fn invite(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        self.require_group(group_id).await?;

        let caller = self.store.get_member(group_id, caller_id).await?;
        if !caller.as_ref().is_some_and(GroupMember::is_accepted) {
            return Err(DomainError::Forbidden(
                "Only group members can invite".into(),
            ));
        }
        if target_id == caller_id {
            return Err(DomainError::InvalidState("Cannot invite yourself".into()));
        }
        if self.store.find_user(target_id).await?.is_none() {
            return Err(DomainError::NotFound("User not found".into()));
        }

        let existing = self.store.get_member(group_id, target_id).await?;
        let member = match existing.map(|m| m.status) {
            None => {
                self.insert_member(NewMember {
                    group_id,
                    user_id: target_id,
                    role: GroupRole::Member,
                    status: MembershipStatus::Invited,
                    invited_by: Some(caller_id),
                })
                .await?
            }
            Some(MembershipStatus::Rejected) => {
                self.transition(
                    group_id,
                    target_id,
                    MembershipStatus::Rejected,
                    MembershipStatus::Invited,
                    Some(caller_id),
                )
                .await?
            }
            Some(status) => {
                return Err(DomainError::InvalidState(format!(
                    "User already has a {} membership",
                    status
                )))
            }
        };

        info!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            invited_user_id = %target_id,
            "Member invited"
        );
        Ok(member)
    }

    pub async fn respond_to_invite(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
        accept: bool,
    ) -> Result<GroupMember, DomainError> {
        let existing = self
            .store
            .get_member(group_id, caller_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Invitation not found".into()))?;
        if existing.status != MembershipStatus::Invited {
            return Err(DomainError::InvalidState(format!(
                "Membership is {}, not invited",
                existing.status
            )));
        }

        let next = if accept {
            MembershipStatus::Accepted
        } else {
            MembershipStatus::Rejected
        };
        let member = self
            .transition(group_id, caller_id, MembershipStatus::Invited, next, None)
            .await?;

        info!(
            group_id = %group_id,
            user_id = %caller_id,
            accepted = accept,
            "Invitation answered"
        );
        Ok(member)
    }

    /// Approves or rejects a pending join request. Authority only.
    pub async fn resolve_join_request(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
        approve: bool,
    ) -> Result<GroupMember, DomainError> {
        self.require_group(group_id).await?;
        self.require_authority(group_id, caller_id).await?;

        let existing = self
            .store
            .get_member(group_id, target_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Join request not found".into()))?;
        if existing.status != MembershipStatus::Pending {
            return Err(DomainError::InvalidState(format!(
                "Membership is {}, not pending",
                existing.status
            )));
        }

        let next = if approve {
            MembershipStatus::Accepted
        } else {
            MembershipStatus::Rejected
        };
        let member = self
            .transition(group_id, target_id, MembershipStatus::Pending, next, None)
            .await?;

        info!(
            group_id = %group_id,
            actor_user_id = %caller_id,
            target_user_id = %target_id,
            approved = approve,
            "Join request resolved"
        );
        Ok(member)
    }

    /// Accepted members of a group. Private groups list only to their members.
    pub async fn members(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Vec<GroupMember>, DomainError> {
        let group = self.require_group(group_id).await?;
        if group.privacy == GroupPrivacy::Private {
            let caller = self.store.get_member(group_id, caller_id).await?;
            if !caller.as_ref().is_some_and(GroupMember::is_accepted) {
                return Err(DomainError::Forbidden(
                    "Members of a private group are only visible to its members".into(),
                ));
            }
        }
        Ok(self.store.list_members(group_id).await?)
    }

    async fn require_group(&self, group_id: Uuid) -> Result<Group, DomainError> {
        self.store
            .find_group(group_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Group not found".into()))
    }

    async fn require_authority(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        match self.store.get_member(group_id, caller_id).await? {
            Some(member) if member.holds_authority() => Ok(member),
            _ => {
                debug!(
                    group_id = %group_id,
                    actor_user_id = %caller_id,
                    "Caller lacks group authority"
                );
                Err(DomainError::Forbidden(
                    "Only group admins can manage members".into(),
                ))
            }
        }
    }

    async fn insert_member(&self, member: NewMember) -> Result<GroupMember, DomainError> {
        match self.store.insert_member(member).await {
            Ok(row) => Ok(row),
            Err(StoreError::Constraint(_)) => Err(DomainError::InvalidState(
                "Membership changed concurrently".into(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn transition(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: MembershipStatus,
        to: MembershipStatus,
        invited_by: Option<Uuid>,
    ) -> Result<GroupMember, DomainError> {
        debug_assert!(from.can_transition_to(to));
        self.store
            .transition_status(group_id, user_id, StatusTransition { from, to, invited_by })
            .await?
            .ok_or_else(|| DomainError::InvalidState("Membership changed concurrently".into()))
    }
}
