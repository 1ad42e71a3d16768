//! Follow engine. Only accepted edges grant follower visibility.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{DomainError, StoreError};
use crate::models::{Follow, FollowStatus, ProfileVisibility};
use crate::store::SocialStore;

#[derive(Clone)]
pub struct FollowEngine<S> {
    store: S,
}

impl<S: SocialStore> FollowEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Follows a public profile immediately, or requests to follow a private one.
    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<Follow, DomainError> {
        if follower_id == followee_id {
            return Err(DomainError::InvalidState("Cannot follow yourself".into()));
        }
        let followee = self
            .store
            .find_user(followee_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("User not found".into()))?;

        let status = match followee.profile {
            ProfileVisibility::Public => FollowStatus::Accepted,
            ProfileVisibility::Private => FollowStatus::Pending,
        };

        let edge = match self.store.find_follow(follower_id, followee_id).await? {
            None => {
                let now = Utc::now();
                let edge = Follow {
                    follower_id,
                    followee_id,
                    status,
                    created_at: now,
                    updated_at: now,
                };
                match self.store.insert_follow(&edge).await {
                    Ok(()) => edge,
                    Err(StoreError::Constraint(_)) => {
                        return Err(DomainError::InvalidState(
                            "Already following or requested".into(),
                        ))
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Some(existing) if existing.status == FollowStatus::Rejected => self
                .store
                .transition_follow(follower_id, followee_id, FollowStatus::Rejected, status)
                .await?
                .ok_or_else(|| DomainError::InvalidState("Follow changed concurrently".into()))?,
            Some(existing) => {
                return Err(DomainError::InvalidState(format!(
                    "Follow is already {}",
                    existing.status
                )))
            }
        };

        info!(
            follower_user_id = %follower_id,
            followee_user_id = %followee_id,
            status = %edge.status,
            "Follow requested"
        );
        Ok(edge)
    }

    /// Accepts or rejects a pending request addressed to `followee_id`.
    pub async fn respond_to_follow(
        &self,
        followee_id: Uuid,
        follower_id: Uuid,
        accept: bool,
    ) -> Result<Follow, DomainError> {
        let existing = self
            .store
            .find_follow(follower_id, followee_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Follow request not found".into()))?;
        if existing.status != FollowStatus::Pending {
            return Err(DomainError::InvalidState(format!(
                "Follow is {}, not pending",
                existing.status
            )));
        }

        let next = if accept {
            FollowStatus::Accepted
        } else {
            FollowStatus::Rejected
        };
        let edge = self
            .store
            .transition_follow(follower_id, followee_id, FollowStatus::Pending, next)
            .await?
            .ok_or_else(|| DomainError::InvalidState("Follow changed concurrently".into()))?;

        info!(
            follower_user_id = %follower_id,
            followee_user_id = %followee_id,
            status = %edge.status,
            "Follow request answered"
        );
        Ok(edge)
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<(), DomainError> {
        if !self.store.delete_follow(follower_id, followee_id).await? {
            return Err(DomainError::NotFound("Follow not found".into()));
        }
        info!(
            follower_user_id = %follower_id,
            followee_user_id = %followee_id,
            "Unfollowed"
        );
        Ok(())
    }
}
