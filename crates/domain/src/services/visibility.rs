//! Visibility authorization engine.
//!
//! Decides whether a viewer may see a content item. Rules, first match wins:
//!
//! 1. The owner always sees their item.
//! 2. Group content follows the group's privacy: public groups disclose to
//!    everyone, private groups to accepted members only.
//! 3. Personal content follows its mode: `public` to everyone, `followers` to
//!    accepted followers, `custom` to the current allow-list, `private` to no one else.
//! 4. Anything else is denied.
//!
//! Comments are judged by their parent. Nothing here writes or caches.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{ContentItem, ContentRef, ContentScope, GroupPrivacy, Visibility};
use crate::store::SocialStore;

/// Longest comment-to-parent chain followed before denying.
const MAX_PARENT_DEPTH: usize = 4;

/// The rule that decided a disclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureRule {
    Owner,
    PublicGroup,
    GroupMember,
    NotGroupMember,
    Public,
    Follower,
    NotFollower,
    AllowListed,
    NotAllowListed,
    Private,
    /// The owning group or parent item no longer exists.
    Orphaned,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "rule")]
pub enum Disclosure {
    Allowed(DisclosureRule),
    Denied(DisclosureRule),
}

impl Disclosure {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Disclosure::Allowed(_))
    }

    pub fn rule(&self) -> DisclosureRule {
        match self {
            Disclosure::Allowed(rule) | Disclosure::Denied(rule) => *rule,
        }
    }
}

#[derive(Clone)]
pub struct VisibilityEngine<S> {
    store: S,
}

impl<S: SocialStore> VisibilityEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Evaluates the decision table for `viewer_id` and `item`.
    pub async fn evaluate(
        &self,
        viewer_id: Uuid,
        item: &ContentItem,
    ) -> Result<Disclosure, DomainError> {
        if item.owner_id == viewer_id {
            return Ok(Disclosure::Allowed(DisclosureRule::Owner));
        }

        let mut current = item.clone();
        for _ in 0..MAX_PARENT_DEPTH {
            match current.scope {
                ContentScope::Inherited { parent } => {
                    let Some(parent_item) = self.store.find_item(parent).await? else {
                        return Ok(Disclosure::Denied(DisclosureRule::Orphaned));
                    };
                    if parent_item.owner_id == viewer_id {
                        return Ok(Disclosure::Allowed(DisclosureRule::Owner));
                    }
                    current = parent_item;
                }
                ContentScope::Group { group_id } => {
                    return self.evaluate_group(viewer_id, group_id).await;
                }
                ContentScope::Personal { visibility } => {
                    return self
                        .evaluate_personal(viewer_id, &current, visibility)
                        .await;
                }
            }
        }

        Ok(Disclosure::Denied(DisclosureRule::Default))
    }

    /// Whether `viewer_id` may see `item`.
    pub async fn can_view(&self, viewer_id: Uuid, item: &ContentItem) -> Result<bool, DomainError> {
        let disclosure = self.evaluate(viewer_id, item).await?;
        if !disclosure.is_allowed() {
            debug!(
                viewer_user_id = %viewer_id,
                item = %item.content_ref(),
                rule = ?disclosure.rule(),
                "Disclosure denied"
            );
        }
        Ok(disclosure.is_allowed())
    }

    /// Like [`Self::can_view`], loading the item first.
    pub async fn can_view_ref(&self, viewer_id: Uuid, item: ContentRef) -> Result<bool, DomainError> {
        let item = self.load(item).await?;
        self.can_view(viewer_id, &item).await
    }

    /// Loads the item and returns it only if the viewer may see it.
    pub async fn authorize(
        &self,
        viewer_id: Uuid,
        item: ContentRef,
    ) -> Result<ContentItem, DomainError> {
        let item = self.load(item).await?;
        if self.can_view(viewer_id, &item).await? {
            Ok(item)
        } else {
            Err(DomainError::Forbidden(format!(
                "Not allowed to view {}",
                item.kind
            )))
        }
    }

    async fn load(&self, item: ContentRef) -> Result<ContentItem, DomainError> {
        self.store
            .find_item(item)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("{} not found", item.kind)))
    }

    async fn evaluate_group(&self, viewer_id: Uuid, group_id: Uuid) -> Result<Disclosure, DomainError> {
        let Some(group) = self.store.find_group(group_id).await? else {
            return Ok(Disclosure::Denied(DisclosureRule::Orphaned));
        };
        match group.privacy {
            GroupPrivacy::Public => Ok(Disclosure::Allowed(DisclosureRule::PublicGroup)),
            GroupPrivacy::Private => {
                let member = self.store.get_member(group_id, viewer_id).await?;
                if member.is_some_and(|m| m.is_accepted()) {
                    Ok(Disclosure::Allowed(DisclosureRule::GroupMember))
                } else {
                    Ok(Disclosure::Denied(DisclosureRule::NotGroupMember))
                }
            }
        }
    }

    async fn evaluate_personal(
        &self,
        viewer_id: Uuid,
        item: &ContentItem,
        visibility: Visibility,
    ) -> Result<Disclosure, DomainError> {
        match visibility {
            Visibility::Public => Ok(Disclosure::Allowed(DisclosureRule::Public)),
            Visibility::Followers => {
                let follow = self.store.find_follow(viewer_id, item.owner_id).await?;
                if follow.is_some_and(|f| f.is_accepted()) {
                    Ok(Disclosure::Allowed(DisclosureRule::Follower))
                } else {
                    Ok(Disclosure::Denied(DisclosureRule::NotFollower))
                }
            }
            Visibility::Custom => {
                if self
                    .store
                    .is_listed_viewer(item.content_ref(), viewer_id)
                    .await?
                {
                    Ok(Disclosure::Allowed(DisclosureRule::AllowListed))
                } else {
                    Ok(Disclosure::Denied(DisclosureRule::NotAllowListed))
                }
            }
            Visibility::Private => Ok(Disclosure::Denied(DisclosureRule::Private)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, Follow, FollowStatus};
    use crate::store::{ContentStore, FollowStore, InMemoryStore};
    use chrono::Utc;

    fn post(owner_id: Uuid, visibility: Visibility) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: Uuid::new_v4(),
            kind: ContentKind::Post,
            owner_id,
            scope: ContentScope::Personal { visibility },
            body: "post".to_string(),
            event: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn comment_on(parent: &ContentItem, owner_id: Uuid) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: Uuid::new_v4(),
            kind: ContentKind::Comment,
            owner_id,
            scope: ContentScope::Inherited {
                parent: parent.content_ref(),
            },
            body: "comment".to_string(),
            event: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_owner_sees_private_item() {
        let store = InMemoryStore::new();
        let engine = VisibilityEngine::new(store.clone());
        let owner = Uuid::new_v4();
        let item = post(owner, Visibility::Private);
        store.insert_item(&item, &[]).await.unwrap();

        assert_eq!(
            engine.evaluate(owner, &item).await.unwrap(),
            Disclosure::Allowed(DisclosureRule::Owner)
        );
        assert_eq!(
            engine.evaluate(Uuid::new_v4(), &item).await.unwrap(),
            Disclosure::Denied(DisclosureRule::Private)
        );
    }

    #[tokio::test]
    async fn test_followers_require_accepted_edge() {
        let store = InMemoryStore::new();
        let engine = VisibilityEngine::new(store.clone());
        let owner = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let item = post(owner, Visibility::Followers);
        store.insert_item(&item, &[]).await.unwrap();

        let now = Utc::now();
        store
            .insert_follow(&Follow {
                follower_id: viewer,
                followee_id: owner,
                status: FollowStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        assert!(!engine.can_view(viewer, &item).await.unwrap());

        store
            .transition_follow(viewer, owner, FollowStatus::Pending, FollowStatus::Accepted)
            .await
            .unwrap();
        assert!(engine.can_view(viewer, &item).await.unwrap());

        // The edge is directed.
        assert!(!engine.can_view(Uuid::new_v4(), &item).await.unwrap());
    }

    #[tokio::test]
    async fn test_comment_inherits_parent() {
        let store = InMemoryStore::new();
        let engine = VisibilityEngine::new(store.clone());
        let owner = Uuid::new_v4();
        let listed = Uuid::new_v4();
        let commenter = Uuid::new_v4();
        let parent = post(owner, Visibility::Custom);
        store.insert_item(&parent, &[listed]).await.unwrap();
        let comment = comment_on(&parent, commenter);
        store.insert_item(&comment, &[]).await.unwrap();

        assert!(engine.can_view(listed, &comment).await.unwrap());
        assert!(engine.can_view(owner, &comment).await.unwrap());
        assert!(engine.can_view(commenter, &comment).await.unwrap());
        assert_eq!(
            engine.evaluate(Uuid::new_v4(), &comment).await.unwrap(),
            Disclosure::Denied(DisclosureRule::NotAllowListed)
        );
    }

    #[tokio::test]
    async fn test_orphaned_comment_is_denied() {
        let store = InMemoryStore::new();
        let engine = VisibilityEngine::new(store.clone());
        let parent = post(Uuid::new_v4(), Visibility::Public);
        let comment = comment_on(&parent, Uuid::new_v4());

        assert_eq!(
            engine.evaluate(Uuid::new_v4(), &comment).await.unwrap(),
            Disclosure::Denied(DisclosureRule::Orphaned)
        );
    }

    #[tokio::test]
    async fn test_authorize_missing_item() {
        let store = InMemoryStore::new();
        let engine = VisibilityEngine::new(store);
        let err = engine
            .authorize(Uuid::new_v4(), ContentRef::new(ContentKind::Post, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
