//! Store ports consumed by the engines.
//!
//! Backends (the PostgreSQL store in `persistence`, [`InMemoryStore`] here)
//! implement these traits so the engines never depend on a database engine.
//! Every fact the engines act on is read fresh through these ports.

mod memory;

pub use memory::{Fault, InMemoryStore, MemoryScope};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ContentItem, ContentRef, EventResponse, Follow, FollowStatus, Group, GroupMember, GroupRole,
    NewMember, StatusTransition, User, Visibility,
};

/// An accepted plain member eligible to succeed a departed authority-holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorCandidate {
    pub user_id: Uuid,
    /// Group posts, group events and comments on group content authored in the group.
    pub authored_count: i64,
    pub accepted_at: DateTime<Utc>,
}

/// Keyset position in the feed ordering `(created_at DESC, id DESC)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl FeedCursor {
    pub fn after(item: &ContentItem) -> Self {
        Self {
            created_at: item.created_at,
            id: item.id,
        }
    }

    /// Whether `item` sorts strictly after this cursor.
    pub fn precedes(&self, item: &ContentItem) -> bool {
        (item.created_at, item.id) < (self.created_at, self.id)
    }
}

/// One batch request for feed candidates.
#[derive(Debug, Clone, Copy)]
pub struct FeedQuery {
    pub viewer_id: Uuid,
    pub before: Option<FeedCursor>,
    pub limit: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Group and membership rows.
///
/// Conditional writes return `None`/`false` when the row was not in the
/// expected state, which keeps them idempotent at the row level.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    type Scope: SuccessionScope + 'static;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    async fn get_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Accepted members ordered by `accepted_at`, then user id.
    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError>;

    /// Inserts the group and its creator's accepted `creator` row atomically.
    async fn create_group(&self, group: &Group) -> Result<GroupMember, StoreError>;

    /// Fails with [`StoreError::Constraint`] when the row already exists.
    async fn insert_member(&self, member: NewMember) -> Result<GroupMember, StoreError>;

    /// Applies the transition only if the row is still in `transition.from`.
    /// Entering `accepted` stamps `accepted_at`.
    async fn transition_status(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        transition: StatusTransition,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Changes the role of an accepted member only if it currently is `from`.
    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Deletes an accepted row whose role is `member`.
    async fn delete_plain_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    /// Groups that have accepted members but no accepted authority-holder.
    async fn groups_without_authority(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    /// Opens a serializable unit of work scoped to one group. Succession runs
    /// and authority-checked role changes both go through it.
    async fn begin_succession(&self) -> Result<Self::Scope, StoreError>;
}

/// Transaction scope holding one group's lock.
///
/// Dropping a scope without calling [`SuccessionScope::commit`] discards
/// every write made through it.
#[async_trait]
pub trait SuccessionScope: Send {
    /// Reads and locks the group row for the rest of the scope.
    async fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    async fn get_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Same contract as [`MembershipStore::update_member_role`], inside the scope.
    async fn update_member_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Same contract as [`MembershipStore::delete_plain_member`], inside the scope.
    async fn delete_plain_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Deletes the row and returns it as it was.
    async fn delete_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError>;

    /// Accepted creators and admins ordered by `accepted_at`, then user id.
    async fn authority_holders(&mut self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError>;

    async fn successor_candidates(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<SuccessorCandidate>, StoreError>;

    async fn set_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> Result<(), StoreError>;

    async fn set_creator_reference(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Posts, group posts, comments, events and their allow-lists.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_item(&self, item: ContentRef) -> Result<Option<ContentItem>, StoreError>;

    /// Stores the item together with its allow-list.
    async fn insert_item(&self, item: &ContentItem, viewers: &[Uuid]) -> Result<(), StoreError>;

    /// Sets the visibility and replaces the whole allow-list in one write.
    async fn replace_visibility(
        &self,
        item: ContentRef,
        visibility: Visibility,
        viewers: &[Uuid],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn is_listed_viewer(&self, item: ContentRef, user_id: Uuid) -> Result<bool, StoreError>;

    async fn list_viewers(&self, item: ContentRef) -> Result<Vec<Uuid>, StoreError>;

    /// Deletes the item with its comments, allow-list and event responses.
    async fn delete_item(&self, item: ContentRef) -> Result<bool, StoreError>;

    async fn upsert_event_response(&self, response: &EventResponse) -> Result<(), StoreError>;

    async fn list_event_responses(&self, event_id: Uuid) -> Result<Vec<EventResponse>, StoreError>;

    /// Posts and group posts that may appear in the viewer's feed, ordered by
    /// `(created_at DESC, id DESC)` and strictly after `query.before`.
    /// Callers still check each row.
    async fn feed_candidates(&self, query: FeedQuery) -> Result<Vec<ContentItem>, StoreError>;
}

#[async_trait]
pub trait FollowStore: Send + Sync {
    async fn find_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<Option<Follow>, StoreError>;

    async fn insert_follow(&self, follow: &Follow) -> Result<(), StoreError>;

    /// Applies the status change only if the edge is still in `from`.
    async fn transition_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        from: FollowStatus,
        to: FollowStatus,
    ) -> Result<Option<Follow>, StoreError>;

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, StoreError>;
}

/// Everything the engines need from one backend.
pub trait SocialStore:
    UserStore + MembershipStore + ContentStore + FollowStore + Clone + 'static
{
}

impl<T> SocialStore for T where
    T: UserStore + MembershipStore + ContentStore + FollowStore + Clone + 'static
{
}
