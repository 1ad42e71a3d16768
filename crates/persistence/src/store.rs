//! PostgreSQL implementation of the domain store ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    ContentItem, ContentKind, ContentRef, ContentScope, EventResponse, Follow, FollowStatus,
    Group, GroupMember, GroupRole, NewMember, StatusTransition, User, Visibility,
};
use domain::store::{
    ContentStore, FeedQuery, FollowStore, MembershipStore, SuccessionScope, SuccessorCandidate,
    UserStore,
};
use domain::StoreError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    CommentEntity, EventEntity, EventResponseEntity, FollowEntity, GroupEntity,
    GroupPostEntity, PostEntity, UserEntity,
};
use crate::error::map_sqlx_error;
use crate::repositories::{
    succession, ContentRepository, FollowRepository, GroupRepository, UserRepository,
};

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    users: UserRepository,
    groups: GroupRepository,
    content: ContentRepository,
    follows: FollowRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            groups: GroupRepository::new(pool.clone()),
            content: ContentRepository::new(pool.clone()),
            follows: FollowRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = self.users.find_by_id(user_id).await.map_err(map_sqlx_error)?;
        Ok(user.map(Into::into))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let entity = UserEntity {
            id: user.id,
            nickname: user.nickname.clone(),
            profile: user.profile.into(),
            created_at: user.created_at,
        };
        self.users.insert(&entity).await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    type Scope = PgSuccessionScope;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let group = self.groups.find_by_id(group_id).await.map_err(map_sqlx_error)?;
        Ok(group.map(Into::into))
    }

    async fn get_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        let member = self
            .groups
            .find_member(group_id, user_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(member.map(Into::into))
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError> {
        let members = self
            .groups
            .list_accepted(group_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(members.into_iter().map(Into::into).collect())
    }

    async fn create_group(&self, group: &Group) -> Result<GroupMember, StoreError> {
        let entity = GroupEntity {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            privacy: group.privacy.into(),
            creator_id: group.creator_id,
            created_at: group.created_at,
            updated_at: group.updated_at,
        };
        let creator = self
            .groups
            .create_with_creator(&entity)
            .await
            .map_err(map_sqlx_error)?;
        Ok(creator.into())
    }

    async fn insert_member(&self, member: NewMember) -> Result<GroupMember, StoreError> {
        let row = self
            .groups
            .insert_member(
                member.group_id,
                member.user_id,
                member.role.into(),
                member.status.into(),
                member.invited_by,
            )
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn transition_status(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        transition: StatusTransition,
    ) -> Result<Option<GroupMember>, StoreError> {
        let row = self
            .groups
            .transition_status(
                group_id,
                user_id,
                transition.from.into(),
                transition.to.into(),
                transition.invited_by,
            )
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError> {
        let row = self
            .groups
            .update_role(group_id, user_id, from.into(), to.into())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn delete_plain_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.groups
            .delete_plain_member(group_id, user_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn groups_without_authority(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        self.groups
            .find_without_authority(limit)
            .await
            .map_err(map_sqlx_error)
    }

    async fn begin_succession(&self) -> Result<PgSuccessionScope, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(PgSuccessionScope { tx: Some(tx) })
    }
}

/// Serializable transaction holding one group's row lock. Dropping it rolls back.
pub struct PgSuccessionScope {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSuccessionScope {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Backend("succession scope already closed".into()))
    }
}

#[async_trait]
impl SuccessionScope for PgSuccessionScope {
    async fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let group = succession::lock_group(self.conn()?, group_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(group.map(Into::into))
    }

    async fn get_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        let row = succession::find_member(self.conn()?, group_id, user_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn update_member_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError> {
        let row = succession::update_role(self.conn()?, group_id, user_id, from.into(), to.into())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn delete_plain_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        succession::delete_plain_member(self.conn()?, group_id, user_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        let row = succession::delete_member(self.conn()?, group_id, user_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn authority_holders(&mut self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError> {
        let rows = succession::authority_holders(self.conn()?, group_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn successor_candidates(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<SuccessorCandidate>, StoreError> {
        let rows = succession::successor_candidates(self.conn()?, group_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> Result<(), StoreError> {
        let updated = succession::set_role(self.conn()?, group_id, user_id, role.into())
            .await
            .map_err(map_sqlx_error)?;
        if !updated {
            return Err(StoreError::Backend(format!(
                "no membership {}/{}",
                group_id, user_id
            )));
        }
        Ok(())
    }

    async fn set_creator_reference(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let updated = succession::set_creator_reference(self.conn()?, group_id, user_id)
            .await
            .map_err(map_sqlx_error)?;
        if !updated {
            return Err(StoreError::Backend(format!("no group {}", group_id)));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Backend("succession scope already closed".into()))?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(map_sqlx_error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_item(&self, item: ContentRef) -> Result<Option<ContentItem>, StoreError> {
        let found = match item.kind {
            ContentKind::Post => self
                .content
                .find_post(item.id)
                .await
                .map_err(map_sqlx_error)?
                .map(Into::into),
            ContentKind::GroupPost => self
                .content
                .find_group_post(item.id)
                .await
                .map_err(map_sqlx_error)?
                .map(Into::into),
            ContentKind::Comment => self
                .content
                .find_comment(item.id)
                .await
                .map_err(map_sqlx_error)?
                .map(Into::into),
            ContentKind::Event => self
                .content
                .find_event(item.id)
                .await
                .map_err(map_sqlx_error)?
                .map(ContentItem::try_from)
                .transpose()?,
        };
        Ok(found)
    }

    async fn insert_item(&self, item: &ContentItem, viewers: &[Uuid]) -> Result<(), StoreError> {
        let result = match (item.kind, item.scope) {
            (ContentKind::Post, ContentScope::Personal { visibility }) => {
                let post = PostEntity {
                    id: item.id,
                    owner_id: item.owner_id,
                    visibility: visibility.into(),
                    body: item.body.clone(),
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                };
                self.content.insert_post(&post, viewers).await
            }
            (ContentKind::GroupPost, ContentScope::Group { group_id }) => {
                let post = GroupPostEntity {
                    id: item.id,
                    group_id,
                    owner_id: item.owner_id,
                    body: item.body.clone(),
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                };
                self.content.insert_group_post(&post).await
            }
            (ContentKind::Comment, ContentScope::Inherited { parent }) => {
                let comment = CommentEntity {
                    id: item.id,
                    parent_kind: parent.kind.into(),
                    parent_id: parent.id,
                    owner_id: item.owner_id,
                    body: item.body.clone(),
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                };
                self.content.insert_comment(&comment).await
            }
            (ContentKind::Event, scope) => {
                let details = item.event.as_ref().ok_or_else(|| {
                    StoreError::Backend(format!("event {} has no details", item.id))
                })?;
                let (group_id, visibility) = match scope {
                    ContentScope::Group { group_id } => (Some(group_id), None),
                    ContentScope::Personal { visibility } => (None, Some(visibility.into())),
                    ContentScope::Inherited { .. } => {
                        return Err(StoreError::Backend(format!(
                            "event {} cannot inherit visibility",
                            item.id
                        )))
                    }
                };
                let event = EventEntity {
                    id: item.id,
                    owner_id: item.owner_id,
                    group_id,
                    visibility,
                    title: details.title.clone(),
                    description: item.body.clone(),
                    starts_at: details.starts_at,
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                };
                self.content.insert_event(&event, viewers).await
            }
            (kind, _) => {
                return Err(StoreError::Backend(format!(
                    "{} {} has a scope it cannot be stored with",
                    kind, item.id
                )))
            }
        };
        result.map_err(map_sqlx_error)
    }

    async fn replace_visibility(
        &self,
        item: ContentRef,
        visibility: Visibility,
        viewers: &[Uuid],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.content
            .replace_visibility(item.kind.into(), item.id, visibility.into(), viewers, updated_at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn is_listed_viewer(&self, item: ContentRef, user_id: Uuid) -> Result<bool, StoreError> {
        self.content
            .is_listed_viewer(item.kind.into(), item.id, user_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_viewers(&self, item: ContentRef) -> Result<Vec<Uuid>, StoreError> {
        self.content
            .list_viewers(item.kind.into(), item.id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_item(&self, item: ContentRef) -> Result<bool, StoreError> {
        self.content
            .delete_item(item.kind.into(), item.id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn upsert_event_response(&self, response: &EventResponse) -> Result<(), StoreError> {
        let entity = EventResponseEntity {
            event_id: response.event_id,
            user_id: response.user_id,
            response: response.response.into(),
            responded_at: response.responded_at,
        };
        self.content
            .upsert_event_response(&entity)
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_event_responses(&self, event_id: Uuid) -> Result<Vec<EventResponse>, StoreError> {
        let rows = self
            .content
            .list_event_responses(event_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn feed_candidates(&self, query: FeedQuery) -> Result<Vec<ContentItem>, StoreError> {
        let rows = self
            .content
            .feed_candidates(
                query.viewer_id,
                query.before.map(|cursor| (cursor.created_at, cursor.id)),
                query.limit,
            )
            .await
            .map_err(map_sqlx_error)?;
        debug!(
            viewer_user_id = %query.viewer_id,
            rows = rows.len(),
            "Fetched feed candidates"
        );
        rows.into_iter().map(ContentItem::try_from).collect()
    }
}

#[async_trait]
impl FollowStore for PgStore {
    async fn find_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<Option<Follow>, StoreError> {
        let edge = self
            .follows
            .find(follower_id, followee_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(edge.map(Into::into))
    }

    async fn insert_follow(&self, follow: &Follow) -> Result<(), StoreError> {
        let entity = FollowEntity {
            follower_id: follow.follower_id,
            followee_id: follow.followee_id,
            status: follow.status.into(),
            created_at: follow.created_at,
            updated_at: follow.updated_at,
        };
        self.follows.insert(&entity).await.map_err(map_sqlx_error)
    }

    async fn transition_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        from: FollowStatus,
        to: FollowStatus,
    ) -> Result<Option<Follow>, StoreError> {
        let edge = self
            .follows
            .transition(follower_id, followee_id, from.into(), to.into())
            .await
            .map_err(map_sqlx_error)?;
        Ok(edge.map(Into::into))
    }

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, StoreError> {
        self.follows
            .delete(follower_id, followee_id)
            .await
            .map_err(map_sqlx_error)
    }
}
