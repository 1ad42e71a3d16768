//! Content entities (database row mappings).
//!
//! Each content kind lives in its own table; all of them convert into the
//! domain's [`ContentItem`].

use chrono::{DateTime, Utc};
use domain::models::{
    ContentItem, ContentKind, ContentRef, ContentScope, EventDetails, EventResponse,
    EventResponseKind, Visibility,
};
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "content_visibility", rename_all = "lowercase")]
pub enum VisibilityDb {
    Public,
    Followers,
    Private,
    Custom,
}

impl From<VisibilityDb> for Visibility {
    fn from(db: VisibilityDb) -> Self {
        match db {
            VisibilityDb::Public => Visibility::Public,
            VisibilityDb::Followers => Visibility::Followers,
            VisibilityDb::Private => Visibility::Private,
            VisibilityDb::Custom => Visibility::Custom,
        }
    }
}

impl From<Visibility> for VisibilityDb {
    fn from(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Public => VisibilityDb::Public,
            Visibility::Followers => VisibilityDb::Followers,
            Visibility::Private => VisibilityDb::Private,
            Visibility::Custom => VisibilityDb::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "content_kind", rename_all = "snake_case")]
pub enum ContentKindDb {
    Post,
    GroupPost,
    Comment,
    Event,
}

impl From<ContentKindDb> for ContentKind {
    fn from(db: ContentKindDb) -> Self {
        match db {
            ContentKindDb::Post => ContentKind::Post,
            ContentKindDb::GroupPost => ContentKind::GroupPost,
            ContentKindDb::Comment => ContentKind::Comment,
            ContentKindDb::Event => ContentKind::Event,
        }
    }
}

impl From<ContentKind> for ContentKindDb {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => ContentKindDb::Post,
            ContentKind::GroupPost => ContentKindDb::GroupPost,
            ContentKind::Comment => ContentKindDb::Comment,
            ContentKind::Event => ContentKindDb::Event,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "event_response_kind", rename_all = "snake_case")]
pub enum EventResponseKindDb {
    Going,
    NotGoing,
}

impl From<EventResponseKindDb> for EventResponseKind {
    fn from(db: EventResponseKindDb) -> Self {
        match db {
            EventResponseKindDb::Going => EventResponseKind::Going,
            EventResponseKindDb::NotGoing => EventResponseKind::NotGoing,
        }
    }
}

impl From<EventResponseKind> for EventResponseKindDb {
    fn from(kind: EventResponseKind) -> Self {
        match kind {
            EventResponseKind::Going => EventResponseKindDb::Going,
            EventResponseKind::NotGoing => EventResponseKindDb::NotGoing,
        }
    }
}

/// Database row mapping for the posts table.
#[derive(Debug, Clone, FromRow)]
pub struct PostEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub visibility: VisibilityDb,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostEntity> for ContentItem {
    fn from(entity: PostEntity) -> Self {
        Self {
            id: entity.id,
            kind: ContentKind::Post,
            owner_id: entity.owner_id,
            scope: ContentScope::Personal {
                visibility: entity.visibility.into(),
            },
            body: entity.body,
            event: None,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the group_posts table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupPostEntity {
    pub id: Uuid,
    pub group_id: Uuid,
    pub owner_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupPostEntity> for ContentItem {
    fn from(entity: GroupPostEntity) -> Self {
        Self {
            id: entity.id,
            kind: ContentKind::GroupPost,
            owner_id: entity.owner_id,
            scope: ContentScope::Group {
                group_id: entity.group_id,
            },
            body: entity.body,
            event: None,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the comments table.
#[derive(Debug, Clone, FromRow)]
pub struct CommentEntity {
    pub id: Uuid,
    pub parent_kind: ContentKindDb,
    pub parent_id: Uuid,
    pub owner_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentEntity> for ContentItem {
    fn from(entity: CommentEntity) -> Self {
        Self {
            id: entity.id,
            kind: ContentKind::Comment,
            owner_id: entity.owner_id,
            scope: ContentScope::Inherited {
                parent: ContentRef::new(entity.parent_kind.into(), entity.parent_id),
            },
            body: entity.body,
            event: None,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the events table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub group_id: Option<Uuid>,
    pub visibility: Option<VisibilityDb>,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventEntity> for ContentItem {
    type Error = StoreError;

    fn try_from(entity: EventEntity) -> Result<Self, Self::Error> {
        let scope = scope_of(entity.id, entity.group_id, entity.visibility)?;
        Ok(Self {
            id: entity.id,
            kind: ContentKind::Event,
            owner_id: entity.owner_id,
            scope,
            body: entity.description,
            event: Some(EventDetails {
                title: entity.title,
                starts_at: entity.starts_at,
            }),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// One row of the feed union over posts and group posts.
#[derive(Debug, Clone, FromRow)]
pub struct FeedRowEntity {
    pub kind: ContentKindDb,
    pub id: Uuid,
    pub owner_id: Uuid,
    pub visibility: Option<VisibilityDb>,
    pub group_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FeedRowEntity> for ContentItem {
    type Error = StoreError;

    fn try_from(entity: FeedRowEntity) -> Result<Self, Self::Error> {
        let scope = scope_of(entity.id, entity.group_id, entity.visibility)?;
        Ok(Self {
            id: entity.id,
            kind: entity.kind.into(),
            owner_id: entity.owner_id,
            scope,
            body: entity.body,
            event: None,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Group rows take the group's scope, the rest carry their own visibility.
fn scope_of(
    id: Uuid,
    group_id: Option<Uuid>,
    visibility: Option<VisibilityDb>,
) -> Result<ContentScope, StoreError> {
    match (group_id, visibility) {
        (Some(group_id), None) => Ok(ContentScope::Group { group_id }),
        (None, Some(visibility)) => Ok(ContentScope::Personal {
            visibility: visibility.into(),
        }),
        _ => Err(StoreError::Backend(format!(
            "content row {} has no unambiguous scope",
            id
        ))),
    }
}

/// Database row mapping for the event_responses table.
#[derive(Debug, Clone, FromRow)]
pub struct EventResponseEntity {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub response: EventResponseKindDb,
    pub responded_at: DateTime<Utc>,
}

impl From<EventResponseEntity> for EventResponse {
    fn from(entity: EventResponseEntity) -> Self {
        Self {
            event_id: entity.event_id,
            user_id: entity.user_id,
            response: entity.response.into(),
            responded_at: entity.responded_at,
        }
    }
}
