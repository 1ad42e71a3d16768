//! User and follow entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{Follow, FollowStatus, ProfileVisibility, User};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "profile_visibility", rename_all = "lowercase")]
pub enum ProfileVisibilityDb {
    Public,
    Private,
}

impl From<ProfileVisibilityDb> for ProfileVisibility {
    fn from(db: ProfileVisibilityDb) -> Self {
        match db {
            ProfileVisibilityDb::Public => ProfileVisibility::Public,
            ProfileVisibilityDb::Private => ProfileVisibility::Private,
        }
    }
}

impl From<ProfileVisibility> for ProfileVisibilityDb {
    fn from(profile: ProfileVisibility) -> Self {
        match profile {
            ProfileVisibility::Public => ProfileVisibilityDb::Public,
            ProfileVisibility::Private => ProfileVisibilityDb::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "follow_status", rename_all = "lowercase")]
pub enum FollowStatusDb {
    Pending,
    Accepted,
    Rejected,
}

impl From<FollowStatusDb> for FollowStatus {
    fn from(db: FollowStatusDb) -> Self {
        match db {
            FollowStatusDb::Pending => FollowStatus::Pending,
            FollowStatusDb::Accepted => FollowStatus::Accepted,
            FollowStatusDb::Rejected => FollowStatus::Rejected,
        }
    }
}

impl From<FollowStatus> for FollowStatusDb {
    fn from(status: FollowStatus) -> Self {
        match status {
            FollowStatus::Pending => FollowStatusDb::Pending,
            FollowStatus::Accepted => FollowStatusDb::Accepted,
            FollowStatus::Rejected => FollowStatusDb::Rejected,
        }
    }
}

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub nickname: String,
    pub profile: ProfileVisibilityDb,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for User {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            nickname: entity.nickname,
            profile: entity.profile.into(),
            created_at: entity.created_at,
        }
    }
}

/// Database row mapping for the follows table.
#[derive(Debug, Clone, FromRow)]
pub struct FollowEntity {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub status: FollowStatusDb,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FollowEntity> for Follow {
    fn from(entity: FollowEntity) -> Self {
        Self {
            follower_id: entity.follower_id,
            followee_id: entity.followee_id,
            status: entity.status.into(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
