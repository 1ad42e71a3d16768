//! Group entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{Group, GroupMember, GroupPrivacy, GroupRole, MembershipStatus};
use domain::store::SuccessorCandidate;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for group_role that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "group_role", rename_all = "lowercase")]
pub enum GroupRoleDb {
    Creator,
    Admin,
    Member,
}

impl From<GroupRoleDb> for GroupRole {
    fn from(db_role: GroupRoleDb) -> Self {
        match db_role {
            GroupRoleDb::Creator => GroupRole::Creator,
            GroupRoleDb::Admin => GroupRole::Admin,
            GroupRoleDb::Member => GroupRole::Member,
        }
    }
}

impl From<GroupRole> for GroupRoleDb {
    fn from(role: GroupRole) -> Self {
        match role {
            GroupRole::Creator => GroupRoleDb::Creator,
            GroupRole::Admin => GroupRoleDb::Admin,
            GroupRole::Member => GroupRoleDb::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
pub enum MembershipStatusDb {
    Pending,
    Invited,
    Accepted,
    Rejected,
}

impl From<MembershipStatusDb> for MembershipStatus {
    fn from(db: MembershipStatusDb) -> Self {
        match db {
            MembershipStatusDb::Pending => MembershipStatus::Pending,
            MembershipStatusDb::Invited => MembershipStatus::Invited,
            MembershipStatusDb::Accepted => MembershipStatus::Accepted,
            MembershipStatusDb::Rejected => MembershipStatus::Rejected,
        }
    }
}

impl From<MembershipStatus> for MembershipStatusDb {
    fn from(status: MembershipStatus) -> Self {
        match status {
            MembershipStatus::Pending => MembershipStatusDb::Pending,
            MembershipStatus::Invited => MembershipStatusDb::Invited,
            MembershipStatus::Accepted => MembershipStatusDb::Accepted,
            MembershipStatus::Rejected => MembershipStatusDb::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "group_privacy", rename_all = "lowercase")]
pub enum GroupPrivacyDb {
    Public,
    Private,
}

impl From<GroupPrivacyDb> for GroupPrivacy {
    fn from(db: GroupPrivacyDb) -> Self {
        match db {
            GroupPrivacyDb::Public => GroupPrivacy::Public,
            GroupPrivacyDb::Private => GroupPrivacy::Private,
        }
    }
}

impl From<GroupPrivacy> for GroupPrivacyDb {
    fn from(privacy: GroupPrivacy) -> Self {
        match privacy {
            GroupPrivacy::Public => GroupPrivacyDb::Public,
            GroupPrivacy::Private => GroupPrivacyDb::Private,
        }
    }
}

/// Database row mapping for the groups table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupEntity {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub privacy: GroupPrivacyDb,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupEntity> for Group {
    fn from(entity: GroupEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            description: entity.description,
            privacy: entity.privacy.into(),
            creator_id: entity.creator_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the group_members table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupMemberEntity {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRoleDb,
    pub status: MembershipStatusDb,
    pub invited_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupMemberEntity> for GroupMember {
    fn from(entity: GroupMemberEntity) -> Self {
        Self {
            group_id: entity.group_id,
            user_id: entity.user_id,
            role: entity.role.into(),
            status: entity.status.into(),
            invited_by: entity.invited_by,
            accepted_at: entity.accepted_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Plain member with the number of group items they authored.
#[derive(Debug, Clone, FromRow)]
pub struct SuccessorCandidateEntity {
    pub user_id: Uuid,
    pub authored_count: i64,
    pub accepted_at: DateTime<Utc>,
}

impl From<SuccessorCandidateEntity> for SuccessorCandidate {
    fn from(entity: SuccessorCandidateEntity) -> Self {
        Self {
            user_id: entity.user_id,
            authored_count: entity.authored_count,
            accepted_at: entity.accepted_at,
        }
    }
}
