//! Group domain models: groups, memberships, roles and statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_not_blank;

/// Role within a group.
///
/// `Creator` is only ever assigned at group creation; it is never granted by
/// promotion and never removed by demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Creator,
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Creator => "creator",
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }

    /// Returns true for creator and admin.
    pub fn is_authority(&self) -> bool {
        match self {
            GroupRole::Creator | GroupRole::Admin => true,
            GroupRole::Member => false,
        }
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "creator" => Ok(GroupRole::Creator),
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            _ => Err(format!("Invalid group role: {}", s)),
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a user's relationship to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// The user asked to join and awaits an authority-holder's decision.
    Pending,
    Accepted,
    Rejected,
    /// A member invited the user, who has not answered yet.
    Invited,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Accepted => "accepted",
            MembershipStatus::Rejected => "rejected",
            MembershipStatus::Invited => "invited",
        }
    }

    /// Whether a transition from `self` to `next` is allowed by the membership
    /// state machine.
    pub fn can_transition_to(&self, next: MembershipStatus) -> bool {
        use MembershipStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Invited, Accepted)
                | (Invited, Rejected)
                | (Rejected, Pending)
                | (Rejected, Invited)
        )
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MembershipStatus::Pending),
            "accepted" => Ok(MembershipStatus::Accepted),
            "rejected" => Ok(MembershipStatus::Rejected),
            "invited" => Ok(MembershipStatus::Invited),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Privacy mode of a group, inherited by all group-scoped content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupPrivacy {
    Public,
    #[default]
    Private,
}

impl GroupPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPrivacy::Public => "public",
            GroupPrivacy::Private => "private",
        }
    }
}

impl FromStr for GroupPrivacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(GroupPrivacy::Public),
            "private" => Ok(GroupPrivacy::Private),
            _ => Err(format!("Invalid group privacy: {}", s)),
        }
    }
}

impl fmt::Display for GroupPrivacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub privacy: GroupPrivacy,
    /// Holder of the creator reference; changes only through succession.
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's row in a group. Keyed by `(group_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub status: MembershipStatus,
    pub invited_by: Option<Uuid>,
    /// Set when the row enters `accepted`; the succession tie-breaker.
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn is_accepted(&self) -> bool {
        self.status == MembershipStatus::Accepted
    }

    /// Accepted creator or admin.
    pub fn holds_authority(&self) -> bool {
        self.is_accepted() && self.role.is_authority()
    }
}

/// Input for inserting a membership row.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub status: MembershipStatus,
    pub invited_by: Option<Uuid>,
}

/// Conditional status transition applied by the store only when the row is
/// still in `from`.
#[derive(Debug, Clone, Copy)]
pub struct StatusTransition {
    pub from: MembershipStatus,
    pub to: MembershipStatus,
    /// Replaces `invited_by` when set.
    pub invited_by: Option<Uuid>,
}

/// Request payload for creating a group.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateGroupRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub privacy: GroupPrivacy,
}

/// Outcome of a role change made through the membership engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleChange {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub previous_role: GroupRole,
    pub role: GroupRole,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of removing a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RemovedMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub removed_by: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_role_as_str() {
        assert_eq!(GroupRole::Creator.as_str(), "creator");
        assert_eq!(GroupRole::Admin.as_str(), "admin");
        assert_eq!(GroupRole::Member.as_str(), "member");
    }

    #[test]
    fn test_group_role_from_str() {
        assert_eq!(GroupRole::from_str("creator").unwrap(), GroupRole::Creator);
        assert_eq!(GroupRole::from_str("ADMIN").unwrap(), GroupRole::Admin);
        assert_eq!(GroupRole::from_str("Member").unwrap(), GroupRole::Member);
        assert!(GroupRole::from_str("owner").is_err());
    }

    #[test]
    fn test_group_role_authority() {
        assert!(GroupRole::Creator.is_authority());
        assert!(GroupRole::Admin.is_authority());
        assert!(!GroupRole::Member.is_authority());
    }

    #[test]
    fn test_status_transitions() {
        use MembershipStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Invited.can_transition_to(Accepted));
        assert!(Invited.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Pending));

        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Invited));
        assert!(!Invited.can_transition_to(Pending));
    }

    #[test]
    fn test_holds_authority_requires_accepted() {
        let now = Utc::now();
        let mut member = GroupMember {
            group_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: GroupRole::Admin,
            status: MembershipStatus::Invited,
            invited_by: None,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!member.holds_authority());

        member.status = MembershipStatus::Accepted;
        assert!(member.holds_authority());

        member.role = GroupRole::Member;
        assert!(!member.holds_authority());
    }

    #[test]
    fn test_group_privacy_parse_and_default() {
        assert_eq!(GroupPrivacy::default(), GroupPrivacy::Private);
        assert_eq!(GroupPrivacy::from_str("PUBLIC").unwrap(), GroupPrivacy::Public);
        assert_eq!(format!("{}", GroupPrivacy::Private), "private");
    }

    #[test]
    fn test_create_group_request_validation() {
        let valid = CreateGroupRequest {
            name: "Climbing club".to_string(),
            description: Some("Weekend bouldering".to_string()),
            privacy: GroupPrivacy::Public,
        };
        assert!(valid.validate().is_ok());

        let blank = CreateGroupRequest {
            name: "   ".to_string(),
            description: None,
            privacy: GroupPrivacy::Private,
        };
        assert!(blank.validate().is_err());

        let long_description = CreateGroupRequest {
            name: "Test".to_string(),
            description: Some("x".repeat(501)),
            privacy: GroupPrivacy::Private,
        };
        assert!(long_description.validate().is_err());
    }
}
