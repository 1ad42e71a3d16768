//! Content domain models: posts, group posts, comments and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::{validate_not_blank, validate_unique_list};

/// Visibility mode of personal (non-group) content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    /// Accounts following the owner with an accepted edge.
    Followers,
    /// Owner only.
    Private,
    /// Users named in the item's allow-list.
    Custom,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Followers => "followers",
            Visibility::Private => "private",
            Visibility::Custom => "custom",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "followers" => Ok(Visibility::Followers),
            "private" => Ok(Visibility::Private),
            "custom" => Ok(Visibility::Custom),
            _ => Err(format!("Invalid visibility: {}", s)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    GroupPost,
    Comment,
    Event,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::GroupPost => "group_post",
            ContentKind::Comment => "comment",
            ContentKind::Event => "event",
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ContentKind::Post),
            "group_post" => Ok(ContentKind::GroupPost),
            "comment" => Ok(ContentKind::Comment),
            "event" => Ok(ContentKind::Event),
            _ => Err(format!("Invalid content kind: {}", s)),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed reference to a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: Uuid,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Where an item's visibility comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum ContentScope {
    /// Personal content carrying its own visibility mode.
    Personal { visibility: Visibility },
    /// Group content; disclosure follows the group's privacy.
    Group { group_id: Uuid },
    /// Comments; disclosure follows the parent item.
    Inherited { parent: ContentRef },
}

/// Event-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventDetails {
    pub title: String,
    pub starts_at: DateTime<Utc>,
}

/// A post, group post, comment or event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContentItem {
    pub id: Uuid,
    pub kind: ContentKind,
    pub owner_id: Uuid,
    pub scope: ContentScope,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn content_ref(&self) -> ContentRef {
        ContentRef::new(self.kind, self.id)
    }

    /// Owning group of directly group-scoped items.
    pub fn group_id(&self) -> Option<Uuid> {
        match self.scope {
            ContentScope::Group { group_id } => Some(group_id),
            _ => None,
        }
    }

    /// Visibility of personal items.
    pub fn visibility(&self) -> Option<Visibility> {
        match self.scope {
            ContentScope::Personal { visibility } => Some(visibility),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<ContentRef> {
        match self.scope {
            ContentScope::Inherited { parent } => Some(parent),
            _ => None,
        }
    }
}

/// A user's answer to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventResponseKind {
    Going,
    NotGoing,
}

impl EventResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventResponseKind::Going => "going",
            EventResponseKind::NotGoing => "not_going",
        }
    }
}

impl fmt::Display for EventResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventResponse {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub response: EventResponseKind,
    pub responded_at: DateTime<Utc>,
}

fn validate_viewer_list(viewers: &[Uuid]) -> Result<(), validator::ValidationError> {
    validate_unique_list(viewers)
}

/// Request payload for publishing a personal post.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NewPost {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Body must be between 1 and 5000 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub body: String,

    pub visibility: Visibility,

    /// Allow-list for `custom` visibility.
    #[serde(default)]
    #[validate(custom(function = "validate_viewer_list"))]
    pub viewers: Vec<Uuid>,
}

/// Request payload for changing the visibility of a personal item.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct VisibilityUpdate {
    pub visibility: Visibility,

    /// Replaces the whole allow-list.
    #[serde(default)]
    #[validate(custom(function = "validate_viewer_list"))]
    pub viewers: Vec<Uuid>,
}

/// Request payload for a post inside a group.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NewGroupPost {
    pub group_id: Uuid,

    #[validate(length(
        min = 1,
        max = 5000,
        message = "Body must be between 1 and 5000 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub body: String,
}

/// Request payload for a comment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NewComment {
    pub parent: ContentRef,

    #[validate(length(
        min = 1,
        max = 2000,
        message = "Comment must be between 1 and 2000 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub body: String,
}

/// Request payload for an event, either inside a group or personal.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NewEvent {
    pub group_id: Option<Uuid>,

    /// Required for personal events, rejected for group events.
    pub visibility: Option<Visibility>,

    #[serde(default)]
    #[validate(custom(function = "validate_viewer_list"))]
    pub viewers: Vec<Uuid>,

    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: String,

    pub starts_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personal_item(visibility: Visibility) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: Uuid::new_v4(),
            kind: ContentKind::Post,
            owner_id: Uuid::new_v4(),
            scope: ContentScope::Personal { visibility },
            body: "hello".to_string(),
            event: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_visibility_from_str() {
        assert_eq!(Visibility::from_str("public").unwrap(), Visibility::Public);
        assert_eq!(Visibility::from_str("FOLLOWERS").unwrap(), Visibility::Followers);
        assert!(Visibility::from_str("almost_private").is_err());
        assert_eq!(Visibility::from_str("custom").unwrap(), Visibility::Custom);
        assert!(Visibility::from_str("friends").is_err());
    }

    #[test]
    fn test_content_kind_round_trip_names() {
        for kind in [
            ContentKind::Post,
            ContentKind::GroupPost,
            ContentKind::Comment,
            ContentKind::Event,
        ] {
            assert_eq!(ContentKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_scope_accessors() {
        let item = personal_item(Visibility::Followers);
        assert_eq!(item.visibility(), Some(Visibility::Followers));
        assert_eq!(item.group_id(), None);
        assert_eq!(item.parent(), None);

        let group_id = Uuid::new_v4();
        let mut group_item = personal_item(Visibility::Public);
        group_item.kind = ContentKind::GroupPost;
        group_item.scope = ContentScope::Group { group_id };
        assert_eq!(group_item.group_id(), Some(group_id));
        assert_eq!(group_item.visibility(), None);
    }

    #[test]
    fn test_content_ref_display() {
        let id = Uuid::nil();
        let reference = ContentRef::new(ContentKind::GroupPost, id);
        assert_eq!(
            reference.to_string(),
            "group_post:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_new_post_validation() {
        let valid = NewPost {
            body: "First post".to_string(),
            visibility: Visibility::Public,
            viewers: vec![],
        };
        assert!(valid.validate().is_ok());

        let blank = NewPost {
            body: "   ".to_string(),
            visibility: Visibility::Public,
            viewers: vec![],
        };
        assert!(blank.validate().is_err());

        let viewer = Uuid::new_v4();
        let duplicated = NewPost {
            body: "Secret".to_string(),
            visibility: Visibility::Custom,
            viewers: vec![viewer, viewer],
        };
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_scope_serialization_is_tagged() {
        let item = personal_item(Visibility::Custom);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["scope"]["scope"], "personal");
        assert_eq!(json["scope"]["visibility"], "custom");
        assert!(json.get("event").is_none());
    }
}
