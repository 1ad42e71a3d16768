//! Domain models for the Agora social core.

pub mod content;
pub mod group;
pub mod user;

pub use content::{
    ContentItem, ContentKind, ContentRef, ContentScope, EventDetails, EventResponse,
    EventResponseKind, NewComment, NewEvent, NewGroupPost, NewPost, Visibility, VisibilityUpdate,
};
pub use group::{
    CreateGroupRequest, Group, GroupMember, GroupPrivacy, GroupRole, MembershipStatus, NewMember,
    RemovedMember, RoleChange, StatusTransition,
};
pub use user::{Follow, FollowStatus, ProfileVisibility, User};
