//! Single entry point bundling every engine over one store.

use std::sync::Arc;

use shared::pagination::{Page, PageRequest};
use uuid::Uuid;

use super::content::ContentEngine;
use super::events::EventSink;
use super::feed::{FeedComposer, FeedOptions};
use super::follow::FollowEngine;
use super::membership::MembershipEngine;
use super::succession::SuccessionOutcome;
use super::visibility::{Disclosure, VisibilityEngine};
use crate::error::DomainError;
use crate::models::{
    ContentItem, ContentRef, CreateGroupRequest, EventResponse, EventResponseKind, Follow, Group,
    GroupMember, NewComment, NewEvent, NewGroupPost, NewPost, RemovedMember, RoleChange,
    VisibilityUpdate,
};
use crate::store::SocialStore;

/// Every operation takes the resolved caller explicitly.
#[derive(Clone)]
pub struct SocialService<S> {
    membership: MembershipEngine<S>,
    visibility: VisibilityEngine<S>,
    feed: FeedComposer<S>,
    content: ContentEngine<S>,
    follows: FollowEngine<S>,
}

impl<S: SocialStore> SocialService<S> {
    pub fn new(store: S, events: Arc<dyn EventSink>) -> Self {
        Self::with_feed_options(store, events, FeedOptions::default())
    }

    pub fn with_feed_options(store: S, events: Arc<dyn EventSink>, feed: FeedOptions) -> Self {
        Self {
            membership: MembershipEngine::new(store.clone(), events),
            visibility: VisibilityEngine::new(store.clone()),
            feed: FeedComposer::new(store.clone(), feed),
            content: ContentEngine::new(store.clone()),
            follows: FollowEngine::new(store),
        }
    }

    // Membership

    pub async fn create_group(
        &self,
        caller_id: Uuid,
        request: CreateGroupRequest,
    ) -> Result<Group, DomainError> {
        self.membership.create_group(caller_id, request).await
    }

    pub async fn promote(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleChange, DomainError> {
        self.membership.promote(group_id, target_id, caller_id).await
    }

    pub async fn demote(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RoleChange, DomainError> {
        self.membership.demote(group_id, target_id, caller_id).await
    }

    pub async fn remove(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RemovedMember, DomainError> {
        self.membership.remove(group_id, target_id, caller_id).await
    }

    pub async fn leave(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        self.membership.leave(group_id, caller_id).await
    }

    pub async fn depart(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<SuccessionOutcome, DomainError> {
        self.membership.depart(group_id, user_id).await
    }

    pub async fn restore_authority(&self, group_id: Uuid) -> Result<SuccessionOutcome, DomainError> {
        self.membership.restore_authority(group_id).await
    }

    pub async fn request_join(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        self.membership.request_join(group_id, caller_id).await
    }

    pub async fn invite(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        self.membership.invite(group_id, target_id, caller_id).await
    }

    pub async fn respond_to_invite(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
        accept: bool,
    ) -> Result<GroupMember, DomainError> {
        self.membership
            .respond_to_invite(group_id, caller_id, accept)
            .await
    }

    pub async fn resolve_join_request(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        caller_id: Uuid,
        approve: bool,
    ) -> Result<GroupMember, DomainError> {
        self.membership
            .resolve_join_request(group_id, target_id, caller_id, approve)
            .await
    }

    pub async fn members(
        &self,
        group_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Vec<GroupMember>, DomainError> {
        self.membership.members(group_id, caller_id).await
    }

    // Visibility and feed

    pub async fn can_view(&self, viewer_id: Uuid, item: ContentRef) -> Result<bool, DomainError> {
        self.visibility.can_view_ref(viewer_id, item).await
    }

    pub async fn explain_disclosure(
        &self,
        viewer_id: Uuid,
        item: &ContentItem,
    ) -> Result<Disclosure, DomainError> {
        self.visibility.evaluate(viewer_id, item).await
    }

    pub async fn compose_feed(
        &self,
        viewer_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<ContentItem>, DomainError> {
        self.feed.compose(viewer_id, page).await
    }

    // Content

    pub async fn get_item(&self, viewer_id: Uuid, item: ContentRef) -> Result<ContentItem, DomainError> {
        self.content.get(viewer_id, item).await
    }

    pub async fn publish_post(
        &self,
        author_id: Uuid,
        request: NewPost,
    ) -> Result<ContentItem, DomainError> {
        self.content.publish_post(author_id, request).await
    }

    pub async fn update_visibility(
        &self,
        caller_id: Uuid,
        item: ContentRef,
        update: VisibilityUpdate,
    ) -> Result<ContentItem, DomainError> {
        self.content.update_visibility(caller_id, item, update).await
    }

    pub async fn viewers(&self, caller_id: Uuid, item: ContentRef) -> Result<Vec<Uuid>, DomainError> {
        self.content.viewers(caller_id, item).await
    }

    pub async fn publish_group_post(
        &self,
        author_id: Uuid,
        request: NewGroupPost,
    ) -> Result<ContentItem, DomainError> {
        self.content.publish_group_post(author_id, request).await
    }

    pub async fn comment(
        &self,
        author_id: Uuid,
        request: NewComment,
    ) -> Result<ContentItem, DomainError> {
        self.content.comment(author_id, request).await
    }

    pub async fn create_event(
        &self,
        creator_id: Uuid,
        request: NewEvent,
    ) -> Result<ContentItem, DomainError> {
        self.content.create_event(creator_id, request).await
    }

    pub async fn respond_to_event(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        response: EventResponseKind,
    ) -> Result<EventResponse, DomainError> {
        self.content
            .respond_to_event(user_id, event_id, response)
            .await
    }

    pub async fn event_responses(
        &self,
        viewer_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<EventResponse>, DomainError> {
        self.content.event_responses(viewer_id, event_id).await
    }

    pub async fn delete_item(&self, caller_id: Uuid, item: ContentRef) -> Result<(), DomainError> {
        self.content.delete_item(caller_id, item).await
    }

    // Follows

    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<Follow, DomainError> {
        self.follows.follow(follower_id, followee_id).await
    }

    pub async fn respond_to_follow(
        &self,
        followee_id: Uuid,
        follower_id: Uuid,
        accept: bool,
    ) -> Result<Follow, DomainError> {
        self.follows
            .respond_to_follow(followee_id, follower_id, accept)
            .await
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<(), DomainError> {
        self.follows.unfollow(follower_id, followee_id).await
    }
}
