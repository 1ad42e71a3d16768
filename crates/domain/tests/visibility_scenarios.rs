//! Visibility, content and follow scenarios.

mod common;

use chrono::{Duration, Utc};
use common::Fixture;
use domain::models::{
    ContentKind, ContentRef, EventResponseKind, FollowStatus, GroupPrivacy, NewComment, NewEvent,
    ProfileVisibility, Visibility, VisibilityUpdate,
};
use domain::services::DisclosureRule;
use domain::DomainError;
use tokio_test::assert_ok;
use uuid::Uuid;

#[tokio::test]
async fn test_custom_allow_list_is_replaced_not_merged() {
    let fx = Fixture::new();
    let owner = fx.user().await;
    let a = fx.user().await;
    let b = fx.user().await;
    let c = fx.user().await;
    let post = fx.post(owner, Visibility::Custom, vec![a, b]).await;
    let item = post.content_ref();

    assert!(fx.service.can_view(a, item).await.unwrap());
    assert!(fx.service.can_view(b, item).await.unwrap());
    assert!(!fx.service.can_view(c, item).await.unwrap());

    fx.service
        .update_visibility(
            owner,
            item,
            VisibilityUpdate {
                visibility: Visibility::Custom,
                viewers: vec![c],
            },
        )
        .await
        .unwrap();

    assert!(!fx.service.can_view(a, item).await.unwrap());
    assert!(!fx.service.can_view(b, item).await.unwrap());
    assert!(fx.service.can_view(c, item).await.unwrap());
    assert_eq!(fx.service.viewers(owner, item).await.unwrap(), vec![c]);
}

#[tokio::test]
async fn test_leaving_custom_clears_allow_list() {
    let fx = Fixture::new();
    let owner = fx.user().await;
    let a = fx.user().await;
    let post = fx.post(owner, Visibility::Custom, vec![a]).await;
    let item = post.content_ref();

    let updated = fx
        .service
        .update_visibility(
            owner,
            item,
            VisibilityUpdate {
                visibility: Visibility::Private,
                viewers: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.visibility(), Some(Visibility::Private));
    assert!(fx.service.viewers(owner, item).await.unwrap().is_empty());
    assert!(!fx.service.can_view(a, item).await.unwrap());
    assert!(fx.service.can_view(owner, item).await.unwrap());
}

#[tokio::test]
async fn test_allow_list_rules() {
    let fx = Fixture::new();
    let owner = fx.user().await;
    let a = fx.user().await;

    let err = fx
        .service
        .publish_post(
            owner,
            domain::models::NewPost {
                body: "secret".into(),
                visibility: Visibility::Custom,
                viewers: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = fx
        .service
        .publish_post(
            owner,
            domain::models::NewPost {
                body: "hello".into(),
                visibility: Visibility::Public,
                viewers: vec![a],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = fx
        .service
        .publish_post(
            owner,
            domain::models::NewPost {
                body: "secret".into(),
                visibility: Visibility::Custom,
                viewers: vec![Uuid::new_v4()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    let post = fx.post(owner, Visibility::Custom, vec![a]).await;
    let err = fx
        .service
        .update_visibility(
            a,
            post.content_ref(),
            VisibilityUpdate {
                visibility: Visibility::Public,
                viewers: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn test_unfollow_revokes_followers_visibility() {
    let fx = Fixture::new();
    let owner = fx.user().await;
    let viewer = fx.user().await;

    let edge = fx.service.follow(viewer, owner).await.unwrap();
    assert_eq!(edge.status, FollowStatus::Accepted);

    let post = fx.post(owner, Visibility::Followers, vec![]).await;
    let item = post.content_ref();
    assert!(fx.service.can_view(viewer, item).await.unwrap());

    fx.service.unfollow(viewer, owner).await.unwrap();
    assert!(!fx.service.can_view(viewer, item).await.unwrap());

    let err = fx.service.unfollow(viewer, owner).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_private_profile_follow_needs_approval() {
    let fx = Fixture::new();
    let owner = fx.user_with_profile(ProfileVisibility::Private).await;
    let viewer = fx.user().await;
    let post = fx.post(owner, Visibility::Followers, vec![]).await;
    let item = post.content_ref();

    let edge = fx.service.follow(viewer, owner).await.unwrap();
    assert_eq!(edge.status, FollowStatus::Pending);
    assert!(!fx.service.can_view(viewer, item).await.unwrap());

    let err = fx.service.follow(viewer, owner).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));

    let edge = fx
        .service
        .respond_to_follow(owner, viewer, false)
        .await
        .unwrap();
    assert_eq!(edge.status, FollowStatus::Rejected);
    assert!(!fx.service.can_view(viewer, item).await.unwrap());

    // A rejected follower may ask again.
    let edge = fx.service.follow(viewer, owner).await.unwrap();
    assert_eq!(edge.status, FollowStatus::Pending);
    assert_ok!(fx.service.respond_to_follow(owner, viewer, true).await);
    assert!(fx.service.can_view(viewer, item).await.unwrap());

    let err = fx.service.follow(owner, owner).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));
}

#[tokio::test]
async fn test_private_group_content_follows_membership() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let member = fx.member(group.id, creator).await;
    let outsider = fx.user().await;
    fx.group_posts(group.id, creator, 1).await;

    let page = fx
        .service
        .compose_feed(creator, Default::default())
        .await
        .unwrap();
    let post = page.items[0].clone();
    let item = post.content_ref();

    assert!(fx.service.can_view(member, item).await.unwrap());
    assert!(!fx.service.can_view(outsider, item).await.unwrap());

    let pending = fx.user().await;
    fx.service.request_join(group.id, pending).await.unwrap();
    assert!(!fx.service.can_view(pending, item).await.unwrap());

    // Role is irrelevant; membership is re-read on every call.
    fx.service.remove(group.id, member, creator).await.unwrap();
    assert!(!fx.service.can_view(member, item).await.unwrap());

    let disclosure = fx
        .service
        .explain_disclosure(outsider, &post)
        .await
        .unwrap();
    assert_eq!(disclosure.rule(), DisclosureRule::NotGroupMember);

    let err = fx.service.get_item(outsider, item).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn test_public_group_content_is_visible_to_everyone() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Public).await;
    let post = fx
        .service
        .publish_group_post(
            creator,
            domain::models::NewGroupPost {
                group_id: group.id,
                body: "Open meeting".into(),
            },
        )
        .await
        .unwrap();

    assert!(fx
        .service
        .can_view(fx.user().await, post.content_ref())
        .await
        .unwrap());

    let err = fx
        .service
        .publish_group_post(
            fx.user().await,
            domain::models::NewGroupPost {
                group_id: group.id,
                body: "Drive-by".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn test_comments_follow_parent() {
    let fx = Fixture::new();
    let owner = fx.user().await;
    let friend = fx.user().await;
    let stranger = fx.user().await;
    let post = fx.post(owner, Visibility::Custom, vec![friend]).await;

    let comment = fx
        .service
        .comment(
            friend,
            NewComment {
                parent: post.content_ref(),
                body: "Nice".into(),
            },
        )
        .await
        .unwrap();
    let comment_ref = comment.content_ref();

    assert!(fx.service.can_view(owner, comment_ref).await.unwrap());
    assert!(!fx.service.can_view(stranger, comment_ref).await.unwrap());

    let err = fx
        .service
        .comment(
            stranger,
            NewComment {
                parent: post.content_ref(),
                body: "Let me in".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let err = fx
        .service
        .comment(
            owner,
            NewComment {
                parent: comment_ref,
                body: "Nested".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));

    fx.service
        .update_visibility(
            owner,
            post.content_ref(),
            VisibilityUpdate {
                visibility: Visibility::Public,
                viewers: vec![],
            },
        )
        .await
        .unwrap();
    assert!(fx.service.can_view(stranger, comment_ref).await.unwrap());
}

#[tokio::test]
async fn test_group_admin_can_delete_group_content() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let member = fx.member(group.id, creator).await;
    let other = fx.member(group.id, creator).await;
    let post = fx
        .service
        .publish_group_post(
            member,
            domain::models::NewGroupPost {
                group_id: group.id,
                body: "Spam".into(),
            },
        )
        .await
        .unwrap();
    let comment = fx
        .service
        .comment(
            other,
            NewComment {
                parent: post.content_ref(),
                body: "Agreed".into(),
            },
        )
        .await
        .unwrap();

    let err = fx
        .service
        .delete_item(other, post.content_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    assert_ok!(fx.service.delete_item(creator, post.content_ref()).await);
    let err = fx
        .service
        .can_view(creator, comment.content_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_personal_event_responses() {
    let fx = Fixture::new();
    let host = fx.user().await;
    let guest = fx.user().await;
    let stranger = fx.user().await;

    let event = fx
        .service
        .create_event(
            host,
            NewEvent {
                group_id: None,
                visibility: Some(Visibility::Custom),
                viewers: vec![guest],
                title: "Board games".into(),
                description: "Bring snacks".into(),
                starts_at: Utc::now() + Duration::days(3),
            },
        )
        .await
        .unwrap();
    assert_eq!(event.kind, ContentKind::Event);

    let response = fx
        .service
        .respond_to_event(guest, event.id, EventResponseKind::Going)
        .await
        .unwrap();
    assert_eq!(response.response, EventResponseKind::Going);
    fx.service
        .respond_to_event(guest, event.id, EventResponseKind::NotGoing)
        .await
        .unwrap();

    let responses = fx.service.event_responses(host, event.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].response, EventResponseKind::NotGoing);

    let err = fx
        .service
        .respond_to_event(stranger, event.id, EventResponseKind::Going)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let err = fx
        .service
        .respond_to_event(guest, Uuid::new_v4(), EventResponseKind::Going)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_group_event_rules() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let outsider = fx.user().await;
    let starts_at = Utc::now() + Duration::days(1);

    let err = fx
        .service
        .create_event(
            creator,
            NewEvent {
                group_id: Some(group.id),
                visibility: Some(Visibility::Public),
                viewers: vec![],
                title: "Meetup".into(),
                description: String::new(),
                starts_at,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = fx
        .service
        .create_event(
            outsider,
            NewEvent {
                group_id: Some(group.id),
                visibility: None,
                viewers: vec![],
                title: "Meetup".into(),
                description: String::new(),
                starts_at,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let event = fx
        .service
        .create_event(
            creator,
            NewEvent {
                group_id: Some(group.id),
                visibility: None,
                viewers: vec![],
                title: "Meetup".into(),
                description: String::new(),
                starts_at,
            },
        )
        .await
        .unwrap();
    let item = ContentRef::new(ContentKind::Event, event.id);
    assert!(!fx.service.can_view(outsider, item).await.unwrap());

    let err = fx
        .service
        .update_visibility(
            creator,
            item,
            VisibilityUpdate {
                visibility: Visibility::Public,
                viewers: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));
}
