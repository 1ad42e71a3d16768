//! Common fixtures for the engine scenario tests.
//!
//! Everything runs against `InMemoryStore`, so these tests need no database.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use domain::models::{
    ContentItem, CreateGroupRequest, Group, GroupPrivacy, NewGroupPost, NewPost,
    ProfileVisibility, User, Visibility,
};
use domain::services::{RecordingEventSink, SocialService};
use domain::store::{InMemoryStore, UserStore};
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use uuid::Uuid;

pub struct Fixture {
    pub store: InMemoryStore,
    pub sink: Arc<RecordingEventSink>,
    pub service: SocialService<InMemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let sink = Arc::new(RecordingEventSink::new());
        let service = SocialService::new(store.clone(), sink.clone());
        Self {
            store,
            sink,
            service,
        }
    }

    pub async fn user(&self) -> Uuid {
        self.user_with_profile(ProfileVisibility::Public).await
    }

    pub async fn user_with_profile(&self, profile: ProfileVisibility) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            nickname: Username().fake(),
            profile,
            created_at: Utc::now(),
        };
        self.store
            .insert_user(&user)
            .await
            .expect("Failed to insert user");
        user.id
    }

    pub async fn group(&self, creator_id: Uuid, privacy: GroupPrivacy) -> Group {
        self.service
            .create_group(
                creator_id,
                CreateGroupRequest {
                    name: Sentence(1..3).fake(),
                    description: None,
                    privacy,
                },
            )
            .await
            .expect("Failed to create group")
    }

    /// Adds an accepted plain member through the join-request flow.
    pub async fn join(&self, group_id: Uuid, user_id: Uuid, approver_id: Uuid) {
        self.service
            .request_join(group_id, user_id)
            .await
            .expect("Failed to request join");
        self.service
            .resolve_join_request(group_id, user_id, approver_id, true)
            .await
            .expect("Failed to approve join request");
    }

    /// Creates a user and makes them an accepted plain member.
    pub async fn member(&self, group_id: Uuid, approver_id: Uuid) -> Uuid {
        let user_id = self.user().await;
        self.join(group_id, user_id, approver_id).await;
        user_id
    }

    pub async fn group_posts(&self, group_id: Uuid, author_id: Uuid, count: usize) {
        for _ in 0..count {
            self.service
                .publish_group_post(
                    author_id,
                    NewGroupPost {
                        group_id,
                        body: Sentence(3..8).fake(),
                    },
                )
                .await
                .expect("Failed to publish group post");
        }
    }

    pub async fn post(&self, author_id: Uuid, visibility: Visibility, viewers: Vec<Uuid>) -> ContentItem {
        self.service
            .publish_post(
                author_id,
                NewPost {
                    body: Sentence(3..8).fake(),
                    visibility,
                    viewers,
                },
            )
            .await
            .expect("Failed to publish post")
    }
}
