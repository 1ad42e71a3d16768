//! Content engine: publishing, visibility changes, comments, events and deletion.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use super::visibility::VisibilityEngine;
use crate::error::DomainError;
use crate::models::{
    ContentItem, ContentKind, ContentRef, ContentScope, EventDetails, EventResponse,
    EventResponseKind, GroupMember, NewComment, NewEvent, NewGroupPost, NewPost, Visibility,
    VisibilityUpdate,
};
use crate::store::SocialStore;

#[derive(Clone)]
pub struct ContentEngine<S> {
    store: S,
    visibility: VisibilityEngine<S>,
}

impl<S: SocialStore> ContentEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            visibility: VisibilityEngine::new(store.clone()),
            store,
        }
    }

    /// Publishes a personal post with its allow-list.
    pub async fn publish_post(
        &self,
        author_id: Uuid,
        request: NewPost,
    ) -> Result<ContentItem, DomainError> {
        request.validate()?;
        self.require_user(author_id).await?;
        self.check_allow_list(request.visibility, &request.viewers)
            .await?;

        let item = new_item(
            ContentKind::Post,
            author_id,
            ContentScope::Personal {
                visibility: request.visibility,
            },
            request.body,
            None,
        );
        self.store.insert_item(&item, &request.viewers).await?;

        info!(
            post_id = %item.id,
            owner_user_id = %author_id,
            visibility = %request.visibility,
            viewers = request.viewers.len(),
            "Post published"
        );
        Ok(item)
    }

    /// Changes the visibility of a personal post or event. The allow-list is
    /// replaced as a whole and cleared for every mode but `custom`.
    pub async fn update_visibility(
        &self,
        caller_id: Uuid,
        item: ContentRef,
        update: VisibilityUpdate,
    ) -> Result<ContentItem, DomainError> {
        update.validate()?;
        let existing = self.load(item).await?;
        if existing.owner_id != caller_id {
            return Err(DomainError::Forbidden(
                "Only the owner can change visibility".into(),
            ));
        }
        if existing.visibility().is_none() {
            return Err(DomainError::InvalidState(format!(
                "A {} does not carry its own visibility",
                existing.kind
            )));
        }
        self.check_allow_list(update.visibility, &update.viewers)
            .await?;

        let updated = self
            .store
            .replace_visibility(item, update.visibility, &update.viewers, Utc::now())
            .await?;
        if !updated {
            return Err(DomainError::NotFound(format!("{} not found", item.kind)));
        }

        info!(
            item = %item,
            owner_user_id = %caller_id,
            visibility = %update.visibility,
            viewers = update.viewers.len(),
            "Visibility updated"
        );
        self.load(item).await
    }

    /// The current allow-list. Owner only.
    pub async fn viewers(&self, caller_id: Uuid, item: ContentRef) -> Result<Vec<Uuid>, DomainError> {
        let existing = self.load(item).await?;
        if existing.owner_id != caller_id {
            return Err(DomainError::Forbidden(
                "Only the owner can list viewers".into(),
            ));
        }
        Ok(self.store.list_viewers(item).await?)
    }

    pub async fn publish_group_post(
        &self,
        author_id: Uuid,
        request: NewGroupPost,
    ) -> Result<ContentItem, DomainError> {
        request.validate()?;
        self.require_group_member(request.group_id, author_id)
            .await?;

        let item = new_item(
            ContentKind::GroupPost,
            author_id,
            ContentScope::Group {
                group_id: request.group_id,
            },
            request.body,
            None,
        );
        self.store.insert_item(&item, &[]).await?;

        info!(
            group_post_id = %item.id,
            group_id = %request.group_id,
            owner_user_id = %author_id,
            "Group post published"
        );
        Ok(item)
    }

    /// Comments on a visible post, group post or event.
    pub async fn comment(
        &self,
        author_id: Uuid,
        request: NewComment,
    ) -> Result<ContentItem, DomainError> {
        request.validate()?;
        if request.parent.kind == ContentKind::Comment {
            return Err(DomainError::InvalidState(
                "Comments cannot be replied to".into(),
            ));
        }
        self.visibility.authorize(author_id, request.parent).await?;

        let item = new_item(
            ContentKind::Comment,
            author_id,
            ContentScope::Inherited {
                parent: request.parent,
            },
            request.body,
            None,
        );
        self.store.insert_item(&item, &[]).await?;

        info!(
            comment_id = %item.id,
            parent = %request.parent,
            owner_user_id = %author_id,
            "Comment added"
        );
        Ok(item)
    }

    /// Creates a group event, or a personal one when no group is given.
    pub async fn create_event(
        &self,
        creator_id: Uuid,
        request: NewEvent,
    ) -> Result<ContentItem, DomainError> {
        request.validate()?;

        let scope = match request.group_id {
            Some(group_id) => {
                if request.visibility.is_some() || !request.viewers.is_empty() {
                    return Err(DomainError::Validation(
                        "visibility: Group events take the group's privacy".into(),
                    ));
                }
                self.require_group_member(group_id, creator_id).await?;
                ContentScope::Group { group_id }
            }
            None => {
                let visibility = request.visibility.ok_or_else(|| {
                    DomainError::Validation("visibility: Personal events need a visibility".into())
                })?;
                self.require_user(creator_id).await?;
                self.check_allow_list(visibility, &request.viewers).await?;
                ContentScope::Personal { visibility }
            }
        };

        let item = new_item(
            ContentKind::Event,
            creator_id,
            scope,
            request.description,
            Some(EventDetails {
                title: request.title.trim().to_string(),
                starts_at: request.starts_at,
            }),
        );
        self.store.insert_item(&item, &request.viewers).await?;

        info!(
            event_id = %item.id,
            group_id = ?request.group_id,
            owner_user_id = %creator_id,
            "Event created"
        );
        Ok(item)
    }

    /// Records or replaces the user's answer to an event they can see.
    pub async fn respond_to_event(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        response: EventResponseKind,
    ) -> Result<EventResponse, DomainError> {
        let event = ContentRef::new(ContentKind::Event, event_id);
        self.visibility.authorize(user_id, event).await?;

        let response = EventResponse {
            event_id,
            user_id,
            response,
            responded_at: Utc::now(),
        };
        self.store.upsert_event_response(&response).await?;

        info!(
            event_id = %event_id,
            user_id = %user_id,
            response = %response.response,
            "Event response recorded"
        );
        Ok(response)
    }

    pub async fn event_responses(
        &self,
        viewer_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<EventResponse>, DomainError> {
        let event = ContentRef::new(ContentKind::Event, event_id);
        self.visibility.authorize(viewer_id, event).await?;
        Ok(self.store.list_event_responses(event_id).await?)
    }

    /// Loads an item the viewer is allowed to see.
    pub async fn get(&self, viewer_id: Uuid, item: ContentRef) -> Result<ContentItem, DomainError> {
        self.visibility.authorize(viewer_id, item).await
    }

    /// Deletes an item and its comments. Group content may also be deleted by
    /// an authority-holder of the group.
    pub async fn delete_item(&self, caller_id: Uuid, item: ContentRef) -> Result<(), DomainError> {
        let existing = self.load(item).await?;

        if existing.owner_id != caller_id {
            let group_id = self.owning_group(&existing).await?;
            let moderator = match group_id {
                Some(group_id) => self
                    .store
                    .get_member(group_id, caller_id)
                    .await?
                    .is_some_and(|m| m.holds_authority()),
                None => false,
            };
            if !moderator {
                debug!(
                    item = %item,
                    actor_user_id = %caller_id,
                    "Refused to delete content of another user"
                );
                return Err(DomainError::Forbidden(
                    "Only the owner or a group admin can delete this".into(),
                ));
            }
        }

        if !self.store.delete_item(item).await? {
            return Err(DomainError::NotFound(format!("{} not found", item.kind)));
        }

        info!(item = %item, actor_user_id = %caller_id, "Content deleted");
        Ok(())
    }

    /// Group of a group-scoped item, or of a comment's group-scoped parent.
    async fn owning_group(&self, item: &ContentItem) -> Result<Option<Uuid>, DomainError> {
        match item.scope {
            ContentScope::Group { group_id } => Ok(Some(group_id)),
            ContentScope::Inherited { parent } => Ok(self
                .store
                .find_item(parent)
                .await?
                .and_then(|parent| parent.group_id())),
            ContentScope::Personal { .. } => Ok(None),
        }
    }

    async fn load(&self, item: ContentRef) -> Result<ContentItem, DomainError> {
        self.store
            .find_item(item)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("{} not found", item.kind)))
    }

    async fn require_user(&self, user_id: Uuid) -> Result<(), DomainError> {
        match self.store.find_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::NotFound("User not found".into())),
        }
    }

    async fn require_group_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupMember, DomainError> {
        if self.store.find_group(group_id).await?.is_none() {
            return Err(DomainError::NotFound("Group not found".into()));
        }
        match self.store.get_member(group_id, user_id).await? {
            Some(member) if member.is_accepted() => Ok(member),
            _ => Err(DomainError::Forbidden(
                "Only group members can publish in this group".into(),
            )),
        }
    }

    /// `custom` needs a non-empty list of known users; other modes take none.
    async fn check_allow_list(
        &self,
        visibility: Visibility,
        viewers: &[Uuid],
    ) -> Result<(), DomainError> {
        match visibility {
            Visibility::Custom if viewers.is_empty() => Err(DomainError::Validation(
                "viewers: Custom visibility needs at least one viewer".into(),
            )),
            Visibility::Custom => {
                for viewer in viewers {
                    if self.store.find_user(*viewer).await?.is_none() {
                        return Err(DomainError::NotFound(format!("Viewer {} not found", viewer)));
                    }
                }
                Ok(())
            }
            _ if !viewers.is_empty() => Err(DomainError::Validation(format!(
                "viewers: Only custom visibility takes viewers, not {}",
                visibility
            ))),
            _ => Ok(()),
        }
    }
}

fn new_item(
    kind: ContentKind,
    owner_id: Uuid,
    scope: ContentScope,
    body: String,
    event: Option<EventDetails>,
) -> ContentItem {
    let now = Utc::now();
    ContentItem {
        id: Uuid::new_v4(),
        kind,
        owner_id,
        scope,
        body,
        event,
        created_at: now,
        updated_at: now,
    }
}
