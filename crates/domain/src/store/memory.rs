//! In-memory store used by tests and local tooling.
//!
//! A single async mutex guards the whole state. A group scope holds the
//! mutex for its lifetime and works on a copy, so scopes are serialized and a
//! dropped scope leaves no trace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Barrier, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ContentStore, FeedQuery, FollowStore, MembershipStore, SuccessionScope, SuccessorCandidate,
    UserStore,
};
use crate::error::StoreError;
use crate::models::{
    ContentItem, ContentKind, ContentRef, ContentScope, EventResponse, Follow, FollowStatus, Group,
    GroupMember, GroupRole, MembershipStatus, NewMember, StatusTransition, User, Visibility,
};

/// A one-shot failure consumed by the next matching operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fails the next `begin_succession`.
    Begin(StoreError),
    /// Fails the next `SuccessionScope::set_role`.
    SetRole(StoreError),
    /// Fails the next `SuccessionScope::commit`.
    Commit(StoreError),
}

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    members: BTreeMap<(Uuid, Uuid), GroupMember>,
    items: HashMap<ContentRef, ContentItem>,
    viewers: HashMap<ContentRef, HashSet<Uuid>>,
    responses: BTreeMap<(Uuid, Uuid), EventResponse>,
    follows: HashMap<(Uuid, Uuid), Follow>,
    last_tick: Option<DateTime<Utc>>,
}

impl State {
    /// Wall clock, forced strictly increasing.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn accepted_in(&self, group_id: Uuid) -> impl Iterator<Item = &GroupMember> + '_ {
        self.members
            .range((group_id, Uuid::nil())..=(group_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, member)| member)
            .filter(|member| member.is_accepted())
    }

    fn sorted_by_acceptance(mut members: Vec<GroupMember>) -> Vec<GroupMember> {
        members.sort_by_key(|m| (m.accepted_at, m.user_id));
        members
    }

    fn authority_holders(&self, group_id: Uuid) -> Vec<GroupMember> {
        Self::sorted_by_acceptance(
            self.accepted_in(group_id)
                .filter(|m| m.role.is_authority())
                .cloned()
                .collect(),
        )
    }

    fn authored_count(&self, group_id: Uuid, user_id: Uuid) -> i64 {
        self.items
            .values()
            .filter(|item| item.owner_id == user_id)
            .filter(|item| match item.scope {
                ContentScope::Group { group_id: owner } => owner == group_id,
                ContentScope::Inherited { parent } => self
                    .items
                    .get(&parent)
                    .and_then(ContentItem::group_id)
                    .is_some_and(|owner| owner == group_id),
                ContentScope::Personal { .. } => false,
            })
            .count() as i64
    }

    fn successor_candidates(&self, group_id: Uuid) -> Vec<SuccessorCandidate> {
        self.accepted_in(group_id)
            .filter(|m| !m.role.is_authority())
            .filter_map(|m| {
                m.accepted_at.map(|accepted_at| SuccessorCandidate {
                    user_id: m.user_id,
                    authored_count: self.authored_count(group_id, m.user_id),
                    accepted_at,
                })
            })
            .collect()
    }

    fn update_member_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Option<GroupMember> {
        let now = self.tick();
        match self.members.get_mut(&(group_id, user_id)) {
            Some(row) if row.is_accepted() && row.role == from => {
                row.role = to;
                row.updated_at = now;
                Some(row.clone())
            }
            _ => None,
        }
    }

    fn delete_plain_member(&mut self, group_id: Uuid, user_id: Uuid) -> bool {
        let key = (group_id, user_id);
        match self.members.get(&key) {
            Some(row) if row.is_accepted() && row.role == GroupRole::Member => {
                self.members.remove(&key);
                true
            }
            _ => false,
        }
    }

    fn is_accepted_follower(&self, follower_id: Uuid, followee_id: Uuid) -> bool {
        self.follows
            .get(&(follower_id, followee_id))
            .is_some_and(Follow::is_accepted)
    }

    fn is_feed_candidate(&self, viewer_id: Uuid, item: &ContentItem) -> bool {
        if !matches!(item.kind, ContentKind::Post | ContentKind::GroupPost) {
            return false;
        }
        if item.owner_id == viewer_id {
            return true;
        }
        match item.scope {
            ContentScope::Personal { visibility } => match visibility {
                Visibility::Public => true,
                Visibility::Followers => self.is_accepted_follower(viewer_id, item.owner_id),
                Visibility::Custom => self
                    .viewers
                    .get(&item.content_ref())
                    .is_some_and(|listed| listed.contains(&viewer_id)),
                Visibility::Private => false,
            },
            ContentScope::Group { group_id } => self
                .members
                .get(&(group_id, viewer_id))
                .is_some_and(GroupMember::is_accepted),
            ContentScope::Inherited { .. } => false,
        }
    }

    fn delete_item(&mut self, target: ContentRef) -> bool {
        if self.items.remove(&target).is_none() {
            return false;
        }
        self.viewers.remove(&target);
        self.responses.retain(|(event_id, _), _| *event_id != target.id);

        let comments: Vec<ContentRef> = self
            .items
            .values()
            .filter(|item| item.parent() == Some(target))
            .map(ContentItem::content_ref)
            .collect();
        for comment in comments {
            self.items.remove(&comment);
        }
        true
    }
}

/// Holds the next `remaining` scope openings at a shared barrier.
#[derive(Debug)]
struct BeginGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

/// Store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Vec<Fault>>>,
    gate: Arc<Mutex<Option<BeginGate>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for the next matching operation.
    pub async fn inject_fault(&self, fault: Fault) {
        self.faults.lock().await.push(fault);
    }

    /// Makes the next `parties` calls to `begin_succession` wait for each
    /// other before any of them takes the lock, so every caller has finished
    /// its unlocked work first.
    pub async fn hold_next_begins(&self, parties: usize) {
        *self.gate.lock().await = (parties > 0).then(|| BeginGate {
            barrier: Arc::new(Barrier::new(parties)),
            remaining: parties,
        });
    }

    async fn pass_gate(&self) {
        let barrier = {
            let mut slot = self.gate.lock().await;
            let barrier = slot.as_mut().map(|gate| {
                gate.remaining -= 1;
                Arc::clone(&gate.barrier)
            });
            if slot.as_ref().is_some_and(|gate| gate.remaining == 0) {
                *slot = None;
            }
            barrier
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    /// Inserts or overwrites a membership row exactly as given.
    pub async fn seed_member(&self, member: GroupMember) {
        let mut state = self.state.lock().await;
        state
            .members
            .insert((member.group_id, member.user_id), member);
    }

    /// Deletes a membership row without running succession, the way an
    /// account-removal cascade would.
    pub async fn purge_member(&self, group_id: Uuid, user_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        state.members.remove(&(group_id, user_id)).is_some()
    }

    async fn take_fault(&self, predicate: impl Fn(&Fault) -> bool) -> Option<StoreError> {
        take_fault(&self.faults, predicate).await
    }
}

async fn take_fault(
    faults: &Mutex<Vec<Fault>>,
    predicate: impl Fn(&Fault) -> bool,
) -> Option<StoreError> {
    let mut faults = faults.lock().await;
    let position = faults.iter().position(|f| predicate(f))?;
    match faults.remove(position) {
        Fault::Begin(err) | Fault::SetRole(err) | Fault::Commit(err) => Some(err),
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Constraint(format!("user {} already exists", user.id)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    type Scope = MemoryScope;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.state.lock().await.groups.get(&group_id).cloned())
    }

    async fn get_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .members
            .get(&(group_id, user_id))
            .cloned())
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError> {
        let state = self.state.lock().await;
        Ok(State::sorted_by_acceptance(
            state.accepted_in(group_id).cloned().collect(),
        ))
    }

    async fn create_group(&self, group: &Group) -> Result<GroupMember, StoreError> {
        let mut state = self.state.lock().await;
        if state.groups.contains_key(&group.id) {
            return Err(StoreError::Constraint(format!("group {} already exists", group.id)));
        }
        let now = state.tick();
        let member = GroupMember {
            group_id: group.id,
            user_id: group.creator_id,
            role: GroupRole::Creator,
            status: MembershipStatus::Accepted,
            invited_by: None,
            accepted_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        state.groups.insert(group.id, group.clone());
        state
            .members
            .insert((group.id, group.creator_id), member.clone());
        Ok(member)
    }

    async fn insert_member(&self, member: NewMember) -> Result<GroupMember, StoreError> {
        let mut state = self.state.lock().await;
        if !state.groups.contains_key(&member.group_id) {
            return Err(StoreError::Constraint(format!(
                "group {} does not exist",
                member.group_id
            )));
        }
        let key = (member.group_id, member.user_id);
        if state.members.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "membership {}/{} already exists",
                member.group_id, member.user_id
            )));
        }
        let now = state.tick();
        let row = GroupMember {
            group_id: member.group_id,
            user_id: member.user_id,
            role: member.role,
            status: member.status,
            invited_by: member.invited_by,
            accepted_at: (member.status == MembershipStatus::Accepted).then_some(now),
            created_at: now,
            updated_at: now,
        };
        state.members.insert(key, row.clone());
        Ok(row)
    }

    async fn transition_status(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        transition: StatusTransition,
    ) -> Result<Option<GroupMember>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let Some(row) = state.members.get_mut(&(group_id, user_id)) else {
            return Ok(None);
        };
        if row.status != transition.from {
            return Ok(None);
        }
        row.status = transition.to;
        if transition.to == MembershipStatus::Accepted {
            row.accepted_at = Some(now);
        }
        if transition.invited_by.is_some() {
            row.invited_by = transition.invited_by;
        }
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.update_member_role(group_id, user_id, from, to))
    }

    async fn delete_plain_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.delete_plain_member(group_id, user_id))
    }

    async fn groups_without_authority(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state
            .groups
            .keys()
            .copied()
            .filter(|group_id| {
                let mut accepted = state.accepted_in(*group_id).peekable();
                accepted.peek().is_some() && !accepted.any(|m| m.role.is_authority())
            })
            .collect();
        ids.sort();
        ids.truncate(limit.max(0) as usize);
        Ok(ids)
    }

    async fn begin_succession(&self) -> Result<MemoryScope, StoreError> {
        if let Some(err) = self.take_fault(|f| matches!(f, Fault::Begin(_))).await {
            return Err(err);
        }
        self.pass_gate().await;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryScope {
            guard: Some(guard),
            working,
            faults: Arc::clone(&self.faults),
        })
    }
}

/// Succession scope over [`InMemoryStore`].
pub struct MemoryScope {
    guard: Option<OwnedMutexGuard<State>>,
    working: State,
    faults: Arc<Mutex<Vec<Fault>>>,
}

impl MemoryScope {
    fn open(&mut self) -> Result<&mut State, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Backend("succession scope already closed".into()));
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl SuccessionScope for MemoryScope {
    async fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.open()?.groups.get(&group_id).cloned())
    }

    async fn get_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self.open()?.members.get(&(group_id, user_id)).cloned())
    }

    async fn update_member_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRole,
        to: GroupRole,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self.open()?.update_member_role(group_id, user_id, from, to))
    }

    async fn delete_plain_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.open()?.delete_plain_member(group_id, user_id))
    }

    async fn delete_member(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self.open()?.members.remove(&(group_id, user_id)))
    }

    async fn authority_holders(&mut self, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError> {
        Ok(self.open()?.authority_holders(group_id))
    }

    async fn successor_candidates(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<SuccessorCandidate>, StoreError> {
        Ok(self.open()?.successor_candidates(group_id))
    }

    async fn set_role(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> Result<(), StoreError> {
        if let Some(err) = take_fault(&self.faults, |f| matches!(f, Fault::SetRole(_))).await {
            return Err(err);
        }
        let state = self.open()?;
        let now = state.tick();
        let row = state
            .members
            .get_mut(&(group_id, user_id))
            .ok_or_else(|| StoreError::Backend(format!("no membership {}/{}", group_id, user_id)))?;
        row.role = role;
        row.updated_at = now;
        Ok(())
    }

    async fn set_creator_reference(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let state = self.open()?;
        let now = state.tick();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::Backend(format!("no group {}", group_id)))?;
        group.creator_id = user_id;
        group.updated_at = now;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let Some(mut guard) = self.guard.take() else {
            return Err(StoreError::Backend("succession scope already closed".into()));
        };
        if let Some(err) = take_fault(&self.faults, |f| matches!(f, Fault::Commit(_))).await {
            return Err(err);
        }
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take();
        Ok(())
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn find_item(&self, item: ContentRef) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.state.lock().await.items.get(&item).cloned())
    }

    async fn insert_item(&self, item: &ContentItem, viewers: &[Uuid]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = item.content_ref();
        if state.items.contains_key(&key) {
            return Err(StoreError::Constraint(format!("{} already exists", key)));
        }
        state.items.insert(key, item.clone());
        if !viewers.is_empty() {
            state.viewers.insert(key, viewers.iter().copied().collect());
        }
        Ok(())
    }

    async fn replace_visibility(
        &self,
        item: ContentRef,
        visibility: Visibility,
        viewers: &[Uuid],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.items.get_mut(&item) {
            Some(row) if matches!(row.scope, ContentScope::Personal { .. }) => {
                row.scope = ContentScope::Personal { visibility };
                row.updated_at = updated_at;
            }
            _ => return Ok(false),
        }
        if viewers.is_empty() {
            state.viewers.remove(&item);
        } else {
            state.viewers.insert(item, viewers.iter().copied().collect());
        }
        Ok(true)
    }

    async fn is_listed_viewer(&self, item: ContentRef, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .viewers
            .get(&item)
            .is_some_and(|listed| listed.contains(&user_id)))
    }

    async fn list_viewers(&self, item: ContentRef) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        let mut viewers: Vec<Uuid> = state
            .viewers
            .get(&item)
            .map(|listed| listed.iter().copied().collect())
            .unwrap_or_default();
        viewers.sort();
        Ok(viewers)
    }

    async fn delete_item(&self, item: ContentRef) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.delete_item(item))
    }

    async fn upsert_event_response(&self, response: &EventResponse) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let event = ContentRef::new(ContentKind::Event, response.event_id);
        if !state.items.contains_key(&event) {
            return Err(StoreError::Constraint(format!(
                "event {} does not exist",
                response.event_id
            )));
        }
        state
            .responses
            .insert((response.event_id, response.user_id), response.clone());
        Ok(())
    }

    async fn list_event_responses(&self, event_id: Uuid) -> Result<Vec<EventResponse>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .responses
            .range((event_id, Uuid::nil())..=(event_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, response)| response.clone())
            .collect())
    }

    async fn feed_candidates(&self, query: FeedQuery) -> Result<Vec<ContentItem>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<ContentItem> = state
            .items
            .values()
            .filter(|item| state.is_feed_candidate(query.viewer_id, item))
            .filter(|item| query.before.map_or(true, |cursor| cursor.precedes(item)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(query.limit.max(0) as usize);
        Ok(rows)
    }
}

#[async_trait]
impl FollowStore for InMemoryStore {
    async fn find_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<Option<Follow>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .follows
            .get(&(follower_id, followee_id))
            .cloned())
    }

    async fn insert_follow(&self, follow: &Follow) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = (follow.follower_id, follow.followee_id);
        if state.follows.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "follow {} -> {} already exists",
                follow.follower_id, follow.followee_id
            )));
        }
        state.follows.insert(key, follow.clone());
        Ok(())
    }

    async fn transition_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        from: FollowStatus,
        to: FollowStatus,
    ) -> Result<Option<Follow>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        match state.follows.get_mut(&(follower_id, followee_id)) {
            Some(edge) if edge.status == from => {
                edge.status = to;
                edge.updated_at = now;
                Ok(Some(edge.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.follows.remove(&(follower_id, followee_id)).is_some())
    }
}
