//! Succession engine scenarios: successor choice, rollback, retry and repair.

mod common;

use std::sync::Arc;

use common::Fixture;
use domain::models::{GroupPrivacy, GroupRole};
use domain::services::{MembershipEventKind, RecordingEventSink, SuccessionEngine};
use domain::store::{Fault, MembershipStore};
use domain::{DomainError, StoreError};
use tokio_test::assert_ok;
use uuid::Uuid;

#[tokio::test]
async fn test_successor_with_most_content_wins() {
    let fx = Fixture::new();
    let admin = fx.user().await;
    let group = fx.group(admin, GroupPrivacy::Private).await;
    let five = fx.member(group.id, admin).await;
    let two_early = fx.member(group.id, admin).await;
    let two_late = fx.member(group.id, admin).await;

    // Joined order differs from content order on purpose.
    fx.group_posts(group.id, two_early, 2).await;
    fx.group_posts(group.id, five, 5).await;
    fx.group_posts(group.id, two_late, 2).await;

    let outcome = fx.service.leave(group.id, admin).await.unwrap();
    assert_eq!(outcome.successor, Some(five));
    assert!(!outcome.ownerless);

    let row = fx.store.get_member(group.id, five).await.unwrap().unwrap();
    assert_eq!(row.role, GroupRole::Admin);
    for other in [two_early, two_late] {
        let row = fx.store.get_member(group.id, other).await.unwrap().unwrap();
        assert_eq!(row.role, GroupRole::Member);
    }
}

#[tokio::test]
async fn test_successor_tie_goes_to_earliest_joined() {
    let fx = Fixture::new();
    let admin = fx.user().await;
    let group = fx.group(admin, GroupPrivacy::Private).await;
    let x = fx.member(group.id, admin).await;
    let y = fx.member(group.id, admin).await;
    fx.group_posts(group.id, y, 2).await;
    fx.group_posts(group.id, x, 2).await;

    let outcome = fx.service.leave(group.id, admin).await.unwrap();
    assert_eq!(outcome.successor, Some(x));
}

#[tokio::test]
async fn test_sole_creator_leaves_two_plain_members() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Public).await;
    let x = fx.member(group.id, creator).await;
    let y = fx.member(group.id, creator).await;

    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert_eq!(outcome.successor, Some(x));
    assert_eq!(outcome.creator_reference, Some(x));
    assert_eq!(
        outcome.departed.as_ref().map(|m| m.role),
        Some(GroupRole::Creator)
    );

    let group_row = fx.store.find_group(group.id).await.unwrap().unwrap();
    assert_eq!(group_row.creator_id, x);
    assert!(fx.store.get_member(group.id, creator).await.unwrap().is_none());
    let y_row = fx.store.get_member(group.id, y).await.unwrap().unwrap();
    assert_eq!(y_row.role, GroupRole::Member);

    let events = fx.sink.events();
    assert_eq!(
        fx.sink.kinds(),
        vec![MembershipEventKind::Left, MembershipEventKind::SuccessionPromoted]
    );
    assert_eq!(events[0].actor_id, Some(creator));
    assert_eq!(events[1].actor_id, None);
    assert_eq!(events[1].target_id, x);
    assert_eq!(events[1].new_role, Some(GroupRole::Admin));
}

#[tokio::test]
async fn test_leave_with_remaining_admin_promotes_nobody() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let admin = fx.member(group.id, creator).await;
    let plain = fx.member(group.id, creator).await;
    fx.service.promote(group.id, admin, creator).await.unwrap();
    fx.group_posts(group.id, plain, 3).await;

    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert_eq!(outcome.successor, None);
    // The reference moves to the remaining authority-holder.
    assert_eq!(outcome.creator_reference, Some(admin));

    let row = fx.store.get_member(group.id, plain).await.unwrap().unwrap();
    assert_eq!(row.role, GroupRole::Member);
}

#[tokio::test]
async fn test_plain_member_leaving_changes_nothing_else() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let plain = fx.member(group.id, creator).await;

    let outcome = fx.service.leave(group.id, plain).await.unwrap();
    assert_eq!(outcome.successor, None);
    assert_eq!(outcome.creator_reference, None);
    assert_eq!(fx.sink.kinds(), vec![MembershipEventKind::Left]);
}

#[tokio::test]
async fn test_last_member_leaving_makes_group_ownerless() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;

    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert!(outcome.ownerless);
    assert_eq!(outcome.successor, None);

    let group_row = fx.store.find_group(group.id).await.unwrap().unwrap();
    assert_eq!(group_row.creator_id, creator);

    // Nothing left to repair.
    let outcome = fx.service.restore_authority(group.id).await.unwrap();
    assert!(outcome.ownerless);
    assert!(outcome.departed.is_none());
}

#[tokio::test]
async fn test_repeated_leave_of_emptied_group_is_noop() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    assert_ok!(fx.service.leave(group.id, creator).await);
    fx.sink.clear();

    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert!(outcome.ownerless);
    assert!(outcome.departed.is_none());
    assert_eq!(outcome.successor, None);
    assert_eq!(outcome.creator_reference, None);
    assert!(fx.sink.events().is_empty());

    let group_row = fx.store.find_group(group.id).await.unwrap().unwrap();
    assert_eq!(group_row.creator_id, creator);
}

#[tokio::test]
async fn test_leave_requires_accepted_membership() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let pending = fx.user().await;
    fx.service.request_join(group.id, pending).await.unwrap();

    let err = fx.service.leave(group.id, pending).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
    // The failed unit of work left the pending row in place.
    assert!(fx.store.get_member(group.id, pending).await.unwrap().is_some());

    let err = fx.service.leave(group.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_promotion_rolls_back_departure() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let plain = fx.member(group.id, creator).await;

    fx.store
        .inject_fault(Fault::SetRole(StoreError::Backend("disk full".into())))
        .await;

    let err = fx.service.leave(group.id, creator).await.unwrap_err();
    assert!(err.is_fatal());

    let creator_row = fx.store.get_member(group.id, creator).await.unwrap().unwrap();
    assert_eq!(creator_row.role, GroupRole::Creator);
    let plain_row = fx.store.get_member(group.id, plain).await.unwrap().unwrap();
    assert_eq!(plain_row.role, GroupRole::Member);
    assert!(fx.sink.events().is_empty());
}

#[tokio::test]
async fn test_serialization_failure_is_retried_once() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let plain = fx.member(group.id, creator).await;

    fx.store
        .inject_fault(Fault::Commit(StoreError::SerializationFailure(
            "could not serialize access".into(),
        )))
        .await;

    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert_eq!(outcome.successor, Some(plain));
    // Events come from the committed attempt only.
    assert_eq!(
        fx.sink.kinds(),
        vec![MembershipEventKind::Left, MembershipEventKind::SuccessionPromoted]
    );
}

#[tokio::test]
async fn test_repeated_serialization_failure_surfaces_conflict() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    fx.member(group.id, creator).await;

    for _ in 0..2 {
        fx.store
            .inject_fault(Fault::Commit(StoreError::SerializationFailure("40001".into())))
            .await;
    }

    let err = fx.service.leave(group.id, creator).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
    assert!(fx.store.get_member(group.id, creator).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_unavailable_is_surfaced_unchanged() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;

    fx.store
        .inject_fault(Fault::Begin(StoreError::Unavailable("pool timed out".into())))
        .await;

    let err = fx.service.leave(group.id, creator).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Store(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_concurrent_last_admins_leave_promotes_exactly_one() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let admin = fx.member(group.id, creator).await;
    fx.service.promote(group.id, admin, creator).await.unwrap();
    let plain_a = fx.member(group.id, creator).await;
    let plain_b = fx.member(group.id, creator).await;
    fx.sink.clear();

    let (first, second) = tokio::join!(
        fx.service.leave(group.id, creator),
        fx.service.leave(group.id, admin)
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let promoted: Vec<Uuid> = [first.successor, second.successor]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(promoted, vec![plain_a]);

    let admins: Vec<Uuid> = fx
        .store
        .list_members(group.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role.is_authority())
        .map(|m| m.user_id)
        .collect();
    assert_eq!(admins, vec![plain_a]);
    let b_row = fx.store.get_member(group.id, plain_b).await.unwrap().unwrap();
    assert_eq!(b_row.role, GroupRole::Member);
}

/// Creator leaves a group run by two co-admins. Returns `(group, a, b)`.
async fn co_admin_group(fx: &Fixture) -> (Uuid, Uuid, Uuid) {
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let a = fx.member(group.id, creator).await;
    let b = fx.member(group.id, creator).await;
    fx.service.promote(group.id, a, creator).await.unwrap();
    fx.service.promote(group.id, b, creator).await.unwrap();
    let outcome = fx.service.leave(group.id, creator).await.unwrap();
    assert_eq!(outcome.successor, None);
    fx.sink.clear();
    (group.id, a, b)
}

async fn authority_holders(fx: &Fixture, group_id: Uuid) -> Vec<Uuid> {
    fx.store
        .list_members(group_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.holds_authority())
        .map(|m| m.user_id)
        .collect()
}

#[tokio::test]
async fn test_co_admins_demoting_each_other_keep_one_admin() {
    let fx = Fixture::new();
    let (group_id, a, b) = co_admin_group(&fx).await;

    // Both demotions finish their unlocked work before either takes the lock.
    fx.store.hold_next_begins(2).await;
    let (a_demotes_b, b_demotes_a) = tokio::join!(
        fx.service.demote(group_id, b, a),
        fx.service.demote(group_id, a, b)
    );

    let (winner, loser) = match (&a_demotes_b, &b_demotes_a) {
        (Ok(_), Err(err)) => {
            assert!(matches!(err, DomainError::Forbidden(_)), "{err}");
            (a, b)
        }
        (Err(err), Ok(_)) => {
            assert!(matches!(err, DomainError::Forbidden(_)), "{err}");
            (b, a)
        }
        other => panic!("exactly one demotion should win: {other:?}"),
    };

    assert_eq!(authority_holders(&fx, group_id).await, vec![winner]);
    let loser_row = fx.store.get_member(group_id, loser).await.unwrap().unwrap();
    assert_eq!(loser_row.role, GroupRole::Member);
    assert_eq!(fx.sink.kinds(), vec![MembershipEventKind::Demoted]);
}

#[tokio::test]
async fn test_demote_racing_leave_keeps_an_admin() {
    let fx = Fixture::new();
    let (group_id, a, b) = co_admin_group(&fx).await;

    fx.store.hold_next_begins(2).await;
    let (demoted, left) = tokio::join!(
        fx.service.demote(group_id, b, a),
        fx.service.leave(group_id, a)
    );

    let left = left.unwrap();
    assert_eq!(left.departed.map(|row| row.user_id), Some(a));
    match demoted {
        // Demotion went first, so the leave had to promote `b` back.
        Ok(_) => assert_eq!(left.successor, Some(b)),
        Err(err) => {
            assert!(matches!(err, DomainError::Forbidden(_)), "{err}");
            assert_eq!(left.successor, None);
        }
    }

    assert_eq!(authority_holders(&fx, group_id).await, vec![b]);
    assert!(fx.store.get_member(group_id, a).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_racing_demotion_of_remover() {
    let fx = Fixture::new();
    let (group_id, a, b) = co_admin_group(&fx).await;
    let plain = fx.member(group_id, a).await;

    fx.store.hold_next_begins(2).await;
    let (demoted, removed) = tokio::join!(
        fx.service.demote(group_id, b, a),
        fx.service.remove(group_id, plain, b)
    );

    assert_ok!(demoted);
    let plain_row = fx.store.get_member(group_id, plain).await.unwrap();
    match removed {
        Ok(_) => assert!(plain_row.is_none()),
        Err(err) => {
            // The remover lost authority before the removal took the lock.
            assert!(matches!(err, DomainError::Forbidden(_)), "{err}");
            assert!(plain_row.is_some());
        }
    }
    assert_eq!(authority_holders(&fx, group_id).await, vec![a]);
}

#[tokio::test]
async fn test_restore_authority_after_external_purge() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let x = fx.member(group.id, creator).await;
    let y = fx.member(group.id, creator).await;
    fx.group_posts(group.id, y, 1).await;

    assert!(fx.store.purge_member(group.id, creator).await);
    assert_eq!(
        fx.store.groups_without_authority(10).await.unwrap(),
        vec![group.id]
    );

    let outcome = fx.service.restore_authority(group.id).await.unwrap();
    assert_eq!(outcome.successor, Some(y));
    assert_eq!(outcome.creator_reference, Some(y));
    assert!(outcome.departed.is_none());
    assert!(fx.store.groups_without_authority(10).await.unwrap().is_empty());

    // A second run finds authority in place.
    let outcome = fx.service.restore_authority(group.id).await.unwrap();
    assert_eq!(outcome.successor, None);
    let x_row = fx.store.get_member(group.id, x).await.unwrap().unwrap();
    assert_eq!(x_row.role, GroupRole::Member);
}

#[tokio::test]
async fn test_depart_missing_member_is_noop() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;

    let outcome = fx.service.depart(group.id, Uuid::new_v4()).await.unwrap();
    assert!(outcome.departed.is_none());
    assert_eq!(outcome.successor, None);
    assert!(fx.sink.events().is_empty());

    let err = fx.service.depart(Uuid::new_v4(), creator).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_depart_creator_publishes_without_actor() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let plain = fx.member(group.id, creator).await;

    let outcome = fx.service.depart(group.id, creator).await.unwrap();
    assert_eq!(outcome.successor, Some(plain));

    let events = fx.sink.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.actor_id.is_none()));
}

#[tokio::test]
async fn test_engine_used_directly_over_store() {
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;
    let plain = fx.member(group.id, creator).await;

    let sink = Arc::new(RecordingEventSink::new());
    let engine = SuccessionEngine::new(fx.store.clone(), sink.clone());
    let outcome = engine.leave(group.id, creator).await.unwrap();

    assert_eq!(outcome.successor, Some(plain));
    assert_eq!(sink.events().len(), 2);
}
