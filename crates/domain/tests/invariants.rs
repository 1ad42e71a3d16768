//! Randomized membership sequences. After every step a group with accepted
//! members must still have an authority-holder.

mod common;

use common::Fixture;
use domain::models::{GroupPrivacy, GroupRole};
use domain::store::MembershipStore;
use domain::DomainError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

const USERS: usize = 6;
const STEPS: usize = 60;

#[derive(Debug, Clone, Copy)]
enum Step {
    Promote { target: Uuid, caller: Uuid },
    Demote { target: Uuid, caller: Uuid },
    Remove { target: Uuid, caller: Uuid },
    Leave { user: Uuid },
    Rejoin { user: Uuid },
}

fn pick_step(rng: &mut StdRng, users: &[Uuid]) -> Step {
    let a = *users.choose(rng).unwrap();
    let b = *users.choose(rng).unwrap();
    match rng.gen_range(0..5) {
        0 => Step::Promote { target: a, caller: b },
        1 => Step::Demote { target: a, caller: b },
        2 => Step::Remove { target: a, caller: b },
        3 => Step::Leave { user: a },
        _ => Step::Rejoin { user: a },
    }
}

async fn apply(fx: &Fixture, group_id: Uuid, step: Step) -> Result<(), DomainError> {
    match step {
        Step::Promote { target, caller } => fx.service.promote(group_id, target, caller).await.map(drop),
        Step::Demote { target, caller } => fx.service.demote(group_id, target, caller).await.map(drop),
        Step::Remove { target, caller } => fx.service.remove(group_id, target, caller).await.map(drop),
        Step::Leave { user } => fx.service.leave(group_id, user).await.map(drop),
        Step::Rejoin { user } => {
            let members = fx.store.list_members(group_id).await?;
            let Some(approver) = members.iter().find(|m| m.holds_authority()) else {
                return Ok(());
            };
            fx.service.request_join(group_id, user).await?;
            fx.service
                .resolve_join_request(group_id, user, approver.user_id, true)
                .await
                .map(drop)
        }
    }
}

async fn assert_invariants(fx: &Fixture, group_id: Uuid, seed: u64, step_no: usize, step: Step) {
    let members = fx.store.list_members(group_id).await.unwrap();
    assert!(
        members.is_empty() || members.iter().any(|m| m.holds_authority()),
        "seed {} step {} ({:?}) left members without an authority-holder: {:?}",
        seed,
        step_no,
        step,
        members
    );
    let creators = members
        .iter()
        .filter(|m| m.role == GroupRole::Creator)
        .count();
    assert!(creators <= 1, "seed {} step {}: {} creators", seed, step_no, creators);
}

async fn run_sequence(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let fx = Fixture::new();
    let creator = fx.user().await;
    let group = fx.group(creator, GroupPrivacy::Private).await;

    let mut users = vec![creator];
    for _ in 1..USERS {
        users.push(fx.member(group.id, creator).await);
    }

    for step_no in 0..STEPS {
        let step = pick_step(&mut rng, &users);
        if let Err(err) = apply(&fx, group.id, step).await {
            assert!(!err.is_fatal(), "seed {} step {}: {}", seed, step_no, err);
        }
        assert_invariants(&fx, group.id, seed, step_no, step).await;
    }
}

#[tokio::test]
async fn test_random_sequences_never_strand_members() {
    for seed in 0..25 {
        run_sequence(seed).await;
    }
}

#[tokio::test]
async fn test_everyone_leaving_in_random_order() {
    for seed in 100..110 {
        let mut rng = StdRng::seed_from_u64(seed);
        let fx = Fixture::new();
        let creator = fx.user().await;
        let group = fx.group(creator, GroupPrivacy::Public).await;
        let mut users = vec![creator];
        for _ in 1..USERS {
            let user = fx.member(group.id, creator).await;
            if rng.gen_bool(0.5) {
                fx.service.promote(group.id, user, creator).await.unwrap();
            }
            users.push(user);
        }
        users.shuffle(&mut rng);

        for (step_no, user) in users.iter().enumerate() {
            fx.service.leave(group.id, *user).await.unwrap();
            assert_invariants(&fx, group.id, seed, step_no, Step::Leave { user: *user }).await;
        }
        assert!(fx.store.list_members(group.id).await.unwrap().is_empty());
        assert!(fx.store.find_group(group.id).await.unwrap().is_some());
    }
}
