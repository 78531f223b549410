//! End-to-end battle session flows: challenge, accept, gifts, settlement,
//! and the deadline timer racing a manual end.

use live_session_service::config::EngineConfig;
use live_session_service::domain::{
    ContributionEvent, ContributionTarget, RewardSplit, SessionEvent, SessionStatus, Settlement,
    SlotId,
};
use live_session_service::services::{Actor, MemoryPublisher, StaticCatalog, StaticDirectory};
use live_session_service::store::InMemorySessionStore;
use live_session_service::{SessionError, SessionService};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Fixture {
    service: SessionService,
    directory: Arc<StaticDirectory>,
    publisher: Arc<MemoryPublisher>,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemorySessionStore::new());
    let directory = Arc::new(StaticDirectory::new());
    let catalog = Arc::new(StaticCatalog::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let service = SessionService::with_default_policy(
        store,
        directory.clone(),
        catalog,
        publisher.clone(),
        EngineConfig::default(),
    );
    Fixture {
        service,
        directory,
        publisher,
    }
}

fn gift(session_id: Uuid, slot: SlotId, value: i64, key: &str) -> ContributionEvent {
    ContributionEvent {
        session_id,
        actor_id: Uuid::new_v4(),
        target: ContributionTarget::BattleSlot(slot),
        quantity: 1,
        unit_value: value,
        idempotency_key: key.to_string(),
    }
}

#[tokio::test]
async fn full_battle_flow_settles_with_rewards() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Pending);

    f.service.accept_battle(session.id, host2).await.unwrap();

    f.service
        .apply_contribution(&gift(session.id, SlotId::Host1, 50, "g1"))
        .await
        .unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host2, 30, "g2"))
        .await
        .unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host2, 30, "g3"))
        .await
        .unwrap();

    let settlement = f
        .service
        .end_session(session.id, Actor::User(host1))
        .await
        .unwrap();
    let Settlement::Battle(battle) = settlement else {
        panic!("expected battle settlement");
    };
    assert_eq!(battle.winner, Some(SlotId::Host2));
    assert_eq!(battle.host1_score, 50);
    assert_eq!(battle.host2_score, 60);
    assert_eq!(
        battle.rewards,
        Some(RewardSplit {
            winner_coins: 6, // floor(60 * 0.10)
            loser_coins: 2,  // floor(50 * 0.05)
        })
    );

    let session = f.service.get_session(session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
    assert!(session.ended_at.is_some());
}

#[tokio::test]
async fn ending_twice_returns_the_same_settlement() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_secs(300))
        .await
        .unwrap();
    f.service.accept_battle(session.id, host2).await.unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host1, 40, "g1"))
        .await
        .unwrap();

    let first = f
        .service
        .end_session(session.id, Actor::User(host1))
        .await
        .unwrap();
    let second = f
        .service
        .end_session(session.id, Actor::User(host2))
        .await
        .unwrap();
    assert_eq!(first, second);

    assert_eq!(
        f.publisher
            .count_matching(|e| matches!(e, SessionEvent::SessionEnded { .. })),
        1
    );
}

#[tokio::test]
async fn equal_scores_settle_as_a_draw() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_secs(300))
        .await
        .unwrap();
    f.service.accept_battle(session.id, host2).await.unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host1, 50, "g1"))
        .await
        .unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host2, 50, "g2"))
        .await
        .unwrap();

    let settlement = f
        .service
        .end_session(session.id, Actor::User(host2))
        .await
        .unwrap();
    let Settlement::Battle(battle) = settlement else {
        panic!("expected battle settlement");
    };
    assert_eq!(battle.winner, None);
    assert_eq!(
        battle.rewards,
        Some(RewardSplit {
            winner_coins: 7, // floor(100 * 0.075), both sides
            loser_coins: 7,
        })
    );
}

#[tokio::test]
async fn viewer_cannot_end_the_battle() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_secs(300))
        .await
        .unwrap();
    f.service.accept_battle(session.id, host2).await.unwrap();

    let err = f
        .service
        .end_session(session.id, Actor::User(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unauthorized(_)));
}

#[tokio::test]
async fn deadline_settles_an_unattended_battle() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_millis(100))
        .await
        .unwrap();
    f.service.accept_battle(session.id, host2).await.unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host1, 25, "g1"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let session = f.service.get_session(session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
    let Some(Settlement::Battle(battle)) = session.settlement else {
        panic!("expected battle settlement");
    };
    assert_eq!(battle.winner, Some(SlotId::Host1));
}

#[tokio::test]
async fn manual_end_beats_the_timer_without_a_double_settlement() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_millis(200))
        .await
        .unwrap();
    f.service.accept_battle(session.id, host2).await.unwrap();
    f.service
        .apply_contribution(&gift(session.id, SlotId::Host2, 10, "g1"))
        .await
        .unwrap();

    let settlement = f
        .service
        .end_session(session.id, Actor::User(host1))
        .await
        .unwrap();

    // Give the (cancelled or racing) timer plenty of time to fire anyway
    tokio::time::sleep(Duration::from_millis(500)).await;

    let session = f.service.get_session(session.id).await.unwrap();
    assert_eq!(session.settlement, Some(settlement));
    assert_eq!(
        f.publisher
            .count_matching(|e| matches!(e, SessionEvent::SessionEnded { .. })),
        1
    );
}

#[tokio::test]
async fn cancelled_challenge_never_goes_live() {
    let f = fixture();
    let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    f.directory.add_live(stream, host1);

    let session = f
        .service
        .create_battle(host1, host2, stream, Duration::from_secs(300))
        .await
        .unwrap();
    let session = f.service.cancel_session(session.id, host1).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.settlement.is_none());

    let err = f
        .service
        .accept_battle(session.id, host2)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
}
