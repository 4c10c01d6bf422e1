//! Integration tests: a full 501 best-of-3 match through the scoring engine,
//! and crash recovery through the service layer and the file cache.

use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use oche_back::{
    dao::{
        match_store::{CacheStore, RemoteStore, file::FileCacheStore},
        models::{MatchStateEntity, PresenceEntity, RemoteMatchRecord},
        storage::{StorageError, StorageResult},
    },
    dto::matches::{OpenMatchRequest, PlayerDescriptor, RecoverySource, StarterRequest, ThrowRequest},
    services::{match_service, score_service},
    state::{
        AppState, SharedState,
        machine::MatchPhase,
        scoring::{Multiplier, PlayerSlot},
        session::{DartOutcome, MatchResult, MatchSession, PlayerProfile, VisitOutcome},
    },
};

fn profiles() -> [PlayerProfile; 2] {
    [
        PlayerProfile {
            id: Some(Uuid::new_v4()),
            name: "Anna".into(),
        },
        PlayerProfile {
            id: Some(Uuid::new_v4()),
            name: "Bea".into(),
        },
    ]
}

/// Throw a full visit of misses for whoever is at the oche.
fn throw_misses(session: &mut MatchSession) {
    for _ in 0..3 {
        session.add_dart(0, Multiplier::Single).unwrap();
    }
}

/// Maximum visit: three treble 20s.
fn throw_180(session: &mut MatchSession) {
    session.add_dart(20, Multiplier::Triple).unwrap();
    session.add_dart(20, Multiplier::Triple).unwrap();
    session.add_dart(20, Multiplier::Triple).unwrap();
}

/// The classic 141 finish: T20 T19 D12.
fn throw_141_checkout(session: &mut MatchSession) -> DartOutcome {
    session.add_dart(20, Multiplier::Triple).unwrap();
    session.add_dart(19, Multiplier::Triple).unwrap();
    session.add_dart(12, Multiplier::Double).unwrap()
}

#[test]
fn nine_darter_best_of_three() {
    let mut session = MatchSession::new(Uuid::new_v4(), profiles(), 2, 501);
    session.select_starter(PlayerSlot::One).unwrap();

    // Leg 1: player one goes 180, 180, 141-out; player two never scores.
    throw_180(&mut session);
    throw_misses(&mut session);
    throw_180(&mut session);
    throw_misses(&mut session);
    let outcome = throw_141_checkout(&mut session);

    let DartOutcome::Closed(summary) = outcome else {
        panic!("checkout dart must close the visit");
    };
    assert_eq!(summary.outcome, VisitOutcome::Checkout);
    assert!(summary.leg_won);
    assert!(!summary.match_won);

    // Next leg: scores reset, starter alternates to player two.
    assert_eq!(session.current_leg, 2);
    assert_eq!(session.current_player, PlayerSlot::Two);
    assert_eq!(session.state(PlayerSlot::One).current_score, 501);
    assert_eq!(session.state(PlayerSlot::Two).current_score, 501);
    assert_eq!(session.state(PlayerSlot::One).legs, 1);
    let leg_average = session.state(PlayerSlot::One).leg_averages[0];
    assert!((leg_average - 167.0).abs() < 1e-9);

    // Leg 2: player two starts, player one repeats the nine-darter.
    throw_misses(&mut session);
    throw_180(&mut session);
    throw_misses(&mut session);
    throw_180(&mut session);
    throw_misses(&mut session);
    let outcome = throw_141_checkout(&mut session);

    let DartOutcome::Closed(summary) = outcome else {
        panic!("checkout dart must close the visit");
    };
    assert!(summary.match_won);
    assert!(session.complete);

    let result = session.result().unwrap();
    assert_eq!(result.winner, PlayerSlot::One);
    assert_eq!(result.player_one.legs, 2);
    assert_eq!(result.player_two.legs, 0);
    assert_eq!(result.player_one.total_darts, 18);
    assert_eq!(result.player_one.total_score, 1002);
    assert!((result.player_one.average - 167.0).abs() < 1e-9);
    assert_eq!(result.player_two.total_darts, 15);
    assert_eq!(result.player_two.total_score, 0);
    assert_eq!(result.player_one.checkouts.len(), 2);
    assert_eq!(result.player_one.checkouts[0].checkout, 141);
}

const DEVICE: &str = "tablet-1";

async fn state_with_cache(dir: &std::path::Path) -> SharedState {
    let cache = FileCacheStore::open(dir.to_path_buf()).await.unwrap();
    AppState::new(Arc::new(cache))
}

fn open_request() -> OpenMatchRequest {
    OpenMatchRequest {
        players: vec![
            PlayerDescriptor {
                id: Some(Uuid::new_v4()),
                name: "Anna".into(),
            },
            PlayerDescriptor {
                id: Some(Uuid::new_v4()),
                name: "Bea".into(),
            },
        ],
        legs_to_win: 2,
        starting_score: 501,
        device_id: DEVICE.into(),
        user_id: "anna".into(),
        takeover: false,
    }
}

fn triple_20() -> ThrowRequest {
    ThrowRequest {
        base: 20,
        multiplier: Multiplier::Triple,
    }
}

#[tokio::test]
async fn reopening_after_a_crash_resumes_from_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let match_id = Uuid::new_v4();

    {
        let state = state_with_cache(dir.path()).await;
        let opened = match_service::open_match(&state, match_id, open_request())
            .await
            .unwrap();
        assert_eq!(opened.source, RecoverySource::Fresh);

        score_service::select_starter(
            &state,
            match_id,
            DEVICE,
            StarterRequest {
                player: PlayerSlot::One,
            },
        )
        .await
        .unwrap();

        // A full 180 visit, written through to the cache on every dart.
        for _ in 0..3 {
            let response = score_service::add_dart(&state, match_id, DEVICE, triple_20())
                .await
                .unwrap();
            assert!(response.accepted);
        }
        // The process "crashes" here: the state is simply dropped.
    }

    let state = state_with_cache(dir.path()).await;
    let reopened = match_service::open_match(&state, match_id, open_request())
        .await
        .unwrap();
    assert_eq!(reopened.source, RecoverySource::Cache);

    let guard = state.current_match().read().await;
    let session = guard.as_ref().unwrap();
    assert_eq!(session.state(PlayerSlot::One).current_score, 321);
    assert_eq!(session.current_player, PlayerSlot::Two);
    assert_eq!(session.match_starter, Some(PlayerSlot::One));
}

/// File-backed cache whose deletes always fail, as on a full or read-only
/// disk at the worst possible moment.
#[derive(Clone)]
struct StickyCache(FileCacheStore);

impl CacheStore for StickyCache {
    fn save(&self, state: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.0.save(state)
    }

    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>> {
        self.0.load(id)
    }

    fn delete(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async {
            Err(StorageError::unavailable(
                "delete refused".into(),
                std::io::Error::other("delete refused"),
            ))
        })
    }
}

/// Remote store serving one fixed record; every write succeeds.
struct FixedRecordRemote(RemoteMatchRecord);

impl RemoteStore for FixedRecordRemote {
    fn push_record(&self, _record: RemoteMatchRecord) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn fetch_record(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RemoteMatchRecord>>> {
        let record = self.0.clone();
        Box::pin(async move { Ok((record.match_id == id).then_some(record)) })
    }

    fn submit_result(&self, _result: MatchResult) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn set_live(&self, _presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn clear_live(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn match_completes_even_when_the_cache_delete_fails() {
    let dir = tempfile::tempdir().unwrap();
    let match_id = Uuid::new_v4();
    let cache = StickyCache(FileCacheStore::open(dir.path().to_path_buf()).await.unwrap());
    let state = AppState::new(Arc::new(cache));

    let mut request = open_request();
    request.legs_to_win = 1;
    match_service::open_match(&state, match_id, request)
        .await
        .unwrap();
    score_service::select_starter(
        &state,
        match_id,
        DEVICE,
        StarterRequest {
            player: PlayerSlot::One,
        },
    )
    .await
    .unwrap();

    // Player one throws the nine-darter; player two only misses.
    for _ in 0..2 {
        for _ in 0..3 {
            score_service::add_dart(&state, match_id, DEVICE, triple_20())
                .await
                .unwrap();
        }
        for _ in 0..3 {
            score_service::add_dart(
                &state,
                match_id,
                DEVICE,
                ThrowRequest {
                    base: 0,
                    multiplier: Multiplier::Single,
                },
            )
            .await
            .unwrap();
        }
    }
    score_service::add_dart(&state, match_id, DEVICE, triple_20())
        .await
        .unwrap();
    score_service::add_dart(
        &state,
        match_id,
        DEVICE,
        ThrowRequest {
            base: 19,
            multiplier: Multiplier::Triple,
        },
    )
    .await
    .unwrap();
    let response = score_service::add_dart(
        &state,
        match_id,
        DEVICE,
        ThrowRequest {
            base: 12,
            multiplier: Multiplier::Double,
        },
    )
    .await
    .unwrap();

    // The stale snapshot is only warned about; completion still goes through.
    assert!(response.accepted);
    assert!(response.match_won);
    assert!(response.result.is_some());
    assert_eq!(state.machine_phase().await, MatchPhase::MatchComplete);
}

async fn cached_match(dir: &std::path::Path, match_id: Uuid) {
    let state = state_with_cache(dir).await;
    match_service::open_match(&state, match_id, open_request())
        .await
        .unwrap();
    score_service::select_starter(
        &state,
        match_id,
        DEVICE,
        StarterRequest {
            player: PlayerSlot::One,
        },
    )
    .await
    .unwrap();
    for _ in 0..3 {
        score_service::add_dart(&state, match_id, DEVICE, triple_20())
            .await
            .unwrap();
    }
}

fn progressed_record(match_id: Uuid, snapshot_version: usize) -> RemoteMatchRecord {
    RemoteMatchRecord {
        match_id,
        current_leg: 2,
        player_one_score: 261,
        player_two_score: 501,
        player_one_legs: 1,
        player_two_legs: 0,
        current_player: PlayerSlot::Two,
        match_starter: Some(PlayerSlot::One),
        snapshot_version,
        last_activity_at: std::time::SystemTime::now(),
        started_by_user_id: Some("anna".into()),
    }
}

#[tokio::test]
async fn fresher_remote_record_outranks_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let match_id = Uuid::new_v4();
    cached_match(dir.path(), match_id).await;

    let state = state_with_cache(dir.path()).await;
    state
        .install_remote_store(Arc::new(FixedRecordRemote(progressed_record(match_id, 50))))
        .await;
    let reopened = match_service::open_match(&state, match_id, open_request())
        .await
        .unwrap();
    assert_eq!(reopened.source, RecoverySource::Remote);

    let guard = state.current_match().read().await;
    let session = guard.as_ref().unwrap();
    assert_eq!(session.current_leg, 2);
    assert_eq!(session.state(PlayerSlot::One).current_score, 261);
    assert_eq!(session.state(PlayerSlot::One).legs, 1);
}

#[tokio::test]
async fn cache_wins_recovery_ties_over_the_remote() {
    let dir = tempfile::tempdir().unwrap();
    let match_id = Uuid::new_v4();
    cached_match(dir.path(), match_id).await;

    let state = state_with_cache(dir.path()).await;
    // same version as the cached snapshot: the dart-granular copy wins
    state
        .install_remote_store(Arc::new(FixedRecordRemote(progressed_record(match_id, 1))))
        .await;
    let reopened = match_service::open_match(&state, match_id, open_request())
        .await
        .unwrap();
    assert_eq!(reopened.source, RecoverySource::Cache);

    let guard = state.current_match().read().await;
    let session = guard.as_ref().unwrap();
    assert_eq!(session.current_leg, 1);
    assert_eq!(session.state(PlayerSlot::One).current_score, 321);
}

#[tokio::test]
async fn scoring_from_an_unregistered_device_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let match_id = Uuid::new_v4();
    let state = state_with_cache(dir.path()).await;

    match_service::open_match(&state, match_id, open_request())
        .await
        .unwrap();

    let err = score_service::add_dart(&state, match_id, "someone-else", triple_20()).await;
    assert!(err.is_err());
}
