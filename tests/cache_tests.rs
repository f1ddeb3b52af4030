//! Event cache persistence and dedup-contract tests.
//!
//! Covers the restart-safety properties the bot depends on: at-most-once
//! posting across reloads, persist/load equality, atomic replacement of
//! the cache file, and cold starts on schema or session mismatch.

use std::fs;

use hockeygamebot::data::models::{Assist, EventDetails, EventType, GameEvent, GoalDetails};
use hockeygamebot::social::post::{PostKind, PostRef};
use hockeygamebot::state::event_cache::{
    CacheError, EventCache, GameSession, CACHE_SCHEMA_VERSION,
};

// =============================================================================
// Helpers
// =============================================================================

fn session() -> GameSession {
    GameSession::new("20242025", "2024020500", "NJD")
}

fn goal_event(id: &str, sort_order: i64, assists: usize) -> GameEvent {
    let assists = (0..assists)
        .map(|i| Assist {
            name: format!("Assister {}", i + 1),
            season_total: 10 + i as u32,
        })
        .collect();

    GameEvent {
        event_id: id.to_string(),
        event_type: EventType::Goal,
        sort_order,
        period: 1,
        period_type: "REG".to_string(),
        time_remaining: "12:00".to_string(),
        team_abbrev: Some("NJD".to_string()),
        details: EventDetails::Goal(GoalDetails {
            scorer: "Jack Hughes".to_string(),
            scorer_season_total: 20,
            assists,
            shot_type: "wrist".to_string(),
            home_score: 0,
            away_score: 1,
            empty_net: false,
        }),
    }
}

fn bsky_ref(uri: &str) -> PostRef {
    PostRef {
        platform: "bluesky".to_string(),
        uri: uri.to_string(),
        cid: format!("cid-{}", uri.len()),
    }
}

// =============================================================================
// Persist / load round trip
// =============================================================================

#[test]
fn test_persist_then_load_preserves_ledger() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.upsert_event(&goal_event("g1", 10, 0));
    cache.upsert_event(&goal_event("g2", 20, 1));
    cache.record_post(PostKind::Goal, Some("g1"), &[bsky_ref("at://post/1")]);
    cache.record_post(PostKind::PregameCore, None, &[bsky_ref("at://post/0")]);
    cache.persist().unwrap();

    let restored = EventCache::load(dir.path(), &session()).unwrap();

    assert!(restored.has_posted(PostKind::Goal, Some("g1")));
    assert!(!restored.has_posted(PostKind::Goal, Some("g2")));
    assert!(restored.has_posted(PostKind::PregameCore, None));
    assert!(!restored.has_posted(PostKind::FinalScore, None));
    assert_eq!(restored.event_count(), 2);
    assert_eq!(restored.last_sort_order(), Some(20));
    assert_eq!(
        restored.thread_root(PostKind::PregameCore, "bluesky"),
        Some(&bsky_ref("at://post/0"))
    );
}

#[test]
fn test_at_most_once_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.upsert_event(&goal_event("g1", 10, 0));
    cache.record_post(PostKind::Goal, Some("g1"), &[]);
    cache.persist().unwrap();
    drop(cache);

    // Simulated process restart.
    let mut restored = EventCache::open(dir.path(), session());
    assert!(restored.has_posted(PostKind::Goal, Some("g1")));

    // A duplicate record after the restart is a no-op.
    restored.record_post(PostKind::Goal, Some("g1"), &[]);
    restored.persist().unwrap();

    let again = EventCache::load(dir.path(), &session()).unwrap();
    assert!(again.has_posted(PostKind::Goal, Some("g1")));
}

#[test]
fn test_persist_skips_when_clean() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.upsert_event(&goal_event("g1", 10, 0));
    cache.persist().unwrap();
    assert!(!cache.is_dirty());

    // Unchanged upsert leaves the cache clean.
    cache.upsert_event(&goal_event("g1", 10, 0));
    assert!(!cache.is_dirty());

    // Changed snapshot dirties it again.
    cache.upsert_event(&goal_event("g1", 10, 1));
    assert!(cache.is_dirty());
}

// =============================================================================
// Atomic persistence
// =============================================================================

#[test]
fn test_partial_tmp_write_does_not_corrupt_load() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.upsert_event(&goal_event("g1", 10, 0));
    cache.record_post(PostKind::Goal, Some("g1"), &[]);
    cache.persist().unwrap();

    // Simulate a crash mid-persist: a later write died after producing a
    // truncated temp file, before the rename.
    let tmp = cache.path().with_extension("json.tmp");
    fs::write(&tmp, "{\"schema_version\":1,\"sess").unwrap();

    // The reader still sees the prior complete state.
    let restored = EventCache::load(dir.path(), &session()).unwrap();
    assert!(restored.has_posted(PostKind::Goal, Some("g1")));
}

#[test]
fn test_corrupt_cache_file_is_cold_start() {
    let dir = tempfile::tempdir().unwrap();

    let path = session().cache_file(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "not json at all").unwrap();

    assert!(matches!(
        EventCache::load(dir.path(), &session()),
        Err(CacheError::Decode(_))
    ));

    // open() degrades to a fresh cache instead of failing.
    let cache = EventCache::open(dir.path(), session());
    assert_eq!(cache.event_count(), 0);
    assert!(!cache.has_posted(PostKind::Goal, Some("g1")));
}

// =============================================================================
// Schema / session mismatch
// =============================================================================

#[test]
fn test_schema_mismatch_is_cold_start() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.record_post(PostKind::PregameCore, None, &[]);
    cache.persist().unwrap();

    // Bump the stored schema version behind the cache's back.
    let path = session().cache_file(dir.path());
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(CACHE_SCHEMA_VERSION + 1);
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    match EventCache::load(dir.path(), &session()) {
        Err(CacheError::SchemaMismatch { found, current }) => {
            assert_eq!(found, CACHE_SCHEMA_VERSION + 1);
            assert_eq!(current, CACHE_SCHEMA_VERSION);
        }
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }

    let fresh = EventCache::open(dir.path(), session());
    assert!(!fresh.has_posted(PostKind::PregameCore, None));
}

#[test]
fn test_session_mismatch_is_cold_start() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = EventCache::new(dir.path(), session());
    cache.record_post(PostKind::PregameCore, None, &[]);
    cache.persist().unwrap();

    // Rewrite the stored identity to a different game id.
    let path = session().cache_file(dir.path());
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["session"]["game_id"] = serde_json::json!("2024029999");
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    assert!(matches!(
        EventCache::load(dir.path(), &session()),
        Err(CacheError::SessionMismatch { .. })
    ));

    let fresh = EventCache::open(dir.path(), session());
    assert_eq!(fresh.event_count(), 0);
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        EventCache::load(dir.path(), &session()),
        Err(CacheError::NotFound { .. })
    ));
}
