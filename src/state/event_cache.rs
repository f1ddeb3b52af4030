//! Restart-safe per-game event cache and post ledger.
//!
//! The single source of truth for "has this already been posted".
//! Each tracked game gets its own JSON file:
//!
//!   {cache_dir}/{season_id}/{game_id}-{team_abbrev}.json
//!
//! The cache is an in-memory map with an explicit dirty flag; `persist`
//! flushes it with a write-to-temp-then-rename so a crash mid-write
//! never corrupts the on-disk state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::models::{EventDetails, EventType, GameEvent};
use crate::social::post::{PostKind, PostRef};

pub const CACHE_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Types
// =============================================================================

/// Identity of one tracked game. Two caches are "the same game" only if
/// all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub season_id: String,
    pub game_id: String,
    pub team_abbrev: String,
}

impl GameSession {
    pub fn new(season_id: &str, game_id: &str, team_abbrev: &str) -> Self {
        Self {
            season_id: season_id.to_string(),
            game_id: game_id.to_string(),
            team_abbrev: team_abbrev.to_uppercase(),
        }
    }

    /// On-disk location of this session's cache file.
    pub fn cache_file(&self, root: &Path) -> PathBuf {
        root.join(&self.season_id).join(format!(
            "{}-{}.json",
            self.game_id,
            self.team_abbrev.to_lowercase()
        ))
    }
}

/// One cached event. `posted` flips false -> true exactly once and never
/// reverts; `details` is the last-seen snapshot used for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: EventType,
    pub sort_order: i64,
    pub team_abbrev: Option<String>,
    pub posted: bool,
    pub details: EventDetails,
}

/// Ledger entry for one logical post. `root_refs` is append-only per
/// platform and holds the thread root for follow-up replies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostLedgerEntry {
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub root_refs: BTreeMap<String, PostRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub schema_version: u32,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
}

/// Immutable serializable view of the whole cache. Used for persistence
/// and for the status reporter's export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub schema_version: u32,
    pub session: GameSession,
    pub events: BTreeMap<String, EventRecord>,
    pub ledger: BTreeMap<String, PostLedgerEntry>,
    pub last_sort_order: Option<i64>,
    pub meta: CacheMeta,
}

impl CacheSnapshot {
    pub fn posted_count(&self) -> usize {
        self.events.values().filter(|e| e.posted).count()
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cached state at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("cache schema version {found} does not match current {current}")]
    SchemaMismatch { found: u32, current: u32 },

    #[error("cached game {found_game} ({found_season}) does not match tracked game {expected_game} ({expected_season})")]
    SessionMismatch {
        expected_season: String,
        expected_game: String,
        found_season: String,
        found_game: String,
    },

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Event Cache
// =============================================================================

#[derive(Debug)]
pub struct EventCache {
    session: GameSession,
    path: PathBuf,
    events: BTreeMap<String, EventRecord>,
    ledger: BTreeMap<String, PostLedgerEntry>,
    last_sort_order: Option<i64>,
    meta: CacheMeta,
    dirty: bool,
}

impl EventCache {
    /// Fresh cache with no prior state (cold start).
    pub fn new(root_dir: &Path, session: GameSession) -> Self {
        let now = Utc::now();
        let path = session.cache_file(root_dir);
        Self {
            session,
            path,
            events: BTreeMap::new(),
            ledger: BTreeMap::new(),
            last_sort_order: None,
            meta: CacheMeta {
                schema_version: CACHE_SCHEMA_VERSION,
                created_ts: now,
                updated_ts: now,
            },
            dirty: false,
        }
    }

    /// Restore a persisted cache for the given session.
    ///
    /// Any error here means "start fresh" to the caller - `NotFound` when
    /// no file exists, `SchemaMismatch` when the stored version differs,
    /// `SessionMismatch` when the file belongs to a different game.
    pub fn load(root_dir: &Path, session: &GameSession) -> Result<Self, CacheError> {
        let path = session.cache_file(root_dir);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound { path });
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        let snapshot: CacheSnapshot = serde_json::from_str(&raw)?;

        if snapshot.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                found: snapshot.schema_version,
                current: CACHE_SCHEMA_VERSION,
            });
        }

        if snapshot.session != *session {
            return Err(CacheError::SessionMismatch {
                expected_season: session.season_id.clone(),
                expected_game: session.game_id.clone(),
                found_season: snapshot.session.season_id,
                found_game: snapshot.session.game_id,
            });
        }

        Ok(Self {
            session: session.clone(),
            path,
            events: snapshot.events,
            ledger: snapshot.ledger,
            last_sort_order: snapshot.last_sort_order,
            meta: snapshot.meta,
            dirty: false,
        })
    }

    /// Load-or-cold-start convenience used by the game loop. Never fails.
    pub fn open(root_dir: &Path, session: GameSession) -> Self {
        match Self::load(root_dir, &session) {
            Ok(cache) => {
                info!(
                    game_id = %session.game_id,
                    events = cache.events.len(),
                    ledger = cache.ledger.len(),
                    "Restored event cache from disk"
                );
                cache
            }
            Err(CacheError::NotFound { .. }) => {
                info!(game_id = %session.game_id, "No prior cache - cold start");
                Self::new(root_dir, session)
            }
            Err(e) => {
                warn!(game_id = %session.game_id, error = %e, "Cache unusable - cold start");
                Self::new(root_dir, session)
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn last_sort_order(&self) -> Option<i64> {
        self.last_sort_order
    }

    pub fn get_event(&self, event_id: &str) -> Option<&EventRecord> {
        self.events.get(event_id)
    }

    /// Pure read: has this post kind (optionally scoped to an event)
    /// already been sent?
    pub fn has_posted(&self, kind: PostKind, event_id: Option<&str>) -> bool {
        self.ledger
            .get(&kind.ledger_key(event_id))
            .map(|entry| entry.sent)
            .unwrap_or(false)
    }

    /// True when the event is new to the cache or its snapshot fields
    /// differ from what was last stored.
    pub fn event_changed(&self, event: &GameEvent) -> bool {
        match self.events.get(&event.event_id) {
            Some(record) => record.details != event.details,
            None => true,
        }
    }

    /// Stored thread root for a kind on one platform, if any.
    pub fn thread_root(&self, kind: PostKind, platform: &str) -> Option<&PostRef> {
        self.ledger
            .get(&kind.ledger_key(None))
            .and_then(|entry| entry.root_refs.get(platform))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Idempotently mark a post kind as sent. A second call for the same
    /// `(kind, event_id)` is a logged no-op - this is the dedup contract
    /// that prevents double-posting across restarts and overlapping
    /// cycles.
    pub fn record_post(&mut self, kind: PostKind, event_id: Option<&str>, refs: &[PostRef]) {
        let key = kind.ledger_key(event_id);
        let entry = self.ledger.entry(key.clone()).or_default();

        if entry.sent {
            debug!(key = %key, "record_post called for already-sent kind - ignoring");
            return;
        }

        entry.sent = true;
        entry.sent_at = Some(Utc::now());
        for r in refs {
            entry
                .root_refs
                .entry(r.platform.clone())
                .or_insert_with(|| r.clone());
        }

        if kind.is_event_scoped() {
            if let Some(id) = event_id {
                if let Some(record) = self.events.get_mut(id) {
                    record.posted = true;
                }
            }
        }

        self.dirty = true;
    }

    /// Create or refresh an event's snapshot without touching `posted`.
    ///
    /// A duplicate event id with a different event type is an invariant
    /// violation: logged loudly, the update is skipped, and the loop
    /// carries on.
    pub fn upsert_event(&mut self, event: &GameEvent) {
        match self.events.get_mut(&event.event_id) {
            Some(record) => {
                if record.event_type != event.event_type {
                    warn!(
                        event_id = %event.event_id,
                        cached_type = %record.event_type,
                        fetched_type = %event.event_type,
                        "Event id reused with a different type - skipping update"
                    );
                    return;
                }
                if record.details != event.details || record.sort_order != event.sort_order {
                    record.sort_order = event.sort_order;
                    record.team_abbrev = event.team_abbrev.clone();
                    record.details = event.details.clone();
                    self.dirty = true;
                }
            }
            None => {
                self.events.insert(
                    event.event_id.clone(),
                    EventRecord {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type,
                        sort_order: event.sort_order,
                        team_abbrev: event.team_abbrev.clone(),
                        posted: false,
                        details: event.details.clone(),
                    },
                );
                self.dirty = true;
            }
        }

        let seen = self.last_sort_order.unwrap_or(event.sort_order);
        self.last_sort_order = Some(seen.max(event.sort_order));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Immutable serializable view; copies the data, holds nothing open.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            schema_version: CACHE_SCHEMA_VERSION,
            session: self.session.clone(),
            events: self.events.clone(),
            ledger: self.ledger.clone(),
            last_sort_order: self.last_sort_order,
            meta: self.meta.clone(),
        }
    }

    /// Scoped write: serialize to `<file>.tmp` in the same directory,
    /// then atomically rename over the target. A reader always sees
    /// either the old complete file or the new complete file.
    pub fn persist(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }

        self.meta.updated_ts = Utc::now();
        let snapshot = self.snapshot();
        let payload = serde_json::to_string(&snapshot)?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        debug!(path = %self.path.display(), "Cache persisted");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::{GoalDetails, PeriodMarker};

    fn goal_event(id: &str, sort_order: i64) -> GameEvent {
        GameEvent {
            event_id: id.to_string(),
            event_type: EventType::Goal,
            sort_order,
            period: 1,
            period_type: "REG".to_string(),
            time_remaining: "10:00".to_string(),
            team_abbrev: Some("NJD".to_string()),
            details: EventDetails::Goal(GoalDetails {
                scorer: "Jack Hughes".to_string(),
                scorer_season_total: 10,
                assists: vec![],
                shot_type: "wrist".to_string(),
                home_score: 0,
                away_score: 1,
                empty_net: false,
            }),
        }
    }

    fn test_cache() -> EventCache {
        EventCache::new(
            Path::new("/tmp/hgb-test-cache"),
            GameSession::new("20242025", "2024020500", "NJD"),
        )
    }

    #[test]
    fn test_record_post_is_idempotent() {
        let mut cache = test_cache();
        let ev = goal_event("g1", 10);
        cache.upsert_event(&ev);

        assert!(!cache.has_posted(PostKind::Goal, Some("g1")));
        cache.record_post(PostKind::Goal, Some("g1"), &[]);
        assert!(cache.has_posted(PostKind::Goal, Some("g1")));
        assert!(cache.get_event("g1").unwrap().posted);

        // Second call is a no-op, not an error.
        cache.record_post(PostKind::Goal, Some("g1"), &[]);
        assert!(cache.has_posted(PostKind::Goal, Some("g1")));
    }

    #[test]
    fn test_upsert_does_not_touch_posted() {
        let mut cache = test_cache();
        let mut ev = goal_event("g1", 10);
        cache.upsert_event(&ev);
        cache.record_post(PostKind::Goal, Some("g1"), &[]);

        // Snapshot mutation (assist added upstream).
        if let EventDetails::Goal(ref mut g) = ev.details {
            g.assists.push(crate::data::models::Assist {
                name: "Jesper Bratt".to_string(),
                season_total: 22,
            });
        }
        assert!(cache.event_changed(&ev));
        cache.upsert_event(&ev);

        let record = cache.get_event("g1").unwrap();
        assert!(record.posted, "posted flag must never revert");
        assert!(!cache.event_changed(&ev), "snapshot should now match");
    }

    #[test]
    fn test_type_conflict_is_skipped() {
        let mut cache = test_cache();
        cache.upsert_event(&goal_event("g1", 10));

        let conflicting = GameEvent {
            event_type: EventType::Penalty,
            details: EventDetails::PeriodStart(PeriodMarker {
                period: 1,
                period_type: "REG".to_string(),
            }),
            ..goal_event("g1", 10)
        };
        cache.upsert_event(&conflicting);

        // Original record wins.
        assert_eq!(cache.get_event("g1").unwrap().event_type, EventType::Goal);
    }

    #[test]
    fn test_last_sort_order_tracks_max() {
        let mut cache = test_cache();
        cache.upsert_event(&goal_event("a", 30));
        cache.upsert_event(&goal_event("b", 10));
        assert_eq!(cache.last_sort_order(), Some(30));
    }

    #[test]
    fn test_thread_root_lookup() {
        let mut cache = test_cache();
        let r = PostRef {
            platform: "bluesky".to_string(),
            uri: "at://did:plc:abc/app.bsky.feed.post/1".to_string(),
            cid: "bafy1".to_string(),
        };
        cache.record_post(PostKind::PregameCore, None, std::slice::from_ref(&r));
        assert_eq!(cache.thread_root(PostKind::PregameCore, "bluesky"), Some(&r));
        assert!(cache.thread_root(PostKind::PregameCore, "threads").is_none());
    }
}
