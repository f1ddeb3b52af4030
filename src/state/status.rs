//! Thread-safe status reporter for bot health and counters.
//!
//! Holds in-memory counters (events, API call outcomes, posts, errors,
//! uptime) updated by the game loop, and exports a serializable
//! `StatusSnapshot` consumed by the external dashboard. Readers take a
//! copy-on-read under a short-lived lock; no lock is ever held across
//! I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{error, warn};

use crate::data::models::{EventType, GameEvent, GameFeed};
use crate::state::event_cache::CacheSnapshot;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reporting disables itself after this many consecutive write failures;
/// the bot keeps running, the dashboard just goes stale.
const MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 10;

// =============================================================================
// Snapshot types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    Starting,
    Running,
    Sleeping,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    pub status: BotStatus,
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: Option<String>,
    pub game_state: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub period: Option<u32>,
    pub period_type: Option<String>,
    pub time_remaining: Option<String>,
    pub in_intermission: bool,
    pub venue: Option<String>,
}

impl GameSummary {
    pub fn from_feed(feed: &GameFeed) -> Self {
        Self {
            game_id: Some(feed.game_id.clone()),
            game_state: Some(feed.game_state.clone()),
            home_team: Some(feed.home.abbrev.clone()),
            away_team: Some(feed.away.abbrev.clone()),
            home_score: Some(feed.home.score),
            away_score: Some(feed.away.score),
            period: feed.period,
            period_type: feed.period_type.clone(),
            time_remaining: feed.time_remaining.clone(),
            in_intermission: feed.in_intermission,
            venue: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCounts {
    pub total: u64,
    pub goals: u64,
    pub penalties: u64,
    pub shots: u64,
    pub hits: u64,
    pub blocks: u64,
    pub takeaways: u64,
    pub giveaways: u64,
    pub faceoffs: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCallCounts {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    pub loop_count: u64,
    pub last_cycle_time: Option<DateTime<Utc>>,
    pub api_calls: ApiCallCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub count: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialCounts {
    pub posts_sent: u64,
    pub last_post_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSummary {
    pub season_id: String,
    pub game_id: String,
    pub team_abbrev: String,
    pub tracked_events: usize,
    pub posted_events: usize,
    pub ledger_entries: usize,
    pub last_sort_order: Option<i64>,
}

impl CacheSummary {
    pub fn from_snapshot(snapshot: &CacheSnapshot) -> Self {
        Self {
            season_id: snapshot.session.season_id.clone(),
            game_id: snapshot.session.game_id.clone(),
            team_abbrev: snapshot.session.team_abbrev.clone(),
            tracked_events: snapshot.events.len(),
            posted_events: snapshot.posted_count(),
            ledger_entries: snapshot.ledger.len(),
            last_sort_order: snapshot.last_sort_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub summary: Option<CacheSummary>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Serializable summary polled by the external dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub bot: BotInfo,
    pub game: GameSummary,
    pub events: EventCounts,
    pub performance: Performance,
    pub errors: ErrorCounts,
    pub socials: SocialCounts,
    pub health: HealthReport,
    pub cache: CacheStatus,
}

// =============================================================================
// Reporter
// =============================================================================

#[derive(Debug)]
struct Inner {
    status: BotStatus,
    start_time: DateTime<Utc>,
    game: GameSummary,
    events: EventCounts,
    performance: Performance,
    errors: ErrorCounts,
    socials: SocialCounts,
    cache_summary: Option<CacheSummary>,
    cache_updated: Option<DateTime<Utc>>,
    consecutive_write_failures: u32,
    reporting_enabled: bool,
}

/// Cheap-to-clone handle; all clones share the same counters.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    inner: Arc<RwLock<Inner>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                status: BotStatus::Starting,
                start_time: Utc::now(),
                game: GameSummary::default(),
                events: EventCounts::default(),
                performance: Performance::default(),
                errors: ErrorCounts::default(),
                socials: SocialCounts::default(),
                cache_summary: None,
                cache_updated: None,
                consecutive_write_failures: 0,
                reporting_enabled: true,
            })),
        }
    }

    pub fn set_status(&self, status: BotStatus) {
        self.inner.write().unwrap().status = status;
    }

    pub fn update_game(&self, game: GameSummary) {
        self.inner.write().unwrap().game = game;
    }

    /// Recompute per-type totals from the full fetched event list.
    pub fn update_event_counts(&self, events: &[GameEvent]) {
        let mut counts = EventCounts {
            total: events.len() as u64,
            ..EventCounts::default()
        };
        for event in events {
            match event.event_type {
                EventType::Goal => counts.goals += 1,
                EventType::Penalty => counts.penalties += 1,
                EventType::ShotOnGoal => counts.shots += 1,
                EventType::Hit => counts.hits += 1,
                EventType::BlockedShot => counts.blocks += 1,
                EventType::Takeaway => counts.takeaways += 1,
                EventType::Giveaway => counts.giveaways += 1,
                EventType::Faceoff => counts.faceoffs += 1,
                _ => counts.other += 1,
            }
        }
        self.inner.write().unwrap().events = counts;
    }

    pub fn record_api_call(&self, success: bool) {
        let mut inner = self.inner.write().unwrap();
        inner.performance.api_calls.total += 1;
        if success {
            inner.performance.api_calls.successful += 1;
        } else {
            inner.performance.api_calls.failed += 1;
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.write().unwrap();
        inner.errors.count += 1;
        inner.errors.last_error = Some(message.clone());
        inner.errors.last_error_time = Some(Utc::now());
        drop(inner);
        warn!(error = %message, "Error recorded");
    }

    pub fn record_post(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.socials.posts_sent += 1;
        inner.socials.last_post_time = Some(Utc::now());
    }

    pub fn record_cycle(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.performance.loop_count += 1;
        inner.performance.last_cycle_time = Some(Utc::now());
    }

    pub fn update_cache_summary(&self, snapshot: &CacheSnapshot) {
        let mut inner = self.inner.write().unwrap();
        inner.cache_summary = Some(CacheSummary::from_snapshot(snapshot));
        inner.cache_updated = Some(Utc::now());
    }

    /// Copy-on-read export. Safe to call concurrently with counter
    /// increments; performs no I/O.
    pub fn export(&self) -> StatusSnapshot {
        let inner = self.inner.read().unwrap();
        let now = Utc::now();
        let issues = check_health(&inner);

        StatusSnapshot {
            bot: BotInfo {
                status: inner.status,
                version: VERSION.to_string(),
                start_time: inner.start_time,
                last_update: now,
                uptime_seconds: (now - inner.start_time).num_seconds(),
            },
            game: inner.game.clone(),
            events: inner.events.clone(),
            performance: inner.performance.clone(),
            errors: inner.errors.clone(),
            socials: inner.socials.clone(),
            health: HealthReport {
                healthy: issues.is_empty(),
                issues,
            },
            cache: CacheStatus {
                enabled: inner.cache_summary.is_some(),
                summary: inner.cache_summary.clone(),
                last_updated: inner.cache_updated,
            },
        }
    }

    /// Serialize the export and atomically replace the status file.
    /// Failures are tolerated; after too many in a row, reporting
    /// disables itself and the bot keeps running.
    pub fn write(&self, path: &Path) {
        if !self.inner.read().unwrap().reporting_enabled {
            return;
        }

        let snapshot = self.export();
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(std::io::Error::other)
            .and_then(|payload| {
                if let Some(dir) = path.parent() {
                    if !dir.as_os_str().is_empty() {
                        fs::create_dir_all(dir)?;
                    }
                }
                let tmp = path.with_extension("tmp");
                fs::write(&tmp, payload)?;
                fs::rename(&tmp, path)
            });

        let mut inner = self.inner.write().unwrap();
        match result {
            Ok(()) => {
                inner.consecutive_write_failures = 0;
            }
            Err(e) => {
                inner.consecutive_write_failures += 1;
                let failures = inner.consecutive_write_failures;
                if failures >= MAX_CONSECUTIVE_WRITE_FAILURES {
                    inner.reporting_enabled = false;
                    drop(inner);
                    error!(
                        failures,
                        "Status reporting disabled after repeated write failures - dashboard will show stale data"
                    );
                } else {
                    drop(inner);
                    error!(error = %e, failures, path = %path.display(), "Failed to write status file");
                }
            }
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn check_health(inner: &Inner) -> Vec<String> {
    let mut issues = Vec::new();

    if inner.errors.count > 10 {
        issues.push(format!("High error count ({} errors)", inner.errors.count));
    }

    let calls = &inner.performance.api_calls;
    if calls.total > 10 && calls.failed * 10 > calls.total {
        let rate = (calls.failed as f64 / calls.total as f64) * 100.0;
        issues.push(format!("High API failure rate ({:.1}%)", rate));
    }

    issues
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let status = StatusReporter::new();
        status.record_api_call(true);
        status.record_api_call(false);
        status.record_error("fetch timed out");
        status.record_post();
        status.record_cycle();

        let snap = status.export();
        assert_eq!(snap.performance.api_calls.total, 2);
        assert_eq!(snap.performance.api_calls.failed, 1);
        assert_eq!(snap.errors.count, 1);
        assert_eq!(snap.errors.last_error.as_deref(), Some("fetch timed out"));
        assert_eq!(snap.socials.posts_sent, 1);
        assert_eq!(snap.performance.loop_count, 1);
    }

    #[test]
    fn test_clones_share_state() {
        let status = StatusReporter::new();
        let handle = status.clone();
        handle.record_api_call(true);
        assert_eq!(status.export().performance.api_calls.total, 1);
    }

    #[test]
    fn test_health_flags_api_failure_rate() {
        let status = StatusReporter::new();
        for _ in 0..10 {
            status.record_api_call(true);
        }
        assert!(status.export().health.healthy);

        // 11th call fails: 1/11 < 10%, still fine.
        status.record_api_call(false);
        assert!(status.export().health.healthy);

        for _ in 0..2 {
            status.record_api_call(false);
        }
        // 3 failed of 13 > 10%.
        let snap = status.export();
        assert!(!snap.health.healthy);
        assert!(snap.health.issues[0].contains("API failure rate"));
    }

    #[test]
    fn test_status_transitions() {
        let status = StatusReporter::new();
        assert_eq!(status.export().bot.status, BotStatus::Starting);
        status.set_status(BotStatus::Running);
        assert_eq!(status.export().bot.status, BotStatus::Running);
        status.set_status(BotStatus::Stopped);
        assert_eq!(status.export().bot.status, BotStatus::Stopped);
    }
}
