//! The main poll loop and game state machine.
//!
//! Drives fetch-compare-act cycles across SEARCHING, PREGAME, LIVE and
//! FINAL, using the event cache to decide what is new and the post
//! ledger to guarantee at-most-once posting. Nothing inside the loop is
//! allowed to terminate the process; every failure degrades to "count
//! the error, skip this cycle's action, continue". Shutdown is honored
//! only at cycle boundaries so a post-then-record sequence always
//! completes.

use chrono::Utc;
use chrono_tz::Tz;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::client::FetchSource;
use crate::data::models::{EventDetails, GameEvent, GameFeed, ScheduleGame};
use crate::game::content::{self, TeamInfo};
use crate::game::phase::GamePhase;
use crate::social::post::{PostKind, PostRef};
use crate::social::publisher::PostSink;
use crate::state::event_cache::{EventCache, GameSession};
use crate::state::status::{BotStatus, GameSummary, StatusReporter};

// =============================================================================
// Configuration
// =============================================================================

/// Policy for a goal whose snapshot changes after its initial post
/// (e.g. a corrected scorer or an added assist).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionPolicy {
    /// Emit one goal-update post per event.
    Correct,
    /// Update the cached snapshot silently.
    Silent,
}

impl FromStr for CorrectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correct" => Ok(Self::Correct),
            "silent" => Ok(Self::Silent),
            _ => Err(format!("Invalid correction policy: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub team_abbrev: String,
    pub team_hashtag: String,
    pub timezone: Tz,
    /// Track the game on this date (YYYY-MM-DD) instead of today.
    pub date_override: Option<String>,
    pub cache_dir: PathBuf,
    pub status_file: PathBuf,
    pub searching_sleep: Duration,
    pub pregame_sleep: Duration,
    pub live_sleep: Duration,
    pub final_sleep: Duration,
    pub schedule_max_attempts: u32,
    pub final_max_attempts: u32,
    pub correction_policy: CorrectionPolicy,
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Schedule was reachable but lists no game for the target date.
    NoGameToday,
    /// Game reached DONE; all end-of-game work finished or abandoned.
    Completed,
    /// Clean shutdown signal honored at a cycle boundary.
    ShutDown,
}

#[derive(Error, Debug)]
pub enum BotError {
    #[error("could not resolve a game to track after {attempts} attempts: {last_error}")]
    GameDiscovery { attempts: u32, last_error: String },
}

enum Discovery {
    Found,
    NoGameToday,
    ShutDown,
}

// =============================================================================
// Tracked game context
// =============================================================================

struct TrackedGame {
    session: GameSession,
    cache: EventCache,
    schedule_game: ScheduleGame,
    preferred: TeamInfo,
    other: TeamInfo,
    preferred_is_home: bool,
    hashtags: String,
    /// Set when the bot was started after the game already ended with no
    /// prior cache; per-event posts are suppressed so a cold FINAL start
    /// does not replay the whole game.
    skip_live_posts: bool,
}

// =============================================================================
// Game Loop
// =============================================================================

pub struct GameLoop<S, P> {
    config: LoopConfig,
    source: S,
    publisher: P,
    status: StatusReporter,
    shutdown: CancellationToken,
    phase: GamePhase,
    tracked: Option<TrackedGame>,
    final_loops: u32,
}

impl<S: FetchSource, P: PostSink> GameLoop<S, P> {
    pub fn new(
        config: LoopConfig,
        source: S,
        publisher: P,
        status: StatusReporter,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
            status,
            shutdown,
            phase: GamePhase::Searching,
            tracked: None,
            final_loops: 0,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Cache of the currently tracked game, if one is locked on.
    pub fn cache(&self) -> Option<&EventCache> {
        self.tracked.as_ref().map(|t| &t.cache)
    }

    /// Lock onto a game: create the session, restore or cold-start its
    /// cache, and derive the team identities used in post text.
    pub fn track(&mut self, season_id: &str, game: ScheduleGame) {
        let session = GameSession::new(season_id, &game.id, &self.config.team_abbrev);
        let cache = EventCache::open(&self.config.cache_dir, session.clone());

        let preferred_is_home = game.home.abbrev == self.config.team_abbrev;
        let (pref_team, other_team) = if preferred_is_home {
            (&game.home, &game.away)
        } else {
            (&game.away, &game.home)
        };
        let preferred = TeamInfo {
            abbrev: pref_team.abbrev.clone(),
            name: pref_team.name.clone(),
        };
        let other = TeamInfo {
            abbrev: other_team.abbrev.clone(),
            name: other_team.name.clone(),
        };
        let hashtags = format!(
            "{} | {}",
            self.config.team_hashtag,
            content::game_hashtag(&game.away.abbrev, &game.home.abbrev)
        );

        self.phase = GamePhase::from_game_state(&game.game_state).unwrap_or(GamePhase::Pregame);
        let skip_live_posts = self.phase == GamePhase::Final && cache.event_count() == 0;
        if skip_live_posts {
            info!("Bot started after the game ended with no cache - per-event posts suppressed");
        }

        info!(
            game_id = %session.game_id,
            season_id = %session.season_id,
            home = %game.home.abbrev,
            away = %game.away.abbrev,
            venue = %game.venue,
            phase = %self.phase,
            "Locked onto game"
        );

        self.tracked = Some(TrackedGame {
            session,
            cache,
            schedule_game: game,
            preferred,
            other,
            preferred_is_home,
            hashtags,
            skip_live_posts,
        });
    }

    /// Run until the game is complete, no game is found for today, or a
    /// shutdown signal arrives.
    pub async fn run(mut self) -> Result<LoopOutcome, BotError> {
        self.status.set_status(BotStatus::Running);

        match self.discover().await? {
            Discovery::Found => {}
            Discovery::NoGameToday => {
                self.status.set_status(BotStatus::Stopped);
                self.status.write(&self.config.status_file);
                return Ok(LoopOutcome::NoGameToday);
            }
            Discovery::ShutDown => {
                self.status.set_status(BotStatus::Stopped);
                self.status.write(&self.config.status_file);
                return Ok(LoopOutcome::ShutDown);
            }
        }

        let outcome = loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown signal received - stopping at cycle boundary");
                break LoopOutcome::ShutDown;
            }

            self.status.set_status(BotStatus::Running);
            self.run_cycle().await;

            if self.phase == GamePhase::Done {
                break LoopOutcome::Completed;
            }

            self.status.set_status(BotStatus::Sleeping);
            let sleep = self.phase_sleep();
            debug!(phase = %self.phase, sleep_s = sleep.as_secs(), "Cycle done - sleeping");
            if !self.sleep_cancellable(sleep).await {
                info!("Shutdown signal received during sleep");
                break LoopOutcome::ShutDown;
            }
        };

        // Final flush; best effort on the way out.
        if let Some(ref mut tracked) = self.tracked {
            if let Err(e) = tracked.cache.persist() {
                warn!(error = %e, "Final cache persist failed");
            }
        }
        self.status.set_status(BotStatus::Stopped);
        self.status.write(&self.config.status_file);

        Ok(outcome)
    }

    /// One fetch-compare-act cycle. Never terminates the process; all
    /// failures degrade to counted errors.
    pub async fn run_cycle(&mut self) {
        let Some(mut tracked) = self.tracked.take() else {
            return;
        };
        self.cycle_inner(&mut tracked).await;
        self.tracked = Some(tracked);
    }

    // =========================================================================
    // Discovery (SEARCHING)
    // =========================================================================

    async fn discover(&mut self) -> Result<Discovery, BotError> {
        let target_date = self.config.date_override.clone().unwrap_or_else(|| {
            Utc::now()
                .with_timezone(&self.config.timezone)
                .format("%Y-%m-%d")
                .to_string()
        });

        info!(
            team = %self.config.team_abbrev,
            date = %target_date,
            "Searching for a game to track"
        );

        let mut attempts = 0u32;
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(Discovery::ShutDown);
            }

            match self.source.club_schedule(&self.config.team_abbrev).await {
                Ok(schedule) => {
                    self.status.record_api_call(true);
                    match schedule.game_on_date(&target_date) {
                        Some(game) => {
                            self.track(&schedule.season_id, game.clone());
                            return Ok(Discovery::Found);
                        }
                        None => {
                            info!(date = %target_date, "No game scheduled - nothing to track");
                            return Ok(Discovery::NoGameToday);
                        }
                    }
                }
                Err(e) => {
                    attempts += 1;
                    self.status.record_api_call(false);
                    self.status.record_error(format!("schedule fetch failed: {e}"));

                    if attempts >= self.config.schedule_max_attempts {
                        self.status.set_status(BotStatus::Error);
                        self.status.write(&self.config.status_file);
                        return Err(BotError::GameDiscovery {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }

                    warn!(
                        attempt = attempts,
                        max = self.config.schedule_max_attempts,
                        error = %e,
                        "Schedule fetch failed - retrying"
                    );
                    if !self.sleep_cancellable(self.config.searching_sleep).await {
                        return Ok(Discovery::ShutDown);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Per-cycle work
    // =========================================================================

    async fn cycle_inner(&mut self, tracked: &mut TrackedGame) {
        self.status.record_cycle();

        let feed = match self.source.play_by_play(&tracked.session.game_id).await {
            Ok(feed) => {
                self.status.record_api_call(true);
                feed
            }
            Err(e) => {
                self.status.record_api_call(false);
                self.status.record_error(format!("play-by-play fetch failed: {e}"));
                warn!(error = %e, "Play-by-play fetch failed - skipping cycle");
                self.status.write(&self.config.status_file);
                return;
            }
        };

        match GamePhase::from_game_state(&feed.game_state) {
            Some(next) if next != self.phase => {
                info!(from = %self.phase, to = %next, state = %feed.game_state, "Game phase transition");
                self.phase = next;
            }
            Some(_) => {}
            None => {
                warn!(
                    state = %feed.game_state,
                    phase = %self.phase,
                    "Unrecognized game state - keeping current phase"
                );
            }
        }

        let mut summary = GameSummary::from_feed(&feed);
        summary.venue = Some(tracked.schedule_game.venue.clone());
        self.status.update_game(summary);
        self.status.update_event_counts(&feed.events);

        match self.phase {
            GamePhase::Pregame => self.pregame_actions(tracked).await,
            GamePhase::Live => self.process_events(tracked, &feed).await,
            GamePhase::Final => {
                self.process_events(tracked, &feed).await;
                self.final_actions(tracked, &feed).await;
            }
            GamePhase::Searching | GamePhase::Done => {}
        }

        // Keep every cached snapshot current, actionable or not.
        for event in &feed.events {
            tracked.cache.upsert_event(event);
        }

        if let Err(e) = tracked.cache.persist() {
            self.status.record_error(format!("cache persist failed: {e}"));
        }
        self.status.update_cache_summary(&tracked.cache.snapshot());
        self.status.write(&self.config.status_file);
    }

    /// Diff fetched events against the cache and act on the new or
    /// changed ones, always in ascending sort order (ties broken by
    /// event id) so a thread never announces events out of order.
    async fn process_events(&mut self, tracked: &mut TrackedGame, feed: &GameFeed) {
        if tracked.skip_live_posts {
            debug!("Per-event posts suppressed for this session");
            return;
        }

        let mut actionable: Vec<&GameEvent> = feed
            .events
            .iter()
            .filter(|e| tracked.cache.event_changed(e))
            .collect();

        if actionable.is_empty() {
            debug!(total = feed.events.len(), "No new events this cycle");
            return;
        }

        actionable.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| event_id_cmp(&a.event_id, &b.event_id))
        });

        info!(
            new_events = actionable.len(),
            total = feed.events.len(),
            "Processing actionable events"
        );

        for event in actionable {
            self.handle_event(tracked, event, feed).await;
        }
    }

    async fn handle_event(
        &mut self,
        tracked: &mut TrackedGame,
        event: &GameEvent,
        feed: &GameFeed,
    ) {
        match &event.details {
            EventDetails::Goal(goal) => {
                let id = event.event_id.as_str();
                let scored_by_preferred =
                    event.team_abbrev.as_deref() == Some(tracked.preferred.abbrev.as_str());

                if !tracked.cache.has_posted(PostKind::Goal, Some(id)) {
                    let text = content::goal_post(
                        goal,
                        event.period,
                        &event.period_type,
                        &event.time_remaining,
                        &tracked.preferred,
                        &tracked.other,
                        tracked.preferred_is_home,
                        scored_by_preferred,
                        &tracked.hashtags,
                    );
                    self.try_post(tracked, PostKind::Goal, Some(id), &text, None)
                        .await;
                } else if self.config.correction_policy == CorrectionPolicy::Correct
                    && !tracked.cache.has_posted(PostKind::GoalUpdate, Some(id))
                {
                    info!(event_id = %id, "Scoring change detected on a posted goal");
                    let text =
                        content::goal_update_post(goal, event.period, &event.period_type, &tracked.hashtags);
                    self.try_post(tracked, PostKind::GoalUpdate, Some(id), &text, None)
                        .await;
                }
            }
            EventDetails::Penalty(penalty) => {
                let id = event.event_id.as_str();
                if !tracked.cache.has_posted(PostKind::Penalty, Some(id)) {
                    let text = content::penalty_post(
                        penalty,
                        event.period,
                        &event.period_type,
                        &event.time_remaining,
                        &tracked.hashtags,
                    );
                    self.try_post(tracked, PostKind::Penalty, Some(id), &text, None)
                        .await;
                }
            }
            EventDetails::PeriodStart(marker) => {
                let id = event.event_id.as_str();
                if !tracked.cache.has_posted(PostKind::PeriodStart, Some(id)) {
                    let (pref_score, other_score) = if tracked.preferred_is_home {
                        (feed.home.score, feed.away.score)
                    } else {
                        (feed.away.score, feed.home.score)
                    };
                    let text = content::period_start_post(
                        marker.period,
                        &marker.period_type,
                        &tracked.preferred,
                        &tracked.other,
                        pref_score,
                        other_score,
                        &tracked.hashtags,
                    );
                    self.try_post(tracked, PostKind::PeriodStart, Some(id), &text, None)
                        .await;
                }
            }
            // Stored and counted, never posted.
            EventDetails::PeriodEnd(_) | EventDetails::Unknown => {}
        }
    }

    // =========================================================================
    // Phase actions
    // =========================================================================

    async fn pregame_actions(&mut self, tracked: &mut TrackedGame) {
        if !tracked.cache.has_posted(PostKind::PregameCore, None) {
            let text = content::pregame_core(
                &tracked.schedule_game,
                &tracked.hashtags,
                self.config.timezone,
                Utc::now(),
            );
            self.try_post(tracked, PostKind::PregameCore, None, &text, None)
                .await;
        }

        if tracked.cache.has_posted(PostKind::PregameCore, None)
            && !tracked.cache.has_posted(PostKind::PregameSeasonSeries, None)
        {
            match self.source.club_schedule(&self.config.team_abbrev).await {
                Ok(schedule) => {
                    self.status.record_api_call(true);
                    let text = content::season_series(
                        &schedule,
                        &tracked.preferred,
                        &tracked.other,
                        &tracked.hashtags,
                    );
                    let root = tracked
                        .cache
                        .thread_root(PostKind::PregameCore, self.publisher.platform())
                        .cloned();
                    self.try_post(tracked, PostKind::PregameSeasonSeries, None, &text, root)
                        .await;
                }
                Err(e) => {
                    self.status.record_api_call(false);
                    self.status
                        .record_error(format!("season series schedule fetch failed: {e}"));
                }
            }
        }
    }

    async fn final_actions(&mut self, tracked: &mut TrackedGame, feed: &GameFeed) {
        self.final_loops += 1;

        if !tracked.cache.has_posted(PostKind::FinalScore, None) {
            let (pref_score, other_score) = if tracked.preferred_is_home {
                (feed.home.score, feed.away.score)
            } else {
                (feed.away.score, feed.home.score)
            };

            let next_line = match self.source.club_schedule(&self.config.team_abbrev).await {
                Ok(schedule) => {
                    self.status.record_api_call(true);
                    content::next_game_line(&schedule, &tracked.preferred, self.config.timezone)
                }
                Err(e) => {
                    self.status.record_api_call(false);
                    self.status
                        .record_error(format!("next game lookup failed: {e}"));
                    None
                }
            };

            let text = content::final_score_post(
                &tracked.preferred,
                &tracked.other,
                pref_score,
                other_score,
                tracked.preferred_is_home,
                next_line.as_deref(),
                &tracked.hashtags,
            );
            self.try_post(tracked, PostKind::FinalScore, None, &text, None)
                .await;
        }

        if tracked.cache.has_posted(PostKind::FinalScore, None)
            && !tracked.cache.has_posted(PostKind::ThreeStars, None)
        {
            match self.source.three_stars(&tracked.session.game_id).await {
                Ok(stars) if !stars.is_empty() => {
                    self.status.record_api_call(true);
                    let text = content::three_stars_post(&stars, &tracked.hashtags);
                    let root = tracked
                        .cache
                        .thread_root(PostKind::FinalScore, self.publisher.platform())
                        .cloned();
                    self.try_post(tracked, PostKind::ThreeStars, None, &text, root)
                        .await;
                }
                Ok(_) => {
                    self.status.record_api_call(true);
                    info!("Three stars not yet published - will check next cycle");
                }
                Err(e) => {
                    self.status.record_api_call(false);
                    self.status
                        .record_error(format!("three stars fetch failed: {e}"));
                }
            }
        }

        let all_sent = tracked.cache.has_posted(PostKind::FinalScore, None)
            && tracked.cache.has_posted(PostKind::ThreeStars, None);

        if all_sent {
            info!("All end-of-game posts sent - game complete");
            self.phase = GamePhase::Done;
        } else if self.final_loops >= self.config.final_max_attempts {
            warn!(
                loops = self.final_loops,
                "End-of-game attempt budget exhausted - abandoning remaining posts"
            );
            self.phase = GamePhase::Done;
        }
    }

    // =========================================================================
    // Posting
    // =========================================================================

    /// Post-then-record. A successful post is recorded in the ledger; a
    /// failed one is counted and left unrecorded so the next cycle
    /// retries the same actionable event.
    async fn try_post(
        &mut self,
        tracked: &mut TrackedGame,
        kind: PostKind,
        event_id: Option<&str>,
        text: &str,
        reply_to: Option<PostRef>,
    ) -> bool {
        if tracked.cache.has_posted(kind, event_id) {
            return true;
        }

        match self.publisher.post(kind, text, reply_to.as_ref()).await {
            Ok(post_ref) => {
                tracked
                    .cache
                    .record_post(kind, event_id, std::slice::from_ref(&post_ref));
                self.status.record_post();
                info!(kind = %kind, event_id = ?event_id, uri = %post_ref.uri, "Posted");
                true
            }
            Err(e) => {
                self.status.record_error(format!("post {kind} failed: {e}"));
                warn!(kind = %kind, error = %e, "Post failed - will retry next cycle");
                false
            }
        }
    }

    // =========================================================================
    // Sleeping
    // =========================================================================

    fn phase_sleep(&self) -> Duration {
        match self.phase {
            GamePhase::Searching => self.config.searching_sleep,
            GamePhase::Pregame => self.config.pregame_sleep,
            GamePhase::Live => self.config.live_sleep,
            GamePhase::Final | GamePhase::Done => self.config.final_sleep,
        }
    }

    /// Returns false if the shutdown signal arrived during the sleep.
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Event ids are numeric upstream; compare numerically when possible so
/// "9" sorts before "10".
fn event_id_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_cmp_numeric() {
        assert_eq!(event_id_cmp("9", "10"), Ordering::Less);
        assert_eq!(event_id_cmp("100", "100"), Ordering::Equal);
        assert_eq!(event_id_cmp("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn test_correction_policy_parsing() {
        assert_eq!(
            "correct".parse::<CorrectionPolicy>().unwrap(),
            CorrectionPolicy::Correct
        );
        assert_eq!(
            "SILENT".parse::<CorrectionPolicy>().unwrap(),
            CorrectionPolicy::Silent
        );
        assert!("loud".parse::<CorrectionPolicy>().is_err());
    }
}
