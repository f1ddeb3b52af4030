//! Async REST client for the NHL stats API.
//!
//! Features:
//! - Rate limiting (configurable, default 5 req/sec)
//! - Automatic retries with exponential backoff
//! - Typed responses
//!
//! The NHL endpoints are public; no authentication is required.

use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::models::{
    ClubSchedule, GameFeed, RawClubSchedule, RawLanding, RawPlayByPlay, StarLine,
};

use super::errors::ApiError;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Contract between the game loop and the upstream data source.
/// The production implementation is `NhlClient`; tests substitute mocks.
#[allow(async_fn_in_trait)]
pub trait FetchSource {
    /// Season schedule for a club (game discovery, season series,
    /// next-game lookups).
    async fn club_schedule(&self, team_abbrev: &str) -> Result<ClubSchedule, ApiError>;

    /// Current play-by-play snapshot for a game: state, score, clock and
    /// all events seen so far.
    async fn play_by_play(&self, game_id: &str) -> Result<GameFeed, ApiError>;

    /// Three stars from the landing feed; empty until the league
    /// publishes them after the game.
    async fn three_stars(&self, game_id: &str) -> Result<Vec<StarLine>, ApiError>;
}

/// Async REST client for the NHL stats API.
pub struct NhlClient {
    base_url: String,
    client: Client,
    rate_limiter: Arc<DirectRateLimiter>,
    max_retries: u32,
}

impl NhlClient {
    pub fn new(
        base_url: &str,
        rate_limit: u32,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota =
            Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::new(5).unwrap()));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter,
            max_retries,
        })
    }

    /// Create with default settings.
    pub fn with_defaults(base_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, 5, 3, 15)
    }

    // =========================================================================
    // Core request method
    // =========================================================================

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.until_ready().await;

            debug!(path = %path, attempt = attempt + 1, "API request");

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| ApiError::Network(e.to_string()))?;
                        let json: serde_json::Value = serde_json::from_str(&text)
                            .map_err(|e| ApiError::Deserialization(e.to_string()))?;
                        return Ok(json);
                    }

                    // Server errors are retried with backoff.
                    if status.as_u16() >= 500 {
                        let delay_ms = 500 * 2u64.pow(attempt);
                        warn!(
                            status_code = status.as_u16(),
                            delay_ms,
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_error = Some(ApiError::Http {
                            status_code: status.as_u16(),
                            message: status.to_string(),
                        });
                        continue;
                    }

                    // Client errors are not retried.
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::Http {
                        status_code: status.as_u16(),
                        message: body,
                    });
                }
                Err(e) => {
                    let delay_ms = 500 * 2u64.pow(attempt);
                    warn!(
                        error = %e,
                        delay_ms,
                        attempt = attempt + 1,
                        "Network error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                    if e.is_timeout() {
                        last_error = Some(ApiError::Timeout(e.to_string()));
                    } else {
                        last_error = Some(ApiError::Network(e.to_string()));
                    }
                    continue;
                }
            }
        }

        Err(ApiError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

impl FetchSource for NhlClient {
    async fn club_schedule(&self, team_abbrev: &str) -> Result<ClubSchedule, ApiError> {
        let path = format!("/v1/club-schedule-season/{}/now", team_abbrev);
        let data = self.get_json(&path).await?;
        let raw: RawClubSchedule = serde_json::from_value(data)
            .map_err(|e| ApiError::Deserialization(e.to_string()))?;
        Ok(ClubSchedule::from_raw(raw))
    }

    async fn play_by_play(&self, game_id: &str) -> Result<GameFeed, ApiError> {
        let path = format!("/v1/gamecenter/{}/play-by-play", game_id);
        let data = self.get_json(&path).await?;
        let raw: RawPlayByPlay = serde_json::from_value(data)
            .map_err(|e| ApiError::Deserialization(e.to_string()))?;
        Ok(GameFeed::from_raw(raw))
    }

    async fn three_stars(&self, game_id: &str) -> Result<Vec<StarLine>, ApiError> {
        let path = format!("/v1/gamecenter/{}/landing", game_id);
        let data = self.get_json(&path).await?;
        let raw: RawLanding = serde_json::from_value(data)
            .map_err(|e| ApiError::Deserialization(e.to_string()))?;
        Ok(StarLine::from_landing(raw))
    }
}
