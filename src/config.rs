//! Configuration management.
//!
//! Loads settings from environment variables and .env file.

use std::path::PathBuf;

use crate::game::game_loop::CorrectionPolicy;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Settings {
    // Team
    pub team_abbrev: String,
    pub team_hashtag: String,
    pub team_tz: String,

    // NHL API
    pub nhl_base_url: String,
    pub api_timeout_seconds: u64,
    pub api_max_retries: u32,
    pub api_rate_limit: u32,

    // Loop timing
    pub date_override: Option<String>,
    pub searching_sleep_seconds: u64,
    pub pregame_sleep_seconds: u64,
    pub live_sleep_seconds: u64,
    pub final_sleep_seconds: u64,
    pub schedule_max_attempts: u32,
    pub final_max_attempts: u32,

    // Posting policy
    pub goal_correction_policy: CorrectionPolicy,
    pub nosocial: bool,

    // Bluesky
    pub bluesky_enabled: bool,
    pub bluesky_handle: String,
    pub bluesky_app_password: String,
    pub bluesky_service_url: String,

    // Paths
    pub cache_dir: PathBuf,
    pub status_file: PathBuf,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    /// Load settings from environment variables (and .env file).
    pub fn from_env() -> Self {
        // Try to load .env file (ignore if not found).
        let _ = dotenvy::dotenv();

        let team_abbrev = env_str("TEAM_ABBREV", "NJD").to_uppercase();
        let default_hashtag = format!("#{}", team_abbrev);

        Self {
            team_hashtag: env_str("TEAM_HASHTAG", &default_hashtag),
            team_tz: env_str("TEAM_TZ", "US/Eastern"),
            team_abbrev,

            nhl_base_url: env_str("NHL_BASE_URL", "https://api-web.nhle.com"),
            api_timeout_seconds: env_u64("API_TIMEOUT_SECONDS", 15),
            api_max_retries: env_u32("API_MAX_RETRIES", 3),
            api_rate_limit: env_u32("API_RATE_LIMIT", 5),

            date_override: env_opt("DATE_OVERRIDE"),
            searching_sleep_seconds: env_u64("SEARCHING_SLEEP_SECONDS", 900),
            pregame_sleep_seconds: env_u64("PREGAME_SLEEP_SECONDS", 1800),
            live_sleep_seconds: env_u64("LIVE_SLEEP_SECONDS", 15),
            final_sleep_seconds: env_u64("FINAL_SLEEP_SECONDS", 120),
            schedule_max_attempts: env_u32("SCHEDULE_MAX_ATTEMPTS", 5),
            final_max_attempts: env_u32("FINAL_MAX_ATTEMPTS", 20),

            goal_correction_policy: env_str("GOAL_CORRECTION_POLICY", "correct")
                .parse()
                .unwrap_or(CorrectionPolicy::Correct),
            nosocial: env_bool("NOSOCIAL", false),

            bluesky_enabled: env_bool("BLUESKY_ENABLED", true),
            bluesky_handle: env_str("BLUESKY_HANDLE", ""),
            bluesky_app_password: env_str("BLUESKY_APP_PASSWORD", ""),
            bluesky_service_url: env_str("BLUESKY_SERVICE_URL", "https://bsky.social"),

            cache_dir: PathBuf::from(env_str("CACHE_DIR", "cache")),
            status_file: PathBuf::from(env_str("STATUS_FILE", "status.json")),

            log_level: env_str("LOG_LEVEL", "info"),
            log_json: env_bool("LOG_JSON", false),
        }
    }

    /// Validate configuration for critical requirements.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.team_abbrev.len() != 3 {
            errors.push(format!(
                "TEAM_ABBREV must be a 3-letter tri-code, got '{}'",
                self.team_abbrev
            ));
        }

        if self.bluesky_enabled && !self.nosocial {
            if self.bluesky_handle.is_empty() {
                errors.push("BLUESKY_HANDLE is required when Bluesky posting is enabled".to_string());
            }
            if self.bluesky_app_password.is_empty() {
                errors.push(
                    "BLUESKY_APP_PASSWORD is required when Bluesky posting is enabled".to_string(),
                );
            }
        }

        if self.team_tz.parse::<chrono_tz::Tz>().is_err() {
            errors.push(format!("TEAM_TZ '{}' is not a valid timezone", self.team_tz));
        }

        if self.live_sleep_seconds == 0 {
            errors.push("LIVE_SLEEP_SECONDS must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.team_tz.parse().unwrap_or(chrono_tz::US::Eastern)
    }
}

// =============================================================================
// Environment helpers
// =============================================================================

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
