//! NHL Game Bot
//!
//! Polls the NHL stats API on a timer, detects state changes in a live
//! game (score, period, goals, penalties), and posts formatted updates
//! to Bluesky, while writing a JSON status snapshot consumed by a
//! browser dashboard.
//!
//! Architecture:
//! - Tokio async runtime, single polling task
//! - Restart-safe event cache with an at-most-once post ledger
//! - Game phase state machine: SEARCHING -> PREGAME -> LIVE -> FINAL -> DONE
//! - Status reporter exporting counters to status.json

use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hockeygamebot::api::client::NhlClient;
use hockeygamebot::config::Settings;
use hockeygamebot::game::game_loop::{GameLoop, LoopConfig, LoopOutcome};
use hockeygamebot::social::bluesky::{BlueskyClient, BlueskyConfig};
use hockeygamebot::social::publisher::SocialPublisher;
use hockeygamebot::state::status::StatusReporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration.
    let settings = Settings::from_env();

    // Initialize logging.
    init_logging(&settings);

    info!("=== NHL Game Bot (Rust) ===");
    info!(
        team = %settings.team_abbrev,
        nosocial = settings.nosocial,
        bluesky = settings.bluesky_enabled,
        cache_dir = %settings.cache_dir.display(),
        "Configuration loaded"
    );

    // Validate settings.
    if let Err(errors) = settings.validate() {
        for e in &errors {
            error!(error = %e, "Configuration error");
        }
        anyhow::bail!("Configuration validation failed");
    }

    // Initialize API client.
    let client = NhlClient::new(
        &settings.nhl_base_url,
        settings.api_rate_limit,
        settings.api_max_retries,
        settings.api_timeout_seconds,
    )?;

    // Initialize status reporter.
    let status = StatusReporter::new();

    // Initialize the social publisher.
    let bluesky = if settings.bluesky_enabled && !settings.nosocial {
        Some(BlueskyClient::new(BlueskyConfig {
            handle: settings.bluesky_handle.clone(),
            app_password: settings.bluesky_app_password.clone(),
            service_url: settings.bluesky_service_url.clone(),
        })?)
    } else {
        None
    };
    let mut publisher = SocialPublisher::new(bluesky, settings.nosocial);

    if settings.nosocial {
        info!("NOSOCIAL mode - posts will be logged, not published");
    } else if let Err(e) = publisher.login().await {
        // The first post retries the login; a dead network at startup
        // should not kill the bot before the game even starts.
        warn!(error = %e, "Social login failed - will retry on first post");
    }

    // Shutdown signal, honored at cycle boundaries.
    let shutdown = CancellationToken::new();
    let shutdown_listener = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_listener.cancel();
        }
    });

    let loop_config = LoopConfig {
        team_abbrev: settings.team_abbrev.clone(),
        team_hashtag: settings.team_hashtag.clone(),
        timezone: settings.timezone(),
        date_override: settings.date_override.clone(),
        cache_dir: settings.cache_dir.clone(),
        status_file: settings.status_file.clone(),
        searching_sleep: Duration::from_secs(settings.searching_sleep_seconds),
        pregame_sleep: Duration::from_secs(settings.pregame_sleep_seconds),
        live_sleep: Duration::from_secs(settings.live_sleep_seconds),
        final_sleep: Duration::from_secs(settings.final_sleep_seconds),
        schedule_max_attempts: settings.schedule_max_attempts,
        final_max_attempts: settings.final_max_attempts,
        correction_policy: settings.goal_correction_policy,
    };

    let game_loop = GameLoop::new(loop_config, client, publisher, status, shutdown);

    match game_loop.run().await {
        Ok(LoopOutcome::NoGameToday) => {
            info!("No game scheduled today - exiting");
        }
        Ok(LoopOutcome::Completed) => {
            info!("Game complete - all updates posted. Bot shutdown complete.");
        }
        Ok(LoopOutcome::ShutDown) => {
            info!("Stopped by shutdown signal. Bot shutdown complete.");
        }
        Err(e) => {
            error!(error = %e, "Unrecoverable startup failure");
            anyhow::bail!(e);
        }
    }

    Ok(())
}

fn init_logging(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    if settings.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
