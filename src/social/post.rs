//! Post kinds and platform post references.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Logical category of social post. Event-scoped kinds are deduplicated
/// per `(kind, event_id)`; the rest once per game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostKind {
    PregameCore,
    PregameSeasonSeries,
    PeriodStart,
    Goal,
    GoalUpdate,
    Penalty,
    FinalScore,
    ThreeStars,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PregameCore => "pregame-core",
            Self::PregameSeasonSeries => "pregame-season-series",
            Self::PeriodStart => "period-start",
            Self::Goal => "goal",
            Self::GoalUpdate => "goal-update",
            Self::Penalty => "penalty",
            Self::FinalScore => "final-score",
            Self::ThreeStars => "three-stars",
        }
    }

    /// Whether this kind is tied to a specific game event.
    pub fn is_event_scoped(&self) -> bool {
        matches!(
            self,
            Self::PeriodStart | Self::Goal | Self::GoalUpdate | Self::Penalty
        )
    }

    /// Ledger key for the post dedup map.
    pub fn ledger_key(&self, event_id: Option<&str>) -> String {
        match event_id {
            Some(id) => format!("{}:{}", self.as_str(), id),
            None => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a published post, usable for threading replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub platform: String,
    pub uri: String,
    pub cid: String,
}

#[derive(Error, Debug)]
pub enum PostError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("platform rejected post: {status_code} - {message}")]
    Rejected { status_code: u16, message: String },

    #[error("no social platform is enabled")]
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_keys() {
        assert_eq!(PostKind::PregameCore.ledger_key(None), "pregame-core");
        assert_eq!(PostKind::Goal.ledger_key(Some("157")), "goal:157");
        assert!(PostKind::Goal.is_event_scoped());
        assert!(!PostKind::FinalScore.is_event_scoped());
    }
}
