//! Data models for the NHL stats API.
//!
//! Raw serde types mirror the upstream JSON; the normalized types
//! (`ClubSchedule`, `GameFeed`, `GameEvent`) are what the rest of the
//! bot works with. Unrecognized play types degrade to
//! `EventDetails::Unknown` so a new upstream event kind never breaks
//! the polling loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Raw API types (deserialization only)
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalizedName {
    #[serde(default)]
    pub default: String,
}

#[derive(Debug, Deserialize)]
pub struct RawClubSchedule {
    #[serde(rename = "currentSeason", default)]
    pub current_season: Option<i64>,
    #[serde(default)]
    pub games: Vec<RawScheduleGame>,
}

#[derive(Debug, Deserialize)]
pub struct RawScheduleGame {
    pub id: i64,
    #[serde(rename = "gameDate", default)]
    pub game_date: String,
    #[serde(rename = "gameState", default)]
    pub game_state: String,
    #[serde(rename = "startTimeUTC")]
    pub start_time_utc: DateTime<Utc>,
    #[serde(default)]
    pub venue: Option<LocalizedName>,
    #[serde(rename = "awayTeam")]
    pub away_team: RawScheduleTeam,
    #[serde(rename = "homeTeam")]
    pub home_team: RawScheduleTeam,
    #[serde(rename = "gameOutcome", default)]
    pub game_outcome: Option<RawGameOutcome>,
    #[serde(rename = "tvBroadcasts", default)]
    pub tv_broadcasts: Vec<RawBroadcast>,
}

#[derive(Debug, Deserialize)]
pub struct RawBroadcast {
    #[serde(default)]
    pub network: String,
}

#[derive(Debug, Deserialize)]
pub struct RawScheduleTeam {
    #[serde(default)]
    pub abbrev: String,
    #[serde(rename = "placeName", default)]
    pub place_name: Option<LocalizedName>,
    #[serde(rename = "commonName", default)]
    pub common_name: Option<LocalizedName>,
    #[serde(default)]
    pub score: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawGameOutcome {
    #[serde(rename = "lastPeriodType", default)]
    pub last_period_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPlayByPlay {
    pub id: i64,
    #[serde(rename = "gameState", default)]
    pub game_state: String,
    #[serde(rename = "periodDescriptor", default)]
    pub period_descriptor: Option<RawPeriodDescriptor>,
    #[serde(rename = "awayTeam")]
    pub away_team: RawFeedTeam,
    #[serde(rename = "homeTeam")]
    pub home_team: RawFeedTeam,
    #[serde(default)]
    pub clock: Option<RawClock>,
    #[serde(rename = "rosterSpots", default)]
    pub roster_spots: Vec<RawRosterSpot>,
    #[serde(default)]
    pub plays: Vec<RawPlay>,
}

#[derive(Debug, Deserialize)]
pub struct RawFeedTeam {
    pub id: i64,
    #[serde(default)]
    pub abbrev: String,
    #[serde(default)]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPeriodDescriptor {
    #[serde(default)]
    pub number: u32,
    #[serde(rename = "periodType", default)]
    pub period_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RawClock {
    #[serde(rename = "timeRemaining", default)]
    pub time_remaining: String,
    #[serde(rename = "inIntermission", default)]
    pub in_intermission: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawRosterSpot {
    #[serde(rename = "playerId")]
    pub player_id: i64,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<LocalizedName>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<LocalizedName>,
}

#[derive(Debug, Deserialize)]
pub struct RawPlay {
    #[serde(rename = "eventId")]
    pub event_id: i64,
    #[serde(rename = "typeDescKey", default)]
    pub type_desc_key: String,
    #[serde(rename = "sortOrder", default)]
    pub sort_order: i64,
    #[serde(rename = "periodDescriptor", default)]
    pub period_descriptor: Option<RawPeriodDescriptor>,
    #[serde(rename = "timeRemaining", default)]
    pub time_remaining: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawLanding {
    #[serde(default)]
    pub summary: Option<RawLandingSummary>,
}

#[derive(Debug, Deserialize)]
pub struct RawLandingSummary {
    #[serde(rename = "threeStars", default)]
    pub three_stars: Vec<RawStar>,
}

#[derive(Debug, Deserialize)]
pub struct RawStar {
    #[serde(default)]
    pub star: u32,
    #[serde(rename = "playerId", default)]
    pub player_id: i64,
    #[serde(rename = "teamAbbrev", default)]
    pub team_abbrev: String,
    #[serde(default)]
    pub name: Option<LocalizedName>,
}

// =============================================================================
// Normalized schedule types
// =============================================================================

#[derive(Debug, Clone)]
pub struct ClubSchedule {
    pub season_id: String,
    pub games: Vec<ScheduleGame>,
}

#[derive(Debug, Clone)]
pub struct ScheduleGame {
    pub id: String,
    pub game_date: String,
    pub game_state: String,
    pub start_time_utc: DateTime<Utc>,
    pub venue: String,
    pub home: ScheduleTeam,
    pub away: ScheduleTeam,
    pub last_period_type: Option<String>,
    pub broadcasts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScheduleTeam {
    pub abbrev: String,
    /// Full team name, e.g. "New Jersey Devils".
    pub name: String,
    pub score: Option<u32>,
}

impl ClubSchedule {
    pub fn from_raw(raw: RawClubSchedule) -> Self {
        let season_id = raw
            .current_season
            .map(|s| s.to_string())
            .unwrap_or_default();
        let games = raw.games.into_iter().map(ScheduleGame::from_raw).collect();
        Self { season_id, games }
    }

    /// First game on the given date (YYYY-MM-DD), if any.
    pub fn game_on_date(&self, date: &str) -> Option<&ScheduleGame> {
        self.games.iter().find(|g| g.game_date == date)
    }

    /// Next game that has not started yet.
    pub fn next_future_game(&self) -> Option<&ScheduleGame> {
        self.games
            .iter()
            .find(|g| matches!(g.game_state.as_str(), "FUT" | "PRE"))
    }
}

impl ScheduleGame {
    fn from_raw(raw: RawScheduleGame) -> Self {
        Self {
            id: raw.id.to_string(),
            game_date: raw.game_date,
            game_state: raw.game_state,
            start_time_utc: raw.start_time_utc,
            venue: raw.venue.map(|v| v.default).unwrap_or_default(),
            home: ScheduleTeam::from_raw(raw.home_team),
            away: ScheduleTeam::from_raw(raw.away_team),
            last_period_type: raw.game_outcome.and_then(|o| o.last_period_type),
            broadcasts: raw
                .tv_broadcasts
                .into_iter()
                .map(|b| b.network)
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Whether this game has been played to completion.
    pub fn is_completed(&self) -> bool {
        matches!(self.game_state.as_str(), "OVER" | "FINAL" | "OFF")
    }
}

impl ScheduleTeam {
    fn from_raw(raw: RawScheduleTeam) -> Self {
        let place = raw.place_name.map(|n| n.default).unwrap_or_default();
        let common = raw.common_name.map(|n| n.default).unwrap_or_default();
        let name = match (place.is_empty(), common.is_empty()) {
            (false, false) => format!("{} {}", place, common),
            (false, true) => place,
            _ => common,
        };
        Self {
            abbrev: raw.abbrev,
            name,
            score: raw.score,
        }
    }
}

// =============================================================================
// Normalized game feed
// =============================================================================

#[derive(Debug, Clone)]
pub struct GameFeed {
    pub game_id: String,
    pub game_state: String,
    pub home: TeamScore,
    pub away: TeamScore,
    pub period: Option<u32>,
    pub period_type: Option<String>,
    pub time_remaining: Option<String>,
    pub in_intermission: bool,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone)]
pub struct TeamScore {
    pub abbrev: String,
    pub score: u32,
}

impl GameFeed {
    pub fn from_raw(raw: RawPlayByPlay) -> Self {
        let roster: HashMap<i64, String> = raw
            .roster_spots
            .iter()
            .map(|spot| {
                let first = spot
                    .first_name
                    .as_ref()
                    .map(|n| n.default.as_str())
                    .unwrap_or("");
                let last = spot
                    .last_name
                    .as_ref()
                    .map(|n| n.default.as_str())
                    .unwrap_or("");
                (spot.player_id, format!("{} {}", first, last).trim().to_string())
            })
            .collect();

        let home_id = raw.home_team.id;
        let away_id = raw.away_team.id;
        let home_abbrev = raw.home_team.abbrev.clone();
        let away_abbrev = raw.away_team.abbrev.clone();

        let events = raw
            .plays
            .iter()
            .map(|play| {
                normalize_play(play, &roster, home_id, &home_abbrev, away_id, &away_abbrev)
            })
            .collect();

        Self {
            game_id: raw.id.to_string(),
            game_state: raw.game_state,
            home: TeamScore {
                abbrev: home_abbrev,
                score: raw.home_team.score.unwrap_or(0),
            },
            away: TeamScore {
                abbrev: away_abbrev,
                score: raw.away_team.score.unwrap_or(0),
            },
            period: raw.period_descriptor.as_ref().map(|p| p.number),
            period_type: raw.period_descriptor.map(|p| p.period_type),
            time_remaining: raw.clock.as_ref().map(|c| c.time_remaining.clone()),
            in_intermission: raw.clock.map(|c| c.in_intermission).unwrap_or(false),
            events,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Goal,
    Penalty,
    PeriodStart,
    PeriodEnd,
    Faceoff,
    Stoppage,
    ShotOnGoal,
    Hit,
    BlockedShot,
    Takeaway,
    Giveaway,
    #[serde(other)]
    Unknown,
}

impl EventType {
    pub fn from_desc_key(key: &str) -> Self {
        match key {
            "goal" => Self::Goal,
            "penalty" => Self::Penalty,
            "period-start" => Self::PeriodStart,
            "period-end" => Self::PeriodEnd,
            "faceoff" => Self::Faceoff,
            "stoppage" => Self::Stoppage,
            "shot-on-goal" => Self::ShotOnGoal,
            "hit" => Self::Hit,
            "blocked-shot" => Self::BlockedShot,
            "takeaway" => Self::Takeaway,
            "giveaway" => Self::Giveaway,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Penalty => "penalty",
            Self::PeriodStart => "period-start",
            Self::PeriodEnd => "period-end",
            Self::Faceoff => "faceoff",
            Self::Stoppage => "stoppage",
            Self::ShotOnGoal => "shot-on-goal",
            Self::Hit => "hit",
            Self::BlockedShot => "blocked-shot",
            Self::Takeaway => "takeaway",
            Self::Giveaway => "giveaway",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized play-by-play event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub sort_order: i64,
    pub period: u32,
    pub period_type: String,
    pub time_remaining: String,
    pub team_abbrev: Option<String>,
    pub details: EventDetails,
}

/// Typed event payload. Anything the bot does not understand lands in
/// `Unknown` - stored and counted, never posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventDetails {
    Goal(GoalDetails),
    Penalty(PenaltyDetails),
    PeriodStart(PeriodMarker),
    PeriodEnd(PeriodMarker),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDetails {
    pub scorer: String,
    pub scorer_season_total: u32,
    #[serde(default)]
    pub assists: Vec<Assist>,
    pub shot_type: String,
    pub home_score: u32,
    pub away_score: u32,
    pub empty_net: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assist {
    pub name: String,
    pub season_total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyDetails {
    pub player: String,
    pub infraction: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMarker {
    pub period: u32,
    pub period_type: String,
}

// =============================================================================
// Play normalization
// =============================================================================

fn normalize_play(
    play: &RawPlay,
    roster: &HashMap<i64, String>,
    home_id: i64,
    home_abbrev: &str,
    away_id: i64,
    away_abbrev: &str,
) -> GameEvent {
    let event_type = EventType::from_desc_key(&play.type_desc_key);
    let period_desc = play.period_descriptor.clone().unwrap_or_default();

    let details_json = play.details.as_ref();
    let owner_team = details_json
        .and_then(|d| d.get("eventOwnerTeamId"))
        .and_then(|v| v.as_i64())
        .and_then(|id| {
            if id == home_id {
                Some(home_abbrev.to_string())
            } else if id == away_id {
                Some(away_abbrev.to_string())
            } else {
                None
            }
        });

    let details = match event_type {
        EventType::Goal => details_json
            .map(|d| EventDetails::Goal(parse_goal_details(d, roster)))
            .unwrap_or(EventDetails::Unknown),
        EventType::Penalty => details_json
            .map(|d| EventDetails::Penalty(parse_penalty_details(d, roster)))
            .unwrap_or(EventDetails::Unknown),
        EventType::PeriodStart => EventDetails::PeriodStart(PeriodMarker {
            period: period_desc.number,
            period_type: period_desc.period_type.clone(),
        }),
        EventType::PeriodEnd => EventDetails::PeriodEnd(PeriodMarker {
            period: period_desc.number,
            period_type: period_desc.period_type.clone(),
        }),
        _ => EventDetails::Unknown,
    };

    GameEvent {
        event_id: play.event_id.to_string(),
        event_type,
        sort_order: play.sort_order,
        period: period_desc.number,
        period_type: period_desc.period_type,
        time_remaining: play.time_remaining.clone(),
        team_abbrev: owner_team,
        details,
    }
}

fn player_name(details: &serde_json::Value, field: &str, roster: &HashMap<i64, String>) -> Option<String> {
    details
        .get(field)
        .and_then(|v| v.as_i64())
        .map(|id| {
            roster
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Player {}", id))
        })
}

fn u32_field(details: &serde_json::Value, field: &str) -> u32 {
    details
        .get(field)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

fn parse_goal_details(details: &serde_json::Value, roster: &HashMap<i64, String>) -> GoalDetails {
    let mut assists = Vec::new();
    if let Some(name) = player_name(details, "assist1PlayerId", roster) {
        assists.push(Assist {
            name,
            season_total: u32_field(details, "assist1PlayerTotal"),
        });
    }
    if let Some(name) = player_name(details, "assist2PlayerId", roster) {
        assists.push(Assist {
            name,
            season_total: u32_field(details, "assist2PlayerTotal"),
        });
    }

    GoalDetails {
        scorer: player_name(details, "scoringPlayerId", roster).unwrap_or_default(),
        scorer_season_total: u32_field(details, "scoringPlayerTotal"),
        assists,
        shot_type: details
            .get("shotType")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        home_score: u32_field(details, "homeScore"),
        away_score: u32_field(details, "awayScore"),
        empty_net: details
            .get("goalieInNetId")
            .map(|v| v.is_null())
            .unwrap_or(true),
    }
}

fn parse_penalty_details(details: &serde_json::Value, roster: &HashMap<i64, String>) -> PenaltyDetails {
    PenaltyDetails {
        player: player_name(details, "committedByPlayerId", roster).unwrap_or_default(),
        infraction: details
            .get("descKey")
            .and_then(|v| v.as_str())
            .unwrap_or("penalty")
            .replace('-', " "),
        duration_minutes: u32_field(details, "duration"),
    }
}

/// Three-stars line from the landing feed.
#[derive(Debug, Clone)]
pub struct StarLine {
    pub star: u32,
    pub name: String,
    pub team_abbrev: String,
}

impl StarLine {
    pub fn from_landing(raw: RawLanding) -> Vec<StarLine> {
        let mut stars: Vec<StarLine> = raw
            .summary
            .map(|s| s.three_stars)
            .unwrap_or_default()
            .into_iter()
            .map(|s| StarLine {
                star: s.star,
                name: s
                    .name
                    .map(|n| n.default)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Player {}", s.player_id)),
                team_abbrev: s.team_abbrev,
            })
            .collect();
        stars.sort_by_key(|s| s.star);
        stars
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_feed() -> RawPlayByPlay {
        let value = json!({
            "id": 2024020500,
            "gameState": "LIVE",
            "periodDescriptor": {"number": 2, "periodType": "REG"},
            "awayTeam": {"id": 1, "abbrev": "NJD", "score": 2},
            "homeTeam": {"id": 10, "abbrev": "TOR", "score": 1},
            "clock": {"timeRemaining": "08:15", "inIntermission": false},
            "rosterSpots": [
                {"playerId": 8481559, "firstName": {"default": "Jack"}, "lastName": {"default": "Hughes"}},
                {"playerId": 8477933, "firstName": {"default": "Jesper"}, "lastName": {"default": "Bratt"}}
            ],
            "plays": [
                {
                    "eventId": 157,
                    "typeDescKey": "goal",
                    "sortOrder": 520,
                    "periodDescriptor": {"number": 2, "periodType": "REG"},
                    "timeRemaining": "08:15",
                    "details": {
                        "eventOwnerTeamId": 1,
                        "scoringPlayerId": 8481559,
                        "scoringPlayerTotal": 21,
                        "assist1PlayerId": 8477933,
                        "assist1PlayerTotal": 30,
                        "shotType": "wrist",
                        "goalieInNetId": 8471234,
                        "homeScore": 1,
                        "awayScore": 2
                    }
                },
                {
                    "eventId": 158,
                    "typeDescKey": "some-new-event",
                    "sortOrder": 521,
                    "timeRemaining": "08:10"
                }
            ]
        });
        serde_json::from_value(value).expect("sample feed should parse")
    }

    #[test]
    fn test_normalize_goal_event() {
        let feed = GameFeed::from_raw(sample_feed());
        assert_eq!(feed.game_id, "2024020500");
        assert_eq!(feed.home.abbrev, "TOR");
        assert_eq!(feed.away.score, 2);

        let goal = &feed.events[0];
        assert_eq!(goal.event_id, "157");
        assert_eq!(goal.event_type, EventType::Goal);
        assert_eq!(goal.team_abbrev.as_deref(), Some("NJD"));
        match &goal.details {
            EventDetails::Goal(g) => {
                assert_eq!(g.scorer, "Jack Hughes");
                assert_eq!(g.scorer_season_total, 21);
                assert_eq!(g.assists.len(), 1);
                assert_eq!(g.assists[0].name, "Jesper Bratt");
                assert_eq!(g.away_score, 2);
                assert!(!g.empty_net);
            }
            other => panic!("expected goal details, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_degrades_gracefully() {
        let feed = GameFeed::from_raw(sample_feed());
        let unknown = &feed.events[1];
        assert_eq!(unknown.event_type, EventType::Unknown);
        assert_eq!(unknown.details, EventDetails::Unknown);
    }

    #[test]
    fn test_schedule_game_lookup() {
        let raw: RawClubSchedule = serde_json::from_value(json!({
            "currentSeason": 20242025,
            "games": [
                {
                    "id": 2024020499,
                    "gameDate": "2025-01-04",
                    "gameState": "OFF",
                    "startTimeUTC": "2025-01-05T00:00:00Z",
                    "venue": {"default": "Prudential Center"},
                    "awayTeam": {"abbrev": "TOR", "placeName": {"default": "Toronto"}, "commonName": {"default": "Maple Leafs"}, "score": 2},
                    "homeTeam": {"abbrev": "NJD", "placeName": {"default": "New Jersey"}, "commonName": {"default": "Devils"}, "score": 4},
                    "gameOutcome": {"lastPeriodType": "REG"}
                },
                {
                    "id": 2024020512,
                    "gameDate": "2025-01-06",
                    "gameState": "FUT",
                    "startTimeUTC": "2025-01-07T00:00:00Z",
                    "venue": {"default": "Prudential Center"},
                    "awayTeam": {"abbrev": "BOS", "placeName": {"default": "Boston"}, "commonName": {"default": "Bruins"}},
                    "homeTeam": {"abbrev": "NJD", "placeName": {"default": "New Jersey"}, "commonName": {"default": "Devils"}}
                }
            ]
        }))
        .unwrap();

        let schedule = ClubSchedule::from_raw(raw);
        assert_eq!(schedule.season_id, "20242025");

        let game = schedule.game_on_date("2025-01-06").expect("game on date");
        assert_eq!(game.id, "2024020512");
        assert_eq!(game.home.name, "New Jersey Devils");
        assert!(!game.is_completed());

        assert!(schedule.game_on_date("2025-01-05").is_none());
        assert_eq!(schedule.next_future_game().unwrap().id, "2024020512");
    }

    #[test]
    fn test_event_type_round_trip() {
        assert_eq!(EventType::from_desc_key("goal"), EventType::Goal);
        assert_eq!(EventType::from_desc_key("period-start"), EventType::PeriodStart);
        assert_eq!(EventType::from_desc_key("brand-new-thing"), EventType::Unknown);
        assert_eq!(EventType::Goal.as_str(), "goal");
    }

    #[test]
    fn test_three_stars_sorted() {
        let raw: RawLanding = serde_json::from_value(json!({
            "summary": {
                "threeStars": [
                    {"star": 3, "playerId": 3, "teamAbbrev": "TOR", "name": {"default": "A. Matthews"}},
                    {"star": 1, "playerId": 1, "teamAbbrev": "NJD", "name": {"default": "J. Hughes"}},
                    {"star": 2, "playerId": 2, "teamAbbrev": "NJD", "name": {"default": "J. Bratt"}}
                ]
            }
        }))
        .unwrap();

        let stars = StarLine::from_landing(raw);
        assert_eq!(stars.len(), 3);
        assert_eq!(stars[0].name, "J. Hughes");
        assert_eq!(stars[2].team_abbrev, "TOR");
    }
}
