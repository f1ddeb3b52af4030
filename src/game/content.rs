//! Post text formatting.
//!
//! Pure string builders for every post kind; the loop decides *when* to
//! post, these decide *what* the post says. Times are rendered in the
//! preferred team's local timezone.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::data::models::{ClubSchedule, GoalDetails, PenaltyDetails, ScheduleGame, StarLine};

/// Team identity used in post text.
#[derive(Debug, Clone)]
pub struct TeamInfo {
    pub abbrev: String,
    pub name: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// "1st", "2nd", "3rd", "4th", ...
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Human name for a period, accounting for overtime and shootouts.
pub fn period_label(period: u32, period_type: &str) -> String {
    match period_type {
        "OT" => {
            if period > 4 {
                format!("{} overtime", ordinal(period - 3))
            } else {
                "overtime".to_string()
            }
        }
        "SO" => "shootout".to_string(),
        _ => format!("{} period", ordinal(period)),
    }
}

/// Clock-face emoji closest to the given local time.
pub fn clock_emoji(hour: u32, minute: u32) -> &'static str {
    const HOURS: [&str; 12] = [
        "🕛", "🕐", "🕑", "🕒", "🕓", "🕔", "🕕", "🕖", "🕗", "🕘", "🕙", "🕚",
    ];
    const HALVES: [&str; 12] = [
        "🕧", "🕜", "🕝", "🕞", "🕟", "🕠", "🕡", "🕢", "🕣", "🕤", "🕥", "🕦",
    ];
    let idx = (hour % 12) as usize;
    if minute >= 30 {
        HALVES[idx]
    } else {
        HOURS[idx]
    }
}

/// "today", "tomorrow", or the weekday name, relative to `now` in the
/// team's timezone.
fn day_phrase(start: DateTime<Tz>, now: DateTime<Tz>) -> String {
    let diff = start.date_naive().num_days_from_ce() - now.date_naive().num_days_from_ce();
    match diff {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        _ => start.format("%A").to_string(),
    }
}

/// "#AWYvsHOM" combined game hashtag.
pub fn game_hashtag(away_abbrev: &str, home_abbrev: &str) -> String {
    format!("#{}vs{}", away_abbrev, home_abbrev)
}

// =============================================================================
// Pregame
// =============================================================================

pub fn pregame_core(game: &ScheduleGame, hashtags: &str, tz: Tz, now: DateTime<Utc>) -> String {
    let start_local = game.start_time_utc.with_timezone(&tz);
    let now_local = now.with_timezone(&tz);
    let clock = clock_emoji(start_local.hour(), start_local.minute());
    let time_str = start_local.format("%-I:%M %p").to_string();

    let mut post = format!(
        "Tune in {} when the {} take on the {} at {}.\n\n{} {}\n",
        day_phrase(start_local, now_local),
        game.away.name,
        game.home.name,
        game.venue,
        clock,
        time_str,
    );

    if !game.broadcasts.is_empty() {
        post.push_str(&format!("📺 {}\n", game.broadcasts.join(", ")));
    }

    post.push_str(&format!("#️⃣ {}", hashtags));
    post
}

/// Season series record of the preferred team against the opponent,
/// computed from completed games in the schedule.
pub fn season_series(
    schedule: &ClubSchedule,
    preferred: &TeamInfo,
    other: &TeamInfo,
    hashtags: &str,
) -> String {
    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut ot_losses = 0u32;

    for game in &schedule.games {
        if !game.is_completed() {
            continue;
        }
        let involves_opponent =
            game.home.abbrev == other.abbrev || game.away.abbrev == other.abbrev;
        if !involves_opponent {
            continue;
        }

        let (pref_score, other_score) = if game.home.abbrev == preferred.abbrev {
            (game.home.score.unwrap_or(0), game.away.score.unwrap_or(0))
        } else if game.away.abbrev == preferred.abbrev {
            (game.away.score.unwrap_or(0), game.home.score.unwrap_or(0))
        } else {
            continue;
        };

        let extra_time = game
            .last_period_type
            .as_deref()
            .map(|t| t != "REG")
            .unwrap_or(false);

        if pref_score > other_score {
            wins += 1;
        } else if extra_time {
            ot_losses += 1;
        } else {
            losses += 1;
        }
    }

    if wins + losses + ot_losses == 0 {
        return format!(
            "This is the first meeting of the season between the two teams.\n\n{}",
            hashtags
        );
    }

    format!(
        "This season, the {} are {}-{}-{} against the {}.\n\n{}",
        preferred.name, wins, losses, ot_losses, other.name, hashtags
    )
}

// =============================================================================
// Live
// =============================================================================

#[allow(clippy::too_many_arguments)]
pub fn goal_post(
    goal: &GoalDetails,
    period: u32,
    period_type: &str,
    time_remaining: &str,
    preferred: &TeamInfo,
    other: &TeamInfo,
    preferred_is_home: bool,
    scored_by_preferred: bool,
    hashtags: &str,
) -> String {
    let (pref_score, other_score) = if preferred_is_home {
        (goal.home_score, goal.away_score)
    } else {
        (goal.away_score, goal.home_score)
    };

    let shot_phrase = if goal.empty_net {
        "into the empty net".to_string()
    } else {
        format!("on a {} shot", goal.shot_type)
    };

    let mut post = if scored_by_preferred {
        let emoji = "🚨".repeat(pref_score.max(1) as usize);
        format!(
            "{} GOAL! {}\n\n{} ({}) scores {} with {} remaining in the {}.\n\n",
            preferred.name,
            emoji,
            goal.scorer,
            goal.scorer_season_total,
            shot_phrase,
            time_remaining,
            period_label(period, period_type),
        )
    } else {
        let emoji = "👎".repeat(other_score.max(1) as usize);
        format!(
            "{} scores. {}\n\n{} ({}) scores {} with {} remaining in the {}.\n\n",
            other.name,
            emoji,
            goal.scorer,
            goal.scorer_season_total,
            shot_phrase,
            time_remaining,
            period_label(period, period_type),
        )
    };

    let apples = ["🍎", "🍏"];
    let assist_lines: Vec<String> = goal
        .assists
        .iter()
        .zip(apples.iter())
        .map(|(a, emoji)| format!("{} {} ({})", emoji, a.name, a.season_total))
        .collect();
    if !assist_lines.is_empty() {
        post.push_str(&assist_lines.join("\n"));
        post.push_str("\n\n");
    }

    post.push_str(&format!(
        "{}: {}\n{}: {}\n\n{}",
        preferred.name, pref_score, other.name, other_score, hashtags
    ));
    post
}

/// Correction post for a goal whose scoring details changed after the
/// initial post (e.g. a corrected scorer or added assist).
pub fn goal_update_post(
    goal: &GoalDetails,
    period: u32,
    period_type: &str,
    hashtags: &str,
) -> String {
    let mut post = format!(
        "Scoring change on the {} goal: now credited to {} ({}).",
        period_label(period, period_type),
        goal.scorer,
        goal.scorer_season_total,
    );

    if goal.assists.is_empty() {
        post.push_str(" Unassisted.");
    } else {
        let names: Vec<String> = goal
            .assists
            .iter()
            .map(|a| format!("{} ({})", a.name, a.season_total))
            .collect();
        post.push_str(&format!(" Assists: {}.", names.join(", ")));
    }

    post.push_str(&format!("\n\n{}", hashtags));
    post
}

pub fn penalty_post(
    penalty: &PenaltyDetails,
    period: u32,
    period_type: &str,
    time_remaining: &str,
    hashtags: &str,
) -> String {
    format!(
        "{} heads to the box for {} ({} minutes) with {} remaining in the {}.\n\n{}",
        penalty.player,
        penalty.infraction,
        penalty.duration_minutes,
        time_remaining,
        period_label(period, period_type),
        hashtags
    )
}

pub fn period_start_post(
    period: u32,
    period_type: &str,
    preferred: &TeamInfo,
    other: &TeamInfo,
    pref_score: u32,
    other_score: u32,
    hashtags: &str,
) -> String {
    let label = period_label(period, period_type);
    if period <= 1 && period_type == "REG" {
        format!(
            "The puck is dropped - the {} is underway!\n\n{}",
            label, hashtags
        )
    } else {
        format!(
            "The {} is underway! {}: {} / {}: {}\n\n{}",
            label, preferred.name, pref_score, other.name, other_score, hashtags
        )
    }
}

// =============================================================================
// Final
// =============================================================================

pub fn final_score_post(
    preferred: &TeamInfo,
    other: &TeamInfo,
    pref_score: u32,
    other_score: u32,
    preferred_is_home: bool,
    next_game: Option<&str>,
    hashtags: &str,
) -> String {
    let pref_home_text = if preferred_is_home {
        "at home"
    } else {
        "on the road"
    };

    let mut post = if pref_score > other_score {
        format!(
            "{} win {} over the {} by a score of {} to {}! 🚨🚨🚨",
            preferred.name, pref_home_text, other.name, pref_score, other_score
        )
    } else {
        format!(
            "{} lose {} to the {} by a score of {} to {}! 👎🏻👎🏻👎🏻",
            preferred.name, pref_home_text, other.name, pref_score, other_score
        )
    };

    if let Some(next) = next_game {
        post.push_str(&format!("\n\n{}", next));
    }

    post.push_str(&format!("\n\n{}", hashtags));
    post
}

/// "Next Game:" line for the final-score post, if the schedule has an
/// upcoming game.
pub fn next_game_line(schedule: &ClubSchedule, preferred: &TeamInfo, tz: Tz) -> Option<String> {
    let next = schedule.next_future_game()?;
    let start_local = next.start_time_utc.with_timezone(&tz);
    let when = start_local.format("%A %B %-d @ %-I:%M%p").to_string();

    let opponent = if next.away.abbrev == preferred.abbrev {
        &next.home.name
    } else {
        &next.away.name
    };

    Some(format!(
        "Next Game: {} vs. {} (at {})!",
        when, opponent, next.venue
    ))
}

pub fn three_stars_post(stars: &[StarLine], hashtags: &str) -> String {
    let lines: Vec<String> = stars
        .iter()
        .map(|s| {
            format!(
                "{}: {} ({})",
                "⭐️".repeat(s.star.max(1) as usize),
                s.name,
                s.team_abbrev
            )
        })
        .collect();

    format!(
        "The three stars for the game are -\n{}\n\n{}",
        lines.join("\n"),
        hashtags
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::{Assist, ScheduleTeam};
    use chrono::TimeZone;

    fn team(abbrev: &str, name: &str) -> TeamInfo {
        TeamInfo {
            abbrev: abbrev.to_string(),
            name: name.to_string(),
        }
    }

    fn sched_team(abbrev: &str, name: &str, score: Option<u32>) -> ScheduleTeam {
        ScheduleTeam {
            abbrev: abbrev.to_string(),
            name: name.to_string(),
            score,
        }
    }

    fn completed_game(
        home: ScheduleTeam,
        away: ScheduleTeam,
        last_period_type: &str,
    ) -> ScheduleGame {
        ScheduleGame {
            id: "1".to_string(),
            game_date: "2025-01-01".to_string(),
            game_state: "OFF".to_string(),
            start_time_utc: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            venue: "Prudential Center".to_string(),
            home,
            away,
            last_period_type: Some(last_period_type.to_string()),
            broadcasts: vec![],
        }
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(21), "21st");
    }

    #[test]
    fn test_period_label() {
        assert_eq!(period_label(1, "REG"), "1st period");
        assert_eq!(period_label(4, "OT"), "overtime");
        assert_eq!(period_label(5, "SO"), "shootout");
        assert_eq!(period_label(5, "OT"), "2nd overtime");
    }

    #[test]
    fn test_goal_post_preferred() {
        let goal = GoalDetails {
            scorer: "Jack Hughes".to_string(),
            scorer_season_total: 21,
            assists: vec![Assist {
                name: "Jesper Bratt".to_string(),
                season_total: 30,
            }],
            shot_type: "wrist".to_string(),
            home_score: 1,
            away_score: 2,
            empty_net: false,
        };

        let njd = team("NJD", "New Jersey Devils");
        let tor = team("TOR", "Toronto Maple Leafs");
        let post = goal_post(&goal, 2, "REG", "08:15", &njd, &tor, false, true, "#NJDevils");

        assert!(post.starts_with("New Jersey Devils GOAL! 🚨🚨"));
        assert!(post.contains("Jack Hughes (21) scores on a wrist shot"));
        assert!(post.contains("08:15 remaining in the 2nd period"));
        assert!(post.contains("🍎 Jesper Bratt (30)"));
        assert!(post.contains("New Jersey Devils: 2\nToronto Maple Leafs: 1"));
    }

    #[test]
    fn test_goal_post_opponent_empty_net() {
        let goal = GoalDetails {
            scorer: "Auston Matthews".to_string(),
            scorer_season_total: 40,
            assists: vec![],
            shot_type: "wrist".to_string(),
            home_score: 3,
            away_score: 1,
            empty_net: true,
        };

        let njd = team("NJD", "New Jersey Devils");
        let tor = team("TOR", "Toronto Maple Leafs");
        let post = goal_post(&goal, 3, "REG", "01:30", &njd, &tor, false, false, "#NJDevils");

        assert!(post.starts_with("Toronto Maple Leafs scores. 👎👎👎"));
        assert!(post.contains("into the empty net"));
    }

    #[test]
    fn test_season_series_record() {
        let njd = team("NJD", "New Jersey Devils");
        let tor = team("TOR", "Toronto Maple Leafs");

        let schedule = ClubSchedule {
            season_id: "20242025".to_string(),
            games: vec![
                // Regulation win.
                completed_game(
                    sched_team("NJD", "New Jersey Devils", Some(4)),
                    sched_team("TOR", "Toronto Maple Leafs", Some(2)),
                    "REG",
                ),
                // OT loss.
                completed_game(
                    sched_team("TOR", "Toronto Maple Leafs", Some(3)),
                    sched_team("NJD", "New Jersey Devils", Some(2)),
                    "OT",
                ),
                // Game against another club is ignored.
                completed_game(
                    sched_team("NJD", "New Jersey Devils", Some(1)),
                    sched_team("BOS", "Boston Bruins", Some(5)),
                    "REG",
                ),
            ],
        };

        let post = season_series(&schedule, &njd, &tor, "#NJDevils");
        assert!(post.contains("are 1-0-1 against the Toronto Maple Leafs"));
    }

    #[test]
    fn test_season_series_first_meeting() {
        let njd = team("NJD", "New Jersey Devils");
        let tor = team("TOR", "Toronto Maple Leafs");
        let schedule = ClubSchedule {
            season_id: "20242025".to_string(),
            games: vec![],
        };
        let post = season_series(&schedule, &njd, &tor, "#NJDevils");
        assert!(post.contains("first meeting of the season"));
    }

    #[test]
    fn test_final_score_post_win() {
        let njd = team("NJD", "New Jersey Devils");
        let tor = team("TOR", "Toronto Maple Leafs");
        let post = final_score_post(&njd, &tor, 4, 2, true, Some("Next Game: soon"), "#NJDevils");
        assert!(post.contains("win at home over the Toronto Maple Leafs"));
        assert!(post.contains("4 to 2"));
        assert!(post.contains("Next Game: soon"));
    }

    #[test]
    fn test_three_stars_post() {
        let stars = vec![
            StarLine {
                star: 1,
                name: "J. Hughes".to_string(),
                team_abbrev: "NJD".to_string(),
            },
            StarLine {
                star: 2,
                name: "J. Bratt".to_string(),
                team_abbrev: "NJD".to_string(),
            },
            StarLine {
                star: 3,
                name: "A. Matthews".to_string(),
                team_abbrev: "TOR".to_string(),
            },
        ];
        let post = three_stars_post(&stars, "#NJDevils");
        assert!(post.contains("⭐️: J. Hughes (NJD)"));
        assert!(post.contains("⭐️⭐️⭐️: A. Matthews (TOR)"));
    }

    #[test]
    fn test_clock_emoji() {
        assert_eq!(clock_emoji(19, 0), "🕖");
        assert_eq!(clock_emoji(19, 30), "🕢");
        assert_eq!(clock_emoji(0, 10), "🕛");
    }
}
