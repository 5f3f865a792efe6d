use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::fpl_data::{FeatureGroup, Fixture, PlayerStatus, Position, RosterEntry, Team};
use crate::frame::{Cell, Frame};

const DEFAULT_PLAYING_CHANCE: f64 = 100.0;
const RULED_OUT_CHANCE: f64 = 50.0;
const READY_CHANCE: f64 = 75.0;
const FULL_MATCH_MINUTES_PER_START: f64 = 70.0;
pub const PARTIAL_APPEARANCE: f64 = 0.7;

const PLAYER_COLUMNS: [&str; 9] = [
    "id",
    "element_type",
    "web_name",
    "team",
    "points_per_game",
    "status",
    "chance_of_playing_next_round",
    "starts",
    "minutes",
];

const TEAM_COLUMNS: [&str; 10] = [
    "id",
    "name",
    "short_name",
    "strength",
    "strength_overall_home",
    "strength_overall_away",
    "strength_attack_home",
    "strength_attack_away",
    "strength_defence_home",
    "strength_defence_away",
];

const FIXTURE_COLUMNS: [&str; 5] = ["id", "event", "team_h", "team_a", "finished"];

const HISTORY_KEYS: [&str; 11] = [
    "element",
    "fixture",
    "opponent_team",
    "total_points",
    "was_home",
    "team_h_score",
    "team_a_score",
    "round",
    "minutes",
    "starts",
    "kickoff_time",
];

const COMMON_STATS: [&str; 19] = [
    "goals_scored",
    "assists",
    "clean_sheets",
    "goals_conceded",
    "own_goals",
    "yellow_cards",
    "red_cards",
    "bonus",
    "bps",
    "influence",
    "creativity",
    "threat",
    "ict_index",
    "clearances_blocks_interceptions",
    "recoveries",
    "expected_goals",
    "expected_assists",
    "expected_goal_involvements",
    "expected_goals_conceded",
];

const GOALKEEPER_STATS: [&str; 2] = ["saves", "penalties_saved"];
const OUTFIELD_STATS: [&str; 3] = ["penalties_missed", "tackles", "defensive_contribution"];

pub const LEAGUE_HISTORY_COLUMNS: [&str; 7] = [
    "element",
    "fixture",
    "goals_scored",
    "goals_conceded",
    "clean_sheets",
    "saves",
    "defensive_contribution",
];

pub fn stat_columns(group: FeatureGroup) -> Vec<&'static str> {
    let extra: &[&str] = if group.is_goalkeeper() {
        &GOALKEEPER_STATS
    } else {
        &OUTFIELD_STATS
    };
    COMMON_STATS.iter().chain(extra).copied().collect()
}

/// Upcoming gameweek: the first event whose deadline is still ahead of `now`.
pub fn upcoming_gameweek(events: &Frame, now: DateTime<Utc>) -> PipelineResult<u32> {
    events.require(&["id", "deadline_time"])?;
    let ids = events.column("id")?;
    let deadlines = events.column("deadline_time")?;

    let mut upcoming: Option<u32> = None;
    for (id, deadline) in ids.iter().zip(deadlines) {
        let (Some(id), Some(raw)) = (id.as_u32(), deadline.as_str()) else {
            continue;
        };
        let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
            warn!(event = id, deadline = raw, "unparseable deadline");
            continue;
        };
        if parsed.with_timezone(&Utc) > now {
            upcoming = Some(upcoming.map_or(id, |u| u.min(id)));
        }
    }
    upcoming.ok_or(PipelineError::UnknownGameweek)
}

pub fn finished_gameweek(events: &Frame, now: DateTime<Utc>) -> PipelineResult<u32> {
    upcoming_gameweek(events, now).map(|gw| gw.saturating_sub(1))
}

pub fn process_fixtures(fixtures: &Frame) -> PipelineResult<Vec<Fixture>> {
    fixtures.require(&FIXTURE_COLUMNS)?;
    let mut out = Vec::with_capacity(fixtures.len());
    for row in 0..fixtures.len() {
        let get = |name: &str| fixtures.cell(row, name).cloned().unwrap_or_default();
        let (Some(id), Some(team_h), Some(team_a)) =
            (get("id").as_u32(), get("team_h").as_u32(), get("team_a").as_u32())
        else {
            debug!(row, "skipping fixture without ids");
            continue;
        };
        out.push(Fixture {
            id,
            event: get("event").as_u32(),
            team_h,
            team_a,
            finished: get("finished").as_bool().unwrap_or(false),
            kickoff_time: get("kickoff_time").as_str().map(str::to_string),
        });
    }
    Ok(out)
}

pub fn process_teams(teams: &Frame) -> PipelineResult<Vec<Team>> {
    teams.require(&TEAM_COLUMNS)?;
    let mut out = Vec::with_capacity(teams.len());
    for row in 0..teams.len() {
        let num = |name: &str| {
            teams
                .cell(row, name)
                .and_then(Cell::as_f64)
                .unwrap_or(0.0)
        };
        let text = |name: &str| {
            teams
                .cell(row, name)
                .and_then(Cell::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let Some(id) = teams.cell(row, "id").and_then(Cell::as_u32) else {
            continue;
        };
        out.push(Team {
            id,
            name: text("name"),
            short_name: text("short_name"),
            strength: num("strength"),
            strength_overall_home: num("strength_overall_home"),
            strength_overall_away: num("strength_overall_away"),
            strength_attack_home: num("strength_attack_home"),
            strength_attack_away: num("strength_attack_away"),
            strength_defence_home: num("strength_defence_home"),
            strength_defence_away: num("strength_defence_away"),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    RuledOut,
    Ready,
    Undetermined,
}

fn readiness(status: &PlayerStatus, chance_next_round: f64) -> Readiness {
    if status.is_ruled_out() || chance_next_round <= RULED_OUT_CHANCE {
        Readiness::RuledOut
    } else if status.is_available() && chance_next_round >= READY_CHANCE {
        Readiness::Ready
    } else {
        Readiness::Undetermined
    }
}

pub fn will_play_estimate(
    status: &PlayerStatus,
    chance_next_round: Option<f64>,
    starts: f64,
    minutes: f64,
) -> f64 {
    let chance = chance_next_round.unwrap_or(DEFAULT_PLAYING_CHANCE);
    match readiness(status, chance) {
        Readiness::Ready if starts <= 0.0 => 0.0,
        Readiness::Ready if minutes >= starts * FULL_MATCH_MINUTES_PER_START => 1.0,
        Readiness::Ready => PARTIAL_APPEARANCE,
        Readiness::RuledOut | Readiness::Undetermined => 0.0,
    }
}

pub fn will_play_from_minutes(minutes: f64) -> f64 {
    if minutes <= 0.0 {
        0.0
    } else if minutes < 60.0 {
        PARTIAL_APPEARANCE
    } else {
        1.0
    }
}

pub fn process_players(players: &Frame) -> PipelineResult<Vec<RosterEntry>> {
    players.require(&PLAYER_COLUMNS)?;
    let mut out = Vec::with_capacity(players.len());
    for row in 0..players.len() {
        let cell = |name: &str| players.cell(row, name).cloned().unwrap_or_default();
        let Some(id) = cell("id").as_u32() else {
            continue;
        };
        let Some(position) = cell("element_type")
            .as_u32()
            .and_then(Position::from_element_type)
        else {
            warn!(player = id, "dropping roster entry with unknown position code");
            continue;
        };
        let Some(team) = cell("team").as_u32() else {
            warn!(player = id, "dropping roster entry without a team");
            continue;
        };
        let status = PlayerStatus::from_code(cell("status").as_str().unwrap_or_default());
        let will_play = will_play_estimate(
            &status,
            cell("chance_of_playing_next_round").as_f64(),
            cell("starts").as_f64().unwrap_or(0.0),
            cell("minutes").as_f64().unwrap_or(0.0),
        );
        out.push(RosterEntry {
            id,
            position,
            web_name: cell("web_name").as_str().unwrap_or_default().to_string(),
            team,
            points_per_game: cell("points_per_game").as_f64().unwrap_or(0.0),
            will_play,
        });
    }
    Ok(out)
}

pub fn live_statuses(players: &Frame) -> PipelineResult<HashMap<u32, PlayerStatus>> {
    players.require(&["id", "status"])?;
    let ids = players.column("id")?;
    let statuses = players.column("status")?;
    Ok(ids
        .iter()
        .zip(statuses)
        .filter_map(|(id, status)| {
            Some((
                id.as_u32()?,
                PlayerStatus::from_code(status.as_str().unwrap_or_default()),
            ))
        })
        .collect())
}

pub fn project_history(history: &Frame, group: FeatureGroup) -> PipelineResult<Frame> {
    let columns: Vec<&str> = HISTORY_KEYS
        .iter()
        .copied()
        .chain(stat_columns(group))
        .collect();
    history.select(&columns)
}

pub fn average_past_points(past: &Frame, seasons: usize) -> PipelineResult<f64> {
    if past.is_empty() {
        return Ok(0.0);
    }
    past.require(&["season_name", "total_points"])?;
    let names = past.column("season_name")?;
    let points = past.column("total_points")?;
    let mut rows: Vec<(&str, f64)> = names
        .iter()
        .zip(points)
        .filter_map(|(n, p)| Some((n.as_str()?, p.as_f64()?)))
        .collect();
    rows.sort_by(|a, b| b.0.cmp(a.0));
    rows.truncate(seasons);
    if rows.is_empty() {
        return Ok(0.0);
    }
    Ok(rows.iter().map(|(_, p)| p).sum::<f64>() / rows.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(code: &str) -> PlayerStatus {
        PlayerStatus::from_code(code)
    }

    #[test]
    fn unavailable_statuses_never_play() {
        for code in ["u", "i", "s", "n"] {
            assert_eq!(will_play_estimate(&status(code), Some(100.0), 10.0, 900.0), 0.0);
        }
    }

    #[test]
    fn low_chance_never_plays() {
        assert_eq!(will_play_estimate(&status("a"), Some(50.0), 10.0, 900.0), 0.0);
        assert_eq!(will_play_estimate(&status("d"), Some(25.0), 10.0, 900.0), 0.0);
    }

    #[test]
    fn history_refines_ready_players() {
        let a = status("a");
        assert_eq!(will_play_estimate(&a, None, 0.0, 0.0), 0.0);
        assert_eq!(will_play_estimate(&a, None, 10.0, 700.0), 1.0);
        assert_eq!(will_play_estimate(&a, Some(75.0), 10.0, 650.0), 0.7);
    }

    #[test]
    fn undetermined_readiness_defaults_to_zero() {
        assert_eq!(readiness(&status("a"), 60.0), Readiness::Undetermined);
        assert_eq!(will_play_estimate(&status("a"), Some(60.0), 10.0, 900.0), 0.0);
        assert_eq!(will_play_estimate(&status("d"), Some(75.0), 10.0, 900.0), 0.0);
    }

    #[test]
    fn will_play_domain() {
        let codes = ["a", "d", "i", "s", "n", "u", "?"];
        let chances = [None, Some(0.0), Some(25.0), Some(50.0), Some(60.0), Some(75.0), Some(100.0)];
        for code in codes {
            for chance in chances {
                for (starts, minutes) in [(0.0, 0.0), (3.0, 90.0), (3.0, 270.0), (5.0, 100.0)] {
                    let wp = will_play_estimate(&status(code), chance, starts, minutes);
                    assert!([0.0, 0.7, 1.0].contains(&wp), "{code} {chance:?} -> {wp}");
                }
            }
        }
        for minutes in [0.0, 1.0, 59.0, 60.0, 90.0] {
            assert!([0.0, 0.7, 1.0].contains(&will_play_from_minutes(minutes)));
        }
    }

    #[test]
    fn players_reduced_to_roster() {
        let raw = Frame::from_records(
            "players",
            &[
                json!({"id": 1, "element_type": 3, "web_name": "Saka", "team": 1,
                       "points_per_game": "6.1", "status": "a",
                       "chance_of_playing_next_round": null, "starts": 10, "minutes": 880,
                       "news": "", "now_cost": 100}),
                json!({"id": 2, "element_type": 5, "web_name": "Boss", "team": 1,
                       "points_per_game": "0.0", "status": "a",
                       "chance_of_playing_next_round": null, "starts": 0, "minutes": 0}),
            ],
        );
        let roster = process_players(&raw).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].position, Position::Midfielder);
        assert_eq!(roster[0].points_per_game, 6.1);
        assert_eq!(roster[0].will_play, 1.0);
    }

    #[test]
    fn missing_player_column_is_schema_error() {
        let raw = Frame::from_records("players", &[json!({"id": 1, "element_type": 1})]);
        assert!(matches!(
            process_players(&raw),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn upcoming_gameweek_is_first_future_deadline() {
        let events = Frame::from_records(
            "events",
            &[
                json!({"id": 1, "deadline_time": "2025-08-15T17:30:00Z"}),
                json!({"id": 2, "deadline_time": "2025-08-22T17:30:00Z"}),
                json!({"id": 3, "deadline_time": "2025-08-29T17:30:00Z"}),
            ],
        );
        let now = DateTime::parse_from_rfc3339("2025-08-20T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(upcoming_gameweek(&events, now).unwrap(), 2);
        assert_eq!(finished_gameweek(&events, now).unwrap(), 1);

        let late = DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            upcoming_gameweek(&events, late),
            Err(PipelineError::UnknownGameweek)
        );
    }

    #[test]
    fn past_points_average_recent_three() {
        let past = Frame::from_records(
            "history_past",
            &[
                json!({"season_name": "2020/21", "total_points": 10}),
                json!({"season_name": "2021/22", "total_points": 100}),
                json!({"season_name": "2022/23", "total_points": 120}),
                json!({"season_name": "2023/24", "total_points": 140}),
            ],
        );
        assert_eq!(average_past_points(&past, 3).unwrap(), 120.0);
        assert_eq!(average_past_points(&Frame::new("history_past"), 3).unwrap(), 0.0);
    }
}
