#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde_json::{Value, json};

use fpl_predictor::config::PipelineConfig;
use fpl_predictor::events::NoopObserver;
use fpl_predictor::fpl_data::Position;
use fpl_predictor::frame::Frame;
use fpl_predictor::source::{self, Bootstrap, ElementSummary, MemorySource, Season};

/// (id, gameweek, home, away, finished)
pub const FIXTURES: [(u32, u32, u32, u32, bool); 12] = [
    (1, 1, 1, 2, true),
    (2, 1, 3, 4, true),
    (3, 2, 2, 3, true),
    (4, 2, 4, 1, true),
    (5, 3, 1, 3, true),
    (6, 3, 2, 4, true),
    (7, 4, 1, 4, false),
    (8, 4, 3, 2, false),
    (9, 5, 2, 1, false),
    (10, 5, 4, 3, false),
    (11, 5, 1, 3, false),
    (12, 6, 1, 2, false),
];

/// element_type per squad slot; each team fields six players.
const SQUAD: [u32; 6] = [1, 2, 2, 3, 3, 4];
pub const INJURED_DEFENDER: u32 = 2;

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-09-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn player_id(team: u32, slot: usize) -> u32 {
    (team - 1) * SQUAD.len() as u32 + slot as u32 + 1
}

pub fn team_of(player: u32) -> u32 {
    (player - 1) / SQUAD.len() as u32 + 1
}

pub fn position_of(player: u32) -> u32 {
    SQUAD[((player - 1) % SQUAD.len() as u32) as usize]
}

fn gameweek_time(gameweek: u32, hour: u32) -> String {
    let first = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
    let day = first + Days::new(u64::from(gameweek - 1) * 7);
    format!("{}T{hour:02}:00:00Z", day.format("%Y-%m-%d"))
}

fn kickoff(gameweek: u32) -> String {
    gameweek_time(gameweek, 19)
}

/// Raw JSON tables of a small four-team season, editable before use.
pub struct SeasonJson {
    pub events: Vec<Value>,
    pub teams: Vec<Value>,
    pub players: Vec<Value>,
    pub fixtures: Vec<Value>,
    pub histories: HashMap<u32, Vec<Value>>,
    pub past: HashMap<u32, Vec<Value>>,
}

impl SeasonJson {
    pub fn new() -> Self {
        let events = (1..=6u32)
            .map(|gw| {
                json!({
                    "id": gw,
                    "deadline_time": gameweek_time(gw, 17),
                    "finished": gw <= 3,
                })
            })
            .collect();

        let teams = (1..=4u32)
            .map(|id| {
                let base = 1000.0 + id as f64 * 40.0;
                json!({
                    "id": id,
                    "name": format!("Team {id}"),
                    "short_name": format!("T{id}"),
                    "strength": id + 1,
                    "strength_overall_home": base + 30.0,
                    "strength_overall_away": base,
                    "strength_attack_home": base + 50.0,
                    "strength_attack_away": base + 10.0,
                    "strength_defence_home": base + 20.0,
                    "strength_defence_away": base - 20.0,
                    "position": 0,
                    "pulse_id": id + 100,
                })
            })
            .collect();

        let fixtures = FIXTURES
            .iter()
            .map(|&(id, event, h, a, finished)| {
                json!({
                    "id": id,
                    "event": event,
                    "team_h": h,
                    "team_a": a,
                    "finished": finished,
                    "kickoff_time": kickoff(event),
                    "team_h_score": if finished { Value::from(id % 3) } else { Value::Null },
                    "team_a_score": if finished { Value::from(id % 2) } else { Value::Null },
                    "stats": [],
                })
            })
            .collect();

        let mut players = Vec::new();
        let mut histories = HashMap::new();
        let mut past = HashMap::new();
        for team in 1..=4u32 {
            for slot in 0..SQUAD.len() {
                let id = player_id(team, slot);
                players.push(json!({
                    "id": id,
                    "element_type": SQUAD[slot],
                    "web_name": format!("P{id}"),
                    "team": team,
                    "points_per_game": format!("{:.1}", 3.0 + (id % 4) as f64 * 0.5),
                    "status": if id == INJURED_DEFENDER { "i" } else { "a" },
                    "chance_of_playing_next_round": Value::Null,
                    "starts": 3,
                    "minutes": 270,
                    "transfers_in_event": id * 10,
                    "now_cost": 55,
                    "news": "",
                }));
                histories.insert(id, appearances(id, team));
                past.insert(
                    id,
                    vec![
                        json!({"season_name": "2023/24", "total_points": 100 + id}),
                        json!({"season_name": "2022/23", "total_points": 90}),
                    ],
                );
            }
        }

        Self {
            events,
            teams,
            players,
            fixtures,
            histories,
            past,
        }
    }

    pub fn into_source(self) -> MemorySource {
        let summaries = self
            .histories
            .into_iter()
            .map(|(id, history)| {
                let past = self.past.get(&id).cloned().unwrap_or_default();
                (
                    id,
                    ElementSummary {
                        history: Frame::from_records("history", &history),
                        history_past: Frame::from_records("history_past", &past),
                    },
                )
            })
            .collect();
        MemorySource {
            bootstrap: Bootstrap {
                events: Frame::from_records("events", &self.events),
                teams: Frame::from_records("teams", &self.teams),
                players: Frame::from_records("players", &self.players),
            },
            fixtures: Frame::from_records("fixtures", &self.fixtures),
            summaries,
        }
    }

    pub fn load(self, config: &PipelineConfig) -> Season {
        source::load_season(&self.into_source(), config, &mut NoopObserver).unwrap()
    }
}

fn appearances(id: u32, team: u32) -> Vec<Value> {
    let goalkeeper = position_of(id) == 1;
    let defensive = position_of(id) <= 2;
    FIXTURES
        .iter()
        .filter(|f| f.4 && (f.2 == team || f.3 == team))
        .map(|&(fid, event, h, a, _)| {
            let was_home = h == team;
            let (home_score, away_score) = (fid % 3, fid % 2);
            let conceded = if was_home { away_score } else { home_score };
            let clean_sheet = u32::from(conceded == 0);
            let goals = u32::from((id + fid) % 4 == 0);
            let assists = u32::from((id * fid) % 5 == 0);
            let recoveries = (id + fid) % 6;
            let tackles = id % 4;
            let cbi = fid % 5;
            let total = 2
                + goals * 4
                + assists * 3
                + clean_sheet * if defensive { 4 } else { 1 }
                + id % 3;
            json!({
                "element": id,
                "fixture": fid,
                "opponent_team": if was_home { a } else { h },
                "total_points": total,
                "was_home": was_home,
                "kickoff_time": kickoff(event),
                "team_h_score": home_score,
                "team_a_score": away_score,
                "round": event,
                "minutes": 90,
                "starts": 1,
                "goals_scored": goals,
                "assists": assists,
                "clean_sheets": clean_sheet,
                "goals_conceded": conceded,
                "own_goals": 0,
                "penalties_saved": 0,
                "penalties_missed": 0,
                "yellow_cards": u32::from(fid == 3),
                "red_cards": 0,
                "saves": if goalkeeper { 2 + fid % 3 } else { 0 },
                "bonus": (id + fid) % 3,
                "bps": 10 + id % 10,
                "influence": format!("{:.1}", 10.0 + (id % 7) as f64),
                "creativity": format!("{:.1}", 5.0 + (fid % 4) as f64),
                "threat": format!("{:.1}", (id * fid % 11) as f64),
                "ict_index": format!("{:.1}", 2.0 + (id % 5) as f64 * 0.3),
                "clearances_blocks_interceptions": cbi,
                "recoveries": recoveries,
                "tackles": tackles,
                "defensive_contribution": cbi + recoveries + tackles,
                "expected_goals": format!("{:.2}", (id % 5) as f64 * 0.07),
                "expected_assists": "0.05",
                "expected_goal_involvements": format!("{:.2}", (id % 5) as f64 * 0.07 + 0.05),
                "expected_goals_conceded": "1.10",
                "value": 55,
                "transfers_balance": 0,
                "selected": 1000,
            })
        })
        .collect()
}

/// Defaults with small ensembles and no retry back-off.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        retry_backoff_ms: 0,
        load_retries: 1,
        ..PipelineConfig::default()
    };
    for position in Position::ALL {
        config.model_mut(position).booster.n_estimators = 25;
    }
    config
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
