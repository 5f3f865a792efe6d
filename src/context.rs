use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::PipelineResult;
use crate::features::{self, LeagueHistory, STRENGTH_COLUMNS};
use crate::fpl_data::{FeatureGroup, Fixture, PlayerStatus, Position, RosterEntry, Team, Venue};
use crate::frame::{Cell, Frame};
use crate::normalize::{self, stat_columns};
use crate::source::Season;

pub const LABEL_COLUMN: &str = "player_total_points";

const EXCLUDED_COLUMNS: [&str; 14] = [
    "player_id",
    "player_element_type",
    "player_web_name",
    "player_team",
    "player_element",
    "player_fixture",
    "player_opponent_team",
    LABEL_COLUMN,
    "player_team_h_score",
    "player_team_a_score",
    "player_round",
    "player_minutes",
    "player_starts",
    "player_kickoff_time",
];

const GOALKEEPER_EXCLUDED_COLUMNS: [&str; 2] = [
    "player_clearances_blocks_interceptions",
    "player_recoveries",
];

pub fn excluded_columns(group: FeatureGroup) -> Vec<&'static str> {
    let mut out = EXCLUDED_COLUMNS.to_vec();
    if group.is_goalkeeper() {
        out.extend(GOALKEEPER_EXCLUDED_COLUMNS);
    }
    out
}

pub fn form_columns(group: FeatureGroup) -> Vec<String> {
    let mut out: Vec<String> = [
        "player_points_per_game",
        "player_will_play",
        "player_avg_points_last_3y",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    out.extend(stat_columns(group).iter().map(|s| format!("player_{s}")));
    out.extend(features::rate_features(group).iter().map(|c| c.to_string()));
    out
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

fn strength_cells(own: &Team, opponent: &Team, venue: Venue) -> [(&'static str, Cell); 8] {
    let away_or_home = match venue {
        Venue::Home => Venue::Away,
        Venue::Away => Venue::Home,
    };
    let mine = own.side(venue);
    let theirs = opponent.side(away_or_home);
    [
        (STRENGTH_COLUMNS[0], Cell::num(mine.strength)),
        (STRENGTH_COLUMNS[1], Cell::num(mine.overall)),
        (STRENGTH_COLUMNS[2], Cell::num(mine.attack)),
        (STRENGTH_COLUMNS[3], Cell::num(mine.defence)),
        (STRENGTH_COLUMNS[4], Cell::num(theirs.strength)),
        (STRENGTH_COLUMNS[5], Cell::num(theirs.overall)),
        (STRENGTH_COLUMNS[6], Cell::num(theirs.attack)),
        (STRENGTH_COLUMNS[7], Cell::num(theirs.defence)),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormWindow {
    pub window: usize,
    pub min_periods: usize,
    pub decimals: u32,
}

#[derive(Debug, Clone)]
pub struct SeasonContext {
    pub roster: Vec<RosterEntry>,
    pub teams: HashMap<u32, Team>,
    pub fixtures: Vec<Fixture>,
    pub statuses: HashMap<u32, PlayerStatus>,
    pub league: LeagueHistory,
    fixtures_by_id: HashMap<u32, Fixture>,
    history: Frame,
    past_points: HashMap<u32, f64>,
}

impl SeasonContext {
    pub fn from_season(season: &Season) -> PipelineResult<Self> {
        let roster = normalize::process_players(&season.players)?;
        let statuses = normalize::live_statuses(&season.players)?;
        let teams = normalize::process_teams(&season.teams)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let fixtures = normalize::process_fixtures(&season.fixtures)?;
        let fixtures_by_id: HashMap<u32, Fixture> =
            fixtures.iter().map(|f| (f.id, f.clone())).collect();
        let league = LeagueHistory::from_appearances(&season.history, &fixtures_by_id)?;
        Ok(Self {
            roster,
            teams,
            fixtures,
            statuses,
            league,
            fixtures_by_id,
            history: season.history.clone(),
            past_points: season.past_points.clone(),
        })
    }

    pub fn roster_for(&self, position: Position) -> impl Iterator<Item = &RosterEntry> {
        self.roster.iter().filter(move |p| p.position == position)
    }

    pub fn roster_entry(&self, player_id: u32) -> Option<&RosterEntry> {
        self.roster.iter().find(|p| p.id == player_id)
    }

    /// One row per finished appearance of a player at `position`, ordered by
    /// player then (round, kickoff, fixture). Appearances whose fixture or
    /// teams cannot be resolved are dropped.
    pub fn training_view(&self, position: Position) -> PipelineResult<Frame> {
        let group = position.feature_group();
        let mut out = Frame::new("training");
        if self.history.is_empty() {
            return Ok(out);
        }
        let history = normalize::project_history(&self.history, group)?;
        let players: HashMap<u32, &RosterEntry> =
            self.roster_for(position).map(|p| (p.id, p)).collect();

        struct Keep<'a> {
            row: usize,
            player: &'a RosterEntry,
            fixture: &'a Fixture,
            venue: Venue,
            round: u32,
            kickoff: String,
        }

        let mut keep: Vec<Keep<'_>> = Vec::new();
        let mut dropped = 0usize;
        for row in 0..history.len() {
            let Some(player) = history
                .cell(row, "element")
                .and_then(Cell::as_u32)
                .and_then(|id| players.get(&id).copied())
            else {
                continue;
            };
            let fixture = history
                .cell(row, "fixture")
                .and_then(Cell::as_u32)
                .and_then(|id| self.fixtures_by_id.get(&id))
                .filter(|f| f.finished);
            let venue = match history.cell(row, "was_home").and_then(Cell::as_bool) {
                Some(true) => Some(Venue::Home),
                Some(false) => Some(Venue::Away),
                None => None,
            };
            let has_label = history
                .cell(row, "total_points")
                .and_then(Cell::as_f64)
                .is_some();
            let (Some(fixture), Some(venue), true) = (fixture, venue, has_label) else {
                dropped += 1;
                continue;
            };
            if !self.teams.contains_key(&fixture.team_h) || !self.teams.contains_key(&fixture.team_a)
            {
                dropped += 1;
                continue;
            }
            keep.push(Keep {
                row,
                player,
                fixture,
                venue,
                round: history
                    .cell(row, "round")
                    .and_then(Cell::as_u32)
                    .or(fixture.event)
                    .unwrap_or(0),
                kickoff: history
                    .cell(row, "kickoff_time")
                    .and_then(Cell::as_str)
                    .map(str::to_string)
                    .or_else(|| fixture.kickoff_time.clone())
                    .unwrap_or_default(),
            });
        }
        keep.sort_by(|a, b| {
            (a.player.id, a.round, &a.kickoff, a.fixture.id)
                .cmp(&(b.player.id, b.round, &b.kickoff, b.fixture.id))
        });

        let prefixed: Vec<String> = history
            .columns()
            .iter()
            .map(|c| format!("player_{c}"))
            .collect();
        for k in &keep {
            let (team_id, opponent_id) = match k.venue {
                Venue::Home => (k.fixture.team_h, k.fixture.team_a),
                Venue::Away => (k.fixture.team_a, k.fixture.team_h),
            };
            let (Some(team), Some(opponent)) = (self.teams.get(&team_id), self.teams.get(&opponent_id))
            else {
                continue;
            };
            let minutes = history
                .cell(k.row, "minutes")
                .and_then(Cell::as_f64)
                .unwrap_or(0.0);

            let mut cells: Vec<(&str, Cell)> = vec![
                ("player_id", Cell::num(k.player.id as f64)),
                (
                    "player_element_type",
                    Cell::num(k.player.position.element_type() as f64),
                ),
                ("player_web_name", Cell::text(&k.player.web_name)),
                ("player_team", Cell::num(team_id as f64)),
                ("player_points_per_game", Cell::num(k.player.points_per_game)),
                (
                    "player_will_play",
                    Cell::num(normalize::will_play_from_minutes(minutes)),
                ),
                (
                    "player_avg_points_last_3y",
                    Cell::num(self.past_points.get(&k.player.id).copied().unwrap_or(0.0)),
                ),
            ];
            for (name, column) in prefixed.iter().zip(history.columns()) {
                let cell = history.cell(k.row, column).cloned().unwrap_or_default();
                cells.push((name.as_str(), cell));
            }
            cells.push(("player_opponent_team", Cell::num(opponent_id as f64)));
            cells.push(("player_was_home", Cell::Bool(k.venue == Venue::Home)));
            cells.extend(strength_cells(team, opponent, k.venue));
            out.push_row(cells);
        }
        if dropped > 0 {
            debug!(%position, dropped, "appearances without a resolvable finished fixture");
        }
        Ok(out)
    }

    pub fn form_view(
        &self,
        position: Position,
        training: &Frame,
        window: FormWindow,
    ) -> PipelineResult<Frame> {
        let group = position.feature_group();
        let columns = form_columns(group);

        let mut rows_by_player: HashMap<u32, Vec<usize>> = HashMap::new();
        if !training.is_empty() {
            for (row, id) in training.column("player_id")?.iter().enumerate() {
                if let Some(id) = id.as_u32() {
                    rows_by_player.entry(id).or_default().push(row);
                }
            }
        }
        let values: Vec<Vec<Option<f64>>> = if training.is_empty() {
            Vec::new()
        } else {
            columns
                .iter()
                .map(|c| training.numeric(c))
                .collect::<PipelineResult<_>>()?
        };

        let mut out = Frame::new("form");
        for player in self.roster_for(position) {
            let mut cells: Vec<(&str, Cell)> = vec![
                ("player_id", Cell::num(player.id as f64)),
                ("player_team", Cell::num(player.team as f64)),
            ];
            match rows_by_player.get(&player.id) {
                Some(rows) => {
                    let recent = &rows[rows.len().saturating_sub(window.window.max(1))..];
                    for (name, column) in columns.iter().zip(&values) {
                        let present: Vec<f64> = recent.iter().filter_map(|&r| column[r]).collect();
                        let cell = if present.len() >= window.min_periods.max(1) {
                            let mean = present.iter().sum::<f64>() / present.len() as f64;
                            Cell::num(round_to(mean, window.decimals))
                        } else {
                            Cell::Missing
                        };
                        cells.push((name.as_str(), cell));
                    }
                }
                None => {
                    for name in &columns {
                        let cell = match name.as_str() {
                            "player_points_per_game" => Cell::num(player.points_per_game),
                            "player_will_play" => Cell::num(player.will_play),
                            "player_avg_points_last_3y" => Cell::num(
                                self.past_points.get(&player.id).copied().unwrap_or(0.0),
                            ),
                            _ => Cell::Missing,
                        };
                        cells.push((name.as_str(), cell));
                    }
                }
            }
            out.push_row(cells);
        }
        Ok(out)
    }

    /// Attaches `gameweek`'s fixtures to the form view: one row per
    /// (player, fixture), home/away resolved per player. Returns the view and
    /// the number of players left without a fixture.
    pub fn prediction_view(&self, form: &Frame, gameweek: u32) -> PipelineResult<(Frame, usize)> {
        let fixtures: Vec<&Fixture> = self
            .fixtures
            .iter()
            .filter(|f| f.event == Some(gameweek))
            .filter(|f| self.teams.contains_key(&f.team_h) && self.teams.contains_key(&f.team_a))
            .collect();

        let mut out = Frame::new("prediction");
        let mut excluded = 0usize;
        if form.is_empty() {
            return Ok((out, excluded));
        }
        let teams = form.column("player_team")?;
        for (row, team_cell) in teams.iter().enumerate() {
            let Some(team_id) = team_cell.as_u32() else {
                excluded += 1;
                continue;
            };
            let mut matched = false;
            for fixture in &fixtures {
                let Some(venue) = fixture.venue_of(team_id) else {
                    continue;
                };
                let Some(opponent_id) = fixture.opponent_of(team_id) else {
                    continue;
                };
                let (Some(team), Some(opponent)) =
                    (self.teams.get(&team_id), self.teams.get(&opponent_id))
                else {
                    continue;
                };
                matched = true;
                let mut cells: Vec<(&str, Cell)> = form
                    .columns()
                    .iter()
                    .map(|c| (c.as_str(), form.cell(row, c).cloned().unwrap_or_default()))
                    .collect();
                cells.push(("player_fixture", Cell::num(fixture.id as f64)));
                cells.push(("player_opponent_team", Cell::num(opponent_id as f64)));
                cells.push(("player_was_home", Cell::Bool(venue == Venue::Home)));
                cells.extend(strength_cells(team, opponent, venue));
                out.push_row(cells);
            }
            if !matched {
                excluded += 1;
            }
        }
        if fixtures.is_empty() {
            warn!(gameweek, "no fixtures scheduled");
        }
        Ok((out, excluded))
    }
}
