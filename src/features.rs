use std::collections::HashMap;

use crate::error::PipelineResult;
use crate::fpl_data::{FeatureGroup, Fixture, Venue};
use crate::frame::{Cell, Frame};
use crate::normalize::LEAGUE_HISTORY_COLUMNS;

const RATE_OFFSET: f64 = 1.0;
const EFFICIENCY_EPS: f64 = 1e-6;

const GOALKEEPER_CROSS_FEATURES: [&str; 1] = ["opponent_team_total_goals"];

const OUTFIELD_CROSS_FEATURES: [&str; 4] = [
    "opponent_team_total_goals_scored",
    "opponent_team_total_goals_conceded",
    "opponent_team_total_clean_sheets",
    "opponent_team_total_saves",
];

const GOALKEEPER_RATE_FEATURES: [&str; 5] = [
    "saves_per_goal_conceded",
    "saves_per_match",
    "clean_sheets_per_match",
    "recoveries_per_match",
    "team_defense_efficiency",
];

const OUTFIELD_RATE_FEATURES: [&str; 8] = [
    "clean_sheets_per_match",
    "goals_per_match",
    "assists_per_match",
    "recoveries_per_match",
    "tackles_per_match",
    "interceptions_per_match",
    "dc_per_match",
    "team_defense_efficiency",
];

pub const STRENGTH_COLUMNS: [&str; 8] = [
    "player_team_strength",
    "player_team_strength_overall",
    "player_team_strength_attack",
    "player_team_strength_defence",
    "opponent_team_strength",
    "opponent_team_strength_overall",
    "opponent_team_strength_attack",
    "opponent_team_strength_defence",
];

pub fn rate_features(group: FeatureGroup) -> &'static [&'static str] {
    if group.is_goalkeeper() {
        &GOALKEEPER_RATE_FEATURES
    } else {
        &OUTFIELD_RATE_FEATURES
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamTotals {
    pub goals_scored: f64,
    pub goals_conceded: f64,
    pub clean_sheets: f64,
    pub saves: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FixtureDefence {
    contribution_sum: f64,
    goals_conceded_max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueHistory {
    team_totals: HashMap<u32, TeamTotals>,
    fixture_defence: HashMap<(u32, u32), FixtureDefence>,
}

impl LeagueHistory {
    pub fn from_appearances(
        history: &Frame,
        fixtures: &HashMap<u32, Fixture>,
    ) -> PipelineResult<Self> {
        let mut out = Self::default();
        if history.is_empty() {
            return Ok(out);
        }
        history.require(&LEAGUE_HISTORY_COLUMNS)?;
        history.require(&["was_home"])?;

        for row in 0..history.len() {
            let num = |name: &str| history.cell(row, name).and_then(Cell::as_f64);
            let Some(fixture_id) = history.cell(row, "fixture").and_then(Cell::as_u32) else {
                continue;
            };
            let Some(fixture) = fixtures.get(&fixture_id) else {
                continue;
            };
            let venue = match history.cell(row, "was_home").and_then(Cell::as_bool) {
                Some(true) => Venue::Home,
                Some(false) => Venue::Away,
                None => continue,
            };
            let team = match venue {
                Venue::Home => fixture.team_h,
                Venue::Away => fixture.team_a,
            };

            let totals = out.team_totals.entry(team).or_default();
            totals.goals_scored += num("goals_scored").unwrap_or(0.0);
            totals.goals_conceded += num("goals_conceded").unwrap_or(0.0);
            totals.clean_sheets += num("clean_sheets").unwrap_or(0.0);
            totals.saves += num("saves").unwrap_or(0.0);

            let defence = out.fixture_defence.entry((team, fixture_id)).or_default();
            defence.contribution_sum += num("defensive_contribution").unwrap_or(0.0);
            if let Some(conceded) = num("goals_conceded") {
                defence.goals_conceded_max = Some(
                    defence
                        .goals_conceded_max
                        .map_or(conceded, |m| m.max(conceded)),
                );
            }
        }
        Ok(out)
    }

    pub fn team_totals(&self, team: u32) -> Option<&TeamTotals> {
        self.team_totals.get(&team)
    }

    pub fn defensive_efficiency(&self, team: u32, fixture: u32) -> Option<f64> {
        let defence = self.fixture_defence.get(&(team, fixture))?;
        let conceded = defence.goals_conceded_max?;
        Some(defence.contribution_sum / (conceded + EFFICIENCY_EPS))
    }
}

/// Re-running on its own output rewrites the same values.
pub fn add_features(
    rows: &Frame,
    league: &LeagueHistory,
    group: FeatureGroup,
    training: bool,
) -> PipelineResult<Frame> {
    let mut out = rows.clone();
    add_common_features(&mut out)?;
    add_cross_features(&mut out, league, group)?;
    if training {
        add_rate_features(&mut out, league, group)?;
    }
    Ok(out)
}

fn column_or_nan(frame: &Frame, name: &str) -> PipelineResult<Vec<f64>> {
    frame.numeric_or(name, f64::NAN)
}

fn zip_map<F>(a: &[f64], b: &[f64], f: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

fn add_common_features(frame: &mut Frame) -> PipelineResult<()> {
    frame.require(&STRENGTH_COLUMNS)?;
    frame.require(&["player_was_home"])?;

    let own = column_or_nan(frame, "player_team_strength")?;
    let own_overall = column_or_nan(frame, "player_team_strength_overall")?;
    let own_attack = column_or_nan(frame, "player_team_strength_attack")?;
    let own_defence = column_or_nan(frame, "player_team_strength_defence")?;
    let opp = column_or_nan(frame, "opponent_team_strength")?;
    let opp_overall = column_or_nan(frame, "opponent_team_strength_overall")?;
    let opp_attack = column_or_nan(frame, "opponent_team_strength_attack")?;
    let opp_defence = column_or_nan(frame, "opponent_team_strength_defence")?;
    let home = column_or_nan(frame, "player_was_home")?;

    let sub = |a: f64, b: f64| a - b;
    let ratio = |a: f64, b: f64| a / (b + 1.0);
    let mul = |a: f64, b: f64| a * b;
    let damp = |v: &Vec<f64>| v.iter().map(|x| x.abs().sqrt()).collect::<Vec<f64>>();

    let diff_strength = zip_map(&own, &opp, sub);
    let diff_overall = zip_map(&own_overall, &opp_overall, sub);
    let diff_att_def = zip_map(&own_attack, &opp_defence, sub);
    let diff_def_att = zip_map(&own_defence, &opp_attack, sub);
    let team_balance = zip_map(&own_attack, &own_defence, sub);
    let opponent_balance = zip_map(&opp_attack, &opp_defence, sub);

    frame.set_numeric("sqrt_diff_strength", damp(&diff_strength))?;
    frame.set_numeric("sqrt_diff_strength_overall", damp(&diff_overall))?;
    frame.set_numeric("sqrt_diff_att_def", damp(&diff_att_def))?;
    frame.set_numeric("sqrt_diff_def_att", damp(&diff_def_att))?;

    frame.set_numeric("ratio_att_def", zip_map(&own_attack, &opp_defence, ratio))?;
    frame.set_numeric("ratio_def_att", zip_map(&own_defence, &opp_attack, ratio))?;
    frame.set_numeric("ratio_strength", zip_map(&own, &opp, ratio))?;

    frame.set_numeric("home_attack_strength", zip_map(&own_attack, &home, mul))?;
    frame.set_numeric("home_defence_strength", zip_map(&own_defence, &home, mul))?;
    frame.set_numeric("home_overall_strength", zip_map(&own_overall, &home, mul))?;

    frame.set_numeric("balance_diff", zip_map(&team_balance, &opponent_balance, sub))?;
    frame.set_numeric("team_balance", team_balance)?;
    frame.set_numeric("opponent_balance", opponent_balance)?;

    frame.set_numeric("diff_strength", diff_strength)?;
    frame.set_numeric("diff_strength_overall", diff_overall)?;
    frame.set_numeric("diff_att_def", diff_att_def)?;
    frame.set_numeric("diff_def_att", diff_def_att)?;
    Ok(())
}

fn add_cross_features(
    frame: &mut Frame,
    league: &LeagueHistory,
    group: FeatureGroup,
) -> PipelineResult<()> {
    let opponents: Vec<Option<u32>> = frame
        .column("player_opponent_team")?
        .iter()
        .map(Cell::as_u32)
        .collect();
    let lookup = |pick: fn(&TeamTotals) -> f64| -> Vec<Cell> {
        opponents
            .iter()
            .map(|opp| {
                opp.and_then(|team| league.team_totals(team))
                    .map_or(Cell::Missing, |t| Cell::num(pick(t)))
            })
            .collect()
    };

    if group.is_goalkeeper() {
        frame.set_column(GOALKEEPER_CROSS_FEATURES[0], lookup(|t| t.goals_scored))?;
        return Ok(());
    }
    let picks: [fn(&TeamTotals) -> f64; 4] = [
        |t| t.goals_scored,
        |t| t.goals_conceded,
        |t| t.clean_sheets,
        |t| t.saves,
    ];
    for (name, pick) in OUTFIELD_CROSS_FEATURES.iter().zip(picks) {
        frame.set_column(name, lookup(pick))?;
    }
    Ok(())
}

fn per_match(frame: &Frame, stat: &str, starts: &[f64]) -> PipelineResult<Vec<f64>> {
    let values = column_or_nan(frame, stat)?;
    Ok(zip_map(&values, starts, |v, s| v / (s + RATE_OFFSET)))
}

fn add_rate_features(
    frame: &mut Frame,
    league: &LeagueHistory,
    group: FeatureGroup,
) -> PipelineResult<()> {
    let starts = column_or_nan(frame, "player_starts")?;

    let rates: &[(&str, &str)] = if group.is_goalkeeper() {
        &[
            ("saves_per_match", "player_saves"),
            ("clean_sheets_per_match", "player_clean_sheets"),
            ("recoveries_per_match", "player_recoveries"),
        ]
    } else {
        &[
            ("clean_sheets_per_match", "player_clean_sheets"),
            ("goals_per_match", "player_goals_scored"),
            ("assists_per_match", "player_assists"),
            ("recoveries_per_match", "player_recoveries"),
            ("tackles_per_match", "player_tackles"),
            (
                "interceptions_per_match",
                "player_clearances_blocks_interceptions",
            ),
            ("dc_per_match", "player_defensive_contribution"),
        ]
    };

    if group.is_goalkeeper() {
        let saves = column_or_nan(frame, "player_saves")?;
        let conceded = column_or_nan(frame, "player_goals_conceded")?;
        frame.set_numeric(
            "saves_per_goal_conceded",
            zip_map(&saves, &conceded, |s, c| s / (c + RATE_OFFSET)),
        )?;
    }
    for (name, stat) in rates {
        let values = per_match(frame, stat, &starts)?;
        frame.set_numeric(name, values)?;
    }

    let teams: Vec<Option<u32>> = frame
        .column("player_team")?
        .iter()
        .map(Cell::as_u32)
        .collect();
    let fixtures: Vec<Option<u32>> = frame
        .column("player_fixture")?
        .iter()
        .map(Cell::as_u32)
        .collect();
    let efficiency = teams
        .iter()
        .zip(&fixtures)
        .map(|(team, fixture)| match (team, fixture) {
            (Some(t), Some(f)) => league
                .defensive_efficiency(*t, *f)
                .map_or(Cell::Missing, Cell::num),
            _ => Cell::Missing,
        })
        .collect();
    frame.set_column("team_defense_efficiency", efficiency)
}
