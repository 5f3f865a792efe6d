use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::context::{self, FormWindow, SeasonContext};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{PipelineEvent, PipelineObserver};
use crate::features;
use crate::fpl_data::{GameweekRange, PlayerStatus, Position};
use crate::frame::{Cell, Frame};
use crate::normalize;
use crate::position_model::{PositionModel, ScoringContext, round2};
use crate::source::Season;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub player_id: u32,
    pub web_name: String,
    pub team_name: String,
    /// One entry per gameweek of the table, in ascending order. `None` when
    /// the player had no fixture that gameweek.
    pub points: Vec<Option<f64>>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTable {
    pub position: Position,
    pub gameweeks: Vec<u32>,
    pub rows: Vec<RankedRow>,
}

impl RankedTable {
    pub fn row(&self, player_id: u32) -> Option<&RankedRow> {
        self.rows.iter().find(|r| r.player_id == player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rankings {
    pub range: GameweekRange,
    pub tables: Vec<RankedTable>,
}

impl Rankings {
    pub fn table(&self, position: Position) -> Option<&RankedTable> {
        self.tables.iter().find(|t| t.position == position)
    }
}

pub fn resolve_range(
    events: &Frame,
    requested: Option<GameweekRange>,
    now: DateTime<Utc>,
) -> PipelineResult<GameweekRange> {
    match requested {
        Some(range) => Ok(range),
        None => {
            let finished = normalize::finished_gameweek(events, now)?;
            GameweekRange::single(finished + 1)
        }
    }
}

pub fn aggregate(
    position: Position,
    per_gameweek: &BTreeMap<u32, HashMap<u32, f64>>,
    ctx: &SeasonContext,
) -> RankedTable {
    let gameweeks: Vec<u32> = per_gameweek.keys().copied().collect();
    let players: BTreeSet<u32> = per_gameweek
        .values()
        .flat_map(|preds| preds.keys().copied())
        .collect();

    let mut rows = Vec::with_capacity(players.len());
    for player_id in players {
        let Some(entry) = ctx.roster_entry(player_id) else {
            continue;
        };
        let Some(team) = ctx.teams.get(&entry.team) else {
            continue;
        };
        let points: Vec<Option<f64>> = per_gameweek
            .values()
            .map(|preds| preds.get(&player_id).copied())
            .collect();
        let total = round2(points.iter().flatten().sum::<f64>());
        rows.push(RankedRow {
            player_id,
            web_name: entry.web_name.clone(),
            team_name: team.name.clone(),
            points,
            total,
        });
    }
    rows.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    RankedTable {
        position,
        gameweeks,
        rows,
    }
}

fn cell_or_zero(frame: &Frame, row: usize, name: &str) -> f64 {
    frame.cell(row, name).and_then(Cell::as_f64).unwrap_or(0.0)
}

fn scoring_contexts(enriched: &Frame, ctx: &SeasonContext) -> PipelineResult<Vec<ScoringContext>> {
    let ids = enriched.column("player_id")?;
    let mut out = Vec::with_capacity(enriched.len());
    for (row, id) in ids.iter().enumerate() {
        let id = id.as_u32();
        let entry = id.and_then(|id| ctx.roster_entry(id));
        let status = id
            .and_then(|id| ctx.statuses.get(&id))
            .cloned()
            .unwrap_or(PlayerStatus::Other(String::new()));
        out.push(ScoringContext {
            clean_sheet_rate: cell_or_zero(enriched, row, "clean_sheets_per_match"),
            goal_involvement_rate: cell_or_zero(enriched, row, "goals_per_match")
                + cell_or_zero(enriched, row, "assists_per_match"),
            diff_def_att: cell_or_zero(enriched, row, "diff_def_att"),
            diff_att_def: cell_or_zero(enriched, row, "diff_att_def"),
            will_play: entry.map_or(0.0, |e| e.will_play),
            status,
        });
    }
    Ok(out)
}

pub fn align_features(
    enriched: &Frame,
    excluded: &[&str],
    trained: &[String],
) -> PipelineResult<Frame> {
    let candidate = enriched.without(excluded);
    let found: BTreeSet<&str> = candidate.columns().iter().map(String::as_str).collect();
    let expected: BTreeSet<&str> = trained.iter().map(String::as_str).collect();
    if found != expected {
        return Err(PipelineError::FeatureMismatch {
            expected: trained.to_vec(),
            found: candidate.columns().to_vec(),
        });
    }
    candidate.select(trained)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixturePrediction {
    pub player_id: u32,
    pub fixture_id: u32,
    pub points: f64,
}

#[derive(Debug, Clone)]
pub struct TrainedPosition {
    model: PositionModel,
    form: Frame,
}

impl TrainedPosition {
    pub fn train(
        position: Position,
        ctx: &SeasonContext,
        config: &PipelineConfig,
        observer: &mut dyn PipelineObserver,
    ) -> PipelineResult<Option<Self>> {
        let group = position.feature_group();
        let view = ctx.training_view(position)?;
        if view.is_empty() {
            warn!(%position, "no finished appearances to train on");
            return Ok(None);
        }
        let enriched = features::add_features(&view, &ctx.league, group, true)?;

        let labels = enriched.numeric_or(context::LABEL_COLUMN, 0.0)?;
        let x = enriched.without(&context::excluded_columns(group));
        let mut model = PositionModel::new(position, config.model(position).clone());
        model.train(&x, &labels)?;
        observer.on_event(PipelineEvent::PositionTrained {
            position,
            rows: x.len(),
            features: x.columns().len(),
        });

        let form = ctx.form_view(
            position,
            &enriched,
            FormWindow {
                window: config.rolling_window,
                min_periods: config.rolling_min_periods,
                decimals: config.form_decimals,
            },
        )?;
        Ok(Some(Self { model, form }))
    }

    pub fn position(&self) -> Position {
        self.model.position()
    }

    /// One prediction per (player, fixture) of `gameweek`, plus the number of
    /// players left without a fixture.
    pub fn predict_fixtures(
        &self,
        ctx: &SeasonContext,
        gameweek: u32,
    ) -> PipelineResult<(Vec<FixturePrediction>, usize)> {
        let group = self.position().feature_group();
        let (view, excluded) = ctx.prediction_view(&self.form, gameweek)?;
        if view.is_empty() {
            return Ok((Vec::new(), excluded));
        }
        let enriched = features::add_features(&view, &ctx.league, group, false)?;
        let x = align_features(
            &enriched,
            &context::excluded_columns(group),
            self.model.feature_names()?,
        )?;
        let contexts = scoring_contexts(&enriched, ctx)?;
        let predictions = self.model.predict(&x, &contexts)?;
        let ids = enriched.column("player_id")?;
        let fixtures = enriched.column("player_fixture")?;
        let rows = ids
            .iter()
            .zip(fixtures)
            .zip(predictions)
            .filter_map(|((id, fixture), points)| {
                Some(FixturePrediction {
                    player_id: id.as_u32()?,
                    fixture_id: fixture.as_u32()?,
                    points,
                })
            })
            .collect();
        Ok((rows, excluded))
    }
}

fn sum_by_player(rows: &[FixturePrediction]) -> HashMap<u32, f64> {
    let mut totals: HashMap<u32, f64> = HashMap::new();
    for row in rows {
        *totals.entry(row.player_id).or_default() += row.points;
    }
    for points in totals.values_mut() {
        *points = round2(*points);
    }
    totals
}

fn predict_gameweek(
    trained: &TrainedPosition,
    ctx: &SeasonContext,
    gameweek: u32,
    observer: &mut dyn PipelineObserver,
) -> PipelineResult<HashMap<u32, f64>> {
    let (rows, excluded) = trained.predict_fixtures(ctx, gameweek)?;
    let totals = sum_by_player(&rows);
    observer.on_event(PipelineEvent::GameweekPredicted {
        gameweek,
        position: trained.position(),
        players: totals.len(),
        excluded,
    });
    Ok(totals)
}

/// Runs the whole prediction for `range` (or the next gameweek when `None`).
pub fn run(
    season: &Season,
    range: Option<GameweekRange>,
    now: DateTime<Utc>,
    config: &PipelineConfig,
    observer: &mut dyn PipelineObserver,
) -> PipelineResult<Rankings> {
    let range = resolve_range(&season.events, range, now)?;
    let ctx = SeasonContext::from_season(season)?;
    info!(
        start = range.start(),
        end = range.end(),
        players = ctx.roster.len(),
        "predicting gameweeks"
    );

    let mut tables = Vec::with_capacity(Position::ALL.len());
    for position in Position::ALL {
        let mut per_gameweek: BTreeMap<u32, HashMap<u32, f64>> = BTreeMap::new();
        match TrainedPosition::train(position, &ctx, config, observer)? {
            Some(trained) => {
                for gameweek in range.iter() {
                    let preds = predict_gameweek(&trained, &ctx, gameweek, observer)?;
                    per_gameweek.insert(gameweek, preds);
                }
            }
            None => {
                for gameweek in range.iter() {
                    per_gameweek.insert(gameweek, HashMap::new());
                }
            }
        }
        tables.push(aggregate(position, &per_gameweek, &ctx));
    }

    observer.on_event(PipelineEvent::RunCompleted {
        start: range.start(),
        end: range.end(),
    });
    Ok(Rankings { range, tables })
}
