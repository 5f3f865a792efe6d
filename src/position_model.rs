use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fpl_data::{PlayerStatus, Position};
use crate::frame::{FeatureSchema, Frame};
use crate::gbdt::GradientBoostedRegressor;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringContext {
    pub clean_sheet_rate: f64,
    pub goal_involvement_rate: f64,
    pub diff_def_att: f64,
    pub diff_att_def: f64,
    pub will_play: f64,
    pub status: PlayerStatus,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn correction(position: Position, ctx: &ScoringContext) -> f64 {
    match position {
        Position::Goalkeeper | Position::Defender => {
            let weight = if position == Position::Goalkeeper { 3.0 } else { 2.0 };
            if ctx.diff_def_att >= 0.0 {
                ctx.clean_sheet_rate * weight
            } else {
                -(1.0 - ctx.clean_sheet_rate) * weight
            }
        }
        Position::Midfielder | Position::Forward => {
            let favorable = if position == Position::Forward { 3.0 } else { 2.0 };
            let weight = if ctx.diff_att_def >= 0.0 { favorable } else { -1.0 };
            ctx.goal_involvement_rate * weight
        }
    }
}

/// Turns a rounded raw model output into the published points estimate.
/// Never negative; exactly 0 for anyone not currently available.
pub fn finalize(position: Position, raw: f64, ctx: &ScoringContext) -> f64 {
    if !ctx.status.is_available() {
        return 0.0;
    }
    let corrected = raw + correction(position, ctx);
    let gated = corrected * ctx.will_play.round();
    let points = round2(gated.max(0.0));
    if points.is_nan() { 0.0 } else { points }
}

#[derive(Debug, Clone)]
struct FittedModel {
    schema: FeatureSchema,
    booster: GradientBoostedRegressor,
}

#[derive(Debug, Clone)]
pub struct PositionModel {
    position: Position,
    config: ModelConfig,
    fitted: Option<FittedModel>,
}

impl PositionModel {
    pub fn new(position: Position, config: ModelConfig) -> Self {
        Self {
            position,
            config,
            fitted: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn train(&mut self, x: &Frame, y: &[f64]) -> PipelineResult<()> {
        if x.is_empty() {
            return Err(PipelineError::NoTrainingData {
                position: self.position,
            });
        }
        if x.len() != y.len() {
            return Err(PipelineError::RowCountMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }

        let schema = FeatureSchema::from_frame(x);
        let matrix = schema.matrix(x)?;
        let cap = percentile(y, self.config.clip_percentile).unwrap_or(f64::INFINITY);
        let labels: Vec<f64> = y.iter().map(|v| v.min(cap)).collect();
        let booster = GradientBoostedRegressor::fit(&self.config.booster, &matrix, &labels)?;
        debug!(
            position = %self.position,
            rows = x.len(),
            features = schema.len(),
            label_cap = cap,
            "position model fitted"
        );
        self.fitted = Some(FittedModel { schema, booster });
        Ok(())
    }

    fn fitted(&self) -> PipelineResult<&FittedModel> {
        self.fitted.as_ref().ok_or(PipelineError::NotTrained {
            position: self.position,
        })
    }

    pub fn feature_names(&self) -> PipelineResult<&[String]> {
        Ok(self.fitted()?.schema.names())
    }

    pub fn predict_raw(&self, x: &Frame) -> PipelineResult<Vec<f64>> {
        let fitted = self.fitted()?;
        let matrix = fitted.schema.matrix(x)?;
        Ok(fitted
            .booster
            .predict(&matrix)
            .into_iter()
            .map(round2)
            .collect())
    }

    pub fn predict(&self, x: &Frame, contexts: &[ScoringContext]) -> PipelineResult<Vec<f64>> {
        if contexts.len() != x.len() {
            return Err(PipelineError::RowCountMismatch {
                expected: x.len(),
                found: contexts.len(),
            });
        }
        let raw = self.predict_raw(x)?;
        Ok(raw
            .into_iter()
            .zip(contexts)
            .map(|(r, ctx)| finalize(self.position, r, ctx))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::BoosterParams;

    fn ctx(status: &str) -> ScoringContext {
        ScoringContext {
            clean_sheet_rate: 0.4,
            goal_involvement_rate: 0.0,
            diff_def_att: -2.0,
            diff_att_def: 0.0,
            will_play: 1.0,
            status: PlayerStatus::from_code(status),
        }
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            booster: BoosterParams {
                n_estimators: 10,
                max_depth: 2,
                ..BoosterParams::default()
            },
            clip_percentile: 98.0,
        }
    }

    fn training_frame(n: usize) -> Frame {
        let mut frame = Frame::new("training");
        frame
            .set_numeric("a", (0..n).map(|i| i as f64).collect())
            .unwrap();
        frame
            .set_numeric("b", (0..n).map(|i| (i % 3) as f64).collect())
            .unwrap();
        frame
    }

    #[test]
    fn defender_scenario() {
        assert_eq!(finalize(Position::Defender, 4.0, &ctx("a")), 2.8);
        assert_eq!(finalize(Position::Defender, 4.0, &ctx("i")), 0.0);
    }

    #[test]
    fn goalkeeper_weight_is_three() {
        let mut c = ctx("a");
        c.diff_def_att = 0.0;
        assert_eq!(finalize(Position::Goalkeeper, 2.0, &c), 3.2);
    }

    #[test]
    fn forward_without_involvement_is_unchanged() {
        let mut c = ctx("a");
        c.diff_att_def = 5.0;
        assert_eq!(finalize(Position::Forward, 3.17, &c), 3.17);
        c.will_play = 0.7;
        assert_eq!(finalize(Position::Forward, 3.17, &c), 3.17);
        c.will_play = 0.0;
        assert_eq!(finalize(Position::Forward, 3.17, &c), 0.0);
    }

    #[test]
    fn midfield_unfavorable_weight() {
        let mut c = ctx("a");
        c.goal_involvement_rate = 0.5;
        c.diff_att_def = -1.0;
        assert_eq!(finalize(Position::Midfielder, 3.0, &c), 2.5);
        c.diff_att_def = 1.0;
        assert_eq!(finalize(Position::Midfielder, 3.0, &c), 4.0);
    }

    #[test]
    fn never_negative() {
        for raw in [-10.0, -0.5, 0.0, 0.3, 7.0] {
            for position in Position::ALL {
                assert!(finalize(position, raw, &ctx("a")) >= 0.0);
            }
        }
    }

    #[test]
    fn percentile_interpolates() {
        let values: Vec<f64> = (1..=5).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert!((percentile(&values, 90.0).unwrap() - 4.6).abs() < 1e-9);
        assert_eq!(percentile(&[], 90.0), None);
    }

    #[test]
    fn untrained_model_refuses_to_predict() {
        let model = PositionModel::new(Position::Defender, small_config());
        let err = model.predict_raw(&training_frame(3)).unwrap_err();
        assert_eq!(
            err,
            PipelineError::NotTrained {
                position: Position::Defender
            }
        );
    }

    #[test]
    fn prediction_columns_must_match_training() {
        let mut model = PositionModel::new(Position::Forward, small_config());
        let x = training_frame(30);
        let y: Vec<f64> = (0..30).map(|i| (i % 5) as f64).collect();
        model.train(&x, &y).unwrap();
        assert_eq!(model.feature_names().unwrap(), ["a", "b"]);

        let swapped = x.select(&["b", "a"]).unwrap();
        assert!(matches!(
            model.predict_raw(&swapped),
            Err(PipelineError::FeatureMismatch { .. })
        ));
        let dropped = x.select(&["a"]).unwrap();
        assert!(matches!(
            model.predict_raw(&dropped),
            Err(PipelineError::FeatureMismatch { .. })
        ));
        assert_eq!(model.predict_raw(&x).unwrap().len(), 30);
    }

    #[test]
    fn empty_training_set_is_an_error() {
        let mut model = PositionModel::new(Position::Goalkeeper, small_config());
        assert!(matches!(
            model.train(&Frame::new("training"), &[]),
            Err(PipelineError::NoTrainingData { .. })
        ));
    }
}
