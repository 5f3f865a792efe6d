use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fpl_data::Position;
use crate::gbdt::BoosterParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub booster: BoosterParams,
    /// Training labels above this percentile of the position's label
    /// distribution are capped to it before fitting.
    pub clip_percentile: f64,
}

impl ModelConfig {
    pub fn defaults(position: Position) -> Self {
        let booster = match position {
            Position::Goalkeeper => BoosterParams {
                n_estimators: 1000,
                learning_rate: 0.1,
                max_depth: 8,
                subsample: 0.8,
                colsample_bytree: 0.4,
                reg_alpha: 1.0,
                reg_lambda: 1.0,
                ..BoosterParams::default()
            },
            Position::Defender => BoosterParams {
                n_estimators: 1000,
                learning_rate: 0.005,
                max_depth: 4,
                subsample: 0.8,
                colsample_bytree: 0.2,
                reg_alpha: 0.0,
                reg_lambda: 1.0,
                ..BoosterParams::default()
            },
            Position::Midfielder | Position::Forward => BoosterParams {
                n_estimators: 1000,
                learning_rate: 0.06,
                max_depth: 8,
                subsample: 0.5,
                colsample_bytree: 0.2,
                reg_alpha: 0.0,
                reg_lambda: 0.0,
                ..BoosterParams::default()
            },
        };
        let clip_percentile = match position {
            Position::Goalkeeper | Position::Defender => 98.0,
            Position::Midfielder | Position::Forward => 96.0,
        };
        Self {
            booster,
            clip_percentile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rolling_window: usize,
    pub rolling_min_periods: usize,
    pub form_decimals: u32,
    pub past_seasons: usize,
    pub goalkeeper: ModelConfig,
    pub defender: ModelConfig,
    pub midfielder: ModelConfig,
    pub forward: ModelConfig,
    pub load_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rolling_window: 5,
            rolling_min_periods: 1,
            form_decimals: 3,
            past_seasons: 3,
            goalkeeper: ModelConfig::defaults(Position::Goalkeeper),
            defender: ModelConfig::defaults(Position::Defender),
            midfielder: ModelConfig::defaults(Position::Midfielder),
            forward: ModelConfig::defaults(Position::Forward),
            load_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        if let Some(window) = parsed("FPL_ROLLING_WINDOW") {
            self.rolling_window = (window as usize).max(1);
        }
        if let Some(retries) = parsed("FPL_LOAD_RETRIES") {
            self.load_retries = (retries as u32).max(1);
        }
        if let Some(trees) = parsed("FPL_N_ESTIMATORS") {
            for position in Position::ALL {
                self.model_mut(position).booster.n_estimators = trees as usize;
            }
        }
        for (key, position) in [
            ("FPL_GK_CLIP_PCT", Position::Goalkeeper),
            ("FPL_DEF_CLIP_PCT", Position::Defender),
            ("FPL_MID_CLIP_PCT", Position::Midfielder),
            ("FPL_FWD_CLIP_PCT", Position::Forward),
        ] {
            if let Some(pct) = parsed(key) {
                self.model_mut(position).clip_percentile = pct.clamp(0.0, 100.0);
            }
        }
    }

    pub fn model(&self, position: Position) -> &ModelConfig {
        match position {
            Position::Goalkeeper => &self.goalkeeper,
            Position::Defender => &self.defender,
            Position::Midfielder => &self.midfielder,
            Position::Forward => &self.forward,
        }
    }

    pub fn model_mut(&mut self, position: Position) -> &mut ModelConfig {
        match position {
            Position::Goalkeeper => &mut self.goalkeeper,
            Position::Defender => &mut self.defender,
            Position::Midfielder => &mut self.midfielder,
            Position::Forward => &mut self.forward,
        }
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}
