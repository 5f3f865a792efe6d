use thiserror::Error;

use crate::fpl_data::Position;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("table `{table}` is missing required column `{column}`")]
    Schema { table: String, column: String },

    #[error("prediction features do not match training features (expected {expected:?}, found {found:?})")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{position} model used before training")]
    NotTrained { position: Position },

    #[error("no training rows for {position}")]
    NoTrainingData { position: Position },

    #[error("row count mismatch: expected {expected}, found {found}")]
    RowCountMismatch { expected: usize, found: usize },

    #[error("no upcoming gameweek: every deadline has passed")]
    UnknownGameweek,

    #[error("invalid gameweek range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },
}

impl PipelineError {
    pub fn schema(table: &str, column: &str) -> Self {
        Self::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
