pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod features;
pub mod fpl_data;
pub mod frame;
pub mod gbdt;
pub mod normalize;
pub mod pipeline;
pub mod position_model;
pub mod source;
pub mod transfers;

pub use error::{PipelineError, PipelineResult};
