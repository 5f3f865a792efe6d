use tracing::{info, warn};

use crate::fpl_data::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SeasonLoaded {
        players: usize,
        appearances: usize,
        failed_players: usize,
    },
    PlayerLoadFailed {
        player_id: u32,
        attempts: u32,
        reason: String,
    },
    PositionTrained {
        position: Position,
        rows: usize,
        features: usize,
    },
    GameweekPredicted {
        gameweek: u32,
        position: Position,
        players: usize,
        excluded: usize,
    },
    RunCompleted {
        start: u32,
        end: u32,
    },
}

pub trait PipelineObserver {
    fn on_event(&mut self, event: PipelineEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&mut self, _event: PipelineEvent) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::SeasonLoaded {
                players,
                appearances,
                failed_players,
            } => info!(players, appearances, failed_players, "season loaded"),
            PipelineEvent::PlayerLoadFailed {
                player_id,
                attempts,
                reason,
            } => warn!(player_id, attempts, %reason, "player history skipped"),
            PipelineEvent::PositionTrained {
                position,
                rows,
                features,
            } => info!(%position, rows, features, "position model trained"),
            PipelineEvent::GameweekPredicted {
                gameweek,
                position,
                players,
                excluded,
            } => info!(gameweek, %position, players, excluded, "gameweek predicted"),
            PipelineEvent::RunCompleted { start, end } => info!(start, end, "run completed"),
        }
    }
}

impl PipelineObserver for Vec<PipelineEvent> {
    fn on_event(&mut self, event: PipelineEvent) {
        self.push(event);
    }
}
