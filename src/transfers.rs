use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PipelineResult;
use crate::fpl_data::Position;
use crate::frame::Frame;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferSummary {
    pub total: u64,
    pub by_position: BTreeMap<Position, u64>,
}

pub fn transfer_summary(players: &Frame) -> PipelineResult<TransferSummary> {
    players.require(&["element_type", "transfers_in_event"])?;
    let types = players.column("element_type")?;
    let transfers = players.column("transfers_in_event")?;

    let mut out = TransferSummary::default();
    for position in Position::ALL {
        out.by_position.insert(position, 0);
    }
    for (code, count) in types.iter().zip(transfers) {
        let count = count.as_f64().filter(|c| *c > 0.0).unwrap_or(0.0) as u64;
        out.total += count;
        if let Some(position) = code.as_u32().and_then(Position::from_element_type) {
            *out.by_position.entry(position).or_default() += count;
        }
    }
    Ok(out)
}

pub fn position_shares(summary: &TransferSummary) -> Vec<(Position, f64)> {
    summary
        .by_position
        .iter()
        .map(|(position, count)| {
            let share = if summary.total == 0 {
                0.0
            } else {
                *count as f64 / summary.total as f64
            };
            (*position, share)
        })
        .collect()
}
