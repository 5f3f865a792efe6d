use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::events::{PipelineEvent, PipelineObserver};
use crate::frame::{Cell, Frame};
use crate::normalize;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bootstrap {
    pub events: Frame,
    pub teams: Frame,
    pub players: Frame,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSummary {
    pub history: Frame,
    pub history_past: Frame,
}

pub trait SeasonSource {
    fn bootstrap(&self) -> Result<Bootstrap>;
    fn fixtures(&self) -> Result<Frame>;
    fn element_summary(&self, player_id: u32) -> Result<ElementSummary>;
}

fn records<'a>(body: &'a Value, key: &str) -> Result<&'a [Value]> {
    body.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| anyhow!("missing `{key}` array"))
}

pub fn parse_bootstrap_json(raw: &str) -> Result<Bootstrap> {
    let body: Value = serde_json::from_str(raw).context("parse bootstrap json")?;
    Ok(Bootstrap {
        events: Frame::from_records("events", records(&body, "events")?),
        teams: Frame::from_records("teams", records(&body, "teams")?),
        players: Frame::from_records("players", records(&body, "elements")?),
    })
}

pub fn parse_fixtures_json(raw: &str) -> Result<Frame> {
    let body: Value = serde_json::from_str(raw).context("parse fixtures json")?;
    let rows = body
        .as_array()
        .ok_or_else(|| anyhow!("fixtures body is not an array"))?;
    Ok(Frame::from_records("fixtures", rows))
}

pub fn parse_element_summary_json(raw: &str) -> Result<ElementSummary> {
    let body: Value = serde_json::from_str(raw).context("parse element summary json")?;
    Ok(ElementSummary {
        history: Frame::from_records("history", records(&body, "history")?),
        history_past: Frame::from_records("history_past", records(&body, "history_past")?),
    })
}

/// Snapshot directory laid out like the public API:
/// `bootstrap-static.json`, `fixtures.json`, `element-summary/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, rel: &Path) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

impl SeasonSource for JsonDirSource {
    fn bootstrap(&self) -> Result<Bootstrap> {
        parse_bootstrap_json(&self.read(Path::new("bootstrap-static.json"))?)
    }

    fn fixtures(&self) -> Result<Frame> {
        parse_fixtures_json(&self.read(Path::new("fixtures.json"))?)
    }

    fn element_summary(&self, player_id: u32) -> Result<ElementSummary> {
        let rel = Path::new("element-summary").join(format!("{player_id}.json"));
        parse_element_summary_json(&self.read(&rel)?)
            .with_context(|| format!("element summary {player_id}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub bootstrap: Bootstrap,
    pub fixtures: Frame,
    pub summaries: HashMap<u32, ElementSummary>,
}

impl SeasonSource for MemorySource {
    fn bootstrap(&self) -> Result<Bootstrap> {
        Ok(self.bootstrap.clone())
    }

    fn fixtures(&self) -> Result<Frame> {
        Ok(self.fixtures.clone())
    }

    fn element_summary(&self, player_id: u32) -> Result<ElementSummary> {
        self.summaries
            .get(&player_id)
            .cloned()
            .ok_or_else(|| anyhow!("no summary for player {player_id}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Season {
    pub events: Frame,
    pub teams: Frame,
    pub players: Frame,
    pub fixtures: Frame,
    pub history: Frame,
    pub past_points: HashMap<u32, f64>,
}

fn summary_with_retry(
    source: &dyn SeasonSource,
    player_id: u32,
    config: &PipelineConfig,
) -> std::result::Result<ElementSummary, (u32, anyhow::Error)> {
    let attempts = config.load_retries.max(1);
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        match source.element_summary(player_id) {
            Ok(summary) => return Ok(summary),
            Err(err) => {
                debug!(player_id, attempt, error = %err, "element summary failed");
                last_err = Some(err);
                if attempt < attempts {
                    thread::sleep(config.retry_backoff(attempt));
                }
            }
        }
    }
    Err((
        attempts,
        last_err.unwrap_or_else(|| anyhow!("element summary {player_id} failed")),
    ))
}

pub fn load_season(
    source: &dyn SeasonSource,
    config: &PipelineConfig,
    observer: &mut dyn PipelineObserver,
) -> Result<Season> {
    let Bootstrap {
        events,
        teams,
        players,
    } = source.bootstrap().context("load bootstrap")?;
    let fixtures = source.fixtures().context("load fixtures")?;

    let ids: Vec<u32> = players
        .column("id")?
        .iter()
        .filter_map(Cell::as_u32)
        .collect();
    info!(players = ids.len(), "loading player histories");

    let mut histories = Vec::with_capacity(ids.len());
    let mut past_points = HashMap::with_capacity(ids.len());
    let mut failed = 0usize;
    for id in ids {
        match summary_with_retry(source, id, config) {
            Ok(summary) => {
                let avg = normalize::average_past_points(&summary.history_past, config.past_seasons)?;
                past_points.insert(id, avg);
                histories.push(summary.history);
            }
            Err((attempts, err)) => {
                failed += 1;
                observer.on_event(PipelineEvent::PlayerLoadFailed {
                    player_id: id,
                    attempts,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    let history = Frame::concat("history", &histories);
    observer.on_event(PipelineEvent::SeasonLoaded {
        players: past_points.len(),
        appearances: history.len(),
        failed_players: failed,
    });
    Ok(Season {
        events,
        teams,
        players,
        fixtures,
        history,
        past_points,
    })
}
