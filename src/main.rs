use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use fpl_predictor::config::PipelineConfig;
use fpl_predictor::events::TracingObserver;
use fpl_predictor::fpl_data::GameweekRange;
use fpl_predictor::pipeline::{self, RankedTable};
use fpl_predictor::source::{self, JsonDirSource};
use fpl_predictor::transfers;

const TOP_ROWS: usize = 20;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_dir = parse_path_arg("--data")
        .or_else(|| std::env::var("FPL_DATA_DIR").ok().map(PathBuf::from))
        .context("missing --data <snapshot dir> (or FPL_DATA_DIR)")?;

    let mut config = match parse_path_arg("--config") {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());

    let source = JsonDirSource::new(&data_dir);
    let mut observer = TracingObserver;
    let season = source::load_season(&source, &config, &mut observer)
        .with_context(|| format!("load season from {}", data_dir.display()))?;

    if has_flag("--transfers") {
        let summary = transfers::transfer_summary(&season.players)?;
        println!("Total transfers in this gameweek: {}", summary.total);
        for (position, share) in transfers::position_shares(&summary) {
            let count = summary.by_position.get(&position).copied().unwrap_or(0);
            println!("  {:<12} {:>10} ({:.1}%)", position.plural(), count, share * 100.0);
        }
        return Ok(());
    }

    let range = match (parse_u32_arg("--from"), parse_u32_arg("--to")) {
        (Some(start), Some(end)) => Some(GameweekRange::new(start, end)?),
        (Some(start), None) => Some(GameweekRange::single(start)?),
        (None, Some(end)) => Some(GameweekRange::single(end)?),
        (None, None) => None,
    };

    let rankings = pipeline::run(&season, range, Utc::now(), &config, &mut observer)?;
    if has_flag("--json") {
        let json = serde_json::to_string_pretty(&rankings).context("serialize rankings")?;
        println!("{json}");
        return Ok(());
    }
    for table in &rankings.tables {
        print_table(table);
    }
    Ok(())
}

fn print_table(table: &RankedTable) {
    println!();
    println!("== {} ==", table.position.plural());
    let mut header = format!("{:>5}  {:<18} {:<16}", "id", "player", "team");
    for gw in &table.gameweeks {
        header.push_str(&format!(" {:>6}", format!("gw{gw}")));
    }
    header.push_str(&format!(" {:>7}", "total"));
    println!("{header}");
    for row in table.rows.iter().take(TOP_ROWS) {
        let mut line = format!("{:>5}  {:<18} {:<16}", row.player_id, row.web_name, row.team_name);
        for points in &row.points {
            match points {
                Some(p) => line.push_str(&format!(" {p:>6.2}")),
                None => line.push_str(&format!(" {:>6}", "-")),
            }
        }
        line.push_str(&format!(" {:>7.2}", row.total));
        println!("{line}");
    }
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix)
            && !v.trim().is_empty()
        {
            return Some(v.trim().to_string());
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    arg_value(flag).map(PathBuf::from)
}

fn parse_u32_arg(flag: &str) -> Option<u32> {
    arg_value(flag).and_then(|v| v.parse().ok())
}
