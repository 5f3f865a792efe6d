mod support;

use std::collections::HashMap;

use fpl_predictor::PipelineError;
use fpl_predictor::context::SeasonContext;
use fpl_predictor::events::{NoopObserver, PipelineEvent};
use fpl_predictor::fpl_data::{GameweekRange, Position};
use fpl_predictor::pipeline::{self, Rankings, TrainedPosition};

use support::{INJURED_DEFENDER, SeasonJson, now, player_id, round2, team_of, test_config};

fn run(range: Option<GameweekRange>) -> Rankings {
    let config = test_config();
    let season = SeasonJson::new().load(&config);
    pipeline::run(&season, range, now(), &config, &mut NoopObserver).unwrap()
}

#[test]
fn default_range_is_next_gameweek() {
    let rankings = run(None);
    assert_eq!(rankings.range, GameweekRange::single(4).unwrap());
    assert_eq!(rankings.tables.len(), 4);
    for table in &rankings.tables {
        assert_eq!(table.gameweeks, vec![4]);
        // Every team plays in gameweek 4: one row per rostered player.
        let expected = match table.position {
            Position::Goalkeeper | Position::Forward => 4,
            Position::Defender | Position::Midfielder => 8,
        };
        assert_eq!(table.rows.len(), expected, "{}", table.position);
    }
}

#[test]
fn totals_sum_gameweeks_and_rows_are_ranked() {
    let rankings = run(Some(GameweekRange::new(4, 6).unwrap()));
    for table in &rankings.tables {
        assert_eq!(table.gameweeks, vec![4, 5, 6]);
        for row in &table.rows {
            assert_eq!(row.points.len(), 3);
            let sum: f64 = row.points.iter().flatten().sum();
            assert_eq!(row.total, round2(sum));
            assert!(row.points.iter().flatten().all(|p| *p >= 0.0));
        }
        assert!(table.rows.windows(2).all(|w| w[0].total >= w[1].total));
    }
}

#[test]
fn blank_gameweek_is_absent_not_zero() {
    let rankings = run(Some(GameweekRange::new(4, 6).unwrap()));
    let mids = rankings.table(Position::Midfielder).unwrap();
    for row in &mids.rows {
        let team = team_of(row.player_id);
        // Gameweek 6 only has team 1 against team 2.
        assert_eq!(row.points[2].is_some(), team <= 2, "player {}", row.player_id);
        assert!(row.points[0].is_some());
    }

    let only_six = run(Some(GameweekRange::single(6).unwrap()));
    for table in &only_six.tables {
        assert!(table.rows.iter().all(|r| team_of(r.player_id) <= 2));
        assert!(!table.rows.is_empty());
    }
}

#[test]
fn double_gameweek_adds_both_fixtures() {
    let config = test_config();
    let season = SeasonJson::new().load(&config);
    let ctx = SeasonContext::from_season(&season).unwrap();
    let trained = TrainedPosition::train(Position::Midfielder, &ctx, &config, &mut NoopObserver)
        .unwrap()
        .unwrap();
    let (fixtures, excluded) = trained.predict_fixtures(&ctx, 5).unwrap();
    assert_eq!(excluded, 0);

    let mut per_player: HashMap<u32, Vec<(u32, f64)>> = HashMap::new();
    for row in &fixtures {
        per_player
            .entry(row.player_id)
            .or_default()
            .push((row.fixture_id, row.points));
    }

    let rankings = run(Some(GameweekRange::single(5).unwrap()));
    let mids = rankings.table(Position::Midfielder).unwrap();
    assert_eq!(per_player.len(), mids.rows.len());
    for (player, rows) in &per_player {
        // Teams 1 and 3 play twice in gameweek 5.
        let expected = if matches!(team_of(*player), 1 | 3) { 2 } else { 1 };
        assert_eq!(rows.len(), expected, "player {player}");
        let sum: f64 = rows.iter().map(|(_, points)| points).sum();
        assert_eq!(mids.row(*player).unwrap().points, vec![Some(round2(sum))]);
    }

    let mut doubled: Vec<u32> = per_player[&player_id(1, 3)].iter().map(|r| r.0).collect();
    doubled.sort_unstable();
    assert_eq!(doubled, vec![9, 11]);
}

#[test]
fn unavailable_player_scores_zero() {
    let rankings = run(None);
    let defenders = rankings.table(Position::Defender).unwrap();
    let injured = defenders.row(INJURED_DEFENDER).unwrap();
    assert_eq!(injured.points, vec![Some(0.0)]);
    assert_eq!(injured.total, 0.0);
    assert_eq!(defenders.rows.last().unwrap().total, 0.0);
}

#[test]
fn rows_carry_names_and_team_names() {
    let rankings = run(None);
    let keepers = rankings.table(Position::Goalkeeper).unwrap();
    let first_keeper = keepers.row(1).unwrap();
    assert_eq!(first_keeper.web_name, "P1");
    assert_eq!(first_keeper.team_name, "Team 1");
}

#[test]
fn runs_are_reproducible() {
    let range = Some(GameweekRange::new(4, 5).unwrap());
    assert_eq!(run(range), run(range));
}

#[test]
fn lifecycle_events_are_reported() {
    let config = test_config();
    let season = SeasonJson::new().load(&config);
    let mut events: Vec<PipelineEvent> = Vec::new();
    pipeline::run(
        &season,
        Some(GameweekRange::new(4, 5).unwrap()),
        now(),
        &config,
        &mut events,
    )
    .unwrap();

    let trained = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::PositionTrained { .. }))
        .count();
    let predicted: Vec<(u32, Position)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::GameweekPredicted {
                gameweek, position, ..
            } => Some((*gameweek, *position)),
            _ => None,
        })
        .collect();
    assert_eq!(trained, 4);
    assert_eq!(predicted.len(), 8);
    assert_eq!(predicted[0], (4, Position::Goalkeeper));
    assert_eq!(predicted[1], (5, Position::Goalkeeper));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::RunCompleted { start: 4, end: 5 })
    );
}

#[test]
fn player_without_history_still_gets_a_prediction() {
    let config = test_config();
    let mut json = SeasonJson::new();
    // Player 24 is team 4's forward; the loader cannot fetch that history.
    json.histories.remove(&24);
    json.past.remove(&24);
    let season = json.load(&config);
    assert!(!season.past_points.contains_key(&24));

    let rankings =
        pipeline::run(&season, None, now(), &config, &mut NoopObserver).unwrap();
    let forwards = rankings.table(Position::Forward).unwrap();
    assert!(forwards.row(24).is_some());
    assert_eq!(forwards.rows.len(), 4);
}

#[test]
fn missing_team_column_aborts_the_run() {
    let config = test_config();
    let mut json = SeasonJson::new();
    for team in &mut json.teams {
        team.as_object_mut().unwrap().remove("strength_attack_home");
    }
    let season = json.load(&config);
    let err = pipeline::run(&season, None, now(), &config, &mut NoopObserver).unwrap_err();
    assert_eq!(
        err,
        PipelineError::Schema {
            table: "teams".to_string(),
            column: "strength_attack_home".to_string()
        }
    );
}

#[test]
fn season_over_without_range_is_an_error() {
    let config = test_config();
    let season = SeasonJson::new().load(&config);
    let late = chrono::DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let err = pipeline::run(&season, None, late, &config, &mut NoopObserver).unwrap_err();
    assert_eq!(err, PipelineError::UnknownGameweek);
}
