//! End-to-end playback runs against in-memory sources, on paused tokio time
//! so the one-second cadence runs instantly.

use std::sync::Arc;
use std::time::Duration;

use simreplay::config::EngineConfig;
use simreplay::engine::{EngineSnapshot, Notice, RunState, Simulator};
use simreplay::error::EngineError;
use simreplay::model::{Label, Prediction};
use simreplay::source::memory::{Scripted, ScriptedPredictor, VecRowSource};

fn cfg() -> EngineConfig {
    EngineConfig {
        seed: Some(5),
        ..EngineConfig::default()
    }
}

fn p(label: Label, confidence: f64) -> Prediction {
    Prediction::new(label, confidence).unwrap()
}

fn spawn(source: &Arc<VecRowSource>, predictor: &Arc<ScriptedPredictor>) -> Simulator {
    Simulator::spawn(cfg(), source.clone(), predictor.clone())
}

async fn run_to_completion(sim: &Simulator) -> EngineSnapshot {
    sim.wait_for(|s| s.state == RunState::Completed).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_three_row_scenario() {
    let source = Arc::new(VecRowSource::indexed(3));
    let predictor = Arc::new(ScriptedPredictor::answers(
        vec![p(Label::Pass, 0.9), p(Label::Fail, 0.4), p(Label::Pass, 0.8)],
        p(Label::Fail, 0.0),
    ));
    let sim = spawn(&source, &predictor);

    assert_eq!(sim.snapshot().state, RunState::NotStarted);
    sim.start().await.unwrap();
    let done = run_to_completion(&sim).await;

    assert_eq!(done.stats.processed_count, 3);
    assert_eq!(done.stats.pass_count, 2);
    assert_eq!(done.stats.fail_count, 1);
    assert!((done.stats.average_confidence - 70.0).abs() < 1e-9);
    assert_eq!(done.cursor, 3);
    assert_eq!(done.total_rows, 3);
    assert_eq!(predictor.seen(), vec![0, 1, 2]);

    let order: Vec<usize> = done.recent.iter().map(|r| r.processed.row.row_index).collect();
    assert_eq!(order, vec![2, 1, 0]);
    assert_eq!(done.chart.len(), 3);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_windows_and_counts_hold_on_every_snapshot() {
    let source = Arc::new(VecRowSource::indexed(35));
    let predictor = Arc::new(ScriptedPredictor::new(
        (0..35)
            .map(|i| {
                let label = if i % 4 == 0 { Label::Fail } else { Label::Pass };
                Scripted::Answer(p(label, 0.6))
            })
            .collect(),
        Scripted::Answer(p(Label::Pass, 0.6)),
    ));
    let sim = spawn(&source, &predictor);
    let mut rx = sim.subscribe();
    sim.start().await.unwrap();

    loop {
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert!(snap.chart.len() <= 20);
        assert!(snap.recent.len() <= 10);
        assert_eq!(snap.stats.pass_count + snap.stats.fail_count, snap.stats.processed_count);
        if snap.state == RunState::Completed {
            assert_eq!(snap.stats.processed_count, 35);
            assert_eq!(snap.chart.len(), 20);
            assert_eq!(snap.recent.len(), 10);
            assert_eq!(snap.recent[0].processed.row.row_index, 34);
            assert_eq!(snap.recent[9].processed.row.row_index, 25);
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_dataset_completes_on_first_tick() {
    let source = Arc::new(VecRowSource::indexed(0));
    let predictor = Arc::new(ScriptedPredictor::constant(p(Label::Pass, 1.0)));
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    let running = sim.wait_for(|s| s.state == RunState::Running).await.unwrap();
    assert_eq!(running.total_rows, 0);

    let done = run_to_completion(&sim).await;
    assert_eq!(done.stats, Default::default());
    assert!(done.chart.is_empty());
    assert!(done.recent.is_empty());
    assert_eq!(done.progress(), 1.0);
    assert_eq!(predictor.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_returns_to_not_started() {
    let source = Arc::new(VecRowSource::failing("backend down"));
    let predictor = Arc::new(ScriptedPredictor::constant(p(Label::Pass, 1.0)));
    let sim = spawn(&source, &predictor);
    let mut notices = sim.notices();

    sim.start().await.unwrap();
    let notice = notices.recv().await.unwrap();
    assert!(matches!(notice, Notice::LoadFailed { generation: 1, .. }));

    let snap = sim.wait_for(|s| s.state == RunState::NotStarted).await.unwrap();
    assert_eq!(snap.generation, 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(predictor.calls(), 0);

    // the user may try again
    sim.start().await.unwrap();
    assert!(matches!(notices.recv().await.unwrap(), Notice::LoadFailed { generation: 2, .. }));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_before_first_tick() {
    let source = Arc::new(VecRowSource::indexed(4));
    let predictor = Arc::new(ScriptedPredictor::constant(p(Label::Fail, 0.5)));
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    let first = run_to_completion(&sim).await;
    assert_eq!(first.stats.fail_count, 4);
    assert_eq!(first.generation, 1);

    sim.restart().await.unwrap();
    let fresh = sim.snapshot();
    assert_eq!(fresh.generation, 2);
    assert_eq!(fresh.stats, Default::default());
    assert!(fresh.chart.is_empty());
    assert!(fresh.recent.is_empty());
    assert_eq!(fresh.cursor, 0);
    assert_eq!(predictor.calls(), 4);

    let second = run_to_completion(&sim).await;
    assert_eq!(second.generation, 2);
    assert_eq!(second.stats.processed_count, 4);
    assert_eq!(predictor.seen(), vec![0, 1, 2, 3, 0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_row_is_retried_then_skipped() {
    let source = Arc::new(VecRowSource::indexed(3));
    let predictor = Arc::new(ScriptedPredictor::new(
        vec![
            Scripted::Fail("timeout".to_string()),
            Scripted::Answer(p(Label::Pass, 0.9)),
            Scripted::Fail("500".to_string()),
            Scripted::Fail("500".to_string()),
            Scripted::Fail("500".to_string()),
        ],
        Scripted::Answer(p(Label::Fail, 0.3)),
    ));
    let sim = spawn(&source, &predictor);
    let mut notices = sim.notices();

    sim.start().await.unwrap();
    let done = run_to_completion(&sim).await;

    // row 0 recovered on its second attempt, row 1 skipped after three
    assert_eq!(predictor.seen(), vec![0, 0, 1, 1, 1, 2]);
    assert_eq!(done.stats.processed_count, 2);
    assert_eq!(done.skipped_count, 1);
    assert_eq!(done.stats.pass_count, 1);
    assert_eq!(done.stats.fail_count, 1);
    let indices: Vec<usize> = done.recent.iter().map(|r| r.processed.row.row_index).collect();
    assert_eq!(indices, vec![2, 0]);

    let mut failed = 0;
    let mut skipped = Vec::new();
    while let Ok(n) = notices.try_recv() {
        match n {
            Notice::PredictionFailed { .. } => failed += 1,
            Notice::RowSkipped { sample_id, .. } => skipped.push(sample_id),
            _ => {}
        }
    }
    assert_eq!(failed, 3);
    assert_eq!(skipped, vec!["SAMPLE_002".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_predictor_keeps_rows_in_order() {
    let source = Arc::new(VecRowSource::indexed(5));
    let predictor = Arc::new(
        ScriptedPredictor::constant(p(Label::Pass, 0.8)).with_latency(Duration::from_millis(2500)),
    );
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    let done = run_to_completion(&sim).await;

    assert_eq!(predictor.calls(), 5);
    assert_eq!(predictor.seen(), vec![0, 1, 2, 3, 4]);
    let indices: Vec<usize> = done.recent.iter().map(|r| r.processed.row.row_index).collect();
    assert_eq!(indices, vec![4, 3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_prediction() {
    let source = Arc::new(VecRowSource::indexed(10));
    let predictor = Arc::new(
        ScriptedPredictor::constant(p(Label::Pass, 0.9)).with_latency(Duration::from_millis(500)),
    );
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    sim.wait_for(|s| s.stats.processed_count == 1).await.unwrap();

    // second call starts at t=2s and would resolve at t=2.5s
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(predictor.calls(), 2);
    sim.stop().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let snap = sim.snapshot();
    assert_eq!(snap.state, RunState::Stopped);
    assert_eq!(snap.stats.processed_count, 1);
    assert_eq!(snap.cursor, 1);
    assert_eq!(predictor.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_start_leaves_in_flight_prediction_running() {
    let source = Arc::new(VecRowSource::indexed(3));
    let predictor = Arc::new(
        ScriptedPredictor::constant(p(Label::Pass, 0.9)).with_latency(Duration::from_millis(500)),
    );
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    sim.wait_for(|s| s.stats.processed_count == 1).await.unwrap();

    // row 1 is in flight between t=2s and t=2.5s
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(predictor.calls(), 2);
    assert!(matches!(sim.start().await, Err(EngineError::Transition(_))));

    let done = run_to_completion(&sim).await;
    assert_eq!(predictor.seen(), vec![0, 1, 2]);
    assert_eq!(done.stats.processed_count, 3);
    assert_eq!(done.generation, 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_rejected_starts_do_not_stall_the_run() {
    let source = Arc::new(VecRowSource::indexed(5));
    let predictor = Arc::new(
        ScriptedPredictor::constant(p(Label::Fail, 0.6)).with_latency(Duration::from_millis(500)),
    );
    let sim = spawn(&source, &predictor);
    sim.start().await.unwrap();

    let done = loop {
        tokio::time::sleep(Duration::from_millis(400)).await;
        let snap = sim.snapshot();
        if snap.state == RunState::Completed {
            break snap;
        }
        assert!(matches!(sim.start().await, Err(EngineError::Transition(_))));
    };

    assert_eq!(done.stats.processed_count, 5);
    assert_eq!(predictor.calls(), 5);
    assert_eq!(predictor.seen(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_timer() {
    let source = Arc::new(VecRowSource::indexed(50));
    let predictor = Arc::new(ScriptedPredictor::constant(p(Label::Pass, 0.9)));
    let mut sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    sim.wait_for(|s| s.stats.processed_count == 2).await.unwrap();
    sim.dispose().await;
    assert!(sim.is_disposed());

    let calls = predictor.calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(predictor.calls(), calls);

    assert_eq!(sim.start().await, Err(EngineError::Disposed));
    assert_eq!(sim.snapshot().stats.processed_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let source = Arc::new(VecRowSource::indexed(5));
    let predictor = Arc::new(ScriptedPredictor::constant(p(Label::Pass, 0.9)));
    let sim = spawn(&source, &predictor);

    sim.start().await.unwrap();
    sim.wait_for(|s| s.state == RunState::Running).await.unwrap();
    assert!(matches!(sim.start().await, Err(EngineError::Transition(_))));

    // a stopped run can be started again from the first row
    sim.stop().await.unwrap();
    sim.start().await.unwrap();
    let done = run_to_completion(&sim).await;
    assert_eq!(done.generation, 2);
    assert_eq!(done.stats.processed_count, 5);
}
