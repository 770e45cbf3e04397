use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use simreplay::config::Config;
use simreplay::engine::{EngineSnapshot, Notice, RunState, Simulator};
use simreplay::logging::{log, obj, v_num, v_str, Domain, Level};
use simreplay::source::http::HttpBackend;

fn print_progress(snap: &EngineSnapshot) {
    let Some(newest) = snap.recent.first() else {
        return;
    };
    let p = &newest.processed;
    println!(
        "{:>4}/{:<4} {} {} {:>3.0}%  T={:.1}C P={}hPa H={:.1}%  | pass {} fail {} avg {:.1}%",
        snap.cursor,
        snap.total_rows,
        p.row.sample_id(),
        p.prediction.as_str().to_uppercase(),
        p.confidence * 100.0,
        newest.sensor_data.temperature_c,
        newest.sensor_data.pressure_hpa,
        newest.sensor_data.humidity_pct,
        snap.stats.pass_count,
        snap.stats.fail_count,
        snap.stats.average_confidence,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("dataset_id", json!(cfg.dataset_id)),
            ("tick_ms", v_num(cfg.tick_ms as f64)),
            ("max_attempts", json!(cfg.max_attempts)),
        ]),
    );

    let backend = Arc::new(HttpBackend::new(&cfg));
    let mut sim = Simulator::spawn(cfg.engine(), backend.clone(), backend);
    let mut snapshots = sim.subscribe();
    let mut notices = sim.notices();

    sim.start().await?;

    let mut last_cursor = 0;
    let outcome: Result<EngineSnapshot> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break Err(anyhow!("interrupted"));
            }
            notice = notices.recv() => match notice {
                Ok(Notice::LoadFailed { error, .. }) => {
                    break Err(anyhow!("failed to load simulation data: {}", error));
                }
                Ok(Notice::PredictionFailed { sample_id, attempt, max_attempts, error, .. }) => {
                    eprintln!("[WARN] {} attempt {}/{} failed: {}", sample_id, attempt, max_attempts, error);
                }
                Ok(Notice::RowSkipped { sample_id, .. }) => {
                    eprintln!("[WARN] {} skipped", sample_id);
                }
                Ok(Notice::Completed { .. }) => {}
                Err(RecvError::Lagged(n)) => {
                    eprintln!("[WARN] dropped {} notices", n);
                }
                Err(RecvError::Closed) => break Err(anyhow!("engine stopped unexpectedly")),
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Err(anyhow!("engine stopped unexpectedly"));
                }
                let snap = snapshots.borrow_and_update().clone();
                if snap.stats.processed_count as usize + snap.skipped_count != last_cursor {
                    last_cursor = snap.stats.processed_count as usize + snap.skipped_count;
                    print_progress(&snap);
                }
                if snap.state == RunState::Completed {
                    break Ok(snap);
                }
            }
        }
    };

    sim.dispose().await;
    let snap = outcome?;
    println!(
        "completed: {} rows, {} processed, {} pass, {} fail, {} skipped, avg confidence {:.1}%",
        snap.total_rows,
        snap.stats.processed_count,
        snap.stats.pass_count,
        snap.stats.fail_count,
        snap.skipped_count,
        snap.stats.average_confidence,
    );
    Ok(())
}
