use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::logging::{
    log, log_prediction_failure, log_run_summary, log_tick, log_transition, obj, v_str, Domain,
    Level, ProfileScope,
};
use crate::source::{Predictor, RowSource};

use super::playback::{FailureOutcome, Playback};
use super::snapshot::{EngineSnapshot, Notice};
use super::state::{transition, RunEvent, RunState};

const NOTICE_BUFFER: usize = 64;

type Reply = oneshot::Sender<Result<(), EngineError>>;

enum Command {
    /// `Start`, `Stop` or `Restart` from the handle.
    Control(RunEvent, Reply),
    Dispose,
}

enum Wake {
    Command(Option<Command>),
    Tick,
}

/// Handle to a playback engine running on its own task.
///
/// All run state lives inside that task. Callers send commands and read
/// snapshots; nothing outside the task mutates the run.
pub struct Simulator {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    notices: broadcast::Sender<Notice>,
    task: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Spawns the engine task. Must be called inside a tokio runtime.
    pub fn spawn(cfg: EngineConfig, source: Arc<dyn RowSource>, predictor: Arc<dyn Predictor>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(EngineSnapshot::initial());
        let (notice_tx, _) = broadcast::channel(NOTICE_BUFFER);

        let runner = Runner {
            playback: Playback::new(&cfg),
            cfg,
            source,
            predictor,
            state: RunState::NotStarted,
            generation: 0,
            ticker: None,
            pending: None,
            snapshots: snap_tx,
            notices: notice_tx.clone(),
        };
        let task = tokio::spawn(runner.run(cmd_rx));

        Self {
            commands: cmd_tx,
            snapshots: snap_rx,
            notices: notice_tx,
            task: Some(task),
        }
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.request(RunEvent::Start).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.request(RunEvent::Stop).await
    }

    pub async fn restart(&self) -> Result<(), EngineError> {
        self.request(RunEvent::Restart).await
    }

    async fn request(&self, event: RunEvent) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Control(event, tx))
            .map_err(|_| EngineError::Disposed)?;
        rx.await.map_err(|_| EngineError::Disposed)?
    }

    /// Cancels the timer, discards any in-flight call and waits for the
    /// engine task to exit. Later commands fail with `Disposed`.
    pub async fn dispose(&mut self) {
        let _ = self.commands.send(Command::Dispose);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Resolves with the first published snapshot matching `pred`.
    pub async fn wait_for<F>(&self, pred: F) -> Result<EngineSnapshot, EngineError>
    where
        F: Fn(&EngineSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return Ok(current.clone());
                }
            }
            rx.changed().await.map_err(|_| EngineError::Disposed)?;
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Dispose);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Runner {
    cfg: EngineConfig,
    source: Arc<dyn RowSource>,
    predictor: Arc<dyn Predictor>,
    state: RunState,
    generation: u64,
    playback: Playback,
    /// Armed only while `Running`.
    ticker: Option<Interval>,
    /// A command that preempted an in-flight call.
    pending: Option<Command>,
    snapshots: watch::Sender<EngineSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl Runner {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = if let Some(cmd) = self.pending.take() {
                Wake::Command(Some(cmd))
            } else if let Some(ticker) = self.ticker.as_mut() {
                tokio::select! {
                    biased;
                    cmd = commands.recv() => Wake::Command(cmd),
                    _ = ticker.tick() => Wake::Tick,
                }
            } else {
                Wake::Command(commands.recv().await)
            };

            match wake {
                Wake::Tick => self.tick(&mut commands).await,
                Wake::Command(Some(Command::Dispose)) | Wake::Command(None) => break,
                Wake::Command(Some(Command::Control(event, reply))) => {
                    self.handle(event, reply, &mut commands).await
                }
            }
        }
        self.teardown();
    }

    async fn handle(&mut self, event: RunEvent, reply: Reply, commands: &mut mpsc::UnboundedReceiver<Command>) {
        match event {
            RunEvent::Start | RunEvent::Restart => self.begin(event, reply, commands).await,
            _ => {
                let from = self.state;
                let res = self.apply(event);
                if res.is_ok() && from == RunState::Running {
                    self.summarize();
                }
                let _ = reply.send(res);
            }
        }
    }

    /// Resets the run and loads rows. The reply goes out once the reset
    /// snapshot is published, before the load resolves.
    async fn begin(&mut self, event: RunEvent, reply: Reply, commands: &mut mpsc::UnboundedReceiver<Command>) {
        let from = self.state;
        let to = match transition(from, event) {
            Ok(to) => to,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        self.generation += 1;
        self.playback.reset();
        self.ticker = None;
        self.state = to;
        log_transition(self.generation, from, event, to);
        self.publish();
        let _ = reply.send(Ok(()));

        let source = Arc::clone(&self.source);
        let dataset_id = self.cfg.dataset_id;
        let Some(loaded) = self.drive(source.load_all(dataset_id), commands, "load").await else {
            return;
        };

        match loaded {
            Ok(rows) => {
                self.playback.load(rows);
                if self.apply(RunEvent::Loaded).is_ok() {
                    let period = self.cfg.tick;
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.ticker = Some(ticker);
                }
            }
            Err(e) => {
                log(
                    Level::Error,
                    Domain::Source,
                    "load_failed",
                    obj(&[
                        ("generation", json!(self.generation)),
                        ("dataset_id", json!(dataset_id)),
                        ("error", v_str(&e.to_string())),
                    ]),
                );
                let _ = self.apply(RunEvent::LoadFailed);
                self.notify(Notice::LoadFailed {
                    generation: self.generation,
                    error: e.to_string(),
                });
            }
        }
    }

    /// One row through the predictor, or completion if none remain.
    async fn tick(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) {
        let row = match self.playback.next_row() {
            Some(row) => row.clone(),
            None => {
                if self.apply(RunEvent::Exhausted).is_ok() {
                    self.summarize();
                    self.notify(Notice::Completed {
                        generation: self.generation,
                        stats: self.playback.stats(),
                    });
                }
                return;
            }
        };

        let predictor = Arc::clone(&self.predictor);
        let dataset_id = self.cfg.dataset_id;
        let scope = ProfileScope::new("engine", "predict_step");
        let call = predictor.predict_step(dataset_id, &row);
        let Some(result) = self.drive(call, commands, "predict").await else {
            return;
        };
        drop(scope);

        match result {
            Ok(prediction) => {
                if let Some(processed) = self.playback.commit(prediction, Utc::now()) {
                    log_tick(
                        self.generation,
                        &processed.row.sample_id(),
                        processed.prediction.as_str(),
                        processed.confidence,
                        self.playback.cursor(),
                        self.playback.total(),
                    );
                }
            }
            Err(e) => {
                let sample_id = row.sample_id();
                let max_attempts = self.playback.max_attempts();
                match self.playback.fail() {
                    FailureOutcome::Retry { attempt } => {
                        log_prediction_failure(self.generation, &sample_id, attempt, max_attempts, &e.to_string());
                        self.notify(Notice::PredictionFailed {
                            generation: self.generation,
                            sample_id,
                            attempt,
                            max_attempts,
                            error: e.to_string(),
                        });
                    }
                    FailureOutcome::Skipped { attempt } => {
                        log_prediction_failure(self.generation, &sample_id, attempt, max_attempts, &e.to_string());
                        log(
                            Level::Warn,
                            Domain::Engine,
                            "row_skipped",
                            obj(&[
                                ("generation", json!(self.generation)),
                                ("sample_id", v_str(&sample_id)),
                            ]),
                        );
                        self.notify(Notice::RowSkipped {
                            generation: self.generation,
                            sample_id,
                        });
                    }
                }
            }
        }
        self.publish();
    }

    /// Awaits an in-flight call while still serving commands.
    ///
    /// A command the current state rejects gets its error reply and the call
    /// keeps going. Any other command drops the call and is parked in
    /// `pending`; `None` is returned in that case.
    async fn drive<F: Future>(
        &mut self,
        call: F,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        during: &str,
    ) -> Option<F::Output> {
        tokio::pin!(call);
        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => {
                    if let Some(cmd) = self.screen(cmd.unwrap_or(Command::Dispose)) {
                        self.interrupt(cmd, during);
                        return None;
                    }
                }
                res = &mut call => return Some(res),
            }
        }
    }

    /// Answers a command that is illegal in the current state. Returns the
    /// command back if it would change the run.
    fn screen(&self, cmd: Command) -> Option<Command> {
        let Command::Control(event, reply) = cmd else {
            return Some(cmd);
        };
        match transition(self.state, event) {
            Ok(_) => Some(Command::Control(event, reply)),
            Err(e) => {
                log(
                    Level::Debug,
                    Domain::Engine,
                    "command_rejected",
                    obj(&[
                        ("generation", json!(self.generation)),
                        ("state", v_str(self.state.as_str())),
                        ("error", v_str(&e.to_string())),
                    ]),
                );
                let _ = reply.send(Err(e.into()));
                None
            }
        }
    }

    fn interrupt(&mut self, cmd: Command, during: &str) {
        log(
            Level::Debug,
            Domain::Engine,
            "in_flight_discarded",
            obj(&[
                ("generation", json!(self.generation)),
                ("during", v_str(during)),
            ]),
        );
        self.pending = Some(cmd);
    }

    fn apply(&mut self, event: RunEvent) -> Result<(), EngineError> {
        let from = self.state;
        let to = transition(from, event)?;
        self.state = to;
        if !to.is_ticking() {
            self.ticker = None;
        }
        if from != to {
            log_transition(self.generation, from, event, to);
            self.publish();
        }
        Ok(())
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(EngineSnapshot::capture(self.generation, self.state, &self.playback));
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn summarize(&self) {
        log_run_summary(
            self.generation,
            self.state,
            &self.playback.stats(),
            self.playback.skipped(),
            self.playback.total(),
        );
    }

    fn teardown(&mut self) {
        self.ticker = None;
        log(
            Level::Info,
            Domain::System,
            "disposed",
            obj(&[
                ("generation", json!(self.generation)),
                ("state", v_str(self.state.as_str())),
            ]),
        );
    }
}
