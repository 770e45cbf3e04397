//! Streaming playback engine.
//!
//! ```text
//! ┌──────────────┐ rows  ┌──────────────┐ row   ┌──────────────┐
//! │  RowSource   │──────►│   Playback   │──────►│  Predictor   │
//! │ (load once)  │       │ (cursor)     │◄──────│ (1 per tick) │
//! └──────────────┘       └──────────────┘ label └──────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼                               ▼
//!      ┌──────────────┐                ┌──────────────┐
//!      │ Aggregation  │                │ WindowStore  │
//!      │ (counters)   │                │ (chart/rows) │
//!      └──────────────┘                └──────────────┘
//!              └───────────┬───────────────────┘
//!                          ▼
//!                  EngineSnapshot (watch)
//! ```
//!
//! One task owns the run. A fixed-period timer drives ticks; each tick
//! awaits its prediction before the next can fire, so rows are folded in
//! dataset order. Stop, restart and dispose drop any in-flight call
//! unresolved. A command the current state rejects is answered without
//! touching the call.

pub mod playback;
pub mod scheduler;
pub mod snapshot;
pub mod state;

pub use playback::{FailureOutcome, Playback};
pub use scheduler::Simulator;
pub use snapshot::{EngineSnapshot, Notice};
pub use state::{transition, RunEvent, RunState};
