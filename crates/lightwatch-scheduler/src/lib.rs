//! # Lightwatch Scheduler
//!
//! Everything that runs on a timer: pulling published schedules, telling
//! subscribers when their groups' schedules change, warning them shortly
//! before a transition, and purging old records.
//!
//! ## Architecture
//! ```text
//! Scheduler (one tokio loop per job, shared shutdown signal)
//!   ├── RefreshJob        provider → store (today, next day)
//!   ├── ChangeNotifier    store → fingerprint diff → one message per subscriber
//!   ├── AdvanceNotifier   store → alert window → deduplicated notices
//!   └── CleanupJob        retention purge
//!
//! Store: SqliteStore (persistent) | MemoryStore (tests, dry runs)
//! ```

pub mod advance;
pub mod alerts;
pub mod changes;
pub mod diff;
pub mod engine;
pub mod jobs;
pub mod persistence;
pub mod render;
pub mod store;

#[cfg(test)]
mod testing;

pub use advance::AdvanceNotifier;
pub use alerts::{ActiveHours, AlertWindow};
pub use changes::{ChangeNotifier, CycleReport};
pub use engine::{Heartbeat, JobOutcome, Scheduler};
pub use jobs::{CleanupJob, Job, RefreshJob};
pub use persistence::SqliteStore;
pub use store::MemoryStore;
