//! # Cadence Core
//!
//! The recurrence engine of a personal productivity application: computes
//! occurrences of repeating tasks and calendar events, materializes concrete
//! instances ahead of time, rolls overdue templates forward, and keeps
//! already-materialized instances in sync with template edits.
//!
//! ## Features
//!
//! - **Occurrence calculation**: daily, weekly (optionally pinned to named
//!   weekdays), monthly, and yearly patterns with end-date bounds
//! - **Idempotent materialization**: instances are deduplicated by anchor
//!   date, so repeated runs never double-create
//! - **Two lifecycles**: "clone" templates get future instances created
//!   within a lookahead window; "refresh" templates are rolled forward in
//!   place once overdue
//! - **Edit propagation**: descriptive template edits fan out to instances,
//!   recurrence-definition fields never do
//! - **Background sweeps**: a scheduler-owned periodic run across all
//!   recurring templates with per-template fault isolation
//!
//! ## Core Modules
//!
//! - [`db`]: database connection and migration management
//! - [`models`]: row types, enums, and change sets
//! - [`repository`]: data access layer with the Repository pattern
//! - [`recurrence`]: the pure occurrence calculator
//! - [`materialize`]: the generic instance materializer and entity adapter
//! - [`adapters`]: task and event adapters over the repositories
//! - [`lifecycle`]: clone/refresh dispatch and roll-forward
//! - [`propagate`]: template-edit fan-out to instances
//! - [`runner`]: the batch sweep and its scheduler
//! - [`clock`]: injectable time source
//! - [`config`]: file/environment configuration
//! - [`error`]: error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cadence_core::adapters::{EventAdapter, TaskAdapter};
//! use cadence_core::clock::{SharedClock, SystemClock};
//! use cadence_core::config::EngineConfig;
//! use cadence_core::error::CoreError;
//! use cadence_core::lifecycle::LifecycleController;
//! use cadence_core::materialize::Materializer;
//! use cadence_core::models::{NewRecurrence, NewTask, RecurrenceMode, RecurrencePattern};
//! use cadence_core::repository::{SqliteStore, TaskRepository};
//! use cadence_core::runner::{RecurrenceRunner, SweepScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CoreError> {
//!     let config = EngineConfig::load().unwrap_or_default();
//!     let pool = cadence_core::db::establish_connection(&config.database_path).await?;
//!     let store = SqliteStore::new(pool);
//!     let clock = Arc::new(SystemClock) as SharedClock;
//!
//!     // A template that waters the plants daily, ten occurrences total.
//!     let template = store
//!         .create_task(NewTask {
//!             owner: "ada".to_string(),
//!             title: "Water the plants".to_string(),
//!             due_date: Some(chrono::Utc::now()),
//!             recurrence: Some(NewRecurrence {
//!                 pattern: RecurrencePattern::Daily,
//!                 days: None,
//!                 end_date: None,
//!                 count: Some(10),
//!                 mode: RecurrenceMode::Clone,
//!             }),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("created template {}", template.id);
//!
//!     let tasks = LifecycleController::new(Materializer::with_settings(
//!         TaskAdapter::new(store.clone()),
//!         clock.clone(),
//!         &config.recurrence,
//!     ));
//!     let events = LifecycleController::new(Materializer::with_settings(
//!         EventAdapter::new(store.clone()),
//!         clock,
//!         &config.recurrence,
//!     ));
//!     let runner = Arc::new(RecurrenceRunner::new(tasks, events));
//!
//!     let scheduler = SweepScheduler::start(
//!         runner,
//!         Duration::from_secs(60 * config.recurrence.sweep_interval_minutes),
//!     );
//!     // ... application runs ...
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod materialize;
pub mod models;
pub mod propagate;
pub mod recurrence;
pub mod repository;
pub mod runner;
