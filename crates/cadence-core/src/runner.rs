//! Periodic sweep across all recurring templates.
//!
//! The runner is the one place where a per-template failure turns into a
//! logged-and-counted outcome instead of an early return; everything below
//! it propagates errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle::{LifecycleController, TemplateOutcome};
use crate::materialize::EntityAdapter;
use crate::recurrence::Recurring;

/// Statistics collected by one full sweep.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Recurring task templates examined
    pub tasks_processed: usize,
    /// Recurring event templates examined
    pub events_processed: usize,
    /// Instances created across both sweeps
    pub instances_created: usize,
    /// Refresh-mode templates advanced in place
    pub templates_rolled_forward: usize,
    /// Templates whose processing failed
    pub failures: usize,
    /// Detailed error messages
    pub errors: Vec<String>,
    /// Time taken for the sweep
    pub duration_ms: u64,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            tasks_processed: 0,
            events_processed: 0,
            instances_created: 0,
            templates_rolled_forward: 0,
            failures: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Default)]
struct SweepStats {
    processed: usize,
    created: usize,
    rolled_forward: usize,
    failures: usize,
    errors: Vec<String>,
}

/// Sweeps every recurring task and event template through its lifecycle.
pub struct RecurrenceRunner<T: EntityAdapter, E: EntityAdapter> {
    tasks: LifecycleController<T>,
    events: LifecycleController<E>,
}

impl<T, E> RecurrenceRunner<T, E>
where
    T: EntityAdapter,
    E: EntityAdapter,
{
    pub fn new(tasks: LifecycleController<T>, events: LifecycleController<E>) -> Self {
        Self { tasks, events }
    }

    /// Processes every recurring template once. The task and event sweeps
    /// run concurrently; within a sweep templates go one at a time and a
    /// failure is recorded without aborting the rest.
    pub async fn process_all_recurring(&self) -> RunSummary {
        let started = Instant::now();

        let (task_stats, event_stats) =
            tokio::join!(sweep(&self.tasks), sweep(&self.events));

        let mut summary = RunSummary {
            tasks_processed: task_stats.processed,
            events_processed: event_stats.processed,
            instances_created: task_stats.created + event_stats.created,
            templates_rolled_forward: task_stats.rolled_forward + event_stats.rolled_forward,
            failures: task_stats.failures + event_stats.failures,
            errors: task_stats.errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        summary.errors.extend(event_stats.errors);

        info!(
            tasks = summary.tasks_processed,
            events = summary.events_processed,
            created = summary.instances_created,
            rolled_forward = summary.templates_rolled_forward,
            failures = summary.failures,
            duration_ms = summary.duration_ms,
            "recurrence sweep finished"
        );
        summary
    }
}

async fn sweep<A: EntityAdapter>(controller: &LifecycleController<A>) -> SweepStats {
    let adapter = controller.materializer().adapter();
    let mut stats = SweepStats::default();

    let templates = match adapter.load_recurring_templates().await {
        Ok(templates) => templates,
        Err(error) => {
            warn!(kind = adapter.kind(), %error, "failed to enumerate recurring templates");
            stats.failures += 1;
            stats.errors.push(format!("{} sweep: {}", adapter.kind(), error));
            return stats;
        }
    };

    for template in &templates {
        stats.processed += 1;
        match controller.process_template(template).await {
            Ok(TemplateOutcome::Materialized(created)) => stats.created += created,
            Ok(TemplateOutcome::RolledForward) => stats.rolled_forward += 1,
            Ok(TemplateOutcome::Unchanged) => {}
            Err(error) => {
                warn!(
                    kind = adapter.kind(),
                    template_id = %template.id(),
                    %error,
                    "template processing failed"
                );
                stats.failures += 1;
                stats
                    .errors
                    .push(format!("{} {}: {}", adapter.kind(), template.id(), error));
            }
        }
    }
    stats
}

/// Spawns and owns the periodic sweep task.
pub struct SweepScheduler;

impl SweepScheduler {
    /// Starts the sweep loop. The first tick fires immediately, so starting
    /// the scheduler also runs one eager sweep. Returns a handle for
    /// graceful shutdown.
    pub fn start<T, E>(runner: Arc<RecurrenceRunner<T, E>>, every: Duration) -> SchedulerHandle
    where
        T: EntityAdapter + 'static,
        E: EntityAdapter + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        // tokio's interval panics on a zero period.
        let period = if every.is_zero() { Duration::from_secs(1) } else { every };

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("recurrence scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        runner.process_all_recurring().await;
                    }
                }
            }
        });

        info!(interval_secs = period.as_secs(), "recurrence scheduler started");
        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the loop and waits for it to exit. A sweep in flight
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{build_task_instance, roll_task_forward};
    use crate::clock::{FrozenClock, SharedClock};
    use crate::error::CoreError;
    use crate::materialize::Materializer;
    use crate::models::{Task, TaskStatus};
    use crate::recurrence::anchor_key;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Vec-backed adapter; clones share storage so tests can inspect what
    /// the runner wrote.
    #[derive(Clone, Default)]
    struct MemoryAdapter {
        templates: Arc<Mutex<Vec<Task>>>,
        instances: Arc<Mutex<Vec<Task>>>,
        fail_persist_for: Arc<Mutex<HashSet<Uuid>>>,
    }

    impl MemoryAdapter {
        fn insert_template(&self, task: Task) -> Uuid {
            let id = task.id;
            self.templates.lock().unwrap().push(task);
            id
        }

        fn template(&self, id: Uuid) -> Task {
            self.templates
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .unwrap()
        }

        fn instances_of(&self, id: Uuid) -> Vec<Task> {
            self.instances
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.parent_id == Some(id))
                .cloned()
                .collect()
        }

        fn fail_persist(&self, id: Uuid) {
            self.fail_persist_for.lock().unwrap().insert(id);
        }
    }

    #[async_trait::async_trait]
    impl EntityAdapter for MemoryAdapter {
        type Record = Task;

        fn kind(&self) -> &'static str {
            "task"
        }

        async fn load_template(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
            Ok(self
                .templates
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned())
        }

        async fn load_recurring_templates(&self) -> Result<Vec<Task>, CoreError> {
            Ok(self
                .templates
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.is_recurring)
                .cloned()
                .collect())
        }

        async fn existing_instance_anchors(
            &self,
            template_id: Uuid,
        ) -> Result<HashSet<String>, CoreError> {
            Ok(self
                .instances
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.parent_id == Some(template_id))
                .filter_map(|t| t.due_date)
                .map(anchor_key)
                .collect())
        }

        fn build_instance(&self, template: &Task, occurrence: DateTime<Utc>) -> Task {
            build_task_instance(template, occurrence)
        }

        async fn persist_batch(&self, batch: Vec<Task>) -> Result<(), CoreError> {
            let should_fail = {
                let failing = self.fail_persist_for.lock().unwrap();
                batch
                    .iter()
                    .any(|t| t.parent_id.is_some_and(|p| failing.contains(&p)))
            };
            if should_fail {
                return Err(CoreError::Io(std::io::Error::other(
                    "simulated write failure",
                )));
            }
            self.instances.lock().unwrap().extend(batch);
            Ok(())
        }

        fn is_open(&self, template: &Task) -> bool {
            template.status == TaskStatus::Pending
        }

        fn rolled_forward(&self, template: &Task, next: DateTime<Utc>) -> Task {
            roll_task_forward(template, next)
        }

        async fn persist_template(&self, template: &Task) -> Result<(), CoreError> {
            if self.fail_persist_for.lock().unwrap().contains(&template.id) {
                return Err(CoreError::Io(std::io::Error::other(
                    "simulated write failure",
                )));
            }
            let mut templates = self.templates.lock().unwrap();
            if let Some(slot) = templates.iter_mut().find(|t| t.id == template.id) {
                *slot = template.clone();
            }
            Ok(())
        }
    }

    fn frozen_monday() -> (SharedClock, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        (Arc::new(FrozenClock::new(now)) as SharedClock, now)
    }

    fn daily_template(mode: &str, due: DateTime<Utc>) -> Task {
        Task {
            owner: "ada".to_string(),
            title: "water the plants".to_string(),
            is_recurring: true,
            due_date: Some(due),
            recurrence_pattern: Some("daily".to_string()),
            recurrence_mode: Some(mode.to_string()),
            ..Default::default()
        }
    }

    fn runner_over(
        adapter: MemoryAdapter,
        clock: SharedClock,
    ) -> RecurrenceRunner<MemoryAdapter, MemoryAdapter> {
        let events = MemoryAdapter::default();
        RecurrenceRunner::new(
            LifecycleController::new(Materializer::new(adapter, clock.clone())),
            LifecycleController::new(Materializer::new(events, clock)),
        )
    }

    // 30-day window from 2025-03-10T09:00 with a daily pattern: occurrences
    // 03-11 through 04-08 qualify, 04-09T09:00 hits the window end exactly
    // and is excluded.
    const DAILY_INSTANCES_IN_WINDOW: usize = 29;

    #[tokio::test]
    async fn sweep_handles_clone_refresh_and_unknown_modes_together() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let clone_id = adapter.insert_template(daily_template("clone", now));
        let refresh_id =
            adapter.insert_template(daily_template("refresh", now - ChronoDuration::days(2)));
        let odd_id = adapter.insert_template(daily_template("mirror", now));

        let runner = runner_over(adapter.clone(), clock);
        let summary = runner.process_all_recurring().await;

        assert_eq!(summary.tasks_processed, 3);
        assert_eq!(summary.events_processed, 0);
        assert_eq!(summary.instances_created, DAILY_INSTANCES_IN_WINDOW);
        assert_eq!(summary.templates_rolled_forward, 1);
        assert_eq!(summary.failures, 0);
        assert!(summary.errors.is_empty());

        assert_eq!(adapter.instances_of(clone_id).len(), DAILY_INSTANCES_IN_WINDOW);
        assert!(adapter.instances_of(odd_id).is_empty());
        let rolled = adapter.template(refresh_id);
        assert_eq!(rolled.due_date, Some(now - ChronoDuration::days(1)));
        assert_eq!(rolled.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let clone_id = adapter.insert_template(daily_template("clone", now));

        let runner = runner_over(adapter.clone(), clock);
        let first = runner.process_all_recurring().await;
        let second = runner.process_all_recurring().await;

        assert_eq!(first.instances_created, DAILY_INSTANCES_IN_WINDOW);
        assert_eq!(second.instances_created, 0);
        assert_eq!(adapter.instances_of(clone_id).len(), DAILY_INSTANCES_IN_WINDOW);
    }

    #[tokio::test]
    async fn refresh_advances_one_period_per_sweep_until_current() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let id = adapter.insert_template(daily_template("refresh", now - ChronoDuration::days(2)));

        let runner = runner_over(adapter.clone(), clock);

        let first = runner.process_all_recurring().await;
        assert_eq!(first.templates_rolled_forward, 1);
        assert_eq!(
            adapter.template(id).due_date,
            Some(now - ChronoDuration::days(1))
        );

        let second = runner.process_all_recurring().await;
        assert_eq!(second.templates_rolled_forward, 1);
        assert_eq!(adapter.template(id).due_date, Some(now));

        // Anchored today; nothing left to catch up.
        let third = runner.process_all_recurring().await;
        assert_eq!(third.templates_rolled_forward, 0);
        assert_eq!(adapter.template(id).due_date, Some(now));
    }

    #[tokio::test]
    async fn completed_refresh_template_stays_put() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let mut template = daily_template("refresh", now - ChronoDuration::days(2));
        template.status = TaskStatus::Completed;
        let id = adapter.insert_template(template);

        let runner = runner_over(adapter.clone(), clock);
        let summary = runner.process_all_recurring().await;

        assert_eq!(summary.templates_rolled_forward, 0);
        assert_eq!(
            adapter.template(id).due_date,
            Some(now - ChronoDuration::days(2))
        );
    }

    #[tokio::test]
    async fn failing_template_does_not_block_the_rest_of_the_sweep() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let failing = adapter.insert_template(daily_template("clone", now));
        let healthy = adapter.insert_template(daily_template("clone", now));
        adapter.fail_persist(failing);

        let runner = runner_over(adapter.clone(), clock);
        let summary = runner.process_all_recurring().await;

        assert_eq!(summary.tasks_processed, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains(&failing.to_string()));
        assert!(adapter.instances_of(failing).is_empty());
        assert_eq!(adapter.instances_of(healthy).len(), DAILY_INSTANCES_IN_WINDOW);
        assert_eq!(summary.instances_created, DAILY_INSTANCES_IN_WINDOW);
    }

    #[tokio::test]
    async fn scheduler_runs_eagerly_and_shuts_down_cleanly() {
        let (clock, now) = frozen_monday();
        let adapter = MemoryAdapter::default();
        let id = adapter.insert_template(daily_template("clone", now));
        let runner = Arc::new(runner_over(adapter.clone(), clock));

        let handle = SweepScheduler::start(runner, Duration::from_secs(3600));
        for _ in 0..100 {
            if !adapter.instances_of(id).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        assert_eq!(adapter.instances_of(id).len(), DAILY_INSTANCES_IN_WINDOW);
    }
}
