//! Repository-backed adapters plugging tasks and events into the engine.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::materialize::EntityAdapter;
use crate::models::{Event, Task, TaskStatus};
use crate::recurrence::anchor_key;
use crate::repository::{EventRepository, TaskRepository};

/// The task row materialized for one occurrence of `template`: descriptive
/// fields copied, own identity, fresh pending lifecycle, no recurrence
/// columns.
pub(crate) fn build_task_instance(template: &Task, occurrence: DateTime<Utc>) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::now_v7(),
        owner: template.owner.clone(),
        title: template.title.clone(),
        description: template.description.clone(),
        priority: template.priority.clone(),
        project_id: template.project_id,
        status: TaskStatus::Pending,
        due_date: Some(occurrence),
        completed_at: None,
        reminder_sent: false,
        is_recurring: false,
        parent_id: Some(template.id),
        recurrence_pattern: None,
        recurrence_days: None,
        recurrence_end_date: None,
        recurrence_count: None,
        recurrence_mode: None,
        created_at: now,
        updated_at: now,
    }
}

/// A refresh-mode task advanced to its next occurrence: due date moved,
/// status reopened, completion and reminder state cleared.
pub(crate) fn roll_task_forward(template: &Task, next: DateTime<Utc>) -> Task {
    Task {
        due_date: Some(next),
        status: TaskStatus::Pending,
        completed_at: None,
        reminder_sent: false,
        updated_at: Utc::now(),
        ..template.clone()
    }
}

/// The event row materialized for one occurrence of `template`. The
/// template's start-to-end gap is preserved around the new start.
pub(crate) fn build_event_instance(template: &Event, occurrence: DateTime<Utc>) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::now_v7(),
        owner: template.owner.clone(),
        title: template.title.clone(),
        description: template.description.clone(),
        location: template.location.clone(),
        all_day: template.all_day,
        start_time: occurrence,
        end_time: occurrence + template.duration(),
        is_recurring: false,
        parent_id: Some(template.id),
        recurrence_pattern: None,
        recurrence_days: None,
        recurrence_end_date: None,
        recurrence_count: None,
        recurrence_mode: None,
        created_at: now,
        updated_at: now,
    }
}

/// A refresh-mode event advanced to its next occurrence, both ends shifted.
pub(crate) fn roll_event_forward(template: &Event, next: DateTime<Utc>) -> Event {
    Event {
        start_time: next,
        end_time: next + template.duration(),
        updated_at: Utc::now(),
        ..template.clone()
    }
}

/// Task-side adapter over any [`TaskRepository`].
#[derive(Clone)]
pub struct TaskAdapter<R> {
    repo: R,
}

impl<R> TaskAdapter<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R> EntityAdapter for TaskAdapter<R>
where
    R: TaskRepository + Send + Sync,
{
    type Record = Task;

    fn kind(&self) -> &'static str {
        "task"
    }

    async fn load_template(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        self.repo.find_task_by_id(id).await
    }

    async fn load_recurring_templates(&self) -> Result<Vec<Task>, CoreError> {
        self.repo.find_recurring_task_templates().await
    }

    async fn existing_instance_anchors(
        &self,
        template_id: Uuid,
    ) -> Result<HashSet<String>, CoreError> {
        let instances = self.repo.find_task_instances(template_id).await?;
        Ok(instances
            .iter()
            .filter_map(|instance| instance.due_date)
            .map(anchor_key)
            .collect())
    }

    fn build_instance(&self, template: &Task, occurrence: DateTime<Utc>) -> Task {
        build_task_instance(template, occurrence)
    }

    async fn persist_batch(&self, instances: Vec<Task>) -> Result<(), CoreError> {
        self.repo.insert_task_instances(&instances).await
    }

    fn is_open(&self, template: &Task) -> bool {
        template.status == TaskStatus::Pending
    }

    fn rolled_forward(&self, template: &Task, next: DateTime<Utc>) -> Task {
        roll_task_forward(template, next)
    }

    async fn persist_template(&self, template: &Task) -> Result<(), CoreError> {
        self.repo.replace_task(template).await
    }
}

/// Event-side adapter over any [`EventRepository`].
#[derive(Clone)]
pub struct EventAdapter<R> {
    repo: R,
}

impl<R> EventAdapter<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R> EntityAdapter for EventAdapter<R>
where
    R: EventRepository + Send + Sync,
{
    type Record = Event;

    fn kind(&self) -> &'static str {
        "event"
    }

    async fn load_template(&self, id: Uuid) -> Result<Option<Event>, CoreError> {
        self.repo.find_event_by_id(id).await
    }

    async fn load_recurring_templates(&self) -> Result<Vec<Event>, CoreError> {
        self.repo.find_recurring_event_templates().await
    }

    async fn existing_instance_anchors(
        &self,
        template_id: Uuid,
    ) -> Result<HashSet<String>, CoreError> {
        let instances = self.repo.find_event_instances(template_id).await?;
        Ok(instances
            .iter()
            .map(|instance| anchor_key(instance.start_time))
            .collect())
    }

    fn build_instance(&self, template: &Event, occurrence: DateTime<Utc>) -> Event {
        build_event_instance(template, occurrence)
    }

    async fn persist_batch(&self, instances: Vec<Event>) -> Result<(), CoreError> {
        self.repo.insert_event_instances(&instances).await
    }

    /// An event in the past only means the series is behind; there is no
    /// completion state to consult.
    fn is_open(&self, _template: &Event) -> bool {
        true
    }

    fn rolled_forward(&self, template: &Event, next: DateTime<Utc>) -> Event {
        roll_event_forward(template, next)
    }

    async fn persist_template(&self, template: &Event) -> Result<(), CoreError> {
        self.repo.replace_event(template).await
    }
}
