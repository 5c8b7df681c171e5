use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    Event, EventChanges, NewEvent, NewTask, RecurrenceMode, RecurrencePattern, Task, TaskChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod events;
pub mod tasks;

// Traits are defined in this module and implemented in the domain modules.

/// Domain-specific trait for task storage.
#[async_trait]
pub trait TaskRepository {
    async fn create_task(&self, data: NewTask) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks_by_owner(&self, owner: &str) -> Result<Vec<Task>, CoreError>;
    /// One owner's tasks with a due date in `[from, to)`.
    async fn find_tasks_due_between(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, CoreError>;
    /// Every recurring template, all owners, ordered by owner.
    async fn find_recurring_task_templates(&self) -> Result<Vec<Task>, CoreError>;
    /// Materialized instances of one template, ordered by due date.
    async fn find_task_instances(&self, parent_id: Uuid) -> Result<Vec<Task>, CoreError>;
    /// Inserts pre-built instance rows in one transaction.
    async fn insert_task_instances(&self, instances: &[Task]) -> Result<(), CoreError>;
    async fn update_task(&self, id: Uuid, changes: TaskChanges) -> Result<Task, CoreError>;
    /// Applies `changes` to every instance of a template, returning how many
    /// rows were touched. Callers are expected to strip recurrence fields
    /// first; this method applies exactly what it is given.
    async fn update_task_instances(
        &self,
        parent_id: Uuid,
        changes: TaskChanges,
    ) -> Result<u64, CoreError>;
    /// Writes a full row back over the stored one, keyed by `task.id`.
    async fn replace_task(&self, task: &Task) -> Result<(), CoreError>;
    /// Deletes a task; a template takes its materialized instances with it.
    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for event storage.
#[async_trait]
pub trait EventRepository {
    async fn create_event(&self, data: NewEvent) -> Result<Event, CoreError>;
    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError>;
    async fn find_events_by_owner(&self, owner: &str) -> Result<Vec<Event>, CoreError>;
    /// One owner's events starting in `[from, to)`.
    async fn find_events_between(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError>;
    /// Recurring event templates only; instance rows never qualify even if
    /// flagged recurring by an earlier writer.
    async fn find_recurring_event_templates(&self) -> Result<Vec<Event>, CoreError>;
    async fn find_event_instances(&self, parent_id: Uuid) -> Result<Vec<Event>, CoreError>;
    async fn insert_event_instances(&self, instances: &[Event]) -> Result<(), CoreError>;
    async fn update_event(&self, id: Uuid, changes: EventChanges) -> Result<Event, CoreError>;
    async fn update_event_instances(
        &self,
        parent_id: Uuid,
        changes: EventChanges,
    ) -> Result<u64, CoreError>;
    async fn replace_event(&self, event: &Event) -> Result<(), CoreError>;
    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Main repository trait composing the domain traits.
#[async_trait]
pub trait Repository: TaskRepository + EventRepository {}

/// SQLite implementation of the repository pattern.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Pool reference for the domain modules.
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteStore {}

/// Parse-checks raw recurrence strings arriving through an update. Values
/// already stored by other writers are tolerated at read time; new ones are
/// not.
pub(crate) fn validate_recurrence_strings(
    pattern: Option<&Option<String>>,
    mode: Option<&Option<String>>,
) -> Result<(), CoreError> {
    if let Some(Some(raw)) = pattern {
        raw.parse::<RecurrencePattern>()
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
    }
    if let Some(Some(raw)) = mode {
        raw.parse::<RecurrenceMode>()
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
    }
    Ok(())
}

/// Rejects a mode change once a template has one. A template created
/// without a mode may gain one later.
pub(crate) fn ensure_mode_unchanged(
    existing: Option<&str>,
    incoming: Option<&Option<String>>,
) -> Result<(), CoreError> {
    if let (Some(current), Some(requested)) = (existing, incoming) {
        if requested.as_deref() != Some(current) {
            return Err(CoreError::InvalidInput(format!(
                "Recurrence mode is fixed once set (currently '{}')",
                current
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurrence_strings_must_parse_when_present() {
        assert!(validate_recurrence_strings(Some(&Some("daily".to_string())), None).is_ok());
        assert!(validate_recurrence_strings(None, Some(&Some("clone".to_string()))).is_ok());
        assert!(validate_recurrence_strings(Some(&Some("hourly".to_string())), None).is_err());
        assert!(validate_recurrence_strings(None, Some(&Some("mirror".to_string()))).is_err());
        // Clearing a column is not a parse.
        assert!(validate_recurrence_strings(Some(&None), Some(&None)).is_ok());
    }

    #[test]
    fn mode_can_be_set_once_and_restated_but_not_changed() {
        assert!(ensure_mode_unchanged(None, Some(&Some("clone".to_string()))).is_ok());
        assert!(ensure_mode_unchanged(Some("clone"), Some(&Some("clone".to_string()))).is_ok());
        assert!(ensure_mode_unchanged(Some("clone"), Some(&Some("refresh".to_string()))).is_err());
        assert!(ensure_mode_unchanged(Some("clone"), Some(&None)).is_err());
        assert!(ensure_mode_unchanged(Some("clone"), None).is_ok());
    }
}
