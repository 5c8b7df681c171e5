//! Fan-out of template edits to already-materialized instances.
//!
//! A pure field-sync: recurrence-definition fields are stripped from the
//! change set, the remainder is applied to every row whose `parent_id` is
//! the template, and the affected row count comes back. No instance is
//! created, deleted, or re-evaluated here.

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{EventChanges, TaskChanges};
use crate::repository::{EventRepository, TaskRepository};

/// Applies a task template edit to all of its instances. An edit that is
/// all recurrence fields strips down to nothing and performs no write.
pub async fn propagate_task_edit<R>(
    repo: &R,
    template_id: Uuid,
    changes: TaskChanges,
) -> Result<u64, CoreError>
where
    R: TaskRepository + ?Sized,
{
    let stripped = changes.stripped_of_recurrence();
    if stripped.is_empty() {
        return Ok(0);
    }
    let affected = repo.update_task_instances(template_id, stripped).await?;
    tracing::debug!(%template_id, affected, "propagated task edit to instances");
    Ok(affected)
}

/// Event twin of [`propagate_task_edit`].
pub async fn propagate_event_edit<R>(
    repo: &R,
    template_id: Uuid,
    changes: EventChanges,
) -> Result<u64, CoreError>
where
    R: EventRepository + ?Sized,
{
    let stripped = changes.stripped_of_recurrence();
    if stripped.is_empty() {
        return Ok(0);
    }
    let affected = repo.update_event_instances(template_id, stripped).await?;
    tracing::debug!(%template_id, affected, "propagated event edit to instances");
    Ok(affected)
}
