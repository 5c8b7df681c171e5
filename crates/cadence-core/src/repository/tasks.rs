use crate::error::CoreError;
use crate::models::{NewTask, Task, TaskChanges, TaskPriority, TaskStatus};
use crate::repository::{ensure_mode_unchanged, validate_recurrence_strings, SqliteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::TaskRepository for SqliteStore {
    async fn create_task(&self, data: NewTask) -> Result<Task, CoreError> {
        if data.recurrence.is_some() && data.parent_id.is_some() {
            return Err(CoreError::InvalidInput(
                "A recurring template cannot itself have a parent".to_string(),
            ));
        }
        if let Some(recurrence) = &data.recurrence {
            if recurrence.count.is_some_and(|c| c < 0) {
                return Err(CoreError::InvalidInput(
                    "Recurrence count cannot be negative".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let recurrence = data.recurrence;
        let task = Task {
            id: Uuid::now_v7(),
            owner: data.owner,
            title: data.title,
            description: data.description,
            priority: data.priority.unwrap_or(TaskPriority::None),
            project_id: data.project_id,
            status: TaskStatus::Pending,
            due_date: data.due_date,
            completed_at: None,
            reminder_sent: false,
            is_recurring: recurrence.is_some(),
            parent_id: data.parent_id,
            recurrence_pattern: recurrence.as_ref().map(|r| r.pattern.to_string()),
            recurrence_days: recurrence.as_ref().and_then(|r| r.days.clone()).map(Json),
            recurrence_end_date: recurrence.as_ref().and_then(|r| r.end_date),
            recurrence_count: recurrence.as_ref().and_then(|r| r.count),
            recurrence_mode: recurrence.as_ref().map(|r| r.mode.to_string()),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;
        Self::insert_task_in_transaction(&mut tx, &task).await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        let task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    async fn find_tasks_by_owner(&self, owner: &str) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as("SELECT * FROM tasks WHERE owner = $1 ORDER BY created_at")
            .bind(owner)
            .fetch_all(self.pool())
            .await?;
        Ok(tasks)
    }

    async fn find_tasks_due_between(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as(
            "SELECT * FROM tasks WHERE owner = $1 AND due_date >= $2 AND due_date < $3 ORDER BY due_date",
        )
        .bind(owner)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    async fn find_recurring_task_templates(&self) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as(
            "SELECT * FROM tasks WHERE is_recurring = 1 ORDER BY owner, created_at",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    async fn find_task_instances(&self, parent_id: Uuid) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as("SELECT * FROM tasks WHERE parent_id = $1 ORDER BY due_date")
            .bind(parent_id)
            .fetch_all(self.pool())
            .await?;
        Ok(tasks)
    }

    async fn insert_task_instances(&self, instances: &[Task]) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        for task in instances {
            Self::insert_task_in_transaction(&mut tx, task).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_task(&self, id: Uuid, changes: TaskChanges) -> Result<Task, CoreError> {
        validate_recurrence_strings(
            changes.recurrence_pattern.as_ref(),
            changes.recurrence_mode.as_ref(),
        )?;
        if let Some(Some(count)) = changes.recurrence_count {
            if count < 0 {
                return Err(CoreError::InvalidInput(
                    "Recurrence count cannot be negative".to_string(),
                ));
            }
        }

        let mut tx = self.pool().begin().await?;

        let current: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        ensure_mode_unchanged(
            current.recurrence_mode.as_deref(),
            changes.recurrence_mode.as_ref(),
        )?;

        let will_recur = changes.is_recurring.unwrap_or(current.is_recurring);
        let will_have_parent = match &changes.parent_id {
            Some(new_parent) => new_parent.is_some(),
            None => current.parent_id.is_some(),
        };
        if will_recur && will_have_parent {
            return Err(CoreError::InvalidInput(
                "A recurring template cannot itself have a parent".to_string(),
            ));
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET ");
        let updated = Self::push_task_changes(&mut qb, &changes);
        if updated {
            qb.push(", updated_at = ");
            qb.push_bind(Utc::now());
            qb.push(" WHERE id = ");
            qb.push_bind(id);
            qb.build().execute(&mut *tx).await?;
        }

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn update_task_instances(
        &self,
        parent_id: Uuid,
        changes: TaskChanges,
    ) -> Result<u64, CoreError> {
        validate_recurrence_strings(
            changes.recurrence_pattern.as_ref(),
            changes.recurrence_mode.as_ref(),
        )?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET ");
        let updated = Self::push_task_changes(&mut qb, &changes);
        if !updated {
            return Ok(0);
        }
        qb.push(", updated_at = ");
        qb.push_bind(Utc::now());
        qb.push(" WHERE parent_id = ");
        qb.push_bind(parent_id);

        let result = qb.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn replace_task(&self, task: &Task) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE tasks
            SET owner = $2, title = $3, description = $4, priority = $5,
                project_id = $6, status = $7, due_date = $8, completed_at = $9,
                reminder_sent = $10, is_recurring = $11, parent_id = $12,
                recurrence_pattern = $13, recurrence_days = $14,
                recurrence_end_date = $15, recurrence_count = $16,
                recurrence_mode = $17, updated_at = $18
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(task.project_id)
        .bind(&task.status)
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(task.reminder_sent)
        .bind(task.is_recurring)
        .bind(task.parent_id)
        .bind(&task.recurrence_pattern)
        .bind(&task.recurrence_days)
        .bind(task.recurrence_end_date)
        .bind(task.recurrence_count)
        .bind(&task.recurrence_mode)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(task.id.to_string()));
        }
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM tasks WHERE parent_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }
}

impl SqliteStore {
    /// Insert one task row within an existing transaction.
    pub(crate) async fn insert_task_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        task: &Task,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO tasks (
                id, owner, title, description, priority, project_id, status,
                due_date, completed_at, reminder_sent, is_recurring, parent_id,
                recurrence_pattern, recurrence_days, recurrence_end_date,
                recurrence_count, recurrence_mode, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(task.id)
        .bind(&task.owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(task.project_id)
        .bind(&task.status)
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(task.reminder_sent)
        .bind(task.is_recurring)
        .bind(task.parent_id)
        .bind(&task.recurrence_pattern)
        .bind(&task.recurrence_days)
        .bind(task.recurrence_end_date)
        .bind(task.recurrence_count)
        .bind(&task.recurrence_mode)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Pushes `SET` clauses for every populated field, returning whether
    /// anything was pushed. Callers append `updated_at` and the `WHERE`.
    fn push_task_changes(qb: &mut QueryBuilder<'_, Sqlite>, changes: &TaskChanges) -> bool {
        let mut updated = false;

        if let Some(title) = &changes.title {
            qb.push("title = ");
            qb.push_bind(title.clone());
            updated = true;
        }

        if let Some(description) = &changes.description {
            if updated {
                qb.push(", ");
            }
            qb.push("description = ");
            qb.push_bind(description.clone());
            updated = true;
        }

        if let Some(priority) = &changes.priority {
            if updated {
                qb.push(", ");
            }
            qb.push("priority = ");
            qb.push_bind(priority.clone());
            updated = true;
        }

        if let Some(project_id) = &changes.project_id {
            if updated {
                qb.push(", ");
            }
            qb.push("project_id = ");
            qb.push_bind(*project_id);
            updated = true;
        }

        if let Some(status) = &changes.status {
            if updated {
                qb.push(", ");
            }
            qb.push("status = ");
            qb.push_bind(status.clone());
            updated = true;
        }

        if let Some(due_date) = &changes.due_date {
            if updated {
                qb.push(", ");
            }
            qb.push("due_date = ");
            qb.push_bind(*due_date);
            updated = true;
        }

        if let Some(completed_at) = &changes.completed_at {
            if updated {
                qb.push(", ");
            }
            qb.push("completed_at = ");
            qb.push_bind(*completed_at);
            updated = true;
        }

        if let Some(reminder_sent) = &changes.reminder_sent {
            if updated {
                qb.push(", ");
            }
            qb.push("reminder_sent = ");
            qb.push_bind(*reminder_sent);
            updated = true;
        }

        if let Some(is_recurring) = &changes.is_recurring {
            if updated {
                qb.push(", ");
            }
            qb.push("is_recurring = ");
            qb.push_bind(*is_recurring);
            updated = true;
        }

        if let Some(parent_id) = &changes.parent_id {
            if updated {
                qb.push(", ");
            }
            qb.push("parent_id = ");
            qb.push_bind(*parent_id);
            updated = true;
        }

        if let Some(pattern) = &changes.recurrence_pattern {
            if updated {
                qb.push(", ");
            }
            qb.push("recurrence_pattern = ");
            qb.push_bind(pattern.clone());
            updated = true;
        }

        if let Some(days) = &changes.recurrence_days {
            if updated {
                qb.push(", ");
            }
            qb.push("recurrence_days = ");
            qb.push_bind(days.clone().map(Json));
            updated = true;
        }

        if let Some(end_date) = &changes.recurrence_end_date {
            if updated {
                qb.push(", ");
            }
            qb.push("recurrence_end_date = ");
            qb.push_bind(*end_date);
            updated = true;
        }

        if let Some(count) = &changes.recurrence_count {
            if updated {
                qb.push(", ");
            }
            qb.push("recurrence_count = ");
            qb.push_bind(*count);
            updated = true;
        }

        if let Some(mode) = &changes.recurrence_mode {
            if updated {
                qb.push(", ");
            }
            qb.push("recurrence_mode = ");
            qb.push_bind(mode.clone());
            updated = true;
        }

        updated
    }
}
