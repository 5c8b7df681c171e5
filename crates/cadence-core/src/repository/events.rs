use crate::error::CoreError;
use crate::models::{Event, EventChanges, NewEvent};
use crate::repository::{ensure_mode_unchanged, validate_recurrence_strings, SqliteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::EventRepository for SqliteStore {
    async fn create_event(&self, data: NewEvent) -> Result<Event, CoreError> {
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
        if data.end_time < data.start_time {
            return Err(CoreError::InvalidInput(
                "Event cannot end before it starts".to_string(),
            ));
        }

        let now = Utc::now();
        let recurrence = data.recurrence;
        let event = Event {
            id: Uuid::now_v7(),
            owner: data.owner,
            title: data.title,
            description: data.description,
            location: data.location,
            all_day: data.all_day,
            start_time: data.start_time,
            end_time: data.end_time,
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
        Self::insert_event_in_transaction(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError> {
        let event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(event)
    }

    async fn find_events_by_owner(&self, owner: &str) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as("SELECT * FROM events WHERE owner = $1 ORDER BY start_time")
            .bind(owner)
            .fetch_all(self.pool())
            .await?;
        Ok(events)
    }

    async fn find_events_between(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as(
            "SELECT * FROM events WHERE owner = $1 AND start_time >= $2 AND start_time < $3 ORDER BY start_time",
        )
        .bind(owner)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }

    async fn find_recurring_event_templates(&self) -> Result<Vec<Event>, CoreError> {
        // parent_id IS NULL keeps instances out of the sweep even when a row
        // was mis-flagged recurring by an earlier writer.
        let events = sqlx::query_as(
            "SELECT * FROM events WHERE is_recurring = 1 AND parent_id IS NULL ORDER BY owner, created_at",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }

    async fn find_event_instances(&self, parent_id: Uuid) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as("SELECT * FROM events WHERE parent_id = $1 ORDER BY start_time")
            .bind(parent_id)
            .fetch_all(self.pool())
            .await?;
        Ok(events)
    }

    async fn insert_event_instances(&self, instances: &[Event]) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        for event in instances {
            Self::insert_event_in_transaction(&mut tx, event).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> Result<Event, CoreError> {
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

        let current: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
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

        let start = changes.start_time.unwrap_or(current.start_time);
        let end = changes.end_time.unwrap_or(current.end_time);
        if end < start {
            return Err(CoreError::InvalidInput(
                "Event cannot end before it starts".to_string(),
            ));
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE events SET ");
        let updated = Self::push_event_changes(&mut qb, &changes);
        if updated {
            qb.push(", updated_at = ");
            qb.push_bind(Utc::now());
            qb.push(" WHERE id = ");
            qb.push_bind(id);
            qb.build().execute(&mut *tx).await?;
        }

        let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(event)
    }

    async fn update_event_instances(
        &self,
        parent_id: Uuid,
        changes: EventChanges,
    ) -> Result<u64, CoreError> {
        validate_recurrence_strings(
            changes.recurrence_pattern.as_ref(),
            changes.recurrence_mode.as_ref(),
        )?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE events SET ");
        let updated = Self::push_event_changes(&mut qb, &changes);
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

    async fn replace_event(&self, event: &Event) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE events
            SET owner = $2, title = $3, description = $4, location = $5,
                all_day = $6, start_time = $7, end_time = $8,
                is_recurring = $9, parent_id = $10, recurrence_pattern = $11,
                recurrence_days = $12, recurrence_end_date = $13,
                recurrence_count = $14, recurrence_mode = $15, updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.owner)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.all_day)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.is_recurring)
        .bind(event.parent_id)
        .bind(&event.recurrence_pattern)
        .bind(&event.recurrence_days)
        .bind(event.recurrence_end_date)
        .bind(event.recurrence_count)
        .bind(&event.recurrence_mode)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(event.id.to_string()));
        }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM events WHERE parent_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM events WHERE id = $1")
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
    /// Insert one event row within an existing transaction.
    pub(crate) async fn insert_event_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        event: &Event,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO events (
                id, owner, title, description, location, all_day, start_time,
                end_time, is_recurring, parent_id, recurrence_pattern,
                recurrence_days, recurrence_end_date, recurrence_count,
                recurrence_mode, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(event.id)
        .bind(&event.owner)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.all_day)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.is_recurring)
        .bind(event.parent_id)
        .bind(&event.recurrence_pattern)
        .bind(&event.recurrence_days)
        .bind(event.recurrence_end_date)
        .bind(event.recurrence_count)
        .bind(&event.recurrence_mode)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Pushes `SET` clauses for every populated field, returning whether
    /// anything was pushed. Callers append `updated_at` and the `WHERE`.
    fn push_event_changes(qb: &mut QueryBuilder<'_, Sqlite>, changes: &EventChanges) -> bool {
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

        if let Some(location) = &changes.location {
            if updated {
                qb.push(", ");
            }
            qb.push("location = ");
            qb.push_bind(location.clone());
            updated = true;
        }

        if let Some(all_day) = &changes.all_day {
            if updated {
                qb.push(", ");
            }
            qb.push("all_day = ");
            qb.push_bind(*all_day);
            updated = true;
        }

        if let Some(start_time) = &changes.start_time {
            if updated {
                qb.push(", ");
            }
            qb.push("start_time = ");
            qb.push_bind(*start_time);
            updated = true;
        }

        if let Some(end_time) = &changes.end_time {
            if updated {
                qb.push(", ");
            }
            qb.push("end_time = ");
            qb.push_bind(*end_time);
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
