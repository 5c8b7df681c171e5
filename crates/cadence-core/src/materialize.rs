//! Generic instance materialization for clone-mode templates.
//!
//! One [`Materializer`] is instantiated per entity kind over an
//! [`EntityAdapter`]; the adapter supplies storage access and row
//! construction while the walk over occurrences lives here, shared.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::RecurrenceSettings;
use crate::error::CoreError;
use crate::models::RecurrenceMode;
use crate::recurrence::{anchor_key, next_occurrence, Recurring};

/// Materialization window when the caller doesn't pass one.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 30;

/// Cap on instances staged by a single materialization call. A capped call
/// leaves the remainder for the next invocation, which resumes where the
/// dedup set says it left off.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Storage and construction hooks one entity kind plugs into the engine.
#[async_trait]
pub trait EntityAdapter: Send + Sync {
    type Record: Recurring + Clone + Send + Sync;

    /// Tag for log fields ("task", "event").
    fn kind(&self) -> &'static str;

    async fn load_template(&self, id: Uuid) -> Result<Option<Self::Record>, CoreError>;

    /// Every template eligible for a sweep, in owner order.
    async fn load_recurring_templates(&self) -> Result<Vec<Self::Record>, CoreError>;

    /// Anchor keys of the instances already materialized for a template.
    async fn existing_instance_anchors(
        &self,
        template_id: Uuid,
    ) -> Result<HashSet<String>, CoreError>;

    /// A fresh instance row for one occurrence of `template`.
    fn build_instance(&self, template: &Self::Record, occurrence: DateTime<Utc>) -> Self::Record;

    /// Writes staged instances in one transaction.
    async fn persist_batch(&self, instances: Vec<Self::Record>) -> Result<(), CoreError>;

    /// Whether the template still counts as open. Tasks: pending status;
    /// events: always.
    fn is_open(&self, template: &Self::Record) -> bool;

    /// The template advanced in place to `next`, status reset to open.
    fn rolled_forward(&self, template: &Self::Record, next: DateTime<Utc>) -> Self::Record;

    /// Writes a rolled-forward template back over its stored row.
    async fn persist_template(&self, template: &Self::Record) -> Result<(), CoreError>;
}

/// Walks a clone-mode template's occurrences and persists the concrete
/// instances missing from its materialized set.
pub struct Materializer<A: EntityAdapter> {
    adapter: A,
    clock: SharedClock,
    lookahead_days: i64,
    max_batch_size: usize,
}

impl<A: EntityAdapter> Materializer<A> {
    pub fn new(adapter: A, clock: SharedClock) -> Self {
        Self {
            adapter,
            clock,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_settings(adapter: A, clock: SharedClock, settings: &RecurrenceSettings) -> Self {
        Self {
            adapter,
            clock,
            lookahead_days: settings.lookahead_days,
            max_batch_size: settings.max_batch_size,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub(crate) fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Materializes instances for the template with `template_id` up to
    /// `now + lookahead_days` (default 30), returning how many were created.
    ///
    /// Idempotent: repeated calls with no intervening changes create
    /// nothing. A missing id is `NotFound`; a record that is not a
    /// clone-mode template (not recurring, refresh mode, carries a parent,
    /// lacks an anchor) is a no-op returning 0.
    pub async fn materialize_future_instances(
        &self,
        template_id: Uuid,
        lookahead_days: Option<i64>,
    ) -> Result<usize, CoreError> {
        let template = self
            .adapter
            .load_template(template_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(template_id.to_string()))?;
        self.materialize_template(&template, lookahead_days).await
    }

    pub(crate) async fn materialize_template(
        &self,
        template: &A::Record,
        lookahead_days: Option<i64>,
    ) -> Result<usize, CoreError> {
        if !template.is_recurring() || template.parent_id().is_some() {
            return Ok(0);
        }
        if template.recurrence_mode() != Some(RecurrenceMode::Clone) {
            return Ok(0);
        }
        let Some(anchor) = template.anchor() else {
            return Ok(0);
        };

        let window_end =
            self.clock.now() + Duration::days(lookahead_days.unwrap_or(self.lookahead_days));
        let existing = self.adapter.existing_instance_anchors(template.id()).await?;
        let rule = template.recurrence_rule();

        // The count bound is cumulative over the life of the series, so the
        // already-materialized set is the baseline.
        let mut produced = existing.len() as i64;
        let mut cursor = anchor;
        let mut batch: Vec<A::Record> = Vec::new();

        loop {
            let Some(next) = next_occurrence(cursor, &rule) else {
                break;
            };
            if next >= window_end {
                break;
            }
            if template.recurrence_count().is_some_and(|count| produced >= count) {
                break;
            }
            cursor = next;
            if existing.contains(&anchor_key(next)) {
                continue;
            }
            batch.push(self.adapter.build_instance(template, next));
            produced += 1;
            if batch.len() >= self.max_batch_size {
                break;
            }
        }

        let created = batch.len();
        if created > 0 {
            self.adapter.persist_batch(batch).await?;
        }
        tracing::debug!(
            kind = self.adapter.kind(),
            template_id = %template.id(),
            created,
            "materialized instances"
        );
        Ok(created)
    }
}
