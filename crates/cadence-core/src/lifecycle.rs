//! Per-template lifecycle dispatch: clone-mode templates get instances
//! pre-materialized, refresh-mode templates are rolled forward in place.

use crate::clock::start_of_day;
use crate::error::CoreError;
use crate::materialize::{EntityAdapter, Materializer};
use crate::models::RecurrenceMode;
use crate::recurrence::{next_occurrence, Recurring};

/// What processing one template did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// Clone mode; carries the number of instances created.
    Materialized(usize),
    /// Refresh mode; the template moved to its next occurrence.
    RolledForward,
    /// Nothing to do: not overdue, not open, series ended, or the mode is
    /// absent or unrecognized.
    Unchanged,
}

pub struct LifecycleController<A: EntityAdapter> {
    materializer: Materializer<A>,
}

impl<A: EntityAdapter> LifecycleController<A> {
    pub fn new(materializer: Materializer<A>) -> Self {
        Self { materializer }
    }

    pub fn materializer(&self) -> &Materializer<A> {
        &self.materializer
    }

    /// Routes a template through its lifecycle mode.
    pub async fn process_template(
        &self,
        template: &A::Record,
    ) -> Result<TemplateOutcome, CoreError> {
        match template.recurrence_mode() {
            Some(RecurrenceMode::Clone) => {
                let created = self
                    .materializer
                    .materialize_template(template, None)
                    .await?;
                Ok(TemplateOutcome::Materialized(created))
            }
            Some(RecurrenceMode::Refresh) => {
                if self.roll_forward(template).await? {
                    Ok(TemplateOutcome::RolledForward)
                } else {
                    Ok(TemplateOutcome::Unchanged)
                }
            }
            None => Ok(TemplateOutcome::Unchanged),
        }
    }

    /// Advances an overdue, still-open refresh template by exactly one
    /// occurrence. A template several periods behind catches up across
    /// successive invocations, one step each.
    ///
    /// An exhausted series (`next_occurrence` returns `None`) is left
    /// untouched; judging that terminal state is the caller's business.
    pub async fn roll_forward(&self, template: &A::Record) -> Result<bool, CoreError> {
        if !template.is_recurring() || template.parent_id().is_some() {
            return Ok(false);
        }
        let Some(anchor) = template.anchor() else {
            return Ok(false);
        };

        let adapter = self.materializer.adapter();
        let today = start_of_day(self.materializer.clock().now());
        if anchor >= today || !adapter.is_open(template) {
            return Ok(false);
        }

        let Some(next) = next_occurrence(anchor, &template.recurrence_rule()) else {
            return Ok(false);
        };

        let advanced = adapter.rolled_forward(template, next);
        adapter.persist_template(&advanced).await?;
        tracing::debug!(
            kind = adapter.kind(),
            template_id = %template.id(),
            next = %next,
            "rolled template forward"
        );
        Ok(true)
    }
}
