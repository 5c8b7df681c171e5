use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::recurrence::{RecurrenceRule, Recurring};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task status: {0}")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TaskPriority {
    None,
    Low,
    Medium,
    High,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task priority: {0}")]
pub struct ParseTaskPriorityError(String);

impl FromStr for TaskPriority {
    type Err = ParseTaskPriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TaskPriority::None),
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(ParseTaskPriorityError(s.to_string())),
        }
    }
}

/// The four supported recurrence cadences. Stored as raw text on rows (so a
/// value written by another layer that this version doesn't know cannot
/// poison row decoding) and parsed where the engine needs it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecurrencePattern::Daily => write!(f, "daily"),
            RecurrencePattern::Weekly => write!(f, "weekly"),
            RecurrencePattern::Monthly => write!(f, "monthly"),
            RecurrencePattern::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid recurrence pattern: {0}")]
pub struct ParseRecurrencePatternError(String);

impl FromStr for RecurrencePattern {
    type Err = ParseRecurrencePatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            "yearly" => Ok(RecurrencePattern::Yearly),
            _ => Err(ParseRecurrencePatternError(s.to_string())),
        }
    }
}

/// How a template's series is kept current. Fixed at creation.
///
/// `Clone` templates get future instances pre-materialized within a
/// lookahead window; `Refresh` templates never get instances and are rolled
/// forward in place once overdue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceMode {
    Clone,
    Refresh,
}

impl std::fmt::Display for RecurrenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecurrenceMode::Clone => write!(f, "clone"),
            RecurrenceMode::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid recurrence mode: {0}")]
pub struct ParseRecurrenceModeError(String);

impl FromStr for RecurrenceMode {
    type Err = ParseRecurrenceModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clone" => Ok(RecurrenceMode::Clone),
            "refresh" => Ok(RecurrenceMode::Refresh),
            _ => Err(ParseRecurrenceModeError(s.to_string())),
        }
    }
}

/// A task row. Templates carry `is_recurring = true` and the recurrence
/// columns; instances carry `parent_id` and none of them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub project_id: Option<Uuid>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub is_recurring: bool,
    pub parent_id: Option<Uuid>,
    pub recurrence_pattern: Option<String>,
    pub recurrence_days: Option<Json<Vec<String>>>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub recurrence_count: Option<i64>,
    pub recurrence_mode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            owner: "".to_string(),
            title: "".to_string(),
            description: None,
            priority: TaskPriority::None,
            project_id: None,
            status: TaskStatus::Pending,
            due_date: None,
            completed_at: None,
            reminder_sent: false,
            is_recurring: false,
            parent_id: None,
            recurrence_pattern: None,
            recurrence_days: None,
            recurrence_end_date: None,
            recurrence_count: None,
            recurrence_mode: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// An event row. Same recurrence mixin as tasks; the anchor is `start_time`
/// and `end_time` trails it at a fixed duration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_recurring: bool,
    pub parent_id: Option<Uuid>,
    pub recurrence_pattern: Option<String>,
    pub recurrence_days: Option<Json<Vec<String>>>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub recurrence_count: Option<i64>,
    pub recurrence_mode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Gap between start and end, preserved when instances are anchored
    /// elsewhere.
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

impl Default for Event {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner: "".to_string(),
            title: "".to_string(),
            description: None,
            location: None,
            all_day: false,
            start_time: now,
            end_time: now + Duration::hours(1),
            is_recurring: false,
            parent_id: None,
            recurrence_pattern: None,
            recurrence_days: None,
            recurrence_end_date: None,
            recurrence_count: None,
            recurrence_mode: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Recurring for Task {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    fn anchor(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    fn recurrence_mode(&self) -> Option<RecurrenceMode> {
        self.recurrence_mode.as_deref().and_then(|m| m.parse().ok())
    }

    fn recurrence_count(&self) -> Option<i64> {
        self.recurrence_count
    }

    fn recurrence_rule(&self) -> RecurrenceRule {
        RecurrenceRule {
            pattern: self.recurrence_pattern.clone(),
            days: self.recurrence_days.as_ref().map(|d| d.0.clone()),
            end_date: self.recurrence_end_date,
        }
    }
}

impl Recurring for Event {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    fn anchor(&self) -> Option<DateTime<Utc>> {
        Some(self.start_time)
    }

    fn recurrence_mode(&self) -> Option<RecurrenceMode> {
        self.recurrence_mode.as_deref().and_then(|m| m.parse().ok())
    }

    fn recurrence_count(&self) -> Option<i64> {
        self.recurrence_count
    }

    fn recurrence_rule(&self) -> RecurrenceRule {
        RecurrenceRule {
            pattern: self.recurrence_pattern.clone(),
            days: self.recurrence_days.as_ref().map(|d| d.0.clone()),
            end_date: self.recurrence_end_date,
        }
    }
}

/// Recurrence configuration attached at creation. Presence makes the new
/// row a template.
#[derive(Debug, Clone)]
pub struct NewRecurrence {
    pub pattern: RecurrencePattern,
    pub days: Option<Vec<String>>,
    pub end_date: Option<DateTime<Utc>>,
    pub count: Option<i64>,
    pub mode: RecurrenceMode,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub project_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub parent_id: Option<Uuid>,
    pub recurrence: Option<NewRecurrence>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub parent_id: Option<Uuid>,
    pub recurrence: Option<NewRecurrence>,
}

/// Field-level task update. `None` leaves a column untouched; the nested
/// `Option` distinguishes "set" from "clear" for nullable columns.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<TaskPriority>,
    pub project_id: Option<Option<Uuid>>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub reminder_sent: Option<bool>,
    pub is_recurring: Option<bool>,
    pub parent_id: Option<Option<Uuid>>,
    pub recurrence_pattern: Option<Option<String>>,
    pub recurrence_days: Option<Option<Vec<String>>>,
    pub recurrence_end_date: Option<Option<DateTime<Utc>>>,
    pub recurrence_count: Option<Option<i64>>,
    pub recurrence_mode: Option<Option<String>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.project_id.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.completed_at.is_none()
            && self.reminder_sent.is_none()
            && self.is_recurring.is_none()
            && self.parent_id.is_none()
            && self.recurrence_pattern.is_none()
            && self.recurrence_days.is_none()
            && self.recurrence_end_date.is_none()
            && self.recurrence_count.is_none()
            && self.recurrence_mode.is_none()
    }

    /// Copy of this change set with every recurrence-definition field
    /// removed. Instances must never see these, whatever the caller sent.
    pub fn stripped_of_recurrence(&self) -> Self {
        Self {
            is_recurring: None,
            parent_id: None,
            recurrence_pattern: None,
            recurrence_days: None,
            recurrence_end_date: None,
            recurrence_count: None,
            recurrence_mode: None,
            ..self.clone()
        }
    }
}

/// Field-level event update, same conventions as [`TaskChanges`].
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub all_day: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    pub parent_id: Option<Option<Uuid>>,
    pub recurrence_pattern: Option<Option<String>>,
    pub recurrence_days: Option<Option<Vec<String>>>,
    pub recurrence_end_date: Option<Option<DateTime<Utc>>>,
    pub recurrence_count: Option<Option<i64>>,
    pub recurrence_mode: Option<Option<String>>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.all_day.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.is_recurring.is_none()
            && self.parent_id.is_none()
            && self.recurrence_pattern.is_none()
            && self.recurrence_days.is_none()
            && self.recurrence_end_date.is_none()
            && self.recurrence_count.is_none()
            && self.recurrence_mode.is_none()
    }

    /// Copy of this change set with every recurrence-definition field
    /// removed. Instances must never see these, whatever the caller sent.
    pub fn stripped_of_recurrence(&self) -> Self {
        Self {
            is_recurring: None,
            parent_id: None,
            recurrence_pattern: None,
            recurrence_days: None,
            recurrence_end_date: None,
            recurrence_count: None,
            recurrence_mode: None,
            ..self.clone()
        }
    }
}
