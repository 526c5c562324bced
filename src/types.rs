//! Core types for the entity mirror.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::SyncError;

/// A record mirrored locally from the remote service.
///
/// Field access is by name so the filter engine and view projector can stay
/// generic over tasks and documents.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Path segment of the remote collection (`tasks`, `documents`).
    const RESOURCE: &'static str;

    fn id(&self) -> &str;

    /// Status used for per-status counters.
    fn status_label(&self) -> &'static str;

    /// Value of a named field, or `FieldValue::Missing` for unknown/absent fields.
    fn field(&self, name: &str) -> FieldValue;

    /// Whether the entity is still changing on the server side.
    fn is_transient(&self) -> bool {
        false
    }

    /// Whether going from `prior` to `self` breaks the server's forward-only
    /// status order. Observed by the scheduler, never corrected.
    fn regressed_from(&self, _prior: &Self) -> bool {
        false
    }
}

/// Typed value of an entity field, used for search, filter, sort and grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Missing,
    Text(String),
    /// Enumerated value with a natural order (priority, difficulty, status).
    Ordinal { rank: u8, label: &'static str },
    Integer(i64),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
}

impl FieldValue {
    /// String coercion used by search and group-by. `None` for missing values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Missing => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Ordinal { label, .. } => Some((*label).to_string()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Timestamp(t) => Some(t.to_rfc3339()),
            FieldValue::List(items) => Some(items.join(",")),
        }
    }

    /// Membership test against a filter value-set. Lists match if any element does.
    pub fn matches_any(&self, allowed: &BTreeSet<String>) -> bool {
        match self {
            FieldValue::Missing => false,
            FieldValue::List(items) => items.iter().any(|i| allowed.contains(i)),
            other => other.as_text().is_some_and(|s| allowed.contains(&s)),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    fn variant_rank(&self) -> u8 {
        match self {
            FieldValue::Missing => 0,
            FieldValue::Ordinal { .. } => 1,
            FieldValue::Integer(_) => 2,
            FieldValue::Timestamp(_) => 3,
            FieldValue::Text(_) => 4,
            FieldValue::List(_) => 5,
        }
    }

    /// Ascending order between two present values. Text compares case-insensitively.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
            }
            (FieldValue::Ordinal { rank: a, .. }, FieldValue::Ordinal { rank: b, .. }) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text().unwrap_or_default())
    }
}

fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

fn opt_text(s: &Option<String>) -> FieldValue {
    s.as_deref().map_or(FieldValue::Missing, text)
}

fn opt_time(t: &Option<DateTime<Utc>>) -> FieldValue {
    t.map_or(FieldValue::Missing, FieldValue::Timestamp)
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Completed,
    Suggested,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Completed,
        TaskStatus::Suggested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Suggested => "suggested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Suggested => 0,
            TaskStatus::Todo => 1,
            TaskStatus::InProgress => 2,
            TaskStatus::Review => 3,
            TaskStatus::Completed => 4,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Parse a priority name. Returns `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// A checklist item inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub estimated_time: String,
}

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
}

/// Prefix of ids assigned to tasks that have not been confirmed by the server.
pub const LOCAL_ID_PREFIX: &str = "local-";

impl Task {
    /// Build a client-side task from a draft. Used as the optimistic placeholder
    /// and as the fallback entity when the server rejects a create.
    pub fn local(draft: &NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::now_v7()),
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            status: draft.status,
            priority: draft.priority,
            difficulty: draft.difficulty,
            category: draft.category.clone(),
            tags: draft.tags.clone(),
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
            assignee: draft.assignee.clone(),
            progress: 0,
            subtasks: draft.subtasks.clone(),
        }
        .transition(draft.status, now)
    }

    /// Whether this task exists only locally.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    /// Move the task to `status`. Entering `completed` stamps `completed_at`
    /// and sets progress to 100; leaving it clears `completed_at` but keeps
    /// progress. Any status may move to any other.
    pub fn transition(&self, status: TaskStatus, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        let stamp = self.next_update_time(now);
        next.status = status;
        next.updated_at = stamp;
        if status == TaskStatus::Completed {
            next.completed_at = Some(stamp);
            next.progress = 100;
        } else {
            next.completed_at = None;
        }
        next
    }

    /// Set progress (clamped to 0..=100). Reaching 100 does not complete the task.
    pub fn with_progress(&self, progress: u8, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.progress = progress.min(100);
        if next.status == TaskStatus::Completed {
            next.progress = 100;
        }
        next.updated_at = self.next_update_time(now);
        next
    }

    /// Whether the completion invariants hold.
    pub fn is_consistent(&self) -> bool {
        let completed = self.status == TaskStatus::Completed;
        completed == self.completed_at.is_some() && (!completed || self.progress == 100)
    }

    fn next_update_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.updated_at)
    }
}

impl Entity for Task {
    const RESOURCE: &'static str = "tasks";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => text(&self.id),
            "title" => text(&self.title),
            "description" => text(&self.description),
            "status" => FieldValue::Ordinal {
                rank: self.status.rank(),
                label: self.status.as_str(),
            },
            "priority" => FieldValue::Ordinal {
                rank: self.priority as u8,
                label: self.priority.as_str(),
            },
            "difficulty" => FieldValue::Ordinal {
                rank: self.difficulty as u8,
                label: self.difficulty.as_str(),
            },
            "category" => text(&self.category),
            "tags" => FieldValue::List(self.tags.clone()),
            "assignee" => opt_text(&self.assignee),
            "dueDate" | "due_date" => opt_time(&self.due_date),
            "createdAt" | "created_at" => FieldValue::Timestamp(self.created_at),
            "updatedAt" | "updated_at" => FieldValue::Timestamp(self.updated_at),
            "completedAt" | "completed_at" => opt_time(&self.completed_at),
            "progress" => FieldValue::Integer(i64::from(self.progress)),
            _ => FieldValue::Missing,
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_new_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
}

fn default_new_status() -> TaskStatus {
    TaskStatus::Todo
}

impl Default for TaskStatus {
    fn default() -> Self {
        default_new_status()
    }
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Client-side validation, run before any network call.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.title.trim().is_empty() {
            return Err(SyncError::missing_field("title"));
        }
        Ok(())
    }
}

/// Body of a task progress update (`PUT /tasks`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default)]
    pub notes: String,
}

/// Server-side processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Indexed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Indexed => "indexed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Processing may only move forward to a terminal state.
    pub fn can_become(&self, next: ProcessingStatus) -> bool {
        *self == next || *self == ProcessingStatus::Processing
    }
}

/// An uploaded document. Status changes are observed, never made locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub size: u64,
    pub upload_time: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub document_count: u32,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub source_type: String,
}

impl Entity for Document {
    const RESOURCE: &'static str = "documents";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_label(&self) -> &'static str {
        self.processing_status.as_str()
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => text(&self.id),
            "filename" => text(&self.filename),
            "file_type" => text(&self.file_type),
            "size" => FieldValue::Integer(i64::try_from(self.size).unwrap_or(i64::MAX)),
            "upload_time" => FieldValue::Timestamp(self.upload_time),
            "processing_status" | "status" => FieldValue::Ordinal {
                rank: self.processing_status as u8,
                label: self.processing_status.as_str(),
            },
            "document_count" => FieldValue::Integer(i64::from(self.document_count)),
            "user_id" => text(&self.user_id),
            "source_type" => text(&self.source_type),
            _ => FieldValue::Missing,
        }
    }

    fn is_transient(&self) -> bool {
        self.processing_status == ProcessingStatus::Processing
    }

    fn regressed_from(&self, prior: &Self) -> bool {
        !prior.processing_status.can_become(self.processing_status)
    }
}
