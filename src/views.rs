//! Derived views over store snapshots: list, kanban board and summary stats.

use serde::{Deserialize, Serialize};

use crate::filter::{FilterState, SortState, apply_filters, sort_by};
use crate::store::{Snapshot, StoreStats};
use crate::types::{Document, Entity, ProcessingStatus, Task, TaskStatus};

/// Fields searched by default in task views.
pub const TASK_SEARCH_KEYS: &[&str] = &["title", "description", "category", "tags", "assignee"];

/// Fields searched by default in document views.
pub const DOCUMENT_SEARCH_KEYS: &[&str] = &["filename", "file_type", "source_type"];

/// Fields task views accept filter values for.
pub const TASK_FILTER_FIELDS: &[&str] = &["status", "priority", "difficulty", "category", "assignee"];

/// Fields document views accept filter values for.
pub const DOCUMENT_FILTER_FIELDS: &[&str] = &["processing_status", "file_type", "source_type"];

/// Board columns, left to right.
pub const KANBAN_COLUMNS: [TaskStatus; 4] = [
    TaskStatus::Todo,
    TaskStatus::InProgress,
    TaskStatus::Review,
    TaskStatus::Completed,
];

/// Which collection the kanban board is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanSource {
    /// The filtered (search + field filters) set, unsorted.
    #[default]
    Filtered,
    /// Every task in the store.
    Unfiltered,
}

fn column_title(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "To Do",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Review => "Review",
        TaskStatus::Completed => "Completed",
        TaskStatus::Suggested => "Suggested",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanColumn {
    pub status: TaskStatus,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

/// Tasks partitioned into the fixed column set.
///
/// Every column is present even when empty. Tasks whose status has no column
/// (`suggested`) land in `overflow`, so columns plus overflow always hold
/// exactly the source tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanBoard {
    pub columns: Vec<KanbanColumn>,
    pub overflow: Vec<Task>,
}

impl KanbanBoard {
    pub fn partition(tasks: &[Task]) -> Self {
        let mut columns: Vec<KanbanColumn> = KANBAN_COLUMNS
            .iter()
            .map(|&status| KanbanColumn {
                status,
                title: column_title(status),
                tasks: Vec::new(),
            })
            .collect();
        let mut overflow = Vec::new();

        for task in tasks {
            match columns.iter_mut().find(|c| c.status == task.status) {
                Some(column) => column.tasks.push(task.clone()),
                None => overflow.push(task.clone()),
            }
        }

        Self { columns, overflow }
    }

    pub fn column(&self, status: TaskStatus) -> Option<&KanbanColumn> {
        self.columns.iter().find(|c| c.status == status)
    }

    /// Number of tasks on the board, overflow included.
    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum::<usize>() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every task on the board, column by column, overflow last.
    pub fn ids(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .chain(self.overflow.iter())
            .map(|t| t.id.as_str())
            .collect()
    }
}

/// Dashboard counters over the whole task collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
    pub review: usize,
    pub suggested: usize,
    /// Percentage of completed tasks, rounded. Zero for an empty collection.
    pub completion_rate: u32,
}

impl TaskStats {
    pub fn compute(tasks: &[Task]) -> Self {
        Self::from_store_stats(&StoreStats::compute(tasks))
    }

    pub fn from_store_stats(stats: &StoreStats) -> Self {
        let completed = stats.count(TaskStatus::Completed.as_str());
        Self {
            total: stats.total,
            completed,
            in_progress: stats.count(TaskStatus::InProgress.as_str()),
            todo: stats.count(TaskStatus::Todo.as_str()),
            review: stats.count(TaskStatus::Review.as_str()),
            suggested: stats.count(TaskStatus::Suggested.as_str()),
            completion_rate: percent(completed, stats.total),
        }
    }
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part * 100 + total / 2) / total) as u32
}

/// Document counts by processing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub total: usize,
    pub indexed: usize,
    pub processing: usize,
    pub failed: usize,
}

impl DocumentStats {
    pub fn compute(documents: &[Document]) -> Self {
        Self::from_store_stats(&StoreStats::compute(documents))
    }

    pub fn from_store_stats(stats: &StoreStats) -> Self {
        Self {
            total: stats.total,
            indexed: stats.count(ProcessingStatus::Indexed.as_str()),
            processing: stats.count(ProcessingStatus::Processing.as_str()),
            failed: stats.count(ProcessingStatus::Failed.as_str()),
        }
    }
}

/// Everything the task dashboard renders from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TaskViews {
    pub list: Vec<Task>,
    pub kanban: KanbanBoard,
    pub stats: TaskStats,
    pub version: u64,
}

/// Everything the document list renders from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentViews {
    pub list: Vec<Document>,
    pub stats: DocumentStats,
    pub version: u64,
}

/// Filter, sort and board configuration for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewProjector {
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default)]
    pub sort: Option<SortState>,
    #[serde(default)]
    pub kanban_source: KanbanSource,
    /// Searched fields. Empty means the resource defaults.
    #[serde(default)]
    pub search_keys: Vec<String>,
}

impl ViewProjector {
    pub fn new(filter: FilterState) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort: SortState) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_kanban_source(mut self, source: KanbanSource) -> Self {
        self.kanban_source = source;
        self
    }

    fn keys<'a>(&'a self, defaults: &[&'a str]) -> Vec<&'a str> {
        if self.search_keys.is_empty() {
            defaults.to_vec()
        } else {
            self.search_keys.iter().map(String::as_str).collect()
        }
    }

    /// Search and field filters, input order kept.
    pub fn filtered<E: Entity>(&self, items: &[E], default_keys: &[&str]) -> Vec<E> {
        apply_filters(items, &self.filter, &self.keys(default_keys))
    }

    /// Filtered, then sorted when a sort is configured.
    pub fn list_view<E: Entity>(&self, items: &[E], default_keys: &[&str]) -> Vec<E> {
        let filtered = self.filtered(items, default_keys);
        match &self.sort {
            Some(sort) => sort_by(&filtered, &sort.field, sort.direction),
            None => filtered,
        }
    }

    /// Board built from the configured [`KanbanSource`]. Never sorted.
    pub fn kanban(&self, tasks: &[Task]) -> KanbanBoard {
        match self.kanban_source {
            KanbanSource::Filtered => KanbanBoard::partition(&self.filtered(tasks, TASK_SEARCH_KEYS)),
            KanbanSource::Unfiltered => KanbanBoard::partition(tasks),
        }
    }

    pub fn project_tasks(&self, snapshot: &Snapshot<Task>) -> TaskViews {
        TaskViews {
            list: self.list_view(&snapshot.items, TASK_SEARCH_KEYS),
            kanban: self.kanban(&snapshot.items),
            stats: TaskStats::from_store_stats(&snapshot.stats),
            version: snapshot.version,
        }
    }

    pub fn project_documents(&self, snapshot: &Snapshot<Document>) -> DocumentViews {
        DocumentViews {
            list: self.list_view(&snapshot.items, DOCUMENT_SEARCH_KEYS),
            stats: DocumentStats::from_store_stats(&snapshot.stats),
            version: snapshot.version,
        }
    }
}
