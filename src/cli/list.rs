//! List subcommands: `tasks` and `documents`.

use clap::{Args, ValueEnum};

use super::FormatArg;
use crate::filter::{FilterState, SortDirection, SortState};
use crate::views::{KanbanSource, ViewProjector};

/// Which task view to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TaskView {
    #[default]
    List,
    Kanban,
    Stats,
}

/// Arguments for the tasks subcommand
#[derive(Args, Debug, Default)]
pub struct TaskListArgs {
    /// View to print
    #[arg(long, value_enum, default_value_t = TaskView::List)]
    pub view: TaskView,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
    pub format: FormatArg,

    /// Keep tasks with these statuses
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Keep tasks with these priorities
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<String>,

    /// Keep tasks with these difficulties
    #[arg(long, value_delimiter = ',')]
    pub difficulty: Vec<String>,

    /// Keep tasks in these categories
    #[arg(long, value_delimiter = ',')]
    pub category: Vec<String>,

    /// Keep tasks assigned to these people
    #[arg(long, value_delimiter = ',')]
    pub assignee: Vec<String>,

    /// Case-insensitive text search
    #[arg(short, long)]
    pub search: Option<String>,

    /// Sort the list by this field
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Build the board from every task, whatever `ui.kanban_source` says
    #[arg(long)]
    pub unfiltered_board: bool,
}

impl TaskListArgs {
    /// `default_source` is the configured board source; `--unfiltered-board`
    /// overrides it.
    pub fn projector(&self, default_source: KanbanSource) -> ViewProjector {
        let filter = FilterState::new()
            .with("status", self.status.iter().cloned())
            .with("priority", self.priority.iter().cloned())
            .with("difficulty", self.difficulty.iter().cloned())
            .with("category", self.category.iter().cloned())
            .with("assignee", self.assignee.iter().cloned());
        let source = if self.unfiltered_board {
            KanbanSource::Unfiltered
        } else {
            default_source
        };
        with_search_and_sort(filter, &self.search, &self.sort, self.desc).with_kanban_source(source)
    }
}

/// Arguments for the documents subcommand
#[derive(Args, Debug, Default)]
pub struct DocumentListArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
    pub format: FormatArg,

    /// Keep documents with these processing statuses
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Keep documents of these file types
    #[arg(long, value_delimiter = ',')]
    pub file_type: Vec<String>,

    /// Keep documents from these sources
    #[arg(long, value_delimiter = ',')]
    pub source_type: Vec<String>,

    /// Case-insensitive filename search
    #[arg(short, long)]
    pub search: Option<String>,

    /// Sort by this field
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,
}

impl DocumentListArgs {
    pub fn projector(&self) -> ViewProjector {
        let filter = FilterState::new()
            .with("processing_status", self.status.iter().cloned())
            .with("file_type", self.file_type.iter().cloned())
            .with("source_type", self.source_type.iter().cloned());
        with_search_and_sort(filter, &self.search, &self.sort, self.desc)
    }
}

fn with_search_and_sort(
    mut filter: FilterState,
    search: &Option<String>,
    sort: &Option<String>,
    desc: bool,
) -> ViewProjector {
    if let Some(query) = search {
        filter = filter.with_search(query.as_str());
    }
    let projector = ViewProjector::new(filter);
    match sort {
        Some(field) => {
            let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
            projector.sorted(SortState::new(field.as_str(), direction))
        }
        None => projector,
    }
}
