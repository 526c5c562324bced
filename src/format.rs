//! Output formatting utilities for markdown and JSON.

use serde::Serialize;

use crate::mutations::MutationReport;
use crate::sync::RemoteSummary;
use crate::types::{Document, Priority, Task};
use crate::views::{DocumentStats, KanbanBoard, TaskStats};

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

/// Render `value` as pretty JSON, or through `markdown` otherwise.
pub fn render<T: Serialize>(
    value: &T,
    format: OutputFormat,
    markdown: impl FnOnce(&T) -> String,
) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value),
        OutputFormat::Markdown => Ok(markdown(value)),
    }
}

/// Format a single task as markdown.
pub fn format_task_markdown(task: &Task) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Task: {}\n", task.title));
    md.push_str(&format!("- **id**: `{}`\n", task.id));
    md.push_str(&format!("- **status**: {}\n", task.status));
    md.push_str(&format!("- **priority**: {}\n", task.priority.as_str()));
    md.push_str(&format!("- **difficulty**: {}\n", task.difficulty.as_str()));
    md.push_str(&format!("- **progress**: {}%\n", task.progress));

    if !task.category.is_empty() {
        md.push_str(&format!("- **category**: {}\n", task.category));
    }

    if let Some(ref assignee) = task.assignee {
        md.push_str(&format!("- **assignee**: {}\n", assignee));
    }

    if !task.tags.is_empty() {
        md.push_str(&format!("- **tags**: {}\n", task.tags.join(", ")));
    }

    if let Some(due) = task.due_date {
        md.push_str(&format!("- **due**: {}\n", due.format("%Y-%m-%d")));
    }

    if let Some(done) = task.completed_at {
        md.push_str(&format!("- **completed_at**: {}\n", done.to_rfc3339()));
    }

    if !task.description.is_empty() {
        md.push_str("\n### Description\n");
        md.push_str(&task.description);
        md.push('\n');
    }

    md
}

/// A mutated task followed by the server's verdict on the change.
pub fn format_task_report_markdown(report: &MutationReport<Task>) -> String {
    let mut md = format_task_markdown(&report.entity);
    match &report.remote_error {
        None => md.push_str("\n_Confirmed by server._\n"),
        Some(err) if report.rolled_back => {
            md.push_str(&format!("\n**Rejected by server, rolled back**: {}\n", err));
        }
        Some(err) => {
            md.push_str(&format!("\n**Rejected by server, kept locally**: {}\n", err));
        }
    }
    md
}

/// Format a task list as markdown, in the order given.
pub fn format_tasks_markdown(tasks: &[Task]) -> String {
    let mut md = format!("# Tasks ({})\n\n", tasks.len());
    for task in tasks {
        md.push_str(&format_task_short(task));
    }
    md
}

/// Format a board as markdown. Empty columns are still listed.
pub fn format_kanban_markdown(board: &KanbanBoard) -> String {
    let mut md = format!("# Board ({})\n\n", board.len());

    for column in &board.columns {
        md.push_str(&format!("## {} ({})\n\n", column.title, column.tasks.len()));
        if column.tasks.is_empty() {
            md.push_str("_empty_\n");
        }
        for task in &column.tasks {
            md.push_str(&format_task_short(task));
        }
        md.push('\n');
    }

    if !board.overflow.is_empty() {
        md.push_str(&format!("## Not on board ({})\n\n", board.overflow.len()));
        for task in &board.overflow {
            md.push_str(&format_task_short(task));
        }
        md.push('\n');
    }

    md
}

pub fn format_task_stats_markdown(stats: &TaskStats) -> String {
    let mut md = String::from("# Task Stats\n\n");
    md.push_str(&format!("- **total**: {}\n", stats.total));
    md.push_str(&format!("- **todo**: {}\n", stats.todo));
    md.push_str(&format!("- **in progress**: {}\n", stats.in_progress));
    md.push_str(&format!("- **review**: {}\n", stats.review));
    md.push_str(&format!("- **completed**: {}\n", stats.completed));
    if stats.suggested > 0 {
        md.push_str(&format!("- **suggested**: {}\n", stats.suggested));
    }
    md.push_str(&format!("- **completion rate**: {}%\n", stats.completion_rate));
    md
}

/// Format documents with local counts and, when known, the server's counts.
pub fn format_documents_markdown(
    documents: &[Document],
    stats: &DocumentStats,
    remote: Option<&RemoteSummary>,
) -> String {
    let mut md = format!("# Documents ({})\n\n", documents.len());

    md.push_str(&format!(
        "indexed {} / processing {} / failed {}\n",
        stats.indexed, stats.processing, stats.failed
    ));
    if let Some(remote) = remote {
        md.push_str(&format!("server total: {}\n", remote.total_count));
    }
    md.push('\n');

    for doc in documents {
        md.push_str(&format!(
            "- {} `{}` [{}] {}\n",
            doc.filename,
            short_id(&doc.id),
            doc.processing_status.as_str(),
            format_size(doc.size),
        ));
    }

    md
}

/// Format a task in short form for lists.
fn format_task_short(task: &Task) -> String {
    let priority_marker = match task.priority {
        Priority::Urgent => "!!! ",
        Priority::High => "!! ",
        Priority::Medium | Priority::Low => "",
    };

    let assignee = task
        .assignee
        .as_ref()
        .map(|a| format!(" @{}", a))
        .unwrap_or_default();

    let progress = if task.progress > 0 && task.progress < 100 {
        format!(" ({}%)", task.progress)
    } else {
        String::new()
    };

    format!(
        "- {}{} `{}` [{}]{}{}\n",
        priority_marker,
        task.title,
        short_id(&task.id),
        task.status,
        assignee,
        progress,
    )
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
