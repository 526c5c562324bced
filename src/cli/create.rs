//! Create subcommand.

use clap::Args;

use super::{FormatArg, parse_difficulty, parse_priority, parse_status};
use crate::types::{Difficulty, NewTask, Priority, TaskStatus};

/// Arguments for the create subcommand
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Task title
    pub title: String,

    #[arg(short, long, default_value = "")]
    pub description: String,

    #[arg(long, value_parser = parse_status, default_value = "todo")]
    pub status: TaskStatus,

    #[arg(long, value_parser = parse_priority, default_value = "medium")]
    pub priority: Priority,

    #[arg(long, value_parser = parse_difficulty, default_value = "medium")]
    pub difficulty: Difficulty,

    #[arg(long, default_value = "")]
    pub category: String,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
    pub format: FormatArg,
}

impl From<CreateArgs> for NewTask {
    fn from(args: CreateArgs) -> Self {
        NewTask {
            title: args.title,
            description: args.description,
            status: args.status,
            priority: args.priority,
            difficulty: args.difficulty,
            category: args.category,
            tags: args.tags,
            due_date: None,
            assignee: args.assignee,
            subtasks: None,
        }
    }
}
