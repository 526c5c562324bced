//! CLI command definitions for entity-sync
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod create;
pub mod list;

use clap::{Args, Parser, Subcommand, ValueEnum};
use create::CreateArgs;
use list::{DocumentListArgs, TaskListArgs};

use crate::format::OutputFormat;
use crate::types::{Difficulty, Priority, TaskStatus};

/// Entity mirror and dashboard for a remote task/document service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Remote service base URL (overrides config)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// User id sent with every request (overrides config)
    #[arg(long, global = true)]
    pub user_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch tasks once and print a list, board or stats
    Tasks(TaskListArgs),

    /// Fetch documents once and print them with status counts
    Documents(DocumentListArgs),

    /// Create a task
    Create(CreateArgs),

    /// Move a task to another status column
    Move {
        /// Task id
        id: String,
        /// Target status (todo, in-progress, review, completed, suggested)
        #[arg(value_parser = parse_status)]
        status: TaskStatus,
        /// Output format
        #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
        format: FormatArg,
    },

    /// Set a task's progress
    Progress {
        /// Task id
        id: String,
        /// Progress, 0-100
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        progress: u8,
        /// Notes sent with the update
        #[arg(long, default_value = "")]
        notes: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
        format: FormatArg,
    },

    /// Delete one or more tasks or documents
    Delete(DeleteArgs),

    /// Run the pollers and log every change until Ctrl-C
    Watch {
        /// Which mirrors to run
        #[arg(long, value_enum, default_value_t = Resource::All)]
        resource: Resource,
    },

    /// Run the pollers and serve the JSON dashboard until Ctrl-C
    Serve {
        /// Dashboard port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Mirrored resource selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Tasks,
    Documents,
    All,
}

/// Arguments for the delete subcommand
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Collection to delete from
    #[arg(long, value_enum, default_value_t = Resource::Tasks)]
    pub resource: Resource,

    /// Ids to delete; more than one uses the bulk endpoint
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Output format for the list subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatArg {
    #[default]
    Markdown,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

pub fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_str(s).ok_or_else(|| {
        let names: Vec<&str> = TaskStatus::ALL.iter().map(|st| st.as_str()).collect();
        format!("unknown status '{}', expected one of: {}", s, names.join(", "))
    })
}

pub fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_str(s).ok_or_else(|| format!("unknown priority '{}'", s))
}

pub fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    Difficulty::from_str(s).ok_or_else(|| format!("unknown difficulty '{}'", s))
}
