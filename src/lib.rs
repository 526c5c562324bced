//! Entity sync library
//!
//! Local mirrors of remote task and document collections: adaptive polling,
//! optimistic mutations, and filtered/sorted/kanban views over the mirror.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod format;
pub mod gateway;
pub mod logging;
pub mod mutations;
pub mod store;
pub mod sync;
pub mod types;
pub mod views;
