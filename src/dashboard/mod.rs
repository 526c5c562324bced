//! JSON dashboard over the live mirrors.
//!
//! Started by the `serve` subcommand.

mod server;

pub use server::{
    ApiError, DashboardHandle, DashboardServer, build_router, projector_from_query, start_server,
};
