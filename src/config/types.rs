//! Configuration types and structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::views::KanbanSource;

/// Default port for the JSON dashboard.
pub const DEFAULT_UI_PORT: u16 = 31995;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub mutations: MutationPolicy,

    #[serde(default)]
    pub ui: UiConfig,
}

/// Where the remote service lives and who we are to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `user_id` on every request.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Per-request timeout. Expiry surfaces as a network error.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: default_user_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_user_id() -> String {
    "default_user".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// What a failed poll does to the mirrored collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the mirror and show an empty collection with the error.
    Clear,
    /// Keep the last-known-good collection visible and only set the error.
    Retain,
}

/// Polling configuration for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Regular refresh period.
    pub base_interval_ms: u64,

    /// Faster period used only while some entity is transient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_interval_ms: Option<u64>,

    pub on_failure: FailurePolicy,
}

fn default_enabled() -> bool {
    true
}

impl PollConfig {
    /// Task/dashboard defaults: slow refresh, keep data on failure.
    pub fn tasks() -> Self {
        Self {
            enabled: true,
            base_interval_ms: 300_000, // 5 minutes
            fast_interval_ms: None,
            on_failure: FailurePolicy::Retain,
        }
    }

    /// Document defaults: 30s refresh, 5s while processing, clear on failure.
    pub fn documents() -> Self {
        Self {
            enabled: true,
            base_interval_ms: 30_000,
            fast_interval_ms: Some(5_000),
            on_failure: FailurePolicy::Clear,
        }
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms.max(1))
    }

    pub fn fast_interval(&self) -> Option<Duration> {
        self.fast_interval_ms.map(|ms| Duration::from_millis(ms.max(1)))
    }
}

/// Polling configuration per resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "PollConfig::tasks")]
    pub tasks: PollConfig,

    #[serde(default = "PollConfig::documents")]
    pub documents: PollConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tasks: PollConfig::tasks(),
            documents: PollConfig::documents(),
        }
    }
}

/// How optimistic mutations behave when the server disagrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPolicy {
    /// Keep optimistic local changes even when the remote call fails.
    /// The error is recorded but the view is not reverted.
    #[serde(default = "default_optimistic_trust")]
    pub optimistic_trust: bool,

    /// Delay before the reconciliation poll that follows a successful mutation.
    #[serde(default = "default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            optimistic_trust: default_optimistic_trust(),
            reconcile_delay_ms: default_reconcile_delay_ms(),
        }
    }
}

impl MutationPolicy {
    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }
}

fn default_optimistic_trust() -> bool {
    true
}

fn default_reconcile_delay_ms() -> u64 {
    1_000
}

/// JSON dashboard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
    /// Port for the dashboard (default: 31995).
    #[serde(default = "default_ui_port")]
    pub port: u16,

    /// Which collection the kanban board is built from.
    #[serde(default)]
    pub kanban_source: KanbanSource,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            port: default_ui_port(),
            kanban_source: KanbanSource::default(),
        }
    }
}

fn default_ui_port() -> u16 {
    DEFAULT_UI_PORT
}
