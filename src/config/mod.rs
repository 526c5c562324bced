//! Unified configuration system.
//!
//! Tiers, lowest priority first, merged field by field:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/entity-sync/config.yaml`
//! 3. **User** - `~/.entity-sync/config.yaml`
//! 4. **Explicit** - the file named by `ENTITY_SYNC_CONFIG_PATH` (or `--config`)
//! 5. **Environment** - individual overrides
//!
//! ## Environment Variables
//! - `ENTITY_SYNC_CONFIG_PATH` - Explicit config file
//! - `ENTITY_SYNC_BASE_URL` - Remote service base URL
//! - `ENTITY_SYNC_USER_ID` - User id sent with every request
//! - `ENTITY_SYNC_TIMEOUT_SECS` - Request timeout
//! - `ENTITY_SYNC_USER_DIR` - User config dir (default: `~/.entity-sync`)
//! - `ENTITY_SYNC_PROJECT_DIR` - Project config dir (default: `./entity-sync`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, apply_env_overrides};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
