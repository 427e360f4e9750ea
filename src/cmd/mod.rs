//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `init`   | `Init`           |
//! | `config` | `Config`         |

pub mod config;
pub mod init;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use serve::cmd_serve;

use anyhow::{Context, Result};
use taskboard::config::{TaskboardConfig, user_data_db_path};

use super::{Cli, DbArgs};

/// Effective configuration: file (or defaults), then environment overrides.
pub fn load_config(cli: &Cli) -> Result<TaskboardConfig> {
    let mut config = TaskboardConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env_overrides()?;
    Ok(config)
}

/// Apply `--db-path` / `--user-data` on top of the loaded configuration.
pub fn apply_db_args(config: &mut TaskboardConfig, db: &DbArgs) -> Result<()> {
    if let Some(path) = &db.db_path {
        config.database.path = path.clone();
    } else if db.user_data {
        config.database.path =
            user_data_db_path().context("No per-user data directory on this platform")?;
    }
    Ok(())
}
