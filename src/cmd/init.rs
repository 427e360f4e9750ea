//! Database initialization command (`taskboard init`).

use anyhow::Result;

use super::super::{Cli, DbArgs};
use super::{apply_db_args, load_config};

pub fn cmd_init(cli: &Cli, db: &DbArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    apply_db_args(&mut config, db)?;

    let path = &config.database.path;
    taskboard::board::server::open_database(path)?;
    println!("Taskboard database initialized at {}", path.display());
    Ok(())
}
