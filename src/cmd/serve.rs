//! HTTP server command (`taskboard serve`).

use anyhow::Result;
use tracing::warn;

use super::super::{Cli, DbArgs};
use super::{apply_db_args, load_config};

pub async fn cmd_serve(
    cli: &Cli,
    port: Option<u16>,
    host: Option<String>,
    db: &DbArgs,
    dev: bool,
) -> Result<()> {
    let mut config = load_config(cli)?;
    apply_db_args(&mut config, db)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if dev {
        config.server.dev = true;
    }

    let _guard = taskboard::logging::init(&config.logging, cli.verbose)?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    taskboard::board::server::start_server(config).await
}
