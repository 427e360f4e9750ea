use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Personal task board with durations, custom properties and streaks")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to taskboard.toml (defaults to ./taskboard.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        #[command(flatten)]
        db: DbArgs,

        /// Enable dev mode (permissive CORS, binds all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations
    Init {
        #[command(flatten)]
        db: DbArgs,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Clone)]
pub struct DbArgs {
    /// Database path
    #[arg(long, conflicts_with = "user_data")]
    pub db_path: Option<PathBuf>,

    /// Keep the database in the per-user data directory
    #[arg(long)]
    pub user_data: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default taskboard.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            host,
            db,
            dev,
        } => {
            cmd::cmd_serve(&cli, *port, host.clone(), db, *dev).await?;
        }
        Commands::Init { db } => cmd::cmd_init(&cli, db)?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
