mod logging;
mod migrate;
mod status;

pub use migrate::MigrateCommand;
pub use status::StatusCommand;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use strata::Strata;
use strata_core::config::StrataConfig;

/// STRATA - batched database migrations
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run pending migrations.
    Migrate(MigrateCommand),

    /// Show applied and pending migrations.
    Status(StatusCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Migrate(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute().await,
        }
    }
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = "strata.toml")]
    pub config: String,

    /// Only act on this database.
    #[arg(short, long)]
    pub database: Option<String>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

impl TargetArgs {
    /// Load `.env` and the configuration, install logging and build the runner.
    fn load(&self) -> Result<Strata> {
        dotenvy::dotenv().ok();

        let config_path = Path::new(&self.config);
        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nCreate a strata.toml with at least one [databases.<id>] table.",
                self.config
            );
        }

        let config = StrataConfig::from_file(config_path)
            .with_context(|| format!("Failed to load {}", self.config))?;
        logging::init(&config.logging);

        if let Some(id) = &self.database {
            config.database(id)?;
        }

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new(""));
        let strata = Strata::builder()
            .config(config)
            .base_dir(base_dir)
            .build()
            .context("Failed to load migrations")?;
        Ok(strata)
    }
}
