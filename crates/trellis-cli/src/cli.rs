//! CLI - コマンド定義と実行

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use trellis_core::TrellisConfig;

use crate::plan::{self, Plan};

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Plan work from a task dependency graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the graph described by a JSON plan and print order and ready tasks
    Plan {
        /// Plan file (`tasks` and `dependencies`)
        plan: PathBuf,

        /// TOML configuration
        #[arg(long, env = "TRELLIS_CONFIG")]
        config: Option<PathBuf>,

        /// Task keys to mark done before reporting
        #[arg(long, value_delimiter = ',')]
        done: Vec<String>,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        config: PathBuf,
    },
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Command::Plan { plan, config, done } => {
                let config = match config {
                    Some(path) => TrellisConfig::load(&path)
                        .with_context(|| format!("loading config {}", path.display()))?,
                    None => TrellisConfig::default(),
                };
                let raw = std::fs::read_to_string(&plan)
                    .with_context(|| format!("reading plan {}", plan.display()))?;
                let parsed: Plan = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing plan {}", plan.display()))?;

                let report = plan::run(config, parsed, &done).await?;
                info!(
                    tasks = report.order.len(),
                    ready = report.ready.len(),
                    rejected = report.rejected.len(),
                    "plan evaluated"
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Command::CheckConfig { config } => {
                print!("{}", check_config(&config)?);
            }
        }
        Ok(())
    }
}

/// Load and validate `path`; return the effective settings as TOML.
pub fn check_config(path: &Path) -> anyhow::Result<String> {
    let effective = TrellisConfig::load(path)
        .with_context(|| format!("checking config {}", path.display()))?;
    Ok(toml::to_string(&effective)?)
}
