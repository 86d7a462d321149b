use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use issueflow::logging::{self, LogFormat};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "issueflow")]
#[command(version, about = "Plan, code, review and auto-fix tracker issues into merge requests")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline over every issue assigned to the agent
    Run {
        /// Tracker assignee (defaults to pipeline.assignee)
        #[arg(long)]
        assignee: Option<String>,

        /// Worker pool size per stage
        #[arg(long)]
        concurrency: Option<usize>,

        /// Auto-fix rounds before the final review
        #[arg(long)]
        max_fix_rounds: Option<u32>,

        /// Print the run report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Report which capabilities are configured
    Check,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// List or show saved run reports
    Runs {
        #[command(subcommand)]
        command: Option<RunsCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default issueflow.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum RunsCommands {
    /// List saved runs, newest first
    List,
    /// Show one run by file path, file name or id prefix
    Show { run: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // A missing .env is normal.
    dotenvy::from_path(project_dir.join(".env")).ok();
    logging::init(cli.verbose, cli.log_format);

    match &cli.command {
        Commands::Run {
            assignee,
            concurrency,
            max_fix_rounds,
            json,
        } => {
            let overrides = cmd::RunOverrides {
                assignee: assignee.clone(),
                concurrency: *concurrency,
                max_fix_rounds: *max_fix_rounds,
            };
            cmd::cmd_run(&project_dir, overrides, *json).await?;
        }
        Commands::Check => cmd::cmd_check(&project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Runs { command } => cmd::cmd_runs(&project_dir, command.clone())?,
    }

    Ok(())
}
