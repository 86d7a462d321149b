//! Configuration view and validation commands: `issueflow config`.

use anyhow::Result;
use std::path::Path;

use issueflow::config::{CONFIG_FILE, IssueflowToml, config_dir};

use super::super::ConfigCommands;

fn print_effective(toml: &IssueflowToml) -> Result<()> {
    let rendered = toml::to_string_pretty(toml)?;
    for line in rendered.lines() {
        println!("  {}", line);
    }
    Ok(())
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let dir = config_dir(project_dir);
    let config_path = dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Issueflow Configuration");
            println!("=======================");
            println!();

            let mut toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                IssueflowToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                IssueflowToml::default()
            };
            println!();

            print_effective(&toml)?;
            println!();

            toml.apply_env()?;
            println!("Effective values (with env overrides):");
            println!("  tracker.url = {}", toml.tracker.url().as_deref().unwrap_or("<unset>"));
            println!("  scm.repo = {}", toml.scm.repo().as_deref().unwrap_or("<unset>"));
            println!("  pipeline.concurrency = {}", toml.pipeline.concurrency);
            println!("  pipeline.max_fix_rounds = {}", toml.pipeline.max_fix_rounds);
            println!();

            if !config_path.exists() {
                println!("Run 'issueflow config init' to create {}.", CONFIG_FILE);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let toml = IssueflowToml::load_or_default(&dir)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&dir)?;
            IssueflowToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [tracker] url, user_email, jql");
            println!("  - [scm] repo, base_branch, branch_prefix");
            println!("  - [build] / [analysis] commands run in each workspace");
            println!("  - [pipeline] concurrency, max_fix_rounds");
            println!();
            println!("Secrets stay in the environment: JIRA_TOKEN, GH_TOKEN, GEMINI_API_KEY.");
            println!();
        }
    }

    Ok(())
}
