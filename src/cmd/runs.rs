//! Saved run reports: `issueflow runs`.

use anyhow::Result;
use std::path::Path;

use issueflow::config::runs_dir;
use issueflow::report::ReportStore;

use super::super::RunsCommands;
use super::run::{format_history, print_outcomes};

pub fn cmd_runs(project_dir: &Path, command: Option<RunsCommands>) -> Result<()> {
    let store = ReportStore::new(&runs_dir(project_dir));

    match command {
        None | Some(RunsCommands::List) => {
            let runs = store.list()?;
            if runs.is_empty() {
                println!("No runs recorded in {}", store.runs_dir().display());
                return Ok(());
            }
            for path in runs {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match store.load(&path) {
                    Ok(report) => println!(
                        "{}  {:<12} {}/{} succeeded",
                        name, report.assignee, report.summary.succeeded, report.summary.total
                    ),
                    Err(e) => println!("{}  (unreadable: {})", name, e),
                }
            }
        }
        Some(RunsCommands::Show { run }) => {
            let path = store.find(&run)?;
            let report = store.load(&path)?;

            println!();
            println!("Run {}", report.run_id);
            println!("  assignee:       {}", report.assignee);
            println!("  started:        {}", report.started_at.to_rfc3339());
            if let Some(ended) = report.ended_at {
                println!("  ended:          {}", ended.to_rfc3339());
            }
            println!("  concurrency:    {}", report.concurrency);
            println!("  max fix rounds: {}", report.max_fix_rounds);
            println!();
            print_outcomes(&report.outcomes);
            println!();
            for outcome in &report.outcomes {
                println!("{}: {}", outcome.issue_id, format_history(&outcome.history));
            }
            println!();
        }
    }

    Ok(())
}
