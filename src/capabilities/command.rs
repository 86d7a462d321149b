//! Build runner and static analyzer backed by external commands.
//!
//! Both run a configured program inside the workspace and treat a zero exit
//! status as a pass. A non-zero exit is a normal (failing) report, not an error;
//! only a failure to launch the program is a `CapabilityError`.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{BuildRunner, StaticAnalyzer};
use crate::config::CommandSection;
use crate::errors::{CapabilityError, CapabilityKind, CapabilityResult};
use crate::pipeline::{AnalysisReport, TestReport, WorkspaceHandle};

// Maven surefire summary, e.g. "Tests run: 12, Failures: 1, Errors: 0, Skipped: 2"
static SUREFIRE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+)(?:,\s*Skipped:\s*(\d+))?")
        .unwrap()
});

static QUALITY_SCORE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)quality score:\s*(\d{1,3})").unwrap());

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` in `cwd`, capturing stdout and stderr.
pub async fn run_captured(
    capability: CapabilityKind,
    command: &CommandSection,
    cwd: &Path,
) -> CapabilityResult<CapturedOutput> {
    tracing::debug!(%capability, command = %command.display(), cwd = %cwd.display(), "running command");

    let output = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| CapabilityError::Spawn {
            capability,
            program: command.program.clone(),
            source,
        })?;

    Ok(CapturedOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Extract `(total, passed)` from the last surefire summary line in `output`.
///
/// Skipped tests count toward neither failures nor passes.
pub fn parse_test_counts(output: &str) -> Option<(u32, u32)> {
    let caps = SUREFIRE_REGEX.captures_iter(output).last()?;
    let number = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let total = number(1);
    let failed = number(2) + number(3) + number(4);
    Some((total, total.saturating_sub(failed)))
}

/// Extract a 0-100 quality score from scanner output, if one is printed.
pub fn parse_quality_score(output: &str) -> Option<u8> {
    let caps = QUALITY_SCORE_REGEX.captures_iter(output).last()?;
    let score: u32 = caps.get(1)?.as_str().parse().ok()?;
    u8::try_from(score.min(100)).ok()
}

/// Runs the project's test command (`mvn -B test` by default).
pub struct CommandBuildRunner {
    command: CommandSection,
}

impl CommandBuildRunner {
    pub fn new(command: CommandSection) -> Self {
        Self { command }
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn run_tests(&self, workspace: &WorkspaceHandle) -> CapabilityResult<TestReport> {
        let output = run_captured(CapabilityKind::BuildRunner, &self.command, &workspace.path).await?;
        let counts = parse_test_counts(&output.stdout);
        let mut report = TestReport::new(output.success, output.stdout, output.stderr);
        if let Some((total, passed)) = counts {
            report = report.with_counts(total, passed);
        }
        tracing::debug!(branch = %workspace.branch_name, passed = report.passed, "tests finished");
        Ok(report)
    }
}

/// Runs the project's static analysis command (`sonar-scanner` by default).
pub struct CommandAnalyzer {
    command: CommandSection,
}

impl CommandAnalyzer {
    pub fn new(command: CommandSection) -> Self {
        Self { command }
    }
}

#[async_trait]
impl StaticAnalyzer for CommandAnalyzer {
    async fn scan(&self, workspace: &WorkspaceHandle) -> CapabilityResult<AnalysisReport> {
        let output =
            run_captured(CapabilityKind::StaticAnalyzer, &self.command, &workspace.path).await?;
        let score = parse_quality_score(&output.stdout);
        let logs = if output.success {
            output.stdout
        } else {
            format!("{}\n{}", output.stdout, output.stderr)
        };
        let mut report = AnalysisReport::new(output.success, logs);
        if let Some(score) = score {
            report = report.with_score(score);
        }
        tracing::debug!(branch = %workspace.branch_name, passed = report.passed, "scan finished");
        Ok(report)
    }
}
