//! Configuration for issueflow, read from `.issueflow/issueflow.toml`.
//!
//! Values are layered file → environment → CLI flags. Secrets never live in the
//! file: each section names the environment variable its token is read from.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! assignee = "AI-Agent"
//! concurrency = 3
//! max_fix_rounds = 3
//! terminal_failed = true
//! artifact_path = "Example.java"
//!
//! [tracker]
//! url = "https://example.atlassian.net"
//! user_email = "bot@example.com"
//! token_env = "JIRA_TOKEN"
//! jql = "assignee={assignee} AND status='To Do'"
//!
//! [scm]
//! repo = "owner/repo"
//! base_branch = "main"
//! branch_prefix = "feature"
//! workspace_root = "/tmp/issueflow"
//! api_url = "https://api.github.com"
//! token_env = "GH_TOKEN"
//!
//! [build]
//! program = "mvn"
//! args = ["-B", "test"]
//!
//! [analysis]
//! program = "sonar-scanner"
//! args = []
//!
//! [generator]
//! model = "gemini-2.5-pro"
//! endpoint = "https://generativelanguage.googleapis.com/v1beta"
//! api_key_env = "GEMINI_API_KEY"
//! max_output_tokens = 512
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Directory under the project root holding config and run reports.
pub const CONFIG_DIR: &str = ".issueflow";
pub const CONFIG_FILE: &str = "issueflow.toml";

pub fn config_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_DIR)
}

pub fn runs_dir(project_dir: &Path) -> PathBuf {
    config_dir(project_dir).join("runs")
}

/// Read an environment variable, treating empty values as unset.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Tracker assignee whose issues are processed
    #[serde(default = "default_assignee")]
    pub assignee: String,
    /// Worker pool size for each barrier
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Correction rounds before the final review
    #[serde(default = "default_max_fix_rounds")]
    pub max_fix_rounds: u32,
    /// Record an explicit `failed` state when the fix budget is exhausted
    #[serde(default = "default_terminal_failed")]
    pub terminal_failed: bool,
    /// Workspace-relative path of the generated code artifact
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
}

fn default_assignee() -> String {
    "AI-Agent".to_string()
}

fn default_concurrency() -> usize {
    3
}

fn default_max_fix_rounds() -> u32 {
    3
}

fn default_terminal_failed() -> bool {
    true
}

fn default_artifact_path() -> String {
    "Example.java".to_string()
}

/// True when `path` names a file below a workspace root: relative, non-empty
/// and free of `..` components.
pub fn is_workspace_relative(path: &Path) -> bool {
    let mut normal = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal
}

impl PipelineSection {
    /// The artifact path, rejected unless it stays inside the workspace.
    pub fn artifact_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(self.artifact_path.trim());
        if !is_workspace_relative(&path) {
            anyhow::bail!(
                "pipeline.artifact_path '{}' must be a relative path inside the workspace",
                self.artifact_path
            );
        }
        Ok(path)
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            assignee: default_assignee(),
            concurrency: default_concurrency(),
            max_fix_rounds: default_max_fix_rounds(),
            terminal_failed: default_terminal_failed(),
            artifact_path: default_artifact_path(),
        }
    }
}

/// Jira connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    /// Base URL, falls back to `JIRA_URL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Account email for basic auth, falls back to `JIRA_USER_EMAIL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Environment variable holding the API token
    #[serde(default = "default_tracker_token_env")]
    pub token_env: String,
    /// JQL template; `{assignee}` is substituted
    #[serde(default = "default_jql")]
    pub jql: String,
}

fn default_tracker_token_env() -> String {
    "JIRA_TOKEN".to_string()
}

fn default_jql() -> String {
    "assignee={assignee} AND status='To Do'".to_string()
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            url: None,
            user_email: None,
            token_env: default_tracker_token_env(),
            jql: default_jql(),
        }
    }
}

impl TrackerSection {
    pub fn url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| env_nonempty("JIRA_URL"))
            .map(|u| u.trim_end_matches('/').to_string())
    }

    pub fn user_email(&self) -> Option<String> {
        self.user_email
            .clone()
            .or_else(|| env_nonempty("JIRA_USER_EMAIL"))
    }

    pub fn token(&self) -> Option<String> {
        env_nonempty(&self.token_env)
    }

    pub fn jql_for(&self, assignee: &str) -> String {
        self.jql.replace("{assignee}", assignee)
    }
}

/// GitHub repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmSection {
    /// `owner/repo`, falls back to `GH_REPO`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Directory workspaces are cloned under
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API token
    #[serde(default = "default_scm_token_env")]
    pub token_env: String,
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_branch_prefix() -> String {
    "feature".to_string()
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("issueflow")
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_scm_token_env() -> String {
    "GH_TOKEN".to_string()
}

impl Default for ScmSection {
    fn default() -> Self {
        Self {
            repo: None,
            base_branch: default_base_branch(),
            branch_prefix: default_branch_prefix(),
            workspace_root: default_workspace_root(),
            api_url: default_api_url(),
            token_env: default_scm_token_env(),
        }
    }
}

impl ScmSection {
    pub fn repo(&self) -> Option<String> {
        self.repo.clone().or_else(|| env_nonempty("GH_REPO"))
    }

    pub fn token(&self) -> Option<String> {
        env_nonempty(&self.token_env)
    }
}

/// An external command run inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSection {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Shell-like rendering for display.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn default_build() -> CommandSection {
    CommandSection::new("mvn", &["-B", "test"])
}

fn default_analysis() -> CommandSection {
    CommandSection::new("sonar-scanner", &[])
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the API key; unset means placeholder mode
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_max_output_tokens() -> u32 {
    512
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl GeneratorSection {
    pub fn api_key(&self) -> Option<String> {
        env_nonempty(&self.api_key_env)
    }
}

/// The complete issueflow.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueflowToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub scm: ScmSection,
    #[serde(default = "default_build")]
    pub build: CommandSection,
    #[serde(default = "default_analysis")]
    pub analysis: CommandSection,
    #[serde(default)]
    pub generator: GeneratorSection,
}

impl Default for IssueflowToml {
    fn default() -> Self {
        Self {
            pipeline: PipelineSection::default(),
            tracker: TrackerSection::default(),
            scm: ScmSection::default(),
            build: default_build(),
            analysis: default_analysis(),
            generator: GeneratorSection::default(),
        }
    }
}

impl IssueflowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse issueflow.toml")
    }

    /// Load from `<dir>/issueflow.toml`, or defaults if the file doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize issueflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides for the numeric pipeline knobs.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_nonempty("ISSUEFLOW_CONCURRENCY") {
            self.pipeline.concurrency = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid ISSUEFLOW_CONCURRENCY '{}'", value))?;
        }
        if let Some(value) = env_nonempty("ISSUEFLOW_MAX_FIX_ROUNDS") {
            self.pipeline.max_fix_rounds = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid ISSUEFLOW_MAX_FIX_ROUNDS '{}'", value))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.concurrency == 0 {
            warnings.push("pipeline.concurrency is 0; one worker will be used".to_string());
        }
        if let Err(e) = self.pipeline.artifact_path() {
            warnings.push(e.to_string());
        }
        if self.tracker.url().is_none() {
            warnings.push("tracker.url is not set (and JIRA_URL is empty)".to_string());
        }
        let unknown_placeholders = self.tracker.jql.replace("{assignee}", "");
        if unknown_placeholders.contains('{') || unknown_placeholders.contains('}') {
            warnings.push(format!(
                "tracker.jql '{}' contains placeholders other than {{assignee}}",
                self.tracker.jql
            ));
        }
        if self.scm.repo().is_none() {
            warnings.push("scm.repo is not set (and GH_REPO is empty)".to_string());
        } else if self.scm.repo().is_some_and(|r| r.split('/').count() != 2) {
            warnings.push("scm.repo should look like 'owner/repo'".to_string());
        }
        if self.build.program.trim().is_empty() {
            warnings.push("build.program is empty".to_string());
        }
        if self.analysis.program.trim().is_empty() {
            warnings.push("analysis.program is empty".to_string());
        }

        warnings
    }
}
