//! External capabilities the pipeline sequences calls to.
//!
//! Each capability is a narrow async trait so stages can be driven by real
//! adapters in production and by scripted doubles in tests:
//!
//! | Trait            | Production adapter        |
//! |------------------|---------------------------|
//! | `IssueTracker`   | [`jira::JiraClient`]      |
//! | `SourceControl`  | [`github::GitHubClient`]  |
//! | `BuildRunner`    | [`command::CommandBuildRunner`] |
//! | `StaticAnalyzer` | [`command::CommandAnalyzer`]    |
//! | `TextGenerator`  | [`generator::GeminiClient`] or [`generator::PlaceholderGenerator`] |
//! | `Filesystem`     | [`fs::LocalFilesystem`]   |

pub mod command;
pub mod fs;
pub mod generator;
pub mod github;
pub mod jira;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::CapabilityResult;
use crate::pipeline::{AnalysisReport, Issue, TestReport, WorkspaceHandle};

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Issues currently assigned to `assignee` and waiting for work.
    async fn list_assigned(&self, assignee: &str) -> CapabilityResult<Vec<Issue>>;

    /// Post a status comment on an issue.
    async fn post_comment(&self, issue_id: &str, text: &str) -> CapabilityResult<()>;
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Check out a fresh working copy on a new branch.
    async fn create_workspace(&self, branch_name: &str) -> CapabilityResult<WorkspaceHandle>;

    /// Publish the branch and open a merge request. Returns its reference (URL).
    async fn open_merge_request(
        &self,
        branch_name: &str,
        title: &str,
        body: &str,
    ) -> CapabilityResult<String>;
}

#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run_tests(&self, workspace: &WorkspaceHandle) -> CapabilityResult<TestReport>;
}

#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn scan(&self, workspace: &WorkspaceHandle) -> CapabilityResult<AnalysisReport>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> CapabilityResult<String>;

    /// True when this generator returns marked placeholder text instead of
    /// calling a model.
    fn is_placeholder(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn write_file(&self, path: &Path, contents: &str) -> CapabilityResult<()>;
}

/// One handle per capability, injected into the stages and the orchestrator.
#[derive(Clone)]
pub struct Capabilities {
    pub tracker: Arc<dyn IssueTracker>,
    pub source_control: Arc<dyn SourceControl>,
    pub build_runner: Arc<dyn BuildRunner>,
    pub analyzer: Arc<dyn StaticAnalyzer>,
    pub generator: Arc<dyn TextGenerator>,
    pub filesystem: Arc<dyn Filesystem>,
}

impl Capabilities {
    /// Wire the production adapters from configuration.
    ///
    /// Only the text generator tolerates missing credentials (it degrades to
    /// placeholder output); the other adapters report `NotConfigured` when called.
    pub fn from_config(config: &crate::config::IssueflowToml) -> Self {
        let http = reqwest::Client::new();
        Self {
            tracker: Arc::new(jira::JiraClient::from_config(http.clone(), &config.tracker)),
            source_control: Arc::new(github::GitHubClient::from_config(http.clone(), &config.scm)),
            build_runner: Arc::new(command::CommandBuildRunner::new(config.build.clone())),
            analyzer: Arc::new(command::CommandAnalyzer::new(config.analysis.clone())),
            generator: generator::from_config(http, &config.generator),
            filesystem: Arc::new(fs::LocalFilesystem),
        }
    }
}
