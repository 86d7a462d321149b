//! Scripted in-memory capability doubles for pipeline tests.
//!
//! Build/analysis results are scripted per issue id. Doubles that only see a
//! workspace recover the issue id from the branch name
//! (`{prefix}/{issue_id}-{suffix}`).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::stages::StageRunner;
use super::task::{AnalysisReport, Issue, TestReport, WorkspaceHandle};
use crate::capabilities::generator::PlaceholderGenerator;
use crate::capabilities::{
    BuildRunner, Capabilities, Filesystem, IssueTracker, SourceControl, StaticAnalyzer,
    TextGenerator,
};
use crate::errors::{CapabilityError, CapabilityKind, CapabilityResult};

fn issue_from_branch(branch: &str) -> &str {
    let rest = branch.split_once('/').map_or(branch, |(_, rest)| rest);
    rest.rsplit_once('-').map_or(rest, |(id, _)| id)
}

/// Ordered record of capability calls across all doubles.
#[derive(Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<Vec<Issue>>,
    comments: Mutex<Vec<(String, String)>>,
    listed_for: Mutex<Vec<String>>,
    fail_listing: Mutex<bool>,
    fail_comments: Mutex<bool>,
}

impl FakeTracker {
    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn fail_comments(&self) {
        *self.fail_comments.lock().unwrap() = true;
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn listed_for(&self) -> Vec<String> {
        self.listed_for.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_assigned(&self, assignee: &str) -> CapabilityResult<Vec<Issue>> {
        self.listed_for.lock().unwrap().push(assignee.to_string());
        if *self.fail_listing.lock().unwrap() {
            return Err(CapabilityError::Status {
                capability: CapabilityKind::IssueTracker,
                status: 401,
                body: "unauthorized".to_string(),
            });
        }
        Ok(self.issues.lock().unwrap().clone())
    }

    async fn post_comment(&self, issue_id: &str, text: &str) -> CapabilityResult<()> {
        if *self.fail_comments.lock().unwrap() {
            return Err(CapabilityError::protocol(
                CapabilityKind::IssueTracker,
                "comment rejected",
            ));
        }
        self.comments
            .lock()
            .unwrap()
            .push((issue_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub branch: String,
    pub title: String,
    pub body: String,
}

pub struct FakeSourceControl {
    log: Arc<CallLog>,
    failing: Mutex<HashSet<String>>,
    failing_merge_requests: Mutex<HashSet<String>>,
    merge_requests: Mutex<Vec<MergeRequest>>,
}

impl FakeSourceControl {
    fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            failing: Mutex::new(HashSet::new()),
            failing_merge_requests: Mutex::new(HashSet::new()),
            merge_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_workspace_for(&self, issue_id: &str) {
        self.failing.lock().unwrap().insert(issue_id.to_string());
    }

    pub fn fail_merge_request_for(&self, issue_id: &str) {
        self.failing_merge_requests
            .lock()
            .unwrap()
            .insert(issue_id.to_string());
    }

    pub fn merge_requests(&self) -> Vec<MergeRequest> {
        self.merge_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn create_workspace(&self, branch_name: &str) -> CapabilityResult<WorkspaceHandle> {
        self.log.push(format!("code:{branch_name}"));
        let issue_id = issue_from_branch(branch_name);
        if self.failing.lock().unwrap().contains(issue_id) {
            return Err(CapabilityError::CommandFailed {
                capability: CapabilityKind::SourceControl,
                program: "git clone".to_string(),
                code: Some(128),
                stderr: "repository not found".to_string(),
            });
        }
        Ok(WorkspaceHandle {
            branch_name: branch_name.to_string(),
            path: PathBuf::from("/workspaces").join(branch_name.replace('/', "-")),
        })
    }

    async fn open_merge_request(
        &self,
        branch_name: &str,
        title: &str,
        body: &str,
    ) -> CapabilityResult<String> {
        let issue_id = issue_from_branch(branch_name);
        if self.failing_merge_requests.lock().unwrap().contains(issue_id) {
            return Err(CapabilityError::Status {
                capability: CapabilityKind::SourceControl,
                status: 422,
                body: "Validation Failed".to_string(),
            });
        }
        let mut requests = self.merge_requests.lock().unwrap();
        requests.push(MergeRequest {
            branch: branch_name.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(format!("https://github.com/acme/payments/pull/{}", requests.len()))
    }
}

/// Pass/fail sequence per issue; the last entry repeats, unscripted issues pass.
#[derive(Default)]
struct Script {
    results: Mutex<HashMap<String, Vec<bool>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Script {
    fn set(&self, issue_id: &str, results: &[bool]) {
        self.results
            .lock()
            .unwrap()
            .insert(issue_id.to_string(), results.to_vec());
    }

    fn next(&self, issue_id: &str) -> bool {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(issue_id.to_string()).or_insert(0);
        let index = *count;
        *count += 1;
        match self.results.lock().unwrap().get(issue_id) {
            Some(results) => results
                .get(index)
                .or_else(|| results.last())
                .copied()
                .unwrap_or(true),
            None => true,
        }
    }

    fn calls(&self, issue_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(issue_id)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct ScriptedBuildRunner {
    script: Script,
}

impl ScriptedBuildRunner {
    pub fn script(&self, issue_id: &str, results: &[bool]) {
        self.script.set(issue_id, results);
    }

    pub fn calls(&self, issue_id: &str) -> usize {
        self.script.calls(issue_id)
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn run_tests(&self, workspace: &WorkspaceHandle) -> CapabilityResult<TestReport> {
        let passed = self.script.next(issue_from_branch(&workspace.branch_name));
        let report = if passed {
            TestReport::new(true, "Tests run: 4, Failures: 0, Errors: 0", "").with_counts(4, 4)
        } else {
            TestReport::new(false, "Tests run: 4, Failures: 1, Errors: 0\nFAIL", "expected 10.00")
                .with_counts(4, 3)
        };
        Ok(report)
    }
}

pub struct ScriptedAnalyzer {
    log: Arc<CallLog>,
    script: Script,
    crash_after: Mutex<HashMap<String, usize>>,
}

impl ScriptedAnalyzer {
    fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            script: Script::default(),
            crash_after: Mutex::new(HashMap::new()),
        }
    }

    /// Every scan of `issue_id` after the first `after` ones errors out.
    pub fn crash_after(&self, issue_id: &str, after: usize) {
        self.crash_after
            .lock()
            .unwrap()
            .insert(issue_id.to_string(), after);
    }

    pub fn script(&self, issue_id: &str, results: &[bool]) {
        self.script.set(issue_id, results);
    }

    pub fn calls(&self, issue_id: &str) -> usize {
        self.script.calls(issue_id)
    }
}

#[async_trait]
impl StaticAnalyzer for ScriptedAnalyzer {
    async fn scan(&self, workspace: &WorkspaceHandle) -> CapabilityResult<AnalysisReport> {
        self.log.push(format!("review:{}", workspace.branch_name));
        let issue_id = issue_from_branch(&workspace.branch_name);
        let attempt = self.script.calls(issue_id);
        let passed = self.script.next(issue_id);
        if let Some(&after) = self.crash_after.lock().unwrap().get(issue_id)
            && attempt >= after
        {
            return Err(CapabilityError::CommandFailed {
                capability: CapabilityKind::StaticAnalyzer,
                program: "sonar-scanner".to_string(),
                code: Some(2),
                stderr: "scanner crashed".to_string(),
            });
        }
        let report = if passed {
            AnalysisReport::new(true, "ANALYSIS SUCCESSFUL").with_score(92)
        } else {
            AnalysisReport::new(false, "quality gate failed: 2 new bugs").with_score(41)
        };
        Ok(report)
    }
}

/// Echoes the first prompt line back; can be told to fail, panic or stall.
pub struct FakeGenerator {
    log: Arc<CallLog>,
    delay: Mutex<Duration>,
    fail_on: Mutex<Vec<String>>,
    panic_on: Mutex<Vec<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeGenerator {
    fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            delay: Mutex::new(Duration::ZERO),
            fail_on: Mutex::new(Vec::new()),
            panic_on: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn fail_when_prompt_contains(&self, needle: &str) {
        self.fail_on.lock().unwrap().push(needle.to_string());
    }

    pub fn panic_when_prompt_contains(&self, needle: &str) {
        self.panic_on.lock().unwrap().push(needle.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn matches(list: &Mutex<Vec<String>>, prompt: &str) -> bool {
        list.lock().unwrap().iter().any(|n| prompt.contains(n.as_str()))
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first_line = prompt.lines().next().unwrap_or_default().to_string();
        if prompt.starts_with("Create a coding plan") {
            self.log.push(format!("plan:{first_line}"));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::matches(&self.panic_on, prompt) {
            panic!("generator blew up");
        }
        if Self::matches(&self.fail_on, prompt) {
            return Err(CapabilityError::Status {
                capability: CapabilityKind::TextGenerator,
                status: 503,
                body: "model overloaded".to_string(),
            });
        }
        Ok(format!("generated: {first_line}"))
    }
}

#[derive(Default)]
pub struct MemoryFilesystem {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryFilesystem {
    pub fn read(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Filesystem for MemoryFilesystem {
    async fn write_file(&self, path: &Path, contents: &str) -> CapabilityResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

/// A full set of doubles plus builders for stage runners and capability bundles.
pub struct Harness {
    pub log: Arc<CallLog>,
    pub tracker: Arc<FakeTracker>,
    pub source_control: Arc<FakeSourceControl>,
    pub build_runner: Arc<ScriptedBuildRunner>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub generator: Arc<FakeGenerator>,
    pub filesystem: Arc<MemoryFilesystem>,
    placeholder_generator: bool,
}

impl Harness {
    pub fn new() -> Self {
        let log = Arc::new(CallLog::default());
        Self {
            tracker: Arc::new(FakeTracker::default()),
            source_control: Arc::new(FakeSourceControl::new(log.clone())),
            build_runner: Arc::new(ScriptedBuildRunner::default()),
            analyzer: Arc::new(ScriptedAnalyzer::new(log.clone())),
            generator: Arc::new(FakeGenerator::new(log.clone())),
            filesystem: Arc::new(MemoryFilesystem::default()),
            log,
            placeholder_generator: false,
        }
    }

    pub fn with_issues(self, issues: Vec<Issue>) -> Self {
        *self.tracker.issues.lock().unwrap() = issues;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.generator.delay.lock().unwrap() = delay;
        self
    }

    pub fn with_placeholder_generator(mut self) -> Self {
        self.placeholder_generator = true;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        let generator: Arc<dyn TextGenerator> = if self.placeholder_generator {
            Arc::new(PlaceholderGenerator)
        } else {
            self.generator.clone()
        };
        Capabilities {
            tracker: self.tracker.clone(),
            source_control: self.source_control.clone(),
            build_runner: self.build_runner.clone(),
            analyzer: self.analyzer.clone(),
            generator,
            filesystem: self.filesystem.clone(),
        }
    }

    pub fn runner(&self) -> StageRunner {
        StageRunner::new(self.capabilities(), "Example.java", "feature")
    }
}

#[test]
fn test_issue_from_branch() {
    assert_eq!(issue_from_branch("feature/PROJ-1-a1b2c3"), "PROJ-1");
    assert_eq!(issue_from_branch("feature/A-12-ffffff"), "A-12");
}
