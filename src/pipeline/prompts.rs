//! Prompt and artifact text produced by the stages.

use super::task::ReviewLogs;

/// Prompt asking for an implementation plan.
pub fn plan_prompt(summary: &str) -> String {
    format!("Create a coding plan for issue: {summary}")
}

/// Body of the generated code artifact written by the code stage.
pub fn initial_artifact(issue_id: &str, plan: &str) -> String {
    let commented_plan: String = plan.lines().map(|line| format!("// {line}\n")).collect();
    format!("// Generated code for issue {issue_id}\n// Plan:\n{commented_plan}")
}

/// Prompt asking for corrected code after a failed review.
pub fn fix_prompt(plan: &str, logs: &ReviewLogs) -> String {
    let mut prompt = String::new();
    prompt.push_str("The following plan was implemented but the review failed.\n\n");
    prompt.push_str("## Plan\n");
    prompt.push_str(plan);
    prompt.push_str("\n\n## Test output\n");
    prompt.push_str(&logs.test_stdout);
    if !logs.test_stderr.trim().is_empty() {
        prompt.push_str("\n\n## Test errors\n");
        prompt.push_str(&logs.test_stderr);
    }
    prompt.push_str("\n\n## Static analysis\n");
    prompt.push_str(&logs.analysis_logs);
    prompt.push_str("\n\nFix the code so the tests and the analysis pass. Provide only corrected code.");
    prompt
}
