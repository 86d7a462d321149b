//! Jira REST client for listing assigned issues and posting comments.

use async_trait::async_trait;
use serde::Deserialize;

use super::IssueTracker;
use crate::config::TrackerSection;
use crate::errors::{CapabilityError, CapabilityKind, CapabilityResult};
use crate::pipeline::Issue;

const CAPABILITY: CapabilityKind = CapabilityKind::IssueTracker;

/// Response from `GET /rest/api/3/search/jql` (subset of fields).
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    fields: Option<JiraFields>,
}

#[derive(Debug, Deserialize)]
struct JiraFields {
    #[serde(default)]
    summary: Option<String>,
}

/// Convert a search response into issues, keyed by the human-readable key
/// (`PROJ-1`) and falling back to the numeric id. Entries with neither are dropped.
fn issues_from_search(response: SearchResponse) -> Vec<Issue> {
    response
        .issues
        .into_iter()
        .filter_map(|raw| {
            let id = raw.key.or(raw.id).filter(|id| !id.trim().is_empty())?;
            let summary = raw.fields.and_then(|f| f.summary).unwrap_or_default();
            Some(Issue::new(id, summary))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Auth {
    Basic { email: String, token: String },
    Bearer(String),
}

#[derive(Debug, Clone)]
struct Connection {
    base_url: String,
    auth: Auth,
}

/// Comment payload for the v3 API, which only accepts Atlassian Document
/// Format. Each non-blank line of `text` becomes one paragraph.
fn comment_body(text: &str) -> serde_json::Value {
    let paragraphs: Vec<serde_json::Value> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::json!({
                "type": "paragraph",
                "content": [{ "type": "text", "text": line }],
            })
        })
        .collect();
    serde_json::json!({
        "body": {
            "type": "doc",
            "version": 1,
            "content": paragraphs,
        }
    })
}

pub struct JiraClient {
    http: reqwest::Client,
    config: TrackerSection,
    connection: Result<Connection, String>,
}

impl JiraClient {
    /// Build a client from config. Missing settings are reported on first use.
    pub fn from_config(http: reqwest::Client, config: &TrackerSection) -> Self {
        let connection = match (config.url(), config.token()) {
            (None, _) => Err("tracker.url is not set (and JIRA_URL is empty)".to_string()),
            (_, None) => Err(format!("{} is not set", config.token_env)),
            (Some(base_url), Some(token)) => {
                let auth = match config.user_email() {
                    Some(email) => Auth::Basic { email, token },
                    None => Auth::Bearer(token),
                };
                Ok(Connection { base_url, auth })
            }
        };
        Self {
            http,
            config: config.clone(),
            connection,
        }
    }

    fn connection(&self) -> CapabilityResult<&Connection> {
        self.connection
            .as_ref()
            .map_err(|reason| CapabilityError::NotConfigured {
                capability: CAPABILITY,
                reason: reason.clone(),
            })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder, auth: &Auth) -> reqwest::RequestBuilder {
        match auth {
            Auth::Basic { email, token } => builder.basic_auth(email, Some(token)),
            Auth::Bearer(token) => builder.bearer_auth(token),
        }
    }
}

async fn check_status(resp: reqwest::Response) -> CapabilityResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CapabilityError::Status {
        capability: CAPABILITY,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn list_assigned(&self, assignee: &str) -> CapabilityResult<Vec<Issue>> {
        let conn = self.connection()?;
        let jql = self.config.jql_for(assignee);
        tracing::debug!(%jql, "searching Jira");

        let request = self
            .http
            .get(format!("{}/rest/api/3/search/jql", conn.base_url))
            .header("Accept", "application/json")
            .query(&[("jql", jql.as_str()), ("fields", "summary")]);
        let resp = self
            .authorize(request, &conn.auth)
            .send()
            .await
            .map_err(|e| CapabilityError::http(CAPABILITY, e))?;
        let search: SearchResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| CapabilityError::http(CAPABILITY, e))?;

        let issues = issues_from_search(search);
        tracing::info!(assignee, count = issues.len(), "fetched assigned issues");
        Ok(issues)
    }

    async fn post_comment(&self, issue_id: &str, text: &str) -> CapabilityResult<()> {
        let conn = self.connection()?;
        let request = self
            .http
            .post(format!("{}/rest/api/3/issue/{}/comment", conn.base_url, issue_id))
            .header("Accept", "application/json")
            .json(&comment_body(text));
        let resp = self
            .authorize(request, &conn.auth)
            .send()
            .await
            .map_err(|e| CapabilityError::http(CAPABILITY, e))?;
        check_status(resp).await?;
        tracing::debug!(issue_id, "posted comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<Issue> {
        issues_from_search(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_search_response_uses_key_then_id() {
        let issues = parse(
            r#"{"issues":[
                {"id":"10001","key":"PROJ-1","fields":{"summary":"Fix rounding"}},
                {"id":"10002","fields":{"summary":"No key"}}
            ]}"#,
        );
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].id, "PROJ-1");
        assert_eq!(issues[0].summary, "Fix rounding");
        assert_eq!(issues[1].id, "10002");
    }

    #[test]
    fn test_search_response_tolerates_missing_fields() {
        let issues = parse(r#"{"issues":[{"key":"PROJ-3"},{"fields":{"summary":"orphan"}}]}"#);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, "PROJ-3");
        assert_eq!(issues[0].summary, "");
    }

    #[test]
    fn test_comment_body_is_document_format() {
        let body = comment_body("PR created: https://github.com/acme/payments/pull/7");
        assert_eq!(body["body"]["type"], "doc");
        assert_eq!(body["body"]["version"], 1);
        let paragraph = &body["body"]["content"][0];
        assert_eq!(paragraph["type"], "paragraph");
        assert_eq!(paragraph["content"][0]["type"], "text");
        assert_eq!(
            paragraph["content"][0]["text"],
            "PR created: https://github.com/acme/payments/pull/7"
        );
    }

    #[test]
    fn test_comment_body_skips_blank_lines() {
        let body = comment_body("first\n\n  \nsecond");
        let content = body["body"]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1]["content"][0]["text"], "second");
    }

    #[test]
    fn test_search_jql_response_with_paging_fields() {
        let issues = parse(
            r#"{"issues":[{"id":"10001","key":"PROJ-1","fields":{"summary":"Fix rounding"}}],
                "nextPageToken":"abc","isLast":true}"#,
        );
        assert_eq!(issues, vec![Issue::new("PROJ-1", "Fix rounding")]);
    }

    #[test]
    fn test_empty_search_response() {
        assert!(parse("{}").is_empty());
        assert!(parse(r#"{"issues":[]}"#).is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_not_configured() {
        let config = TrackerSection {
            url: None,
            token_env: "ISSUEFLOW_TEST_UNSET_JIRA_TOKEN".to_string(),
            ..Default::default()
        };
        // JIRA_URL may be set in the developer's shell; force the token to be missing.
        let client = JiraClient::from_config(reqwest::Client::new(), &config);
        let err = client.list_assigned("AI-Agent").await.unwrap_err();
        assert!(matches!(err, CapabilityError::NotConfigured { .. }));
        assert_eq!(err.capability(), CapabilityKind::IssueTracker);

        let err = client.post_comment("PROJ-1", "hi").await.unwrap_err();
        assert!(matches!(err, CapabilityError::NotConfigured { .. }));
    }

    #[test]
    fn test_missing_token_names_env_var() {
        let config = TrackerSection {
            url: Some("https://acme.atlassian.net".to_string()),
            token_env: "ISSUEFLOW_TEST_UNSET_JIRA_TOKEN".to_string(),
            ..Default::default()
        };
        let client = JiraClient::from_config(reqwest::Client::new(), &config);
        let err = client.connection().unwrap_err();
        assert!(err.to_string().contains("ISSUEFLOW_TEST_UNSET_JIRA_TOKEN"));
    }
}
