//! Jira webhook payload extraction.

use serde_json::Value;

use crate::models::issue::MappedIssue;

use super::status::StatusMapper;

/// Extract issue fields from a Jira webhook payload.
///
/// Pure extraction with empty-string fallbacks for every field; never
/// fails on missing or oddly-shaped input. Callers decide what an empty
/// `external_id` means.
#[must_use]
pub fn map(payload: &Value, statuses: &StatusMapper) -> MappedIssue {
    let issue = &payload["issue"];
    let fields = &issue["fields"];

    let status_name = fields["status"]["name"].as_str().unwrap_or("To Do");

    MappedIssue {
        external_id: issue["key"].as_str().unwrap_or_default().to_owned(),
        title: fields["summary"].as_str().unwrap_or_default().to_owned(),
        content: convert_description(fields["description"].as_str().unwrap_or_default()),
        status: statuses.map(status_name),
        event_type: payload["webhookEvent"].as_str().unwrap_or_default().to_owned(),
        project: fields["project"]["key"].as_str().unwrap_or_default().to_owned(),
        issue_type: fields["issuetype"]["name"].as_str().unwrap_or_default().to_owned(),
        priority: fields["priority"]["name"].as_str().unwrap_or_default().to_owned(),
    }
}

/// Normalize a Jira description for storage.
///
/// Jira occasionally double-escapes line breaks in webhook bodies.
fn convert_description(description: &str) -> String {
    description.replace("\\n", "\n")
}
