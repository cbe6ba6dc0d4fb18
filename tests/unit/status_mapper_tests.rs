use std::collections::HashMap;

use issue_relay::jira::status::{is_resolved, StatusMapper};
use issue_relay::models::issue::IssueStatus;
use issue_relay::AppError;

#[test]
fn default_table_translates_known_statuses() {
    let mapper = StatusMapper::default();

    assert_eq!(mapper.map("To Do"), IssueStatus::Draft);
    assert_eq!(mapper.map("In Progress"), IssueStatus::Publish);
    assert_eq!(mapper.map("Done"), IssueStatus::Done);
    assert_eq!(mapper.map("Closed"), IssueStatus::Closed);
    assert_eq!(mapper.map("Archived"), IssueStatus::Archived);
    assert_eq!(mapper.map("Open"), IssueStatus::Publish);
    assert_eq!(mapper.map("Resolved"), IssueStatus::Done);
    assert_eq!(mapper.map("Reopened"), IssueStatus::Publish);
}

#[test]
fn unmapped_status_defaults_to_publish() {
    let mapper = StatusMapper::default();

    assert_eq!(mapper.map("Waiting for Support"), IssueStatus::Publish);
    assert_eq!(mapper.map(""), IssueStatus::Publish);
}

#[test]
fn status_names_are_case_sensitive() {
    let mapper = StatusMapper::default();

    // "done" is not "Done"; unknown names fall through to publish.
    assert_eq!(mapper.map("done"), IssueStatus::Publish);
}

#[test]
fn overrides_replace_default_entries() {
    let overrides = HashMap::from([
        ("Done".to_owned(), "archived".to_owned()),
        ("Triage".to_owned(), "draft".to_owned()),
    ]);
    let mapper = StatusMapper::with_overrides(&overrides).expect("valid overrides");

    assert_eq!(mapper.map("Done"), IssueStatus::Archived);
    assert_eq!(mapper.map("Triage"), IssueStatus::Draft);
    // Untouched defaults survive the merge.
    assert_eq!(mapper.map("Closed"), IssueStatus::Closed);
}

#[test]
fn override_with_unknown_target_is_a_config_error() {
    let overrides = HashMap::from([("Done".to_owned(), "banana".to_owned())]);

    let err = StatusMapper::with_overrides(&overrides).expect_err("invalid target");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn resolved_statuses_are_done_closed_archived() {
    assert!(is_resolved(IssueStatus::Done));
    assert!(is_resolved(IssueStatus::Closed));
    assert!(is_resolved(IssueStatus::Archived));

    assert!(!is_resolved(IssueStatus::Draft));
    assert!(!is_resolved(IssueStatus::Publish));
}
