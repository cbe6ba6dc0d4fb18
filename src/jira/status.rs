//! Jira status name translation.

use std::collections::HashMap;

use crate::models::issue::IssueStatus;
use crate::{AppError, Result};

/// Translates Jira status names into issue lifecycle statuses.
///
/// Built from a fixed default table plus config overrides. Unmapped
/// names fall back to `Publish`, treating unknown statuses as
/// open/reopened work.
#[derive(Debug, Clone)]
pub struct StatusMapper {
    map: HashMap<String, IssueStatus>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        let map = [
            ("To Do", IssueStatus::Draft),
            ("In Progress", IssueStatus::Publish),
            ("Done", IssueStatus::Done),
            ("Closed", IssueStatus::Closed),
            ("Archived", IssueStatus::Archived),
            ("Open", IssueStatus::Publish),
            ("Resolved", IssueStatus::Done),
            ("Reopened", IssueStatus::Publish),
        ]
        .into_iter()
        .map(|(name, status)| (name.to_owned(), status))
        .collect();
        Self { map }
    }
}

impl StatusMapper {
    /// Build the mapper with config overrides merged over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override names an unknown
    /// lifecycle status.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut mapper = Self::default();
        for (name, target) in overrides {
            let status = IssueStatus::parse(target).ok_or_else(|| {
                AppError::Config(format!(
                    "status_map entry {name:?} targets unknown status {target:?}"
                ))
            })?;
            mapper.map.insert(name.clone(), status);
        }
        Ok(mapper)
    }

    /// Translate a Jira status name; unmapped names default to `Publish`.
    #[must_use]
    pub fn map(&self, jira_status: &str) -> IssueStatus {
        self.map
            .get(jira_status)
            .copied()
            .unwrap_or(IssueStatus::Publish)
    }
}

/// Whether a lifecycle status counts as resolved for notification
/// purposes.
#[must_use]
pub fn is_resolved(status: IssueStatus) -> bool {
    matches!(
        status,
        IssueStatus::Done | IssueStatus::Closed | IssueStatus::Archived
    )
}
