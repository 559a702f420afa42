use std::collections::HashSet;

use super::{IssueType, QualityIssue, QualityRecommendation};

/// One templated recommendation per distinct (issue type, attribute),
/// in issue order.
pub(crate) fn recommend(schema_name: &str, issues: &[QualityIssue]) -> Vec<QualityRecommendation> {
    let mut seen = HashSet::new();
    issues
        .iter()
        .filter(|issue| seen.insert((issue.issue_type, issue.attribute.clone())))
        .map(|issue| QualityRecommendation {
            issue_type: issue.issue_type,
            priority: issue.severity,
            attribute: issue.attribute.clone(),
            action: action_for(schema_name, issue),
        })
        .collect()
}

fn action_for(schema_name: &str, issue: &QualityIssue) -> String {
    let attribute = issue.attribute.as_deref().unwrap_or("*");
    let observed = issue.observed * 100.0;
    let expected = issue.expected * 100.0;
    match issue.issue_type {
        IssueType::NoData => format!(
            "Verify that {schema_name} is still being reported; no records were sampled"
        ),
        IssueType::LowCompleteness => format!(
            "Make '{attribute}' mandatory in {schema_name} instrumentation or add a default \
             ({observed:.0}% complete, expected {expected:.0}%)"
        ),
        IssueType::InconsistentFormat => format!(
            "Add validation for attribute '{attribute}' so values match its format \
             ({observed:.0}% conform)"
        ),
        IssueType::InvalidValues => format!(
            "Normalize the type of '{attribute}' before ingestion ({observed:.0}% of values are valid)"
        ),
        IssueType::StaleData => format!(
            "Check the ingestion pipeline for {schema_name}; the newest record is older than expected"
        ),
        IssueType::MissingTimestamps => format!(
            "Report a 'timestamp' attribute on {schema_name} so freshness can be tracked"
        ),
        IssueType::DuplicateRecords => format!(
            "Deduplicate {schema_name} records at the source ({:.0}% duplicates)",
            100.0 - observed
        ),
        IssueType::DuplicateKeys => format!(
            "Ensure '{attribute}' is generated uniquely ({observed:.0}% of values are distinct)"
        ),
        IssueType::LowDimensionScore => format!(
            "Investigate {} in {schema_name} (score {observed:.0}%, benchmark {expected:.0}%)",
            issue.dimension
        ),
    }
}
