//! Cross-schema insights and follow-up recommendations.

use super::types::{Insight, InsightType, Recommendation};
use crate::patterns::{DetectedPattern, PatternType};
use crate::relationships::{Relationship, RelationshipType};
use crate::schema::Schema;

/// Overall quality below this is reported.
const LOW_QUALITY: f64 = 0.7;
/// Relationships at or above this are reported.
const STRONG_RELATIONSHIP: f64 = 0.7;
/// Estimated daily volume at or above this is reported.
const HIGH_VOLUME: u64 = 10_000_000;

/// Insights about `schemas` and `relationships`, most important first.
pub fn derive_insights(schemas: &[Schema], relationships: &[Relationship]) -> Vec<Insight> {
    let mut insights = Vec::new();

    for schema in schemas {
        let score = schema.quality.overall_score;
        if score < LOW_QUALITY {
            insights.push(Insight {
                insight_type: InsightType::LowQuality,
                title: format!("{} has low data quality", schema.name),
                description: format!(
                    "Overall quality {:.0}% (completeness {:.0}%, consistency {:.0}%, timeliness {:.0}%)",
                    score * 100.0,
                    schema.quality.completeness * 100.0,
                    schema.quality.consistency * 100.0,
                    schema.quality.timeliness * 100.0,
                ),
                importance: (1.0 - score).clamp(0.0, 1.0),
                schemas: vec![schema.name.clone()],
            });
        }

        if schema.data_volume.estimated_daily_volume >= HIGH_VOLUME {
            insights.push(Insight {
                insight_type: InsightType::HighVolume,
                title: format!("{} is a high-volume event type", schema.name),
                description: format!(
                    "About {} events per day ({:.0} per minute)",
                    schema.data_volume.estimated_daily_volume, schema.data_volume.events_per_minute
                ),
                importance: 0.4,
                schemas: vec![schema.name.clone()],
            });
        }

        for detected in &schema.patterns {
            if let Some(insight) = pattern_insight(detected) {
                insights.push(insight);
            }
        }
    }

    for relationship in relationships
        .iter()
        .filter(|r| r.confidence >= STRONG_RELATIONSHIP)
    {
        let (insight_type, title) = match relationship.relationship_type {
            RelationshipType::Join => (
                InsightType::JoinPath,
                format!("{} joins {}", relationship.source, relationship.target),
            ),
            RelationshipType::Correlation | RelationshipType::Temporal => (
                InsightType::StrongCorrelation,
                format!("{} moves with {}", relationship.source, relationship.target),
            ),
            RelationshipType::Hierarchy | RelationshipType::Derived => continue,
        };
        insights.push(Insight {
            insight_type,
            title,
            description: format!(
                "{} relationship with {:.0}% confidence backed by {} evidence entries",
                relationship.relationship_type,
                relationship.confidence * 100.0,
                relationship.evidence.len()
            ),
            importance: relationship.confidence,
            schemas: dedup(vec![
                relationship.source.schema.clone(),
                relationship.target.schema.clone(),
            ]),
        });
    }

    insights.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.title.cmp(&b.title))
    });
    insights
}

fn pattern_insight(detected: &DetectedPattern) -> Option<Insight> {
    let pattern = &detected.pattern;
    let insight_type = match pattern.pattern_type {
        PatternType::Seasonal => InsightType::Seasonality,
        PatternType::Trend => InsightType::Trend,
        PatternType::Anomaly => InsightType::Anomaly,
        _ => return None,
    };
    let subject = match &detected.attribute {
        Some(attribute) => format!("{}.{}", detected.event_type, attribute),
        None => format!("{} record rate", detected.event_type),
    };
    Some(Insight {
        insight_type,
        title: format!("{insight_type} in {subject}"),
        description: pattern.description.clone(),
        // Value patterns rank below relationship and quality findings.
        importance: pattern.confidence * 0.8,
        schemas: vec![detected.event_type.clone()],
    })
}

/// Follow-ups for the insights, one per insight type and schema set.
pub fn recommend(insights: &[Insight]) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = Vec::new();
    for insight in insights {
        let (priority, title, action) = match insight.insight_type {
            InsightType::LowQuality => (
                1,
                format!("Improve data quality of {}", insight.schemas.join(", ")),
                "Review the quality report for missing, malformed and stale attributes at the instrumentation source".to_string(),
            ),
            InsightType::Anomaly => (
                2,
                format!("Investigate anomalies in {}", insight.schemas.join(", ")),
                "Compare anomalous periods with deployments and incidents, then consider an alert condition".to_string(),
            ),
            InsightType::JoinPath => (
                2,
                format!("Correlate {} in queries", insight.schemas.join(" and ")),
                format!("{}; use the shared attribute to facet or join both event types", insight.title),
            ),
            InsightType::StrongCorrelation => (
                3,
                format!("Chart {} together", insight.schemas.join(" and ")),
                format!("{}; plot both series on one dashboard to confirm the dependency", insight.title),
            ),
            InsightType::Seasonality => (
                3,
                format!("Use seasonal baselines for {}", insight.schemas.join(", ")),
                "Prefer baseline alert conditions over static thresholds for seasonal series".to_string(),
            ),
            InsightType::Trend => (
                3,
                format!("Plan capacity for {}", insight.schemas.join(", ")),
                "Track the trend over a longer window and review retention and ingest limits".to_string(),
            ),
            InsightType::HighVolume => (
                4,
                format!("Sample {} before wide queries", insight.schemas.join(", ")),
                "Narrow time windows or add filters; full scans of this event type are expensive".to_string(),
            ),
        };
        if recommendations.iter().any(|r| r.title == title) {
            continue;
        }
        recommendations.push(Recommendation {
            priority,
            title,
            action,
            schemas: insight.schemas.clone(),
        });
    }
    recommendations.sort_by_key(|r| r.priority);
    recommendations
}

fn dedup(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}
