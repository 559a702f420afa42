use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, ErrorClass};
use crate::patterns::DetectedPattern;
use crate::relationships::Relationship;
use crate::schema::Schema;

/// Which event types [`super::DiscoveryEngine::discover_schemas`] profiles.
///
/// Patterns are shell-style globs (`Transaction*`, `*Sample`); an empty
/// include list accepts every event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Event types with fewer records in the window are skipped.
    #[serde(default)]
    pub min_record_count: u64,
    /// Upper bound on profiled event types, in name order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_schemas: Option<usize>,
}

impl DiscoveryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn min_record_count(mut self, count: u64) -> Self {
        self.min_record_count = count;
        self
    }

    pub fn max_schemas(mut self, max: usize) -> Self {
        self.max_schemas = Some(max);
        self
    }
}

/// Caller intent for [`super::DiscoveryEngine::discover_with_intelligence`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryHints {
    /// Terms matched against event type and attribute names.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// A known domain such as `apm`, `browser` or `infrastructure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Free-form statement of what the caller wants to learn; its words
    /// count as weak keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub filter: DiscoveryFilter,
    /// Schemas kept after ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_schemas: Option<usize>,
    #[serde(default)]
    pub mine_relationships: bool,
}

impl DiscoveryHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn filter(mut self, filter: DiscoveryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn max_schemas(mut self, max: usize) -> Self {
        self.max_schemas = Some(max);
        self
    }

    pub fn with_relationships(mut self) -> Self {
        self.mine_relationships = true;
        self
    }

    /// Whether any ranking input was given.
    pub fn has_relevance_terms(&self) -> bool {
        !self.keywords.is_empty() || self.domain.is_some() || self.purpose.is_some()
    }
}

/// An event type that could not be profiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaFailure {
    pub event_type: String,
    pub class: ErrorClass,
    pub message: String,
}

impl SchemaFailure {
    pub fn new(event_type: impl Into<String>, error: &DiscoveryError) -> Self {
        Self {
            event_type: event_type.into(),
            class: error.class(),
            message: error.to_string(),
        }
    }
}

/// Profiled schemas plus the event types that failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryOutcome {
    /// In event type name order.
    pub schemas: Vec<Schema>,
    pub failures: Vec<SchemaFailure>,
    /// Event types left out because they had too few records.
    pub skipped: Vec<String>,
    pub from_cache: bool,
}

impl DiscoveryOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    LowQuality,
    Seasonality,
    Trend,
    Anomaly,
    StrongCorrelation,
    JoinPath,
    HighVolume,
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LowQuality => "low_quality",
            Self::Seasonality => "seasonality",
            Self::Trend => "trend",
            Self::Anomaly => "anomaly",
            Self::StrongCorrelation => "strong_correlation",
            Self::JoinPath => "join_path",
            Self::HighVolume => "high_volume",
        };
        f.write_str(name)
    }
}

/// A ranked observation across the discovered schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    /// Ranking weight in [0, 1].
    pub importance: f64,
    pub schemas: Vec<String>,
}

/// A suggested follow-up for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// 1 is most urgent.
    pub priority: u8,
    pub title: String,
    pub action: String,
    pub schemas: Vec<String>,
}

/// Bookkeeping for one intelligent discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub duration_ms: u64,
    pub event_types_considered: usize,
    pub schemas_discovered: usize,
    pub schemas_returned: usize,
    pub failures: usize,
    pub relationships_found: usize,
    pub queries_issued: u64,
    pub from_cache: bool,
}

/// Everything [`super::DiscoveryEngine::discover_with_intelligence`] found.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    /// Most relevant first.
    pub schemas: Vec<Schema>,
    pub patterns: Vec<DetectedPattern>,
    pub relationships: Vec<Relationship>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub failures: Vec<SchemaFailure>,
    pub summary: ExecutionSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub state: HealthState,
    pub message: String,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, state: HealthState, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state,
            message: message.into(),
        }
    }
}

/// Aggregate counters since the engine was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineMetrics {
    pub queries_processed: u64,
    pub errors: u64,
    pub discoveries: u64,
    pub schemas_discovered: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub uptime_secs: u64,
}

/// Result of [`super::DiscoveryEngine::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// The worst component state.
    pub state: HealthState,
    pub components: Vec<ComponentHealth>,
    pub metrics: EngineMetrics,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}
