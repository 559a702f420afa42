//! Prelude for commonly used types and traits in nrdb-discovery.

pub use crate::client::{NrdbClient, QueryResult, Record, ResilienceConfig, ResilientClient};
pub use crate::context::QueryContext;
pub use crate::engine::{
    DiscoveryEngine, DiscoveryFilter, DiscoveryHints, DiscoveryOutcome, DiscoveryResult,
    EngineConfig, HealthState,
};
pub use crate::error::{DiscoveryError, ErrorClass, Result};
pub use crate::logging::LogConfig;
pub use crate::sampling::{SamplingParams, StrategyKind, TimeRange};
pub use crate::schema::{Attribute, DataType, ProfileDepth, Schema, SemanticType};
