use std::time::Duration;

use crate::analysis::AnalyzerConfig;
use crate::error::{DiscoveryError, Result};
use crate::logging::LogConfig;
use crate::patterns::PatternConfig;
use crate::quality::QualityConfig;
use crate::relationships::RelationshipConfig;
use crate::sampling::{SamplingConfig, StrategyKind};
use crate::schema::ProfileDepth;
use crate::security::InputValidator;

/// Configuration for [`super::DiscoveryEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Event types profiled concurrently (default: number of CPUs).
    pub max_concurrency: usize,
    /// How long discovered schema sets stay cached (default: 15 minutes).
    pub cache_ttl: Duration,
    /// Cached filter results kept before the oldest is evicted (default: 128).
    pub cache_max_entries: usize,
    /// Budget for one discovery batch; unfinished workers are reported as
    /// cancelled (default: 5 minutes).
    pub batch_timeout: Duration,
    /// Window ending now that discovery looks at (default: 24 hours).
    pub discovery_window: Duration,
    /// Records sampled per event type (default: 1000).
    pub sample_size: u64,
    /// Depth used by [`super::DiscoveryEngine::discover_schemas`] (default: standard).
    pub default_depth: ProfileDepth,
    /// Forces one strategy instead of choosing per event type.
    pub strategy: Option<StrategyKind>,
    /// Buckets in the record-rate series checked for schema-level patterns
    /// (default: 48).
    pub rate_series_buckets: u32,
    pub sampling: SamplingConfig,
    pub analyzer: AnalyzerConfig,
    pub patterns: PatternConfig,
    pub quality: QualityConfig,
    pub relationships: RelationshipConfig,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(1),
            cache_ttl: Duration::from_secs(15 * 60),
            cache_max_entries: 128,
            batch_timeout: Duration::from_secs(5 * 60),
            discovery_window: Duration::from_secs(24 * 3600),
            sample_size: 1000,
            default_depth: ProfileDepth::Standard,
            strategy: None,
            rate_series_buckets: 48,
            sampling: SamplingConfig::default(),
            analyzer: AnalyzerConfig::default(),
            patterns: PatternConfig::default(),
            quality: QualityConfig::default(),
            relationships: RelationshipConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    pub fn with_sample_size(mut self, sample_size: u64) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_default_depth(mut self, depth: ProfileDepth) -> Self {
        self.default_depth = depth;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_relationships(mut self, relationships: RelationshipConfig) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn validate(&self) -> Result<()> {
        InputValidator::validate_positive(self.max_concurrency as u64, "max_concurrency")?;
        InputValidator::validate_positive(self.cache_max_entries as u64, "cache_max_entries")?;
        InputValidator::validate_positive(self.sample_size, "sample_size")?;
        InputValidator::validate_positive(self.rate_series_buckets as u64, "rate_series_buckets")?;
        if self.batch_timeout.is_zero() {
            return Err(DiscoveryError::configuration("batch_timeout must be positive"));
        }
        if self.discovery_window < Duration::from_secs(60) {
            return Err(DiscoveryError::configuration(
                "discovery_window must be at least one minute",
            ));
        }
        self.sampling.validate()?;
        self.quality.validate()?;
        self.relationships.validate()
    }
}
