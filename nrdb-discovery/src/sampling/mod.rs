//! Sampling strategies that turn a time window and a size budget into a
//! representative [`DataSample`].
//!
//! Four strategies are available: [`RandomSampler`], [`StratifiedSampler`],
//! [`AdaptiveSampler`] and [`ReservoirSampler`]. The orchestrator picks one
//! with [`select_strategy`] from what it knows about the event type and
//! builds it through [`StrategyKind::build`].

mod adaptive;
mod random;
mod reservoir;
mod stratified;
mod types;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::client::{NrdbClient, Record};
use crate::context::QueryContext;
use crate::error::{DiscoveryError, Result};
use crate::nrql::{Nrql, COUNT_ALIAS, MAX_QUERY_LIMIT};

pub use adaptive::AdaptiveSampler;
pub use random::RandomSampler;
pub use reservoir::{Reservoir, ReservoirSampler};
pub use stratified::StratifiedSampler;
pub use types::{DataSample, SamplingParams, TimeRange};

/// A sampling algorithm.
#[async_trait]
pub trait SamplingStrategy: Send + Sync {
    /// Stable strategy name recorded on every sample.
    fn name(&self) -> &'static str;

    /// Number of records this strategy would aim for given a population size.
    fn estimate_sample_size(&self, total_records: u64) -> u64;

    /// Draws a sample through `client`.
    async fn sample(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
    ) -> Result<DataSample>;
}

/// Tuning knobs shared by all strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of time strata for stratified sampling (default: 10).
    pub strata: u32,
    /// Reservoir capacity (default: 1000).
    pub reservoir_size: u64,
    /// Sequential batches scanned by the reservoir sampler (default: 10).
    pub reservoir_batches: u32,
    /// Buckets in the adaptive probe series (default: 24).
    pub probe_buckets: u32,
    /// Coefficient of variation above which data counts as temporally skewed (default: 0.5).
    pub skew_threshold: f64,
    /// Default sample budget when the caller gives none (default: 1000).
    pub default_max_samples: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strata: 10,
            reservoir_size: 1000,
            reservoir_batches: 10,
            probe_buckets: 24,
            skew_threshold: 0.5,
            default_max_samples: 1000,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        use crate::security::InputValidator;
        InputValidator::validate_positive(self.strata as u64, "strata")?;
        InputValidator::validate_positive(self.reservoir_size, "reservoir_size")?;
        InputValidator::validate_positive(self.reservoir_batches as u64, "reservoir_batches")?;
        InputValidator::validate_positive(self.probe_buckets as u64, "probe_buckets")?;
        InputValidator::validate_positive(self.default_max_samples, "default_max_samples")?;
        InputValidator::validate_threshold(self.skew_threshold, "skew_threshold")
    }
}

/// Closed set of available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    Stratified,
    Adaptive,
    Reservoir,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Stratified => "stratified",
            Self::Adaptive => "adaptive",
            Self::Reservoir => "reservoir",
        }
    }

    /// Builds the strategy.
    pub fn build(&self, config: &SamplingConfig) -> Box<dyn SamplingStrategy> {
        match self {
            Self::Random => Box::new(RandomSampler::new()),
            Self::Stratified => Box::new(StratifiedSampler::new(config.strata)),
            Self::Adaptive => Box::new(AdaptiveSampler::new(config.clone())),
            Self::Reservoir => Box::new(ReservoirSampler::new(
                config.reservoir_size,
                config.reservoir_batches,
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "stratified" => Ok(Self::Stratified),
            "adaptive" => Ok(Self::Adaptive),
            "reservoir" => Ok(Self::Reservoir),
            other => Err(DiscoveryError::configuration(format!(
                "unknown sampling strategy '{other}'"
            ))),
        }
    }
}

/// What the caller knows about an event type before sampling it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataCharacteristics {
    /// Record count in the window, if known.
    pub total_records: Option<u64>,
    /// Coefficient of variation of per-bucket counts, if measured.
    pub temporal_skew: Option<f64>,
    pub has_seasonality: bool,
    /// The window is effectively unbounded (streaming).
    pub unbounded: bool,
}

/// Chooses a strategy from declared data characteristics.
///
/// Unbounded ranges use the reservoir, skewed or seasonal data is stratified
/// by time, large or unknown volumes go through the adaptive strategy and
/// everything else is sampled at random.
pub fn select_strategy(characteristics: &DataCharacteristics, config: &SamplingConfig) -> StrategyKind {
    if characteristics.unbounded {
        return StrategyKind::Reservoir;
    }
    let skewed = characteristics
        .temporal_skew
        .is_some_and(|cv| cv > config.skew_threshold);
    if skewed || characteristics.has_seasonality {
        return StrategyKind::Stratified;
    }
    match characteristics.total_records {
        Some(total) if total <= 100_000 => StrategyKind::Random,
        _ => StrategyKind::Adaptive,
    }
}

/// Counts the records of `event_type` in `range`.
pub async fn count_records(
    ctx: &QueryContext,
    client: &dyn NrdbClient,
    event_type: &str,
    range: &TimeRange,
) -> Result<u64> {
    let result = client.query(ctx, &Nrql::count(event_type, range)?).await?;
    Ok(result.first_number(COUNT_ALIAS).unwrap_or(0.0).max(0.0).round() as u64)
}

/// Population size: the caller's figure if given, otherwise a count query.
pub(crate) async fn population(
    ctx: &QueryContext,
    client: &dyn NrdbClient,
    params: &SamplingParams,
) -> Result<u64> {
    match params.known_total {
        Some(total) => Ok(total),
        None => count_records(ctx, client, &params.event_type, &params.time_range).await,
    }
}

/// Counters from one [`scan_window`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub queries: u64,
    /// Records handed to the visitor.
    pub scanned: u64,
    /// Windows too narrow to split that still returned a full page.
    pub truncated_windows: u64,
}

/// Hands every record of `event_type` in `range` to `visit`.
///
/// A query returns at most [`MAX_QUERY_LIMIT`] rows, newest first, so a full
/// page may hide older rows. Such a window is halved and both halves are
/// queried again until each page comes back short. Windows are visited
/// oldest first.
pub(crate) async fn scan_window<F>(
    ctx: &QueryContext,
    client: &dyn NrdbClient,
    event_type: &str,
    range: &TimeRange,
    mut visit: F,
) -> Result<ScanStats>
where
    F: FnMut(Record) + Send,
{
    let mut stats = ScanStats::default();
    let mut pending = vec![*range];
    while let Some(window) = pending.pop() {
        ctx.check()?;
        let nrql = Nrql::select_all(event_type, &window, MAX_QUERY_LIMIT)?;
        let rows = client.query(ctx, &nrql).await?.results;
        stats.queries += 1;

        let full = rows.len() as u64 >= MAX_QUERY_LIMIT;
        if full && window.duration().num_milliseconds() >= 2 {
            // Newer half first onto the stack so the older half pops next.
            pending.extend(window.split(2).into_iter().rev());
            continue;
        }
        if full {
            stats.truncated_windows += 1;
        }
        stats.scanned += rows.len() as u64;
        rows.into_iter().for_each(&mut visit);
    }
    Ok(stats)
}

/// Number of equal time slices needed to fetch `rows` records without any
/// single query exceeding [`MAX_QUERY_LIMIT`].
pub(crate) fn slices_for(rows: u64) -> u32 {
    u32::try_from(rows.div_ceil(MAX_QUERY_LIMIT).max(1)).unwrap_or(u32::MAX)
}

pub(crate) fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Applies a percentage with floor and ceiling, never exceeding the population.
pub(crate) fn bounded_fraction(total: u64, fraction: f64, floor: u64, ceiling: u64) -> u64 {
    let raw = (total as f64 * fraction).round() as u64;
    raw.clamp(floor, ceiling).min(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names_round_trip_through_factory() {
        let config = SamplingConfig::default();
        for kind in [
            StrategyKind::Random,
            StrategyKind::Stratified,
            StrategyKind::Adaptive,
            StrategyKind::Reservoir,
        ] {
            assert_eq!(kind.build(&config).name(), kind.as_str());
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
        }
        assert!("systematic".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_select_strategy() {
        let config = SamplingConfig::default();
        let pick = |c: DataCharacteristics| select_strategy(&c, &config);

        assert_eq!(
            pick(DataCharacteristics {
                unbounded: true,
                ..Default::default()
            }),
            StrategyKind::Reservoir
        );
        assert_eq!(
            pick(DataCharacteristics {
                total_records: Some(5_000),
                temporal_skew: Some(1.2),
                ..Default::default()
            }),
            StrategyKind::Stratified
        );
        assert_eq!(
            pick(DataCharacteristics {
                total_records: Some(5_000),
                temporal_skew: Some(0.1),
                ..Default::default()
            }),
            StrategyKind::Random
        );
        assert_eq!(
            pick(DataCharacteristics {
                total_records: Some(50_000_000),
                ..Default::default()
            }),
            StrategyKind::Adaptive
        );
        assert_eq!(pick(DataCharacteristics::default()), StrategyKind::Adaptive);
    }

    #[test]
    fn test_slices_for() {
        assert_eq!(slices_for(0), 1);
        assert_eq!(slices_for(MAX_QUERY_LIMIT), 1);
        assert_eq!(slices_for(MAX_QUERY_LIMIT + 1), 2);
        assert_eq!(slices_for(32_000), 7);
    }

    #[tokio::test]
    async fn test_scan_window_splits_full_pages() {
        use crate::testing::{generate_records, MockNrdbClient};
        use std::time::Duration;

        let range = TimeRange::last(Duration::from_secs(3600));
        let mock = MockNrdbClient::new().with_event_type("Log", generate_records(&range, 12_000));
        let mut seen = Vec::new();
        let stats = scan_window(&QueryContext::background(), &mock, "Log", &range, |record| {
            seen.push(record)
        })
        .await
        .unwrap();

        assert_eq!(stats.scanned, 12_000);
        assert_eq!(seen.len(), 12_000);
        assert_eq!(stats.truncated_windows, 0);
        assert!(stats.queries > 1);
        assert_eq!(stats.queries, mock.call_count());
    }

    #[test]
    fn test_bounded_fraction() {
        assert_eq!(bounded_fraction(1_000_000, 0.01, 100, 10_000), 10_000);
        assert_eq!(bounded_fraction(500_000, 0.01, 100, 10_000), 5_000);
        assert_eq!(bounded_fraction(2_000, 0.01, 100, 10_000), 100);
        assert_eq!(bounded_fraction(40, 0.01, 100, 10_000), 40);
    }
}
