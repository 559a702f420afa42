use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{
    population, scan_window, DataSample, RandomSampler, SamplingConfig, SamplingParams,
    SamplingStrategy, StratifiedSampler,
};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::Result;
use crate::nrql::{Nrql, COUNT_ALIAS};
use crate::patterns::math;

/// Sizes the sample by population tier and picks the follow-up strategy from
/// a cheap probe of the record rate over time.
///
/// The probe is a bucketed count over the window. When per-bucket counts vary
/// strongly (coefficient of variation above `skew_threshold`) the sample is
/// stratified by time; otherwise records are drawn at random.
#[derive(Debug, Clone)]
pub struct AdaptiveSampler {
    config: SamplingConfig,
}

/// Outcome of the adaptive probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSummary {
    pub buckets: usize,
    pub coefficient_of_variation: f64,
    pub skewed: bool,
}

impl AdaptiveSampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    async fn probe(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
    ) -> Result<ProbeSummary> {
        let nrql = Nrql::count_series(
            &params.event_type,
            &params.time_range,
            self.config.probe_buckets,
        )?;
        let counts = client.query(ctx, &nrql).await?.numbers(COUNT_ALIAS);
        let mean = math::mean(&counts);
        let cv = if mean > 0.0 {
            math::std_dev(&counts) / mean
        } else {
            0.0
        };
        Ok(ProbeSummary {
            buckets: counts.len(),
            coefficient_of_variation: cv,
            skewed: cv > self.config.skew_threshold,
        })
    }
}

impl Default for AdaptiveSampler {
    fn default() -> Self {
        Self::new(SamplingConfig::default())
    }
}

#[async_trait]
impl SamplingStrategy for AdaptiveSampler {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    /// All records up to 10k, 10% up to 100k, 1% up to 1M, then 0.1% capped at 50k.
    fn estimate_sample_size(&self, total_records: u64) -> u64 {
        match total_records {
            0..=10_000 => total_records,
            10_001..=100_000 => total_records / 10,
            100_001..=1_000_000 => total_records / 100,
            _ => (total_records / 1_000).min(50_000),
        }
    }

    #[instrument(skip(self, ctx, client, params), fields(event_type = %params.event_type))]
    async fn sample(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
    ) -> Result<DataSample> {
        params.validate()?;
        let total = population(ctx, client, params).await?;
        let target = self.estimate_sample_size(total).min(params.max_samples);
        if target == 0 {
            return Ok(DataSample::new(params, Vec::new(), total, self.name()));
        }

        let probe = self.probe(ctx, client, params).await?;
        debug!(
            total,
            target,
            cv = probe.coefficient_of_variation,
            skewed = probe.skewed,
            "Adaptive probe complete"
        );

        let mut sample = if probe.skewed {
            StratifiedSampler::new(self.config.strata)
                .sample_with_target(ctx, client, params, total, target)
                .await?
        } else {
            let params = params.clone().with_known_total(total).with_max_samples(target);
            if target == total {
                // The small tier takes every record.
                let mut records = Vec::with_capacity(total as usize);
                let scan = scan_window(ctx, client, &params.event_type, &params.time_range, |record| {
                    records.push(record)
                })
                .await?;
                DataSample::new(&params, records, total, "scan").with_metadata("queries", scan.queries)
            } else {
                RandomSampler::new().sample_sized(ctx, client, &params, total, target).await?
            }
        };

        let delegate = std::mem::replace(&mut sample.strategy, self.name().to_string());
        Ok(sample
            .with_metadata("delegate", delegate)
            .with_metadata("probe_buckets", probe.buckets as u64)
            .with_metadata("probe_cv", probe.coefficient_of_variation))
    }
}
