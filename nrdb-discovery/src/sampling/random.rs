use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{
    bounded_fraction, population, rng_for, slices_for, DataSample, Reservoir, SamplingParams,
    SamplingStrategy,
};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::Result;
use crate::nrql::Nrql;

/// Over-fetch factor: the remote returns the newest rows first, so the
/// sampler asks for more than it needs and draws uniformly among them.
const OVERFETCH: u64 = 4;

/// A limited range query, then a uniform draw. Fetches larger than one page
/// are spread over equal time slices.
#[derive(Debug, Clone, Default)]
pub struct RandomSampler;

impl RandomSampler {
    pub fn new() -> Self {
        Self
    }

    /// Draws `target` records uniformly from an over-fetched window.
    pub(crate) async fn sample_sized(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
        total: u64,
        target: u64,
    ) -> Result<DataSample> {
        // No point asking for more rows than the window holds.
        let fetch = target.saturating_mul(OVERFETCH).min(total.max(target));
        let slices = slices_for(fetch);
        let per_slice = fetch.div_ceil(slices as u64);

        let mut rng = rng_for(params.seed);
        let mut reservoir = Reservoir::new(target as usize);
        for window in params.time_range.split(slices) {
            ctx.check()?;
            let nrql = Nrql::select_all(&params.event_type, &window, per_slice)?;
            for record in client.query(ctx, &nrql).await?.results {
                reservoir.offer(record, &mut rng);
            }
        }
        let fetched = reservoir.seen();

        debug!(total, target, fetched, slices, "Random sample drawn");
        Ok(
            DataSample::new(params, reservoir.into_items(), total, self.name())
                .with_metadata("fetched", fetched)
                .with_metadata("slices", slices)
                .with_metadata("target", target),
        )
    }
}

#[async_trait]
impl SamplingStrategy for RandomSampler {
    fn name(&self) -> &'static str {
        "random"
    }

    /// 1% of the population, between 100 and 10,000 records.
    fn estimate_sample_size(&self, total_records: u64) -> u64 {
        bounded_fraction(total_records, 0.01, 100, 10_000)
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

        self.sample_sized(ctx, client, params, total, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::TimeRange;
    use crate::testing::{generate_records, MockNrdbClient};
    use std::time::Duration;

    #[test]
    fn test_estimate() {
        let sampler = RandomSampler::new();
        assert_eq!(sampler.estimate_sample_size(50_000), 500);
        assert_eq!(sampler.estimate_sample_size(5_000_000), 10_000);
        assert_eq!(sampler.estimate_sample_size(3_000), 100);
    }

    #[tokio::test]
    async fn test_sample_respects_budget() {
        let range = TimeRange::last(Duration::from_secs(3600));
        let mock = MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 2_000));
        let params = SamplingParams::new("Transaction", range)
            .with_max_samples(50)
            .with_seed(3);

        let sample = RandomSampler::new()
            .sample(&QueryContext::background(), &mock, &params)
            .await
            .unwrap();

        assert_eq!(sample.sample_size, 50);
        assert_eq!(sample.total_population, 2_000);
        assert_eq!(sample.strategy, "random");
        assert!((sample.sampling_rate - 0.025).abs() < 1e-9);
        // One count query plus one select.
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_event_type() {
        let range = TimeRange::last(Duration::from_secs(3600));
        let mock = MockNrdbClient::new().with_event_type("Empty", Vec::new());
        let sample = RandomSampler::new()
            .sample(
                &QueryContext::background(),
                &mock,
                &SamplingParams::new("Empty", range),
            )
            .await
            .unwrap();
        assert!(sample.is_empty());
        assert_eq!(sample.sampling_rate, 0.0);
    }

    #[tokio::test]
    async fn test_targets_above_one_page_are_sliced() {
        let range = TimeRange::last(Duration::from_secs(12 * 3600));
        let mock = MockNrdbClient::new().with_event_type("Span", generate_records(&range, 12_000));
        let params = SamplingParams::new("Span", range).with_seed(5);

        let sample = RandomSampler::new()
            .sample_sized(&QueryContext::background(), &mock, &params, 12_000, 6_000)
            .await
            .unwrap();

        assert_eq!(sample.sample_size, 6_000);
        assert_eq!(sample.metadata["target"], 6_000);
        assert_eq!(sample.metadata["slices"], 3);
        assert_eq!(sample.metadata["fetched"], 12_000);
        assert_eq!(mock.call_count(), 3);
    }
}
