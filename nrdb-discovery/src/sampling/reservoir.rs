use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument};

use super::{rng_for, scan_window, DataSample, SamplingParams, SamplingStrategy, ScanStats};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::Result;
use crate::nrql::MAX_QUERY_LIMIT;

/// Fixed-capacity uniform sample over a stream of unknown length.
///
/// The i-th item offered (1-based) replaces a uniformly chosen slot with
/// probability `capacity / i`, so after `n` offers every item is retained
/// with probability `capacity / n`.
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    items: Vec<T>,
    seen: u64,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity.min(MAX_QUERY_LIMIT as usize)),
            seen: 0,
        }
    }

    pub fn offer<R: Rng + ?Sized>(&mut self, item: T, rng: &mut R) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let slot = rng.random_range(0..self.seen);
        if slot < self.capacity as u64 {
            self.items[slot as usize] = item;
        }
    }

    /// Items offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Scans the window as sequential batches and keeps a fixed-size reservoir,
/// without needing the population size up front.
#[derive(Debug, Clone)]
pub struct ReservoirSampler {
    reservoir_size: u64,
    batches: u32,
}

impl ReservoirSampler {
    pub fn new(reservoir_size: u64, batches: u32) -> Self {
        Self {
            reservoir_size: reservoir_size.max(1),
            batches: batches.max(1),
        }
    }
}

impl Default for ReservoirSampler {
    fn default() -> Self {
        Self::new(1000, 10)
    }
}

#[async_trait]
impl SamplingStrategy for ReservoirSampler {
    fn name(&self) -> &'static str {
        "reservoir"
    }

    fn estimate_sample_size(&self, total_records: u64) -> u64 {
        total_records.min(self.reservoir_size)
    }

    #[instrument(skip(self, ctx, client, params), fields(event_type = %params.event_type, batches = self.batches))]
    async fn sample(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
    ) -> Result<DataSample> {
        params.validate()?;
        let capacity = self.reservoir_size.min(params.max_samples) as usize;
        let mut rng = rng_for(params.seed);
        let mut reservoir = Reservoir::new(capacity);

        let mut scan = ScanStats::default();
        for window in params.time_range.split(self.batches) {
            let batch = scan_window(ctx, client, &params.event_type, &window, |record| {
                reservoir.offer(record, &mut rng)
            })
            .await?;
            scan.queries += batch.queries;
            scan.truncated_windows += batch.truncated_windows;
        }

        let scanned = reservoir.seen();
        // The scan itself is the population estimate unless the caller knows better.
        let total = params.known_total.unwrap_or(scanned);
        debug!(scanned, kept = reservoir.len(), "Reservoir sample drawn");
        Ok(
            DataSample::new(params, reservoir.into_items(), total, self.name())
                .with_metadata("batches", self.batches)
                .with_metadata("scanned", scanned)
                .with_metadata("queries", scan.queries)
                .with_metadata("truncated_windows", scan.truncated_windows),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::TimeRange;
    use crate::testing::{generate_records, timestamp_of, MockNrdbClient};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[test]
    fn test_fills_before_replacing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut reservoir = Reservoir::new(3);
        for i in 0..3 {
            reservoir.offer(i, &mut rng);
        }
        assert_eq!(reservoir.items(), &[0, 1, 2]);
        for i in 3..100 {
            reservoir.offer(i, &mut rng);
        }
        assert_eq!(reservoir.len(), 3);
        assert_eq!(reservoir.seen(), 100);
    }

    #[test]
    fn test_zero_capacity() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut reservoir = Reservoir::new(0);
        reservoir.offer(1, &mut rng);
        assert!(reservoir.is_empty());
        assert_eq!(reservoir.seen(), 1);
    }

    #[test]
    fn test_inclusion_probability_is_uniform() {
        let n = 50;
        let k = 10;
        let trials = 4_000;
        let mut hits = vec![0u32; n];
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..trials {
            let mut reservoir = Reservoir::new(k);
            for i in 0..n {
                reservoir.offer(i, &mut rng);
            }
            for &i in reservoir.items() {
                hits[i] += 1;
            }
        }

        let expected = trials as f64 * k as f64 / n as f64;
        for (i, &count) in hits.iter().enumerate() {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(deviation < 0.15, "record {i}: {count} hits vs {expected}");
        }
    }

    #[tokio::test]
    async fn test_sampler_scans_all_batches() {
        let range = TimeRange::last(Duration::from_secs(3600));
        let mock = MockNrdbClient::new().with_event_type("Metric", generate_records(&range, 1_000));
        let params = SamplingParams::new("Metric", range)
            .with_max_samples(5_000)
            .with_seed(9);

        let sample = ReservoirSampler::new(100, 4)
            .sample(&QueryContext::background(), &mock, &params)
            .await
            .unwrap();

        assert_eq!(sample.sample_size, 100);
        assert_eq!(sample.total_population, 1_000);
        assert_eq!(sample.metadata["scanned"], 1_000);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_batches_larger_than_one_page_are_fully_scanned() {
        let range = TimeRange::last(Duration::from_secs(4 * 3600));
        let mock = MockNrdbClient::new().with_event_type("Log", generate_records(&range, 40_000));
        let params = SamplingParams::new("Log", range)
            .with_max_samples(1_000)
            .with_seed(17);

        let sample = ReservoirSampler::new(1_000, 4)
            .sample(&QueryContext::background(), &mock, &params)
            .await
            .unwrap();

        assert_eq!(sample.sample_size, 1_000);
        assert_eq!(sample.total_population, 40_000);
        assert_eq!(sample.metadata["scanned"], 40_000);
        assert_eq!(sample.metadata["truncated_windows"], 0);

        // Each batch holds 10,000 records; the older half of every batch
        // must be as likely to be kept as the newer half.
        let older_halves = range
            .split(4)
            .into_iter()
            .flat_map(|batch| batch.split(2).into_iter().take(1))
            .collect::<Vec<_>>();
        let from_older = sample
            .records
            .iter()
            .filter_map(timestamp_of)
            .filter(|at| older_halves.iter().any(|w| w.contains(*at)))
            .count();
        assert!((400..=600).contains(&from_older), "{from_older} of 1000 from older halves");
    }
}
