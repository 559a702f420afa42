use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{bounded_fraction, population, slices_for, DataSample, SamplingParams, SamplingStrategy};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::Result;
use crate::nrql::Nrql;

/// Partitions the window into equal time strata and samples each one with an
/// even share of the budget, so quiet periods are not drowned out by bursts.
#[derive(Debug, Clone)]
pub struct StratifiedSampler {
    strata: u32,
}

impl StratifiedSampler {
    pub fn new(strata: u32) -> Self {
        Self {
            strata: strata.max(1),
        }
    }

    pub fn strata(&self) -> u32 {
        self.strata
    }

    /// Samples exactly `target` records (or fewer if the strata run dry).
    pub(crate) async fn sample_with_target(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        params: &SamplingParams,
        total: u64,
        target: u64,
    ) -> Result<DataSample> {
        // Enough strata that no stratum asks for more than one page.
        let strata = self.strata.max(slices_for(target)).min(u32::try_from(target.max(1)).unwrap_or(u32::MAX));
        let per_stratum = target.div_ceil(strata as u64).max(1);

        let mut records = Vec::new();
        let mut empty_strata = 0u64;
        for window in params.time_range.split(strata) {
            ctx.check()?;
            let nrql = Nrql::select_all(&params.event_type, &window, per_stratum)?;
            let rows = client.query(ctx, &nrql).await?.results;
            if rows.is_empty() {
                empty_strata += 1;
            }
            records.extend(rows);
        }
        records.truncate(target as usize);

        debug!(strata, per_stratum, empty_strata, sampled = records.len(), "Stratified sample drawn");
        Ok(DataSample::new(params, records, total, self.name())
            .with_metadata("strata", strata)
            .with_metadata("per_stratum", per_stratum)
            .with_metadata("empty_strata", empty_strata))
    }
}

impl Default for StratifiedSampler {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl SamplingStrategy for StratifiedSampler {
    fn name(&self) -> &'static str {
        "stratified"
    }

    /// 2% of the population, between 500 and 20,000 records.
    fn estimate_sample_size(&self, total_records: u64) -> u64 {
        bounded_fraction(total_records, 0.02, 500, 20_000)
    }

    #[instrument(skip(self, ctx, client, params), fields(event_type = %params.event_type, strata = self.strata))]
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
        self.sample_with_target(ctx, client, params, total, target).await
    }
}
