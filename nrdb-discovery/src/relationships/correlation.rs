//! Statistical and temporal correlation between numeric attributes of
//! different schemas, computed over bucketed averages.

use super::types::{AttributeRef, Evidence, EvidenceType, Relationship, RelationshipType};
use super::RelationshipConfig;
use crate::error::Result;
use crate::patterns::math;

/// A bucketed average series for one attribute; `None` marks empty buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSeries {
    pub attribute: AttributeRef,
    pub values: Vec<Option<f64>>,
}

impl AttributeSeries {
    pub fn new(attribute: AttributeRef, values: Vec<Option<f64>>) -> Self {
        Self { attribute, values }
    }
}

/// Buckets where both series have a value, as parallel vectors.
pub fn aligned(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .unzip()
}

/// Pearson correlation of two series, reported above the threshold.
pub fn correlate(
    a: &AttributeSeries,
    b: &AttributeSeries,
    config: &RelationshipConfig,
) -> Result<Option<Relationship>> {
    let (xs, ys) = aligned(&a.values, &b.values);
    if xs.len() < config.min_correlation_points {
        return Ok(None);
    }
    let Some(r) = math::pearson(&xs, &ys) else {
        return Ok(None);
    };
    if r.abs() <= config.correlation_threshold {
        return Ok(None);
    }

    let n = xs.len();
    let p_value = math::correlation_p_value(r, n);
    let evidence = vec![
        Evidence::new(EvidenceType::Statistical, "pearson_r", r, r.abs()),
        Evidence::new(EvidenceType::Statistical, "p_value", p_value, 1.0 - p_value),
        Evidence::new(EvidenceType::Sample, "sample_size", n as u64, 1.0),
    ];
    let direction = if r > 0.0 { "positive" } else { "negative" };
    Ok(Some(
        Relationship::new(
            RelationshipType::Correlation,
            a.attribute.clone(),
            b.attribute.clone(),
            r.abs(),
            evidence,
        )?
        .with_metadata("direction", direction)
        .with_metadata("coefficient", r),
    ))
}

/// Strongest lagged correlation within `max_lag_buckets`, reported when it
/// clears the threshold and beats the unlagged correlation.
///
/// A positive lag means the target follows the source.
pub fn temporal(
    a: &AttributeSeries,
    b: &AttributeSeries,
    config: &RelationshipConfig,
    bucket_secs: u64,
) -> Result<Option<Relationship>> {
    // Lags shift indices, so gaps are filled with the series mean first.
    let xs = fill_gaps(&a.values);
    let ys = fill_gaps(&b.values);
    if xs.len().min(ys.len()) < config.min_correlation_points + config.max_lag_buckets {
        return Ok(None);
    }

    let unlagged = math::pearson(&xs, &ys).unwrap_or(0.0).abs();
    let max_lag = config.max_lag_buckets as i64;
    let best = (-max_lag..=max_lag)
        .filter(|lag| *lag != 0)
        .filter_map(|lag| math::lagged_pearson(&xs, &ys, lag).map(|r| (lag, r)))
        .max_by(|x, y| x.1.abs().total_cmp(&y.1.abs()));
    let Some((lag, r)) = best else {
        return Ok(None);
    };
    if r.abs() <= config.correlation_threshold || r.abs() <= unlagged {
        return Ok(None);
    }

    let (source, target, lag) = if lag > 0 {
        (a.attribute.clone(), b.attribute.clone(), lag)
    } else {
        (b.attribute.clone(), a.attribute.clone(), -lag)
    };
    let n = xs.len().min(ys.len()) - lag as usize;
    let evidence = vec![
        Evidence::new(EvidenceType::Statistical, "lagged_r", r, r.abs()),
        Evidence::new(EvidenceType::Statistical, "lag_buckets", lag as u64, r.abs()),
        Evidence::new(
            EvidenceType::Statistical,
            "unlagged_r",
            unlagged,
            (r.abs() - unlagged).max(0.0),
        ),
        Evidence::new(EvidenceType::Sample, "sample_size", n as u64, 1.0),
    ];
    Ok(Some(
        Relationship::new(RelationshipType::Temporal, source, target, r.abs(), evidence)?
            .with_metadata("lag_buckets", lag as u64)
            .with_metadata("lag_secs", lag as u64 * bucket_secs),
    ))
}

fn fill_gaps(values: &[Option<f64>]) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let fill = math::mean(&present);
    values
        .iter()
        .map(|v| v.filter(|v| v.is_finite()).unwrap_or(fill))
        .collect()
}
