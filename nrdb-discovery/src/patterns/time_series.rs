use serde_json::json;

use super::math;
use super::{Pattern, PatternConfig, PatternDetector, PatternInput, PatternType};
use crate::schema::DataType;

/// Largest number of anomaly indices kept in a pattern's parameters.
const MAX_REPORTED_ANOMALIES: usize = 20;
/// Largest number of change points reported per series.
const MAX_CHANGE_POINTS: usize = 5;

/// Trend, seasonality, anomaly and change-point detection over an evenly
/// spaced numeric series.
#[derive(Debug, Clone)]
pub struct TimeSeriesDetector {
    config: PatternConfig,
}

impl TimeSeriesDetector {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Runs every time-series check over `series`.
    pub fn analyze(&self, name: &str, series: &[f64]) -> Vec<Pattern> {
        let series: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
        if series.len() < self.config.min_series_length {
            return Vec::new();
        }

        let mut patterns = Vec::new();
        if let Some(trend) = self.trend(name, &series) {
            patterns.push(trend);
        }
        let seasonal = self.seasonality(name, &series);
        let is_seasonal = seasonal.is_some();
        patterns.extend(seasonal);
        patterns.extend(self.anomalies(name, &series));
        // A cycle's own variance swings would read as shifts.
        if !is_seasonal {
            patterns.extend(self.change_points(name, &series));
        }
        patterns
    }

    /// Least-squares slope, reported when its t statistic is significant.
    pub fn trend(&self, name: &str, series: &[f64]) -> Option<Pattern> {
        let fit = math::fit_trend(series)?;
        if !(fit.t_statistic.abs() > self.config.trend_t_threshold) || fit.slope == 0.0 {
            return None;
        }
        let p_value = 2.0 * (1.0 - math::normal_cdf(fit.t_statistic.abs()));
        let confidence = (1.0 - p_value) * (0.5 + 0.5 * fit.r_squared);
        let direction = if fit.slope > 0.0 { "increasing" } else { "decreasing" };

        Some(
            Pattern::new(
                PatternType::Trend,
                confidence,
                format!("'{name}' is {direction} by {:.4} per step", fit.slope),
            )
            .with_subtype(direction)
            .with_parameter("slope", fit.slope)
            .with_parameter("r_squared", fit.r_squared)
            .with_parameter("t_statistic", finite(fit.t_statistic)),
        )
    }

    /// Dominant frequency of the detrended series.
    ///
    /// Strength is the share of spectral power in the peak bin and its two
    /// neighbours; only peaks with at least two full cycles are considered.
    pub fn seasonality(&self, name: &str, series: &[f64]) -> Option<Pattern> {
        let n = series.len();
        let detrended = math::detrend(series);
        let spectrum = math::power_spectrum(&detrended);
        let total: f64 = spectrum.iter().skip(1).sum();
        if spectrum.len() < 3 || total <= f64::EPSILON {
            return None;
        }

        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .skip(2)
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        let band: f64 = spectrum[peak - 1..=(peak + 1).min(spectrum.len() - 1)]
            .iter()
            .sum();
        let strength = (band / total).clamp(0.0, 1.0);
        if strength < self.config.seasonality_threshold {
            return None;
        }

        let period = n as f64 / peak as f64;
        Some(
            Pattern::new(
                PatternType::Seasonal,
                strength,
                format!("'{name}' repeats every {period:.1} samples"),
            )
            .with_parameter("period", period.round())
            .with_parameter("exact_period", period)
            .with_parameter("strength", strength)
            .with_parameter("frequency_bin", peak as u64),
        )
    }

    /// Points deviating from the mean of the preceding window by more than
    /// `anomaly_z_threshold` standard deviations.
    pub fn anomalies(&self, name: &str, series: &[f64]) -> Option<Pattern> {
        let window = self.config.anomaly_window.max(3);
        if series.len() <= window {
            return None;
        }

        let mut indices = Vec::new();
        let mut max_z: f64 = 0.0;
        for i in window..series.len() {
            let baseline = &series[i - window..i];
            let std_dev = math::std_dev(baseline);
            if std_dev <= f64::EPSILON {
                continue;
            }
            let z = (series[i] - math::mean(baseline)).abs() / std_dev;
            if z > self.config.anomaly_z_threshold {
                indices.push(i as u64);
                max_z = max_z.max(z);
            }
        }
        if indices.is_empty() {
            return None;
        }

        let confidence = 1.0 - 2.0 * (1.0 - math::normal_cdf(max_z));
        let count = indices.len();
        indices.truncate(MAX_REPORTED_ANOMALIES);
        Some(
            Pattern::new(
                PatternType::Anomaly,
                confidence,
                format!("'{name}' has {count} point(s) outside its rolling baseline"),
            )
            .with_parameter("count", count as u64)
            .with_parameter("indices", json!(indices))
            .with_parameter("max_z_score", max_z),
        )
    }

    /// Indices where the variance of the following window differs from the
    /// preceding one by at least `change_variance_ratio`.
    pub fn change_points(&self, name: &str, series: &[f64]) -> Vec<Pattern> {
        let window = (series.len() / 10).max(5);
        if series.len() < window * 2 {
            return Vec::new();
        }

        let mut candidates: Vec<(usize, f64)> = (window..=series.len() - window)
            .filter_map(|i| {
                let before = math::variance(&series[i - window..i]);
                let after = math::variance(&series[i..i + window]);
                let (low, high) = if before < after { (before, after) } else { (after, before) };
                let ratio = if low <= f64::EPSILON {
                    if high <= f64::EPSILON {
                        return None;
                    }
                    f64::MAX
                } else {
                    high / low
                };
                (ratio >= self.config.change_variance_ratio).then_some((i, ratio))
            })
            .collect();

        // Strongest first; drop candidates within one window of a kept point.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut kept: Vec<(usize, f64)> = Vec::new();
        for (index, ratio) in candidates {
            if kept.iter().all(|(k, _)| k.abs_diff(index) >= window) {
                kept.push((index, ratio));
            }
            if kept.len() == MAX_CHANGE_POINTS {
                break;
            }
        }
        kept.sort_by_key(|(index, _)| *index);

        kept.into_iter()
            .map(|(index, ratio)| {
                let ratio = ratio.min(1e6);
                Pattern::new(
                    PatternType::ChangePoint,
                    1.0 - 1.0 / ratio,
                    format!("'{name}' variance shifts {ratio:.1}x at index {index}"),
                )
                .with_subtype("variance_shift")
                .with_parameter("index", index as u64)
                .with_parameter("variance_ratio", ratio)
            })
            .collect()
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::MAX.copysign(value)
    }
}

impl PatternDetector for TimeSeriesDetector {
    fn name(&self) -> &'static str {
        "time_series"
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type == DataType::Numeric
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
        self.analyze(input.attribute, &input.numbers())
    }
}
