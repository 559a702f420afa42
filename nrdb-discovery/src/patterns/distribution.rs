use super::math;
use super::{Pattern, PatternConfig, PatternDetector, PatternInput, PatternType};
use crate::schema::DataType;

/// Candidate distribution shape with its fit score.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionFit {
    pub name: &'static str,
    pub confidence: f64,
}

/// Tests numeric samples against normal and power-law shapes.
#[derive(Debug, Clone)]
pub struct DistributionDetector {
    min_values: usize,
    threshold: f64,
}

impl DistributionDetector {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            min_values: config.min_distribution_values,
            threshold: config.distribution_threshold,
        }
    }

    /// Normal fit from skewness and excess kurtosis: 1 for a perfect bell,
    /// decaying with the Jarque-Bera shape term.
    pub fn normal_fit(values: &[f64]) -> DistributionFit {
        let skew = math::skewness(values);
        let kurt = math::excess_kurtosis(values);
        DistributionFit {
            name: "normal",
            confidence: (-(skew * skew + kurt * kurt / 4.0)).exp(),
        }
    }

    /// Power-law fit: r² of log(value) against log(rank) for positive values,
    /// halved unless the sample is right-skewed.
    pub fn power_law_fit(values: &[f64]) -> (DistributionFit, Option<f64>) {
        let mut positive: Vec<f64> = values.iter().copied().filter(|v| *v > 0.0).collect();
        positive.sort_by(|a, b| b.total_cmp(a));
        let log_rank: Vec<f64> = (1..=positive.len()).map(|r| (r as f64).ln()).collect();
        let log_value: Vec<f64> = positive.iter().map(|v| v.ln()).collect();

        match math::fit_line(&log_rank, &log_value) {
            Some(fit) if fit.slope < 0.0 => {
                let heavy_tailed = math::skewness(values) > 1.0;
                let confidence = if heavy_tailed {
                    fit.r_squared
                } else {
                    fit.r_squared * 0.5
                };
                // Zipf slope s relates to the tail exponent as alpha = 1 + 1/s.
                let exponent = 1.0 + 1.0 / -fit.slope;
                (
                    DistributionFit {
                        name: "power_law",
                        confidence,
                    },
                    Some(exponent),
                )
            }
            _ => (
                DistributionFit {
                    name: "power_law",
                    confidence: 0.0,
                },
                None,
            ),
        }
    }
}

impl PatternDetector for DistributionDetector {
    fn name(&self) -> &'static str {
        "distribution"
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type == DataType::Numeric
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
        let values = input.numbers();
        if values.len() < self.min_values || math::std_dev(&values) <= f64::EPSILON {
            return Vec::new();
        }

        let normal = Self::normal_fit(&values);
        let (power_law, exponent) = Self::power_law_fit(&values);
        let best = if normal.confidence >= power_law.confidence {
            normal
        } else {
            power_law
        };
        if best.confidence < self.threshold {
            return Vec::new();
        }

        let mut pattern = Pattern::new(
            PatternType::Distribution,
            best.confidence,
            format!("'{}' values follow a {} distribution", input.attribute, best.name),
        )
        .with_subtype(best.name)
        .with_parameter("mean", math::mean(&values))
        .with_parameter("std_dev", math::std_dev(&values))
        .with_parameter("skewness", math::skewness(&values))
        .with_parameter("excess_kurtosis", math::excess_kurtosis(&values));
        if let (Some(exponent), "power_law") = (exponent, best.name) {
            pattern = pattern.with_parameter("exponent", exponent);
        }
        vec![pattern]
    }
}
