//! Small numeric helpers shared by the detectors, the sampler probe and the
//! relationship miner. All functions are total: degenerate input yields 0,
//! `None` or an empty result instead of NaN.

use std::f64::consts::PI;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Linear interpolation percentile over already sorted values, `p` in [0, 1].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] * (1.0 - weight) + sorted[upper] * weight
        }
    }
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub fn median(values: &[f64]) -> f64 {
    percentile(&sorted(values), 0.5)
}

/// Sample skewness (population moments).
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n as f64;
    m3 / m2.powf(1.5)
}

/// Excess kurtosis (0 for a normal distribution).
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return 0.0;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n as f64;
    m4 / (m2 * m2) - 3.0
}

/// Least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Slope divided by its standard error.
    pub t_statistic: f64,
    pub n: usize,
}

impl Regression {
    /// Fitted value at `x`.
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits a line through `(xs[i], ys[i])`. Needs at least three points and
/// non-constant `xs`.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Option<Regression> {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let syy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let sse: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let r_squared = if syy == 0.0 { 1.0 } else { (1.0 - sse / syy).clamp(0.0, 1.0) };
    let std_err = (sse / (n - 2) as f64 / sxx).sqrt();
    let t_statistic = if std_err > 0.0 {
        slope / std_err
    } else if slope == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(slope)
    };

    Some(Regression {
        slope,
        intercept,
        r_squared,
        t_statistic,
        n,
    })
}

/// Fits a line against the sample index.
pub fn fit_trend(values: &[f64]) -> Option<Regression> {
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    fit_line(&xs, values)
}

/// Pearson correlation coefficient, `None` for fewer than three pairs.
/// Constant input correlates at 0.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return None;
    }
    let (mut sum_x, mut sum_y, mut sum_x2, mut sum_y2, mut sum_xy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys).take(n) {
        sum_x += x;
        sum_y += y;
        sum_x2 += x * x;
        sum_y2 += y * y;
        sum_xy += x * y;
    }
    let n = n as f64;
    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        Some(0.0)
    } else {
        Some((numerator / denominator).clamp(-1.0, 1.0))
    }
}

/// Standard normal cumulative distribution (Abramowitz and Stegun 7.1.26).
pub fn normal_cdf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * z.abs() / std::f64::consts::SQRT_2);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let erf = 1.0 - poly * (-(z * z) / 2.0).exp();
    if z >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

/// Two-sided p-value for a Pearson coefficient over `n` pairs, using the
/// t statistic with a normal approximation.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    let r = r.clamp(-1.0, 1.0);
    if (1.0 - r.abs()) < 1e-12 {
        return 0.0;
    }
    let t = r * ((n - 2) as f64 / (1.0 - r * r)).sqrt();
    (2.0 * (1.0 - normal_cdf(t.abs()))).clamp(0.0, 1.0)
}

/// Power spectrum for frequencies `0..=n/2` via a direct DFT.
pub fn power_spectrum(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    (0..=n / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for (t, v) in values.iter().enumerate() {
                let angle = 2.0 * PI * k as f64 * t as f64 / n as f64;
                re += v * angle.cos();
                im -= v * angle.sin();
            }
            re * re + im * im
        })
        .collect()
}

/// Removes the least-squares trend and the mean.
pub fn detrend(values: &[f64]) -> Vec<f64> {
    match fit_trend(values) {
        Some(fit) => values
            .iter()
            .enumerate()
            .map(|(i, v)| v - fit.predict(i as f64))
            .collect(),
        None => {
            let m = mean(values);
            values.iter().map(|v| v - m).collect()
        }
    }
}

/// Pearson correlation of `xs[t]` against `ys[t + lag]`.
pub fn lagged_pearson(xs: &[f64], ys: &[f64], lag: i64) -> Option<f64> {
    let n = xs.len().min(ys.len());
    let shift = lag.unsigned_abs() as usize;
    if shift >= n {
        return None;
    }
    if lag >= 0 {
        pearson(&xs[..n - shift], &ys[shift..n])
    } else {
        pearson(&xs[shift..n], &ys[..n - shift])
    }
}
