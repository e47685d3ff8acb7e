//! Trend detection
//!
//! Two interchangeable detectors sit behind [`TrendDetector`]:
//! - [`RegressionDetector`]: least-squares slope against the point index,
//!   gated by a two-sided t-test on the slope
//! - [`ThirdsDetector`]: mean of the first third against the last third
//!
//! The volatility override (CV above threshold turns STABLE into VOLATILE)
//! is applied by the engine, not the detectors.

use super::statistics::mean;
use crate::config::{TrendConfig, TrendMethod};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the series is heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
            Self::Volatile => "volatile",
        })
    }
}

/// How pronounced the trend is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
}

impl fmt::Display for TrendStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        })
    }
}

/// Detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    /// In [0, 1]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

impl TrendSignal {
    /// STABLE / WEAK / 0, used when nothing can be said
    pub fn flat() -> Self {
        Self {
            direction: TrendDirection::Stable,
            strength: TrendStrength::Weak,
            confidence: 0.0,
            slope: None,
            p_value: None,
        }
    }
}

/// Classifies a series (at least three points, in time order)
pub trait TrendDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, values: &[f64]) -> TrendSignal;
}

/// Detector selected by `config.method`
pub fn detector_for(config: &TrendConfig) -> Box<dyn TrendDetector> {
    match config.method {
        TrendMethod::Regression => Box::new(RegressionDetector::from_config(config)),
        TrendMethod::Thirds => Box::new(ThirdsDetector::from_config(config)),
    }
}

// ============================================================================
// Regression
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegressionDetector {
    /// Minimum |slope| per step to call a direction
    pub trend_threshold: f64,
    /// Maximum p-value to trust the slope
    pub significance_level: f64,
    pub strong_r_squared: f64,
    pub moderate_r_squared: f64,
}

impl RegressionDetector {
    pub fn from_config(config: &TrendConfig) -> Self {
        Self {
            trend_threshold: config.trend_threshold,
            significance_level: config.significance_level,
            strong_r_squared: config.strong_r_squared,
            moderate_r_squared: config.moderate_r_squared,
        }
    }
}

impl TrendDetector for RegressionDetector {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn detect(&self, values: &[f64]) -> TrendSignal {
        if values.len() < 3 {
            return TrendSignal::flat();
        }

        let points: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64, v))
            .collect();
        let fit = linear_regression(&points);

        let direction = if fit.p_value < self.significance_level {
            if fit.slope > self.trend_threshold {
                TrendDirection::Increasing
            } else if fit.slope < -self.trend_threshold {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            }
        } else {
            TrendDirection::Stable
        };

        let strength = if fit.r_squared > self.strong_r_squared {
            TrendStrength::Strong
        } else if fit.r_squared > self.moderate_r_squared {
            TrendStrength::Moderate
        } else {
            TrendStrength::Weak
        };

        TrendSignal {
            direction,
            strength,
            confidence: fit.r.abs().clamp(0.0, 1.0),
            slope: Some(fit.slope),
            p_value: Some(fit.p_value),
        }
    }
}

/// Least-squares fit of y against x
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation
    pub r: f64,
    pub r_squared: f64,
    /// Two-sided p-value of the slope (n - 2 degrees of freedom)
    pub p_value: f64,
}

/// Simple linear regression with correlation and slope significance
///
/// Degenerate inputs (all x equal, or constant y) give a zero slope and
/// a p-value of 1. A perfect fit gives a p-value of 0.
pub fn linear_regression(points: &[(f64, f64)]) -> Regression {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let syy: f64 = points.iter().map(|p| (p.1 - mean_y).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

    if points.len() < 2 || sxx == 0.0 || syy == 0.0 {
        return Regression {
            slope: 0.0,
            intercept: mean_y,
            r: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
        };
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let r_squared = r * r;

    let df = n - 2.0;
    let p_value = if df <= 0.0 {
        1.0
    } else if r_squared >= 1.0 {
        0.0
    } else {
        let t = r * (df / (1.0 - r_squared)).sqrt();
        student_t_two_sided(t, df)
    };

    Regression {
        slope,
        intercept,
        r,
        r_squared,
        p_value,
    }
}

/// P(|T| > |t|) for Student's t with `df` degrees of freedom
fn student_t_two_sided(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    regularized_incomplete_beta(x, df / 2.0, 0.5).clamp(0.0, 1.0)
}

/// I_x(a, b) via the continued fraction (Lentz)
fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // Continued fraction converges fast on this side; use symmetry otherwise
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    h
}

/// Lanczos approximation (g = 7, n = 9)
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

// ============================================================================
// Thirds comparison
// ============================================================================

#[derive(Debug, Clone)]
pub struct ThirdsDetector {
    /// Minimum relative change between thirds to call a direction
    pub trend_threshold: f64,
    pub strong_change: f64,
    pub moderate_change: f64,
}

impl ThirdsDetector {
    pub fn from_config(config: &TrendConfig) -> Self {
        Self {
            trend_threshold: config.trend_threshold,
            strong_change: config.strong_change,
            moderate_change: config.moderate_change,
        }
    }
}

impl TrendDetector for ThirdsDetector {
    fn name(&self) -> &'static str {
        "thirds"
    }

    /// # Algorithm
    /// - Early mean: first `n / 3` points; late mean: last `ceil(n / 3)`
    /// - Direction and strength from `(late - early) / early`
    /// - Confidence from the first half against the second half
    fn detect(&self, values: &[f64]) -> TrendSignal {
        let n = values.len();
        if n < 3 {
            return TrendSignal::flat();
        }

        let early = mean(&values[..n / 3]);
        let late = mean(&values[n - n.div_ceil(3)..]);
        let change = relative_change(early, late);

        let direction = if change > self.trend_threshold {
            TrendDirection::Increasing
        } else if change < -self.trend_threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        let strength = match change.abs() {
            c if c > self.strong_change => TrendStrength::Strong,
            c if c > self.moderate_change => TrendStrength::Moderate,
            _ => TrendStrength::Weak,
        };

        let halves = relative_change(mean(&values[..n / 2]), mean(&values[n / 2..]));

        TrendSignal {
            direction,
            strength,
            confidence: (halves.abs() * 2.0).min(1.0),
            slope: None,
            p_value: None,
        }
    }
}

fn relative_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from
    }
}
