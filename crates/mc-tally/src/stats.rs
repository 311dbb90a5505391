//! Conversion of raw moments into tally-quality diagnostics.
//!
//! With `N` histories and raw sums `S1..S4`:
//! - mean: `S1 · multiplier / (N · norm)`
//! - relative error: `sqrt(S2/S1² − 1/N)`
//! - relative variance of the variance:
//!   `(S4 − 4·S1·S3/N + 8·S2·S1²/N² − 4·S1⁴/N³ − S2²/N) / (S2 − S1²/N)²`
//! - figure of merit: `1 / (RE² · T)`
//!
//! Every diagnostic is reported as 0 when it cannot be estimated (zero score,
//! a single history, or a vanishing denominator).

use serde::{Deserialize, Serialize};

use crate::moments::{MomentPair, MomentQuad};

/// Processed binned cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedPair {
    /// Normalized mean.
    pub mean: f64,
    /// Relative standard error of the mean.
    pub relative_error: f64,
    /// Figure of merit.
    pub figure_of_merit: f64,
}

/// Processed total cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedQuad {
    /// Normalized mean.
    pub mean: f64,
    /// Relative standard error of the mean.
    pub relative_error: f64,
    /// Relative variance of the variance.
    pub variance_of_variance: f64,
    /// Figure of merit.
    pub figure_of_merit: f64,
}

/// `S1 / N`.
#[inline]
pub fn sample_mean(first: f64, n: u64) -> f64 {
    first / n as f64
}

/// Relative error of the sample mean.
pub fn relative_error(first: f64, second: f64, n: u64) -> f64 {
    if first == 0.0 || n < 2 {
        return 0.0;
    }
    let arg = second / (first * first) - 1.0 / n as f64;
    if arg > 0.0 { arg.sqrt() } else { 0.0 }
}

/// Relative variance of the variance.
pub fn relative_vov(q: &MomentQuad, n: u64) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    let (s1, s2, s3, s4) = (q.first, q.second, q.third, q.fourth);
    let s1_sq = s1 * s1;
    let denom = s2 - s1_sq / n;
    if denom == 0.0 {
        return 0.0;
    }
    let numer =
        s4 - 4.0 * s1 * s3 / n + 8.0 * s2 * s1_sq / (n * n) - 4.0 * s1_sq * s1_sq / (n * n * n)
            - s2 * s2 / n;
    let vov = numer / (denom * denom);
    if vov.is_finite() { vov } else { 0.0 }
}

/// Figure of merit `1/(RE²·T)`.
pub fn figure_of_merit(relative_error: f64, time: f64) -> f64 {
    if relative_error == 0.0 || time <= 0.0 {
        return 0.0;
    }
    1.0 / (relative_error * relative_error * time)
}

/// Process one binned cell.
pub fn process_pair(
    m: &MomentPair,
    multiplier: f64,
    norm: f64,
    n: u64,
    time: f64,
) -> ProcessedPair {
    let re = relative_error(m.first, m.second, n);
    ProcessedPair {
        mean: sample_mean(m.first, n) * multiplier / norm,
        relative_error: re,
        figure_of_merit: figure_of_merit(re, time),
    }
}

/// Process one total cell.
pub fn process_quad(
    q: &MomentQuad,
    multiplier: f64,
    norm: f64,
    n: u64,
    time: f64,
) -> ProcessedQuad {
    let re = relative_error(q.first, q.second, n);
    ProcessedQuad {
        mean: sample_mean(q.first, n) * multiplier / norm,
        relative_error: re,
        variance_of_variance: relative_vov(q, n),
        figure_of_merit: figure_of_merit(re, time),
    }
}
