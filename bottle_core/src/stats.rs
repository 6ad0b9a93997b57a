//! Outlier-filtered sample statistics.
//!
//! Two passes over a batch of raw ADC readings: the first computes mean and
//! population variance of everything, the second recomputes both over the
//! samples within `outlier_std_devs` standard deviations of the first mean.
//! Accumulation is in `f64` so 24-bit load-cell counts stay exact.

use crate::config::StatsCfg;

/// Result of `filtered_stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    /// Mean of the retained samples.
    pub mean: f64,
    /// Population variance of the retained samples.
    pub variance: f64,
    /// Samples that survived the outlier filter.
    pub retained: usize,
    /// Samples offered.
    pub total: usize,
    /// `retained >= min_samples`.
    pub valid: bool,
}

impl SampleStats {
    fn empty() -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
            retained: 0,
            total: 0,
            valid: false,
        }
    }

    /// Standard deviation of the retained samples.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Samples discarded as outliers.
    pub fn rejected(&self) -> usize {
        self.total - self.retained
    }
}

fn mean_variance(samples: impl Iterator<Item = f64> + Clone) -> (f64, f64, usize) {
    let mut n = 0usize;
    let mut sum = 0.0f64;
    for x in samples.clone() {
        sum += x;
        n += 1;
    }
    if n == 0 {
        return (0.0, 0.0, 0);
    }
    let mean = sum / n as f64;
    let sq: f64 = samples.map(|x| (x - mean) * (x - mean)).sum();
    (mean, sq / n as f64, n)
}

/// Mean/variance of `samples` after discarding values farther than
/// `cfg.outlier_std_devs` standard deviations from the unfiltered mean.
pub fn filtered_stats(samples: &[i32], cfg: &StatsCfg) -> SampleStats {
    if samples.is_empty() {
        return SampleStats::empty();
    }
    let (mean0, var0, total) = mean_variance(samples.iter().map(|&s| f64::from(s)));
    let limit = cfg.outlier_std_devs * var0.sqrt();

    let kept = samples
        .iter()
        .map(|&s| f64::from(s))
        .filter(move |x| (x - mean0).abs() <= limit);
    let (mean, variance, retained) = mean_variance(kept);

    SampleStats {
        mean,
        variance,
        retained,
        total,
        valid: retained >= cfg.min_samples,
    }
}
