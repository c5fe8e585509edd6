use serde::{Deserialize, Serialize};

/// Locates the first sample considered free of the initial transient.
pub trait EquilibrationDetector {
    /// Returns the index of the first post-equilibration sample, `0..=samples.len()`.
    fn detect(&self, samples: &[f64]) -> usize;
}

/// Built-in equilibration detection policies.
///
/// The default is the Marginal Standard Error Rule (MSER): among candidate
/// truncation points `d` (multiples of `batch_size`, no later than
/// `max_truncation * n`) pick the one minimising
///
/// ```text
/// MSER(d) = sum_{i >= d} (x_i - mean(x[d..]))^2 / (n - d)^2
/// ```
///
/// i.e. the truncation that yields the narrowest confidence interval for the
/// tail mean. Ties resolve to the earliest candidate, so a stationary series
/// keeps all of its samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum EquilibrationPolicy {
    #[serde(rename_all = "kebab-case")]
    Mser {
        batch_size: usize,
        max_truncation: f64,
    },
    #[serde(rename_all = "kebab-case")]
    FixedFraction { fraction: f64 },
    None,
}

impl Default for EquilibrationPolicy {
    fn default() -> Self {
        Self::Mser {
            batch_size: 5,
            max_truncation: 0.5,
        }
    }
}

impl EquilibrationDetector for EquilibrationPolicy {
    fn detect(&self, samples: &[f64]) -> usize {
        match *self {
            Self::Mser {
                batch_size,
                max_truncation,
            } => mser_truncation(samples, batch_size, max_truncation),
            Self::FixedFraction { fraction } => {
                let fraction = fraction.clamp(0.0, 1.0);
                ((samples.len() as f64) * fraction).floor() as usize
            }
            Self::None => 0,
        }
    }
}

fn mser_truncation(samples: &[f64], batch_size: usize, max_truncation: f64) -> usize {
    let n = samples.len();
    if n < 3 {
        return 0;
    }
    let step = batch_size.max(1);
    let limit = ((n as f64) * max_truncation.clamp(0.0, 1.0)).floor() as usize;
    let limit = limit.min(n - 2);

    // Shift by the global mean to keep the suffix sums well conditioned.
    let shift = samples.iter().sum::<f64>() / n as f64;
    let mut suffix_sum = vec![0.0; n + 1];
    let mut suffix_sq = vec![0.0; n + 1];
    for i in (0..n).rev() {
        let x = samples[i] - shift;
        suffix_sum[i] = suffix_sum[i + 1] + x;
        suffix_sq[i] = suffix_sq[i + 1] + x * x;
    }

    let mut best_d = 0;
    let mut best_value = f64::INFINITY;
    let mut d = 0;
    while d <= limit {
        let m = (n - d) as f64;
        let ss = (suffix_sq[d] - suffix_sum[d] * suffix_sum[d] / m).max(0.0);
        let value = ss / (m * m);
        if value < best_value {
            best_value = value;
            best_d = d;
        }
        d += step;
    }
    best_d
}
