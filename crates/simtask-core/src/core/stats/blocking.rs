use super::equilibration::EquilibrationDetector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockingOptions {
    /// Minimum number of blocks a blocking level must have to be considered.
    /// Values below two are raised to two.
    pub min_blocks: usize,
    /// Relative change between successive doublings under which the standard
    /// error is considered to have reached its plateau.
    pub plateau_tolerance: f64,
}

impl Default for BlockingOptions {
    fn default() -> Self {
        Self {
            min_blocks: 4,
            plateau_tolerance: 0.05,
        }
    }
}

/// Mean and uncertainty of a sample series.
///
/// `stderr` is NaN when the post-equilibration tail cannot be split into
/// enough blocks; `mean` is NaN only when the tail is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStatistics {
    pub mean: f64,
    pub stderr: f64,
    pub equilibration_index: usize,
    pub block_size: Option<usize>,
    pub samples: usize,
}

impl BlockStatistics {
    pub fn empty() -> Self {
        Self {
            mean: f64::NAN,
            stderr: f64::NAN,
            equilibration_index: 0,
            block_size: None,
            samples: 0,
        }
    }

    pub fn has_mean(&self) -> bool {
        self.mean.is_finite()
    }

    pub fn has_stderr(&self) -> bool {
        self.stderr.is_finite()
    }

    /// Post-equilibration samples that entered the mean.
    pub fn tail_len(&self) -> usize {
        self.samples.saturating_sub(self.equilibration_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockingLevel {
    pub block_size: usize,
    pub blocks: usize,
    pub stderr: f64,
}

/// Standard error of the mean at every block size `1, 2, 4, ...` that still
/// leaves at least `min_blocks` blocks. Trailing samples that do not fill a
/// whole block are dropped at each level.
pub fn blocking_levels(tail: &[f64], min_blocks: usize) -> Vec<BlockingLevel> {
    let min_blocks = min_blocks.max(2);
    let mut levels = Vec::new();
    let mut block_size = 1;
    while tail.len() / block_size >= min_blocks {
        let blocks = tail.len() / block_size;
        let means: Vec<f64> = tail[..blocks * block_size]
            .chunks_exact(block_size)
            .map(|c| c.iter().sum::<f64>() / block_size as f64)
            .collect();
        let grand = means.iter().sum::<f64>() / blocks as f64;
        let var = means.iter().map(|m| (m - grand).powi(2)).sum::<f64>() / (blocks - 1) as f64;
        levels.push(BlockingLevel {
            block_size,
            blocks,
            stderr: (var / blocks as f64).sqrt(),
        });
        block_size *= 2;
    }
    levels
}

fn select_level(levels: &[BlockingLevel], tolerance: f64) -> Option<BlockingLevel> {
    for pair in levels.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        // A zero estimate is a plateau only for a constant tail, which the
        // fallback below already covers.
        if a.stderr > 0.0 && (b.stderr - a.stderr).abs() <= tolerance * a.stderr {
            return Some(if b.stderr > a.stderr { b } else { a });
        }
    }
    // No plateau: the largest estimate is the conservative choice.
    levels
        .iter()
        .copied()
        .max_by(|a, b| a.stderr.total_cmp(&b.stderr))
}

/// Block-averaged statistics of `samples`.
///
/// Pure function of its inputs: the equilibration index comes from `detector`,
/// the mean is taken over the whole post-equilibration tail, and the standard
/// error over block means at the block size where doubling stops changing it.
pub fn block_statistics(
    samples: &[f64],
    detector: &dyn EquilibrationDetector,
    options: &BlockingOptions,
) -> BlockStatistics {
    if samples.is_empty() {
        return BlockStatistics::empty();
    }
    let equilibration_index = detector.detect(samples).min(samples.len());
    let tail = &samples[equilibration_index..];

    let mut stats = BlockStatistics {
        mean: f64::NAN,
        stderr: f64::NAN,
        equilibration_index,
        block_size: None,
        samples: samples.len(),
    };
    if tail.is_empty() {
        return stats;
    }
    stats.mean = tail.iter().sum::<f64>() / tail.len() as f64;

    let levels = blocking_levels(tail, options.min_blocks);
    if let Some(level) = select_level(&levels, options.plateau_tolerance) {
        stats.stderr = level.stderr;
        stats.block_size = Some(level.block_size);
    }
    stats
}
