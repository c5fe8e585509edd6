//! Statistical reduction of observable sample series.
//!
//! A series is first truncated at its equilibration point ([`equilibration`]),
//! then its post-equilibration tail is block-averaged ([`blocking`]) to obtain
//! a standard error that accounts for serial correlation.

pub mod blocking;
pub mod equilibration;

pub use blocking::{BlockStatistics, BlockingOptions, block_statistics};
pub use equilibration::{EquilibrationDetector, EquilibrationPolicy};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StatisticsConfig {
    pub equilibration: EquilibrationPolicy,
    pub blocking: BlockingOptions,
}

impl StatisticsConfig {
    pub fn analyze(&self, samples: &[f64]) -> BlockStatistics {
        block_statistics(samples, &self.equilibration, &self.blocking)
    }
}
