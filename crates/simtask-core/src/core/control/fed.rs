use serde::{Deserialize, Serialize};
use std::fmt;

const GRID_EPSILON: f64 = 1e-9;

/// Uniform binning of an order parameter: `ngrid` bins spanning `[xmin, xmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BinGrid {
    pub ngrid: usize,
    pub xmin: f64,
    pub xmax: f64,
}

impl BinGrid {
    pub fn bin_width(&self) -> f64 {
        (self.xmax - self.xmin) / self.ngrid as f64
    }

    /// Two grids are aligned when they share bin width and global origin, so
    /// bin `i` of one denotes the same order-parameter interval as bin `i` of
    /// the other.
    pub fn is_aligned_with(&self, other: &BinGrid) -> bool {
        self.ngrid == other.ngrid
            && (self.xmin - other.xmin).abs() < GRID_EPSILON
            && (self.bin_width() - other.bin_width()).abs() < GRID_EPSILON
    }

    pub fn contains(&self, window: &OrderWindow) -> bool {
        window.lo >= self.xmin - GRID_EPSILON
            && window.hi <= self.xmax + GRID_EPSILON
            && window.lo < window.hi
    }
}

/// Sub-range of the order parameter sampled by one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderWindow {
    pub lo: f64,
    pub hi: f64,
}

impl fmt::Display for OrderWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FedFlavour {
    #[default]
    Generic,
}

/// Whether the transition matrix is accumulated from scratch or reloaded
/// from a `TMATRX` file in the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FedMode {
    #[default]
    #[serde(rename = "new")]
    New,
    #[serde(rename = "res")]
    Resume,
}

impl fmt::Display for FedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FedMode::New => write!(f, "new"),
            FedMode::Resume => write!(f, "res"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FedMethod {
    #[serde(rename_all = "kebab-case")]
    TransitionMatrix {
        nout: u64,
        n_upd: u64,
        #[serde(default)]
        mode: FedMode,
        #[serde(default)]
        tri: bool,
    },
}

impl FedMethod {
    pub fn mode(&self) -> FedMode {
        match self {
            FedMethod::TransitionMatrix { mode, .. } => *mode,
        }
    }

    pub fn set_mode(&mut self, new_mode: FedMode) {
        match self {
            FedMethod::TransitionMatrix { mode, .. } => *mode = new_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderParameter {
    pub name: String,
    #[serde(flatten)]
    pub grid: BinGrid,
    #[serde(default = "default_npow")]
    pub npow: u32,
    #[serde(default)]
    pub window: Option<OrderWindow>,
}

fn default_npow() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FedBlock {
    #[serde(default)]
    pub flavour: FedFlavour,
    pub method: FedMethod,
    pub order_parameter: OrderParameter,
}

impl fmt::Display for FedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.flavour {
            FedFlavour::Generic => writeln!(f, "use fed generic")?,
        }
        match &self.method {
            FedMethod::TransitionMatrix {
                nout,
                n_upd,
                mode,
                tri,
            } => {
                write!(f, "  fed method tm {} {} {}", nout, n_upd, mode)?;
                if *tri {
                    write!(f, " tri")?;
                }
                writeln!(f)?;
            }
        }
        let op = &self.order_parameter;
        write!(
            f,
            "  fed order param {} {} {} {} {}",
            op.name, op.grid.ngrid, op.grid.xmin, op.grid.xmax, op.npow
        )?;
        if let Some(window) = op.window {
            write!(f, " win {} {}", window.lo, window.hi)?;
        }
        writeln!(f)?;
        writeln!(f, "fed done")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(ngrid: usize, xmin: f64, xmax: f64) -> BinGrid {
        BinGrid { ngrid, xmin, xmax }
    }

    #[test]
    fn unit_bins_centred_on_integers() {
        let g = grid(261, -0.5, 260.5);
        assert!((g.bin_width() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn alignment_requires_same_origin_and_width() {
        let base = grid(30, -0.5, 29.5);
        assert!(base.is_aligned_with(&grid(30, -0.5, 29.5)));
        assert!(!base.is_aligned_with(&grid(15, -0.5, 29.5)));
        assert!(!base.is_aligned_with(&grid(30, 0.0, 30.0)));
    }

    #[test]
    fn window_containment() {
        let g = grid(30, -0.5, 29.5);
        assert!(g.contains(&OrderWindow { lo: -0.5, hi: 10.5 }));
        assert!(!g.contains(&OrderWindow { lo: 20.5, hi: 30.5 }));
        assert!(!g.contains(&OrderWindow { lo: 5.0, hi: 5.0 }));
    }

    #[test]
    fn renders_tm_block_with_window() {
        let block = FedBlock {
            flavour: FedFlavour::Generic,
            method: FedMethod::TransitionMatrix {
                nout: 1000,
                n_upd: 10,
                mode: FedMode::New,
                tri: true,
            },
            order_parameter: OrderParameter {
                name: "nmols".to_string(),
                grid: grid(261, -0.5, 260.5),
                npow: 1,
                window: Some(OrderWindow { lo: -0.5, hi: 20.5 }),
            },
        };
        let text = block.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "use fed generic");
        assert_eq!(lines[1], "  fed method tm 1000 10 new tri");
        assert_eq!(lines[2], "  fed order param nmols 261 -0.5 260.5 1 win -0.5 20.5");
        assert_eq!(lines[3], "fed done");
    }
}
