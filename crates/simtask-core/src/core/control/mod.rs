//! Typed model of the engine's CONTROL input.
//!
//! The control file is a closed tree of named sections: an optional `use`
//! block (gas pressure, orthorhombic cell, free-energy scheme) followed by the
//! main block of run statements and Monte Carlo moves. Templates are written
//! as TOML and rendered to the engine's text format through [`fmt::Display`].

pub mod deck;
pub mod fed;
pub mod parameter;

pub use deck::InputDeck;
pub use fed::{BinGrid, FedBlock, FedFlavour, FedMethod, FedMode, OrderParameter, OrderWindow};
pub use parameter::{ParameterName, ParameterValue, pascal_to_katm};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Unknown control parameter '{0}' (expected temperature, molchempot, steps or orderparam)")]
    UnknownParameter(String),
    #[error("Invalid value '{value}' for parameter '{parameter}'")]
    InvalidValue { parameter: String, value: String },
    #[error("Parameter 'molchempot' requires at least one insert-molecule move")]
    NoInsertionMoves,
    #[error("Parameter 'orderparam' requires a fed block in the control template")]
    NoFedBlock,
    #[error("Window {window} lies outside the order-parameter grid [{xmin}, {xmax}]")]
    WindowOutsideGrid {
        window: OrderWindow,
        xmin: f64,
        xmax: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ControlInput {
    pub title: String,
    #[serde(rename = "use", default)]
    pub use_block: UseBlock,
    pub main: MainBlock,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UseBlock {
    #[serde(default)]
    pub gaspressure: bool,
    #[serde(default)]
    pub ortho: bool,
    #[serde(default)]
    pub fed: Option<FedBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MainBlock {
    pub temperature: f64,
    pub steps: u64,
    #[serde(default)]
    pub equilibration: u64,
    pub yamldata: u64,
    #[serde(default)]
    pub check: Option<u64>,
    #[serde(default)]
    pub stack: Option<u64>,
    #[serde(default)]
    pub print: Option<u64>,
    #[serde(default)]
    pub archive_format: Option<String>,
    #[serde(default)]
    pub ewald_precision: Option<f64>,
    #[serde(default)]
    pub noewald: bool,
    #[serde(default)]
    pub seeds: Option<[u32; 4]>,
    #[serde(default)]
    pub moves: Vec<MoveSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum MoveSpec {
    #[serde(rename_all = "kebab-case")]
    InsertMolecule {
        pfreq: u32,
        rmin: f64,
        molecule: String,
        molpot: f64,
    },
    #[serde(rename_all = "kebab-case")]
    Molecule { pfreq: u32, molecule: String },
    #[serde(rename_all = "kebab-case")]
    RotateMolecule { pfreq: u32, molecule: String },
}

impl fmt::Display for MoveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveSpec::InsertMolecule {
                pfreq,
                rmin,
                molecule,
                molpot,
            } => {
                writeln!(f, "move gcinsertmol 1 {} {}", pfreq, rmin)?;
                writeln!(f, "{} {:e}", molecule, molpot)
            }
            MoveSpec::Molecule { pfreq, molecule } => {
                writeln!(f, "move molecule 1 {}", pfreq)?;
                writeln!(f, "{}", molecule)
            }
            MoveSpec::RotateMolecule { pfreq, molecule } => {
                writeln!(f, "move rotatemol 1 {}", pfreq)?;
                writeln!(f, "{}", molecule)
            }
        }
    }
}

impl ControlInput {
    pub fn load(path: &Path) -> Result<Self, ControlError> {
        let content = std::fs::read_to_string(path).map_err(|e| ControlError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ControlError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn fed(&self) -> Option<&FedBlock> {
        self.use_block.fed.as_ref()
    }

    pub fn fed_mut(&mut self) -> Option<&mut FedBlock> {
        self.use_block.fed.as_mut()
    }

    pub fn has_insertion_moves(&self) -> bool {
        self.main
            .moves
            .iter()
            .any(|m| matches!(m, MoveSpec::InsertMolecule { .. }))
    }
}

impl fmt::Display for ControlInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;

        if self.use_block.gaspressure {
            writeln!(f, "use gaspressure")?;
        }
        if self.use_block.ortho {
            writeln!(f, "use ortho")?;
        }
        if let Some(fed) = &self.use_block.fed {
            write!(f, "{}", fed)?;
        }
        writeln!(f, "finish")?;

        let main = &self.main;
        if let Some([s0, s1, s2, s3]) = main.seeds {
            writeln!(f, "seeds {} {} {} {}", s0, s1, s2, s3)?;
        }
        if let Some(format) = &main.archive_format {
            writeln!(f, "archiveformat {}", format)?;
        }
        writeln!(f, "temperature {}", main.temperature)?;
        writeln!(f, "equilibration {}", main.equilibration)?;
        writeln!(f, "steps {}", main.steps)?;
        if let Some(check) = main.check {
            writeln!(f, "check {}", check)?;
        }
        if let Some(stack) = main.stack {
            writeln!(f, "stack {}", stack)?;
        }
        writeln!(f, "yamldata {}", main.yamldata)?;
        if let Some(print) = main.print {
            writeln!(f, "print {}", print)?;
        }
        if main.noewald {
            writeln!(f, "noewald all")?;
        } else if let Some(precision) = main.ewald_precision {
            writeln!(f, "ewald precision {:e}", precision)?;
        }
        for mv in &main.moves {
            write!(f, "{}", mv)?;
        }
        writeln!(f, "start")
    }
}
