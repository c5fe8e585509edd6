use super::ControlError;
use super::fed::OrderWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversion factor from pascal to kilo-atmosphere, the pressure unit the
/// engine expects for `molpot` under `use gaspressure`.
pub const PA_TO_KATM: f64 = 9.86923e-9;

pub fn pascal_to_katm(pascal: f64) -> f64 {
    pascal * PA_TO_KATM
}

/// Control parameters that a sweep may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterName {
    Temperature,
    MolChemPot,
    Steps,
    OrderParam,
}

impl ParameterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterName::Temperature => "temperature",
            ParameterName::MolChemPot => "molchempot",
            ParameterName::Steps => "steps",
            ParameterName::OrderParam => "orderparam",
        }
    }

    /// Parses one raw sweep value. Order-parameter windows are written `lo:hi`.
    pub fn parse_value(&self, raw: &str) -> Result<ParameterValue, ControlError> {
        let invalid = || ControlError::InvalidValue {
            parameter: self.as_str().to_string(),
            value: raw.to_string(),
        };
        let raw = raw.trim();
        match self {
            ParameterName::Temperature => raw
                .parse()
                .map(ParameterValue::Temperature)
                .map_err(|_| invalid()),
            ParameterName::MolChemPot => raw
                .parse()
                .map(ParameterValue::MolChemPot)
                .map_err(|_| invalid()),
            ParameterName::Steps => raw.parse().map(ParameterValue::Steps).map_err(|_| invalid()),
            ParameterName::OrderParam => {
                let (lo, hi) = raw.split_once(':').ok_or_else(invalid)?;
                let lo = lo.trim().parse().map_err(|_| invalid())?;
                let hi = hi.trim().parse().map_err(|_| invalid())?;
                Ok(ParameterValue::Window(OrderWindow { lo, hi }))
            }
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(ParameterName::Temperature),
            "molchempot" => Ok(ParameterName::MolChemPot),
            "steps" => Ok(ParameterName::Steps),
            "orderparam" => Ok(ParameterName::OrderParam),
            _ => Err(ControlError::UnknownParameter(s.to_string())),
        }
    }
}

/// One value of a swept parameter, typed by the field it amends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "parameter", content = "value")]
pub enum ParameterValue {
    Temperature(f64),
    MolChemPot(f64),
    Steps(u64),
    #[serde(rename = "orderparam")]
    Window(OrderWindow),
}

impl ParameterValue {
    pub fn name(&self) -> ParameterName {
        match self {
            ParameterValue::Temperature(_) => ParameterName::Temperature,
            ParameterValue::MolChemPot(_) => ParameterName::MolChemPot,
            ParameterValue::Steps(_) => ParameterName::Steps,
            ParameterValue::Window(_) => ParameterName::OrderParam,
        }
    }

    /// Scalar position of the value on the swept axis; windows use their centre.
    pub fn coordinate(&self) -> f64 {
        match *self {
            ParameterValue::Temperature(v) | ParameterValue::MolChemPot(v) => v,
            ParameterValue::Steps(v) => v as f64,
            ParameterValue::Window(w) => 0.5 * (w.lo + w.hi),
        }
    }

    /// Output subdirectory name for this value, e.g. `param_300` or
    /// `param_win_-0.5_20.5`.
    pub fn dir_name(&self) -> String {
        match self {
            ParameterValue::Window(w) => format!("param_win_{}_{}", w.lo, w.hi),
            _ => format!("param_{}", self),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Temperature(v) | ParameterValue::MolChemPot(v) => write!(f, "{}", v),
            ParameterValue::Steps(v) => write!(f, "{}", v),
            ParameterValue::Window(w) => write!(f, "{}", w),
        }
    }
}
