use super::parameter::ParameterValue;
use super::{ControlError, ControlInput, MoveSpec};
use std::path::PathBuf;

/// Everything a run needs on disk: the control tree plus the auxiliary input
/// files (configuration, field definitions, transition matrices) copied
/// verbatim into each run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDeck {
    pub control: ControlInput,
    pub files: Vec<PathBuf>,
}

impl InputDeck {
    pub fn new(control: ControlInput, files: Vec<PathBuf>) -> Self {
        Self { control, files }
    }

    /// Returns an independent copy of the deck with `value` applied.
    pub fn with_parameter(&self, value: &ParameterValue) -> Result<Self, ControlError> {
        let mut deck = self.clone();
        deck.amend_input_parameter(value)?;
        Ok(deck)
    }

    /// Writes one swept parameter into the control tree.
    pub fn amend_input_parameter(&mut self, value: &ParameterValue) -> Result<(), ControlError> {
        match *value {
            ParameterValue::Temperature(t) => self.control.main.temperature = t,
            ParameterValue::Steps(steps) => self.control.main.steps = steps,
            ParameterValue::MolChemPot(mu) => {
                let mut amended = 0;
                for mv in &mut self.control.main.moves {
                    if let MoveSpec::InsertMolecule { molpot, .. } = mv {
                        *molpot = mu;
                        amended += 1;
                    }
                }
                if amended == 0 {
                    return Err(ControlError::NoInsertionMoves);
                }
            }
            ParameterValue::Window(window) => {
                let fed = self.control.fed_mut().ok_or(ControlError::NoFedBlock)?;
                let grid = fed.order_parameter.grid;
                if !grid.contains(&window) {
                    return Err(ControlError::WindowOutsideGrid {
                        window,
                        xmin: grid.xmin,
                        xmax: grid.xmax,
                    });
                }
                fed.order_parameter.window = Some(window);
            }
        }
        Ok(())
    }
}
