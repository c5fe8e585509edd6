use super::interface::Engine;
use super::progress::ProgressReporter;

/// Collaborators passed explicitly into every orchestration call.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub engine: &'a dyn Engine,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> RunContext<'a> {
    pub fn new(engine: &'a dyn Engine, reporter: &'a ProgressReporter<'a>) -> Self {
        Self { engine, reporter }
    }
}
