mod session;

pub use session::{EngineState, Session};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::geometry::GeometryOracle;
use crate::model::Model;

/// A mutation of the model.
///
/// A command only describes the change. The [`Session`] runs it inside a
/// transaction and either records the delta or rolls everything back.
pub trait Command {
    /// Value returned by a successful run.
    type Output;

    /// Human-readable summary, kept in the history.
    fn description(&self) -> String;

    /// Performs the mutation inside an open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be applied. The session
    /// then discards every change made so far.
    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Self::Output>;
}

/// What a command sees while it runs.
pub struct CommandContext<'a> {
    /// The model being mutated.
    pub model: &'a mut Model,
    /// Shape queries.
    pub oracle: &'a dyn GeometryOracle,
    /// Session settings.
    pub config: &'a SessionConfig,
}

impl CommandContext<'_> {
    /// Runs another command inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever the nested command returns.
    pub fn run<C: Command>(&mut self, command: &C) -> Result<C::Output> {
        tracing::debug!(command = %command.description(), "nested command");
        command.apply(self)
    }
}
