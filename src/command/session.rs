use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{CommandError, Result};
use crate::geometry::{GeometryOracle, LinearOracle};
use crate::model::{Model, ModelDelta};
use crate::store::Direction;

use super::{Command, CommandContext};

/// Lifecycle of the last command submitted to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No command has run yet.
    Idle,
    /// A command is running.
    Executing,
    /// The last command succeeded and was recorded.
    Committed,
    /// The last command failed and was rolled back.
    Failed,
}

#[derive(Debug)]
struct CommandRecord {
    description: String,
    delta: ModelDelta,
}

/// An editing session: the model, its history and its oracle.
///
/// Sessions are independent of each other; nothing is global.
#[derive(Debug)]
pub struct Session {
    model: Model,
    oracle: Box<dyn GeometryOracle>,
    config: SessionConfig,
    undo_stack: VecDeque<CommandRecord>,
    redo_stack: Vec<CommandRecord>,
    state: EngineState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// Creates an empty session using the [`LinearOracle`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_oracle(config, Box::new(LinearOracle))
    }

    /// Creates an empty session with a custom geometry oracle.
    #[must_use]
    pub fn with_oracle(config: SessionConfig, oracle: Box<dyn GeometryOracle>) -> Self {
        Self {
            model: Model::new(),
            oracle,
            config,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            state: EngineState::Idle,
        }
    }

    /// The model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The geometry oracle.
    #[must_use]
    pub fn oracle(&self) -> &dyn GeometryOracle {
        self.oracle.as_ref()
    }

    /// Session settings.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// State of the last command.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// When `false`, undo releases the names the undone command
    /// allocated, so a replayed script reproduces the same names.
    pub fn set_name_shifting(&mut self, enabled: bool) {
        self.config.name_shifting = enabled;
    }

    /// Runs a command as one all-or-nothing step.
    ///
    /// On success the command is pushed on the undo stack and the redo
    /// stack is cleared. On failure the model is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub fn execute<C: Command>(&mut self, command: &C) -> Result<C::Output> {
        let description = command.description();
        debug!(command = %description, "executing");
        self.state = EngineState::Executing;
        self.model.begin();
        let mut ctx = CommandContext {
            model: &mut self.model,
            oracle: self.oracle.as_ref(),
            config: &self.config,
        };
        match command.apply(&mut ctx) {
            Ok(output) => {
                let delta = self.model.commit();
                self.state = EngineState::Committed;
                info!(command = %description, empty = delta.is_empty(), "committed");
                self.push(CommandRecord { description, delta });
                self.redo_stack.clear();
                Ok(output)
            }
            Err(err) => {
                self.model.rollback();
                self.state = EngineState::Failed;
                warn!(command = %description, error = %err, "command failed, model restored");
                Err(err)
            }
        }
    }

    fn push(&mut self, record: CommandRecord) {
        self.undo_stack.push_back(record);
        if let Some(limit) = self.config.history_limit {
            while self.undo_stack.len() > limit {
                if let Some(dropped) = self.undo_stack.pop_front() {
                    debug!(command = %dropped.description, "dropped from history");
                }
            }
        }
    }

    /// Reverts the last committed command.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to undo.
    pub fn undo(&mut self) -> Result<()> {
        let record = self.undo_stack.pop_back().ok_or(CommandError::NothingToUndo)?;
        self.model
            .apply(&record.delta, Direction::Backward, !self.config.name_shifting);
        info!(command = %record.description, "undone");
        self.redo_stack.push(record);
        Ok(())
    }

    /// Re-applies the last undone command.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to redo.
    pub fn redo(&mut self) -> Result<()> {
        let record = self.redo_stack.pop().ok_or(CommandError::NothingToRedo)?;
        self.model.apply(&record.delta, Direction::Forward, false);
        info!(command = %record.description, "redone");
        self.undo_stack.push_back(record);
        Ok(())
    }

    /// Returns `true` if a command can be undone.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns `true` if a command can be redone.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Descriptions of the undoable commands, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<&str> {
        self.undo_stack.iter().map(|r| r.description.as_str()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ValidationError};
    use crate::math::Point3;
    use crate::operations::creation::NewVertex;

    struct Failing;

    impl Command for Failing {
        type Output = ();

        fn description(&self) -> String {
            "failing".into()
        }

        fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
            ctx.model.geom.add_point(Point3::origin());
            Err(ValidationError::InvalidInput("boom".into()).into())
        }
    }

    #[test]
    fn failed_command_leaves_no_trace() {
        let mut session = Session::default();
        let err = session.execute(&Failing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(session.state(), EngineState::Failed);
        assert_eq!(session.model().nb_points(), 0);
        assert!(!session.can_undo());
        session.execute(&NewVertex::new(Point3::origin())).unwrap();
        assert_eq!(session.model().geom().name(session.model().geom().all_of_dimension(0)[0]), "Pt0000");
    }

    #[test]
    fn undo_redo_in_stack_order() {
        let mut session = Session::default();
        session.execute(&NewVertex::new(Point3::origin())).unwrap();
        session.execute(&NewVertex::new(Point3::new(1.0, 0.0, 0.0))).unwrap();
        assert_eq!(session.model().nb_points(), 2);

        session.undo().unwrap();
        assert_eq!(session.model().nb_points(), 1);
        assert!(session.can_redo());
        session.redo().unwrap();
        assert_eq!(session.model().nb_points(), 2);
        assert!(session.model().find("Pt0001").is_some());

        session.undo().unwrap();
        session.undo().unwrap();
        assert_eq!(session.undo().unwrap_err().kind(), ErrorKind::Command);
        session.redo().unwrap();
        session.execute(&NewVertex::new(Point3::new(2.0, 0.0, 0.0))).unwrap();
        assert!(!session.can_redo());
    }

    #[test]
    fn name_shifting_controls_name_reuse() {
        let mut session = Session::default();
        session.execute(&NewVertex::new(Point3::origin())).unwrap();
        session.undo().unwrap();
        session.execute(&NewVertex::new(Point3::origin())).unwrap();
        assert!(session.model().find("Pt0001").is_some());

        let mut replay = Session::default();
        replay.set_name_shifting(false);
        replay.execute(&NewVertex::new(Point3::origin())).unwrap();
        replay.undo().unwrap();
        replay.execute(&NewVertex::new(Point3::origin())).unwrap();
        assert!(replay.model().find("Pt0000").is_some());
    }

    #[test]
    fn history_limit_drops_oldest() {
        let config = SessionConfig {
            history_limit: Some(2),
            ..SessionConfig::default()
        };
        let mut session = Session::new(config);
        for i in 0..3 {
            let p = Point3::new(f64::from(i), 0.0, 0.0);
            session.execute(&NewVertex::new(p)).unwrap();
        }
        assert_eq!(session.history().len(), 2);
        session.undo().unwrap();
        session.undo().unwrap();
        assert!(!session.can_undo());
        assert_eq!(session.model().nb_points(), 1);
    }
}
