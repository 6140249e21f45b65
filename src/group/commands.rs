use tracing::warn;

use crate::command::{Command, CommandContext};
use crate::error::Result;
use crate::model::EntityRef;

fn check_alive(ctx: &CommandContext<'_>, entities: &[EntityRef]) -> Result<()> {
    for &e in entities {
        ctx.model.check(e)?;
    }
    Ok(())
}

/// Adds entities to a group, creating the group on first use.
pub struct AddToGroup {
    entities: Vec<EntityRef>,
    dimension: u8,
    name: String,
}

impl AddToGroup {
    /// Creates a new `AddToGroup` command.
    #[must_use]
    pub fn new(entities: Vec<EntityRef>, dimension: u8, name: impl Into<String>) -> Self {
        Self {
            entities,
            dimension,
            name: name.into(),
        }
    }
}

impl Command for AddToGroup {
    type Output = ();

    fn description(&self) -> String {
        format!("add {} entities to group {}", self.entities.len(), self.name)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        check_alive(ctx, &self.entities)?;
        let added = ctx
            .model
            .groups
            .add(&self.entities, self.dimension, &self.name)?;
        let already = self.entities.len() - added;
        if already > 0 {
            warn!(group = %self.name, already, "entities already in group, left unchanged");
        }
        Ok(())
    }
}

/// Removes entities from a group.
pub struct RemoveFromGroup {
    entities: Vec<EntityRef>,
    dimension: u8,
    name: String,
}

impl RemoveFromGroup {
    /// Creates a new `RemoveFromGroup` command.
    #[must_use]
    pub fn new(entities: Vec<EntityRef>, dimension: u8, name: impl Into<String>) -> Self {
        Self {
            entities,
            dimension,
            name: name.into(),
        }
    }
}

impl Command for RemoveFromGroup {
    type Output = ();

    fn description(&self) -> String {
        format!("remove {} entities from group {}", self.entities.len(), self.name)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        check_alive(ctx, &self.entities)?;
        let removed = ctx
            .model
            .groups
            .remove(&self.entities, self.dimension, &self.name)?;
        if removed < self.entities.len() {
            warn!(
                group = %self.name,
                missing = self.entities.len() - removed,
                "entities were not in group"
            );
        }
        Ok(())
    }
}

/// Makes a group the only explicit group of the given entities.
pub struct SetGroup {
    entities: Vec<EntityRef>,
    dimension: u8,
    name: String,
}

impl SetGroup {
    /// Creates a new `SetGroup` command.
    #[must_use]
    pub fn new(entities: Vec<EntityRef>, dimension: u8, name: impl Into<String>) -> Self {
        Self {
            entities,
            dimension,
            name: name.into(),
        }
    }
}

impl Command for SetGroup {
    type Output = ();

    fn description(&self) -> String {
        format!("set group {} on {} entities", self.name, self.entities.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        check_alive(ctx, &self.entities)?;
        ctx.model
            .groups
            .set(&self.entities, self.dimension, &self.name)
    }
}

/// Empties a group.
pub struct ClearGroup {
    dimension: u8,
    name: String,
}

impl ClearGroup {
    /// Creates a new `ClearGroup` command.
    #[must_use]
    pub fn new(dimension: u8, name: impl Into<String>) -> Self {
        Self {
            dimension,
            name: name.into(),
        }
    }
}

impl Command for ClearGroup {
    type Output = ();

    fn description(&self) -> String {
        format!("clear group {}", self.name)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        ctx.model.groups.clear(self.dimension, &self.name)
    }
}

/// Renames a group.
pub struct RenameGroup {
    old: String,
    new: String,
    dimension: u8,
}

impl RenameGroup {
    /// Creates a new `RenameGroup` command.
    #[must_use]
    pub fn new(old: impl Into<String>, new: impl Into<String>, dimension: u8) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
            dimension,
        }
    }
}

impl Command for RenameGroup {
    type Output = ();

    fn description(&self) -> String {
        format!("rename group {} to {}", self.old, self.new)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        ctx.model.groups.rename(&self.old, &self.new, self.dimension)
    }
}
