mod commands;

pub use commands::{AddToGroup, ClearGroup, RemoveFromGroup, RenameGroup, SetGroup};

use std::collections::BTreeSet;

use crate::error::{Result, ValidationError};
use crate::model::EntityRef;
use crate::store::{Arena, ArenaDelta, Direction};

slotmap::new_key_type! {
    /// Unique identifier for a group.
    pub struct GroupId;
}

/// A named group of entities of one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupData {
    /// User-visible name, unique per dimension.
    pub name: String,
    /// Dimension of the members.
    pub dimension: u8,
    /// Explicit members.
    pub members: BTreeSet<EntityRef>,
}

/// Net effect of a transaction on the groups.
pub type GroupDelta = ArenaDelta<GroupId, GroupData>;

/// Registry of the explicit groups of a model.
///
/// Default groups and implicit memberships are computed from the explicit
/// ones on demand, so they cannot drift across undo and redo.
#[derive(Debug)]
pub struct GroupRegistry {
    groups: Arena<GroupId, GroupData>,
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self {
            groups: Arena::new("Gr"),
        }
    }
}

impl GroupRegistry {
    /// Name of the default group of a dimension.
    #[must_use]
    pub fn default_name(dimension: u8) -> String {
        format!("Hors_Groupe_{dimension}D")
    }

    /// Returns `true` if `name` is the default group of `dimension`.
    #[must_use]
    pub fn is_default(name: &str, dimension: u8) -> bool {
        name == Self::default_name(dimension)
    }

    /// Looks up a group by name and dimension.
    #[must_use]
    pub fn find(&self, name: &str, dimension: u8) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| g.dimension == dimension && g.name == name)
            .map(|(id, _)| id)
    }

    /// Returns the group data.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is not found.
    pub fn group(&self, id: GroupId) -> Result<&GroupData, ValidationError> {
        self.groups
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.groups.name(id)))
    }

    /// Live groups.
    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &GroupData)> {
        self.groups.iter()
    }

    /// Names of the explicit groups of a dimension, sorted.
    #[must_use]
    pub fn names(&self, dimension: u8) -> Vec<String> {
        let mut out: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, g)| g.dimension == dimension)
            .map(|(_, g)| g.name.clone())
            .collect();
        out.sort();
        out
    }

    /// Names of the explicit groups holding `entity`, sorted.
    #[must_use]
    pub fn groups_of(&self, entity: EntityRef) -> Vec<String> {
        let mut out: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, g)| g.members.contains(&entity))
            .map(|(_, g)| g.name.clone())
            .collect();
        out.sort();
        out
    }

    /// First explicit group holding both entities.
    #[must_use]
    pub fn shared_group(&self, a: EntityRef, b: EntityRef) -> Option<String> {
        self.groups
            .iter()
            .find(|(_, g)| g.members.contains(&a) && g.members.contains(&b))
            .map(|(_, g)| g.name.clone())
    }

    fn check_dimension(entities: &[EntityRef], dimension: u8, name: &str) -> Result<()> {
        if let Some(bad) = entities.iter().find(|e| e.dimension() != dimension) {
            return Err(ValidationError::DimensionMismatch {
                entity: format!("member of group {name}"),
                expected: dimension,
                found: bad.dimension(),
            }
            .into());
        }
        Ok(())
    }

    fn find_or_create(&mut self, name: &str, dimension: u8) -> GroupId {
        self.find(name, dimension).unwrap_or_else(|| {
            self.groups.insert(GroupData {
                name: name.to_owned(),
                dimension,
                members: BTreeSet::new(),
            })
        })
    }

    fn existing_mut(&mut self, name: &str, dimension: u8) -> Result<&mut GroupData> {
        let id = self
            .find(name, dimension)
            .ok_or_else(|| ValidationError::EntityNotFound(format!("group {name} ({dimension}D)")))?;
        let label = self.groups.name(id);
        Ok(self
            .groups
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(label))?)
    }

    /// Adds entities to a group, creating it if needed. Returns how many
    /// were not already members.
    ///
    /// # Errors
    ///
    /// Returns an error for a default group name or a member of the
    /// wrong dimension.
    pub fn add(&mut self, entities: &[EntityRef], dimension: u8, name: &str) -> Result<usize> {
        if Self::is_default(name, dimension) {
            return Err(ValidationError::DefaultGroup(name.to_owned()).into());
        }
        Self::check_dimension(entities, dimension, name)?;
        let id = self.find_or_create(name, dimension);
        let label = self.groups.name(id);
        let group = self
            .groups
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(label))?;
        Ok(entities.iter().filter(|e| group.members.insert(**e)).count())
    }

    /// Removes entities from a group. Returns how many were members.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist.
    pub fn remove(&mut self, entities: &[EntityRef], dimension: u8, name: &str) -> Result<usize> {
        let group = self.existing_mut(name, dimension)?;
        Ok(entities.iter().filter(|e| group.members.remove(*e)).count())
    }

    /// Makes `name` the only explicit group of each entity.
    ///
    /// # Errors
    ///
    /// Returns an error for a default group name or a member of the
    /// wrong dimension.
    pub fn set(&mut self, entities: &[EntityRef], dimension: u8, name: &str) -> Result<()> {
        if Self::is_default(name, dimension) {
            return Err(ValidationError::DefaultGroup(name.to_owned()).into());
        }
        Self::check_dimension(entities, dimension, name)?;
        for &e in entities {
            self.forget(e);
        }
        self.add(entities, dimension, name)?;
        Ok(())
    }

    /// Empties a group; its members fall back to the default group unless
    /// they belong to another one.
    ///
    /// # Errors
    ///
    /// Returns an error for a default group or an unknown group.
    pub fn clear(&mut self, dimension: u8, name: &str) -> Result<()> {
        if Self::is_default(name, dimension) {
            return Err(ValidationError::DefaultGroup(name.to_owned()).into());
        }
        self.existing_mut(name, dimension)?.members.clear();
        Ok(())
    }

    /// Renames a group.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is a default group, the group is
    /// unknown or the new name is taken.
    pub fn rename(&mut self, old: &str, new: &str, dimension: u8) -> Result<()> {
        for n in [old, new] {
            if Self::is_default(n, dimension) {
                return Err(ValidationError::DefaultGroup(n.to_owned()).into());
            }
        }
        if self.find(new, dimension).is_some() {
            return Err(ValidationError::GroupExists(new.to_owned()).into());
        }
        new.clone_into(&mut self.existing_mut(old, dimension)?.name);
        Ok(())
    }

    /// Removes an entity from every group.
    pub fn forget(&mut self, entity: EntityRef) {
        let holding: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, g)| g.members.contains(&entity))
            .map(|(id, _)| id)
            .collect();
        for id in holding {
            if let Some(group) = self.groups.get_mut(id) {
                group.members.remove(&entity);
            }
        }
    }

    /// Puts `to` in every group holding `from`.
    pub fn inherit(&mut self, from: EntityRef, to: EntityRef) {
        let holding: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, g)| g.members.contains(&from) && g.dimension == to.dimension())
            .map(|(id, _)| id)
            .collect();
        for id in holding {
            if let Some(group) = self.groups.get_mut(id) {
                group.members.insert(to);
            }
        }
    }

    /// Replaces `old` with `new` in every group holding `old`.
    pub fn replace(&mut self, old: EntityRef, new: EntityRef) {
        self.inherit(old, new);
        self.forget(old);
    }

    pub(crate) fn begin(&mut self) {
        self.groups.begin();
    }

    pub(crate) fn commit(&mut self) -> GroupDelta {
        self.groups.commit()
    }

    pub(crate) fn rollback(&mut self) {
        self.groups.rollback();
    }

    pub(crate) fn apply(&mut self, delta: &GroupDelta, direction: Direction, rewind: bool) {
        self.groups.apply(delta, direction, rewind);
    }
}
