use std::collections::BTreeSet;

use crate::error::{Result, ValidationError};
use crate::geometry::{GeomRef, GeometryDelta, GeometryStore};
use crate::group::{GroupDelta, GroupRegistry};
use crate::store::Direction;
use crate::topology::{TopoRef, TopologyDelta, TopologyStore};

/// Reference to any entity of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityRef {
    Topo(TopoRef),
    Geom(GeomRef),
}

impl EntityRef {
    /// Dimension of the referenced entity.
    #[must_use]
    pub fn dimension(self) -> u8 {
        match self {
            Self::Topo(t) => t.dimension(),
            Self::Geom(g) => g.dimension(),
        }
    }
}

impl From<TopoRef> for EntityRef {
    fn from(value: TopoRef) -> Self {
        Self::Topo(value)
    }
}

impl From<GeomRef> for EntityRef {
    fn from(value: GeomRef) -> Self {
        Self::Geom(value)
    }
}

/// Net effect of one command on the whole model.
#[derive(Debug, Clone)]
pub struct ModelDelta {
    geom: GeometryDelta,
    topo: TopologyDelta,
    groups: GroupDelta,
}

impl ModelDelta {
    /// Returns `true` if the command changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geom.is_empty() && self.topo.is_empty() && self.groups.is_empty()
    }
}

/// The session graph: geometric layer, topological layer and groups.
#[derive(Debug, Default)]
pub struct Model {
    pub(crate) geom: GeometryStore,
    pub(crate) topo: TopologyStore,
    pub(crate) groups: GroupRegistry,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The geometric layer.
    #[must_use]
    pub fn geom(&self) -> &GeometryStore {
        &self.geom
    }

    /// The topological layer.
    #[must_use]
    pub fn topo(&self) -> &TopologyStore {
        &self.topo
    }

    /// The group registry.
    #[must_use]
    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Session name of an entity.
    #[must_use]
    pub fn name(&self, entity: EntityRef) -> String {
        match entity {
            EntityRef::Topo(t) => self.topo.name(t),
            EntityRef::Geom(g) => self.geom.name(g),
        }
    }

    /// Looks up a live entity by its session name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<EntityRef> {
        self.topo
            .find(name)
            .map(EntityRef::Topo)
            .or_else(|| self.geom.find(name).map(EntityRef::Geom))
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn exists(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Topo(t) => self.topo.exists(t),
            EntityRef::Geom(g) => self.geom.exists(g),
        }
    }

    /// Fails with the entity's name if it is not alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn check(&self, entity: EntityRef) -> Result<(), ValidationError> {
        match entity {
            EntityRef::Topo(t) => self.topo.check(t),
            EntityRef::Geom(g) => self.geom.check(g),
        }
    }

    /// Number of live vertices.
    #[must_use]
    pub fn nb_vertices(&self) -> usize {
        self.topo.count(0)
    }

    /// Number of live edges.
    #[must_use]
    pub fn nb_edges(&self) -> usize {
        self.topo.count(1)
    }

    /// Number of live faces.
    #[must_use]
    pub fn nb_faces(&self) -> usize {
        self.topo.count(2)
    }

    /// Number of live blocks.
    #[must_use]
    pub fn nb_blocks(&self) -> usize {
        self.topo.count(3)
    }

    /// Number of live points.
    #[must_use]
    pub fn nb_points(&self) -> usize {
        self.geom.count(0)
    }

    /// Number of live curves.
    #[must_use]
    pub fn nb_curves(&self) -> usize {
        self.geom.count(1)
    }

    /// Number of live surfaces.
    #[must_use]
    pub fn nb_surfaces(&self) -> usize {
        self.geom.count(2)
    }

    /// Number of live volumes.
    #[must_use]
    pub fn nb_volumes(&self) -> usize {
        self.geom.count(3)
    }

    /// Every live entity of a dimension, geometric ones first.
    #[must_use]
    pub fn all_of_dimension(&self, dimension: u8) -> Vec<EntityRef> {
        let mut out: Vec<EntityRef> = self
            .geom
            .all_of_dimension(dimension)
            .into_iter()
            .map(EntityRef::Geom)
            .collect();
        out.extend(self.topo.all_of_dimension(dimension).into_iter().map(EntityRef::Topo));
        out
    }

    /// Boundary closure of an entity within its own layer.
    #[must_use]
    pub fn closure(&self, entity: EntityRef) -> Vec<EntityRef> {
        match entity {
            EntityRef::Topo(t) => self.topo.closure(t).into_iter().map(EntityRef::Topo).collect(),
            EntityRef::Geom(g) => self.geom.closure(g).into_iter().map(EntityRef::Geom).collect(),
        }
    }

    // --- Group views ---

    /// Names of the groups an entity belongs to explicitly, or its
    /// default group when it has none.
    #[must_use]
    pub fn groups_of(&self, entity: EntityRef) -> Vec<String> {
        let names = self.groups.groups_of(entity);
        if names.is_empty() {
            vec![GroupRegistry::default_name(entity.dimension())]
        } else {
            names
        }
    }

    /// Names of the groups whose members contain `entity` in their
    /// closure, without the explicit ones.
    #[must_use]
    pub fn implicit_groups_of(&self, entity: EntityRef) -> Vec<String> {
        let explicit = self.groups.groups_of(entity);
        let mut out: BTreeSet<String> = BTreeSet::new();
        for (_, group) in self.groups.iter() {
            if group.dimension <= entity.dimension() || explicit.contains(&group.name) {
                continue;
            }
            if group
                .members
                .iter()
                .any(|m| self.closure(*m).contains(&entity))
            {
                out.insert(group.name.clone());
            }
        }
        out.into_iter().collect()
    }

    /// Members of a group. A default group holds every entity of its
    /// dimension that belongs to no explicit group.
    ///
    /// # Errors
    ///
    /// Returns an error if no such group exists.
    pub fn group_members(&self, dimension: u8, name: &str) -> Result<Vec<EntityRef>> {
        if name == GroupRegistry::default_name(dimension) {
            return Ok(self
                .all_of_dimension(dimension)
                .into_iter()
                .filter(|e| self.groups.groups_of(*e).is_empty())
                .collect());
        }
        let id = self
            .groups
            .find(name, dimension)
            .ok_or_else(|| ValidationError::EntityNotFound(format!("group {name} ({dimension}D)")))?;
        Ok(self.groups.group(id)?.members.iter().copied().collect())
    }

    /// Entities of dimension `sub_dimension` implied by the members of a
    /// group, e.g. the curves bounding the volumes of a 3D group.
    ///
    /// # Errors
    ///
    /// Returns an error if no such group exists.
    pub fn implicit_members(
        &self,
        dimension: u8,
        name: &str,
        sub_dimension: u8,
    ) -> Result<Vec<EntityRef>> {
        let members = self.group_members(dimension, name)?;
        let mut out: BTreeSet<EntityRef> = BTreeSet::new();
        for m in members {
            if sub_dimension == dimension {
                out.insert(m);
                continue;
            }
            out.extend(
                self.closure(m)
                    .into_iter()
                    .filter(|e| e.dimension() == sub_dimension),
            );
        }
        Ok(out.into_iter().collect())
    }

    // --- Transactions ---

    pub(crate) fn begin(&mut self) {
        self.geom.begin();
        self.topo.begin();
        self.groups.begin();
    }

    pub(crate) fn commit(&mut self) -> ModelDelta {
        ModelDelta {
            geom: self.geom.commit(),
            topo: self.topo.commit(),
            groups: self.groups.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.groups.rollback();
        self.topo.rollback();
        self.geom.rollback();
    }

    /// Replays a delta. Going backward restores the layers in the reverse
    /// of the forward order.
    pub(crate) fn apply(&mut self, delta: &ModelDelta, direction: Direction, rewind_names: bool) {
        match direction {
            Direction::Forward => {
                self.geom.apply(&delta.geom, direction, rewind_names);
                self.topo.apply(&delta.topo, direction, rewind_names);
                self.groups.apply(&delta.groups, direction, rewind_names);
            }
            Direction::Backward => {
                self.groups.apply(&delta.groups, direction, rewind_names);
                self.topo.apply(&delta.topo, direction, rewind_names);
                self.geom.apply(&delta.geom, direction, rewind_names);
            }
        }
    }
}
