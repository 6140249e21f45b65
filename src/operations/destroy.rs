use std::collections::BTreeSet;

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result};
use crate::model::{EntityRef, Model};

fn users(model: &Model, entity: EntityRef) -> Vec<EntityRef> {
    match entity {
        EntityRef::Topo(t) => model.topo.users(t).into_iter().map(EntityRef::Topo).collect(),
        EntityRef::Geom(g) => model.geom.users(g).into_iter().map(EntityRef::Geom).collect(),
    }
}

/// Destroys entities.
///
/// Without `also_destroy_dependents`, an entity still used by a
/// surviving entity is an error. With it, users are destroyed too and,
/// for topological targets, boundary entities nothing else uses any
/// more.
/// Destroyed entities leave their groups and their associations.
pub struct Destroy {
    targets: Vec<EntityRef>,
    also_destroy_dependents: bool,
}

impl Destroy {
    /// Creates a new `Destroy` command.
    #[must_use]
    pub fn new(targets: Vec<EntityRef>, also_destroy_dependents: bool) -> Self {
        Self {
            targets,
            also_destroy_dependents,
        }
    }

    fn doomed(&self, model: &Model) -> Result<BTreeSet<EntityRef>> {
        let mut doomed: BTreeSet<EntityRef> = self.targets.iter().copied().collect();
        if !self.also_destroy_dependents {
            for &t in &self.targets {
                if let Some(by) = users(model, t).into_iter().find(|u| !doomed.contains(u)) {
                    return Err(FeasibilityError::StillReferenced {
                        entity: model.name(t),
                        by: model.name(by),
                    }
                    .into());
                }
            }
            return Ok(doomed);
        }

        let mut stack: Vec<EntityRef> = self.targets.clone();
        while let Some(e) = stack.pop() {
            for u in users(model, e) {
                if doomed.insert(u) {
                    stack.push(u);
                }
            }
        }

        let candidates: BTreeSet<EntityRef> = self
            .targets
            .iter()
            .filter(|e| matches!(e, EntityRef::Topo(_)))
            .flat_map(|e| model.closure(*e))
            .filter(|e| !doomed.contains(e))
            .collect();
        let mut orphans: Vec<EntityRef> = candidates.into_iter().collect();
        orphans.sort_by_key(|e| std::cmp::Reverse(e.dimension()));
        for e in orphans {
            if users(model, e).iter().all(|u| doomed.contains(u)) {
                doomed.insert(e);
            }
        }
        Ok(doomed)
    }
}

impl Command for Destroy {
    type Output = usize;

    fn description(&self) -> String {
        format!("destroy {} entities", self.targets.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<usize> {
        for &t in &self.targets {
            ctx.model.check(t)?;
        }
        let doomed = self.doomed(ctx.model)?;
        let model = &mut *ctx.model;
        for &e in &doomed {
            model.groups.forget(e);
            match e {
                EntityRef::Topo(t) => model.topo.remove(t),
                EntityRef::Geom(g) => {
                    for dimension in 0..=3 {
                        for t in model.topo.all_of_dimension(dimension) {
                            if model.topo.association(t) == Some(g) {
                                model.topo.set_association(t, None)?;
                            }
                        }
                    }
                    model.geom.remove(g);
                }
            }
        }
        debug!(count = doomed.len(), "destroyed");
        Ok(doomed.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::association::AssociationIndex;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::geometry::GeomRef;
    use crate::math::Point3;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
    use crate::topology::TopoRef;

    #[test]
    fn referenced_face_needs_cascade() {
        let mut session = Session::default();
        let block = session.execute(&NewFreeTopo::new(3, None)).unwrap();
        let face = session.model().topo().all_of_dimension(2)[0];
        let err = session
            .execute(&Destroy::new(vec![EntityRef::Topo(face)], false))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert!(err.to_string().contains("Bl0000"));

        session
            .execute(&Destroy::new(vec![EntityRef::Topo(face)], true))
            .unwrap();
        let model = session.model();
        assert!(!model.exists(EntityRef::Topo(block)));
        // every edge of the face is shared with a surviving face
        assert_eq!(model.nb_faces(), 5);
        assert_eq!(model.nb_edges(), 12);
    }

    #[test]
    fn cascading_block_destroys_its_closure() {
        let mut session = Session::default();
        let block = session.execute(&NewFreeTopo::new(3, Some("B"))).unwrap();
        let n = session
            .execute(&Destroy::new(vec![EntityRef::Topo(block)], true))
            .unwrap();
        assert_eq!(n, 1 + 6 + 12 + 8);
        assert!(session.model().group_members(3, "B").unwrap().is_empty());
        session.undo().unwrap();
        assert_eq!(session.model().nb_vertices(), 8);
        assert_eq!(
            session.model().group_members(3, "B").unwrap(),
            vec![EntityRef::Topo(block)]
        );
    }

    #[test]
    fn destroying_geometry_clears_associations() {
        let mut session = Session::default();
        let block = session
            .execute(&NewBoxWithTopo::new(
                Point3::origin(),
                Point3::new(1.0, 1.0, 1.0),
                [2, 2, 2],
                None,
            ))
            .unwrap();
        let volume = session.model().topo().association(TopoRef::Block(block)).unwrap();
        session
            .execute(&Destroy::new(vec![EntityRef::Geom(volume)], false))
            .unwrap();
        let model = session.model();
        assert_eq!(model.topo().association(TopoRef::Block(block)), None);
        assert_eq!(model.nb_surfaces(), 6);
        let index = AssociationIndex::build(model);
        assert!(index.topology_of(volume).is_empty());
        assert_eq!(index.topology_of(model.geom().all_of_dimension(2)[0]).len(), 1);
        assert!(matches!(volume, GeomRef::Volume(_)));
    }
}
