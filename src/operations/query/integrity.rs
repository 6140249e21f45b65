use crate::error::{IntegrityError, Result};
use crate::model::{EntityRef, Model};
use crate::topology::TopoRef;

fn alive(model: &Model, entity: EntityRef, target: EntityRef) -> Result<()> {
    if model.exists(target) {
        Ok(())
    } else {
        Err(IntegrityError::DanglingReference {
            entity: model.name(entity),
            target: model.name(target),
        }
        .into())
    }
}

/// Checks that every forward link of the model points to a live entity,
/// that face sides are connected chains running between their corners,
/// and that groups only hold live entities.
///
/// # Errors
///
/// Returns the first broken link found.
pub fn check_integrity(model: &Model) -> Result<()> {
    let topo = &model.topo;
    let geom = &model.geom;
    for t in (0..=3).flat_map(|d| topo.all_of_dimension(d)) {
        let me = EntityRef::Topo(t);
        for b in topo.boundary(t) {
            alive(model, me, EntityRef::Topo(b))?;
        }
        if let Some(g) = topo.association(t) {
            alive(model, me, EntityRef::Geom(g))?;
        }
        match t {
            TopoRef::Face(f) => {
                let face = topo.face(f)?;
                for v in face.corners {
                    alive(model, me, EntityRef::Topo(TopoRef::Vertex(v)))?;
                }
                for s in 0..4 {
                    let end = face.corners[(s + 1) % 4];
                    let path = topo.walk_chain(face.corners[s], &face.sides[s])?;
                    if path.last() != Some(&end) {
                        return Err(IntegrityError::Inconsistent(format!(
                            "side {s} of {} does not end at {}",
                            topo.name(t),
                            topo.name(TopoRef::Vertex(end))
                        ))
                        .into());
                    }
                }
            }
            TopoRef::Block(b) => {
                for v in topo.block(b)?.corners {
                    alive(model, me, EntityRef::Topo(TopoRef::Vertex(v)))?;
                }
            }
            TopoRef::Vertex(_) | TopoRef::Edge(_) => {}
        }
    }
    for g in (0..=3).flat_map(|d| geom.all_of_dimension(d)) {
        for b in geom.boundary(g) {
            alive(model, EntityRef::Geom(g), EntityRef::Geom(b))?;
        }
    }
    for (_, group) in model.groups.iter() {
        for m in &group.members {
            if !model.exists(*m) {
                return Err(IntegrityError::DanglingReference {
                    entity: format!("group {}", group.name),
                    target: model.name(*m),
                }
                .into());
            }
        }
    }
    Ok(())
}
