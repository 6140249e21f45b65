use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::association::AssociationIndex;
use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::geometry::{CurveId, GeomRef, PointId, SurfaceId, VolumeId};
use crate::model::{EntityRef, Model};
use crate::topology::{FaceId, TopoRef, TopologyStore};

use super::fuse::fuse_faces;

/// Points every geometric and topological reference to `removed` at
/// `kept`, then destroys `removed`.
fn redirect(model: &mut Model, kept: GeomRef, removed: GeomRef) -> Result<()> {
    let geom = &mut model.geom;
    for user in geom.users(removed) {
        match (user, kept, removed) {
            (GeomRef::Curve(c), GeomRef::Point(k), GeomRef::Point(r)) => {
                for end in &mut geom.curve_mut(c)?.ends {
                    if *end == r {
                        *end = k;
                    }
                }
            }
            (GeomRef::Surface(s), GeomRef::Curve(k), GeomRef::Curve(r)) => {
                let curves = &mut geom.surface_mut(s)?.curves;
                for curve in curves.iter_mut().filter(|c| **c == r) {
                    *curve = k;
                }
            }
            (GeomRef::Volume(v), GeomRef::Surface(k), GeomRef::Surface(r)) => {
                let surfaces = &mut geom.volume_mut(v)?.surfaces;
                surfaces.retain(|s| *s != r);
                if !surfaces.contains(&k) {
                    surfaces.push(k);
                }
            }
            _ => {}
        }
    }
    let index = AssociationIndex::build(model);
    for &t in index.topology_of(removed) {
        model.topo.set_association(t, Some(kept))?;
    }
    model.groups.replace(EntityRef::Geom(removed), EntityRef::Geom(kept));
    model.geom.remove(removed);
    Ok(())
}

/// Whether every corner of `g` sits on a corner of `f`.
fn coincide(topo: &TopologyStore, tolerance: f64, f: FaceId, g: FaceId) -> Result<bool> {
    let a = topo.face_polygon(f)?;
    let b = topo.face_polygon(g)?;
    Ok(b.iter().all(|q| a.iter().any(|p| (p - q).norm() <= tolerance))
        && a.iter().all(|p| b.iter().any(|q| (p - q).norm() <= tolerance)))
}

/// Glues volumes along their coincident boundaries.
///
/// Points closer than the tolerance are merged, then curves joining the
/// same points and surfaces bounded by the same curves. Block faces
/// associated to a merged surface are fused pairwise when their corners
/// coincide, so the blocks end up sharing them.
pub struct Glue {
    volumes: Vec<VolumeId>,
}

impl Glue {
    /// Creates a new `Glue` command.
    #[must_use]
    pub fn new(volumes: Vec<VolumeId>) -> Self {
        Self { volumes }
    }
}

impl Command for Glue {
    type Output = ();

    fn description(&self) -> String {
        format!("glue {} volumes", self.volumes.len())
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        if self.volumes.len() < 2 {
            return Err(ValidationError::InvalidInput("glue needs at least two volumes".into()).into());
        }
        for v in &self.volumes {
            ctx.model.geom.check(GeomRef::Volume(*v))?;
        }
        let tolerance = ctx.config.tolerance;
        let closure = |model: &Model| -> BTreeSet<GeomRef> {
            self.volumes
                .iter()
                .flat_map(|v| model.geom.closure(GeomRef::Volume(*v)))
                .collect()
        };

        let points: Vec<PointId> = closure(ctx.model)
            .into_iter()
            .filter_map(|g| match g {
                GeomRef::Point(p) => Some(p),
                _ => None,
            })
            .collect();
        let mut merged_points = 0;
        for (i, &kept) in points.iter().enumerate() {
            if !ctx.model.geom.exists(GeomRef::Point(kept)) {
                continue;
            }
            let at = ctx.model.geom.point(kept)?.point;
            for &removed in &points[i + 1..] {
                let geom = &ctx.model.geom;
                if geom.exists(GeomRef::Point(removed)) && (geom.point(removed)?.point - at).norm() <= tolerance {
                    redirect(ctx.model, GeomRef::Point(kept), GeomRef::Point(removed))?;
                    merged_points += 1;
                }
            }
        }

        let curves: Vec<CurveId> = closure(ctx.model)
            .into_iter()
            .filter_map(|g| match g {
                GeomRef::Curve(c) => Some(c),
                _ => None,
            })
            .collect();
        let mut merged_curves = 0;
        for (i, &kept) in curves.iter().enumerate() {
            if !ctx.model.geom.exists(GeomRef::Curve(kept)) {
                continue;
            }
            let mut ends = ctx.model.geom.curve(kept)?.ends;
            ends.sort();
            for &removed in &curves[i + 1..] {
                let Ok(other) = ctx.model.geom.curve(removed) else {
                    continue;
                };
                let mut other_ends = other.ends;
                other_ends.sort();
                if other_ends == ends {
                    redirect(ctx.model, GeomRef::Curve(kept), GeomRef::Curve(removed))?;
                    merged_curves += 1;
                }
            }
        }

        let surfaces: Vec<SurfaceId> = closure(ctx.model)
            .into_iter()
            .filter_map(|g| match g {
                GeomRef::Surface(s) => Some(s),
                _ => None,
            })
            .collect();
        let mut glued: Vec<SurfaceId> = Vec::new();
        for (i, &kept) in surfaces.iter().enumerate() {
            if !ctx.model.geom.exists(GeomRef::Surface(kept)) {
                continue;
            }
            let bounds: BTreeSet<CurveId> = ctx.model.geom.surface(kept)?.curves.iter().copied().collect();
            for &removed in &surfaces[i + 1..] {
                let Ok(other) = ctx.model.geom.surface(removed) else {
                    continue;
                };
                if other.curves.iter().copied().collect::<BTreeSet<_>>() == bounds {
                    redirect(ctx.model, GeomRef::Surface(kept), GeomRef::Surface(removed))?;
                    glued.push(kept);
                }
            }
        }

        // the blocks on both sides of a glued surface share its faces
        let mut fused = 0;
        for s in glued {
            let index = AssociationIndex::build(ctx.model);
            let faces: Vec<FaceId> = index
                .topology_of(GeomRef::Surface(s))
                .iter()
                .filter_map(|t| match t {
                    TopoRef::Face(f) => Some(*f),
                    _ => None,
                })
                .filter(|f| !ctx.model.topo.blocks_using_face(*f).is_empty())
                .collect();
            for (i, &kept) in faces.iter().enumerate() {
                for &removed in &faces[i + 1..] {
                    let topo = &ctx.model.topo;
                    if topo.exists(TopoRef::Face(kept))
                        && topo.exists(TopoRef::Face(removed))
                        && coincide(topo, tolerance, kept, removed)?
                    {
                        fuse_faces(ctx.model, tolerance, kept, removed)?;
                        fused += 1;
                    }
                }
            }
            let left = faces
                .iter()
                .filter(|f| ctx.model.topo.exists(TopoRef::Face(**f)))
                .count();
            if left > 1 {
                warn!(
                    surface = %ctx.model.geom.name(GeomRef::Surface(s)),
                    faces = left,
                    "faces on a glued surface do not match, left apart"
                );
            }
        }
        debug!(merged_points, merged_curves, fused, "volumes glued");
        Ok(())
    }
}

/// Faces of the blocks of `volume` that bound a single block.
fn outer_faces(model: &Model, volume: VolumeId) -> Result<Vec<FaceId>> {
    let index = AssociationIndex::build(model);
    let mut faces: BTreeSet<FaceId> = BTreeSet::new();
    for t in index.topology_of(GeomRef::Volume(volume)) {
        if let TopoRef::Block(b) = t {
            faces.extend(model.topo.block(*b)?.faces());
        }
    }
    Ok(faces
        .into_iter()
        .filter(|f| model.topo.blocks_using_face(*f).len() == 1)
        .collect())
}

/// Fuses the coincident outer faces of the blocks of two volumes, so the
/// blocks become neighbours. The geometry is left as it is.
///
/// Returns the number of fused face pairs.
pub struct GlueTopologies {
    first: VolumeId,
    second: VolumeId,
}

impl GlueTopologies {
    /// Creates a new `GlueTopologies` command.
    #[must_use]
    pub fn new(first: VolumeId, second: VolumeId) -> Self {
        Self { first, second }
    }
}

impl Command for GlueTopologies {
    type Output = usize;

    fn description(&self) -> String {
        "glue the topologies of two volumes".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<usize> {
        let geom = &ctx.model.geom;
        geom.check(GeomRef::Volume(self.first))?;
        geom.check(GeomRef::Volume(self.second))?;
        let (first, second) = (
            geom.name(GeomRef::Volume(self.first)),
            geom.name(GeomRef::Volume(self.second)),
        );
        if self.first == self.second {
            return Err(ValidationError::InvalidInput(format!("cannot glue the topology of {first} with itself")).into());
        }
        let tolerance = ctx.config.tolerance;
        let kept_faces = outer_faces(ctx.model, self.first)?;
        let removed_faces = outer_faces(ctx.model, self.second)?;
        let mut fused = 0;
        for kept in kept_faces {
            for &removed in &removed_faces {
                let topo = &ctx.model.topo;
                if topo.exists(TopoRef::Face(removed))
                    && topo.exists(TopoRef::Face(kept))
                    && coincide(topo, tolerance, kept, removed)?
                {
                    fuse_faces(ctx.model, tolerance, kept, removed)?;
                    fused += 1;
                    break;
                }
            }
        }
        if fused == 0 {
            return Err(FeasibilityError::Unsupported(format!(
                "the blocks of {first} and {second} have no coincident faces"
            ))
            .into());
        }
        debug!(first = %first, second = %second, fused, "topologies glued");
        Ok(fused)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Point3;
    use crate::operations::creation::NewBoxWithTopo;
    use crate::operations::modification::SplitBlocksWithOgrid;
    use crate::operations::query::check_integrity;
    use crate::topology::BlockId;

    fn boxed(session: &mut Session, x: f64) -> (BlockId, VolumeId) {
        let block = session
            .execute(&NewBoxWithTopo::new(
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 1.0, 1.0, 1.0),
                [2, 2, 2],
                None,
            ))
            .unwrap();
        match session.model().topo().association(TopoRef::Block(block)) {
            Some(GeomRef::Volume(v)) => (block, v),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn touching_boxes_share_a_surface_and_a_face() {
        let mut session = Session::default();
        let (a, va) = boxed(&mut session, 0.0);
        let (b, vb) = boxed(&mut session, 1.0);
        session.execute(&Glue::new(vec![va, vb])).unwrap();
        let model = session.model();
        assert_eq!(model.nb_points(), 12);
        assert_eq!(model.nb_curves(), 20);
        assert_eq!(model.nb_surfaces(), 11);
        assert_eq!(model.nb_faces(), 11);
        assert_eq!(model.nb_vertices(), 12);
        assert_eq!(model.nb_edges(), 20);
        let shared = model.topo().block(a).unwrap().sides[1].clone();
        assert_eq!(model.topo().block(b).unwrap().sides[0], shared);
        for (v, _) in model.topo().vertices() {
            assert!(model.topo().association(TopoRef::Vertex(v)).is_some());
        }

        let created = session
            .execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1))
            .unwrap();
        assert_eq!(created.len(), 12);
        session.undo().unwrap();
        session.undo().unwrap();
        assert_eq!(session.model().nb_surfaces(), 12);
        assert_eq!(session.model().nb_faces(), 12);
    }

    #[test]
    fn distant_boxes_stay_apart() {
        let mut session = Session::default();
        let (_, va) = boxed(&mut session, 0.0);
        let (_, vb) = boxed(&mut session, 3.0);
        session.execute(&Glue::new(vec![va, vb])).unwrap();
        assert_eq!(session.model().nb_points(), 16);
        assert_eq!(session.model().nb_faces(), 12);
    }

    #[test]
    fn topologies_glue_without_touching_the_geometry() {
        let mut session = Session::default();
        let (_, va) = boxed(&mut session, 0.0);
        let (_, vb) = boxed(&mut session, 1.0);
        let fused = session.execute(&GlueTopologies::new(va, vb)).unwrap();
        let model = session.model();
        assert_eq!(fused, 1);
        assert_eq!(model.nb_faces(), 11);
        assert_eq!(model.nb_vertices(), 12);
        assert_eq!(model.nb_edges(), 20);
        assert_eq!(model.nb_surfaces(), 12);
        assert_eq!(model.nb_points(), 16);
        check_integrity(model).unwrap();

        session.undo().unwrap();
        assert_eq!(session.model().nb_faces(), 12);
        assert_eq!(session.model().nb_vertices(), 16);
    }

    #[test]
    fn distant_topologies_cannot_be_glued() {
        let mut session = Session::default();
        let (_, va) = boxed(&mut session, 0.0);
        let (_, vb) = boxed(&mut session, 3.0);
        let err = session.execute(&GlueTopologies::new(va, vb)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert!(session.execute(&GlueTopologies::new(va, va)).is_err());
        assert_eq!(session.model().nb_faces(), 12);
    }

    #[test]
    fn one_volume_is_not_enough() {
        let mut session = Session::default();
        let (_, va) = boxed(&mut session, 0.0);
        assert!(session.execute(&Glue::new(vec![va])).is_err());
    }
}
