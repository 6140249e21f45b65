use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, IntegrityError, Result, ValidationError};
use crate::math::Point3;
use crate::meshing::check_structures;
use crate::model::{EntityRef, Model};
use crate::topology::{EdgeId, FaceId, TopoRef, VertexId};

use super::rewire::{merge_vertex, replace_edge_in_faces, replace_face_in_blocks};

fn distinct(model: &Model, kept: TopoRef, removed: TopoRef) -> Result<()> {
    model.topo.check(kept)?;
    model.topo.check(removed)?;
    if kept == removed {
        return Err(ValidationError::InvalidInput(format!(
            "cannot fuse {} with itself",
            model.topo.name(kept)
        ))
        .into());
    }
    Ok(())
}

/// Fuses `removed` into `kept`. Both edges must carry the same number of
/// mesh edges; their ends are paired by proximity.
pub(crate) fn fuse_edges(model: &mut Model, kept: EdgeId, removed: EdgeId) -> Result<()> {
    let topo = &model.topo;
    let k = topo.edge(kept)?.clone();
    let r = topo.edge(removed)?.clone();
    if k.nb_edges() != r.nb_edges() {
        return Err(FeasibilityError::DiscretizationMismatch {
            first: topo.name(TopoRef::Edge(kept)),
            first_count: k.nb_edges(),
            second: topo.name(TopoRef::Edge(removed)),
            second_count: r.nb_edges(),
        }
        .into());
    }
    let [k0, k1] = k.vertices.map(|v| topo.position(v));
    let [r0, r1] = r.vertices.map(|v| topo.position(v));
    let (k0, k1, r0, r1) = (k0?, k1?, r0?, r1?);
    let direct = (k0 - r0).norm() + (k1 - r1).norm();
    let crossed = (k0 - r1).norm() + (k1 - r0).norm();
    let pairs = if direct <= crossed {
        [(k.vertices[0], r.vertices[0]), (k.vertices[1], r.vertices[1])]
    } else {
        [(k.vertices[0], r.vertices[1]), (k.vertices[1], r.vertices[0])]
    };
    for (kv, rv) in pairs {
        if kv != rv && k.has_vertex(rv) {
            return Err(FeasibilityError::Unsupported(format!(
                "fusing {} into {} would collapse {}",
                topo.name(TopoRef::Edge(removed)),
                topo.name(TopoRef::Edge(kept)),
                topo.name(TopoRef::Edge(kept))
            ))
            .into());
        }
    }
    for (kv, rv) in pairs {
        if kv != rv {
            merge_vertex(model, kv, rv)?;
        }
    }

    replace_edge_in_faces(&mut model.topo, removed, kept)?;
    let kept_data = model.topo.edge_mut(kept)?;
    if kept_data.association.is_none() {
        kept_data.association = r.association;
    }
    model
        .groups
        .replace(EntityRef::Topo(TopoRef::Edge(removed)), EntityRef::Topo(TopoRef::Edge(kept)));
    model.topo.remove(TopoRef::Edge(removed));
    Ok(())
}

/// Fuses face `removed` into `kept`. Corners are paired by position
/// within `tolerance`, then the sides edge by edge.
pub(crate) fn fuse_faces(model: &mut Model, tolerance: f64, kept: FaceId, removed: FaceId) -> Result<()> {
    let topo = &model.topo;
    let k = topo.face(kept)?.clone();
    let r = topo.face(removed)?.clone();
    let mut pairs: Vec<(VertexId, VertexId)> = Vec::new();
    for &rv in &r.corners {
        let p = topo.position(rv)?;
        let mut best: Option<(VertexId, f64)> = None;
        for &kv in &k.corners {
            let d = (topo.position(kv)? - p).norm();
            match best {
                Some((_, b)) if b <= d => {}
                _ => best = Some((kv, d)),
            }
        }
        match best {
            Some((kv, d)) if d <= tolerance => {
                if !pairs.contains(&(kv, rv)) {
                    pairs.push((kv, rv));
                }
            }
            _ => {
                return Err(FeasibilityError::Unsupported(format!(
                    "{} has no corner of {} at {}",
                    topo.name(TopoRef::Face(kept)),
                    topo.name(TopoRef::Face(removed)),
                    topo.name(TopoRef::Vertex(rv))
                ))
                .into())
            }
        }
    }
    for (kv, rv) in pairs {
        if kv != rv {
            merge_vertex(model, kv, rv)?;
        }
    }

    // corners are shared now, match the sides
    let k = model.topo.face(kept)?.clone();
    let r = model.topo.face(removed)?.clone();
    for s in 0..4 {
        let (a, b) = (r.corners[s], r.corners[(s + 1) % 4]);
        if r.sides[s].is_empty() {
            continue;
        }
        let Some(t) = (0..4).find(|&t| {
            !k.sides[t].is_empty()
                && ((k.corners[t], k.corners[(t + 1) % 4]) == (a, b)
                    || (k.corners[t], k.corners[(t + 1) % 4]) == (b, a))
        }) else {
            return Err(IntegrityError::Inconsistent(format!(
                "side {s} of {} has no counterpart on {}",
                model.topo.name(TopoRef::Face(removed)),
                model.topo.name(TopoRef::Face(kept))
            ))
            .into());
        };
        let removed_chain = r.sides[s].clone();
        let kept_chain: Vec<EdgeId> = if k.corners[t] == a {
            k.sides[t].clone()
        } else {
            k.sides[t].iter().rev().copied().collect()
        };
        if removed_chain.len() != kept_chain.len() {
            let topo = &model.topo;
            return Err(FeasibilityError::Unsupported(format!(
                "side {s} of {} has {} edges, side {t} of {} has {}",
                topo.name(TopoRef::Face(removed)),
                removed_chain.len(),
                topo.name(TopoRef::Face(kept)),
                kept_chain.len()
            ))
            .into());
        }
        for (ke, re) in kept_chain.into_iter().zip(removed_chain) {
            if ke != re {
                fuse_edges(model, ke, re)?;
            }
        }
    }

    replace_face_in_blocks(&mut model.topo, removed, &[kept])?;
    let kept_data = model.topo.face_mut(kept)?;
    if kept_data.association.is_none() {
        kept_data.association = r.association;
    }
    model
        .groups
        .replace(EntityRef::Topo(TopoRef::Face(removed)), EntityRef::Topo(TopoRef::Face(kept)));
    model.topo.remove(TopoRef::Face(removed));
    Ok(())
}

/// Merges vertex `removed` into `kept`, which keeps its position.
pub struct FuseVertices {
    kept: VertexId,
    removed: VertexId,
}

impl FuseVertices {
    /// Creates a new `FuseVertices` command.
    #[must_use]
    pub fn new(kept: VertexId, removed: VertexId) -> Self {
        Self { kept, removed }
    }
}

impl Command for FuseVertices {
    type Output = ();

    fn description(&self) -> String {
        "fuse vertices".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        distinct(ctx.model, TopoRef::Vertex(self.kept), TopoRef::Vertex(self.removed))?;
        let topo = &ctx.model.topo;
        if let Some(e) = topo.edges_between(self.kept, self.removed).first() {
            return Err(FeasibilityError::Unsupported(format!(
                "{} and {} are joined by {}, snap them instead",
                topo.name(TopoRef::Vertex(self.kept)),
                topo.name(TopoRef::Vertex(self.removed)),
                topo.name(TopoRef::Edge(*e))
            ))
            .into());
        }
        merge_vertex(ctx.model, self.kept, self.removed)
    }
}

/// Merges edge `removed` into `kept`. Both must have the same number of
/// mesh edges.
pub struct FuseEdges {
    kept: EdgeId,
    removed: EdgeId,
}

impl FuseEdges {
    /// Creates a new `FuseEdges` command.
    #[must_use]
    pub fn new(kept: EdgeId, removed: EdgeId) -> Self {
        Self { kept, removed }
    }
}

impl Command for FuseEdges {
    type Output = ();

    fn description(&self) -> String {
        "fuse edges".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        distinct(ctx.model, TopoRef::Edge(self.kept), TopoRef::Edge(self.removed))?;
        fuse_edges(ctx.model, self.kept, self.removed)
    }
}

/// Merges face `removed` into `kept`, gluing the blocks on both sides.
pub struct FuseFaces {
    kept: FaceId,
    removed: FaceId,
}

impl FuseFaces {
    /// Creates a new `FuseFaces` command.
    #[must_use]
    pub fn new(kept: FaceId, removed: FaceId) -> Self {
        Self { kept, removed }
    }
}

impl Command for FuseFaces {
    type Output = ();

    fn description(&self) -> String {
        "fuse faces".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        distinct(ctx.model, TopoRef::Face(self.kept), TopoRef::Face(self.removed))?;
        fuse_faces(ctx.model, ctx.config.tolerance, self.kept, self.removed)?;
        debug!(face = %ctx.model.topo.name(TopoRef::Face(self.kept)), "faces fused");
        Ok(())
    }
}

/// Where a snapped vertex ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapPosition {
    Kept,
    Removed,
    Middle,
}

/// Merges vertex `removed` into `kept`. A single edge joining them
/// collapses and leaves the faces using it with a degenerate side.
pub struct SnapVertices {
    kept: VertexId,
    removed: VertexId,
    position: SnapPosition,
}

impl SnapVertices {
    /// Creates a new `SnapVertices` command.
    #[must_use]
    pub fn new(kept: VertexId, removed: VertexId, position: SnapPosition) -> Self {
        Self {
            kept,
            removed,
            position,
        }
    }
}

impl Command for SnapVertices {
    type Output = ();

    fn description(&self) -> String {
        format!("snap vertices ({:?})", self.position)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        distinct(ctx.model, TopoRef::Vertex(self.kept), TopoRef::Vertex(self.removed))?;
        let topo = &ctx.model.topo;
        let common = topo.edges_between(self.kept, self.removed);
        if common.len() > 1 {
            return Err(FeasibilityError::AmbiguousSnap {
                kept: topo.name(TopoRef::Vertex(self.kept)),
                removed: topo.name(TopoRef::Vertex(self.removed)),
                common: common.len(),
            }
            .into());
        }
        let (pk, pr) = (topo.position(self.kept)?, topo.position(self.removed)?);
        let target = match self.position {
            SnapPosition::Kept => pk,
            SnapPosition::Removed => pr,
            SnapPosition::Middle => Point3::from((pk.coords + pr.coords) * 0.5),
        };

        let topo = &mut ctx.model.topo;
        topo.vertex_mut(self.kept)?.point = target;
        let mut touched = Vec::new();
        if let Some(&e) = common.first() {
            touched = topo.faces_using_edge(e);
            for &f in &touched {
                for side in &mut topo.face_mut(f)?.sides {
                    side.retain(|x| *x != e);
                }
            }
            ctx.model.groups.forget(EntityRef::Topo(TopoRef::Edge(e)));
            ctx.model.topo.remove(TopoRef::Edge(e));
        }
        merge_vertex(ctx.model, self.kept, self.removed)?;
        // a chain that lost one of several edges no longer matches its
        // opposite side
        let mut survivors = Vec::new();
        for f in touched {
            survivors.extend(ctx.model.topo.face(f)?.sides.iter().flatten().copied());
        }
        check_structures(&ctx.model.topo, &survivors)?;
        debug!(vertex = %ctx.model.topo.name(TopoRef::Vertex(self.kept)), "vertices snapped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Vector3;
    use crate::meshing::{MeshingLaw, SetParallelMeshingProperty};
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
    use crate::operations::modification::SplitEdge;
    use crate::operations::{Transform, Transformation};

    fn unit_face(session: &mut Session) -> FaceId {
        match session.execute(&NewFreeTopo::new(2, None)).unwrap() {
            TopoRef::Face(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn shift(session: &mut Session, target: TopoRef, v: Vector3) {
        session
            .execute(&Transform::new(vec![EntityRef::Topo(target)], Transformation::Translate(v)))
            .unwrap();
    }

    #[test]
    fn fused_edges_share_their_vertices() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        shift(&mut session, TopoRef::Face(g), Vector3::new(1.0, 0.0, 0.0));
        let kept = session.model().topo().face(f).unwrap().sides[1][0];
        let removed = session.model().topo().face(g).unwrap().sides[3][0];
        session.execute(&FuseEdges::new(kept, removed)).unwrap();
        let model = session.model();
        assert_eq!(model.nb_edges(), 7);
        assert_eq!(model.nb_vertices(), 6);
        assert_eq!(model.topo().face(g).unwrap().sides[3], vec![kept]);
        model.topo().check_face_discretization(g).unwrap();
    }

    #[test]
    fn fusing_edges_with_different_counts_names_both() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        shift(&mut session, TopoRef::Face(g), Vector3::new(1.0, 0.0, 0.0));
        let kept = session.model().topo().face(f).unwrap().sides[1][0];
        let removed = session.model().topo().face(g).unwrap().sides[3][0];
        session
            .execute(&SetParallelMeshingProperty::new(MeshingLaw::uniform(7).unwrap(), removed))
            .unwrap();
        let err = session.execute(&FuseEdges::new(kept, removed)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        let message = err.to_string();
        assert!(message.contains("has 10 mesh edges"));
        assert!(message.contains("has 7"));
        assert_eq!(session.model().nb_edges(), 8);
    }

    #[test]
    fn fused_faces_glue_two_blocks() {
        let mut session = Session::default();
        let a = session
            .execute(&NewBoxWithTopo::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0), [2, 2, 2], None))
            .unwrap();
        let b = session
            .execute(&NewBoxWithTopo::new(
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 1.0),
                [2, 2, 2],
                None,
            ))
            .unwrap();
        let kept = session.model().topo().block(a).unwrap().sides[1][0];
        let removed = session.model().topo().block(b).unwrap().sides[0][0];
        session.execute(&FuseFaces::new(kept, removed)).unwrap();
        let model = session.model();
        assert_eq!(model.nb_faces(), 11);
        assert_eq!(model.nb_edges(), 20);
        assert_eq!(model.nb_vertices(), 12);
        assert_eq!(model.topo().block(b).unwrap().sides[0], vec![kept]);
        model.topo().check_block_discretization(b).unwrap();
        session.undo().unwrap();
        assert_eq!(session.model().nb_faces(), 12);
    }

    #[test]
    fn snapping_collapses_the_common_edge() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let corners = session.model().topo().face(f).unwrap().corners;
        session
            .execute(&SnapVertices::new(corners[1], corners[2], SnapPosition::Middle))
            .unwrap();
        let model = session.model();
        assert_eq!(model.nb_vertices(), 3);
        assert_eq!(model.nb_edges(), 3);
        let face = model.topo().face(f).unwrap();
        assert!(face.is_degenerate(1));
        let p = model.topo().position(corners[1]).unwrap();
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn snapping_part_of_a_side_is_refused() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let bottom = session.model().topo().face(f).unwrap().sides[0][0];
        let mid = session.execute(&SplitEdge::new(bottom, 0.5)).unwrap();
        let second = session.model().topo().face(f).unwrap().sides[0][1];
        let far = session.model().topo().edge(second).unwrap().other(mid).unwrap();
        let err = session
            .execute(&SnapVertices::new(mid, far, SnapPosition::Kept))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        let model = session.model();
        assert_eq!(model.nb_vertices(), 5);
        assert_eq!(model.topo().face(f).unwrap().sides[0].len(), 2);
        model.topo().check_face_discretization(f).unwrap();
    }

    #[test]
    fn snapping_across_two_edges_is_ambiguous() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        shift(&mut session, TopoRef::Face(g), Vector3::new(1.0, 0.0, 0.0));
        let kept = session.model().topo().face(f).unwrap().sides[1][0];
        let removed = session.model().topo().face(g).unwrap().sides[3][0];
        session.execute(&FuseEdges::new(kept, removed)).unwrap();
        // a second edge between the ends of the fused one
        let h = unit_face(&mut session);
        shift(&mut session, TopoRef::Face(h), Vector3::new(1.0, 0.0, 0.0));
        let other = session.model().topo().face(h).unwrap().sides[3][0];
        let topo = session.model().topo();
        let [a, b] = topo.edge(kept).unwrap().vertices;
        let [c, d] = topo.edge(other).unwrap().vertices;
        let gap = (topo.position(c).unwrap() - topo.position(a).unwrap()).norm();
        let (ca, db) = if gap < 1e-9 { (c, d) } else { (d, c) };
        session.execute(&FuseVertices::new(a, ca)).unwrap();
        session.execute(&FuseVertices::new(b, db)).unwrap();
        let err = session
            .execute(&SnapVertices::new(a, b, SnapPosition::Kept))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert!(err.to_string().contains("2 common edges"));
    }

    #[test]
    fn joined_vertices_cannot_be_fused() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let corners = session.model().topo().face(f).unwrap().corners;
        let err = session
            .execute(&FuseVertices::new(corners[0], corners[1]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        let err = session
            .execute(&FuseVertices::new(corners[0], corners[0]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
