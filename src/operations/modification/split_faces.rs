use tracing::{debug, trace, warn};

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::meshing::MeshingLaw;
use crate::topology::{EdgeData, EdgeId, FaceData, FaceId, TopoRef, TopologyStore, VertexId};

use super::rewire::{hand_over, replace_face_in_blocks, subdivide_edge, vertex_at_count};
use super::split_edge::{check_ratio, node_index};

/// Result of cutting one face in two.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FaceCut {
    /// The halves: the one holding the start of the cut side first.
    pub(crate) faces: [FaceId; 2],
    /// The new edge between the halves.
    pub(crate) edge: EdgeId,
    /// Where the cut meets the opposite side.
    pub(crate) end: VertexId,
}

/// Law of a cut running parallel to sides `s + 1` and `s + 3`, from side
/// `s` towards its opposite.
fn cut_law(topo: &TopologyStore, name: &str, face: &FaceData, s: usize) -> Result<MeshingLaw> {
    // side s + 1 runs the same way as the cut, side s + 3 the other way
    for (offset, along) in [(1, true), (3, false)] {
        let side = (s + offset) % 4;
        let chain = &face.sides[side];
        match chain.as_slice() {
            [] => continue,
            [e] => {
                let data = topo.edge(*e)?;
                let same = (data.vertices[0] == face.corners[side]) == along;
                return Ok(if same {
                    data.meshing.clone()
                } else {
                    data.meshing.reversed()
                });
            }
            _ => return MeshingLaw::uniform(topo.chain_count(chain)?),
        }
    }
    Err(FeasibilityError::Unsupported(format!("{name} has no side parallel to the cut")).into())
}

/// Cuts a structured face from `start`, an interior vertex of side
/// `side`, straight across to the opposite side. The end vertex sits at
/// the same mesh-node index as `start`, so both halves stay structured.
/// A degenerate opposite side makes the cut end at its corner.
///
/// # Errors
///
/// Returns an error if the face is not structured, `start` is not inside
/// the side, or the two sides crossed have different counts.
pub(crate) fn cut_face(ctx: &mut CommandContext<'_>, face: FaceId, side: usize, start: VertexId) -> Result<FaceCut> {
    let s = side % 4;
    let o = (s + 2) % 4;
    let topo = &ctx.model.topo;
    let name = topo.name(TopoRef::Face(face));
    let data = topo.face(face)?.clone();
    if !data.structured {
        return Err(FeasibilityError::NotStructured { entity: name }.into());
    }
    let index = match topo.side_vertices(face, s)?.iter().position(|v| *v == start) {
        Some(i) if i > 0 && i < data.sides[s].len() => i,
        _ => {
            return Err(FeasibilityError::DirectionNotFound {
                direction: topo.name(TopoRef::Vertex(start)),
                target: format!("the inside of side {s} of {name}"),
            }
            .into())
        }
    };
    let k = topo.chain_count(&data.sides[s][..index])?;

    let end = if data.is_degenerate(o) {
        data.corners[o]
    } else {
        let n_s = topo.side_count(face, s)?;
        let n_o = topo.side_count(face, o)?;
        if n_s != n_o {
            return Err(FeasibilityError::DiscretizationMismatch {
                first: format!("{name} side {s}"),
                first_count: n_s,
                second: format!("{name} side {o}"),
                second_count: n_o,
            }
            .into());
        }
        vertex_at_count(ctx, data.corners[o], &data.sides[o], n_s - k)?
    };

    // the opposite side may just have been cut
    let topo = &ctx.model.topo;
    let data = topo.face(face)?.clone();
    let end_index = topo
        .side_vertices(face, o)?
        .iter()
        .position(|v| *v == end)
        .ok_or_else(|| IntegrityError::Inconsistent(format!("cut of {name} lost its end")))?;
    let law = cut_law(topo, &name, &data, s)?;

    let at = |i: usize| (s + i) % 4;
    let (before, after) = data.sides[s].split_at(index);
    let (opposite_before, opposite_after) = data.sides[o].split_at(end_index);
    let half = |corners: [VertexId; 4], sides: [Vec<EdgeId>; 4]| FaceData {
        corners,
        sides,
        structured: data.structured,
        association: data.association,
    };

    let topo = &mut ctx.model.topo;
    let cut = topo.add_edge(EdgeData::new(start, end, law));
    let first = topo.add_face(half(
        [data.corners[at(0)], start, end, data.corners[at(3)]],
        [
            before.to_vec(),
            vec![cut],
            opposite_after.to_vec(),
            data.sides[at(3)].clone(),
        ],
    ));
    let second = topo.add_face(half(
        [start, data.corners[at(1)], data.corners[at(2)], end],
        [
            after.to_vec(),
            data.sides[at(1)].clone(),
            opposite_before.to_vec(),
            vec![cut],
        ],
    ));
    replace_face_in_blocks(topo, face, &[first, second])?;
    hand_over(
        ctx.model,
        TopoRef::Face(face),
        &[TopoRef::Face(first), TopoRef::Face(second)],
    );
    ctx.model.topo.remove(TopoRef::Face(face));
    trace!(face = %name, k, "face cut");
    Ok(FaceCut {
        faces: [first, second],
        edge: cut,
        end,
    })
}

/// First pending face having `x` inside one of its sides.
fn face_crossed_at(topo: &TopologyStore, pending: &[FaceId], x: VertexId) -> Result<Option<(FaceId, usize)>> {
    for &f in pending {
        if topo.face(f).is_err() {
            continue;
        }
        for s in 0..4 {
            if topo.side_interior_vertices(f, s)?.contains(&x) {
                return Ok(Some((f, s)));
            }
        }
    }
    Ok(None)
}

fn names(topo: &TopologyStore, faces: &[FaceId]) -> String {
    faces
        .iter()
        .map(|f| topo.name(TopoRef::Face(*f)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cuts `edge` at `ratio` and carries the cut across every face of
/// `faces` it reaches. Returns the faces created.
fn split_faces(ctx: &mut CommandContext<'_>, faces: &[FaceId], edge: EdgeId, ratio: f64) -> Result<Vec<FaceId>> {
    check_ratio("ratio", ratio)?;
    let topo = &ctx.model.topo;
    let n = topo.edge(edge)?.nb_edges();
    if !faces
        .iter()
        .any(|f| topo.face(*f).is_ok_and(|d| d.side_of(edge).is_some()))
    {
        return Err(FeasibilityError::DirectionNotFound {
            direction: topo.name(TopoRef::Edge(edge)),
            target: names(topo, faces),
        }
        .into());
    }
    let mut pending: Vec<FaceId> = Vec::new();
    for &f in faces {
        if topo.face(f)?.structured && !pending.contains(&f) {
            pending.push(f);
        }
    }

    let (start, _) = subdivide_edge(ctx, edge, node_index(ratio, n))?;
    let mut created = Vec::new();
    let mut work = vec![start];
    while let Some(x) = work.pop() {
        while let Some((f, s)) = face_crossed_at(&ctx.model.topo, &pending, x)? {
            pending.retain(|p| *p != f);
            let cut = cut_face(ctx, f, s, x)?;
            created.extend(cut.faces);
            work.push(cut.end);
        }
    }
    pending.retain(|f| ctx.model.topo.face(*f).is_ok());
    if !pending.is_empty() {
        warn!(faces = %names(&ctx.model.topo, &pending), "faces not reached by the cut");
    }
    debug!(created = created.len(), "faces split");
    Ok(created)
}

/// Cuts a face in two through the point at `ratio` along `edge`, which
/// must lie on one of its sides.
pub struct SplitFace {
    face: FaceId,
    edge: EdgeId,
    ratio: f64,
}

impl SplitFace {
    /// Creates a new `SplitFace` command.
    #[must_use]
    pub fn new(face: FaceId, edge: EdgeId, ratio: f64) -> Self {
        Self { face, edge, ratio }
    }
}

impl Command for SplitFace {
    type Output = Vec<FaceId>;

    fn description(&self) -> String {
        format!("split face at {}", self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<FaceId>> {
        split_faces(ctx, &[self.face], self.edge, self.ratio)
    }
}

/// Cuts a set of faces along the direction of `edge`, propagating the
/// cut from face to face through their shared sides.
///
/// Faces the cut never reaches are left alone with a warning.
pub struct SplitFaces {
    faces: Vec<FaceId>,
    edge: EdgeId,
    ratio: f64,
}

impl SplitFaces {
    /// Creates a new `SplitFaces` command.
    #[must_use]
    pub fn new(faces: Vec<FaceId>, edge: EdgeId, ratio: f64) -> Self {
        Self { faces, edge, ratio }
    }
}

impl Command for SplitFaces {
    type Output = Vec<FaceId>;

    fn description(&self) -> String {
        format!("split {} faces at {}", self.faces.len(), self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<FaceId>> {
        split_faces(ctx, &self.faces, self.edge, self.ratio)
    }
}

/// [`SplitFaces`] over every structured face of the model.
pub struct SplitAllFaces {
    edge: EdgeId,
    ratio: f64,
}

impl SplitAllFaces {
    /// Creates a new `SplitAllFaces` command.
    #[must_use]
    pub fn new(edge: EdgeId, ratio: f64) -> Self {
        Self { edge, ratio }
    }
}

impl Command for SplitAllFaces {
    type Output = Vec<FaceId>;

    fn description(&self) -> String {
        format!("split all faces at {}", self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<FaceId>> {
        let faces: Vec<FaceId> = ctx
            .model
            .topo
            .faces()
            .filter(|(_, f)| f.structured)
            .map(|(k, _)| k)
            .collect();
        split_faces(ctx, &faces, self.edge, self.ratio)
    }
}

/// Carries an existing cut across one more face: the face is cut from
/// `vertex`, which already sits inside one of its sides, to the opposite
/// side.
pub struct ExtendSplitFace {
    face: FaceId,
    vertex: VertexId,
}

impl ExtendSplitFace {
    /// Creates a new `ExtendSplitFace` command.
    #[must_use]
    pub fn new(face: FaceId, vertex: VertexId) -> Self {
        Self { face, vertex }
    }
}

impl Command for ExtendSplitFace {
    type Output = Vec<FaceId>;

    fn description(&self) -> String {
        "extend face split".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<FaceId>> {
        let topo = &ctx.model.topo;
        topo.vertex(self.vertex)?;
        let mut side = None;
        for s in 0..4 {
            if topo.side_interior_vertices(self.face, s)?.contains(&self.vertex) {
                side = Some(s);
                break;
            }
        }
        let Some(s) = side else {
            return Err(FeasibilityError::DirectionNotFound {
                direction: topo.name(TopoRef::Vertex(self.vertex)),
                target: topo.name(TopoRef::Face(self.face)),
            }
            .into());
        };
        Ok(cut_face(ctx, self.face, s, self.vertex)?.faces.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Point3;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
    use crate::operations::modification::SplitEdge;

    fn unit_face(session: &mut Session) -> FaceId {
        match session.execute(&NewFreeTopo::new(2, None)).unwrap() {
            TopoRef::Face(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn face_is_cut_in_two_structured_halves() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let edge = session.model().topo().face(f).unwrap().sides[0][0];
        let halves = session.execute(&SplitFace::new(f, edge, 0.3)).unwrap();
        let model = session.model();
        assert_eq!(halves.len(), 2);
        assert_eq!(model.nb_faces(), 2);
        assert_eq!(model.nb_edges(), 7);
        assert_eq!(model.nb_vertices(), 6);
        for h in &halves {
            model.topo().check_face_discretization(*h).unwrap();
        }
        let top: Vec<Point3> = model
            .topo()
            .vertices()
            .map(|(_, v)| v.point)
            .filter(|p| (p.y - 1.0).abs() < 1e-12 && p.x > 1e-12 && p.x < 1.0 - 1e-12)
            .collect();
        assert_eq!(top.len(), 1);
        assert_relative_eq!(top[0].x, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn cut_goes_around_a_block() {
        let mut session = Session::default();
        let block = session
            .execute(&NewBoxWithTopo::new(
                Point3::origin(),
                Point3::new(1.0, 1.0, 1.0),
                [4, 4, 4],
                None,
            ))
            .unwrap();
        let edge = session.model().topo().block_chain(block, 0, 1).unwrap()[0];
        let created = session.execute(&SplitAllFaces::new(edge, 0.5)).unwrap();
        let model = session.model();
        assert_eq!(created.len(), 8);
        assert_eq!(model.nb_faces(), 10);
        assert_eq!(model.nb_edges(), 20);
        assert_eq!(model.topo().block_counts(block).unwrap(), [4, 4, 4]);
        model.topo().check_block_discretization(block).unwrap();
    }

    #[test]
    fn edge_off_the_face_is_rejected() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        let edge = session.model().topo().face(g).unwrap().sides[0][0];
        let err = session.execute(&SplitFace::new(f, edge, 0.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(session.model().nb_edges(), 8);
    }

    #[test]
    fn extending_a_cut_from_an_existing_vertex() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let edge = session.model().topo().face(f).unwrap().sides[0][0];
        let v = session.execute(&SplitEdge::new(edge, 0.5)).unwrap();
        let halves = session.execute(&ExtendSplitFace::new(f, v)).unwrap();
        assert_eq!(halves.len(), 2);
        assert_eq!(session.model().nb_faces(), 2);
    }

    struct Skew {
        edge: EdgeId,
    }

    impl Command for Skew {
        type Output = ();

        fn description(&self) -> String {
            "skew".into()
        }

        fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
            ctx.model.topo.edge_mut(self.edge)?.meshing = MeshingLaw::uniform(7)?;
            Ok(())
        }
    }

    #[test]
    fn extending_across_mismatched_sides_fails() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let sides = session.model().topo().face(f).unwrap().sides.clone();
        session.execute(&Skew { edge: sides[2][0] }).unwrap();
        let v = session.execute(&SplitEdge::new(sides[0][0], 0.5)).unwrap();
        let err = session.execute(&ExtendSplitFace::new(f, v)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        let message = err.to_string();
        assert!(message.contains("10") && message.contains('7'), "{message}");
    }

    #[test]
    fn triangle_cut_ends_at_its_apex() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let apex = session.model().topo().face(f).unwrap().corners[0];
        let other = session.model().topo().face(f).unwrap().corners[3];
        session
            .execute(&crate::operations::modification::SnapVertices::new(
                apex,
                other,
                crate::operations::modification::SnapPosition::Kept,
            ))
            .unwrap();
        let edge = session.model().topo().face(f).unwrap().sides[1][0];
        let halves = session.execute(&SplitFace::new(f, edge, 0.5)).unwrap();
        let model = session.model();
        for h in halves {
            let face = model.topo().face(h).unwrap();
            assert!(face.is_degenerate(2));
            model.topo().check_face_discretization(h).unwrap();
        }
    }
}
