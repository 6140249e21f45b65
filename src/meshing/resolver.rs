use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::geometry::{GeomRef, GeometryOracle};
use crate::math::Point3;
use crate::model::Model;
use crate::topology::{BlockId, EdgeId, FaceId, TopoRef, TopologyStore, VertexId};

use super::MeshingLaw;

/// Length of an edge: the length of its curve when associated, the
/// distance between its vertices otherwise.
///
/// # Errors
///
/// Returns an error if the edge is missing or the oracle fails.
pub(crate) fn edge_length(model: &Model, oracle: &dyn GeometryOracle, edge: EdgeId) -> Result<f64> {
    let data = model.topo.edge(edge)?;
    if let Some(curve) = data.association {
        return oracle.curve_length(&model.geom, curve);
    }
    let a = model.topo.position(data.vertices[0])?;
    let b = model.topo.position(data.vertices[1])?;
    Ok((b - a).norm())
}

/// Fills in the counts a law can only know once it sees the edge.
fn resolve_count(
    model: &Model,
    oracle: &dyn GeometryOracle,
    edge: EdgeId,
    law: &MeshingLaw,
) -> Result<MeshingLaw> {
    match law {
        MeshingLaw::SpecificSize { size, .. } => {
            let length = edge_length(model, oracle, edge)?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = (length / size).round().max(1.0) as usize;
            Ok(law.with_nb_edges(n))
        }
        MeshingLaw::Interpolate { reference, .. } => {
            if reference.is_empty() {
                return Err(ValidationError::InvalidInput(
                    "interpolation needs at least one reference edge".into(),
                )
                .into());
            }
            if reference.contains(&edge) {
                return Err(ValidationError::InvalidInput(format!(
                    "{} cannot interpolate itself",
                    model.topo.name(TopoRef::Edge(edge))
                ))
                .into());
            }
            let n = model.topo.chain_count(reference)?;
            Ok(law.with_nb_edges(n))
        }
        other => Ok(other.clone()),
    }
}

/// Checks every structured face and block touching one of `edges`.
///
/// # Errors
///
/// Returns a feasibility error naming the first inconsistent pair of
/// chains.
pub(crate) fn check_structures(topo: &TopologyStore, edges: &[EdgeId]) -> Result<()> {
    let mut faces: BTreeSet<FaceId> = BTreeSet::new();
    for &e in edges {
        faces.extend(topo.faces_using_edge(e));
    }
    let mut blocks: BTreeSet<BlockId> = BTreeSet::new();
    for &f in &faces {
        topo.check_face_discretization(f)?;
        blocks.extend(topo.blocks_using_face(f));
    }
    for b in blocks {
        topo.check_block_discretization(b)?;
    }
    Ok(())
}

/// Normalized node positions of an edge, measured from its first vertex.
///
/// # Errors
///
/// Returns an error if the edge or one of its references is missing.
pub fn edge_distribution(model: &Model, oracle: &dyn GeometryOracle, edge: EdgeId) -> Result<Vec<f64>> {
    let mut visiting = HashSet::new();
    distribution_of(model, oracle, edge, &mut visiting)
}

fn distribution_of(
    model: &Model,
    oracle: &dyn GeometryOracle,
    edge: EdgeId,
    visiting: &mut HashSet<EdgeId>,
) -> Result<Vec<f64>> {
    let data = model.topo.edge(edge)?;
    let MeshingLaw::Interpolate { reference, .. } = &data.meshing else {
        let length = edge_length(model, oracle, edge)?;
        return Ok(data.meshing.distribution(length));
    };
    if !visiting.insert(edge) {
        return Err(ValidationError::InvalidInput(format!(
            "interpolation cycle through {}",
            model.topo.name(TopoRef::Edge(edge))
        ))
        .into());
    }

    // Concatenate the reference distributions, each scaled by its share
    // of the chain length and oriented along the chain.
    let mut lengths = Vec::with_capacity(reference.len());
    for &r in reference {
        lengths.push(edge_length(model, oracle, r)?);
    }
    let total: f64 = lengths.iter().sum();
    let mut start = chain_start(&model.topo, reference)?;
    let mut out = vec![0.0];
    let mut offset = 0.0;
    for (&r, &length) in reference.iter().zip(&lengths) {
        let mut local = distribution_of(model, oracle, r, visiting)?;
        let ref_data = model.topo.edge(r)?;
        if ref_data.vertices[0] != start && ref_data.vertices[1] == start {
            local = local.iter().rev().map(|t| 1.0 - t).collect();
        }
        start = ref_data.other(start).unwrap_or(ref_data.vertices[1]);
        let share = if total > 0.0 { length / total } else { 0.0 };
        out.extend(local.iter().skip(1).map(|t| offset + t * share));
        offset += share;
    }
    visiting.remove(&edge);
    if let Some(last) = out.last_mut() {
        *last = 1.0;
    }
    Ok(out)
}

fn chain_start(topo: &TopologyStore, chain: &[EdgeId]) -> Result<VertexId> {
    let Some(&first) = chain.first() else {
        return Err(ValidationError::InvalidInput("empty reference chain".into()).into());
    };
    let first = topo.edge(first)?;
    if let Some(&second) = chain.get(1) {
        let second = topo.edge(second)?;
        if second.has_vertex(first.vertices[0]) {
            return Ok(first.vertices[1]);
        }
    }
    Ok(first.vertices[0])
}

/// Sets a discretization law on a list of edges.
pub struct SetMeshingProperty {
    law: MeshingLaw,
    edges: Vec<EdgeId>,
}

impl SetMeshingProperty {
    /// Creates a new `SetMeshingProperty` command.
    #[must_use]
    pub fn new(law: MeshingLaw, edges: Vec<EdgeId>) -> Self {
        Self { law, edges }
    }
}

impl Command for SetMeshingProperty {
    type Output = ();

    fn description(&self) -> String {
        format!("set {} law on {} edges", self.law.kind(), self.edges.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        for &e in &self.edges {
            let law = resolve_count(ctx.model, ctx.oracle, e, &self.law)?;
            ctx.model.topo.edge_mut(e)?.meshing = law;
        }
        check_structures(&ctx.model.topo, &self.edges)
    }
}

/// Sets a discretization law on an edge and on every edge parallel to
/// it across structured faces, and therefore across structured blocks.
pub struct SetParallelMeshingProperty {
    law: MeshingLaw,
    edge: EdgeId,
}

impl SetParallelMeshingProperty {
    /// Creates a new `SetParallelMeshingProperty` command.
    #[must_use]
    pub fn new(law: MeshingLaw, edge: EdgeId) -> Self {
        Self { law, edge }
    }
}

/// Whether `edge` runs along side `side` of its face from the side's
/// first corner.
fn runs_forward(topo: &TopologyStore, face: FaceId, side: usize, edge: EdgeId) -> Result<bool> {
    let corner = topo.face(face)?.corners[side];
    Ok(topo.edge(edge)?.vertices[0] == corner)
}

/// Edges parallel to `start`, each with a flag telling whether it runs
/// against the direction of `start`.
///
/// # Errors
///
/// Returns an error when a side on the way is made of several edges,
/// since a single law cannot be carried across it.
pub(crate) fn parallel_edges(topo: &TopologyStore, start: EdgeId) -> Result<Vec<(EdgeId, bool)>> {
    topo.edge(start)?;
    let mut seen: Vec<(EdgeId, bool)> = vec![(start, false)];
    let mut queue = VecDeque::from([(start, false)]);
    while let Some((e, flipped)) = queue.pop_front() {
        for f in topo.faces_using_edge(e) {
            let face = topo.face(f)?;
            if !face.structured {
                continue;
            }
            let Some(side) = face.side_of(e) else {
                continue;
            };
            let opposite = (side + 2) % 4;
            if face.is_degenerate(opposite) {
                continue;
            }
            if face.sides[side].len() != 1 || face.sides[opposite].len() != 1 {
                return Err(FeasibilityError::Unsupported(format!(
                    "cannot carry a law across {}: a side is made of several edges",
                    topo.name(TopoRef::Face(f))
                ))
                .into());
            }
            let other = face.sides[opposite][0];
            if seen.iter().any(|(s, _)| *s == other) {
                continue;
            }
            // Opposite sides of a face run in opposite directions.
            let same = runs_forward(topo, f, side, e)? != runs_forward(topo, f, opposite, other)?;
            let other_flipped = if same { flipped } else { !flipped };
            seen.push((other, other_flipped));
            queue.push_back((other, other_flipped));
        }
    }
    Ok(seen)
}

impl Command for SetParallelMeshingProperty {
    type Output = ();

    fn description(&self) -> String {
        format!("set {} law on an edge and its parallel edges", self.law.kind())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let law = resolve_count(ctx.model, ctx.oracle, self.edge, &self.law)?;
        let edges = parallel_edges(&ctx.model.topo, self.edge)?;
        debug!(count = edges.len(), "parallel edges");
        for &(e, flipped) in &edges {
            ctx.model.topo.edge_mut(e)?.meshing = if flipped { law.reversed() } else { law.clone() };
        }
        let ids: Vec<EdgeId> = edges.into_iter().map(|(e, _)| e).collect();
        check_structures(&ctx.model.topo, &ids)
    }
}

/// Length of a topological edge.
pub struct EdgeLength {
    edge: EdgeId,
}

impl EdgeLength {
    /// Creates a new `EdgeLength` query.
    #[must_use]
    pub fn new(edge: EdgeId) -> Self {
        Self { edge }
    }

    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge is missing or the oracle fails.
    pub fn execute(&self, model: &Model, oracle: &dyn GeometryOracle) -> Result<f64> {
        edge_length(model, oracle, self.edge)
    }
}

/// Length of the polyline through the mesh nodes of an edge, projected
/// onto its associated geometry.
pub struct EdgeProjectedLength {
    edge: EdgeId,
}

impl EdgeProjectedLength {
    /// Creates a new `EdgeProjectedLength` query.
    #[must_use]
    pub fn new(edge: EdgeId) -> Self {
        Self { edge }
    }

    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge is missing or the oracle fails.
    pub fn execute(&self, model: &Model, oracle: &dyn GeometryOracle) -> Result<f64> {
        let nodes = edge_nodes(model, oracle, self.edge)?;
        Ok(nodes.windows(2).map(|w| (w[1] - w[0]).norm()).sum())
    }
}

/// Mesh nodes of an edge, projected onto its curve when associated.
///
/// # Errors
///
/// Returns an error if the edge is missing or the oracle fails.
pub(crate) fn edge_nodes(model: &Model, oracle: &dyn GeometryOracle, edge: EdgeId) -> Result<Vec<Point3>> {
    let data = model.topo.edge(edge)?;
    let a = model.topo.position(data.vertices[0])?;
    let b = model.topo.position(data.vertices[1])?;
    let mut out = Vec::new();
    for t in edge_distribution(model, oracle, edge)? {
        let p = a + (b - a) * t;
        out.push(match data.association {
            Some(curve) => oracle.project(&model.geom, GeomRef::Curve(curve), &p)?,
            None => p,
        });
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};

    fn unit_face(session: &mut Session) -> FaceId {
        match session.execute(&NewFreeTopo::new(2, None)).unwrap() {
            TopoRef::Face(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_edge_count_change_breaks_structure() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let e = session.model().topo().face(f).unwrap().sides[0][0];
        let err = session
            .execute(&SetMeshingProperty::new(MeshingLaw::uniform(4).unwrap(), vec![e]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(session.model().topo().edge(e).unwrap().nb_edges(), 10);
    }

    #[test]
    fn same_count_law_is_accepted() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let e = session.model().topo().face(f).unwrap().sides[0][0];
        let law = MeshingLaw::geometric(10, 1.1, false).unwrap();
        session
            .execute(&SetMeshingProperty::new(law.clone(), vec![e]))
            .unwrap();
        assert_eq!(session.model().topo().edge(e).unwrap().meshing, law);
    }

    #[test]
    fn parallel_law_reaches_the_whole_block_direction() {
        let mut session = Session::default();
        session
            .execute(&NewBoxWithTopo::new(
                crate::math::Point3::origin(),
                crate::math::Point3::new(1.0, 2.0, 3.0),
                [10, 10, 10],
                None,
            ))
            .unwrap();
        let block = session.model().topo().blocks().next().unwrap().0;
        let chain = session.model().topo().block_chain(block, 0, 1).unwrap();
        session
            .execute(&SetParallelMeshingProperty::new(
                MeshingLaw::uniform(4).unwrap(),
                chain[0],
            ))
            .unwrap();
        assert_eq!(session.model().topo().block_counts(block).unwrap(), [4, 10, 10]);
        session.undo().unwrap();
        assert_eq!(session.model().topo().block_counts(block).unwrap(), [10, 10, 10]);
    }

    #[test]
    fn specific_size_resolves_count_from_length() {
        let mut session = Session::default();
        session
            .execute(&NewBoxWithTopo::new(
                crate::math::Point3::origin(),
                crate::math::Point3::new(2.0, 1.0, 1.0),
                [10, 10, 10],
                None,
            ))
            .unwrap();
        let block = session.model().topo().blocks().next().unwrap().0;
        let chain = session.model().topo().block_chain(block, 0, 1).unwrap();
        session
            .execute(&SetParallelMeshingProperty::new(
                MeshingLaw::specific_size(0.25).unwrap(),
                chain[0],
            ))
            .unwrap();
        assert_eq!(session.model().topo().block_counts(block).unwrap()[0], 8);
    }

    #[test]
    fn interpolation_copies_the_reference() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let (bottom, top) = {
            let face = session.model().topo().face(f).unwrap();
            (face.sides[0][0], face.sides[2][0])
        };
        let law = MeshingLaw::geometric(10, 1.2, false).unwrap();
        session
            .execute(&SetParallelMeshingProperty::new(law, bottom))
            .unwrap();
        session
            .execute(&SetMeshingProperty::new(
                MeshingLaw::interpolate(vec![bottom]).unwrap(),
                vec![top],
            ))
            .unwrap();
        let model = session.model();
        let reference = edge_distribution(model, session.oracle(), bottom).unwrap();
        let copied = edge_distribution(model, session.oracle(), top).unwrap();
        assert_eq!(copied.len(), 11);
        for (a, b) in reference.iter().zip(&copied) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn lengths_of_a_straight_edge() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let e = session.model().topo().face(f).unwrap().sides[0][0];
        let model = session.model();
        let oracle = session.oracle();
        assert_relative_eq!(EdgeLength::new(e).execute(model, oracle).unwrap(), 1.0);
        assert_relative_eq!(
            EdgeProjectedLength::new(e).execute(model, oracle).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }
}
