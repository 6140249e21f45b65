use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace, warn};

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::topology::block::{block_edges, side_corners, sides_of_block_edge};
use crate::topology::{BlockData, BlockId, EdgeId, FaceData, FaceId, TopoRef, TopologyStore, VertexId};

use super::rewire::{hand_over, vertex_at_count};
use super::split_edge::{check_ratio, node_index};
use super::split_faces::cut_face;

/// Result of cutting one block in two.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockCut {
    /// The halves, lower one along the cut axis first.
    pub(crate) blocks: [BlockId; 2],
    /// The face between the halves.
    pub(crate) sheet: FaceId,
}

/// For each face reachable from `seed`, the parity of its local sides
/// that run parallel to `seed` (0 for sides 0 and 2, 1 for sides 1 and 3).
fn axis_parity(topo: &TopologyStore, faces: &[FaceId], seed: EdgeId) -> Result<HashMap<FaceId, usize>> {
    let mut parity: HashMap<FaceId, usize> = HashMap::new();
    let mut queue: VecDeque<FaceId> = VecDeque::new();
    for &f in faces {
        if let Some(s) = topo.face(f)?.side_of(seed) {
            parity.insert(f, s % 2);
            queue.push_back(f);
        }
    }
    while let Some(f) = queue.pop_front() {
        let data = topo.face(f)?;
        let p = parity[&f];
        for (s, chain) in data.sides.iter().enumerate() {
            let along = s % 2 == p;
            for e in chain {
                for &g in faces {
                    if parity.contains_key(&g) {
                        continue;
                    }
                    if let Some(t) = topo.face(g)?.side_of(*e) {
                        parity.insert(g, if along { t % 2 } else { 1 - t % 2 });
                        queue.push_back(g);
                    }
                }
            }
        }
    }
    Ok(parity)
}

/// Traces the sheet across block side `side`, from `from` to `to`,
/// cutting the faces it crosses. `low` and `high` are the block corners
/// bounding the edge chain `from` sits on. Returns the edges of the
/// trace in order.
fn trace_sheet(
    ctx: &mut CommandContext<'_>,
    block: BlockId,
    side: usize,
    (low, high): (usize, usize),
    from: VertexId,
    to: VertexId,
) -> Result<Vec<EdgeId>> {
    let mut trace = Vec::new();
    let mut visited: HashSet<VertexId> = HashSet::from([from]);
    let mut x = from;
    while x != to {
        let topo = &ctx.model.topo;
        let faces = topo.block(block)?.sides[side].clone();
        let Some(&seed) = topo.block_chain(block, low, high)?.first() else {
            return Err(IntegrityError::Inconsistent(format!(
                "degenerate sheet side on {}",
                topo.name(TopoRef::Block(block))
            ))
            .into());
        };
        let parity = axis_parity(topo, &faces, seed)?;

        // a face the sheet crosses at x
        let mut crossing = None;
        'faces: for &f in &faces {
            let Some(&p) = parity.get(&f) else { continue };
            for s in (0..4).filter(|s| s % 2 == p) {
                if topo.side_interior_vertices(f, s)?.contains(&x) {
                    crossing = Some((f, s));
                    break 'faces;
                }
            }
        }
        let step = if let Some((f, s)) = crossing {
            let cut = cut_face(ctx, f, s, x)?;
            (cut.edge, cut.end)
        } else {
            // the sheet already runs along existing edges
            let mut along = None;
            'sides: for &f in &faces {
                let Some(&p) = parity.get(&f) else { continue };
                let data = topo.face(f)?;
                for s in (0..4).filter(|s| s % 2 != p) {
                    let path = topo.side_vertices(f, s)?;
                    for (i, e) in data.sides[s].iter().enumerate() {
                        let next = if path[i] == x {
                            path[i + 1]
                        } else if path[i + 1] == x {
                            path[i]
                        } else {
                            continue;
                        };
                        if !visited.contains(&next) {
                            along = Some((*e, next));
                            break 'sides;
                        }
                    }
                }
            }
            along.ok_or_else(|| {
                IntegrityError::Inconsistent(format!(
                    "sheet of {} cannot be traced on side {side}",
                    ctx.model.topo.name(TopoRef::Block(block))
                ))
            })?
        };
        trace.push(step.0);
        visited.insert(step.1);
        x = step.1;
    }
    Ok(trace)
}

/// Faces of block side `side` reachable from `corner` without crossing
/// the edges of `sheet`.
fn faces_below(
    topo: &TopologyStore,
    faces: &[FaceId],
    corner: VertexId,
    sheet: &HashSet<EdgeId>,
) -> Result<HashSet<FaceId>> {
    let mut below: HashSet<FaceId> = HashSet::new();
    let mut queue: VecDeque<FaceId> = VecDeque::new();
    for &f in faces {
        if topo.face_loop(f)?.contains(&corner) {
            below.insert(f);
            queue.push_back(f);
        }
    }
    while let Some(f) = queue.pop_front() {
        let edges: Vec<EdgeId> = topo.face(f)?.edges().filter(|e| !sheet.contains(e)).collect();
        for &g in faces {
            if below.contains(&g) {
                continue;
            }
            if edges.iter().any(|e| topo.face(g).is_ok_and(|d| d.side_of(*e).is_some())) {
                below.insert(g);
                queue.push_back(g);
            }
        }
    }
    Ok(below)
}

/// Cuts a structured block in two with a sheet normal to `axis`, placed
/// `k` mesh layers above its lower side along that axis.
///
/// The cut runs in three passes: vertices are placed on the four edge
/// chains along the axis, the sheet is traced across the four lateral
/// sides (cutting faces where needed), then the sheet face and both
/// halves are built.
pub(crate) fn cut_block(ctx: &mut CommandContext<'_>, block: BlockId, axis: usize, k: usize) -> Result<BlockCut> {
    let topo = &ctx.model.topo;
    let name = topo.name(TopoRef::Block(block));
    let data = topo.block(block)?.clone();
    if !data.structured {
        return Err(FeasibilityError::NotStructured { entity: name }.into());
    }
    let n = topo.block_counts(block)?[axis];
    if k == 0 || k >= n {
        return Err(FeasibilityError::Unsupported(format!(
            "cannot cut {name} after {k} of its {n} layers"
        ))
        .into());
    }
    let bit = 1 << axis;

    let mut sheet_vertices: HashMap<usize, VertexId> = HashMap::new();
    for c in side_corners(2 * axis) {
        let chain = ctx.model.topo.block_chain(block, c, c | bit)?;
        let v = vertex_at_count(ctx, data.corners[c], &chain, k)?;
        sheet_vertices.insert(c, v);
    }

    let ring = side_corners(2 * axis);
    let mut sheet_sides: [Vec<EdgeId>; 4] = Default::default();
    let mut lateral: Vec<(usize, usize)> = Vec::with_capacity(4);
    for i in 0..4 {
        let (a, b) = (ring[i], ring[(i + 1) % 4]);
        let Some(side) = sides_of_block_edge(a, b).into_iter().find(|s| s / 2 != axis) else {
            continue;
        };
        let (va, vb) = (sheet_vertices[&a], sheet_vertices[&b]);
        if va != vb {
            let chain_corner = if ctx.model.topo.block_chain(block, a, a | bit)?.is_empty() {
                b
            } else {
                a
            };
            let start = sheet_vertices[&chain_corner];
            let end = if chain_corner == a { vb } else { va };
            let mut edges = trace_sheet(ctx, block, side, (chain_corner, chain_corner | bit), start, end)?;
            if chain_corner != a {
                edges.reverse();
            }
            sheet_sides[i] = edges;
        }
        lateral.push((side, a));
    }

    let topo = &mut ctx.model.topo;
    let sheet = topo.add_face(FaceData {
        corners: ring.map(|c| sheet_vertices[&c]),
        sides: sheet_sides.clone(),
        structured: data.structured,
        association: None,
    });
    let sheet_edges: HashSet<EdgeId> = sheet_sides.iter().flatten().copied().collect();

    let current = topo.block(block)?.clone();
    let mut low_sides: [Vec<FaceId>; 6] = Default::default();
    let mut high_sides: [Vec<FaceId>; 6] = Default::default();
    low_sides[2 * axis].clone_from(&current.sides[2 * axis]);
    low_sides[2 * axis + 1] = vec![sheet];
    high_sides[2 * axis] = vec![sheet];
    high_sides[2 * axis + 1].clone_from(&current.sides[2 * axis + 1]);
    for (side, corner) in lateral {
        let faces = &current.sides[side];
        let below = faces_below(topo, faces, data.corners[corner], &sheet_edges)?;
        for &f in faces {
            if below.contains(&f) {
                low_sides[side].push(f);
            } else {
                high_sides[side].push(f);
            }
        }
    }

    let low_corners: [VertexId; 8] = std::array::from_fn(|c| {
        if c & bit == 0 {
            data.corners[c]
        } else {
            sheet_vertices[&(c ^ bit)]
        }
    });
    let high_corners: [VertexId; 8] = std::array::from_fn(|c| {
        if c & bit == 0 {
            sheet_vertices[&c]
        } else {
            data.corners[c]
        }
    });
    let half = |corners, sides| BlockData {
        corners,
        sides,
        structured: data.structured,
        association: data.association,
    };
    let low = topo.add_block(half(low_corners, low_sides));
    let high = topo.add_block(half(high_corners, high_sides));
    hand_over(
        ctx.model,
        TopoRef::Block(block),
        &[TopoRef::Block(low), TopoRef::Block(high)],
    );
    ctx.model.topo.remove(TopoRef::Block(block));
    trace!(block = %name, axis, k, "block cut");
    Ok(BlockCut {
        blocks: [low, high],
        sheet,
    })
}

/// Axis of the block edge chain holding `edge`, and the layer index of
/// the node nearest to `ratio` along `edge`.
fn locate(topo: &TopologyStore, block: BlockId, edge: EdgeId, ratio: f64) -> Result<Option<(usize, usize)>> {
    let data = topo.block(block)?;
    for (c1, c2) in block_edges() {
        let chain = topo.block_chain(block, c1, c2)?;
        let Some(i) = chain.iter().position(|e| *e == edge) else {
            continue;
        };
        let path = topo.walk_chain(data.corners[c1], &chain)?;
        let before = topo.chain_count(&chain[..i])?;
        let edge_data = topo.edge(edge)?;
        let n = edge_data.nb_edges();
        let local = node_index(ratio, n);
        let local = if edge_data.vertices[0] == path[i] {
            local
        } else {
            n - local
        };
        let axis = (c1 ^ c2).trailing_zeros() as usize;
        return Ok(Some((axis, before + local)));
    }
    Ok(None)
}

/// Axis and layer of a sheet vertex lying inside one of the edge chains
/// of `block`.
fn crossing(topo: &TopologyStore, block: BlockId, sheet: &HashSet<VertexId>) -> Result<Option<(usize, usize)>> {
    let data = topo.block(block)?;
    for (c1, c2) in block_edges() {
        let chain = topo.block_chain(block, c1, c2)?;
        let path = topo.walk_chain(data.corners[c1], &chain)?;
        for i in 1..path.len().saturating_sub(1) {
            if sheet.contains(&path[i]) {
                let axis = (c1 ^ c2).trailing_zeros() as usize;
                return Ok(Some((axis, topo.chain_count(&chain[..i])?)));
            }
        }
    }
    Ok(None)
}

fn block_names(topo: &TopologyStore, blocks: &[BlockId]) -> String {
    blocks
        .iter()
        .map(|b| topo.name(TopoRef::Block(*b)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cuts the first block of `blocks` holding `edge`, then carries the
/// sheet into every listed block it crosses. Returns the blocks created.
fn split_blocks(ctx: &mut CommandContext<'_>, blocks: &[BlockId], edge: EdgeId, ratio: f64) -> Result<Vec<BlockId>> {
    check_ratio("ratio", ratio)?;
    let topo = &ctx.model.topo;
    topo.edge(edge)?;
    let mut pending: Vec<BlockId> = Vec::new();
    for &b in blocks {
        if topo.block(b)?.structured && !pending.contains(&b) {
            pending.push(b);
        }
    }
    let mut first = None;
    for &b in &pending {
        if let Some(found) = locate(topo, b, edge, ratio)? {
            first = Some((b, found));
            break;
        }
    }
    let Some((block, (axis, k))) = first else {
        return Err(FeasibilityError::DirectionNotFound {
            direction: topo.name(TopoRef::Edge(edge)),
            target: block_names(topo, blocks),
        }
        .into());
    };

    let mut created = Vec::new();
    let mut sheet_vertices: HashSet<VertexId> = HashSet::new();
    let mut next = Some((block, axis, k));
    while let Some((b, axis, k)) = next.take() {
        pending.retain(|p| *p != b);
        let cut = cut_block(ctx, b, axis, k)?;
        created.extend(cut.blocks);
        sheet_vertices.extend(ctx.model.topo.face_loop(cut.sheet)?);
        for &p in &pending {
            if let Some((axis, k)) = crossing(&ctx.model.topo, p, &sheet_vertices)? {
                next = Some((p, axis, k));
                break;
            }
        }
    }
    if !pending.is_empty() {
        warn!(blocks = %block_names(&ctx.model.topo, &pending), "blocks not reached by the cut");
    }
    debug!(created = created.len(), "blocks split");
    Ok(created)
}

/// Cuts a block in two with a sheet through the point at `ratio` along
/// `edge`, normal to the direction of `edge`.
pub struct SplitBlock {
    block: BlockId,
    edge: EdgeId,
    ratio: f64,
}

impl SplitBlock {
    /// Creates a new `SplitBlock` command.
    #[must_use]
    pub fn new(block: BlockId, edge: EdgeId, ratio: f64) -> Self {
        Self { block, edge, ratio }
    }
}

impl Command for SplitBlock {
    type Output = Vec<BlockId>;

    fn description(&self) -> String {
        format!("split block at {}", self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<BlockId>> {
        split_blocks(ctx, &[self.block], self.edge, self.ratio)
    }
}

/// Cuts a set of blocks with one sheet, started on the block holding
/// `edge` and carried across neighbours through their shared faces.
pub struct SplitBlocks {
    blocks: Vec<BlockId>,
    edge: EdgeId,
    ratio: f64,
}

impl SplitBlocks {
    /// Creates a new `SplitBlocks` command.
    #[must_use]
    pub fn new(blocks: Vec<BlockId>, edge: EdgeId, ratio: f64) -> Self {
        Self { blocks, edge, ratio }
    }
}

impl Command for SplitBlocks {
    type Output = Vec<BlockId>;

    fn description(&self) -> String {
        format!("split {} blocks at {}", self.blocks.len(), self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<BlockId>> {
        split_blocks(ctx, &self.blocks, self.edge, self.ratio)
    }
}

/// [`SplitBlocks`] over every structured block of the model.
pub struct SplitAllBlocks {
    edge: EdgeId,
    ratio: f64,
}

impl SplitAllBlocks {
    /// Creates a new `SplitAllBlocks` command.
    #[must_use]
    pub fn new(edge: EdgeId, ratio: f64) -> Self {
        Self { edge, ratio }
    }
}

impl Command for SplitAllBlocks {
    type Output = Vec<BlockId>;

    fn description(&self) -> String {
        format!("split all blocks at {}", self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<BlockId>> {
        let blocks: Vec<BlockId> = ctx.model.topo.blocks().map(|(k, _)| k).collect();
        split_blocks(ctx, &blocks, self.edge, self.ratio)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Point3;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
    use crate::operations::modification::SplitFace;

    fn cube(session: &mut Session, counts: [usize; 3]) -> BlockId {
        session
            .execute(&NewBoxWithTopo::new(
                Point3::origin(),
                Point3::new(1.0, 1.0, 1.0),
                counts,
                Some("BOX"),
            ))
            .unwrap()
    }

    #[test]
    fn block_is_cut_in_two() {
        let mut session = Session::default();
        let block = cube(&mut session, [10, 6, 4]);
        let edge = session.model().topo().block_chain(block, 0, 4).unwrap()[0];
        let halves = session.execute(&SplitBlock::new(block, edge, 0.25)).unwrap();
        let model = session.model();
        assert_eq!(model.nb_blocks(), 2);
        assert_eq!(model.nb_faces(), 11);
        assert_eq!(model.nb_edges(), 20);
        assert_eq!(model.nb_vertices(), 12);
        assert_eq!(model.topo().block_counts(halves[0]).unwrap(), [10, 6, 1]);
        assert_eq!(model.topo().block_counts(halves[1]).unwrap(), [10, 6, 3]);
        for b in &halves {
            model.topo().check_block_discretization(*b).unwrap();
        }
    }

    #[test]
    fn cut_halves_are_associated_to_the_volume() {
        let mut session = Session::default();
        let block = cube(&mut session, [4, 4, 4]);
        let volume = session.model().topo().association(TopoRef::Block(block));
        let edge = session.model().topo().block_chain(block, 0, 1).unwrap()[0];
        let halves = session.execute(&SplitBlock::new(block, edge, 0.5)).unwrap();
        for b in halves {
            assert_eq!(session.model().topo().association(TopoRef::Block(b)), volume);
        }
        session.undo().unwrap();
        assert_eq!(session.model().nb_blocks(), 1);
        assert_eq!(session.model().nb_faces(), 6);
    }

    #[test]
    fn sheet_follows_an_existing_face_cut() {
        let mut session = Session::default();
        let block = cube(&mut session, [4, 4, 4]);
        let edge = session.model().topo().block_chain(block, 0, 1).unwrap()[0];
        let face = session.model().topo().block(block).unwrap().sides[2][0];
        session.execute(&SplitFace::new(face, edge, 0.5)).unwrap();
        let edge = session.model().topo().block_chain(block, 2, 3).unwrap()[0];
        session.execute(&SplitBlock::new(block, edge, 0.5)).unwrap();
        let model = session.model();
        assert_eq!(model.nb_blocks(), 2);
        assert_eq!(model.nb_faces(), 11);
        for (b, _) in model.topo().blocks() {
            model.topo().check_block_discretization(b).unwrap();
        }
    }

    #[test]
    fn sheet_crosses_stacked_blocks() {
        let mut session = Session::default();
        let block = cube(&mut session, [4, 4, 4]);
        let edge = session.model().topo().block_chain(block, 0, 4).unwrap()[0];
        session.execute(&SplitBlock::new(block, edge, 0.5)).unwrap();
        let (first, _) = session.model().topo().blocks().next().unwrap();
        let edge = session.model().topo().block_chain(first, 0, 1).unwrap()[0];
        let created = session.execute(&SplitAllBlocks::new(edge, 0.5)).unwrap();
        assert_eq!(created.len(), 4);
        let model = session.model();
        assert_eq!(model.nb_blocks(), 4);
        for (b, _) in model.topo().blocks() {
            assert_eq!(model.topo().block_counts(b).unwrap(), [2, 4, 2]);
            model.topo().check_block_discretization(b).unwrap();
        }
    }

    #[test]
    fn foreign_edge_is_rejected() {
        let mut session = Session::default();
        let block = cube(&mut session, [4, 4, 4]);
        session.execute(&NewFreeTopo::new(2, None)).unwrap();
        let edge = session
            .model()
            .topo()
            .edges()
            .map(|(e, _)| e)
            .find(|e| session.model().topo().association(TopoRef::Edge(*e)).is_none())
            .unwrap();
        let err = session.execute(&SplitBlock::new(block, edge, 0.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert!(err.to_string().contains("Bl0000"));
    }
}
