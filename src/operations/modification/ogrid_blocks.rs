use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::math::{centroid, polygon_normal, remove_components, Point3, Vector3};
use crate::meshing::MeshingLaw;
use crate::topology::block::{block_edges, side_corners, sides_of_block_edge};
use crate::topology::{
    BlockData, BlockId, EdgeData, EdgeId, FaceData, FaceId, TopoRef, TopologyStore, VertexData, VertexId,
};

use super::ogrid::{check_components, components, inner_position, Contact};
use super::ogrid_faces::parallel_law;
use super::rewire::{hand_over, replace_face_in_blocks, retire_unused};
use super::split_edge::check_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideKind {
    Shared,
    Ring,
    Open,
}

/// Replaces a set of structured blocks by an inner core surrounded by a
/// shell of blocks `nb_layers` cells thick.
///
/// Faces shared between selected blocks get no shell, and neither do
/// the `internal_faces` on the selection boundary: the core reaches
/// them and its corners slide in their plane. `ratio` places each core
/// corner between the center of its block (0) and the original corner
/// (1).
pub struct SplitBlocksWithOgrid {
    blocks: Vec<BlockId>,
    internal_faces: Vec<FaceId>,
    ratio: f64,
    nb_layers: usize,
}

impl SplitBlocksWithOgrid {
    /// Creates a new `SplitBlocksWithOgrid` command.
    #[must_use]
    pub fn new(blocks: Vec<BlockId>, ratio: f64, nb_layers: usize) -> Self {
        Self {
            blocks,
            internal_faces: Vec::new(),
            ratio,
            nb_layers,
        }
    }

    /// Leaves these boundary faces without a shell.
    #[must_use]
    pub fn with_internal_faces(mut self, faces: Vec<FaceId>) -> Self {
        self.internal_faces = faces;
        self
    }

    fn validate(&self, topo: &TopologyStore) -> Result<Vec<BlockId>> {
        let mut blocks = Vec::new();
        for &b in &self.blocks {
            let data = topo.block(b)?;
            let name = topo.name(TopoRef::Block(b));
            if !data.structured {
                return Err(FeasibilityError::NotStructured { entity: name }.into());
            }
            if data.corners.iter().collect::<HashSet<_>>().len() != 8 {
                return Err(FeasibilityError::Unsupported(format!("{name} is degenerate")).into());
            }
            if let Some(s) = data.sides.iter().position(|side| side.len() != 1) {
                return Err(FeasibilityError::Unsupported(format!(
                    "side {s} of {name} is not covered by exactly one face"
                ))
                .into());
            }
            if !blocks.contains(&b) {
                blocks.push(b);
            }
        }
        Ok(blocks)
    }

    fn classify(&self, topo: &TopologyStore, blocks: &[BlockId]) -> Result<BTreeMap<(BlockId, usize), SideKind>> {
        let mut kinds = BTreeMap::new();
        for &b in blocks {
            for (s, side) in topo.block(b)?.sides.iter().enumerate() {
                let f = side[0];
                let kind = if topo
                    .blocks_using_face(f)
                    .iter()
                    .any(|c| *c != b && blocks.contains(c))
                {
                    SideKind::Shared
                } else if self.internal_faces.contains(&f) {
                    SideKind::Open
                } else {
                    SideKind::Ring
                };
                kinds.insert((b, s), kind);
            }
        }
        Ok(kinds)
    }
}

/// Corner-level Euler characteristic of the faces bounding the
/// selection.
#[allow(clippy::cast_possible_wrap)]
fn boundary_euler(
    topo: &TopologyStore,
    kinds: &BTreeMap<(BlockId, usize), SideKind>,
) -> Result<i64> {
    let mut faces: BTreeSet<FaceId> = BTreeSet::new();
    let mut vertices: BTreeSet<VertexId> = BTreeSet::new();
    let mut pairs: BTreeSet<(VertexId, VertexId)> = BTreeSet::new();
    for (&(b, s), kind) in kinds {
        if *kind == SideKind::Shared {
            continue;
        }
        let data = topo.block(b)?;
        faces.insert(data.sides[s][0]);
        let c = side_corners(s).map(|i| data.corners[i]);
        for i in 0..4 {
            let (p, q) = (c[i], c[(i + 1) % 4]);
            vertices.insert(p);
            pairs.insert((p.min(q), p.max(q)));
        }
    }
    Ok(vertices.len() as i64 - pairs.len() as i64 + faces.len() as i64)
}

/// Ordered chain from corner `from` to corner `to` out of a chain stored
/// from the lower corner index to the higher one.
fn oriented(chain: &[EdgeId], from: usize, to: usize) -> Vec<EdgeId> {
    if from < to {
        chain.to_vec()
    } else {
        chain.iter().rev().copied().collect()
    }
}

impl Command for SplitBlocksWithOgrid {
    type Output = Vec<BlockId>;

    fn description(&self) -> String {
        format!("O-grid on {} blocks", self.blocks.len())
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<BlockId>> {
        check_ratio("ratio", self.ratio)?;
        if self.nb_layers == 0 {
            return Err(ValidationError::InvalidInput("an O-grid needs at least one layer".into()).into());
        }
        let topo = &ctx.model.topo;
        let blocks = self.validate(topo)?;
        let kinds = self.classify(topo, &blocks)?;

        let mut links: Vec<(BlockId, BlockId)> = Vec::new();
        for (&(b, s), kind) in &kinds {
            if *kind == SideKind::Shared {
                let f = topo.block(b)?.sides[s][0];
                for c in topo.blocks_using_face(f) {
                    if c != b && blocks.contains(&c) {
                        links.push((b, c));
                    }
                }
            }
        }
        let parts = components(&blocks, &links);
        let mut corners_of: Vec<Vec<VertexId>> = Vec::with_capacity(blocks.len());
        for &b in &blocks {
            corners_of.push(topo.block(b)?.corners.to_vec());
        }
        check_components(
            ctx.model,
            ctx.config.tolerance,
            &blocks.iter().map(|b| TopoRef::Block(*b)).collect::<Vec<_>>(),
            &corners_of,
            &parts,
            Contact {
                euler: boundary_euler(topo, &kinds)?,
                per_part: 2,
            },
        )?;

        // core corner positions
        let mut centers: HashMap<BlockId, Point3> = HashMap::new();
        for &b in &blocks {
            let mut points = Vec::with_capacity(8);
            for v in topo.block(b)?.corners {
                points.push(topo.position(v)?);
            }
            centers.insert(b, centroid(&points).unwrap_or_else(Point3::origin));
        }
        let mut open_normals: Vec<(FaceId, Vector3)> = Vec::new();
        for (&(b, s), kind) in &kinds {
            if *kind == SideKind::Open {
                let f = topo.block(b)?.sides[s][0];
                let normal = polygon_normal(&topo.face_polygon(f)?).ok_or_else(|| {
                    FeasibilityError::Unsupported(format!("{} has no area", topo.name(TopoRef::Face(f))))
                })?;
                open_normals.push((f, normal));
            }
        }
        let mut moved: BTreeMap<VertexId, Point3> = BTreeMap::new();
        for (&(b, s), kind) in &kinds {
            if *kind != SideKind::Ring {
                continue;
            }
            let corners = topo.block(b)?.corners;
            for v in side_corners(s).map(|i| corners[i]) {
                if moved.contains_key(&v) {
                    continue;
                }
                let p = topo.position(v)?;
                let around: Vec<Point3> = blocks
                    .iter()
                    .filter(|c| topo.block(**c).is_ok_and(|d| d.corners.contains(&v)))
                    .map(|c| centers[c])
                    .collect();
                let mut fixed: Vec<Vector3> = Vec::new();
                for (f, normal) in &open_normals {
                    if topo.face(*f)?.corners.contains(&v) {
                        fixed.push(*normal);
                    }
                }
                let inner = inner_position(&p, &around, self.ratio);
                moved.insert(v, p + remove_components(&(inner - p), &fixed));
            }
        }

        // build
        let mut image: HashMap<VertexId, VertexId> = HashMap::new();
        let mut radial: HashMap<VertexId, EdgeId> = HashMap::new();
        for (&v, p) in &moved {
            let topo = &mut ctx.model.topo;
            let inner = topo.add_vertex(VertexData::new(*p));
            image.insert(v, inner);
            radial.insert(v, topo.add_edge(EdgeData::new(v, inner, MeshingLaw::uniform(self.nb_layers)?)));
        }
        let img = |v: VertexId| image.get(&v).copied().unwrap_or(v);

        let mut core_edges: HashMap<(VertexId, VertexId), EdgeId> = HashMap::new();
        let mut core_faces: HashMap<Vec<VertexId>, FaceId> = HashMap::new();
        let mut lateral_faces: HashMap<(VertexId, VertexId), FaceId> = HashMap::new();
        let mut pieces: BTreeMap<FaceId, Vec<FaceId>> = BTreeMap::new();
        let mut retired: Vec<TopoRef> = Vec::new();
        let mut created = Vec::new();
        for &b in &blocks {
            let data = ctx.model.topo.block(b)?.clone();
            let corners = data.corners;
            retired.extend(data.faces().map(TopoRef::Face));
            retired.extend(corners.iter().map(|v| TopoRef::Vertex(*v)));

            // original and core chains along the twelve block edges
            let mut outer: HashMap<(usize, usize), Vec<EdgeId>> = HashMap::new();
            let mut core: HashMap<(usize, usize), Vec<EdgeId>> = HashMap::new();
            for (c1, c2) in block_edges() {
                let chain = ctx.model.topo.block_chain(b, c1, c2)?;
                retired.extend(chain.iter().map(|e| TopoRef::Edge(*e)));
                let (p, q) = (corners[c1], corners[c2]);
                let inner = if image.contains_key(&p) || image.contains_key(&q) {
                    let (a, z) = (img(p), img(q));
                    let key = (a.min(z), a.max(z));
                    let edge = match core_edges.get(&key) {
                        Some(e) => *e,
                        None => {
                            let topo = &mut ctx.model.topo;
                            let law = parallel_law(topo, &chain, p)?;
                            let e = topo.add_edge(EdgeData::new(a, z, law));
                            core_edges.insert(key, e);
                            e
                        }
                    };
                    vec![edge]
                } else {
                    chain.clone()
                };
                outer.insert((c1, c2), chain);
                core.insert((c1, c2), inner);
            }
            let chain_between = |chains: &HashMap<(usize, usize), Vec<EdgeId>>, from: usize, to: usize| {
                oriented(&chains[&(from.min(to), from.max(to))], from, to)
            };

            // core faces
            let mut core_side: [FaceId; 6] = [data.sides[0][0]; 6];
            for s in 0..6 {
                let f = data.sides[s][0];
                let sc = side_corners(s);
                if sc.iter().all(|c| !image.contains_key(&corners[*c])) {
                    core_side[s] = f;
                    continue;
                }
                let face_corners = sc.map(|c| img(corners[c]));
                let mut key = face_corners.to_vec();
                key.sort();
                let face = match core_faces.get(&key) {
                    Some(g) => *g,
                    None => {
                        let topo = &mut ctx.model.topo;
                        let association = match kinds[&(b, s)] {
                            SideKind::Ring => None,
                            SideKind::Shared | SideKind::Open => topo.face(f)?.association,
                        };
                        let sides: [Vec<EdgeId>; 4] =
                            std::array::from_fn(|i| chain_between(&core, sc[i], sc[(i + 1) % 4]));
                        let g = topo.add_face(FaceData {
                            corners: face_corners,
                            sides,
                            structured: true,
                            association,
                        });
                        core_faces.insert(key, g);
                        if kinds[&(b, s)] != SideKind::Ring {
                            pieces.entry(f).or_default().push(g);
                        }
                        g
                    }
                };
                core_side[s] = face;
            }

            // lateral faces between shell blocks, one per block edge on a
            // shelled side
            let mut lateral: HashMap<(usize, usize), FaceId> = HashMap::new();
            for (c1, c2) in block_edges() {
                let sides = sides_of_block_edge(c1, c2);
                if sides.iter().all(|s| kinds[&(b, *s)] != SideKind::Ring) {
                    continue;
                }
                let (p, q) = (corners[c1], corners[c2]);
                let key = (p.min(q), p.max(q));
                let face = match lateral_faces.get(&key) {
                    Some(g) => *g,
                    None => {
                        let topo = &mut ctx.model.topo;
                        // the face lies in the plane of the unshelled side, if any
                        let host = sides
                            .iter()
                            .find(|s| kinds[&(b, **s)] != SideKind::Ring)
                            .map(|s| data.sides[*s][0]);
                        let association = match host {
                            Some(h) => topo.face(h)?.association,
                            None => None,
                        };
                        let g = topo.add_face(FaceData {
                            corners: [p, q, img(q), img(p)],
                            sides: [
                                outer[&(c1, c2)].clone(),
                                vec![radial[&q]],
                                chain_between(&core, c2, c1),
                                vec![radial[&p]],
                            ],
                            structured: true,
                            association,
                        });
                        lateral_faces.insert(key, g);
                        if let Some(h) = host {
                            pieces.entry(h).or_default().push(g);
                        }
                        g
                    }
                };
                lateral.insert((c1, c2), face);
            }

            let topo = &mut ctx.model.topo;
            let core_block = topo.add_block(BlockData {
                corners: corners.map(img),
                sides: core_side.map(|f| vec![f]),
                structured: true,
                association: data.association,
            });
            let mut made = vec![core_block];
            for s in 0..6 {
                if kinds[&(b, s)] != SideKind::Ring {
                    continue;
                }
                let (axis, value) = (s / 2, s % 2);
                let ring_corners: [VertexId; 8] = std::array::from_fn(|c| {
                    if (c >> axis) & 1 == value {
                        corners[c]
                    } else {
                        img(corners[c ^ (1 << axis)])
                    }
                });
                let ring_sides: [Vec<FaceId>; 6] = std::array::from_fn(|t| {
                    if t == s {
                        data.sides[s].clone()
                    } else if t / 2 == axis {
                        vec![core_side[s]]
                    } else {
                        // the block edge of side s lying on side t
                        let sc = side_corners(s);
                        let on_t: Vec<usize> = sc
                            .iter()
                            .copied()
                            .filter(|c| (c >> (t / 2)) & 1 == t % 2)
                            .collect();
                        let pair = (on_t[0].min(on_t[1]), on_t[0].max(on_t[1]));
                        lateral.get(&pair).map(|f| vec![*f]).unwrap_or_default()
                    }
                });
                made.push(topo.add_block(BlockData {
                    corners: ring_corners,
                    sides: ring_sides,
                    structured: true,
                    association: data.association,
                }));
            }
            let refs: Vec<TopoRef> = made.iter().map(|m| TopoRef::Block(*m)).collect();
            hand_over(ctx.model, TopoRef::Block(b), &refs);
            ctx.model.topo.remove(TopoRef::Block(b));
            created.extend(made);
        }

        // faces the core and shell replaced, seen from outside the selection
        for (f, replacement) in &pieces {
            replace_face_in_blocks(&mut ctx.model.topo, *f, replacement)?;
            let refs: Vec<TopoRef> = replacement.iter().map(|g| TopoRef::Face(*g)).collect();
            hand_over(ctx.model, TopoRef::Face(*f), &refs);
        }
        let retired = retire_unused(ctx.model, retired);
        debug!(created = created.len(), retired, "block O-grid built");
        Ok(created)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::operations::creation::NewBoxWithTopo;
    use crate::geometry::{GeomRef, VolumeId};
    use crate::operations::modification::{Glue, SplitBlock};
    use crate::operations::query::check_integrity;

    fn cube(session: &mut Session, origin: Point3) -> BlockId {
        session
            .execute(&NewBoxWithTopo::new(
                origin,
                origin + Vector3::new(1.0, 1.0, 1.0),
                [4, 4, 4],
                None,
            ))
            .unwrap()
    }

    #[test]
    fn cube_gets_a_core_and_six_shell_blocks() {
        let mut session = Session::default();
        let b = cube(&mut session, Point3::origin());
        let created = session
            .execute(&SplitBlocksWithOgrid::new(vec![b], 0.5, 3))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 7);
        assert_eq!(model.nb_blocks(), 7);
        assert_eq!(model.nb_faces(), 24);
        assert_eq!(model.nb_edges(), 32);
        assert_eq!(model.nb_vertices(), 16);
        for c in &created {
            model.topo().check_block_discretization(*c).unwrap();
        }
        let core = model.topo().block(created[0]).unwrap();
        let p = model.topo().position(core.corners[0]).unwrap();
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(p.z, 0.25, epsilon = 1e-12);
        assert_eq!(model.topo().block_counts(created[1]).unwrap(), [3, 4, 4]);
    }

    #[test]
    fn glued_cubes_share_their_core_face() {
        let mut session = Session::default();
        let b = cube(&mut session, Point3::origin());
        let edge = session.model().topo().block_chain(b, 0, 4).unwrap()[0];
        let halves = session.execute(&SplitBlock::new(b, edge, 0.5)).unwrap();
        let created = session
            .execute(&SplitBlocksWithOgrid::new(halves, 0.5, 1))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 12);
        assert_eq!(model.nb_faces(), 41);
        assert_eq!(model.nb_edges(), 52);
        assert_eq!(model.nb_vertices(), 24);
        session.undo().unwrap();
        assert_eq!(session.model().nb_blocks(), 2);
        assert_eq!(session.model().nb_faces(), 11);
    }

    #[test]
    fn internal_face_gets_no_shell() {
        let mut session = Session::default();
        let b = cube(&mut session, Point3::origin());
        let bottom = session.model().topo().block(b).unwrap().sides[4][0];
        let surface = session.model().topo().face(bottom).unwrap().association;
        let created = session
            .execute(&SplitBlocksWithOgrid::new(vec![b], 0.5, 1).with_internal_faces(vec![bottom]))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 6);
        assert_eq!(model.nb_faces(), 23);
        let on_bottom = model
            .topo()
            .vertices()
            .filter(|(_, v)| v.point.z.abs() < 1e-12)
            .count();
        assert_eq!(on_bottom, 8);
        let core_bottom = model.topo().block(created[0]).unwrap().sides[4][0];
        assert_eq!(model.topo().face(core_bottom).unwrap().association, surface);
    }

    #[test]
    fn touching_cubes_are_infeasible() {
        let mut session = Session::default();
        let a = cube(&mut session, Point3::origin());
        let b = cube(&mut session, Point3::new(1.0, 0.0, 0.0));
        let err = session
            .execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(session.model().nb_blocks(), 2);
    }

    #[test]
    fn disjoint_cubes_get_independent_ogrids() {
        let mut session = Session::default();
        let a = cube(&mut session, Point3::origin());
        let b = cube(&mut session, Point3::new(3.0, 0.0, 0.0));
        let created = session
            .execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1))
            .unwrap();
        assert_eq!(created.len(), 14);
        assert_eq!(session.model().nb_blocks(), 14);
        check_integrity(session.model()).unwrap();
    }

    #[test]
    fn cubes_sharing_only_an_edge_are_infeasible() {
        let mut session = Session::default();
        let a = cube(&mut session, Point3::origin());
        let b = cube(&mut session, Point3::new(1.0, 1.0, 0.0));
        let volumes: Vec<VolumeId> = [a, b]
            .iter()
            .map(|blk| match session.model().topo().association(TopoRef::Block(*blk)) {
                Some(GeomRef::Volume(v)) => v,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        session.execute(&Glue::new(volumes)).unwrap();
        let faces = session.model().nb_faces();
        let err = session
            .execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert!(err.to_string().contains("touch without being glued"));
        assert_eq!(session.model().nb_blocks(), 2);
        assert_eq!(session.model().nb_faces(), faces);
    }

    #[test]
    fn at_least_one_layer() {
        let mut session = Session::default();
        let b = cube(&mut session, Point3::origin());
        let err = session
            .execute(&SplitBlocksWithOgrid::new(vec![b], 0.5, 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
