use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::math::{centroid, polygon_normal, remove_components, Point3, Vector3};
use crate::meshing::MeshingLaw;
use crate::topology::{EdgeData, EdgeId, FaceData, FaceId, TopoRef, TopologyStore, VertexData, VertexId};

use super::ogrid::{check_components, components, inner_position, Contact};
use super::rewire::{hand_over, retire_unused};
use super::split_edge::check_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideKind {
    /// Shared with another selected face.
    Shared,
    /// On the selection boundary, gets a ring layer.
    Ring,
    /// On the selection boundary, left without a layer.
    Open,
}

/// Law of a new edge running parallel to `chain`, in the direction the
/// chain is walked from `chain_start`.
pub(crate) fn parallel_law(topo: &TopologyStore, chain: &[EdgeId], chain_start: VertexId) -> Result<MeshingLaw> {
    match chain {
        [e] => {
            let data = topo.edge(*e)?;
            Ok(if data.vertices[0] == chain_start {
                data.meshing.clone()
            } else {
                data.meshing.reversed()
            })
        }
        _ => MeshingLaw::uniform(topo.chain_count(chain)?),
    }
}

/// Replaces a set of structured faces by an inner core surrounded by a
/// ring of faces `nb_layers` cells thick.
///
/// Sides shared between selected faces get no ring, and neither do the
/// boundary sides made only of `internal_edges`: the core reaches them
/// and its corners slide along them. `ratio` places each core corner
/// between the center of its face (0) and the original corner (1).
pub struct SplitFacesWithOgrid {
    faces: Vec<FaceId>,
    internal_edges: Vec<EdgeId>,
    ratio: f64,
    nb_layers: usize,
}

impl SplitFacesWithOgrid {
    /// Creates a new `SplitFacesWithOgrid` command.
    #[must_use]
    pub fn new(faces: Vec<FaceId>, ratio: f64, nb_layers: usize) -> Self {
        Self {
            faces,
            internal_edges: Vec::new(),
            ratio,
            nb_layers,
        }
    }

    /// Leaves the boundary sides made of these edges without a ring.
    #[must_use]
    pub fn with_internal_edges(mut self, edges: Vec<EdgeId>) -> Self {
        self.internal_edges = edges;
        self
    }

    fn classify(&self, topo: &TopologyStore, faces: &[FaceId]) -> Result<BTreeMap<(FaceId, usize), SideKind>> {
        let selected: HashSet<FaceId> = faces.iter().copied().collect();
        let mut kinds = BTreeMap::new();
        for &f in faces {
            let data = topo.face(f)?;
            for (s, chain) in data.sides.iter().enumerate() {
                let shared = chain
                    .iter()
                    .filter(|e| topo.faces_using_edge(**e).iter().any(|g| *g != f && selected.contains(g)))
                    .count();
                let kind = if shared == chain.len() {
                    SideKind::Shared
                } else if shared > 0 {
                    return Err(FeasibilityError::Unsupported(format!(
                        "side {s} of {} is only partly shared with the selection",
                        topo.name(TopoRef::Face(f))
                    ))
                    .into());
                } else if chain.iter().all(|e| self.internal_edges.contains(e)) {
                    SideKind::Open
                } else {
                    SideKind::Ring
                };
                kinds.insert((f, s), kind);
            }
        }
        Ok(kinds)
    }
}

impl Command for SplitFacesWithOgrid {
    type Output = Vec<FaceId>;

    fn description(&self) -> String {
        format!("O-grid on {} faces", self.faces.len())
    }

    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<Vec<FaceId>> {
        check_ratio("ratio", self.ratio)?;
        if self.nb_layers == 0 {
            return Err(ValidationError::InvalidInput("an O-grid needs at least one layer".into()).into());
        }
        let topo = &ctx.model.topo;
        let mut faces: Vec<FaceId> = Vec::new();
        for &f in &self.faces {
            let data = topo.face(f)?;
            let name = topo.name(TopoRef::Face(f));
            if !data.structured {
                return Err(FeasibilityError::NotStructured { entity: name }.into());
            }
            if (0..4).any(|s| data.is_degenerate(s)) {
                return Err(FeasibilityError::Unsupported(format!("{name} is degenerate")).into());
            }
            if !topo.blocks_using_face(f).is_empty() {
                return Err(FeasibilityError::Unsupported(format!(
                    "{name} bounds a block, split the blocks with an O-grid instead"
                ))
                .into());
            }
            if !faces.contains(&f) {
                faces.push(f);
            }
        }
        let kinds = self.classify(topo, &faces)?;

        // feasibility: corner-level Euler characteristic of each part
        let links: Vec<(FaceId, FaceId)> = faces
            .iter()
            .flat_map(|f| faces.iter().map(move |g| (*f, *g)))
            .filter(|(f, g)| f < g)
            .filter(|(f, g)| {
                topo.face(*f).is_ok_and(|a| {
                    topo.face(*g)
                        .is_ok_and(|b| a.edges().any(|e| b.side_of(e).is_some()))
                })
            })
            .collect();
        let parts = components(&faces, &links);
        let mut corners_of: Vec<Vec<VertexId>> = Vec::with_capacity(faces.len());
        let mut side_pairs: BTreeSet<(VertexId, VertexId)> = BTreeSet::new();
        for &f in &faces {
            let c = topo.face(f)?.corners;
            for s in 0..4 {
                let (a, b) = (c[s], c[(s + 1) % 4]);
                side_pairs.insert((a.min(b), a.max(b)));
            }
            corners_of.push(c.to_vec());
        }
        let nb_vertices = corners_of.iter().flatten().collect::<BTreeSet<_>>().len();
        let euler = nb_vertices as i64 - side_pairs.len() as i64 + faces.len() as i64;
        check_components(
            ctx.model,
            ctx.config.tolerance,
            &faces.iter().map(|f| TopoRef::Face(*f)).collect::<Vec<_>>(),
            &corners_of,
            &parts,
            Contact { euler, per_part: 1 },
        )?;

        // core corner positions
        let topo = &ctx.model.topo;
        let mut centers: HashMap<FaceId, Point3> = HashMap::new();
        let mut normals: HashMap<FaceId, Vector3> = HashMap::new();
        for &f in &faces {
            let polygon = topo.face_polygon(f)?;
            let name = topo.name(TopoRef::Face(f));
            centers.insert(f, centroid(&polygon).unwrap_or_else(Point3::origin));
            normals.insert(
                f,
                polygon_normal(&polygon)
                    .ok_or_else(|| FeasibilityError::Unsupported(format!("{name} has no area")))?,
            );
        }
        let mut moved: BTreeMap<VertexId, Point3> = BTreeMap::new();
        for (&(f, s), kind) in &kinds {
            if *kind != SideKind::Ring {
                continue;
            }
            let c = topo.face(f)?.corners;
            for v in [c[s], c[(s + 1) % 4]] {
                if moved.contains_key(&v) {
                    continue;
                }
                let p = topo.position(v)?;
                let around: Vec<Point3> = faces
                    .iter()
                    .filter(|g| topo.face(**g).is_ok_and(|d| d.corners.contains(&v)))
                    .map(|g| centers[g])
                    .collect();
                let mut fixed: Vec<Vector3> = Vec::new();
                for (&(g, t), kind) in &kinds {
                    let d = topo.face(g)?;
                    let (a, b) = (d.corners[t], d.corners[(t + 1) % 4]);
                    if *kind == SideKind::Open && (a == v || b == v) {
                        let along = topo.position(b)? - topo.position(a)?;
                        fixed.push(normals[&g].cross(&along));
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
        let mut created = Vec::new();
        let mut retired: Vec<TopoRef> = Vec::new();
        for &f in &faces {
            let data = ctx.model.topo.face(f)?.clone();
            retired.extend(data.edges().map(TopoRef::Edge));
            retired.extend(data.corners.iter().map(|v| TopoRef::Vertex(*v)));
            let mut core_sides: [Vec<EdgeId>; 4] = Default::default();
            for s in 0..4 {
                let (p, q) = (data.corners[s], data.corners[(s + 1) % 4]);
                if !image.contains_key(&p) && !image.contains_key(&q) {
                    core_sides[s].clone_from(&data.sides[s]);
                    continue;
                }
                let (a, b) = (img(p), img(q));
                let key = (a.min(b), a.max(b));
                let edge = match core_edges.get(&key) {
                    Some(e) => *e,
                    None => {
                        let topo = &mut ctx.model.topo;
                        let law = parallel_law(topo, &data.sides[s], p)?;
                        let e = topo.add_edge(EdgeData::new(a, b, law));
                        core_edges.insert(key, e);
                        e
                    }
                };
                core_sides[s] = vec![edge];
            }

            let topo = &mut ctx.model.topo;
            let core = topo.add_face(FaceData {
                corners: data.corners.map(img),
                sides: core_sides.clone(),
                structured: true,
                association: data.association,
            });
            let mut pieces = vec![core];
            for s in 0..4 {
                if kinds.get(&(f, s)) != Some(&SideKind::Ring) {
                    continue;
                }
                let (p, q) = (data.corners[s], data.corners[(s + 1) % 4]);
                pieces.push(topo.add_face(FaceData {
                    corners: [p, q, img(q), img(p)],
                    sides: [
                        data.sides[s].clone(),
                        vec![radial[&q]],
                        core_sides[s].iter().rev().copied().collect(),
                        vec![radial[&p]],
                    ],
                    structured: true,
                    association: data.association,
                }));
            }
            let refs: Vec<TopoRef> = pieces.iter().map(|p| TopoRef::Face(*p)).collect();
            hand_over(ctx.model, TopoRef::Face(f), &refs);
            ctx.model.topo.remove(TopoRef::Face(f));
            created.extend(pieces);
        }
        let retired = retire_unused(ctx.model, retired);
        debug!(created = created.len(), retired, "face O-grid built");
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
    use crate::model::EntityRef;
    use crate::operations::creation::NewFreeTopo;
    use crate::operations::modification::{FuseVertices, SplitFace};
    use crate::operations::{Transform, Transformation};

    fn unit_face(session: &mut Session) -> FaceId {
        match session.execute(&NewFreeTopo::new(2, None)).unwrap() {
            TopoRef::Face(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn square_gets_a_core_and_four_ring_faces() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let created = session
            .execute(&SplitFacesWithOgrid::new(vec![f], 0.5, 3))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 5);
        assert_eq!(model.nb_faces(), 5);
        assert_eq!(model.nb_edges(), 12);
        assert_eq!(model.nb_vertices(), 8);
        for g in &created {
            model.topo().check_face_discretization(*g).unwrap();
        }
        let core = model.topo().face(created[0]).unwrap();
        let p = model.topo().position(core.corners[0]).unwrap();
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.25, epsilon = 1e-12);
        assert_eq!(model.topo().side_count(created[1], 1).unwrap(), 3);
    }

    #[test]
    fn adjacent_squares_share_their_core_side() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let edge = session.model().topo().face(f).unwrap().sides[0][0];
        let halves = session.execute(&SplitFace::new(f, edge, 0.5)).unwrap();
        let created = session
            .execute(&SplitFacesWithOgrid::new(halves, 0.5, 2))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 8);
        assert_eq!(model.nb_faces(), 8);
        assert_eq!(model.nb_edges(), 19);
        let on_cut = model
            .topo()
            .vertices()
            .filter(|(_, v)| (v.point.x - 0.5).abs() < 1e-12)
            .count();
        assert_eq!(on_cut, 4);
        session.undo().unwrap();
        assert_eq!(session.model().nb_faces(), 2);
    }

    #[test]
    fn internal_side_gets_no_ring() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let edge = session.model().topo().face(f).unwrap().sides[0][0];
        let created = session
            .execute(&SplitFacesWithOgrid::new(vec![f], 0.5, 1).with_internal_edges(vec![edge]))
            .unwrap();
        let model = session.model();
        assert_eq!(created.len(), 4);
        assert_eq!(model.nb_edges(), 11);
        let on_bottom = model
            .topo()
            .vertices()
            .filter(|(_, v)| v.point.y.abs() < 1e-12)
            .count();
        assert_eq!(on_bottom, 4);
    }

    #[test]
    fn corner_contact_is_infeasible() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        session
            .execute(&Transform::new(
                vec![EntityRef::Topo(TopoRef::Face(g))],
                Transformation::Translate(Vector3::new(1.0, 1.0, 0.0)),
            ))
            .unwrap();
        let err = session
            .execute(&SplitFacesWithOgrid::new(vec![f, g], 0.5, 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);

        let kept = session.model().topo().face(f).unwrap().corners[2];
        let removed = session.model().topo().face(g).unwrap().corners[0];
        session.execute(&FuseVertices::new(kept, removed)).unwrap();
        let err = session
            .execute(&SplitFacesWithOgrid::new(vec![f, g], 0.5, 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(session.model().nb_faces(), 2);
    }

    #[test]
    fn separate_faces_get_independent_rings() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let g = unit_face(&mut session);
        session
            .execute(&Transform::new(
                vec![EntityRef::Topo(TopoRef::Face(g))],
                Transformation::Translate(Vector3::new(3.0, 0.0, 0.0)),
            ))
            .unwrap();
        let created = session
            .execute(&SplitFacesWithOgrid::new(vec![f, g], 0.5, 1))
            .unwrap();
        assert_eq!(created.len(), 10);
    }
}
