mod structured;
mod triangulate;

use tracing::debug;

use crate::error::{IntegrityError, Result};
use crate::geometry::GeometryOracle;
use crate::math::Point3;
use crate::meshing::edge_nodes;
use crate::model::Model;
use crate::topology::{FaceId, TopoRef};

/// Cells generated on one face.
#[derive(Debug, Clone, Default)]
pub struct FaceMesh {
    /// Node positions.
    pub nodes: Vec<Point3>,
    /// Quadrangles of a structured face, counter-clockwise from corner 0.
    pub quads: Vec<[u32; 4]>,
    /// Triangles of an unstructured face.
    pub triangles: Vec<[u32; 3]>,
}

impl FaceMesh {
    /// Number of cells of any kind.
    #[must_use]
    pub fn nb_cells(&self) -> usize {
        self.quads.len() + self.triangles.len()
    }
}

/// Generates cells on topological entities.
///
/// The model only decides how many mesh edges each topological edge
/// carries and where its nodes go. [`PlanarMesher`] is the built-in
/// implementation.
pub trait MeshOracle: std::fmt::Debug {
    /// Meshes one face, keeping the nodes its edges define on its
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the face is missing or cannot be meshed.
    fn mesh_face(&self, model: &Model, geometry: &dyn GeometryOracle, face: FaceId) -> Result<FaceMesh>;
}

/// Mesher for planar faces: transfinite quadrangles on structured faces,
/// constrained Delaunay triangles on the others.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarMesher;

impl MeshOracle for PlanarMesher {
    fn mesh_face(&self, model: &Model, geometry: &dyn GeometryOracle, face: FaceId) -> Result<FaceMesh> {
        let data = model.topo.face(face)?;
        let mut sides: [Vec<Point3>; 4] = Default::default();
        for (s, nodes) in sides.iter_mut().enumerate() {
            *nodes = side_nodes(model, geometry, face, s)?;
        }
        let mesh = if data.structured {
            model.topo.check_face_discretization(face)?;
            structured::transfinite(&sides)
        } else {
            let mut boundary: Vec<Point3> = Vec::new();
            for nodes in &sides {
                boundary.extend(nodes.iter().take(nodes.len() - 1));
            }
            triangulate::delaunay(&model.topo.name(TopoRef::Face(face)), &boundary)?
        };
        debug!(
            face = %model.topo.name(TopoRef::Face(face)),
            nodes = mesh.nodes.len(),
            cells = mesh.nb_cells(),
            "face meshed"
        );
        Ok(mesh)
    }
}

/// Nodes along side `side` of a face, from its first corner to the next
/// one. A degenerate side yields its single corner.
fn side_nodes(model: &Model, geometry: &dyn GeometryOracle, face: FaceId, side: usize) -> Result<Vec<Point3>> {
    let topo = &model.topo;
    let data = topo.face(face)?;
    let mut current = data.corners[side];
    let mut out = vec![topo.position(current)?];
    for &e in &data.sides[side] {
        let edge = topo.edge(e)?;
        let mut nodes = edge_nodes(model, geometry, e)?;
        if edge.vertices[0] != current {
            nodes.reverse();
        }
        out.extend(nodes.into_iter().skip(1));
        current = edge.other(current).ok_or_else(|| {
            IntegrityError::Inconsistent(format!(
                "side {side} of {} is broken at {}",
                topo.name(TopoRef::Face(face)),
                topo.name(TopoRef::Edge(e))
            ))
        })?;
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::geometry::LinearOracle;
    use crate::meshing::{MeshingMethod, SetFaceMeshingMethod};
    use crate::operations::creation::NewFreeTopo;
    use crate::operations::creation::builder::face_from_points;

    fn square(model: &mut Model, counts: [usize; 2]) -> FaceId {
        face_from_points(
            &mut model.topo,
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            counts,
        )
        .unwrap()
    }

    #[test]
    fn structured_face_gets_a_grid() {
        let mut model = Model::new();
        let f = square(&mut model, [4, 2]);
        let mesh = PlanarMesher.mesh_face(&model, &LinearOracle, f).unwrap();
        assert_eq!(mesh.nodes.len(), 15);
        assert_eq!(mesh.quads.len(), 8);
        assert!(mesh.triangles.is_empty());
        let p = mesh.nodes[5 + 1];
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn unstructured_face_gets_triangles() {
        let mut session = Session::default();
        let TopoRef::Face(f) = session.execute(&NewFreeTopo::new(2, None)).unwrap() else {
            panic!("expected a face");
        };
        session
            .execute(&SetFaceMeshingMethod::new(MeshingMethod::Unstructured, vec![f]))
            .unwrap();
        let mesh = PlanarMesher.mesh_face(session.model(), &LinearOracle, f).unwrap();
        // forty boundary nodes on a convex loop, no interior point
        assert_eq!(mesh.nodes.len(), 40);
        assert_eq!(mesh.triangles.len(), 38);
        assert!(mesh.quads.is_empty());
        for n in &mesh.nodes {
            assert_relative_eq!(n.z, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn triangle_face_collapses_its_last_row() {
        let mut model = Model::new();
        let f = face_from_points(
            &mut model.topo,
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            [2, 2],
        )
        .unwrap();
        let mesh = PlanarMesher.mesh_face(&model, &LinearOracle, f).unwrap();
        assert_eq!(mesh.quads.len(), 4);
        let apex = mesh.nodes[2 * 3];
        assert_relative_eq!(apex.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(apex.y, 0.0, epsilon = 1e-12);
    }
}
