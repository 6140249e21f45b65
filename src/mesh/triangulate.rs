use std::collections::HashMap;

use spade::{ConstrainedDelaunayTriangulation, Point2 as SpadePoint2, Triangulation};

use crate::error::{OracleError, Result};
use crate::math::{polygon_normal, Point3, Vector3};

use super::FaceMesh;

fn failed(face: &str, message: String) -> OracleError {
    OracleError::Failed {
        operation: "triangulate",
        targets: face.to_string(),
        message,
    }
}

/// Even-odd test of `p` against the closed loop `ring`.
fn encloses(ring: &[SpadePoint2<f64>], p: SpadePoint2<f64>) -> bool {
    let mut inside = false;
    let mut prev = ring[ring.len() - 1];
    for &cur in ring {
        if (cur.y > p.y) != (prev.y > p.y) {
            let x = cur.x + (p.y - cur.y) * (prev.x - cur.x) / (prev.y - cur.y);
            if p.x < x {
                inside = !inside;
            }
        }
        prev = cur;
    }
    inside
}

/// Triangulates a planar boundary loop without adding interior nodes.
///
/// The loop is inserted as constraint edges, so no triangle crosses it and
/// the centroid of a triangle tells on which side the whole triangle lies.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn delaunay(face: &str, boundary: &[Point3]) -> Result<FaceMesh> {
    if boundary.len() < 3 {
        return Err(failed(face, "boundary needs at least 3 nodes".into()).into());
    }
    let normal = polygon_normal(boundary).ok_or_else(|| failed(face, "boundary has no area".into()))?;
    let origin = boundary[0];
    let seed = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u_dir = normal.cross(&seed).normalize();
    let v_dir = normal.cross(&u_dir);
    let mut ring: Vec<SpadePoint2<f64>> = boundary
        .iter()
        .map(|p| {
            let d = p - origin;
            SpadePoint2::new(d.dot(&u_dir), d.dot(&v_dir))
        })
        .collect();
    // a collapsed side repeats its corner
    ring.dedup();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    let mut cdt = ConstrainedDelaunayTriangulation::<SpadePoint2<f64>>::new();
    cdt.add_constraint_edges(ring.iter().copied(), true)
        .map_err(|e| failed(face, format!("boundary insertion: {e}")))?;

    let mut mesh = FaceMesh::default();
    let mut node_of: HashMap<usize, u32> = HashMap::new();
    for cell in cdt.inner_faces().filter(|cell| encloses(&ring, cell.center())) {
        let mut triangle = [0u32; 3];
        for (slot, vh) in triangle.iter_mut().zip(cell.vertices()) {
            *slot = *node_of.entry(vh.fix().index()).or_insert_with(|| {
                let pos = vh.position();
                mesh.nodes.push(origin + u_dir * pos.x + v_dir * pos.y);
                (mesh.nodes.len() - 1) as u32
            });
        }
        mesh.triangles.push(triangle);
    }
    Ok(mesh)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn concave_loop_keeps_its_notch() {
        let boundary = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        let mesh = delaunay("L", &boundary).unwrap();
        assert_eq!(mesh.triangles.len(), 4);
        for t in &mesh.triangles {
            let c = t.iter().fold(Vector3::zeros(), |acc, i| acc + mesh.nodes[*i as usize].coords) / 3.0;
            assert!(!(c.x > 1.0 && c.y > 1.0));
        }
    }

    #[test]
    fn collinear_loop_is_rejected() {
        let boundary = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(delaunay("flat", &boundary).is_err());
    }
}
