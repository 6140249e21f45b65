use std::collections::HashMap;

use crate::error::{Result, ValidationError};
use crate::geometry::{CurveId, GeometryStore, PointId, VolumeId};
use crate::math::Point3;
use crate::meshing::MeshingLaw;
use crate::topology::block::{block_edges, side_corners};
use crate::topology::{
    BlockData, BlockId, EdgeData, EdgeId, FaceData, FaceId, TopologyStore, VertexData, VertexId,
};

/// Corners of an axis-aligned box, indexed `i + 2j + 4k`.
pub(crate) fn box_corners(min: &Point3, max: &Point3) -> [Point3; 8] {
    std::array::from_fn(|c| {
        Point3::new(
            if c & 1 == 0 { min.x } else { max.x },
            if c & 2 == 0 { min.y } else { max.y },
            if c & 4 == 0 { min.z } else { max.z },
        )
    })
}

/// Key of a block edge in the corner-pair maps.
fn pair(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Builds the geometry of a hexahedron: 8 points, 12 curves, 6 surfaces
/// and the volume.
pub(crate) fn hexahedron_geometry(geom: &mut GeometryStore, corners: &[Point3; 8]) -> VolumeId {
    let points: Vec<PointId> = corners.iter().map(|p| geom.add_point(*p)).collect();
    let mut curves: HashMap<(usize, usize), CurveId> = HashMap::new();
    for (a, b) in block_edges() {
        curves.insert((a, b), geom.add_curve(points[a], points[b]));
    }
    let mut surfaces = Vec::with_capacity(6);
    for side in 0..6 {
        let loop_corners = side_corners(side);
        let boundary: Vec<CurveId> = (0..4)
            .filter_map(|i| curves.get(&pair(loop_corners[i], loop_corners[(i + 1) % 4])).copied())
            .collect();
        surfaces.push(geom.add_surface(boundary));
    }
    geom.add_volume(surfaces)
}

/// Creates an edge with a uniform law.
///
/// # Errors
///
/// Returns an error if `nb_edges` is zero.
pub(crate) fn uniform_edge(topo: &mut TopologyStore, a: VertexId, b: VertexId, nb_edges: usize) -> Result<EdgeId> {
    Ok(topo.add_edge(EdgeData::new(a, b, MeshingLaw::uniform(nb_edges)?)))
}

/// Builds a structured face on 3 or 4 points. With 3 points the last
/// side is degenerate. Sides 0 and 2 get `counts[0]` mesh edges, sides 1
/// and 3 get `counts[1]`.
///
/// # Errors
///
/// Returns an error for another number of points or a zero count.
pub(crate) fn face_from_points(topo: &mut TopologyStore, points: &[Point3], counts: [usize; 2]) -> Result<FaceId> {
    let vertices: Vec<VertexId> = points
        .iter()
        .map(|p| topo.add_vertex(VertexData::new(*p)))
        .collect();
    let corners = match vertices.as_slice() {
        [a, b, c] => [*a, *b, *c, *a],
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => {
            return Err(ValidationError::InvalidInput(format!(
                "a face needs 3 or 4 corners, got {}",
                points.len()
            ))
            .into())
        }
    };
    let mut sides: [Vec<EdgeId>; 4] = Default::default();
    for (s, side) in sides.iter_mut().enumerate() {
        let (a, b) = (corners[s], corners[(s + 1) % 4]);
        if a != b {
            side.push(uniform_edge(topo, a, b, counts[s % 2])?);
        }
    }
    Ok(topo.add_face(FaceData::new(corners, sides)))
}

/// Builds a structured block on 8 corner points indexed `i + 2j + 4k`,
/// with `counts[a]` mesh edges along axis `a`.
///
/// # Errors
///
/// Returns an error if a count is zero.
pub(crate) fn block_from_points(topo: &mut TopologyStore, points: &[Point3; 8], counts: [usize; 3]) -> Result<BlockId> {
    let vertices: [VertexId; 8] = points.map(|p| topo.add_vertex(VertexData::new(p)));
    let mut edges: HashMap<(usize, usize), EdgeId> = HashMap::new();
    for (a, b) in block_edges() {
        let axis = (a ^ b).trailing_zeros() as usize;
        edges.insert((a, b), uniform_edge(topo, vertices[a], vertices[b], counts[axis])?);
    }
    let mut sides: [Vec<FaceId>; 6] = Default::default();
    for (side, faces) in sides.iter_mut().enumerate() {
        let loop_corners = side_corners(side);
        let mut chains: [Vec<EdgeId>; 4] = Default::default();
        for (i, chain) in chains.iter_mut().enumerate() {
            if let Some(e) = edges.get(&pair(loop_corners[i], loop_corners[(i + 1) % 4])) {
                chain.push(*e);
            }
        }
        let corners = loop_corners.map(|c| vertices[c]);
        faces.push(topo.add_face(FaceData::new(corners, chains)));
    }
    Ok(topo.add_block(BlockData::new(vertices, sides)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::GeomRef;

    #[test]
    fn block_is_consistent() {
        let mut topo = TopologyStore::new();
        let corners = box_corners(&Point3::origin(), &Point3::new(1.0, 2.0, 3.0));
        let b = block_from_points(&mut topo, &corners, [2, 3, 4]).unwrap();
        assert_eq!(topo.count(0), 8);
        assert_eq!(topo.count(1), 12);
        assert_eq!(topo.count(2), 6);
        assert_eq!(topo.block_counts(b).unwrap(), [2, 3, 4]);
        topo.check_block_discretization(b).unwrap();
        for (f, _) in topo.faces() {
            assert_eq!(topo.face_loop(f).unwrap().len(), 4);
        }
    }

    #[test]
    fn triangle_has_a_degenerate_side() {
        let mut topo = TopologyStore::new();
        let points = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let f = face_from_points(&mut topo, &points, [4, 4]).unwrap();
        let face = topo.face(f).unwrap();
        assert!(face.is_degenerate(3));
        assert_eq!(topo.count(1), 3);
        assert_eq!(topo.face_loop(f).unwrap().len(), 3);
    }

    #[test]
    fn hexahedron_geometry_counts() {
        let mut geom = GeometryStore::new();
        let corners = box_corners(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0));
        let v = hexahedron_geometry(&mut geom, &corners);
        assert_eq!(geom.count(0), 8);
        assert_eq!(geom.count(1), 12);
        assert_eq!(geom.count(2), 6);
        assert_eq!(geom.closure(GeomRef::Volume(v)).len(), 26);
        for (s, _) in geom.surfaces() {
            assert_eq!(geom.surface_loop(s).unwrap().len(), 4);
        }
    }
}
