use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::geometry::SurfaceId;
use crate::math::Point3;

use super::edge::EdgeId;
use super::vertex::VertexId;
use super::TopologyStore;

slotmap::new_key_type! {
    /// Unique identifier for a face in the topology store.
    pub struct FaceId;
}

/// Data associated with a topological face.
///
/// A face has four logical corners. Side `i` runs from corner `i` to
/// corner `(i + 1) % 4` and holds the chain of edges along it, in
/// traversal order. A side whose two corners coincide is degenerate and
/// holds no edge, which is how triangular faces are represented.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceData {
    /// Logical corners in loop order.
    pub corners: [VertexId; 4],
    /// Edge chains between consecutive corners.
    pub sides: [Vec<EdgeId>; 4],
    /// Whether the face is meshed as a structured grid.
    pub structured: bool,
    /// Geometric surface the face conforms to.
    pub association: Option<SurfaceId>,
}

impl FaceData {
    /// Creates a structured, unassociated face.
    #[must_use]
    pub fn new(corners: [VertexId; 4], sides: [Vec<EdgeId>; 4]) -> Self {
        Self {
            corners,
            sides,
            structured: true,
            association: None,
        }
    }

    /// All edges of the boundary, side by side.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.sides.iter().flatten().copied()
    }

    /// Side holding `edge`, if any.
    #[must_use]
    pub fn side_of(&self, edge: EdgeId) -> Option<usize> {
        self.sides.iter().position(|side| side.contains(&edge))
    }

    /// Returns `true` if side `i` collapses to a point.
    #[must_use]
    pub fn is_degenerate(&self, side: usize) -> bool {
        self.sides[side % 4].is_empty()
    }
}

impl TopologyStore {
    /// Vertices along side `side` of `face`, from its first corner to its
    /// last.
    ///
    /// # Errors
    ///
    /// Returns an error if the face is missing or the side chain is broken.
    pub fn side_vertices(&self, face: FaceId, side: usize) -> Result<Vec<VertexId>> {
        let data = self.face(face)?;
        let side = side % 4;
        let path = self.walk_chain(data.corners[side], &data.sides[side])?;
        let end = data.corners[(side + 1) % 4];
        if path.last() != Some(&end) {
            return Err(IntegrityError::Inconsistent(format!(
                "side {side} of {} does not end at its corner",
                self.name_face(face)
            ))
            .into());
        }
        Ok(path)
    }

    /// Number of mesh edges along a side of a face.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or one of its edges is missing.
    pub fn side_count(&self, face: FaceId, side: usize) -> Result<usize> {
        let data = self.face(face)?;
        self.chain_count(&data.sides[side % 4])
    }

    /// Boundary vertices of a face in loop order, each listed once.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or one of its edges is missing.
    pub fn face_loop(&self, face: FaceId) -> Result<Vec<VertexId>> {
        let mut out = Vec::new();
        for side in 0..4 {
            let path = self.side_vertices(face, side)?;
            for v in &path[..path.len() - 1] {
                out.push(*v);
            }
        }
        out.dedup();
        Ok(out)
    }

    /// Positions of the boundary loop of a face.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or one of its entities is missing.
    pub fn face_polygon(&self, face: FaceId) -> Result<Vec<Point3>> {
        self.face_loop(face)?
            .into_iter()
            .map(|v| Ok(self.vertex(v)?.point))
            .collect()
    }

    /// Vertices of a face that lie strictly inside one of its sides.
    ///
    /// # Errors
    ///
    /// Returns an error if the face or one of its edges is missing.
    pub fn side_interior_vertices(&self, face: FaceId, side: usize) -> Result<Vec<VertexId>> {
        let path = self.side_vertices(face, side)?;
        if path.len() <= 2 {
            return Ok(Vec::new());
        }
        Ok(path[1..path.len() - 1].to_vec())
    }

    /// Checks that opposite sides of a structured face carry the same
    /// number of mesh edges. Degenerate sides are exempt.
    ///
    /// # Errors
    ///
    /// Returns a feasibility error naming both sides and counts.
    pub fn check_face_discretization(&self, face: FaceId) -> Result<()> {
        let data = self.face(face)?;
        if !data.structured {
            return Ok(());
        }
        for side in 0..2 {
            let opposite = side + 2;
            if data.is_degenerate(side) || data.is_degenerate(opposite) {
                continue;
            }
            let a = self.side_count(face, side)?;
            let b = self.side_count(face, opposite)?;
            if a != b {
                let name = self.name_face(face);
                return Err(FeasibilityError::DiscretizationMismatch {
                    first: format!("{name} side {side}"),
                    first_count: a,
                    second: format!("{name} side {opposite}"),
                    second_count: b,
                }
                .into());
            }
        }
        Ok(())
    }
}
