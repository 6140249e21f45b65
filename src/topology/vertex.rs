use crate::geometry::PointId;
use crate::math::Point3;

slotmap::new_key_type! {
    /// Unique identifier for a vertex in the topology store.
    pub struct VertexId;
}

/// Data associated with a topological vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    /// The 3D position of the vertex.
    pub point: Point3,
    /// Geometric point the vertex conforms to.
    pub association: Option<PointId>,
}

impl VertexData {
    /// Creates a new free-standing vertex at the given point.
    #[must_use]
    pub fn new(point: Point3) -> Self {
        Self {
            point,
            association: None,
        }
    }
}
