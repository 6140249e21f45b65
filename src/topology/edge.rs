use crate::geometry::CurveId;
use crate::meshing::MeshingLaw;

use super::vertex::VertexId;

slotmap::new_key_type! {
    /// Unique identifier for an edge in the topology store.
    pub struct EdgeId;
}

/// Data associated with a topological edge.
///
/// An edge connects two vertices and carries the discretization law
/// that the mesher applies between them.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    /// First and second vertex. Node distributions are measured from
    /// the first one.
    pub vertices: [VertexId; 2],
    /// Discretization of the edge.
    pub meshing: MeshingLaw,
    /// Geometric curve the edge conforms to.
    pub association: Option<CurveId>,
}

impl EdgeData {
    /// Creates an unassociated edge.
    #[must_use]
    pub fn new(start: VertexId, end: VertexId, meshing: MeshingLaw) -> Self {
        Self {
            vertices: [start, end],
            meshing,
            association: None,
        }
    }

    /// Number of mesh edges.
    #[must_use]
    pub fn nb_edges(&self) -> usize {
        self.meshing.nb_edges()
    }

    /// Returns `true` if `v` is one of the two vertices.
    #[must_use]
    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    /// The vertex at the other end from `v`, if `v` is an end.
    #[must_use]
    pub fn other(&self, v: VertexId) -> Option<VertexId> {
        if self.vertices[0] == v {
            Some(self.vertices[1])
        } else if self.vertices[1] == v {
            Some(self.vertices[0])
        } else {
            None
        }
    }

    /// Returns `true` if the edge joins `a` and `b` in either direction.
    #[must_use]
    pub fn joins(&self, a: VertexId, b: VertexId) -> bool {
        (self.vertices[0] == a && self.vertices[1] == b)
            || (self.vertices[0] == b && self.vertices[1] == a)
    }
}
