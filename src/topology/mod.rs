pub mod block;
pub mod edge;
pub mod face;
pub mod vertex;

pub use block::{BlockData, BlockId};
pub use edge::{EdgeData, EdgeId};
pub use face::{FaceData, FaceId};
pub use vertex::{VertexData, VertexId};

use crate::error::{IntegrityError, Result, ValidationError};
use crate::geometry::GeomRef;
use crate::math::Point3;
use crate::store::{Arena, ArenaDelta, Direction};

/// Reference to a topological entity of any dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopoRef {
    Vertex(VertexId),
    Edge(EdgeId),
    Face(FaceId),
    Block(BlockId),
}

impl TopoRef {
    /// Dimension of the referenced entity.
    #[must_use]
    pub fn dimension(self) -> u8 {
        match self {
            Self::Vertex(_) => 0,
            Self::Edge(_) => 1,
            Self::Face(_) => 2,
            Self::Block(_) => 3,
        }
    }
}

/// Net effect of a transaction on the topological layer.
#[derive(Debug, Clone)]
pub struct TopologyDelta {
    vertices: ArenaDelta<VertexId, VertexData>,
    edges: ArenaDelta<EdgeId, EdgeData>,
    faces: ArenaDelta<FaceId, FaceData>,
    blocks: ArenaDelta<BlockId, BlockData>,
}

impl TopologyDelta {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
            && self.edges.is_empty()
            && self.faces.is_empty()
            && self.blocks.is_empty()
    }
}

/// Central arena that owns all topological entities.
///
/// Entities reference each other by typed IDs and only store forward
/// links (block to faces, face to edges, edge to vertices). Every back
/// link is derived by scanning, so nothing can go stale on destroy or
/// undo.
#[derive(Debug)]
pub struct TopologyStore {
    vertices: Arena<VertexId, VertexData>,
    edges: Arena<EdgeId, EdgeData>,
    faces: Arena<FaceId, FaceData>,
    blocks: Arena<BlockId, BlockData>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self {
            vertices: Arena::new("Som"),
            edges: Arena::new("Ar"),
            faces: Arena::new("Fa"),
            blocks: Arena::new("Bl"),
        }
    }
}

impl TopologyStore {
    /// Creates a new, empty topology store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Vertex operations ---

    /// Inserts a vertex and returns its ID.
    pub fn add_vertex(&mut self, data: VertexData) -> VertexId {
        self.vertices.insert(data)
    }

    /// Returns a reference to the vertex data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn vertex(&self, id: VertexId) -> Result<&VertexData, ValidationError> {
        self.vertices
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.vertices.name(id)))
    }

    /// Returns a mutable reference to the vertex data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn vertex_mut(&mut self, id: VertexId) -> Result<&mut VertexData, ValidationError> {
        let name = self.vertices.name(id);
        self.vertices
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Edge operations ---

    /// Inserts an edge and returns its ID.
    pub fn add_edge(&mut self, data: EdgeData) -> EdgeId {
        self.edges.insert(data)
    }

    /// Returns a reference to the edge data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn edge(&self, id: EdgeId) -> Result<&EdgeData, ValidationError> {
        self.edges
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.edges.name(id)))
    }

    /// Returns a mutable reference to the edge data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn edge_mut(&mut self, id: EdgeId) -> Result<&mut EdgeData, ValidationError> {
        let name = self.edges.name(id);
        self.edges
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Face operations ---

    /// Inserts a face and returns its ID.
    pub fn add_face(&mut self, data: FaceData) -> FaceId {
        self.faces.insert(data)
    }

    /// Returns a reference to the face data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn face(&self, id: FaceId) -> Result<&FaceData, ValidationError> {
        self.faces
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.faces.name(id)))
    }

    /// Returns a mutable reference to the face data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn face_mut(&mut self, id: FaceId) -> Result<&mut FaceData, ValidationError> {
        let name = self.faces.name(id);
        self.faces
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Block operations ---

    /// Inserts a block and returns its ID.
    pub fn add_block(&mut self, data: BlockData) -> BlockId {
        self.blocks.insert(data)
    }

    /// Returns a reference to the block data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn block(&self, id: BlockId) -> Result<&BlockData, ValidationError> {
        self.blocks
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.blocks.name(id)))
    }

    /// Returns a mutable reference to the block data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut BlockData, ValidationError> {
        let name = self.blocks.name(id);
        self.blocks
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Names and lookup ---

    /// Session name of a topological entity.
    #[must_use]
    pub fn name(&self, entity: TopoRef) -> String {
        match entity {
            TopoRef::Vertex(id) => self.vertices.name(id),
            TopoRef::Edge(id) => self.edges.name(id),
            TopoRef::Face(id) => self.faces.name(id),
            TopoRef::Block(id) => self.blocks.name(id),
        }
    }

    pub(crate) fn name_face(&self, id: FaceId) -> String {
        self.faces.name(id)
    }

    pub(crate) fn name_block(&self, id: BlockId) -> String {
        self.blocks.name(id)
    }

    /// Looks up a live topological entity by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TopoRef> {
        self.vertices
            .find(name)
            .map(TopoRef::Vertex)
            .or_else(|| self.edges.find(name).map(TopoRef::Edge))
            .or_else(|| self.faces.find(name).map(TopoRef::Face))
            .or_else(|| self.blocks.find(name).map(TopoRef::Block))
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn exists(&self, entity: TopoRef) -> bool {
        match entity {
            TopoRef::Vertex(id) => self.vertices.contains(id),
            TopoRef::Edge(id) => self.edges.contains(id),
            TopoRef::Face(id) => self.faces.contains(id),
            TopoRef::Block(id) => self.blocks.contains(id),
        }
    }

    /// Fails with the entity's name if it is not alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn check(&self, entity: TopoRef) -> Result<(), ValidationError> {
        if self.exists(entity) {
            Ok(())
        } else {
            Err(ValidationError::EntityNotFound(self.name(entity)))
        }
    }

    /// Live vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &VertexData)> {
        self.vertices.iter()
    }

    /// Live edges.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeData)> {
        self.edges.iter()
    }

    /// Live faces.
    pub fn faces(&self) -> impl Iterator<Item = (FaceId, &FaceData)> {
        self.faces.iter()
    }

    /// Live blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BlockData)> {
        self.blocks.iter()
    }

    /// Number of live entities per dimension.
    #[must_use]
    pub fn count(&self, dimension: u8) -> usize {
        match dimension {
            0 => self.vertices.len(),
            1 => self.edges.len(),
            2 => self.faces.len(),
            3 => self.blocks.len(),
            _ => 0,
        }
    }

    /// Every live topological entity of a dimension.
    #[must_use]
    pub fn all_of_dimension(&self, dimension: u8) -> Vec<TopoRef> {
        match dimension {
            0 => self.vertices.keys().into_iter().map(TopoRef::Vertex).collect(),
            1 => self.edges.keys().into_iter().map(TopoRef::Edge).collect(),
            2 => self.faces.keys().into_iter().map(TopoRef::Face).collect(),
            3 => self.blocks.keys().into_iter().map(TopoRef::Block).collect(),
            _ => Vec::new(),
        }
    }

    /// Destroys an entity without touching its boundary.
    pub(crate) fn remove(&mut self, entity: TopoRef) {
        match entity {
            TopoRef::Vertex(id) => {
                self.vertices.remove(id);
            }
            TopoRef::Edge(id) => {
                self.edges.remove(id);
            }
            TopoRef::Face(id) => {
                self.faces.remove(id);
            }
            TopoRef::Block(id) => {
                self.blocks.remove(id);
            }
        }
    }

    // --- Association ---

    /// Geometric entity the topological entity conforms to.
    #[must_use]
    pub fn association(&self, entity: TopoRef) -> Option<GeomRef> {
        match entity {
            TopoRef::Vertex(id) => self.vertices.get(id)?.association.map(GeomRef::Point),
            TopoRef::Edge(id) => self.edges.get(id)?.association.map(GeomRef::Curve),
            TopoRef::Face(id) => self.faces.get(id)?.association.map(GeomRef::Surface),
            TopoRef::Block(id) => self.blocks.get(id)?.association.map(GeomRef::Volume),
        }
    }

    /// Sets or clears the association of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or the dimensions differ.
    pub fn set_association(&mut self, entity: TopoRef, geom: Option<GeomRef>) -> Result<()> {
        match (entity, geom) {
            (TopoRef::Vertex(id), None) => self.vertex_mut(id)?.association = None,
            (TopoRef::Vertex(id), Some(GeomRef::Point(p))) => self.vertex_mut(id)?.association = Some(p),
            (TopoRef::Edge(id), None) => self.edge_mut(id)?.association = None,
            (TopoRef::Edge(id), Some(GeomRef::Curve(c))) => self.edge_mut(id)?.association = Some(c),
            (TopoRef::Face(id), None) => self.face_mut(id)?.association = None,
            (TopoRef::Face(id), Some(GeomRef::Surface(s))) => self.face_mut(id)?.association = Some(s),
            (TopoRef::Block(id), None) => self.block_mut(id)?.association = None,
            (TopoRef::Block(id), Some(GeomRef::Volume(v))) => self.block_mut(id)?.association = Some(v),
            (topo, Some(g)) => {
                return Err(ValidationError::DimensionMismatch {
                    entity: self.name(topo),
                    expected: topo.dimension(),
                    found: g.dimension(),
                }
                .into())
            }
        }
        Ok(())
    }

    // --- Derived queries ---

    /// Position of a vertex.
    ///
    /// # Errors
    ///
    /// Returns an error if the vertex is missing.
    pub fn position(&self, v: VertexId) -> Result<Point3, ValidationError> {
        Ok(self.vertex(v)?.point)
    }

    /// Direct boundary of an entity (dimension - 1), without duplicates.
    #[must_use]
    pub fn boundary(&self, entity: TopoRef) -> Vec<TopoRef> {
        let mut out: Vec<TopoRef> = match entity {
            TopoRef::Vertex(_) => Vec::new(),
            TopoRef::Edge(id) => self.edges.get(id).map_or_else(Vec::new, |e| {
                e.vertices.iter().copied().map(TopoRef::Vertex).collect()
            }),
            TopoRef::Face(id) => self
                .faces
                .get(id)
                .map_or_else(Vec::new, |f| f.edges().map(TopoRef::Edge).collect()),
            TopoRef::Block(id) => self
                .blocks
                .get(id)
                .map_or_else(Vec::new, |b| b.faces().map(TopoRef::Face).collect()),
        };
        out.sort();
        out.dedup();
        out
    }

    /// Every entity in the boundary closure, down to vertices.
    #[must_use]
    pub fn closure(&self, entity: TopoRef) -> Vec<TopoRef> {
        let mut out: Vec<TopoRef> = Vec::new();
        let mut stack = self.boundary(entity);
        while let Some(next) = stack.pop() {
            if out.contains(&next) {
                continue;
            }
            stack.extend(self.boundary(next));
            out.push(next);
        }
        out.sort();
        out
    }

    /// Entities that reference `entity` directly: edges, faces and blocks
    /// for a vertex; faces for an edge; blocks for a face.
    #[must_use]
    pub fn users(&self, entity: TopoRef) -> Vec<TopoRef> {
        match entity {
            TopoRef::Vertex(v) => {
                let mut out: Vec<TopoRef> = self.edges_at(v).into_iter().map(TopoRef::Edge).collect();
                out.extend(
                    self.faces
                        .iter()
                        .filter(|(_, f)| f.corners.contains(&v))
                        .map(|(k, _)| TopoRef::Face(k)),
                );
                out.extend(
                    self.blocks
                        .iter()
                        .filter(|(_, b)| b.corners.contains(&v))
                        .map(|(k, _)| TopoRef::Block(k)),
                );
                out
            }
            TopoRef::Edge(e) => self.faces_using_edge(e).into_iter().map(TopoRef::Face).collect(),
            TopoRef::Face(f) => self.blocks_using_face(f).into_iter().map(TopoRef::Block).collect(),
            TopoRef::Block(_) => Vec::new(),
        }
    }

    /// Edges having `v` as an end.
    #[must_use]
    pub fn edges_at(&self, v: VertexId) -> Vec<EdgeId> {
        self.edges
            .iter()
            .filter(|(_, e)| e.has_vertex(v))
            .map(|(k, _)| k)
            .collect()
    }

    /// Edges joining `a` and `b`.
    #[must_use]
    pub fn edges_between(&self, a: VertexId, b: VertexId) -> Vec<EdgeId> {
        self.edges
            .iter()
            .filter(|(_, e)| e.joins(a, b))
            .map(|(k, _)| k)
            .collect()
    }

    /// Faces whose boundary contains `e`.
    #[must_use]
    pub fn faces_using_edge(&self, e: EdgeId) -> Vec<FaceId> {
        self.faces
            .iter()
            .filter(|(_, f)| f.side_of(e).is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Blocks having `f` on one of their sides.
    #[must_use]
    pub fn blocks_using_face(&self, f: FaceId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|(_, b)| b.side_of(f).is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Sum of the mesh-edge counts of a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge is missing.
    pub fn chain_count(&self, chain: &[EdgeId]) -> Result<usize> {
        let mut total = 0;
        for &e in chain {
            total += self.edge(e)?.nb_edges();
        }
        Ok(total)
    }

    /// Vertices visited when walking `chain` from `start`.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if consecutive edges are not connected.
    pub fn walk_chain(&self, start: VertexId, chain: &[EdgeId]) -> Result<Vec<VertexId>> {
        let mut path = Vec::with_capacity(chain.len() + 1);
        path.push(start);
        let mut current = start;
        for &e in chain {
            let Some(next) = self.edge(e)?.other(current) else {
                return Err(IntegrityError::Inconsistent(format!(
                    "{} does not continue the chain at {}",
                    self.edges.name(e),
                    self.vertices.name(current)
                ))
                .into());
            };
            path.push(next);
            current = next;
        }
        Ok(path)
    }

    // --- Transactions ---

    pub(crate) fn begin(&mut self) {
        self.vertices.begin();
        self.edges.begin();
        self.faces.begin();
        self.blocks.begin();
    }

    pub(crate) fn commit(&mut self) -> TopologyDelta {
        TopologyDelta {
            vertices: self.vertices.commit(),
            edges: self.edges.commit(),
            faces: self.faces.commit(),
            blocks: self.blocks.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.vertices.rollback();
        self.edges.rollback();
        self.faces.rollback();
        self.blocks.rollback();
    }

    pub(crate) fn apply(&mut self, delta: &TopologyDelta, direction: Direction, rewind: bool) {
        self.vertices.apply(&delta.vertices, direction, rewind);
        self.edges.apply(&delta.edges, direction, rewind);
        self.faces.apply(&delta.faces, direction, rewind);
        self.blocks.apply(&delta.blocks, direction, rewind);
    }
}
