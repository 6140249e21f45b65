pub mod law;
mod method;
mod resolver;

pub use law::MeshingLaw;
pub use method::{MeshingMethod, SetBlockMeshingMethod, SetFaceMeshingMethod};
pub use resolver::{
    edge_distribution, EdgeLength, EdgeProjectedLength, SetMeshingProperty,
    SetParallelMeshingProperty,
};

pub(crate) use resolver::{check_structures, edge_nodes};
