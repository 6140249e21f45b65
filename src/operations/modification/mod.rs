mod align;
mod fuse;
mod fuse_blocks;
mod glue;
mod ogrid;
mod ogrid_blocks;
mod ogrid_faces;
mod rewire;
mod split_blocks;
mod split_edge;
mod split_faces;

pub use align::AlignVertices;
pub use fuse::{FuseEdges, FuseFaces, FuseVertices, SnapPosition, SnapVertices};
pub use fuse_blocks::FuseBlocks;
pub use glue::{Glue, GlueTopologies};
pub use ogrid_blocks::SplitBlocksWithOgrid;
pub use ogrid_faces::SplitFacesWithOgrid;
pub use split_blocks::{SplitAllBlocks, SplitBlock, SplitBlocks};
pub use split_edge::SplitEdge;
pub use split_faces::{ExtendSplitFace, SplitAllFaces, SplitFace, SplitFaces};
