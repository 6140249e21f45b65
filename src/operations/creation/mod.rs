pub(crate) mod builder;
mod new_geometry;
mod new_topo;

pub use new_geometry::{NewBox, NewPlanarSurface, NewSegment, NewVertex};
pub use new_topo::{NewBoxWithTopo, NewFreeTopo, NewTopoOnGeometry};
