use std::collections::HashSet;

use crate::association::Associate;
use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::geometry::{GeomRef, GeometryStore, PointId, VolumeId};
use crate::math::Point3;
use crate::model::EntityRef;
use crate::topology::{BlockId, TopoRef, VertexData};

use super::builder::{block_from_points, box_corners, face_from_points, uniform_edge};
use super::NewBox;

/// Creates a box volume together with a structured block associated to
/// it entity by entity.
pub struct NewBoxWithTopo {
    min: Point3,
    max: Point3,
    counts: [usize; 3],
    group: Option<String>,
}

impl NewBoxWithTopo {
    /// Creates a new `NewBoxWithTopo` command with `counts[a]` mesh edges
    /// along axis `a`. The volume is put in `group` when one is given.
    #[must_use]
    pub fn new(min: Point3, max: Point3, counts: [usize; 3], group: Option<&str>) -> Self {
        Self {
            min,
            max,
            counts,
            group: group.map(str::to_owned),
        }
    }
}

impl Command for NewBoxWithTopo {
    type Output = BlockId;

    fn description(&self) -> String {
        let [ni, nj, nk] = self.counts;
        format!("new box with a {ni}x{nj}x{nk} block")
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<BlockId> {
        let volume = ctx.run(&NewBox::new(self.min, self.max, self.group.as_deref()))?;
        let corners = box_corners(&self.min, &self.max);
        let block = block_from_points(&mut ctx.model.topo, &corners, self.counts)?;
        ctx.run(&Associate::new(
            vec![TopoRef::Block(block)],
            Some(GeomRef::Volume(volume)),
            true,
        ))?;
        Ok(block)
    }
}

/// Corner points of a hexahedral volume, indexed `i + 2j + 4k`.
fn hexahedron_corners(geom: &GeometryStore, volume: VolumeId) -> Result<[PointId; 8]> {
    let name = geom.name(GeomRef::Volume(volume));
    let not_hexahedral = || FeasibilityError::Unsupported(format!("{name} is not a hexahedron"));
    let data = geom.volume(volume)?;
    let closure = geom.closure(GeomRef::Volume(volume));
    let nb_points = closure.iter().filter(|g| g.dimension() == 0).count();
    let nb_curves = closure.iter().filter(|g| g.dimension() == 1).count();
    if data.surfaces.len() != 6 || nb_points != 8 || nb_curves != 12 {
        return Err(not_hexahedral().into());
    }
    let bottom = geom.surface_loop(data.surfaces[0])?;
    if bottom.len() != 4 {
        return Err(not_hexahedral().into());
    }
    let bottom_set: HashSet<PointId> = bottom.iter().copied().collect();
    let curves: Vec<[PointId; 2]> = closure
        .iter()
        .filter_map(|g| match g {
            GeomRef::Curve(c) => geom.curve(*c).ok().map(|d| d.ends),
            _ => None,
        })
        .collect();

    let mut corners = [bottom[0]; 8];
    // The bottom loop runs through corners 0, 1, 3, 2.
    for (slot, p) in [0, 1, 3, 2].into_iter().zip(&bottom) {
        corners[slot] = *p;
        let above: Vec<PointId> = curves
            .iter()
            .filter_map(|ends| {
                if ends[0] == *p && !bottom_set.contains(&ends[1]) {
                    Some(ends[1])
                } else if ends[1] == *p && !bottom_set.contains(&ends[0]) {
                    Some(ends[0])
                } else {
                    None
                }
            })
            .collect();
        let [top] = above.as_slice() else {
            return Err(not_hexahedral().into());
        };
        corners[slot + 4] = *top;
    }
    Ok(corners)
}

/// Builds structured topology on an existing geometric entity and
/// associates it entity by entity.
///
/// Volumes must be hexahedral. Surfaces must have 3 or 4 sides; a
/// 3-sided surface gets a face with a degenerate side.
pub struct NewTopoOnGeometry {
    target: GeomRef,
    counts: Option<[usize; 3]>,
}

impl NewTopoOnGeometry {
    /// Creates a new `NewTopoOnGeometry` command using the session's
    /// default edge count.
    #[must_use]
    pub fn new(target: GeomRef) -> Self {
        Self { target, counts: None }
    }

    /// Uses explicit mesh-edge counts per logical direction.
    #[must_use]
    pub fn with_counts(mut self, counts: [usize; 3]) -> Self {
        self.counts = Some(counts);
        self
    }
}

impl Command for NewTopoOnGeometry {
    type Output = TopoRef;

    fn description(&self) -> String {
        format!("new topology on a {}D entity", self.target.dimension())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<TopoRef> {
        let n = ctx.config.default_edge_count;
        let counts = self.counts.unwrap_or([n; 3]);
        let model = &mut *ctx.model;
        model.geom.check(self.target)?;
        let topo = match self.target {
            GeomRef::Point(p) => {
                let point = model.geom.point(p)?.point;
                TopoRef::Vertex(model.topo.add_vertex(VertexData::new(point)))
            }
            GeomRef::Curve(c) => {
                let [a, b] = model.geom.curve_ends(c)?;
                let va = model.topo.add_vertex(VertexData::new(a));
                let vb = model.topo.add_vertex(VertexData::new(b));
                TopoRef::Edge(uniform_edge(&mut model.topo, va, vb, counts[0])?)
            }
            GeomRef::Surface(s) => {
                let polygon = model.geom.surface_polygon(s)?;
                if !(3..=4).contains(&polygon.len()) {
                    return Err(FeasibilityError::Unsupported(format!(
                        "{} has {} sides, only 3 or 4 are supported",
                        model.geom.name(self.target),
                        polygon.len()
                    ))
                    .into());
                }
                TopoRef::Face(face_from_points(&mut model.topo, &polygon, [counts[0], counts[1]])?)
            }
            GeomRef::Volume(v) => {
                let corners = hexahedron_corners(&model.geom, v)?;
                let mut points = [Point3::origin(); 8];
                for (slot, p) in points.iter_mut().zip(corners) {
                    *slot = model.geom.point(p)?.point;
                }
                TopoRef::Block(block_from_points(&mut model.topo, &points, counts)?)
            }
        };
        ctx.run(&Associate::new(vec![topo], Some(self.target), true))?;
        Ok(topo)
    }
}

/// Creates a unit block or face with no association.
pub struct NewFreeTopo {
    dimension: u8,
    group: Option<String>,
}

impl NewFreeTopo {
    /// Creates a new `NewFreeTopo` command. The entity is put in `group`
    /// when one is given.
    #[must_use]
    pub fn new(dimension: u8, group: Option<&str>) -> Self {
        Self {
            dimension,
            group: group.map(str::to_owned),
        }
    }
}

impl Command for NewFreeTopo {
    type Output = TopoRef;

    fn description(&self) -> String {
        format!("new free {}D topology", self.dimension)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<TopoRef> {
        let n = ctx.config.default_edge_count;
        let topo = &mut ctx.model.topo;
        let entity = match self.dimension {
            2 => {
                let square = [
                    Point3::origin(),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(1.0, 1.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ];
                TopoRef::Face(face_from_points(topo, &square, [n, n])?)
            }
            3 => {
                let corners = box_corners(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0));
                TopoRef::Block(block_from_points(topo, &corners, [n; 3])?)
            }
            d => {
                return Err(ValidationError::InvalidInput(format!(
                    "free topology is a face or a block, not {d}D"
                ))
                .into())
            }
        };
        if let Some(group) = &self.group {
            ctx.model
                .groups
                .add(&[EntityRef::Topo(entity)], self.dimension, group)?;
        }
        Ok(entity)
    }
}
