use crate::command::{Command, CommandContext};
use crate::error::{Result, ValidationError};
use crate::geometry::{CurveId, GeomRef, PointId, SurfaceId, VolumeId};
use crate::math::{polygon_normal, Point3};
use crate::model::EntityRef;

use super::builder::{box_corners, hexahedron_geometry};

/// Creates a geometric point.
pub struct NewVertex {
    point: Point3,
}

impl NewVertex {
    /// Creates a new `NewVertex` command.
    #[must_use]
    pub fn new(point: Point3) -> Self {
        Self { point }
    }
}

impl Command for NewVertex {
    type Output = PointId;

    fn description(&self) -> String {
        format!("new point at ({}, {}, {})", self.point.x, self.point.y, self.point.z)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<PointId> {
        Ok(ctx.model.geom.add_point(self.point))
    }
}

/// Creates a straight curve between two points.
pub struct NewSegment {
    start: PointId,
    end: PointId,
}

impl NewSegment {
    /// Creates a new `NewSegment` command.
    #[must_use]
    pub fn new(start: PointId, end: PointId) -> Self {
        Self { start, end }
    }
}

impl Command for NewSegment {
    type Output = CurveId;

    fn description(&self) -> String {
        "new segment".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<CurveId> {
        let geom = &mut ctx.model.geom;
        let a = geom.point(self.start)?.point;
        let b = geom.point(self.end)?.point;
        if (b - a).norm() <= ctx.config.tolerance {
            return Err(ValidationError::InvalidInput(format!(
                "segment ends {} and {} coincide",
                geom.name(GeomRef::Point(self.start)),
                geom.name(GeomRef::Point(self.end))
            ))
            .into());
        }
        Ok(geom.add_curve(self.start, self.end))
    }
}

/// Creates a planar surface bounded by a closed loop of curves.
pub struct NewPlanarSurface {
    curves: Vec<CurveId>,
}

impl NewPlanarSurface {
    /// Creates a new `NewPlanarSurface` command.
    #[must_use]
    pub fn new(curves: Vec<CurveId>) -> Self {
        Self { curves }
    }
}

impl Command for NewPlanarSurface {
    type Output = SurfaceId;

    fn description(&self) -> String {
        format!("new planar surface on {} curves", self.curves.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<SurfaceId> {
        if self.curves.len() < 3 {
            return Err(ValidationError::InvalidInput("a surface needs at least 3 curves".into()).into());
        }
        let geom = &mut ctx.model.geom;
        for &c in &self.curves {
            geom.curve(c)?;
        }
        let surface = geom.add_surface(self.curves.clone());
        let polygon = geom.surface_polygon(surface)?;
        let name = geom.name(GeomRef::Surface(surface));
        let normal = polygon_normal(&polygon)
            .ok_or_else(|| ValidationError::InvalidInput(format!("{name} has no area")))?;
        let origin = polygon[0];
        if polygon
            .iter()
            .any(|p| (p - origin).dot(&normal).abs() > ctx.config.tolerance)
        {
            return Err(ValidationError::InvalidInput(format!("{name} is not planar")).into());
        }
        Ok(surface)
    }
}

/// Creates an axis-aligned box volume with its boundary.
pub struct NewBox {
    min: Point3,
    max: Point3,
    group: Option<String>,
}

impl NewBox {
    /// Creates a new `NewBox` command. The volume is put in `group` when
    /// one is given.
    #[must_use]
    pub fn new(min: Point3, max: Point3, group: Option<&str>) -> Self {
        Self {
            min,
            max,
            group: group.map(str::to_owned),
        }
    }
}

impl Command for NewBox {
    type Output = VolumeId;

    fn description(&self) -> String {
        format!("new box from {:?} to {:?}", self.min.coords.as_slice(), self.max.coords.as_slice())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<VolumeId> {
        let extent = self.max - self.min;
        if extent.iter().any(|d| *d <= ctx.config.tolerance) {
            return Err(ValidationError::InvalidInput(
                "box maximum must exceed its minimum along every axis".into(),
            )
            .into());
        }
        let volume = hexahedron_geometry(&mut ctx.model.geom, &box_corners(&self.min, &self.max));
        if let Some(group) = &self.group {
            ctx.model
                .groups
                .add(&[EntityRef::Geom(GeomRef::Volume(volume))], 3, group)?;
        }
        Ok(volume)
    }
}
