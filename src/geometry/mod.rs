pub mod oracle;

pub use oracle::{GeometryOracle, LinearOracle};

use crate::error::ValidationError;
use crate::math::Point3;
use crate::store::{Arena, ArenaDelta, Direction};

slotmap::new_key_type! {
    /// Unique identifier for a geometric point.
    pub struct PointId;
}

slotmap::new_key_type! {
    /// Unique identifier for a geometric curve.
    pub struct CurveId;
}

slotmap::new_key_type! {
    /// Unique identifier for a geometric surface.
    pub struct SurfaceId;
}

slotmap::new_key_type! {
    /// Unique identifier for a geometric volume.
    pub struct VolumeId;
}

/// A geometric point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointData {
    /// Coordinates of the point.
    pub point: Point3,
}

/// A geometric curve bounded by two points.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveData {
    /// Start and end points.
    pub ends: [PointId; 2],
}

/// A geometric surface bounded by a closed loop of curves.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceData {
    /// Boundary curves, in loop order.
    pub curves: Vec<CurveId>,
}

/// A geometric volume bounded by surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeData {
    /// Boundary surfaces.
    pub surfaces: Vec<SurfaceId>,
}

/// Reference to a geometric entity of any dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeomRef {
    Point(PointId),
    Curve(CurveId),
    Surface(SurfaceId),
    Volume(VolumeId),
}

impl GeomRef {
    /// Dimension of the referenced entity.
    #[must_use]
    pub fn dimension(self) -> u8 {
        match self {
            Self::Point(_) => 0,
            Self::Curve(_) => 1,
            Self::Surface(_) => 2,
            Self::Volume(_) => 3,
        }
    }
}

/// Net effect of a transaction on the geometric layer.
#[derive(Debug, Clone)]
pub struct GeometryDelta {
    points: ArenaDelta<PointId, PointData>,
    curves: ArenaDelta<CurveId, CurveData>,
    surfaces: ArenaDelta<SurfaceId, SurfaceData>,
    volumes: ArenaDelta<VolumeId, VolumeData>,
}

impl GeometryDelta {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
            && self.curves.is_empty()
            && self.surfaces.is_empty()
            && self.volumes.is_empty()
    }
}

/// Arena that owns all geometric entities.
#[derive(Debug)]
pub struct GeometryStore {
    points: Arena<PointId, PointData>,
    curves: Arena<CurveId, CurveData>,
    surfaces: Arena<SurfaceId, SurfaceData>,
    volumes: Arena<VolumeId, VolumeData>,
}

impl Default for GeometryStore {
    fn default() -> Self {
        Self {
            points: Arena::new("Pt"),
            curves: Arena::new("Crb"),
            surfaces: Arena::new("Surf"),
            volumes: Arena::new("Vol"),
        }
    }
}

impl GeometryStore {
    /// Creates a new, empty geometry store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Point operations ---

    /// Inserts a point and returns its ID.
    pub fn add_point(&mut self, point: Point3) -> PointId {
        self.points.insert(PointData { point })
    }

    /// Returns the point data.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn point(&self, id: PointId) -> Result<&PointData, ValidationError> {
        self.points
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.points.name(id)))
    }

    /// Returns the point data for mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn point_mut(&mut self, id: PointId) -> Result<&mut PointData, ValidationError> {
        let name = self.points.name(id);
        self.points
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Curve operations ---

    /// Inserts a curve and returns its ID.
    pub fn add_curve(&mut self, start: PointId, end: PointId) -> CurveId {
        self.curves.insert(CurveData { ends: [start, end] })
    }

    /// Returns the curve data.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn curve(&self, id: CurveId) -> Result<&CurveData, ValidationError> {
        self.curves
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.curves.name(id)))
    }

    /// Returns the curve data for mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn curve_mut(&mut self, id: CurveId) -> Result<&mut CurveData, ValidationError> {
        let name = self.curves.name(id);
        self.curves
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Surface operations ---

    /// Inserts a surface and returns its ID.
    pub fn add_surface(&mut self, curves: Vec<CurveId>) -> SurfaceId {
        self.surfaces.insert(SurfaceData { curves })
    }

    /// Returns the surface data.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn surface(&self, id: SurfaceId) -> Result<&SurfaceData, ValidationError> {
        self.surfaces
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.surfaces.name(id)))
    }

    /// Returns the surface data for mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut SurfaceData, ValidationError> {
        let name = self.surfaces.name(id);
        self.surfaces
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Volume operations ---

    /// Inserts a volume and returns its ID.
    pub fn add_volume(&mut self, surfaces: Vec<SurfaceId>) -> VolumeId {
        self.volumes.insert(VolumeData { surfaces })
    }

    /// Returns the volume data.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn volume(&self, id: VolumeId) -> Result<&VolumeData, ValidationError> {
        self.volumes
            .get(id)
            .ok_or_else(|| ValidationError::EntityNotFound(self.volumes.name(id)))
    }

    /// Returns the volume data for mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn volume_mut(&mut self, id: VolumeId) -> Result<&mut VolumeData, ValidationError> {
        let name = self.volumes.name(id);
        self.volumes
            .get_mut(id)
            .ok_or(ValidationError::EntityNotFound(name))
    }

    // --- Generic access ---

    /// Session name of a geometric entity.
    #[must_use]
    pub fn name(&self, entity: GeomRef) -> String {
        match entity {
            GeomRef::Point(id) => self.points.name(id),
            GeomRef::Curve(id) => self.curves.name(id),
            GeomRef::Surface(id) => self.surfaces.name(id),
            GeomRef::Volume(id) => self.volumes.name(id),
        }
    }

    /// Looks up a live geometric entity by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<GeomRef> {
        self.surfaces
            .find(name)
            .map(GeomRef::Surface)
            .or_else(|| self.curves.find(name).map(GeomRef::Curve))
            .or_else(|| self.volumes.find(name).map(GeomRef::Volume))
            .or_else(|| self.points.find(name).map(GeomRef::Point))
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn exists(&self, entity: GeomRef) -> bool {
        match entity {
            GeomRef::Point(id) => self.points.contains(id),
            GeomRef::Curve(id) => self.curves.contains(id),
            GeomRef::Surface(id) => self.surfaces.contains(id),
            GeomRef::Volume(id) => self.volumes.contains(id),
        }
    }

    /// Fails with the entity's name if it is not alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn check(&self, entity: GeomRef) -> Result<(), ValidationError> {
        if self.exists(entity) {
            Ok(())
        } else {
            Err(ValidationError::EntityNotFound(self.name(entity)))
        }
    }

    /// Live points.
    pub fn points(&self) -> impl Iterator<Item = (PointId, &PointData)> {
        self.points.iter()
    }

    /// Live curves.
    pub fn curves(&self) -> impl Iterator<Item = (CurveId, &CurveData)> {
        self.curves.iter()
    }

    /// Live surfaces.
    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, &SurfaceData)> {
        self.surfaces.iter()
    }

    /// Live volumes.
    pub fn volumes(&self) -> impl Iterator<Item = (VolumeId, &VolumeData)> {
        self.volumes.iter()
    }

    /// Every live geometric entity of a dimension.
    #[must_use]
    pub fn all_of_dimension(&self, dimension: u8) -> Vec<GeomRef> {
        match dimension {
            0 => self.points.keys().into_iter().map(GeomRef::Point).collect(),
            1 => self.curves.keys().into_iter().map(GeomRef::Curve).collect(),
            2 => self.surfaces.keys().into_iter().map(GeomRef::Surface).collect(),
            3 => self.volumes.keys().into_iter().map(GeomRef::Volume).collect(),
            _ => Vec::new(),
        }
    }

    /// Removes an entity, leaving its boundary untouched.
    pub(crate) fn remove(&mut self, entity: GeomRef) {
        match entity {
            GeomRef::Point(id) => {
                self.points.remove(id);
            }
            GeomRef::Curve(id) => {
                self.curves.remove(id);
            }
            GeomRef::Surface(id) => {
                self.surfaces.remove(id);
            }
            GeomRef::Volume(id) => {
                self.volumes.remove(id);
            }
        }
    }

    // --- Derived queries ---

    /// Direct boundary of an entity (dimension - 1).
    #[must_use]
    pub fn boundary(&self, entity: GeomRef) -> Vec<GeomRef> {
        match entity {
            GeomRef::Point(_) => Vec::new(),
            GeomRef::Curve(id) => self.curves.get(id).map_or_else(Vec::new, |c| {
                let mut out = vec![GeomRef::Point(c.ends[0])];
                if c.ends[1] != c.ends[0] {
                    out.push(GeomRef::Point(c.ends[1]));
                }
                out
            }),
            GeomRef::Surface(id) => self.surfaces.get(id).map_or_else(Vec::new, |s| {
                s.curves.iter().copied().map(GeomRef::Curve).collect()
            }),
            GeomRef::Volume(id) => self.volumes.get(id).map_or_else(Vec::new, |v| {
                v.surfaces.iter().copied().map(GeomRef::Surface).collect()
            }),
        }
    }

    /// Every entity in the boundary closure, down to points, without
    /// duplicates and without `entity` itself.
    #[must_use]
    pub fn closure(&self, entity: GeomRef) -> Vec<GeomRef> {
        let mut out: Vec<GeomRef> = Vec::new();
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

    /// Entities whose direct boundary contains `entity`.
    #[must_use]
    pub fn users(&self, entity: GeomRef) -> Vec<GeomRef> {
        match entity {
            GeomRef::Point(id) => self
                .curves
                .iter()
                .filter(|(_, c)| c.ends.contains(&id))
                .map(|(k, _)| GeomRef::Curve(k))
                .collect(),
            GeomRef::Curve(id) => self
                .surfaces
                .iter()
                .filter(|(_, s)| s.curves.contains(&id))
                .map(|(k, _)| GeomRef::Surface(k))
                .collect(),
            GeomRef::Surface(id) => self
                .volumes
                .iter()
                .filter(|(_, v)| v.surfaces.contains(&id))
                .map(|(k, _)| GeomRef::Volume(k))
                .collect(),
            GeomRef::Volume(_) => Vec::new(),
        }
    }

    /// Coordinates of both ends of a curve.
    ///
    /// # Errors
    ///
    /// Returns an error if the curve or one of its points is missing.
    pub fn curve_ends(&self, id: CurveId) -> Result<[Point3; 2], ValidationError> {
        let curve = self.curve(id)?;
        Ok([
            self.point(curve.ends[0])?.point,
            self.point(curve.ends[1])?.point,
        ])
    }

    /// Points of a surface boundary in loop order.
    ///
    /// # Errors
    ///
    /// Returns an error if a boundary entity is missing or the curves do
    /// not form a closed loop.
    pub fn surface_loop(&self, id: SurfaceId) -> Result<Vec<PointId>, ValidationError> {
        let surface = self.surface(id)?;
        let mut ends = Vec::with_capacity(surface.curves.len());
        for &c in &surface.curves {
            ends.push(self.curve(c)?.ends);
        }
        let Some(first) = ends.first() else {
            return Ok(Vec::new());
        };
        let mut loop_points = vec![first[0]];
        let mut current = first[1];
        let mut used = vec![false; ends.len()];
        used[0] = true;
        while loop_points.len() < ends.len() {
            loop_points.push(current);
            let next = ends.iter().enumerate().find_map(|(i, e)| {
                if used[i] {
                    None
                } else if e[0] == current {
                    Some((i, e[1]))
                } else if e[1] == current {
                    Some((i, e[0]))
                } else {
                    None
                }
            });
            let Some((i, other)) = next else {
                return Err(ValidationError::InvalidInput(format!(
                    "{} is not bounded by a closed loop",
                    self.surfaces.name(id)
                )));
            };
            used[i] = true;
            current = other;
        }
        if current != loop_points[0] {
            return Err(ValidationError::InvalidInput(format!(
                "{} is not bounded by a closed loop",
                self.surfaces.name(id)
            )));
        }
        Ok(loop_points)
    }

    /// Coordinates of a surface boundary in loop order.
    ///
    /// # Errors
    ///
    /// Returns an error if a boundary entity is missing.
    pub fn surface_polygon(&self, id: SurfaceId) -> Result<Vec<Point3>, ValidationError> {
        self.surface_loop(id)?
            .into_iter()
            .map(|p| self.point(p).map(|d| d.point))
            .collect()
    }

    /// Number of live entities per dimension.
    #[must_use]
    pub fn count(&self, dimension: u8) -> usize {
        match dimension {
            0 => self.points.len(),
            1 => self.curves.len(),
            2 => self.surfaces.len(),
            3 => self.volumes.len(),
            _ => 0,
        }
    }

    // --- Transactions ---

    pub(crate) fn begin(&mut self) {
        self.points.begin();
        self.curves.begin();
        self.surfaces.begin();
        self.volumes.begin();
    }

    pub(crate) fn commit(&mut self) -> GeometryDelta {
        GeometryDelta {
            points: self.points.commit(),
            curves: self.curves.commit(),
            surfaces: self.surfaces.commit(),
            volumes: self.volumes.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.points.rollback();
        self.curves.rollback();
        self.surfaces.rollback();
        self.volumes.rollback();
    }

    pub(crate) fn apply(&mut self, delta: &GeometryDelta, direction: Direction, rewind: bool) {
        self.points.apply(&delta.points, direction, rewind);
        self.curves.apply(&delta.curves, direction, rewind);
        self.surfaces.apply(&delta.surfaces, direction, rewind);
        self.volumes.apply(&delta.volumes, direction, rewind);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(store: &mut GeometryStore) -> SurfaceId {
        let p: Vec<PointId> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| store.add_point(Point3::new(x, y, 0.0)))
            .collect();
        let c0 = store.add_curve(p[0], p[1]);
        let c1 = store.add_curve(p[2], p[1]);
        let c2 = store.add_curve(p[2], p[3]);
        let c3 = store.add_curve(p[3], p[0]);
        store.add_surface(vec![c0, c1, c2, c3])
    }

    #[test]
    fn names_use_prefixes() {
        let mut store = GeometryStore::new();
        let s = square(&mut store);
        assert_eq!(store.name(GeomRef::Surface(s)), "Surf0000");
        assert_eq!(store.find("Pt0003").map(GeomRef::dimension), Some(0));
        assert_eq!(store.find("Crb0002").map(GeomRef::dimension), Some(1));
        assert_eq!(store.find("Surf0000"), Some(GeomRef::Surface(s)));
        assert_eq!(store.find("Vol0000"), None);
    }

    #[test]
    fn loop_follows_curve_orientation() {
        let mut store = GeometryStore::new();
        let s = square(&mut store);
        let poly = store.surface_polygon(s).unwrap();
        assert_eq!(poly.len(), 4);
        assert!((poly[2] - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn closure_reaches_points() {
        let mut store = GeometryStore::new();
        let s = square(&mut store);
        let closure = store.closure(GeomRef::Surface(s));
        assert_eq!(closure.len(), 8);
        assert_eq!(closure.iter().filter(|e| e.dimension() == 0).count(), 4);
    }

    #[test]
    fn users_of_a_point() {
        let mut store = GeometryStore::new();
        square(&mut store);
        let p = store.find("Pt0001").unwrap();
        assert_eq!(store.users(p).len(), 2);
    }
}
