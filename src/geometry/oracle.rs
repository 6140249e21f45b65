use crate::error::{OracleError, Result};
use crate::math::{polygon_normal, project_on_segment, Point3, Vector3, TOLERANCE};

use super::{CurveId, GeomRef, GeometryStore, SurfaceId, VolumeId};

/// Shape queries delegated to a geometric kernel.
///
/// The entity graph only stores boundary references; every question
/// about the actual shape goes through this trait.
pub trait GeometryOracle: std::fmt::Debug {
    /// Length of a curve.
    ///
    /// # Errors
    ///
    /// Returns an error if the curve cannot be measured.
    fn curve_length(&self, geom: &GeometryStore, curve: CurveId) -> Result<f64>;

    /// Point of a curve at normalized arc length `t` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the curve cannot be evaluated.
    fn point_on_curve(&self, geom: &GeometryStore, curve: CurveId, t: f64) -> Result<Point3>;

    /// Closest point of `target` to `point`.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection cannot be computed.
    fn project(&self, geom: &GeometryStore, target: GeomRef, point: &Point3) -> Result<Point3>;

    /// Distance from `point` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection cannot be computed.
    fn distance(&self, geom: &GeometryStore, target: GeomRef, point: &Point3) -> Result<f64> {
        Ok((self.project(geom, target, point)? - point).norm())
    }
}

/// Oracle for straight curves, planar surfaces and convex volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearOracle;

fn failed(operation: &'static str, geom: &GeometryStore, target: GeomRef, message: &str) -> OracleError {
    OracleError::Failed {
        operation,
        targets: geom.name(target),
        message: message.into(),
    }
}

impl LinearOracle {
    fn project_on_surface(geom: &GeometryStore, id: SurfaceId, q: &Point3) -> Result<Point3> {
        let polygon = geom.surface_polygon(id)?;
        let normal = polygon_normal(&polygon).ok_or_else(|| {
            failed("project", geom, GeomRef::Surface(id), "degenerate surface")
        })?;
        let origin = polygon[0];
        let on_plane = q - normal * (q - origin).dot(&normal);

        let n = polygon.len();
        let inside = (0..n).all(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            (b - a).cross(&(on_plane - a)).dot(&normal) >= -TOLERANCE
        });
        if inside {
            return Ok(on_plane);
        }

        let mut best = polygon[0];
        let mut best_dist = f64::INFINITY;
        for i in 0..n {
            let (p, _) = project_on_segment(q, &polygon[i], &polygon[(i + 1) % n]);
            let d = (p - q).norm();
            if d < best_dist {
                best_dist = d;
                best = p;
            }
        }
        Ok(best)
    }

    fn project_on_volume(geom: &GeometryStore, id: VolumeId, q: &Point3) -> Result<Point3> {
        let volume = geom.volume(id)?;
        let mut planes: Vec<(Point3, Vector3)> = Vec::with_capacity(volume.surfaces.len());
        let mut all_points = Vec::new();
        for &s in &volume.surfaces {
            let polygon = geom.surface_polygon(s)?;
            let normal = polygon_normal(&polygon).ok_or_else(|| {
                failed("project", geom, GeomRef::Volume(id), "degenerate boundary surface")
            })?;
            planes.push((polygon[0], normal));
            all_points.extend(polygon);
        }
        let center = crate::math::centroid(&all_points)
            .ok_or_else(|| failed("project", geom, GeomRef::Volume(id), "empty volume"))?;

        let inside = planes.iter().all(|(origin, normal)| {
            let side_q = (q - origin).dot(normal);
            let side_c = (center - origin).dot(normal);
            side_q.abs() <= TOLERANCE || side_q.signum() == side_c.signum()
        });
        if inside {
            return Ok(*q);
        }

        let mut best = *q;
        let mut best_dist = f64::INFINITY;
        for &s in &volume.surfaces {
            let p = Self::project_on_surface(geom, s, q)?;
            let d = (p - q).norm();
            if d < best_dist {
                best_dist = d;
                best = p;
            }
        }
        Ok(best)
    }
}

impl GeometryOracle for LinearOracle {
    fn curve_length(&self, geom: &GeometryStore, curve: CurveId) -> Result<f64> {
        let [a, b] = geom.curve_ends(curve)?;
        let length = (b - a).norm();
        if length < TOLERANCE {
            return Err(failed("curve_length", geom, GeomRef::Curve(curve), "degenerate curve").into());
        }
        Ok(length)
    }

    fn point_on_curve(&self, geom: &GeometryStore, curve: CurveId, t: f64) -> Result<Point3> {
        let [a, b] = geom.curve_ends(curve)?;
        Ok(a + (b - a) * t.clamp(0.0, 1.0))
    }

    fn project(&self, geom: &GeometryStore, target: GeomRef, point: &Point3) -> Result<Point3> {
        match target {
            GeomRef::Point(id) => Ok(geom.point(id)?.point),
            GeomRef::Curve(id) => {
                let [a, b] = geom.curve_ends(id)?;
                Ok(project_on_segment(point, &a, &b).0)
            }
            GeomRef::Surface(id) => Self::project_on_surface(geom, id, point),
            GeomRef::Volume(id) => Self::project_on_volume(geom, id, point),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn unit_square(geom: &mut GeometryStore) -> SurfaceId {
        let p: Vec<_> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| geom.add_point(Point3::new(x, y, 0.0)))
            .collect();
        let curves = (0..4).map(|i| geom.add_curve(p[i], p[(i + 1) % 4])).collect();
        geom.add_surface(curves)
    }

    #[test]
    fn projects_inside_and_outside_a_square() {
        let mut geom = GeometryStore::new();
        let s = unit_square(&mut geom);
        let oracle = LinearOracle;

        let p = oracle
            .project(&geom, GeomRef::Surface(s), &Point3::new(0.25, 0.5, 3.0))
            .unwrap();
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-12);

        let d = oracle
            .distance(&geom, GeomRef::Surface(s), &Point3::new(2.0, 0.5, 0.0))
            .unwrap();
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn curve_queries() {
        let mut geom = GeometryStore::new();
        let a = geom.add_point(Point3::new(0.0, 0.0, 0.0));
        let b = geom.add_point(Point3::new(4.0, 0.0, 0.0));
        let c = geom.add_curve(a, b);
        let oracle = LinearOracle;
        assert_relative_eq!(oracle.curve_length(&geom, c).unwrap(), 4.0);
        let mid = oracle.point_on_curve(&geom, c, 0.25).unwrap();
        assert_relative_eq!(mid.x, 1.0);
    }

    #[test]
    fn degenerate_curve_is_an_oracle_error() {
        let mut geom = GeometryStore::new();
        let a = geom.add_point(Point3::new(1.0, 1.0, 1.0));
        let b = geom.add_point(Point3::new(1.0, 1.0, 1.0));
        let c = geom.add_curve(a, b);
        let err = LinearOracle.curve_length(&geom, c).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Oracle);
        assert!(err.to_string().contains("Crb0000"));
    }
}
