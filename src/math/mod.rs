/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Returns the barycenter of a set of points, or `None` when empty.
#[must_use]
pub fn centroid<'a, I>(points: I) -> Option<Point3>
where
    I: IntoIterator<Item = &'a Point3>,
{
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for p in points {
        sum += p.coords;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(Point3::from(sum / count as f64))
}

/// Newell normal of a polygon. Returns `None` for degenerate polygons.
#[must_use]
pub fn polygon_normal(points: &[Point3]) -> Option<Vector3> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let mut normal = Vector3::zeros();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    let len = normal.norm();
    (len > TOLERANCE).then(|| normal / len)
}

/// Removes from `v` its components along each of `directions`.
///
/// The directions are orthonormalized first, so nearly parallel
/// constraints do not remove the same component twice.
#[must_use]
pub fn remove_components(v: &Vector3, directions: &[Vector3]) -> Vector3 {
    let mut basis: Vec<Vector3> = Vec::with_capacity(directions.len());
    for d in directions {
        let mut u = *d;
        for b in &basis {
            u -= b * u.dot(b);
        }
        let len = u.norm();
        if len > 1e-6 {
            basis.push(u / len);
        }
    }
    let mut out = *v;
    for b in &basis {
        out -= b * out.dot(b);
    }
    out
}

/// Closest point to `p` on the segment `[a, b]`, with its parameter in `[0, 1]`.
#[must_use]
pub fn project_on_segment(p: &Point3, a: &Point3, b: &Point3) -> (Point3, f64) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < TOLERANCE * TOLERANCE {
        return (*a, 0.0);
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (a + ab * t, t)
}
