use crate::error::{Result, ValidationError};
use crate::topology::EdgeId;

/// Upper bound of the beta law coefficient.
pub const BETA_MAX: f64 = 1.01;

/// Smallest accepted excess of beta over 1.
///
/// Below this the law is numerically indistinguishable from a wall
/// singularity and is rejected with the same bounds error.
pub const BETA_MIN_EXCESS: f64 = 1e-5;

/// Discretization law of a topological edge.
///
/// Node distributions are expressed as normalized positions in `[0, 1]`
/// measured from the first vertex of the edge.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshingLaw {
    /// Evenly spaced nodes.
    Uniform { nb_edges: usize },
    /// Consecutive arm lengths grow by `ratio`. With `first_size`, the
    /// ratio is solved so the first arm gets that length.
    Geometric {
        nb_edges: usize,
        ratio: f64,
        reversed: bool,
        first_size: Option<f64>,
    },
    /// Boundary-layer clustering toward the first vertex.
    Beta {
        nb_edges: usize,
        beta: f64,
        reversed: bool,
        first_size: Option<f64>,
    },
    /// Exponential growth from a first arm length.
    Exponential {
        nb_edges: usize,
        first_size: f64,
        reversed: bool,
    },
    /// Geometric progressions from both ends, the smaller arm wins.
    Bigeometric {
        nb_edges: usize,
        first_ratio: f64,
        first_size: f64,
        last_ratio: f64,
        last_size: f64,
    },
    /// Two-sided hyperbolic stretching with imposed end arms.
    Hyperbolic {
        nb_edges: usize,
        first_size: f64,
        last_size: f64,
    },
    /// Copies the node distribution of a chain of reference edges.
    Interpolate {
        nb_edges: usize,
        reference: Vec<EdgeId>,
    },
    /// Uniform arms of about `size`; the count is resolved from the edge
    /// length when the law is set.
    SpecificSize { size: f64, nb_edges: usize },
}

fn check_count(nb_edges: usize) -> Result<()> {
    if nb_edges == 0 {
        return Err(ValidationError::InvalidInput("a meshing law needs at least one edge".into()).into());
    }
    Ok(())
}

fn check_positive(parameter: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::ParameterOutOfRange {
            parameter,
            value,
            min: 0.0,
            max: f64::INFINITY,
        }
        .into())
    }
}

fn check_beta(beta: f64) -> Result<()> {
    if beta - 1.0 >= BETA_MIN_EXCESS && beta <= BETA_MAX {
        Ok(())
    } else {
        Err(ValidationError::BetaOutOfRange(beta).into())
    }
}

impl MeshingLaw {
    /// Uniform law.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero.
    pub fn uniform(nb_edges: usize) -> Result<Self> {
        check_count(nb_edges)?;
        Ok(Self::Uniform { nb_edges })
    }

    /// Geometric law with an explicit ratio.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or `ratio` is not positive.
    pub fn geometric(nb_edges: usize, ratio: f64, reversed: bool) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("ratio", ratio)?;
        Ok(Self::Geometric {
            nb_edges,
            ratio,
            reversed,
            first_size: None,
        })
    }

    /// Geometric law whose ratio is solved from the first arm length.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or `first_size` is not positive.
    pub fn geometric_with_first_size(nb_edges: usize, first_size: f64, reversed: bool) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("first_size", first_size)?;
        Ok(Self::Geometric {
            nb_edges,
            ratio: 1.0,
            reversed,
            first_size: Some(first_size),
        })
    }

    /// Beta law. `beta` must lie in `(1, 1.01]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or `beta` is out of bounds.
    pub fn beta(nb_edges: usize, beta: f64, reversed: bool) -> Result<Self> {
        check_count(nb_edges)?;
        check_beta(beta)?;
        Ok(Self::Beta {
            nb_edges,
            beta,
            reversed,
            first_size: None,
        })
    }

    /// Beta law whose coefficient is solved from the first arm length.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or `first_size` is not positive.
    pub fn beta_with_first_size(nb_edges: usize, first_size: f64, reversed: bool) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("first_size", first_size)?;
        Ok(Self::Beta {
            nb_edges,
            beta: BETA_MAX,
            reversed,
            first_size: Some(first_size),
        })
    }

    /// Exponential law.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or `first_size` is not positive.
    pub fn exponential(nb_edges: usize, first_size: f64, reversed: bool) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("first_size", first_size)?;
        Ok(Self::Exponential {
            nb_edges,
            first_size,
            reversed,
        })
    }

    /// Two-sided geometric law.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or a size or ratio is not
    /// positive.
    pub fn bigeometric(
        nb_edges: usize,
        first_ratio: f64,
        first_size: f64,
        last_ratio: f64,
        last_size: f64,
    ) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("first_ratio", first_ratio)?;
        check_positive("first_size", first_size)?;
        check_positive("last_ratio", last_ratio)?;
        check_positive("last_size", last_size)?;
        Ok(Self::Bigeometric {
            nb_edges,
            first_ratio,
            first_size,
            last_ratio,
            last_size,
        })
    }

    /// Two-sided hyperbolic law.
    ///
    /// # Errors
    ///
    /// Returns an error if `nb_edges` is zero or a size is not positive.
    pub fn hyperbolic(nb_edges: usize, first_size: f64, last_size: f64) -> Result<Self> {
        check_count(nb_edges)?;
        check_positive("first_size", first_size)?;
        check_positive("last_size", last_size)?;
        Ok(Self::Hyperbolic {
            nb_edges,
            first_size,
            last_size,
        })
    }

    /// Interpolation of a reference chain. The count is filled in when
    /// the law is set on an edge.
    ///
    /// # Errors
    ///
    /// Returns an error if `reference` is empty.
    pub fn interpolate(reference: Vec<EdgeId>) -> Result<Self> {
        if reference.is_empty() {
            return Err(ValidationError::InvalidInput("interpolation needs reference edges".into()).into());
        }
        Ok(Self::Interpolate {
            nb_edges: 0,
            reference,
        })
    }

    /// Target arm size. The count is filled in when the law is set.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is not positive.
    pub fn specific_size(size: f64) -> Result<Self> {
        check_positive("size", size)?;
        Ok(Self::SpecificSize { size, nb_edges: 0 })
    }

    /// Number of mesh edges.
    #[must_use]
    pub fn nb_edges(&self) -> usize {
        match self {
            Self::Uniform { nb_edges }
            | Self::Geometric { nb_edges, .. }
            | Self::Beta { nb_edges, .. }
            | Self::Exponential { nb_edges, .. }
            | Self::Bigeometric { nb_edges, .. }
            | Self::Hyperbolic { nb_edges, .. }
            | Self::Interpolate { nb_edges, .. }
            | Self::SpecificSize { nb_edges, .. } => *nb_edges,
        }
    }

    /// Short name of the law kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Uniform { .. } => "uniform",
            Self::Geometric { .. } => "geometric",
            Self::Beta { .. } => "beta",
            Self::Exponential { .. } => "exponential",
            Self::Bigeometric { .. } => "bigeometric",
            Self::Hyperbolic { .. } => "hyperbolic",
            Self::Interpolate { .. } => "interpolate",
            Self::SpecificSize { .. } => "specific size",
        }
    }

    /// Same law with another count. Laws whose shape depends on the count
    /// keep their parameters.
    #[must_use]
    pub fn with_nb_edges(&self, n: usize) -> Self {
        let mut law = self.clone();
        match &mut law {
            Self::Uniform { nb_edges }
            | Self::Geometric { nb_edges, .. }
            | Self::Beta { nb_edges, .. }
            | Self::Exponential { nb_edges, .. }
            | Self::Bigeometric { nb_edges, .. }
            | Self::Hyperbolic { nb_edges, .. }
            | Self::Interpolate { nb_edges, .. }
            | Self::SpecificSize { nb_edges, .. } => *nb_edges = n,
        }
        law
    }

    /// Same law traversed from the other end.
    #[must_use]
    pub fn reversed(&self) -> Self {
        match self {
            Self::Geometric {
                nb_edges,
                ratio,
                reversed,
                first_size,
            } => Self::Geometric {
                nb_edges: *nb_edges,
                ratio: *ratio,
                reversed: !reversed,
                first_size: *first_size,
            },
            Self::Beta {
                nb_edges,
                beta,
                reversed,
                first_size,
            } => Self::Beta {
                nb_edges: *nb_edges,
                beta: *beta,
                reversed: !reversed,
                first_size: *first_size,
            },
            Self::Exponential {
                nb_edges,
                first_size,
                reversed,
            } => Self::Exponential {
                nb_edges: *nb_edges,
                first_size: *first_size,
                reversed: !reversed,
            },
            Self::Bigeometric {
                nb_edges,
                first_ratio,
                first_size,
                last_ratio,
                last_size,
            } => Self::Bigeometric {
                nb_edges: *nb_edges,
                first_ratio: *last_ratio,
                first_size: *last_size,
                last_ratio: *first_ratio,
                last_size: *first_size,
            },
            Self::Hyperbolic {
                nb_edges,
                first_size,
                last_size,
            } => Self::Hyperbolic {
                nb_edges: *nb_edges,
                first_size: *last_size,
                last_size: *first_size,
            },
            other => other.clone(),
        }
    }

    /// Laws of the two parts of an edge cut after `k` mesh edges.
    ///
    /// Uniform and geometric laws keep their shape; the others fall back
    /// to uniform parts since their parameters describe the whole edge.
    #[must_use]
    pub fn split_at(&self, k: usize) -> (Self, Self) {
        let n = self.nb_edges();
        let k = k.min(n);
        match self {
            Self::Geometric {
                ratio,
                reversed,
                first_size: None,
                ..
            } => (
                Self::Geometric {
                    nb_edges: k,
                    ratio: *ratio,
                    reversed: *reversed,
                    first_size: None,
                },
                Self::Geometric {
                    nb_edges: n - k,
                    ratio: *ratio,
                    reversed: *reversed,
                    first_size: None,
                },
            ),
            Self::SpecificSize { size, .. } => (
                Self::SpecificSize {
                    size: *size,
                    nb_edges: k,
                },
                Self::SpecificSize {
                    size: *size,
                    nb_edges: n - k,
                },
            ),
            _ => (Self::Uniform { nb_edges: k }, Self::Uniform { nb_edges: n - k }),
        }
    }

    /// Normalized node positions for an edge of the given length.
    ///
    /// Returns `nb_edges + 1` increasing values from 0 to 1. Laws driven
    /// by a target arm size solve for their free coefficient and settle
    /// for the nearest achievable distribution when the target cannot be
    /// met exactly. [`MeshingLaw::Interpolate`] needs its reference chain
    /// and is resolved by the meshing resolver; here it falls back to a
    /// uniform distribution.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distribution(&self, length: f64) -> Vec<f64> {
        let n = self.nb_edges().max(1);
        let nf = n as f64;
        let positions: Vec<f64> = match self {
            Self::Uniform { .. } | Self::Interpolate { .. } | Self::SpecificSize { .. } => {
                (0..=n).map(|i| i as f64 / nf).collect()
            }
            Self::Geometric {
                ratio,
                reversed,
                first_size,
                ..
            } => {
                let r = match first_size {
                    Some(size) => solve_geometric_ratio(n, size / length),
                    None => *ratio,
                };
                orient(geometric_positions(n, r), *reversed)
            }
            Self::Beta {
                beta,
                reversed,
                first_size,
                ..
            } => {
                let b = match first_size {
                    Some(size) => solve_beta(n, size / length),
                    None => *beta,
                };
                orient((0..=n).map(|i| beta_stretch(i as f64 / nf, b)).collect(), *reversed)
            }
            Self::Exponential {
                first_size,
                reversed,
                ..
            } => {
                let a = solve_exponential(n, first_size / length);
                orient(exponential_positions(n, a), *reversed)
            }
            Self::Bigeometric {
                first_ratio,
                first_size,
                last_ratio,
                last_size,
                ..
            } => bigeometric_positions(n, *first_ratio, *first_size, *last_ratio, *last_size),
            Self::Hyperbolic {
                first_size,
                last_size,
                ..
            } => hyperbolic_positions(n, first_size / length, last_size / length),
        };
        normalize(positions)
    }
}

/// Mirrors a distribution so that it is read from the last vertex.
fn orient(positions: Vec<f64>, reversed: bool) -> Vec<f64> {
    if reversed {
        positions.iter().rev().map(|x| 1.0 - x).collect()
    } else {
        positions
    }
}

/// Pins both ends and clamps round-off.
fn normalize(mut positions: Vec<f64>) -> Vec<f64> {
    if let Some(first) = positions.first_mut() {
        *first = 0.0;
    }
    if let Some(last) = positions.last_mut() {
        *last = 1.0;
    }
    for x in &mut positions {
        *x = x.clamp(0.0, 1.0);
    }
    positions
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn geometric_positions(n: usize, r: f64) -> Vec<f64> {
    if (r - 1.0).abs() < 1e-12 {
        return (0..=n).map(|i| i as f64 / n as f64).collect();
    }
    let total = r.powi(n as i32) - 1.0;
    (0..=n).map(|i| (r.powi(i as i32) - 1.0) / total).collect()
}

/// Fraction of the edge taken by the first arm of a geometric law.
fn geometric_first_fraction(n: usize, r: f64) -> f64 {
    geometric_positions(n, r).get(1).copied().unwrap_or(1.0)
}

/// Bisection on a monotonic function over `[lo, hi]`; returns the bound
/// closest to the target when it is out of reach.
fn bisect<F: Fn(f64) -> f64>(f: F, target: f64, mut lo: f64, mut hi: f64) -> f64 {
    let decreasing = f(lo) > f(hi);
    let below = |x: f64| if decreasing { f(x) > target } else { f(x) < target };
    if !below(lo) {
        return lo;
    }
    if below(hi) {
        return hi;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if below(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

fn solve_geometric_ratio(n: usize, fraction: f64) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    bisect(|r| geometric_first_fraction(n, r), fraction, 1e-3, 1e3)
}

/// Boundary-layer stretching function of the beta law.
fn beta_stretch(eta: f64, beta: f64) -> f64 {
    let ratio = (beta + 1.0) / (beta - 1.0);
    let power = (ratio.ln() * (1.0 - eta)).exp();
    1.0 + beta * (1.0 - power) / (1.0 + power)
}

#[allow(clippy::cast_precision_loss)]
fn solve_beta(n: usize, fraction: f64) -> f64 {
    let eta = 1.0 / n as f64;
    bisect(|b| beta_stretch(eta, b), fraction, 1.000_000_1, 2.0)
}

#[allow(clippy::cast_precision_loss)]
fn exponential_positions(n: usize, a: f64) -> Vec<f64> {
    if a.abs() < 1e-12 {
        return (0..=n).map(|i| i as f64 / n as f64).collect();
    }
    let total = a.exp_m1();
    (0..=n).map(|i| (a * i as f64 / n as f64).exp_m1() / total).collect()
}

fn solve_exponential(n: usize, fraction: f64) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    bisect(
        |a| exponential_positions(n, a).get(1).copied().unwrap_or(1.0),
        fraction,
        -20.0,
        20.0,
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn bigeometric_positions(
    n: usize,
    first_ratio: f64,
    first_size: f64,
    last_ratio: f64,
    last_size: f64,
) -> Vec<f64> {
    let arms: Vec<f64> = (0..n)
        .map(|i| {
            let from_start = first_size * first_ratio.powi(i as i32);
            let from_end = last_size * last_ratio.powi((n - 1 - i) as i32);
            from_start.min(from_end)
        })
        .collect();
    let total: f64 = arms.iter().sum();
    let mut positions = Vec::with_capacity(n + 1);
    let mut acc = 0.0;
    positions.push(0.0);
    for arm in arms {
        acc += arm / total;
        positions.push(acc);
    }
    positions
}

/// Two-sided stretching after Vinokur.
#[allow(clippy::cast_precision_loss)]
fn hyperbolic_positions(n: usize, first_fraction: f64, last_fraction: f64) -> Vec<f64> {
    let nf = n as f64;
    let s0 = 1.0 / (nf * first_fraction);
    let s1 = 1.0 / (nf * last_fraction);
    let a = (s0 / s1).sqrt();
    let b = (s0 * s1).sqrt();
    let stretch: Box<dyn Fn(f64) -> f64> = if (b - 1.0).abs() < 1e-6 {
        Box::new(|xi| xi)
    } else if b > 1.0 {
        let delta = bisect(|d| d.sinh() / d, b, 1e-6, 50.0);
        Box::new(move |xi| 0.5 * (1.0 + (delta * (xi - 0.5)).tanh() / (0.5 * delta).tanh()))
    } else {
        let delta = bisect(|d| d.sin() / d, b, 1e-6, std::f64::consts::PI - 1e-6);
        Box::new(move |xi| 0.5 * (1.0 + (delta * (xi - 0.5)).tan() / (0.5 * delta).tan()))
    };
    (0..=n)
        .map(|i| {
            let u = stretch(i as f64 / nf);
            u / (a + (1.0 - a) * u)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn increasing(p: &[f64]) -> bool {
        p.windows(2).all(|w| w[1] > w[0])
    }

    #[test]
    fn beta_bounds() {
        for beta in [1.000_005, 1.02, 1.0, 0.5] {
            let err = MeshingLaw::beta(10, beta, false).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(err.to_string().starts_with("beta must be in (1, 1.01]"));
        }
        assert!(MeshingLaw::beta(10, 1.01, false).is_ok());
        assert!(MeshingLaw::beta(10, 1.001, true).is_ok());
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(MeshingLaw::uniform(0).is_err());
        assert!(MeshingLaw::geometric(0, 1.2, false).is_err());
    }

    #[test]
    fn uniform_distribution() {
        let p = MeshingLaw::uniform(4).unwrap().distribution(2.0);
        assert_eq!(p, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn geometric_ratio_is_respected() {
        let p = MeshingLaw::geometric(3, 2.0, false).unwrap().distribution(1.0);
        assert_relative_eq!(p[1], 1.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 3.0 / 7.0, epsilon = 1e-12);
        let r = MeshingLaw::geometric(3, 2.0, true).unwrap().distribution(1.0);
        assert_relative_eq!(r[1], 4.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn geometric_first_size_is_solved() {
        let p = MeshingLaw::geometric_with_first_size(10, 0.05, false)
            .unwrap()
            .distribution(2.0);
        assert_relative_eq!(p[1] * 2.0, 0.05, epsilon = 1e-6);
        assert!(increasing(&p));
    }

    #[test]
    fn beta_clusters_and_is_monotonic() {
        let p = MeshingLaw::beta(10, 1.01, false).unwrap().distribution(1.0);
        assert_eq!(p.len(), 11);
        assert!(increasing(&p));
        assert!(p[1] < 0.1);
    }

    #[test]
    fn unreachable_first_size_is_best_effort() {
        // a first arm longer than the edge cannot be honoured
        let p = MeshingLaw::exponential(5, 10.0, false).unwrap().distribution(1.0);
        assert_eq!(p.len(), 6);
        assert!(increasing(&p));
    }

    #[test]
    fn two_sided_laws() {
        let p = MeshingLaw::bigeometric(8, 1.2, 0.01, 1.2, 0.01)
            .unwrap()
            .distribution(1.0);
        assert!(increasing(&p));
        assert_relative_eq!(p[1], 1.0 - p[7], epsilon = 1e-12);

        let h = MeshingLaw::hyperbolic(10, 0.02, 0.02).unwrap().distribution(1.0);
        assert!(increasing(&h));
        assert!(h[1] < 0.05);
        assert_relative_eq!(h[1], 1.0 - h[9], epsilon = 1e-9);
    }

    #[test]
    fn split_keeps_geometric_ratio() {
        let law = MeshingLaw::geometric(10, 1.1, false).unwrap();
        let (a, b) = law.split_at(4);
        assert_eq!(a.nb_edges(), 4);
        assert_eq!(b.nb_edges(), 6);
        assert_eq!(a.kind(), "geometric");

        let (c, d) = MeshingLaw::beta(10, 1.01, false).unwrap().split_at(3);
        assert_eq!(c, MeshingLaw::Uniform { nb_edges: 3 });
        assert_eq!(d, MeshingLaw::Uniform { nb_edges: 7 });
    }
}
