use crate::math::{Point3, Vector3};

use super::FaceMesh;

/// Side nodes resampled to `count` entries. A degenerate side holds a
/// single node, repeated.
fn stretched(nodes: &[Point3], count: usize) -> Vec<Point3> {
    if nodes.len() == 1 {
        vec![nodes[0]; count]
    } else {
        nodes.to_vec()
    }
}

/// Transfinite (Coons) interpolation of the four sides of a structured
/// face. `sides[s]` runs from corner `s` to corner `s + 1`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(super) fn transfinite(sides: &[Vec<Point3>; 4]) -> FaceMesh {
    let ni = sides[0].len().max(sides[2].len()) - 1;
    let nj = sides[1].len().max(sides[3].len()) - 1;
    let bottom = stretched(&sides[0], ni + 1);
    let right = stretched(&sides[1], nj + 1);
    let mut top = stretched(&sides[2], ni + 1);
    top.reverse();
    let mut left = stretched(&sides[3], nj + 1);
    left.reverse();
    let corners = [bottom[0], bottom[ni], top[ni], top[0]];

    let mut mesh = FaceMesh::default();
    for j in 0..=nj {
        let v = j as f64 / nj as f64;
        for i in 0..=ni {
            let u = i as f64 / ni as f64;
            let edges: Vector3 = bottom[i].coords * (1.0 - v)
                + top[i].coords * v
                + left[j].coords * (1.0 - u)
                + right[j].coords * u;
            let bilinear: Vector3 = corners[0].coords * ((1.0 - u) * (1.0 - v))
                + corners[1].coords * (u * (1.0 - v))
                + corners[2].coords * (u * v)
                + corners[3].coords * ((1.0 - u) * v);
            mesh.nodes.push(Point3::from(edges - bilinear));
        }
    }
    let index = |i: usize, j: usize| (j * (ni + 1) + i) as u32;
    for j in 0..nj {
        for i in 0..ni {
            mesh.quads
                .push([index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1)]);
        }
    }
    mesh
}
