use std::collections::HashMap;

use crate::error::{FeasibilityError, Result};
use crate::math::{Point3, Vector3};
use crate::model::Model;
use crate::topology::{TopoRef, VertexId};

/// Corner-level Euler characteristic of a selection, and what each of
/// its connected parts must contribute: 1 for a disk of faces, 2 for
/// the sphere bounding a solid part of blocks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contact {
    pub(crate) euler: i64,
    pub(crate) per_part: i64,
}

/// Connected part index of each item, items being connected through
/// `links`.
pub(crate) fn components<T: Copy + PartialEq>(items: &[T], links: &[(T, T)]) -> Vec<usize> {
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    let mut parent: Vec<usize> = (0..items.len()).collect();
    for (a, b) in links {
        let (Some(i), Some(j)) = (
            items.iter().position(|x| x == a),
            items.iter().position(|x| x == b),
        ) else {
            continue;
        };
        let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
        parent[ri] = rj;
    }
    let mut labels: HashMap<usize, usize> = HashMap::new();
    (0..items.len())
        .map(|i| {
            let r = root(&mut parent, i);
            let next = labels.len();
            *labels.entry(r).or_insert(next)
        })
        .collect()
}

/// Rejects selections whose parts touch without being glued, or whose
/// parts are not simply connected.
///
/// `corners[i]` holds the corner vertices of `entities[i]`, which
/// belongs to part `parts[i]`.
pub(crate) fn check_components(
    model: &Model,
    tolerance: f64,
    entities: &[TopoRef],
    corners: &[Vec<VertexId>],
    parts: &[usize],
    contact: Contact,
) -> Result<()> {
    let topo = &model.topo;
    let infeasible = |reason: String| FeasibilityError::OgridInfeasible {
        entities: entities
            .iter()
            .map(|e| topo.name(*e))
            .collect::<Vec<_>>()
            .join(", "),
        reason,
    };

    let mut part_of: HashMap<VertexId, usize> = HashMap::new();
    for (vertices, &part) in corners.iter().zip(parts) {
        for &v in vertices {
            match part_of.insert(v, part) {
                Some(other) if other != part => {
                    return Err(infeasible(format!(
                        "{} is shared by parts that are not glued along a whole side",
                        topo.name(TopoRef::Vertex(v))
                    ))
                    .into());
                }
                _ => {}
            }
        }
    }

    let mut located: Vec<(VertexId, usize, Point3)> = Vec::with_capacity(part_of.len());
    for (&v, &part) in &part_of {
        located.push((v, part, topo.position(v)?));
    }
    located.sort_by_key(|(v, _, _)| *v);
    for (i, (a, part_a, pa)) in located.iter().enumerate() {
        for (b, part_b, pb) in &located[i + 1..] {
            if part_a != part_b && (pa - pb).norm() <= tolerance {
                return Err(infeasible(format!(
                    "{} and {} touch without being glued",
                    topo.name(TopoRef::Vertex(*a)),
                    topo.name(TopoRef::Vertex(*b))
                ))
                .into());
            }
        }
    }

    let nb_parts = parts.iter().max().map_or(0, |m| m + 1);
    #[allow(clippy::cast_possible_wrap)]
    let expected = contact.per_part * nb_parts as i64;
    if contact.euler != expected {
        return Err(infeasible(format!(
            "Euler characteristic is {}, expected {expected} for {nb_parts} simply connected parts",
            contact.euler
        ))
        .into());
    }
    Ok(())
}

/// Core position of a corner at `p`, averaged over the cells around it
/// whose centers are given. `ratio` runs from the center (0) to the
/// corner (1).
pub(crate) fn inner_position(p: &Point3, centers: &[Point3], ratio: f64) -> Point3 {
    if centers.is_empty() {
        return *p;
    }
    let mut sum = Vector3::zeros();
    for c in centers {
        sum += (c + (p - c) * ratio).coords;
    }
    #[allow(clippy::cast_precision_loss)]
    Point3::from(sum / centers.len() as f64)
}
