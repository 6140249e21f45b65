use std::collections::HashSet;

use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::geometry::VolumeId;

use super::edge::EdgeId;
use super::face::FaceId;
use super::vertex::VertexId;
use super::TopologyStore;

slotmap::new_key_type! {
    /// Unique identifier for a block in the topology store.
    pub struct BlockId;
}

/// Data associated with a topological block.
///
/// Corners are indexed `i + 2j + 4k` for the logical position
/// `(i, j, k)` in `{0, 1}^3`. Side `2a + v` is the set of faces covering
/// the block side whose corners have bit `a` equal to `v`; after a
/// neighbour is split a side may be covered by several faces.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    /// Logical corners.
    pub corners: [VertexId; 8],
    /// Faces covering each of the six sides.
    pub sides: [Vec<FaceId>; 6],
    /// Whether the block is meshed as a structured grid.
    pub structured: bool,
    /// Geometric volume the block conforms to.
    pub association: Option<VolumeId>,
}

impl BlockData {
    /// Creates a structured, unassociated block.
    #[must_use]
    pub fn new(corners: [VertexId; 8], sides: [Vec<FaceId>; 6]) -> Self {
        Self {
            corners,
            sides,
            structured: true,
            association: None,
        }
    }

    /// All faces of the block.
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.sides.iter().flatten().copied()
    }

    /// Side covered by `face`, if any.
    #[must_use]
    pub fn side_of(&self, face: FaceId) -> Option<usize> {
        self.sides.iter().position(|side| side.contains(&face))
    }
}

/// Corner indices of block side `side`, in loop order.
#[must_use]
pub fn side_corners(side: usize) -> [usize; 4] {
    let axis = side / 2;
    let bit = (side % 2) << axis;
    let (b, c) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    [
        bit,
        bit | (1 << b),
        bit | (1 << b) | (1 << c),
        bit | (1 << c),
    ]
}

/// The twelve block edges as corner index pairs, grouped by axis.
#[must_use]
pub fn block_edges() -> [(usize, usize); 12] {
    let mut out = [(0, 0); 12];
    let mut n = 0;
    for axis in 0..3 {
        for corner in 0..8 {
            if corner & (1 << axis) == 0 {
                out[n] = (corner, corner | (1 << axis));
                n += 1;
            }
        }
    }
    out
}

/// The two sides sharing the block edge between corners `c1` and `c2`.
#[must_use]
pub fn sides_of_block_edge(c1: usize, c2: usize) -> [usize; 2] {
    let axis = (c1 ^ c2).trailing_zeros() as usize;
    let others: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
    [
        2 * others[0] + ((c1 >> others[0]) & 1),
        2 * others[1] + ((c1 >> others[1]) & 1),
    ]
}

impl TopologyStore {
    /// Edges lying on a side of a block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block or one of its faces is missing.
    pub fn block_side_edges(&self, block: BlockId, side: usize) -> Result<HashSet<EdgeId>> {
        let data = self.block(block)?;
        let mut out = HashSet::new();
        for &f in &data.sides[side] {
            out.extend(self.face(f)?.edges());
        }
        Ok(out)
    }

    /// Chain of edges along the block edge from corner `c1` to corner
    /// `c2`, in traversal order. Empty if both corners coincide.
    ///
    /// # Errors
    ///
    /// Returns an error if the corners are not adjacent or the chain is
    /// broken.
    pub fn block_chain(&self, block: BlockId, c1: usize, c2: usize) -> Result<Vec<EdgeId>> {
        if (c1 ^ c2).count_ones() != 1 || c1 >= 8 || c2 >= 8 {
            return Err(IntegrityError::Inconsistent(format!(
                "corners {c1} and {c2} of {} are not adjacent",
                self.name_block(block)
            ))
            .into());
        }
        let data = self.block(block)?;
        let (start, end) = (data.corners[c1], data.corners[c2]);
        if start == end {
            return Ok(Vec::new());
        }
        let [s1, s2] = sides_of_block_edge(c1, c2);
        let first = self.block_side_edges(block, s1)?;
        let second = self.block_side_edges(block, s2)?;
        let candidates: Vec<EdgeId> = first.intersection(&second).copied().collect();

        let mut chain = Vec::new();
        let mut used: HashSet<EdgeId> = HashSet::new();
        let mut current = start;
        while current != end {
            let next = candidates.iter().copied().find(|e| {
                !used.contains(e) && self.edge(*e).is_ok_and(|d| d.has_vertex(current))
            });
            let Some(e) = next else {
                return Err(IntegrityError::Inconsistent(format!(
                    "broken edge chain between corners {c1} and {c2} of {}",
                    self.name_block(block)
                ))
                .into());
            };
            used.insert(e);
            chain.push(e);
            current = self.edge(e)?.other(current).unwrap_or(current);
        }
        Ok(chain)
    }

    /// Checks that the four parallel edge chains of each block direction
    /// carry the same number of mesh edges. Degenerate chains are exempt.
    ///
    /// # Errors
    ///
    /// Returns a feasibility error naming the block and both counts.
    pub fn check_block_discretization(&self, block: BlockId) -> Result<()> {
        if !self.block(block)?.structured {
            return Ok(());
        }
        let edges = block_edges();
        for axis in 0..3 {
            let mut reference: Option<(usize, usize)> = None;
            for &(c1, c2) in &edges[axis * 4..axis * 4 + 4] {
                let chain = self.block_chain(block, c1, c2)?;
                if chain.is_empty() {
                    continue;
                }
                let count = self.chain_count(&chain)?;
                match reference {
                    None => reference = Some((c1, count)),
                    Some((r, expected)) if expected != count => {
                        let name = self.name_block(block);
                        return Err(FeasibilityError::DiscretizationMismatch {
                            first: format!("{name} edge from corner {r}"),
                            first_count: expected,
                            second: format!("{name} edge from corner {c1}"),
                            second_count: count,
                        }
                        .into());
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Mesh-edge counts of a block along its three directions.
    ///
    /// # Errors
    ///
    /// Returns an error if the block or one of its entities is missing.
    pub fn block_counts(&self, block: BlockId) -> Result<[usize; 3]> {
        let edges = block_edges();
        let mut out = [0; 3];
        for (axis, count) in out.iter_mut().enumerate() {
            for &(c1, c2) in &edges[axis * 4..axis * 4 + 4] {
                let chain = self.block_chain(block, c1, c2)?;
                if !chain.is_empty() {
                    *count = self.chain_count(&chain)?;
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Every edge of a block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block or one of its faces is missing.
    pub fn block_all_edges(&self, block: BlockId) -> Result<HashSet<EdgeId>> {
        let mut out = HashSet::new();
        for side in 0..6 {
            out.extend(self.block_side_edges(block, side)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_corners_share_the_side_bit() {
        for side in 0..6 {
            let axis = side / 2;
            let v = side % 2;
            for c in side_corners(side) {
                assert_eq!((c >> axis) & 1, v);
            }
        }
        assert_eq!(side_corners(4), [0, 1, 3, 2]);
        assert_eq!(side_corners(5), [4, 5, 7, 6]);
    }

    #[test]
    fn block_edges_are_axis_aligned() {
        let edges = block_edges();
        for (n, (a, b)) in edges.iter().enumerate() {
            assert_eq!(a ^ b, 1 << (n / 4));
        }
    }

    #[test]
    fn block_edge_sides() {
        // corners 0 and 1 lie on the j = 0 and k = 0 sides
        assert_eq!(sides_of_block_edge(0, 1), [2, 4]);
        assert_eq!(sides_of_block_edge(6, 7), [3, 5]);
    }
}
