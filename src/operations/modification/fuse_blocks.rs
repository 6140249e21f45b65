use std::collections::BTreeSet;

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::model::Model;
use crate::topology::block::side_corners;
use crate::topology::{BlockData, BlockId, FaceId, TopoRef};

use super::rewire::{hand_over, retire_unused};

fn check_fusable(model: &Model, block: BlockId) -> Result<BlockData> {
    let topo = &model.topo;
    let data = topo.block(block)?.clone();
    if !data.structured {
        return Err(FeasibilityError::NotStructured {
            entity: topo.name(TopoRef::Block(block)),
        }
        .into());
    }
    let distinct: BTreeSet<_> = data.corners.iter().collect();
    if distinct.len() != 8 {
        return Err(FeasibilityError::Unsupported(format!(
            "{} is degenerate, only hexahedral blocks can be fused",
            topo.name(TopoRef::Block(block))
        ))
        .into());
    }
    Ok(data)
}

/// Side of `a` and side of `b` covered by the same faces.
fn common_side(a: &BlockData, b: &BlockData) -> Option<(usize, usize)> {
    (0..6).find_map(|sa| {
        let faces: BTreeSet<FaceId> = a.sides[sa].iter().copied().collect();
        (0..6)
            .find(|&sb| !faces.is_empty() && b.sides[sb].iter().copied().collect::<BTreeSet<_>>() == faces)
            .map(|sb| (sa, sb))
    })
}

/// Merges two structured blocks sharing a whole side into one block.
///
/// Both blocks must conform to the same volume (or to none). The shared
/// faces disappear; each lateral side of the result is covered by the
/// faces of both blocks.
pub struct FuseBlocks {
    first: BlockId,
    second: BlockId,
}

impl FuseBlocks {
    /// Creates a new `FuseBlocks` command.
    #[must_use]
    pub fn new(first: BlockId, second: BlockId) -> Self {
        Self { first, second }
    }
}

impl Command for FuseBlocks {
    type Output = BlockId;

    fn description(&self) -> String {
        "fuse two blocks".into()
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<BlockId> {
        let a = check_fusable(ctx.model, self.first)?;
        let b = check_fusable(ctx.model, self.second)?;
        let topo = &ctx.model.topo;
        let (name_a, name_b) = (
            topo.name(TopoRef::Block(self.first)),
            topo.name(TopoRef::Block(self.second)),
        );
        if self.first == self.second {
            return Err(FeasibilityError::Unsupported(format!("cannot fuse {name_a} with itself")).into());
        }
        if a.association != b.association {
            return Err(FeasibilityError::Unsupported(format!(
                "{name_a} and {name_b} conform to different volumes"
            ))
            .into());
        }
        let Some((sa, sb)) = common_side(&a, &b) else {
            return Err(FeasibilityError::Unsupported(format!("{name_a} and {name_b} have no common side")).into());
        };
        let (axis_a, bit_a, axis_b) = (sa / 2, sa % 2, sb / 2);
        let index_in_b = |c: usize| {
            b.corners.iter().position(|v| *v == a.corners[c]).ok_or_else(|| {
                IntegrityError::Inconsistent(format!("{name_b} does not hold corner {c} of {name_a}"))
            })
        };

        let mut corners = a.corners;
        for (c, corner) in corners.iter_mut().enumerate() {
            if (c >> axis_a) & 1 == bit_a {
                *corner = b.corners[index_in_b(c)? ^ (1 << axis_b)];
            }
        }

        let mut sides: [Vec<FaceId>; 6] = Default::default();
        for (t, side) in sides.iter_mut().enumerate() {
            if t == sa {
                *side = b.sides[sb ^ 1].clone();
            } else if t == (sa ^ 1) {
                *side = a.sides[t].clone();
            } else {
                // the lateral side of b meeting side t of a along the shared side
                let on_shared: Vec<usize> = side_corners(t)
                    .into_iter()
                    .filter(|c| (c >> axis_a) & 1 == bit_a)
                    .map(&index_in_b)
                    .collect::<Result<_, _>>()?;
                let t_b = (0..6)
                    .find(|&s| s / 2 != axis_b && on_shared.iter().all(|c| side_corners(s).contains(c)))
                    .ok_or_else(|| {
                        IntegrityError::Inconsistent(format!("{name_b} has no side along side {t} of {name_a}"))
                    })?;
                side.clone_from(&a.sides[t]);
                side.extend(b.sides[t_b].iter().copied());
            }
        }

        let shared: Vec<FaceId> = a.sides[sa].clone();
        let mut data = BlockData::new(corners, sides);
        data.association = a.association;
        let fused = ctx.model.topo.add_block(data);
        hand_over(ctx.model, TopoRef::Block(self.first), &[TopoRef::Block(fused)]);
        hand_over(ctx.model, TopoRef::Block(self.second), &[TopoRef::Block(fused)]);
        ctx.model.topo.remove(TopoRef::Block(self.first));
        ctx.model.topo.remove(TopoRef::Block(self.second));

        let mut candidates: Vec<TopoRef> = Vec::new();
        for &f in &shared {
            candidates.push(TopoRef::Face(f));
            candidates.extend(ctx.model.topo.closure(TopoRef::Face(f)));
        }
        let retired = retire_unused(ctx.model, candidates);
        ctx.model.topo.check_block_discretization(fused)?;
        debug!(
            block = %ctx.model.topo.name(TopoRef::Block(fused)),
            retired,
            "blocks fused"
        );
        Ok(fused)
    }
}
