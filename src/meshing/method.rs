use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result};
use crate::topology::{BlockId, FaceId, TopoRef};

/// How the cells of a face or a block are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshingMethod {
    /// Logical grid: opposite sides carry the same number of mesh edges.
    Structured,
    /// Free cells; side counts are independent.
    Unstructured,
}

impl MeshingMethod {
    fn is_structured(self) -> bool {
        self == Self::Structured
    }
}

/// Switches faces between structured and unstructured meshing.
///
/// A face bounding a structured block stays structured. Making a face
/// structured requires its opposite sides to agree.
pub struct SetFaceMeshingMethod {
    method: MeshingMethod,
    faces: Vec<FaceId>,
}

impl SetFaceMeshingMethod {
    /// Creates a new `SetFaceMeshingMethod` command.
    #[must_use]
    pub fn new(method: MeshingMethod, faces: Vec<FaceId>) -> Self {
        Self { method, faces }
    }
}

impl Command for SetFaceMeshingMethod {
    type Output = ();

    fn description(&self) -> String {
        format!("set {:?} meshing on {} faces", self.method, self.faces.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let topo = &mut ctx.model.topo;
        for &f in &self.faces {
            topo.face(f)?;
            if !self.method.is_structured() {
                let holder = topo
                    .blocks_using_face(f)
                    .into_iter()
                    .find(|b| topo.block(*b).is_ok_and(|data| data.structured));
                if let Some(b) = holder {
                    return Err(FeasibilityError::Unsupported(format!(
                        "{} bounds the structured block {} and must stay structured",
                        topo.name(TopoRef::Face(f)),
                        topo.name(TopoRef::Block(b))
                    ))
                    .into());
                }
            }
            topo.face_mut(f)?.structured = self.method.is_structured();
            topo.check_face_discretization(f)?;
        }
        debug!(faces = self.faces.len(), method = ?self.method, "face meshing method set");
        Ok(())
    }
}

/// Switches blocks between structured and unstructured meshing.
///
/// A block can only become structured when every face on its sides is
/// structured and its parallel edges agree.
pub struct SetBlockMeshingMethod {
    method: MeshingMethod,
    blocks: Vec<BlockId>,
}

impl SetBlockMeshingMethod {
    /// Creates a new `SetBlockMeshingMethod` command.
    #[must_use]
    pub fn new(method: MeshingMethod, blocks: Vec<BlockId>) -> Self {
        Self { method, blocks }
    }
}

impl Command for SetBlockMeshingMethod {
    type Output = ();

    fn description(&self) -> String {
        format!("set {:?} meshing on {} blocks", self.method, self.blocks.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let topo = &mut ctx.model.topo;
        for &b in &self.blocks {
            let data = topo.block(b)?;
            if self.method.is_structured() {
                let loose = data
                    .faces()
                    .find(|f| topo.face(*f).is_ok_and(|face| !face.structured));
                if let Some(f) = loose {
                    return Err(FeasibilityError::Unsupported(format!(
                        "{} cannot be structured: its face {} is not",
                        topo.name(TopoRef::Block(b)),
                        topo.name(TopoRef::Face(f))
                    ))
                    .into());
                }
            }
            topo.block_mut(b)?.structured = self.method.is_structured();
            topo.check_block_discretization(b)?;
        }
        debug!(blocks = self.blocks.len(), method = ?self.method, "block meshing method set");
        Ok(())
    }
}
