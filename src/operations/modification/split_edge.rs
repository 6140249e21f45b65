use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{Result, ValidationError};
use crate::topology::{EdgeId, TopoRef, VertexId};

use super::rewire::subdivide_edge;

/// Fails unless `ratio` lies strictly between 0 and 1.
pub(crate) fn check_ratio(parameter: &'static str, ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio < 1.0 {
        Ok(())
    } else {
        Err(ValidationError::ParameterOutOfRange {
            parameter,
            value: ratio,
            min: 0.0,
            max: 1.0,
        }
        .into())
    }
}

/// Mesh node closest to `ratio` on an edge of `n` mesh edges, never an
/// end node when the edge has an interior one.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn node_index(ratio: f64, n: usize) -> usize {
    let k = (ratio * n as f64).round() as usize;
    k.max(1).min(n.saturating_sub(1))
}

/// Cuts an edge in two at the mesh node nearest to `ratio`, measured
/// from its first vertex. Faces using the edge get both halves on the
/// same side, so their discretization is unchanged.
pub struct SplitEdge {
    edge: EdgeId,
    ratio: f64,
}

impl SplitEdge {
    /// Creates a new `SplitEdge` command.
    #[must_use]
    pub fn new(edge: EdgeId, ratio: f64) -> Self {
        Self { edge, ratio }
    }
}

impl Command for SplitEdge {
    type Output = VertexId;

    fn description(&self) -> String {
        format!("split edge at {}", self.ratio)
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<VertexId> {
        check_ratio("ratio", self.ratio)?;
        let n = ctx.model.topo.edge(self.edge)?.nb_edges();
        let (v, _) = subdivide_edge(ctx, self.edge, node_index(self.ratio, n))?;
        debug!(vertex = %ctx.model.topo.name(TopoRef::Vertex(v)), "edge split");
        Ok(v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Point3;
    use crate::model::EntityRef;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};

    #[test]
    fn node_index_stays_inside() {
        assert_eq!(node_index(0.5, 10), 5);
        assert_eq!(node_index(0.01, 10), 1);
        assert_eq!(node_index(0.99, 10), 9);
        assert_eq!(node_index(0.5, 1), 0);
    }

    #[test]
    fn split_edge_of_a_block_keeps_it_structured() {
        let mut session = Session::default();
        let block = session
            .execute(&NewBoxWithTopo::new(
                Point3::origin(),
                Point3::new(1.0, 1.0, 1.0),
                [4, 4, 4],
                None,
            ))
            .unwrap();
        let edge = session.model().topo().block_chain(block, 0, 1).unwrap()[0];
        session.execute(&SplitEdge::new(edge, 0.25)).unwrap();
        let model = session.model();
        assert_eq!(model.nb_edges(), 13);
        let chain = model.topo().block_chain(block, 0, 1).unwrap();
        assert_eq!(chain.len(), 2);
        for e in &chain {
            assert!(model.topo().association(TopoRef::Edge(*e)).is_some());
        }
        assert_eq!(model.topo().block_counts(block).unwrap(), [4, 4, 4]);
        model.topo().check_block_discretization(block).unwrap();
    }

    #[test]
    fn halves_keep_the_groups() {
        let mut session = Session::default();
        session.execute(&NewFreeTopo::new(2, None)).unwrap();
        let (edge, _) = session.model().topo().edges().next().unwrap();
        session
            .execute(&crate::group::AddToGroup::new(
                vec![EntityRef::Topo(TopoRef::Edge(edge))],
                1,
                "E",
            ))
            .unwrap();
        session.execute(&SplitEdge::new(edge, 0.5)).unwrap();
        assert_eq!(session.model().group_members(1, "E").unwrap().len(), 2);
    }

    #[test]
    fn ratio_must_fall_inside_the_edge() {
        let mut session = Session::default();
        session.execute(&NewFreeTopo::new(2, None)).unwrap();
        let (edge, _) = session.model().topo().edges().next().unwrap();
        let err = session.execute(&SplitEdge::new(edge, 1.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(session.model().nb_edges(), 4);
    }
}
