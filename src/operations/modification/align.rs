use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::math::{project_on_segment, Point3, TOLERANCE};
use crate::model::{EntityRef, Model};
use crate::topology::{TopoRef, VertexId};

/// Where the aligned vertices go.
#[derive(Debug, Clone, Copy)]
enum Line {
    /// Segment between two given points.
    Through(Point3, Point3),
    /// Segment between the two ends of the chain the vertices form.
    ChainEnds,
}

/// Moves vertices onto a straight segment.
///
/// Each vertex goes to its closest point on the segment. A vertex whose
/// projection falls on an end of the segment is spread evenly instead, so
/// no two vertices pile up there.
pub struct AlignVertices {
    vertices: Vec<VertexId>,
    line: Line,
}

impl AlignVertices {
    /// Aligns `vertices` on the segment from `start` to `end`.
    #[must_use]
    pub fn on_segment(start: Point3, end: Point3, vertices: Vec<VertexId>) -> Self {
        Self {
            vertices,
            line: Line::Through(start, end),
        }
    }

    /// Aligns the inner vertices of a chain of edges on the segment
    /// joining its two ends. `vertices` must include both ends.
    #[must_use]
    pub fn between_ends(vertices: Vec<VertexId>) -> Self {
        Self {
            vertices,
            line: Line::ChainEnds,
        }
    }
}

/// Both ends of the chain formed by the edges joining two of `vertices`.
fn chain_ends(model: &Model, vertices: &[VertexId]) -> Result<(VertexId, VertexId)> {
    let topo = &model.topo;
    let selected: BTreeSet<VertexId> = vertices.iter().copied().collect();
    let mut degree: BTreeMap<VertexId, usize> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for &v in &selected {
        for e in topo.edges_at(v) {
            let [a, b] = topo.edge(e)?.vertices;
            if selected.contains(&a) && selected.contains(&b) && seen.insert(e) {
                *degree.entry(a).or_default() += 1;
                *degree.entry(b).or_default() += 1;
            }
        }
    }
    let tips: Vec<VertexId> = selected
        .iter()
        .copied()
        .filter(|v| degree.get(v).copied().unwrap_or(0) == 1)
        .collect();
    match tips.as_slice() {
        [first, second] if degree.values().all(|d| *d <= 2) => Ok((*first, *second)),
        _ => Err(FeasibilityError::Unsupported(format!(
            "the {} selected vertices do not form a single chain of edges",
            selected.len()
        ))
        .into()),
    }
}

impl Command for AlignVertices {
    type Output = ();

    fn description(&self) -> String {
        format!("align {} vertices", self.vertices.len())
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        for &v in &self.vertices {
            ctx.model.topo.check(TopoRef::Vertex(v))?;
        }
        let (start, end, moved) = match self.line {
            Line::Through(start, end) => {
                if (end - start).norm() <= TOLERANCE {
                    return Err(ValidationError::InvalidInput("a line needs two distinct points".into()).into());
                }
                (start, end, self.vertices.clone())
            }
            Line::ChainEnds => {
                let (first, second) = chain_ends(ctx.model, &self.vertices)?;
                let moved: Vec<VertexId> = self
                    .vertices
                    .iter()
                    .copied()
                    .filter(|v| *v != first && *v != second)
                    .collect();
                let topo = &ctx.model.topo;
                (topo.position(first)?, topo.position(second)?, moved)
            }
        };
        if moved.is_empty() {
            return Err(ValidationError::InvalidInput("no inner vertex to align".into()).into());
        }

        let n = moved.len() as f64;
        for (i, &v) in moved.iter().enumerate() {
            let topo = &ctx.model.topo;
            if let Some(point) = topo.association(TopoRef::Vertex(v)) {
                return Err(FeasibilityError::Unsupported(format!(
                    "{} conforms to {} and cannot be moved",
                    topo.name(TopoRef::Vertex(v)),
                    ctx.model.name(EntityRef::Geom(point))
                ))
                .into());
            }
            let (mut target, t) = project_on_segment(&topo.position(v)?, &start, &end);
            if t <= 0.0 || t >= 1.0 {
                let k = (i + 1) as f64;
                target = Point3::from((start.coords * k + end.coords * (1.0 + n - k)) / (n + 1.0));
            }
            ctx.model.topo.vertex_mut(v)?.point = target;
        }
        debug!(count = moved.len(), "vertices aligned");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::command::Session;
    use crate::error::ErrorKind;
    use crate::math::Vector3;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
    use crate::operations::modification::SplitEdge;
    use crate::operations::{Transform, Transformation};
    use crate::topology::FaceId;

    fn unit_face(session: &mut Session) -> FaceId {
        match session.execute(&NewFreeTopo::new(2, None)).unwrap() {
            TopoRef::Face(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bent_chain_is_straightened() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let bottom = session.model().topo().face(f).unwrap().sides[0][0];
        let mid = session.execute(&SplitEdge::new(bottom, 0.5)).unwrap();
        session
            .execute(&Transform::new(
                vec![EntityRef::Topo(TopoRef::Vertex(mid))],
                Transformation::Translate(Vector3::new(0.1, 0.3, 0.0)),
            ))
            .unwrap();
        let corners = session.model().topo().face(f).unwrap().corners;
        session
            .execute(&AlignVertices::between_ends(vec![corners[0], mid, corners[1]]))
            .unwrap();
        let p = session.model().topo().position(mid).unwrap();
        assert_relative_eq!(p.x, 0.6, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);

        session.undo().unwrap();
        let p = session.model().topo().position(mid).unwrap();
        assert_relative_eq!(p.y, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn vertices_beyond_the_ends_are_spread() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let corners = session.model().topo().face(f).unwrap().corners;
        session
            .execute(&AlignVertices::on_segment(
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
                vec![corners[2], corners[3]],
            ))
            .unwrap();
        let topo = session.model().topo();
        // both project on the first end and are spread over the segment
        assert_relative_eq!(topo.position(corners[2]).unwrap().x, 2.0 + 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(topo.position(corners[3]).unwrap().x, 2.0 + 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn loose_selection_is_refused() {
        let mut session = Session::default();
        let f = unit_face(&mut session);
        let corners = session.model().topo().face(f).unwrap().corners;
        let err = session
            .execute(&AlignVertices::between_ends(vec![corners[0], corners[2]]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        let err = session
            .execute(&AlignVertices::on_segment(Point3::origin(), Point3::origin(), vec![corners[0]]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn associated_vertex_stays_put() {
        let mut session = Session::default();
        let b = session
            .execute(&NewBoxWithTopo::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0), [2, 2, 2], None))
            .unwrap();
        let v = session.model().topo().block(b).unwrap().corners[0];
        let err = session
            .execute(&AlignVertices::on_segment(
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                vec![v],
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(session.model().topo().position(v).unwrap(), Point3::origin());
    }
}
