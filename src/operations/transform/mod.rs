use std::collections::BTreeSet;

use crate::command::{Command, CommandContext};
use crate::error::{Result, ValidationError};
use crate::geometry::{GeomRef, PointId};
use crate::math::{Point3, Vector3};
use crate::model::{EntityRef, Model};
use crate::topology::{TopoRef, VertexId};

/// A rigid or homothetic transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transformation {
    /// Translation by a vector.
    Translate(Vector3),
    /// Homothety of ratio `factor` around `center`.
    Scale { factor: f64, center: Point3 },
}

impl Transformation {
    fn apply(&self, p: &Point3) -> Point3 {
        match self {
            Self::Translate(v) => p + v,
            Self::Scale { factor, center } => center + (p - center) * *factor,
        }
    }
}

/// Moves entities together with their boundary.
///
/// Moving a geometric entity also moves the topology associated to it or
/// to its boundary, so associations stay geometrically consistent.
pub struct Transform {
    targets: Vec<EntityRef>,
    transformation: Transformation,
}

impl Transform {
    /// Creates a new `Transform` command.
    #[must_use]
    pub fn new(targets: Vec<EntityRef>, transformation: Transformation) -> Self {
        Self {
            targets,
            transformation,
        }
    }

    fn moved(&self, model: &Model) -> (BTreeSet<PointId>, BTreeSet<VertexId>) {
        let mut geom: BTreeSet<GeomRef> = BTreeSet::new();
        let mut topo: BTreeSet<TopoRef> = BTreeSet::new();
        for &t in &self.targets {
            match t {
                EntityRef::Geom(g) => {
                    geom.insert(g);
                    geom.extend(model.geom.closure(g));
                }
                EntityRef::Topo(e) => {
                    topo.insert(e);
                    topo.extend(model.topo.closure(e));
                }
            }
        }
        for dimension in 0..=3 {
            for t in model.topo.all_of_dimension(dimension) {
                if model.topo.association(t).is_some_and(|g| geom.contains(&g)) {
                    topo.insert(t);
                    topo.extend(model.topo.closure(t));
                }
            }
        }
        let points = geom
            .into_iter()
            .filter_map(|g| match g {
                GeomRef::Point(p) => Some(p),
                _ => None,
            })
            .collect();
        let vertices = topo
            .into_iter()
            .filter_map(|t| match t {
                TopoRef::Vertex(v) => Some(v),
                _ => None,
            })
            .collect();
        (points, vertices)
    }
}

impl Command for Transform {
    type Output = ();

    fn description(&self) -> String {
        match self.transformation {
            Transformation::Translate(_) => format!("translate {} entities", self.targets.len()),
            Transformation::Scale { factor, .. } => {
                format!("scale {} entities by {factor}", self.targets.len())
            }
        }
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        if let Transformation::Scale { factor, .. } = self.transformation {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(ValidationError::ParameterOutOfRange {
                    parameter: "factor",
                    value: factor,
                    min: 0.0,
                    max: f64::INFINITY,
                }
                .into());
            }
        }
        for &t in &self.targets {
            ctx.model.check(t)?;
        }
        let (points, vertices) = self.moved(ctx.model);
        for p in points {
            let data = ctx.model.geom.point_mut(p)?;
            data.point = self.transformation.apply(&data.point);
        }
        for v in vertices {
            let data = ctx.model.topo.vertex_mut(v)?;
            data.point = self.transformation.apply(&data.point);
        }
        Ok(())
    }
}
