use std::collections::HashMap;

use tracing::{debug, warn};

use crate::command::{Command, CommandContext};
use crate::error::{FeasibilityError, Result, ValidationError};
use crate::geometry::GeomRef;
use crate::model::{EntityRef, Model};
use crate::topology::TopoRef;

/// Reverse view of the associations: topological entities per geometric
/// entity.
///
/// Only the forward link is stored, on each topological entity. The index
/// is rebuilt from those links whenever it is needed.
#[derive(Debug, Default)]
pub struct AssociationIndex {
    reverse: HashMap<GeomRef, Vec<TopoRef>>,
}

impl AssociationIndex {
    /// Scans the model and collects every association.
    #[must_use]
    pub fn build(model: &Model) -> Self {
        let mut reverse: HashMap<GeomRef, Vec<TopoRef>> = HashMap::new();
        for dimension in 0..=3 {
            for t in model.topo.all_of_dimension(dimension) {
                if let Some(g) = model.topo.association(t) {
                    reverse.entry(g).or_default().push(t);
                }
            }
        }
        Self { reverse }
    }

    /// Topological entities associated to `geom`.
    #[must_use]
    pub fn topology_of(&self, geom: GeomRef) -> &[TopoRef] {
        self.reverse.get(&geom).map_or(&[], Vec::as_slice)
    }
}

/// Geometric entity a topological entity is associated to.
#[must_use]
pub fn geometry_of(model: &Model, topo: TopoRef) -> Option<GeomRef> {
    model.topo.association(topo)
}

/// Associates topological entities to a geometric entity, or clears
/// their association when no target is given.
pub struct Associate {
    topo: Vec<TopoRef>,
    geom: Option<GeomRef>,
    propagate: bool,
}

impl Associate {
    /// Creates a new `Associate` command. With `propagate`, the boundary
    /// of each entity is matched against the boundary of `geom`.
    #[must_use]
    pub fn new(topo: Vec<TopoRef>, geom: Option<GeomRef>, propagate: bool) -> Self {
        Self {
            topo,
            geom,
            propagate,
        }
    }
}

/// Clears the association of topological entities.
pub struct ClearAssociation {
    topo: Vec<TopoRef>,
}

impl ClearAssociation {
    /// Creates a new `ClearAssociation` command.
    #[must_use]
    pub fn new(topo: Vec<TopoRef>) -> Self {
        Self { topo }
    }
}

impl Command for ClearAssociation {
    type Output = ();

    fn description(&self) -> String {
        format!("clear association of {} entities", self.topo.len())
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        ctx.run(&Associate::new(self.topo.clone(), None, false))
    }
}

/// Sets one association after validating it.
pub(crate) fn link(ctx: &mut CommandContext<'_>, topo: TopoRef, geom: GeomRef) -> Result<()> {
    let model = &mut *ctx.model;
    model.topo.check(topo)?;
    model.geom.check(geom)?;
    if topo.dimension() != geom.dimension() {
        return Err(ValidationError::DimensionMismatch {
            entity: model.topo.name(topo),
            expected: topo.dimension(),
            found: geom.dimension(),
        }
        .into());
    }
    if let Some(group) = model
        .groups
        .shared_group(EntityRef::Topo(topo), EntityRef::Geom(geom))
    {
        let topo_name = model.topo.name(topo);
        let geom_name = model.geom.name(geom);
        warn!(group = %group, topo = %topo_name, geom = %geom_name, "association rejected");
        return Err(FeasibilityError::GroupConflict {
            group,
            topo: topo_name,
            geom: geom_name,
        }
        .into());
    }
    model.topo.set_association(topo, Some(geom))?;
    if let (TopoRef::Vertex(v), GeomRef::Point(p)) = (topo, geom) {
        model.topo.vertex_mut(v)?.point = model.geom.point(p)?.point;
    }
    Ok(())
}

/// Largest distance from the vertices of `topo` to `geom`.
fn max_distance(ctx: &CommandContext<'_>, topo: TopoRef, geom: GeomRef) -> Result<f64> {
    let mut vertices: Vec<TopoRef> = ctx
        .model
        .topo
        .closure(topo)
        .into_iter()
        .filter(|e| e.dimension() == 0)
        .collect();
    if let TopoRef::Vertex(_) = topo {
        vertices.push(topo);
    }
    let mut worst: f64 = 0.0;
    for t in vertices {
        if let TopoRef::Vertex(v) = t {
            let p = ctx.model.topo.position(v)?;
            worst = worst.max(ctx.oracle.distance(&ctx.model.geom, geom, &p)?);
        }
    }
    Ok(worst)
}

/// Associates the boundary of `topo` to the matching boundary entities
/// of `geom`, recursively. Sub-entities lying inside `geom` without a
/// counterpart of their own dimension stay unassociated.
pub(crate) fn propagate(ctx: &mut CommandContext<'_>, topo: TopoRef, geom: GeomRef) -> Result<()> {
    let tolerance = ctx.config.tolerance;
    for sub in ctx.model.topo.boundary(topo) {
        let candidates: Vec<GeomRef> = ctx
            .model
            .geom
            .closure(geom)
            .into_iter()
            .filter(|g| g.dimension() == sub.dimension())
            .collect();
        let mut best: Option<(GeomRef, f64)> = None;
        for g in candidates {
            let d = max_distance(ctx, sub, g)?;
            if d <= tolerance && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((g, d));
            }
        }
        match best {
            Some((g, _)) => {
                link(ctx, sub, g)?;
                propagate(ctx, sub, g)?;
            }
            None if max_distance(ctx, sub, geom)? <= tolerance => {
                debug!(entity = %ctx.model.topo.name(sub), "lies inside geometry, left unassociated");
                propagate(ctx, sub, geom)?;
            }
            None => {
                return Err(FeasibilityError::NoCounterpart {
                    topo: ctx.model.topo.name(sub),
                    geom: ctx.model.geom.name(geom),
                }
                .into());
            }
        }
    }
    Ok(())
}

impl Command for Associate {
    type Output = ();

    fn description(&self) -> String {
        match self.geom {
            Some(_) => format!("associate {} entities", self.topo.len()),
            None => format!("clear association of {} entities", self.topo.len()),
        }
    }

    fn apply(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        for &t in &self.topo {
            ctx.model.topo.check(t)?;
            match self.geom {
                None => {
                    ctx.model.topo.set_association(t, None)?;
                    if self.propagate {
                        for sub in ctx.model.topo.closure(t) {
                            ctx.model.topo.set_association(sub, None)?;
                        }
                    }
                }
                Some(g) => {
                    link(ctx, t, g)?;
                    if self.propagate {
                        propagate(ctx, t, g)?;
                    }
                }
            }
        }
        Ok(())
    }
}
