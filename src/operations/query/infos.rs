use crate::association::AssociationIndex;
use crate::error::Result;
use crate::geometry::GeomRef;
use crate::math::Point3;
use crate::model::{EntityRef, Model};
use crate::topology::TopoRef;

/// Summary of one entity, as shown to a user inspecting the model.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub name: String,
    pub dimension: u8,
    /// Names of the direct boundary entities.
    pub boundary: Vec<String>,
    /// Names of the explicit groups, or the default group.
    pub groups: Vec<String>,
    /// For a topological entity, the geometry it conforms to; for a
    /// geometric entity, nothing (see `associated`).
    pub association: Option<String>,
    /// For a geometric entity, the topology associated to it.
    pub associated: Vec<String>,
    /// Position of a vertex or a point.
    pub coordinates: Option<Point3>,
    /// Number of mesh edges of an edge.
    pub nb_mesh_edges: Option<usize>,
}

/// Collects the [`EntityInfo`] of an entity.
pub struct Infos {
    entity: EntityRef,
}

impl Infos {
    /// Creates a new `Infos` query.
    #[must_use]
    pub fn new(entity: EntityRef) -> Self {
        Self { entity }
    }

    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn execute(&self, model: &Model) -> Result<EntityInfo> {
        model.check(self.entity)?;
        let mut info = EntityInfo {
            name: model.name(self.entity),
            dimension: self.entity.dimension(),
            boundary: Vec::new(),
            groups: model.groups_of(self.entity),
            association: None,
            associated: Vec::new(),
            coordinates: None,
            nb_mesh_edges: None,
        };
        match self.entity {
            EntityRef::Topo(t) => {
                info.boundary = model.topo.boundary(t).into_iter().map(|b| model.topo.name(b)).collect();
                info.association = model.topo.association(t).map(|g| model.geom.name(g));
                match t {
                    TopoRef::Vertex(v) => info.coordinates = Some(model.topo.position(v)?),
                    TopoRef::Edge(e) => info.nb_mesh_edges = Some(model.topo.edge(e)?.nb_edges()),
                    TopoRef::Face(_) | TopoRef::Block(_) => {}
                }
            }
            EntityRef::Geom(g) => {
                info.boundary = model.geom.boundary(g).into_iter().map(|b| model.geom.name(b)).collect();
                info.associated = AssociationIndex::build(model)
                    .topology_of(g)
                    .iter()
                    .map(|t| model.topo.name(*t))
                    .collect();
                info.associated.sort();
                if let GeomRef::Point(p) = g {
                    info.coordinates = Some(model.geom.point(p)?.point);
                }
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::Session;
    use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};

    #[test]
    fn edge_infos() {
        let mut session = Session::default();
        session.execute(&NewFreeTopo::new(2, Some("F"))).unwrap();
        let (e, _) = session.model().topo().edges().next().unwrap();
        let info = Infos::new(EntityRef::Topo(TopoRef::Edge(e)))
            .execute(session.model())
            .unwrap();
        assert_eq!(info.dimension, 1);
        assert_eq!(info.boundary.len(), 2);
        assert_eq!(info.nb_mesh_edges, Some(10));
        assert_eq!(info.groups, vec!["Hors_Groupe_1D".to_string()]);
        assert!(info.association.is_none());
    }

    #[test]
    fn volume_infos_list_its_block() {
        let mut session = Session::default();
        let block = session
            .execute(&NewBoxWithTopo::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0), [2, 2, 2], Some("BOX")))
            .unwrap();
        let model = session.model();
        let Some(volume) = model.topo().association(TopoRef::Block(block)) else {
            panic!("block is not associated");
        };
        let info = Infos::new(EntityRef::Geom(volume)).execute(model).unwrap();
        assert_eq!(info.boundary.len(), 6);
        assert_eq!(info.groups, vec!["BOX".to_string()]);
        assert_eq!(info.associated, vec![model.topo().name(TopoRef::Block(block))]);

        let info = Infos::new(EntityRef::Topo(TopoRef::Block(block))).execute(model).unwrap();
        assert_eq!(info.association, Some(model.geom().name(volume)));
        assert_eq!(info.boundary.len(), 6);
    }
}
