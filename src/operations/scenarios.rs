use crate::command::Session;
use crate::error::ErrorKind;
use crate::geometry::{GeomRef, LinearOracle};
use crate::group::ClearGroup;
use crate::math::Point3;
use crate::mesh::{MeshOracle, PlanarMesher};
use crate::meshing::{MeshingLaw, SetMeshingProperty};
use crate::model::EntityRef;
use crate::operations::creation::{NewBoxWithTopo, NewFreeTopo};
use crate::operations::modification::{Glue, SplitBlock, SplitBlocksWithOgrid, SplitFacesWithOgrid};
use crate::operations::query::check_integrity;
use crate::topology::{BlockId, TopoRef};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn cube(session: &mut Session, x: f64, size: f64, group: Option<&str>) -> BlockId {
    session
        .execute(&NewBoxWithTopo::new(
            Point3::new(x, 0.0, 0.0),
            Point3::new(x + size, size, size),
            [4, 4, 4],
            group,
        ))
        .unwrap()
}

#[test]
fn beta_law_bounds() {
    assert_eq!(
        MeshingLaw::beta(10, 1.000_005, false).unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(MeshingLaw::beta(10, 1.02, false).unwrap_err().kind(), ErrorKind::Validation);
    assert!(MeshingLaw::beta(10, 1.01, false).is_ok());
    assert!(MeshingLaw::beta(10, 1.001, true).is_ok());
}

#[test]
fn split_box_then_ogrid_then_undo_everything() {
    init_tracing();
    let mut session = Session::default();
    let block = cube(&mut session, 0.0, 10.0, Some("BOX"));
    assert_eq!(session.model().nb_blocks(), 1);
    assert_eq!(session.model().nb_faces(), 6);

    let edge = session.model().topo().block_chain(block, 0, 4).unwrap()[0];
    let halves = session.execute(&SplitBlock::new(block, edge, 0.5)).unwrap();
    assert_eq!(session.model().nb_blocks(), 2);
    check_integrity(session.model()).unwrap();

    session.execute(&SplitBlocksWithOgrid::new(halves, 0.5, 2)).unwrap();
    assert_eq!(session.model().nb_blocks(), 12);
    check_integrity(session.model()).unwrap();

    let counts = |m: &crate::model::Model| [m.nb_blocks(), m.nb_faces(), m.nb_edges(), m.nb_vertices()];
    let after = counts(session.model());
    session.undo().unwrap();
    session.undo().unwrap();
    assert_eq!(session.model().nb_blocks(), 1);
    assert_eq!(session.model().nb_faces(), 6);
    session.redo().unwrap();
    session.redo().unwrap();
    assert!(!session.can_redo());
    assert_eq!(counts(session.model()), after);
}

#[test]
fn glued_cubes_accept_an_ogrid_unglued_ones_do_not() {
    let mut session = Session::default();
    let a = cube(&mut session, 0.0, 1.0, None);
    let b = cube(&mut session, 1.0, 1.0, None);
    let err = session
        .execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Feasibility);
    assert_eq!(session.model().nb_blocks(), 2);

    let volumes: Vec<_> = [a, b]
        .iter()
        .map(|blk| match session.model().topo().association(TopoRef::Block(*blk)) {
            Some(GeomRef::Volume(v)) => v,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    session.execute(&Glue::new(volumes)).unwrap();
    session.execute(&SplitBlocksWithOgrid::new(vec![a, b], 0.5, 1)).unwrap();
    assert_eq!(session.model().nb_blocks(), 12);
    check_integrity(session.model()).unwrap();
}

#[test]
fn cleared_group_comes_back_on_undo() {
    let mut session = Session::default();
    cube(&mut session, 0.0, 1.0, Some("BOX"));
    let before = session.model().group_members(3, "BOX").unwrap();
    assert!(!before.is_empty());

    session.execute(&ClearGroup::new(3, "BOX")).unwrap();
    let cleared = session.model().group_members(3, "BOX").map(|m| m.len()).unwrap_or(0);
    assert_eq!(cleared, 0);

    session.undo().unwrap();
    let mut restored = session.model().group_members(3, "BOX").unwrap();
    let mut expected = before;
    restored.sort_by_key(|e| session.model().name(*e));
    expected.sort_by_key(|e| session.model().name(*e));
    assert_eq!(restored, expected);
}

#[test]
fn ogrid_face_meshes_into_quads() {
    let mut session = Session::default();
    let TopoRef::Face(f) = session.execute(&NewFreeTopo::new(2, None)).unwrap() else {
        panic!("expected a face");
    };
    let created = session.execute(&SplitFacesWithOgrid::new(vec![f], 0.5, 3)).unwrap();
    let mut quads = 0;
    for face in created {
        let mesh = PlanarMesher.mesh_face(session.model(), &LinearOracle, face).unwrap();
        assert!(mesh.triangles.is_empty());
        quads += mesh.quads.len();
    }
    assert_eq!(quads, 10 * 10 + 4 * 10 * 3);
}

#[test]
fn inconsistent_discretization_is_refused() {
    let mut session = Session::default();
    let TopoRef::Face(f) = session.execute(&NewFreeTopo::new(2, None)).unwrap() else {
        panic!("expected a face");
    };
    let bottom = session.model().topo().face(f).unwrap().sides[0].clone();
    let err = session
        .execute(&SetMeshingProperty::new(MeshingLaw::uniform(7).unwrap(), bottom.clone()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Feasibility);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.model().topo().edge(bottom[0]).unwrap().nb_edges(), 10);
    PlanarMesher.mesh_face(session.model(), &LinearOracle, f).unwrap();
    assert!(session
        .model()
        .groups_of(EntityRef::Topo(TopoRef::Face(f)))
        .contains(&"Hors_Groupe_2D".to_string()));
}
