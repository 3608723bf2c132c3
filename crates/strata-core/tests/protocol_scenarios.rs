//! End-to-end relationship scenarios against an on-disk store.

use strata_core::model::NewCategory;
use strata_core::relations::{
    AttachmentState, Conflict, ParentEdgeSet, ProtocolOptions, RelationError, Rejection,
    RelationshipProtocol,
};
use strata_core::store::{RelationshipStore, SqliteStore};

fn open(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join(".strata").join("strata.db")).expect("open store")
}

fn category(store: &SqliteStore, name: &str) -> String {
    store
        .create_category(&NewCategory::new(name, "asset"))
        .expect("create category")
        .id
}

fn assert_healthy(set: &ParentEdgeSet) {
    assert!(set.check_invariants().is_empty(), "{:?}", set.check_invariants());
}

#[test]
fn primary_uniqueness_holds_through_add_and_promote() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = open(&dir);
    let child = category(&store, "Serveurs");
    let p1 = category(&store, "Infrastructure");
    let p2 = category(&store, "Hébergement");
    let protocol = RelationshipProtocol::new(&store);

    let first = protocol.add(&child, &p1).expect("add p1");
    assert_eq!(first.edges.len(), 1);
    assert!(first.relationship.is_primary);
    assert_healthy(&first.edges);

    let second = protocol.add(&child, &p2).expect("add p2");
    assert_eq!(second.edges.len(), 2);
    assert_eq!(second.edges.primary_count(), 1);
    assert_eq!(
        second.edges.primary().map(|e| e.parent_category_id.as_str()),
        Some(p1.as_str())
    );

    let promoted = protocol.promote(&second.relationship.id).expect("promote p2");
    assert_eq!(promoted.edges.primary_count(), 1);
    assert_eq!(
        promoted.edges.primary().map(|e| e.parent_category_id.as_str()),
        Some(p2.as_str())
    );
    assert!(!promoted.edges.find(&first.relationship.id).expect("p1 edge").is_primary);
    assert_healthy(&promoted.edges);
}

#[test]
fn deleting_either_of_two_edges_leaves_one() {
    for delete_first in [true, false] {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open(&dir);
        let child = category(&store, "Pare-feu");
        let a = category(&store, "Infrastructure");
        let b = category(&store, "Sécurité Réseau");
        let protocol = RelationshipProtocol::with_options(
            &store,
            ProtocolOptions {
                auto_promote_oldest: true,
            },
        );

        let ea = protocol.add(&child, &a).expect("add a");
        let eb = protocol.add(&child, &b).expect("add b");
        let (gone, kept) = if delete_first { (ea, eb) } else { (eb, ea) };

        let outcome = protocol.delete(&gone.relationship.id).expect("delete");
        assert_eq!(outcome.edges.len(), 1);
        assert_eq!(
            outcome.edges.state(),
            AttachmentState::Attached {
                primary: kept.relationship.id.clone()
            }
        );

        let err = protocol.delete(&kept.relationship.id).expect_err("last edge");
        assert!(matches!(
            err,
            RelationError::Rejected(Rejection::WouldEmptyParentSet { .. })
        ));
    }
}

#[test]
fn second_session_sees_conflict_not_stale_write() {
    let dir = tempfile::tempdir().expect("temp dir");
    let first_session = open(&dir);
    let second_session = open(&dir);

    let child = category(&first_session, "Pare-feu");
    let a = category(&first_session, "Infrastructure");
    let b = category(&first_session, "Sécurité Réseau");

    let one = RelationshipProtocol::new(&first_session);
    let two = RelationshipProtocol::new(&second_session);
    one.add(&child, &a).expect("add a");
    let eb = one.add(&child, &b).expect("add b");

    // Session two deletes b; session one's promote of b must not resurrect it.
    two.delete(&eb.relationship.id).expect("delete b elsewhere");
    let err = one.promote(&eb.relationship.id).expect_err("gone");
    assert!(err.requires_refetch());
    assert!(matches!(
        err,
        RelationError::Conflict(Conflict::RelationshipGone { .. })
    ));

    let current = one.parents(&child).expect("refetch");
    assert_eq!(current.len(), 1);
    assert_healthy(&current);
}

#[test]
fn diamond_placement_is_allowed_but_closing_loop_is_not() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = open(&dir);
    let root = category(&store, "Actifs");
    let left = category(&store, "Matériel");
    let right = category(&store, "Réseau");
    let leaf = category(&store, "Routeur");
    let protocol = RelationshipProtocol::new(&store);

    protocol.add(&left, &root).expect("root → left");
    protocol.add(&right, &root).expect("root → right");
    protocol.add(&leaf, &left).expect("left → leaf");
    protocol.add(&leaf, &right).expect("right → leaf");

    let err = protocol.add(&root, &leaf).expect_err("leaf → root");
    let RelationError::Rejected(Rejection::Cycle { cycle }) = err else {
        panic!("expected cycle rejection");
    };
    assert_eq!(cycle.path.first(), Some(&leaf));
    assert_eq!(cycle.path.last(), Some(&root));
    assert_eq!(cycle.cycle_len(), 3);
}
