use std::sync::Arc;

use gridcalc_engine::{DependencyManager, NodeId};
use gridcalc_model::{CellRef, Range, UnitRange};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn reads(unit: &str, sheet: &str, a1s: &[&str]) -> Arc<Vec<UnitRange>> {
    Arc::new(
        a1s.iter()
            .map(|a1| UnitRange::new(unit, sheet, Range::from_a1(a1).unwrap()))
            .collect(),
    )
}

fn no_reads() -> Arc<Vec<UnitRange>> {
    Arc::new(Vec::new())
}

#[test]
fn range_containment_creates_the_dependency_edge() {
    let mut manager = DependencyManager::new();
    // Reader at A1 sums B1:B5; producer is a plain formula cell at B5.
    let reader = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["B1:B5"]));
    let producer = manager.add_formula_dependency("wb", "s1", 4, 1, no_reads());

    let all = manager.build_dependency_tree(&[], &[reader, producer]);
    assert_eq!(all, vec![reader, producer]);

    let reader_node = manager.node(reader).unwrap();
    let producer_node = manager.node(producer).unwrap();
    assert!(reader_node.has_child(producer));
    assert!(producer_node.parents().contains(&reader));
    assert!(producer_node.children().is_empty());
}

#[test]
fn self_intersecting_nodes_never_become_their_own_edge() {
    let mut manager = DependencyManager::new();
    // A1 reads A1:B2, which contains its own cell.
    let id = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["A1:B2"]));

    manager.build_dependency_tree(&[id], &[]);

    let node = manager.node(id).unwrap();
    assert!(!node.children().contains(&id));
    assert!(!node.parents().contains(&id));
}

#[test]
fn rebuilding_does_not_duplicate_edges() {
    let mut manager = DependencyManager::new();
    let reader = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["B1:B5"]));
    let producer = manager.add_formula_dependency("wb", "s1", 2, 1, no_reads());

    let all = manager.build_dependency_tree(&[], &[reader, producer]);
    let sizes_after_first: Vec<(usize, usize)> = all
        .iter()
        .map(|id| {
            let n = manager.node(*id).unwrap();
            (n.parents().len(), n.children().len())
        })
        .collect();

    let all_again = manager.build_dependency_tree(&[], &[reader, producer]);
    let sizes_after_second: Vec<(usize, usize)> = all_again
        .iter()
        .map(|id| {
            let n = manager.node(*id).unwrap();
            (n.parents().len(), n.children().len())
        })
        .collect();

    assert_eq!(sizes_after_first, sizes_after_second);
    assert_eq!(manager.stats().edges, 1);
}

#[test]
fn incremental_build_wires_new_nodes_into_the_existing_graph() {
    let mut manager = DependencyManager::new();
    let producer = manager.add_formula_dependency("wb", "s1", 4, 1, no_reads()); // B5
    manager.build_dependency_tree(&[], &[producer]);

    // Later, a formula reading B1:B5 is registered; an incremental pass must
    // pick up both directions: the new node's children and its parents.
    let reader = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["B1:B5"]));
    let downstream = manager.add_formula_dependency("wb", "s1", 0, 2, reads("wb", "s1", &["A1"]));
    manager.build_dependency_tree(&[reader, downstream], &[reader, downstream]);

    let reader_node = manager.node(reader).unwrap();
    assert!(reader_node.has_child(producer));
    assert!(reader_node.parents().contains(&downstream));
    assert!(manager.node(downstream).unwrap().has_child(reader));
}

#[test]
fn removing_a_middle_node_bridges_its_parents_to_its_children() {
    let mut manager = DependencyManager::new();
    // c is a plain cell at A1; b at B1 reads A1; a at C1 reads B1.
    let c = manager.add_formula_dependency("wb", "s1", 0, 0, no_reads());
    let b = manager.add_formula_dependency("wb", "s1", 0, 1, reads("wb", "s1", &["A1"]));
    let a = manager.add_formula_dependency("wb", "s1", 0, 2, reads("wb", "s1", &["B1"]));

    manager.build_dependency_tree(&[], &[a, b, c]);
    assert!(manager.node(a).unwrap().has_child(b));
    assert!(manager.node(b).unwrap().has_child(c));

    manager.clear_dependency_for_tree(Some(b));

    let a_node = manager.node(a).unwrap();
    let b_node = manager.node(b).unwrap();
    let c_node = manager.node(c).unwrap();
    assert!(a_node.has_child(c), "transitive dependency must survive");
    assert!(c_node.parents().contains(&a));
    assert!(b_node.parents().is_empty());
    assert!(b_node.children().is_empty());
    assert!(!a_node.has_child(b));
    assert!(!c_node.parents().contains(&b));
}

#[test]
fn clearing_a_missing_tree_is_a_no_op() {
    let mut manager = DependencyManager::new();
    manager.clear_dependency_for_tree(None);
    manager.clear_dependency_for_tree(Some(NodeId(42)));
    assert_eq!(manager.stats().nodes, 0);
}

#[test]
fn edges_never_cross_sheets_or_units() {
    let mut manager = DependencyManager::new();
    let reader = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["B1:B5"]));
    let same_coords_other_sheet = manager.add_formula_dependency("wb", "s2", 2, 1, no_reads());
    let same_coords_other_unit = manager.add_formula_dependency("wb2", "s1", 2, 1, no_reads());

    manager.build_dependency_tree(
        &[],
        &[reader, same_coords_other_sheet, same_coords_other_unit],
    );

    assert!(manager.node(reader).unwrap().children().is_empty());
    assert!(manager.node(same_coords_other_sheet).unwrap().parents().is_empty());
    assert!(manager.node(same_coords_other_unit).unwrap().parents().is_empty());
}

proptest! {
    // Random grids of formulas with random read rectangles: after a full
    // build, parent/child sets must be symmetric and self-loop free.
    #[test]
    fn edge_sets_stay_symmetric_under_random_builds(
        formulas in proptest::collection::vec(
            (0u32..8, 0u32..8, 0u32..8, 0u32..8, 0u32..8, 0u32..8),
            1..20,
        )
    ) {
        let mut manager = DependencyManager::new();
        let mut ids: Vec<NodeId> = Vec::new();
        for (row, col, r0, c0, r1, c1) in formulas {
            let read = UnitRange::new(
                "wb",
                "s1",
                Range::new(CellRef::new(r0, c0), CellRef::new(r1, c1)),
            );
            ids.push(manager.add_formula_dependency("wb", "s1", row, col, Arc::new(vec![read])));
        }
        // Overwritten slots drop their earlier node ids.
        ids.retain(|id| manager.node(*id).is_some());

        let all = manager.build_dependency_tree(&[], &ids);

        for &id in &all {
            let node = manager.node(id).unwrap();
            prop_assert!(!node.children().contains(&id));
            prop_assert!(!node.parents().contains(&id));
            for &child in node.children() {
                prop_assert!(manager.node(child).unwrap().parents().contains(&id));
            }
            for &parent in node.parents() {
                prop_assert!(manager.node(parent).unwrap().children().contains(&id));
            }
        }
    }
}
