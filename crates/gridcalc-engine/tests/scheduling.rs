use std::sync::Arc;

use gridcalc_engine::{DependencyManager, NodeState};
use gridcalc_model::{Range, UnitRange};
use pretty_assertions::assert_eq;

fn reads(unit: &str, sheet: &str, a1s: &[&str]) -> Arc<Vec<UnitRange>> {
    Arc::new(
        a1s.iter()
            .map(|a1| UnitRange::new(unit, sheet, Range::from_a1(a1).unwrap()))
            .collect(),
    )
}

fn changed(unit: &str, sheet: &str, a1: &str) -> Vec<UnitRange> {
    vec![UnitRange::new(unit, sheet, Range::from_a1(a1).unwrap())]
}

#[test]
fn chain_recalculates_children_before_parents() {
    let mut manager = DependencyManager::new();
    // B1 reads A1, C1 reads B1, D1 reads C1.
    let f1 = manager.add_formula_dependency("wb", "s1", 0, 1, reads("wb", "s1", &["A1"]));
    let f2 = manager.add_formula_dependency("wb", "s1", 0, 2, reads("wb", "s1", &["B1"]));
    let f3 = manager.add_formula_dependency("wb", "s1", 0, 3, reads("wb", "s1", &["C1"]));
    manager.build_dependency_tree(&[], &[f1, f2, f3]);

    // The user edits A1 (not itself a formula).
    let order = manager.calculation_order(&changed("wb", "s1", "A1")).unwrap();
    assert_eq!(order, vec![f1, f2, f3]);

    for id in order {
        assert_eq!(manager.node(id).unwrap().state(), NodeState::Dirty);
        manager.mark_calculated(id);
        assert_eq!(manager.node(id).unwrap().state(), NodeState::Calculated);
    }
    assert!(manager.dirty_nodes().is_empty());
}

#[test]
fn only_the_affected_subgraph_is_scheduled() {
    let mut manager = DependencyManager::new();
    let affected = manager.add_formula_dependency("wb", "s1", 0, 1, reads("wb", "s1", &["A1"]));
    let bystander = manager.add_formula_dependency("wb", "s1", 5, 5, reads("wb", "s1", &["Z9"]));
    manager.build_dependency_tree(&[], &[affected, bystander]);

    let order = manager.calculation_order(&changed("wb", "s1", "A1")).unwrap();
    assert_eq!(order, vec![affected]);
    assert_eq!(manager.node(bystander).unwrap().state(), NodeState::Pending);
}

#[test]
fn independent_dependents_are_ordered_by_id() {
    let mut manager = DependencyManager::new();
    let second = manager.add_formula_dependency("wb", "s1", 3, 3, reads("wb", "s1", &["A1"]));
    let third = manager.add_formula_dependency("wb", "s1", 1, 1, reads("wb", "s1", &["A1"]));
    let first = manager.add_formula_dependency("wb", "s1", 2, 2, reads("wb", "s1", &["A1"]));
    manager.build_dependency_tree(&[], &[second, third, first]);

    // All three are mutually independent; the tie-break is ascending node id,
    // not registration coordinates.
    let order = manager.calculation_order(&changed("wb", "s1", "A1")).unwrap();
    assert_eq!(order, vec![second, third, first]);
}

#[test]
fn range_readers_pick_up_changes_anywhere_in_the_range() {
    let mut manager = DependencyManager::new();
    let summer = manager.add_formula_dependency("wb", "s1", 0, 3, reads("wb", "s1", &["A1:A100"]));
    manager.build_dependency_tree(&[], &[summer]);

    let order = manager.calculation_order(&changed("wb", "s1", "A57")).unwrap();
    assert_eq!(order, vec![summer]);

    let untouched = manager.calculation_order(&changed("wb", "s1", "B57")).unwrap();
    assert!(untouched.is_empty());
}

#[test]
fn feature_formulas_recalculate_after_their_inputs() {
    let mut manager = DependencyManager::new();
    // A1 is a formula reading Z1; a conditional-formatting feature watches A1:B2.
    let cell = manager.add_formula_dependency("wb", "s1", 0, 0, reads("wb", "s1", &["Z1"]));
    let feature =
        manager.add_feature_formula_dependency("wb", "s1", "cf-1", reads("wb", "s1", &["A1:B2"]));
    manager.build_dependency_tree(&[], &[cell, feature]);

    let order = manager.calculation_order(&changed("wb", "s1", "Z1")).unwrap();
    assert_eq!(order, vec![cell, feature]);
}

#[test]
fn cycles_surface_as_an_error_listing_the_cycle_members() {
    let mut manager = DependencyManager::new();
    // B1 reads C1 and C1 reads B1.
    let f1 = manager.add_formula_dependency("wb", "s1", 0, 1, reads("wb", "s1", &["C1"]));
    let f2 = manager.add_formula_dependency("wb", "s1", 0, 2, reads("wb", "s1", &["B1"]));
    manager.build_dependency_tree(&[], &[f1, f2]);

    let err = manager
        .calculation_order(&changed("wb", "s1", "B1"))
        .expect_err("cycle expected");
    assert_eq!(err.nodes, vec![f1, f2]);
    assert_eq!(
        err.to_string(),
        "circular reference among 2 dependency node(s)"
    );
}

#[test]
fn dirty_marking_deduplicates_diamond_dependencies() {
    let mut manager = DependencyManager::new();
    // B1 and C1 both read A1; D1 reads both B1 and C1.
    let left = manager.add_formula_dependency("wb", "s1", 0, 1, reads("wb", "s1", &["A1"]));
    let right = manager.add_formula_dependency("wb", "s1", 0, 2, reads("wb", "s1", &["A1"]));
    let top = manager.add_formula_dependency("wb", "s1", 0, 3, reads("wb", "s1", &["B1", "C1"]));
    manager.build_dependency_tree(&[], &[left, right, top]);

    let affected = manager.mark_dirty(&changed("wb", "s1", "A1"));
    assert_eq!(affected, vec![left, right, top]);

    let order = manager.calculation_order(&changed("wb", "s1", "A1")).unwrap();
    assert_eq!(order.len(), 3);
    assert_eq!(*order.last().unwrap(), top);
}
