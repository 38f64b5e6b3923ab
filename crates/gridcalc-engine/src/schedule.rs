use std::collections::{BTreeSet, VecDeque};

use ahash::AHashMap;
use gridcalc_model::UnitRange;
use thiserror::Error;

use crate::manager::DependencyManager;
use crate::node::{NodeId, NodeState};

/// The dirty subset could not be fully ordered: the listed nodes form (or
/// feed) at least one dependency cycle.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("circular reference among {} dependency node(s)", .nodes.len())]
pub struct CycleError {
    /// The unschedulable remainder, sorted by id.
    pub nodes: Vec<NodeId>,
}

impl DependencyManager {
    /// Given a set of changed rectangles, marks every transitively dependent
    /// node dirty and returns the affected ids sorted ascending.
    ///
    /// Seeds are the nodes whose input rectangles intersect `changed`; the
    /// walk then follows parent edges outward (parents depend on their
    /// children's output, so they must recompute too).
    pub fn mark_dirty(&mut self, changed: &[UnitRange]) -> Vec<NodeId> {
        let mut queue: VecDeque<NodeId> = self.search_dependency(changed).into_keys().collect();
        let mut affected: BTreeSet<NodeId> = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            if !affected.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                node.set_state(NodeState::Dirty);
                queue.extend(node.parents().iter().copied());
            }
        }

        affected.into_iter().collect()
    }

    /// Ids of all nodes currently marked dirty, sorted ascending.
    #[must_use]
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.state() == NodeState::Dirty)
            .map(|(&id, _)| id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Marks the dirty closure for `changed` and returns it in evaluation
    /// order: children strictly before parents, ties broken by ascending id
    /// so schedules are reproducible.
    ///
    /// The caller (the calculation executor) evaluates the nodes in the
    /// returned order and reports completion via
    /// [`mark_calculated`](Self::mark_calculated).
    pub fn calculation_order(&mut self, changed: &[UnitRange]) -> Result<Vec<NodeId>, CycleError> {
        let dirty = self.mark_dirty(changed);
        let dirty_set: BTreeSet<NodeId> = dirty.iter().copied().collect();

        // Kahn's algorithm restricted to the dirty subset: a node is ready
        // once all of its dirty children have been scheduled.
        let mut in_degree: AHashMap<NodeId, usize> = AHashMap::with_capacity(dirty.len());
        let mut ready: BTreeSet<NodeId> = BTreeSet::new();
        for &id in &dirty {
            let degree = self
                .nodes
                .get(&id)
                .map(|node| {
                    node.children()
                        .iter()
                        .filter(|child| dirty_set.contains(child))
                        .count()
                })
                .unwrap_or(0);
            in_degree.insert(id, degree);
            if degree == 0 {
                ready.insert(id);
            }
        }

        let mut order: Vec<NodeId> = Vec::with_capacity(dirty.len());
        while let Some(id) = ready.pop_first() {
            in_degree.remove(&id);
            order.push(id);

            let parents: Vec<NodeId> = match self.nodes.get(&id) {
                Some(node) => node
                    .parents()
                    .iter()
                    .copied()
                    .filter(|parent| dirty_set.contains(parent))
                    .collect(),
                None => Vec::new(),
            };
            for parent in parents {
                if let Some(degree) = in_degree.get_mut(&parent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(parent);
                    }
                }
            }
        }

        if order.len() != dirty.len() {
            let mut nodes: Vec<NodeId> = in_degree.into_keys().collect();
            nodes.sort_unstable();
            return Err(CycleError { nodes });
        }

        Ok(order)
    }

    /// The executor reports a node as recomputed.
    pub fn mark_calculated(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set_state(NodeState::Calculated);
        }
    }
}
