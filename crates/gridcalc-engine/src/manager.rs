use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use gridcalc_model::{SheetId, UnitId, UnitRange};

use crate::index::{IndexItem, RangeIndex};
use crate::node::{DependencyNode, FormulaKey, FormulaSource, NodeId};

/// Composite storage key: `(unit, sheet, formula category + slot)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StorageKey {
    unit_id: UnitId,
    sheet_id: SheetId,
    key: FormulaKey,
}

/// Counters useful for asserting the internal representation in tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagerStats {
    pub nodes: usize,
    /// Parent→child edges (counted once per pair; the sets are symmetric).
    pub edges: usize,
    /// Rectangles currently held by the spatial index.
    pub index_entries: usize,
}

/// Single source of truth for all dependency nodes and their graph edges.
///
/// The manager owns the node arena, the flat composite-key storage for the
/// three formula categories (cell / other / feature), and the spatial range
/// index. Every structural mutation goes through it; callers never touch
/// nodes' edge sets directly.
///
/// All operations are synchronous and non-throwing: lookups on unknown keys
/// yield `None`, structural ops on unknown nodes are no-ops. Execution is
/// single-threaded; callers batch their own work and must not interleave
/// conflicting calls.
#[derive(Debug, Default)]
pub struct DependencyManager {
    /// Node arena; the manager is the sole owner of every node.
    pub(crate) nodes: AHashMap<NodeId, DependencyNode>,
    /// Flat `(unit, sheet, slot)` → node mapping across all three categories.
    storage: AHashMap<StorageKey, NodeId>,
    /// Auxiliary `(unit, sheet)` → occupied slots index for scoped clears.
    scopes: AHashMap<(UnitId, SheetId), AHashSet<FormulaKey>>,
    index: RangeIndex,
    next_node_id: u64,
}

impl DependencyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next node id: returns the current counter, then
    /// increments it. Monotonic until [`reset`](Self::reset).
    pub fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            nodes: self.nodes.len(),
            edges: self.nodes.values().map(|n| n.children().len()).sum(),
            index_entries: self.index.len(),
        }
    }

    // ----- registration ----------------------------------------------------

    /// Registers a cell formula at `(row, col)`. Returns the new node's id.
    ///
    /// An add over an occupied slot first fully unlinks the previous node
    /// (spatial entries, graph edges, storage) before inserting the
    /// replacement, so no stale state survives an overwrite.
    pub fn add_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        row: u32,
        col: u32,
        source: Arc<dyn FormulaSource>,
    ) -> NodeId {
        self.insert_node(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Cell { row, col },
            source,
        )
    }

    /// Registers a defined-name-driven ("other") formula under `formula_id`.
    pub fn add_other_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        formula_id: impl Into<String>,
        source: Arc<dyn FormulaSource>,
    ) -> NodeId {
        self.insert_node(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Other(formula_id.into()),
            source,
        )
    }

    /// Registers a feature-plugin formula (e.g. conditional formatting) under
    /// `feature_id`.
    pub fn add_feature_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        feature_id: impl Into<String>,
        source: Arc<dyn FormulaSource>,
    ) -> NodeId {
        self.insert_node(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Feature(feature_id.into()),
            source,
        )
    }

    fn insert_node(
        &mut self,
        unit_id: UnitId,
        sheet_id: SheetId,
        key: FormulaKey,
        source: Arc<dyn FormulaSource>,
    ) -> NodeId {
        let storage_key = StorageKey {
            unit_id: unit_id.clone(),
            sheet_id: sheet_id.clone(),
            key: key.clone(),
        };
        if let Some(&previous) = self.storage.get(&storage_key) {
            self.remove_node(previous);
        }

        let id = self.allocate_node_id();
        let node = DependencyNode::new(id, unit_id.clone(), sheet_id.clone(), key.clone(), source);
        self.nodes.insert(id, node);
        self.storage.insert(storage_key, id);
        self.scopes.entry((unit_id, sheet_id)).or_default().insert(key);
        self.add_dependency_rtree_cache(id);
        id
    }

    // ----- lookups ---------------------------------------------------------

    #[must_use]
    pub fn get_formula_dependency(
        &self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        row: u32,
        col: u32,
    ) -> Option<NodeId> {
        self.lookup(unit_id.into(), sheet_id.into(), FormulaKey::Cell { row, col })
    }

    #[must_use]
    pub fn get_other_formula_dependency(
        &self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        formula_id: &str,
    ) -> Option<NodeId> {
        self.lookup(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Other(formula_id.to_owned()),
        )
    }

    #[must_use]
    pub fn has_other_formula_dependency(
        &self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        formula_id: &str,
    ) -> bool {
        self.get_other_formula_dependency(unit_id, sheet_id, formula_id)
            .is_some()
    }

    #[must_use]
    pub fn get_feature_formula_dependency(
        &self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        feature_id: &str,
    ) -> Option<NodeId> {
        self.lookup(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Feature(feature_id.to_owned()),
        )
    }

    fn lookup(&self, unit_id: UnitId, sheet_id: SheetId, key: FormulaKey) -> Option<NodeId> {
        self.storage
            .get(&StorageKey {
                unit_id,
                sheet_id,
                key,
            })
            .copied()
    }

    /// Every node across all three categories, sorted by id, with each node's
    /// transient calculation state reset as a side effect. Callers run this
    /// ahead of a rebuild pass.
    pub fn all_nodes(&mut self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in &ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.reset_state();
            }
        }
        ids
    }

    // ----- graph construction ----------------------------------------------

    /// (Re)builds parent/child edges.
    ///
    /// With an empty `should_be_built`, the whole graph is rebuilt: reverse
    /// edges are computed for `dependency_trees` against every node. Otherwise
    /// forward edges are built from every existing node onto the
    /// `should_be_built` subset first, then reverse edges from
    /// `dependency_trees` onto all nodes. The forward pass completes fully
    /// before the reverse pass begins, so the edge sets are symmetric by the
    /// time this returns.
    ///
    /// Returns all node ids (the same set [`all_nodes`](Self::all_nodes)
    /// yields).
    pub fn build_dependency_tree(
        &mut self,
        should_be_built: &[NodeId],
        dependency_trees: &[NodeId],
    ) -> Vec<NodeId> {
        let all = self.all_nodes();
        let all_set: AHashSet<NodeId> = all.iter().copied().collect();

        if should_be_built.is_empty() {
            self.connect_into(dependency_trees, &all_set);
            return all;
        }

        let build_set: AHashSet<NodeId> = should_be_built.iter().copied().collect();
        self.connect_into(&all, &build_set);
        self.connect_into(dependency_trees, &all_set);
        all
    }

    /// For each producer, finds the readers whose input rectangles intersect
    /// the producer's output rectangle(s) and records reader→producer as a
    /// parent→child edge. Readers outside `receivers` are skipped; self-loops
    /// and duplicate edges are suppressed.
    fn connect_into(&mut self, producers: &[NodeId], receivers: &AHashSet<NodeId>) {
        for &producer in producers {
            let outputs: Vec<UnitRange> = match self.nodes.get(&producer) {
                Some(node) => node.output_ranges().to_vec(),
                None => continue,
            };

            for output in &outputs {
                for reader in self.index.search(output) {
                    if receivers.contains(&reader) {
                        self.link(reader, producer);
                    }
                }
            }
        }
    }

    /// Records `child` as a dependency of `parent`, symmetrically. No-op for
    /// self-loops, unknown ids, or already-linked pairs.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || !self.nodes.contains_key(&child) {
            return;
        }
        match self.nodes.get(&parent) {
            Some(node) if !node.has_child(child) => {}
            _ => return,
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.insert_child(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.insert_parent(parent);
        }
    }

    /// Detaches a node from all its parents and children, then re-links its
    /// former parents directly to its former children so transitive
    /// dependencies survive the removal of a middle node. The node itself ends
    /// up fully detached. No-op on `None` or an unknown id.
    pub fn clear_dependency_for_tree(&mut self, id: Option<NodeId>) {
        let Some(id) = id else {
            return;
        };
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        let parents: Vec<NodeId> = node.parents().iter().copied().collect();
        let children: Vec<NodeId> = node.children().iter().copied().collect();

        for &parent in &parents {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.remove_child(id);
            }
        }
        for &child in &children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.remove_parent(id);
            }
        }

        // Bridge: parents of the removed node become dependents of its
        // children.
        for &parent in &parents {
            for &child in &children {
                self.link(parent, child);
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.dispose();
        }
    }

    // ----- spatial index ---------------------------------------------------

    /// Mirrors a node's current input rectangles into the spatial index.
    /// Every add path calls this; removals call the matching cleanup, so the
    /// index always agrees with the union of ranges across storage.
    pub fn add_dependency_rtree_cache(&mut self, id: NodeId) {
        let items = self.index_items_for(id);
        self.index.bulk_insert(items);
    }

    fn remove_dependency_rtree_cache(&mut self, id: NodeId) {
        let items = self.index_items_for(id);
        self.index.bulk_remove(items);
    }

    fn index_items_for(&self, id: NodeId) -> Vec<IndexItem> {
        match self.nodes.get(&id) {
            Some(node) => node
                .range_list()
                .iter()
                .cloned()
                .map(|range| IndexItem::new(id, range))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Bulk spatial lookup: which nodes read any of `ranges`? The
    /// recalculation scheduler uses this to seed dirty propagation.
    #[must_use]
    pub fn search_dependency(&self, ranges: &[UnitRange]) -> BTreeMap<NodeId, IndexItem> {
        self.index.bulk_search(ranges)
    }

    // ----- removal ---------------------------------------------------------

    /// Removes the cell formula node at `(row, col)`, if any.
    pub fn remove_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        row: u32,
        col: u32,
    ) {
        if let Some(id) = self.lookup(
            unit_id.into(),
            sheet_id.into(),
            FormulaKey::Cell { row, col },
        ) {
            self.remove_node(id);
        }
    }

    /// Removes the "other" formula nodes registered under `formula_ids`.
    pub fn remove_other_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        formula_ids: &[&str],
    ) {
        let unit_id = unit_id.into();
        let sheet_id = sheet_id.into();
        for formula_id in formula_ids {
            if let Some(id) = self.lookup(
                unit_id.clone(),
                sheet_id.clone(),
                FormulaKey::Other((*formula_id).to_owned()),
            ) {
                self.remove_node(id);
            }
        }
    }

    /// Removes the feature formula nodes registered under `feature_ids`.
    pub fn remove_feature_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        feature_ids: &[&str],
    ) {
        let unit_id = unit_id.into();
        let sheet_id = sheet_id.into();
        for feature_id in feature_ids {
            if let Some(id) = self.lookup(
                unit_id.clone(),
                sheet_id.clone(),
                FormulaKey::Feature((*feature_id).to_owned()),
            ) {
                self.remove_node(id);
            }
        }
    }

    /// Removes cell-formula nodes whose underlying formula references the
    /// defined name; used when a named range is deleted.
    pub fn remove_formula_dependency_by_defined_name(
        &mut self,
        unit_id: impl Into<UnitId>,
        name: &str,
    ) {
        let unit_id = unit_id.into();
        let doomed: Vec<NodeId> = self
            .storage
            .iter()
            .filter(|(key, _)| {
                key.unit_id == unit_id && matches!(key.key, FormulaKey::Cell { .. })
            })
            .filter_map(|(_, &id)| {
                let node = self.nodes.get(&id)?;
                node.references_defined_name(name).then_some(id)
            })
            .collect();

        for id in doomed {
            self.remove_node(id);
        }
    }

    /// Full teardown of one node: spatial entries out first, then edges (with
    /// the transitive bridge), then storage.
    fn remove_node(&mut self, id: NodeId) {
        self.remove_dependency_rtree_cache(id);
        self.clear_dependency_for_tree(Some(id));

        if let Some(node) = self.nodes.remove(&id) {
            let storage_key = StorageKey {
                unit_id: node.unit_id().clone(),
                sheet_id: node.sheet_id().clone(),
                key: node.key().clone(),
            };
            self.storage.remove(&storage_key);

            let scope = (storage_key.unit_id, storage_key.sheet_id);
            if let Some(slots) = self.scopes.get_mut(&scope) {
                slots.remove(&storage_key.key);
                if slots.is_empty() {
                    self.scopes.remove(&scope);
                }
            }
        }
    }

    // ----- scoped clears ---------------------------------------------------

    /// Clears cell-formula nodes for one sheet, or for every sheet of the
    /// unit when `sheet_id` is `None`.
    pub fn clear_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: Option<SheetId>,
    ) {
        self.clear_category(unit_id.into(), sheet_id, |key| {
            matches!(key, FormulaKey::Cell { .. })
        });
    }

    /// Clears "other" formula nodes for one sheet or the whole unit.
    pub fn clear_other_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: Option<SheetId>,
    ) {
        self.clear_category(unit_id.into(), sheet_id, |key| {
            matches!(key, FormulaKey::Other(_))
        });
    }

    /// Clears feature formula nodes for one sheet or the whole unit.
    pub fn clear_feature_formula_dependency(
        &mut self,
        unit_id: impl Into<UnitId>,
        sheet_id: Option<SheetId>,
    ) {
        self.clear_category(unit_id.into(), sheet_id, |key| {
            matches!(key, FormulaKey::Feature(_))
        });
    }

    fn clear_category(
        &mut self,
        unit_id: UnitId,
        sheet_id: Option<SheetId>,
        category: fn(&FormulaKey) -> bool,
    ) {
        let scopes: Vec<(UnitId, SheetId)> = match sheet_id {
            Some(sheet_id) => vec![(unit_id, sheet_id)],
            None => self
                .scopes
                .keys()
                .filter(|(unit, _)| *unit == unit_id)
                .cloned()
                .collect(),
        };

        for scope in scopes {
            let Some(slots) = self.scopes.get(&scope) else {
                continue;
            };
            let mut doomed: Vec<NodeId> = slots
                .iter()
                .filter(|key| category(key))
                .filter_map(|key| {
                    self.storage
                        .get(&StorageKey {
                            unit_id: scope.0.clone(),
                            sheet_id: scope.1.clone(),
                            key: key.clone(),
                        })
                        .copied()
                })
                .collect();
            doomed.sort_unstable();

            for id in doomed {
                self.remove_node(id);
            }
        }
    }

    // ----- full teardown ---------------------------------------------------

    /// Drops every node, storage entry, and spatial entry, and rewinds the id
    /// counter to zero.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.storage.clear();
        self.scopes.clear();
        self.index.clear();
        self.next_node_id = 0;
    }

    /// Same effect as [`reset`](Self::reset); kept as a distinct entry point
    /// for callers that clear the graph without tearing the manager down.
    pub fn clear_dependency_all(&mut self) {
        self.reset();
    }
}
