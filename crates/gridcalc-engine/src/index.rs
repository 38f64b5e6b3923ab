use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use gridcalc_model::{SheetId, UnitId, UnitRange};
use rstar::{RTree, RTreeObject, AABB};

use crate::node::NodeId;

/// One indexed rectangle, tagged with the node that owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexItem {
    pub node: NodeId,
    pub range: UnitRange,
}

impl IndexItem {
    #[must_use]
    pub fn new(node: NodeId, range: UnitRange) -> Self {
        Self { node, range }
    }
}

/// R-tree leaf: the owning node id plus the rectangle's row/col envelope.
#[derive(Clone, Debug, PartialEq)]
struct IndexEntry {
    node: NodeId,
    range: UnitRange,
}

impl Eq for IndexEntry {}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.range)
    }
}

fn envelope_of(range: &UnitRange) -> AABB<[i64; 2]> {
    let min = [
        i64::from(range.range.start.row),
        i64::from(range.range.start.col),
    ];
    let max = [
        i64::from(range.range.end.row),
        i64::from(range.range.end.col),
    ];
    AABB::from_corners(min, max)
}

/// Spatial index over every node's input rectangles.
///
/// Keeps one R-tree per `(unit, sheet)` scope, so cross-sheet queries never
/// touch each other's trees and dropping a whole sheet is a single map
/// removal. Intersection tests are purely geometric; the index knows nothing
/// about formula content.
#[derive(Debug, Default)]
pub struct RangeIndex {
    trees: AHashMap<(UnitId, SheetId), RTree<IndexEntry>>,
    len: usize,
}

impl RangeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed rectangles across all scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bulk_insert(&mut self, items: impl IntoIterator<Item = IndexItem>) {
        for item in items {
            let scope = (item.range.unit_id.clone(), item.range.sheet_id.clone());
            self.trees.entry(scope).or_insert_with(RTree::new).insert(IndexEntry {
                node: item.node,
                range: item.range,
            });
            self.len += 1;
        }
    }

    pub fn bulk_remove(&mut self, items: impl IntoIterator<Item = IndexItem>) {
        for item in items {
            let scope = (item.range.unit_id.clone(), item.range.sheet_id.clone());
            let Some(tree) = self.trees.get_mut(&scope) else {
                continue;
            };
            let entry = IndexEntry {
                node: item.node,
                range: item.range,
            };
            if tree.remove(&entry).is_some() {
                self.len -= 1;
            }
            if tree.size() == 0 {
                self.trees.remove(&scope);
            }
        }
    }

    /// Ids of nodes with at least one rectangle intersecting `query`,
    /// deduplicated and sorted ascending.
    #[must_use]
    pub fn search(&self, query: &UnitRange) -> Vec<NodeId> {
        let scope = (query.unit_id.clone(), query.sheet_id.clone());
        let Some(tree) = self.trees.get(&scope) else {
            return Vec::new();
        };

        let hits: BTreeSet<NodeId> = tree
            .locate_in_envelope_intersecting(&envelope_of(query))
            .map(|entry| entry.node)
            .collect();
        hits.into_iter().collect()
    }

    /// Runs [`search`](Self::search) for every query and merges the matches
    /// into one deterministic node-id → item mapping.
    #[must_use]
    pub fn bulk_search(&self, queries: &[UnitRange]) -> BTreeMap<NodeId, IndexItem> {
        let mut out = BTreeMap::new();
        for query in queries {
            let scope = (query.unit_id.clone(), query.sheet_id.clone());
            let Some(tree) = self.trees.get(&scope) else {
                continue;
            };
            for entry in tree.locate_in_envelope_intersecting(&envelope_of(query)) {
                out.entry(entry.node)
                    .or_insert_with(|| IndexItem::new(entry.node, entry.range.clone()));
            }
        }
        out
    }

    /// Drops every rectangle indexed under `(unit, sheet)`.
    pub fn remove_scope(&mut self, unit_id: &UnitId, sheet_id: &SheetId) {
        if let Some(tree) = self.trees.remove(&(unit_id.clone(), sheet_id.clone())) {
            self.len -= tree.size();
        }
    }

    pub fn clear(&mut self) {
        self.trees.clear();
        self.len = 0;
    }
}
