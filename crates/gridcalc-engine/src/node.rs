use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use gridcalc_model::{SheetId, UnitId, UnitRange};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Process-unique identifier of a dependency node.
///
/// Allocated monotonically by the [`DependencyManager`](crate::DependencyManager)
/// and never reused until a full reset.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a node lives inside its `(unit, sheet)` scope.
///
/// The three variants are the three formula categories: cell formulas are
/// addressed by coordinates, "other" formulas (defined-name driven) by a
/// formula id, and feature formulas (e.g. conditional formatting) by the
/// registering feature's id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormulaKey {
    Cell { row: u32, col: u32 },
    Other(String),
    Feature(String),
}

/// Transient calculation state of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Not yet considered by the current pass.
    #[default]
    Pending,
    /// Needs recomputation.
    Dirty,
    /// Recomputed and up to date.
    Calculated,
}

/// The narrow capability the engine requires of a formula representation.
///
/// The dependency graph never inspects formula text or ASTs; it only asks
/// which rectangles a formula reads and whether it references a defined name
/// (used for name-based cleanup). Any formula representation can participate
/// by implementing this trait.
pub trait FormulaSource: fmt::Debug {
    /// The rectangles this formula reads as input.
    fn ranges(&self) -> Vec<UnitRange>;

    /// True if the formula references the given defined name.
    fn references_defined_name(&self, _name: &str) -> bool {
        false
    }
}

/// A fixed input set; convenient for hosts whose reference extraction runs
/// ahead of registration, and for tests.
impl FormulaSource for Vec<UnitRange> {
    fn ranges(&self) -> Vec<UnitRange> {
        self.clone()
    }
}

/// One formula's record of what it reads and who reads its result.
///
/// Parent/child relationships are stored as id sets resolved against the
/// manager's arena rather than as shared references, so full-graph teardown is
/// a plain arena clear and the sets stay cheap to copy around.
#[derive(Debug)]
pub struct DependencyNode {
    id: NodeId,
    unit_id: UnitId,
    sheet_id: SheetId,
    key: FormulaKey,
    /// Input rectangles, snapshotted from the source at registration.
    range_list: SmallVec<[UnitRange; 2]>,
    /// Rectangle(s) this node produces into: the node's own cell for cell
    /// formulas, empty for other/feature formulas (their outputs are not
    /// addressable by geometry).
    output_ranges: SmallVec<[UnitRange; 1]>,
    source: Arc<dyn FormulaSource>,
    state: NodeState,
    /// Nodes that depend on this node's output.
    parents: BTreeSet<NodeId>,
    /// Nodes this node depends on.
    children: BTreeSet<NodeId>,
}

impl DependencyNode {
    pub(crate) fn new(
        id: NodeId,
        unit_id: UnitId,
        sheet_id: SheetId,
        key: FormulaKey,
        source: Arc<dyn FormulaSource>,
    ) -> Self {
        let range_list: SmallVec<[UnitRange; 2]> = source.ranges().into_iter().collect();
        let output_ranges: SmallVec<[UnitRange; 1]> = match key {
            FormulaKey::Cell { row, col } => {
                let mut out = SmallVec::new();
                out.push(UnitRange::single_cell(
                    unit_id.clone(),
                    sheet_id.clone(),
                    row,
                    col,
                ));
                out
            }
            _ => SmallVec::new(),
        };

        Self {
            id,
            unit_id,
            sheet_id,
            key,
            range_list,
            output_ranges,
            source,
            state: NodeState::Pending,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    #[must_use]
    pub fn sheet_id(&self) -> &SheetId {
        &self.sheet_id
    }

    #[must_use]
    pub fn key(&self) -> &FormulaKey {
        &self.key
    }

    /// Input rectangles this node reads.
    #[must_use]
    pub fn range_list(&self) -> &[UnitRange] {
        &self.range_list
    }

    /// Rectangle(s) this node writes into (empty for other/feature formulas).
    #[must_use]
    pub fn output_ranges(&self) -> &[UnitRange] {
        &self.output_ranges
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Nodes that depend on this node's output.
    #[must_use]
    pub fn parents(&self) -> &BTreeSet<NodeId> {
        &self.parents
    }

    /// Nodes this node depends on.
    #[must_use]
    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    #[must_use]
    pub fn has_child(&self, id: NodeId) -> bool {
        self.children.contains(&id)
    }

    /// Asks the underlying formula representation about a defined name.
    #[must_use]
    pub fn references_defined_name(&self, name: &str) -> bool {
        self.source.references_defined_name(name)
    }

    /// Clears transient calculation state ahead of a rebuild pass.
    pub fn reset_state(&mut self) {
        self.state = NodeState::Pending;
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub(crate) fn insert_child(&mut self, id: NodeId) {
        self.children.insert(id);
    }

    pub(crate) fn insert_parent(&mut self, id: NodeId) {
        self.parents.insert(id);
    }

    pub(crate) fn remove_child(&mut self, id: NodeId) {
        self.children.remove(&id);
    }

    pub(crate) fn remove_parent(&mut self, id: NodeId) {
        self.parents.remove(&id);
    }

    /// Severs the node from the graph; the manager calls this as the last step
    /// of teardown.
    pub(crate) fn dispose(&mut self) {
        self.parents.clear();
        self.children.clear();
        self.state = NodeState::Pending;
    }
}
