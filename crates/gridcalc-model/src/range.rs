use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{CellRef, Range, SheetId, UnitId};

/// A rectangular region pinned to a concrete unit and sheet.
///
/// This is the rectangle contract the engine shares with its hosts: both a
/// formula's input ranges and the "changed cells" queries that drive
/// recalculation are expressed as `UnitRange`s.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitRange {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub range: Range,
}

impl UnitRange {
    #[must_use]
    pub fn new(unit_id: impl Into<UnitId>, sheet_id: impl Into<SheetId>, range: Range) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            range,
        }
    }

    /// A 1x1 range covering one cell.
    #[must_use]
    pub fn single_cell(
        unit_id: impl Into<UnitId>,
        sheet_id: impl Into<SheetId>,
        row: u32,
        col: u32,
    ) -> Self {
        Self::new(unit_id, sheet_id, Range::single(CellRef::new(row, col)))
    }

    /// Geometric overlap test. Ranges on different units or sheets never
    /// intersect, regardless of coordinates.
    #[must_use]
    pub fn intersects(&self, other: &UnitRange) -> bool {
        self.unit_id == other.unit_id
            && self.sheet_id == other.sheet_id
            && self.range.intersects(&other.range)
    }
}

impl fmt::Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}!{}", self.unit_id, self.sheet_id, self.range)
    }
}
