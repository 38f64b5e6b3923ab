#![forbid(unsafe_code)]

//! Shared data-contract types for the gridcalc recalculation core.
//!
//! Hosts describe cells and rectangular regions with [`CellRef`] and [`Range`]
//! (0-indexed, inclusive, always normalized), and scope them to a workbook
//! ("unit") and sheet with [`UnitRange`]. These types are the only vocabulary
//! the dependency engine shares with its callers; formula text, values, and
//! rendering never cross this boundary.

mod address;
mod ids;
mod range;

pub use address::{A1ParseError, CellRef, Range, RangeParseError, MAX_COLS, MAX_ROWS};
pub use ids::{SheetId, UnitId};
pub use range::UnitRange;
