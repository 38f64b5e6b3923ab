#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! Formula dependency tracking and recalculation scheduling.
//!
//! This crate is the in-process core behind incremental recalculation for a
//! multi-workbook spreadsheet host: it tracks which rectangles every formula
//! reads, maintains parent/child edges between formulas whose inputs and
//! outputs overlap, and orders recomputation so dependencies are always
//! evaluated before their dependents.
//!
//! The entry point is [`DependencyManager`]. Hosts register formulas in three
//! categories — cell formulas (addressed by row/column), defined-name driven
//! "other" formulas, and feature-plugin formulas such as conditional
//! formatting — each described only through the narrow [`FormulaSource`]
//! capability. Edits arrive as changed [`UnitRange`](gridcalc_model::UnitRange)
//! rectangles; [`DependencyManager::calculation_order`] resolves them into a
//! topologically ordered evaluation schedule. Actually evaluating formulas is
//! the host's job.
//!
//! Everything here is single-threaded and synchronous: operations run to
//! completion on the calling thread, and batching across many edits is the
//! caller's responsibility.

mod index;
mod manager;
mod node;
mod schedule;

pub use index::{IndexItem, RangeIndex};
pub use manager::{DependencyManager, ManagerStats};
pub use node::{DependencyNode, FormulaKey, FormulaSource, NodeId, NodeState};
pub use schedule::CycleError;
