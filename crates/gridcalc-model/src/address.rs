use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of rows per sheet (Excel-compatible: 1,048,576).
pub const MAX_ROWS: u32 = 1_048_576;
/// Maximum number of columns per sheet (Excel-compatible: 16,384, i.e. `XFD`).
pub const MAX_COLS: u32 = 16_384;

/// A single cell coordinate within a sheet.
///
/// Rows and columns are **0-indexed**: `row = 0` is spreadsheet row `1`,
/// `col = 0` is column `A`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Render as A1 notation (e.g. `A1`, `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// Parse an A1-style reference. `$` anchors are accepted and ignored.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim().trim_start_matches('$');
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let letters_end = s
            .bytes()
            .position(|b| !b.is_ascii_alphabetic())
            .unwrap_or(s.len());
        if letters_end == 0 {
            return Err(A1ParseError::MissingColumn);
        }

        let col = name_to_col(&s[..letters_end])?;
        if col >= MAX_COLS {
            return Err(A1ParseError::ColumnOutOfBounds);
        }

        let digits = s[letters_end..].trim_start_matches('$');
        if digits.is_empty() {
            return Err(A1ParseError::MissingRow);
        }
        let row_1based: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
        if row_1based == 0 || row_1based > MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self::new(row_1based - 1, col))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// A rectangular region within a sheet.
///
/// Inclusive on both ends and always normalized (`start.row <= end.row`,
/// `start.col <= end.col`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// Construct a range from two corners, normalizing if needed.
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let start_row = if a.row <= b.row { a.row } else { b.row };
        let end_row = if a.row <= b.row { b.row } else { a.row };
        let start_col = if a.col <= b.col { a.col } else { b.col };
        let end_col = if a.col <= b.col { b.col } else { a.col };
        Self {
            start: CellRef::new(start_row, start_col),
            end: CellRef::new(end_row, end_col),
        }
    }

    /// A 1x1 range covering a single cell.
    pub const fn single(cell: CellRef) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    /// Returns true if the two rectangles share at least one cell.
    #[inline]
    pub const fn intersects(&self, other: &Range) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Parse `A1:B2` or a single-cell reference like `C3`.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }

        match s.split_once(':') {
            None => Ok(Range::single(CellRef::from_a1(s)?)),
            Some((a, b)) => Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?)),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Errors produced when parsing an A1 cell reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("column out of bounds")]
    ColumnOutOfBounds,
    #[error("invalid row in A1 reference")]
    InvalidRow,
}

/// Errors produced when parsing an A1 range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("empty A1 range")]
    Empty,
    #[error("invalid cell reference in range: {0}")]
    Cell(#[from] A1ParseError),
}

fn col_to_name(col: u32) -> String {
    // A1 columns are effectively bijective base-26; stored 0-based internally.
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).expect("column letters are always valid UTF-8")
}

fn name_to_col(s: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col == 0 {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}
