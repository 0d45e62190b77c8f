pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Fixed page size used by every file the engine touches, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Null page pointer, persisted as-is wherever a page link may be absent.
pub const NO_PAGE: i32 = -1;

/// Handle for an open paged file.
/// Examples:
/// - `let fid: FileId = pf.open_file(&path)?;`
/// - `pf.close_file(fid)?;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Physical address of a record in a record file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Rid {
    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

/// Address of a key/rid pair in a B+ tree leaf. Same shape as [`Rid`], kept
/// as a distinct type so the two addressing schemes cannot be mixed up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Iid {
    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

/// Canonical error type shared across database subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("file is still open: {}", .0.display())]
    FileNotClosed(PathBuf),
    #[error("file handle {0} is not open")]
    FileNotOpen(u32),

    #[error("database already exists: {0}")]
    DatabaseExists(String),
    #[error("database not found: {0}")]
    DatabaseNotFound(String),
    #[error("table already exists: {0}")]
    TableExists(String),
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("ambiguous column: {0}")]
    AmbiguousColumn(String),
    #[error("index already exists: {0}.{1}")]
    IndexExists(String, String),
    #[error("index not found: {0}.{1}")]
    IndexNotFound(String, String),

    #[error("incompatible types: {0} and {1}")]
    IncompatibleType(String, String),
    #[error("value count does not match column count")]
    InvalidValueCount,
    #[error("string literal exceeds column length")]
    StringOverflow,
    #[error("invalid record size: {0}")]
    InvalidRecordSize(i32),
    #[error("invalid column length: {0}")]
    InvalidColLength(i32),

    #[error("record not found: page {0} slot {1}")]
    RecordNotFound(i32, i32),
    #[error("index entry not found")]
    IndexEntryNotFound,

    #[error("parse: {0}")]
    Parser(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{DbError, DbResult, FileId, Iid, Rid, NO_PAGE, PAGE_SIZE};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_compares_field_wise() {
        assert_eq!(Rid::new(1, 2), Rid::new(1, 2));
        assert_ne!(Rid::new(1, 2), Rid::new(1, 3));
        assert_ne!(Rid::new(1, 2), Rid::new(2, 2));
    }

    #[test]
    fn errors_render_their_context() {
        let err = DbError::RecordNotFound(3, 7);
        assert_eq!(format!("{err}"), "record not found: page 3 slot 7");

        let err = DbError::FileNotClosed(PathBuf::from("/tmp/t"));
        assert!(format!("{err}").contains("/tmp/t"));
    }
}
