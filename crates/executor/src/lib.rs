//! Query execution over the record and index layers.
//!
//! Operators follow a pull-based iterator model: each one exposes
//! `open`/`next` and pulls fixed-width records from its child, with the
//! execution context threaded through every call so no operator holds a
//! page or file borrow between calls. Scans yield record ids and fetch the
//! record bytes through the record manager; the index path is chosen per
//! table when a usable indexed condition exists.

mod cond;
mod dml;
mod join;
mod project;
mod scan;

#[cfg(test)]
mod tests;

pub use cond::{
    bind_conds, check_column, eval_cond, eval_conds, find_col, format_field, get_all_cols,
    BoundValue, Cond, Rhs,
};
pub use dml::{delete_from, insert_into, select_from, update_set};
pub use join::NestedLoopJoinExec;
pub use project::ProjectExec;
pub use scan::TableScanExec;

use catalog::{ColMeta, DbMeta};
use common::DbResult;
use index::IndexHandle;
use pagefile::PagedFiles;
use record::RecordFile;
use std::collections::BTreeMap;

/// Everything a statement needs while it runs, borrowed from the database.
pub struct ExecutionContext<'a> {
    pub meta: &'a DbMeta,
    pub pf: &'a mut PagedFiles,
    /// Open record files, keyed by table name.
    pub files: &'a mut BTreeMap<String, RecordFile>,
    /// Open index handles, keyed by index file name.
    pub indexes: &'a mut BTreeMap<String, IndexHandle>,
}

/// A pull-based operator producing fixed-width records.
pub trait Executor {
    /// Schema of the produced records.
    fn cols(&self) -> &[ColMeta];

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<()>;

    /// The next record, or `None` once exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<Option<Vec<u8>>>;
}
