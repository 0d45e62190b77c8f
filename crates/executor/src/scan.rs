//! Table access: sequential record scan or index interval scan.

use crate::cond::{eval_conds, Cond, Rhs};
use crate::{ExecutionContext, Executor};
use catalog::ColMeta;
use common::{DbError, DbResult, Rid};
use index::{index_file_name, IxScan};
use parser::CompOp;
use pagefile::PagedFiles;
use record::RmScan;
use tracing::debug;

/// The two ways of walking a table; both yield record ids.
enum AccessPath {
    Seq(RmScan),
    Index(IxScan),
}

impl AccessPath {
    fn is_end(&self) -> bool {
        match self {
            AccessPath::Seq(scan) => scan.is_end(),
            AccessPath::Index(scan) => scan.is_end(),
        }
    }

    fn rid(&self, pf: &mut PagedFiles) -> DbResult<Rid> {
        match self {
            AccessPath::Seq(scan) => Ok(scan.rid()),
            AccessPath::Index(scan) => scan.rid(pf),
        }
    }

    fn next(&mut self, pf: &mut PagedFiles) -> DbResult<()> {
        match self {
            AccessPath::Seq(scan) => scan.next(pf),
            AccessPath::Index(scan) => scan.next(pf),
        }
    }
}

/// Scans one table, applying its pushed-down conditions.
///
/// On open, the first condition of shape `col op literal` (with `op` not
/// `<>`) over an indexed column switches the scan onto that index, narrowed
/// to the interval the operator implies; otherwise every record page is
/// walked.
pub struct TableScanExec {
    tab_name: String,
    cols: Vec<ColMeta>,
    conds: Vec<Cond>,
    path: Option<AccessPath>,
    rid: Rid,
}

impl TableScanExec {
    pub fn new(
        meta: &catalog::DbMeta,
        tab_name: &str,
        conds: Vec<Cond>,
    ) -> DbResult<Self> {
        let tab = meta.table(tab_name)?;
        debug_assert!(conds.iter().all(|c| c.lhs.tab_name == tab_name));
        Ok(Self {
            tab_name: tab_name.to_string(),
            cols: tab.cols.clone(),
            conds,
            path: None,
            rid: Rid::new(common::NO_PAGE, -1),
        })
    }

    /// Record id of the most recently returned record.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    fn choose_path(&self, ctx: &mut ExecutionContext<'_>) -> DbResult<AccessPath> {
        let tab = ctx.meta.table(&self.tab_name)?;
        for cond in &self.conds {
            if !cond.is_index_candidate() {
                continue;
            }
            let col = tab.col(&cond.lhs.col_name)?;
            if !col.index {
                continue;
            }
            let col_idx = tab.col_idx(&cond.lhs.col_name)?;
            let ih_name = index_file_name(&self.tab_name, col_idx);
            let ih = ctx.indexes.get(&ih_name).ok_or_else(|| {
                DbError::Internal(format!("index file {ih_name} is not open"))
            })?;
            let Rhs::Val(value) = &cond.rhs else {
                unreachable!();
            };
            let key = value.raw.as_slice();
            let (lower, upper) = match cond.op {
                CompOp::Eq => (
                    ih.lower_bound(ctx.pf, key)?,
                    ih.upper_bound(ctx.pf, key)?,
                ),
                CompOp::Lt => (ih.leaf_begin(), ih.lower_bound(ctx.pf, key)?),
                CompOp::Gt => (ih.upper_bound(ctx.pf, key)?, ih.leaf_end(ctx.pf)?),
                CompOp::Le => (ih.leaf_begin(), ih.upper_bound(ctx.pf, key)?),
                CompOp::Ge => (ih.lower_bound(ctx.pf, key)?, ih.leaf_end(ctx.pf)?),
                CompOp::Ne => unreachable!(),
            };
            debug!(table = %self.tab_name, column = %cond.lhs.col_name, "index scan");
            return Ok(AccessPath::Index(IxScan::new(ih, lower, upper)));
        }

        debug!(table = %self.tab_name, "sequential scan");
        let fh = ctx
            .files
            .get(&self.tab_name)
            .ok_or_else(|| DbError::TableNotFound(self.tab_name.clone()))?;
        Ok(AccessPath::Seq(RmScan::new(ctx.pf, fh)?))
    }
}

impl Executor for TableScanExec {
    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<()> {
        self.path = Some(self.choose_path(ctx)?);
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<Option<Vec<u8>>> {
        let path = self
            .path
            .as_mut()
            .ok_or_else(|| DbError::Internal("scan used before open".into()))?;
        let fh = ctx
            .files
            .get(&self.tab_name)
            .ok_or_else(|| DbError::TableNotFound(self.tab_name.clone()))?;
        while !path.is_end() {
            let rid = path.rid(ctx.pf)?;
            let rec = fh.get_record(ctx.pf, rid)?;
            path.next(ctx.pf)?;
            if eval_conds(&self.cols, &self.conds, &rec)? {
                self.rid = rid;
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }
}
