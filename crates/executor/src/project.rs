//! Projection onto a column subset.

use crate::cond::find_col;
use crate::{ExecutionContext, Executor};
use catalog::ColMeta;
use common::DbResult;
use parser::TabCol;

/// Copies the selected columns of each input record into a narrower record.
pub struct ProjectExec {
    input: Box<dyn Executor>,
    cols: Vec<ColMeta>,
    /// Source (offset, len) per projected column.
    src: Vec<(usize, usize)>,
    len: usize,
}

impl ProjectExec {
    pub fn new(input: Box<dyn Executor>, sel_cols: &[TabCol]) -> DbResult<Self> {
        let mut cols = Vec::with_capacity(sel_cols.len());
        let mut src = Vec::with_capacity(sel_cols.len());
        let mut offset = 0;
        for sel in sel_cols {
            let col = find_col(input.cols(), sel)?;
            src.push((col.offset as usize, col.len as usize));
            let mut col = col.clone();
            col.offset = offset;
            offset += col.len;
            cols.push(col);
        }
        Ok(Self {
            input,
            cols,
            src,
            len: offset as usize,
        })
    }
}

impl Executor for ProjectExec {
    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<Option<Vec<u8>>> {
        let Some(rec) = self.input.next(ctx)? else {
            return Ok(None);
        };
        let mut out = vec![0u8; self.len];
        for (col, &(src_offset, len)) in self.cols.iter().zip(&self.src) {
            out[col.offset as usize..col.offset as usize + len]
                .copy_from_slice(&rec[src_offset..src_offset + len]);
        }
        Ok(Some(out))
    }
}
