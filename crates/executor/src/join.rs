//! Nested-loop join over fixed-width records.

use crate::cond::{eval_conds, Cond};
use crate::{ExecutionContext, Executor};
use catalog::ColMeta;
use common::DbResult;

/// Joins two inputs by materializing the right side and pairing it with each
/// left record in turn; the join conditions run on the combined record.
pub struct NestedLoopJoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Cond>,
    cols: Vec<ColMeta>,
    left_rec: Option<Vec<u8>>,
    right_recs: Vec<Vec<u8>>,
    cursor: usize,
}

impl NestedLoopJoinExec {
    pub fn new(left: Box<dyn Executor>, right: Box<dyn Executor>, conds: Vec<Cond>) -> Self {
        let left_len: i32 = left.cols().iter().map(|c| c.len).sum();
        let mut cols = left.cols().to_vec();
        cols.extend(right.cols().iter().map(|col| {
            let mut col = col.clone();
            col.offset += left_len;
            col
        }));
        Self {
            left,
            right,
            conds,
            cols,
            left_rec: None,
            right_recs: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for NestedLoopJoinExec {
    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        self.right_recs.clear();
        while let Some(rec) = self.right.next(ctx)? {
            self.right_recs.push(rec);
        }
        self.left_rec = self.left.next(ctx)?;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> DbResult<Option<Vec<u8>>> {
        loop {
            let Some(left_rec) = &self.left_rec else {
                return Ok(None);
            };
            while self.cursor < self.right_recs.len() {
                let mut combined = left_rec.clone();
                combined.extend_from_slice(&self.right_recs[self.cursor]);
                self.cursor += 1;
                if eval_conds(&self.cols, &self.conds, &combined)? {
                    return Ok(Some(combined));
                }
            }
            self.left_rec = self.left.next(ctx)?;
            self.cursor = 0;
        }
    }
}
