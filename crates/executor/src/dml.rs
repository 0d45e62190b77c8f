//! Statement-level execution: INSERT, DELETE, UPDATE, SELECT.

use crate::cond::{bind_conds, check_column, format_field, get_all_cols, Cond, Rhs};
use crate::scan::TableScanExec;
use crate::{ExecutionContext, Executor, NestedLoopJoinExec, ProjectExec};
use common::{DbError, DbResult, Rid};
use index::index_file_name;
use parser::{Condition, TabCol};
use tracing::debug;
use types::Value;

/// Insert one row, maintaining every index on the table.
pub fn insert_into(
    ctx: &mut ExecutionContext<'_>,
    tab_name: &str,
    values: Vec<Value>,
) -> DbResult<usize> {
    let tab = ctx.meta.table(tab_name)?;
    if values.len() != tab.cols.len() {
        return Err(DbError::InvalidValueCount);
    }

    let mut rec = vec![0u8; tab.record_size() as usize];
    for (col, value) in tab.cols.iter().zip(&values) {
        if col.col_type != value.col_type() {
            return Err(DbError::IncompatibleType(
                col.col_type.to_string(),
                value.col_type().to_string(),
            ));
        }
        let raw = value.to_storage(col.len as usize)?;
        rec[col.offset as usize..(col.offset + col.len) as usize].copy_from_slice(&raw);
    }

    let rid = file_of(ctx.files, tab_name)?.insert_record(ctx.pf, &rec)?;

    for (col_idx, col) in tab.cols.iter().enumerate() {
        if col.index {
            let ih = index_of(ctx.indexes, tab_name, col_idx)?;
            ih.insert_entry(
                ctx.pf,
                &rec[col.offset as usize..(col.offset + col.len) as usize],
                rid,
            )?;
        }
    }
    Ok(1)
}

/// Delete every row matching the conditions, index entries first.
pub fn delete_from(
    ctx: &mut ExecutionContext<'_>,
    tab_name: &str,
    conds: Vec<Condition>,
) -> DbResult<usize> {
    let conds = bind_conds(ctx.meta, &[tab_name.to_string()], conds)?;
    let rids = collect_rids(ctx, tab_name, conds)?;
    debug!(table = tab_name, n = rids.len(), "deleting rows");

    let tab = ctx.meta.table(tab_name)?;
    for &rid in &rids {
        let rec = file_of(ctx.files, tab_name)?.get_record(ctx.pf, rid)?;
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = index_of(ctx.indexes, tab_name, col_idx)?;
                ih.delete_entry(
                    ctx.pf,
                    &rec[col.offset as usize..(col.offset + col.len) as usize],
                    rid,
                )?;
            }
        }
        file_of(ctx.files, tab_name)?.delete_record(ctx.pf, rid)?;
    }
    Ok(rids.len())
}

/// Update matching rows in place, cycling the affected index entries.
pub fn update_set(
    ctx: &mut ExecutionContext<'_>,
    tab_name: &str,
    sets: Vec<(String, Value)>,
    conds: Vec<Condition>,
) -> DbResult<usize> {
    let conds = bind_conds(ctx.meta, &[tab_name.to_string()], conds)?;
    let tab = ctx.meta.table(tab_name)?;

    // Bind the SET clauses: (column ordinal, encoded bytes).
    let mut bound_sets = Vec::with_capacity(sets.len());
    for (col_name, value) in &sets {
        let col = tab.col(col_name)?;
        if col.col_type != value.col_type() {
            return Err(DbError::IncompatibleType(
                col.col_type.to_string(),
                value.col_type().to_string(),
            ));
        }
        bound_sets.push((
            tab.col_idx(col_name)?,
            value.to_storage(col.len as usize)?,
        ));
    }

    let rids = collect_rids(ctx, tab_name, conds)?;
    debug!(table = tab_name, n = rids.len(), "updating rows");

    // Only indexes on assigned columns need maintenance.
    let indexed_targets: Vec<usize> = bound_sets
        .iter()
        .map(|&(col_idx, _)| col_idx)
        .filter(|&col_idx| tab.cols[col_idx].index)
        .collect();

    for &rid in &rids {
        let mut rec = file_of(ctx.files, tab_name)?.get_record(ctx.pf, rid)?;
        for &col_idx in &indexed_targets {
            let col = &tab.cols[col_idx];
            let ih = index_of(ctx.indexes, tab_name, col_idx)?;
            ih.delete_entry(
                ctx.pf,
                &rec[col.offset as usize..(col.offset + col.len) as usize],
                rid,
            )?;
        }
        for (col_idx, raw) in &bound_sets {
            let col = &tab.cols[*col_idx];
            rec[col.offset as usize..(col.offset + col.len) as usize].copy_from_slice(raw);
        }
        file_of(ctx.files, tab_name)?.update_record(ctx.pf, rid, &rec)?;
        for &col_idx in &indexed_targets {
            let col = &tab.cols[col_idx];
            let ih = index_of(ctx.indexes, tab_name, col_idx)?;
            ih.insert_entry(
                ctx.pf,
                &rec[col.offset as usize..(col.offset + col.len) as usize],
                rid,
            )?;
        }
    }
    Ok(rids.len())
}

/// Run a SELECT, returning column captions and stringified rows.
pub fn select_from(
    ctx: &mut ExecutionContext<'_>,
    sel_cols: Vec<TabCol>,
    tables: Vec<String>,
    conds: Vec<Condition>,
) -> DbResult<(Vec<String>, Vec<Vec<String>>)> {
    let all_cols = get_all_cols(ctx.meta, &tables)?;
    let sel_cols: Vec<TabCol> = if sel_cols.is_empty() {
        all_cols
            .iter()
            .map(|col| TabCol::new(col.tab_name.clone(), col.name.clone()))
            .collect()
    } else {
        sel_cols
            .into_iter()
            .map(|sel| check_column(&all_cols, sel))
            .collect::<DbResult<_>>()?
    };
    let conds = bind_conds(ctx.meta, &tables, conds)?;

    // Single-table conditions push down to their scan; cross-table ones run
    // at the first join level where both sides are visible.
    let level_of = |tab_name: &str| tables.iter().position(|t| t == tab_name).unwrap();
    let mut scan_conds: Vec<Vec<Cond>> = vec![Vec::new(); tables.len()];
    let mut join_conds: Vec<Vec<Cond>> = vec![Vec::new(); tables.len()];
    for cond in conds {
        let lhs_level = level_of(&cond.lhs.tab_name);
        match &cond.rhs {
            Rhs::Val(_) => scan_conds[lhs_level].push(cond),
            Rhs::Col(rhs) => {
                let rhs_level = level_of(&rhs.tab_name);
                if lhs_level == rhs_level {
                    scan_conds[lhs_level].push(cond);
                } else {
                    join_conds[lhs_level.max(rhs_level)].push(cond);
                }
            }
        }
    }

    let mut plan: Box<dyn Executor> = Box::new(TableScanExec::new(
        ctx.meta,
        &tables[0],
        std::mem::take(&mut scan_conds[0]),
    )?);
    for (level, tab_name) in tables.iter().enumerate().skip(1) {
        let right = Box::new(TableScanExec::new(
            ctx.meta,
            tab_name,
            std::mem::take(&mut scan_conds[level]),
        )?);
        plan = Box::new(NestedLoopJoinExec::new(
            plan,
            right,
            std::mem::take(&mut join_conds[level]),
        ));
    }
    let mut plan = ProjectExec::new(plan, &sel_cols)?;

    plan.open(ctx)?;
    let captions = sel_cols.iter().map(|sel| sel.col_name.clone()).collect();
    let mut rows = Vec::new();
    while let Some(rec) = plan.next(ctx)? {
        rows.push(
            plan.cols()
                .iter()
                .map(|col| format_field(col, &rec))
                .collect(),
        );
    }
    Ok((captions, rows))
}

fn collect_rids(
    ctx: &mut ExecutionContext<'_>,
    tab_name: &str,
    conds: Vec<Cond>,
) -> DbResult<Vec<Rid>> {
    let mut scan = TableScanExec::new(ctx.meta, tab_name, conds)?;
    scan.open(ctx)?;
    let mut rids = Vec::new();
    while scan.next(ctx)?.is_some() {
        rids.push(scan.rid());
    }
    Ok(rids)
}

fn file_of<'b>(
    files: &'b mut std::collections::BTreeMap<String, record::RecordFile>,
    tab_name: &str,
) -> DbResult<&'b mut record::RecordFile> {
    files
        .get_mut(tab_name)
        .ok_or_else(|| DbError::TableNotFound(tab_name.to_string()))
}

fn index_of<'b>(
    indexes: &'b mut std::collections::BTreeMap<String, index::IndexHandle>,
    tab_name: &str,
    col_idx: usize,
) -> DbResult<&'b mut index::IndexHandle> {
    let name = index_file_name(tab_name, col_idx);
    indexes
        .get_mut(&name)
        .ok_or_else(|| DbError::Internal(format!("index file {name} is not open")))
}
