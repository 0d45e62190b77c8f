//! Semantic checks and evaluation of WHERE-clause conditions.

use catalog::{ColMeta, DbMeta};
use common::{DbError, DbResult};
use parser::{CompOp, CondRhs, Condition, TabCol};
use std::cmp::Ordering;
use types::{ColType, KeyComparator, Value};

/// A literal bound into the storage form of the column it compares against.
#[derive(Clone, Debug)]
pub struct BoundValue {
    pub ty: ColType,
    pub raw: Vec<u8>,
}

#[derive(Clone, Debug)]
pub enum Rhs {
    Val(BoundValue),
    Col(TabCol),
}

/// A checked condition: both sides qualified and type-compatible, literal
/// right-hand sides pre-encoded.
#[derive(Clone, Debug)]
pub struct Cond {
    pub lhs: TabCol,
    pub op: CompOp,
    pub rhs: Rhs,
}

impl Cond {
    /// True if this condition can drive an index interval.
    pub fn is_index_candidate(&self) -> bool {
        matches!(self.rhs, Rhs::Val(_)) && self.op != CompOp::Ne
    }
}

/// All columns of the listed tables, in declaration order.
pub fn get_all_cols(meta: &DbMeta, tables: &[String]) -> DbResult<Vec<ColMeta>> {
    let mut all = Vec::new();
    for tab_name in tables {
        all.extend(meta.table(tab_name)?.cols.iter().cloned());
    }
    Ok(all)
}

/// Qualify a column reference against the visible columns, inferring the
/// table when it is not spelled out.
pub fn check_column(all_cols: &[ColMeta], mut target: TabCol) -> DbResult<TabCol> {
    if target.tab_name.is_empty() {
        let mut tab_name = String::new();
        for col in all_cols {
            if col.name == target.col_name {
                if !tab_name.is_empty() {
                    return Err(DbError::AmbiguousColumn(target.col_name));
                }
                tab_name = col.tab_name.clone();
            }
        }
        if tab_name.is_empty() {
            return Err(DbError::ColumnNotFound(target.col_name));
        }
        target.tab_name = tab_name;
    } else if !all_cols
        .iter()
        .any(|col| col.tab_name == target.tab_name && col.name == target.col_name)
    {
        return Err(DbError::ColumnNotFound(target.to_string()));
    }
    Ok(target)
}

/// Qualify and type-check a WHERE clause, encoding literal right-hand sides
/// into the left column's storage form.
pub fn bind_conds(
    meta: &DbMeta,
    tables: &[String],
    conds: Vec<Condition>,
) -> DbResult<Vec<Cond>> {
    let all_cols = get_all_cols(meta, tables)?;
    conds
        .into_iter()
        .map(|cond| {
            let lhs = check_column(&all_cols, cond.lhs)?;
            let lhs_col = meta.table(&lhs.tab_name)?.col(&lhs.col_name)?;
            let rhs = match cond.rhs {
                CondRhs::Value(value) => {
                    let rhs_ty = value.col_type();
                    if lhs_col.col_type != rhs_ty {
                        return Err(DbError::IncompatibleType(
                            lhs_col.col_type.to_string(),
                            rhs_ty.to_string(),
                        ));
                    }
                    Rhs::Val(BoundValue {
                        ty: rhs_ty,
                        raw: value.to_storage(lhs_col.len as usize)?,
                    })
                }
                CondRhs::Column(rhs) => {
                    let rhs = check_column(&all_cols, rhs)?;
                    let rhs_col = meta.table(&rhs.tab_name)?.col(&rhs.col_name)?;
                    if lhs_col.col_type != rhs_col.col_type {
                        return Err(DbError::IncompatibleType(
                            lhs_col.col_type.to_string(),
                            rhs_col.col_type.to_string(),
                        ));
                    }
                    Rhs::Col(rhs)
                }
            };
            Ok(Cond {
                lhs,
                op: cond.op,
                rhs,
            })
        })
        .collect()
}

/// Locate a qualified column within an operator's schema.
pub fn find_col<'a>(cols: &'a [ColMeta], target: &TabCol) -> DbResult<&'a ColMeta> {
    cols.iter()
        .find(|col| col.tab_name == target.tab_name && col.name == target.col_name)
        .ok_or_else(|| DbError::ColumnNotFound(target.to_string()))
}

/// Evaluate one condition against a record laid out per `cols`.
pub fn eval_cond(cols: &[ColMeta], cond: &Cond, rec: &[u8]) -> DbResult<bool> {
    let lhs_col = find_col(cols, &cond.lhs)?;
    let lhs = &rec[lhs_col.offset as usize..(lhs_col.offset + lhs_col.len) as usize];
    let rhs: &[u8] = match &cond.rhs {
        Rhs::Val(value) => &value.raw,
        Rhs::Col(target) => {
            let rhs_col = find_col(cols, target)?;
            &rec[rhs_col.offset as usize..(rhs_col.offset + rhs_col.len) as usize]
        }
    };
    let ord = KeyComparator::new(lhs_col.col_type, lhs_col.len as usize).compare(lhs, rhs);
    Ok(match cond.op {
        CompOp::Eq => ord == Ordering::Equal,
        CompOp::Ne => ord != Ordering::Equal,
        CompOp::Lt => ord == Ordering::Less,
        CompOp::Gt => ord == Ordering::Greater,
        CompOp::Le => ord != Ordering::Greater,
        CompOp::Ge => ord != Ordering::Less,
    })
}

pub fn eval_conds(cols: &[ColMeta], conds: &[Cond], rec: &[u8]) -> DbResult<bool> {
    for cond in conds {
        if !eval_cond(cols, cond, rec)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Render a stored field for output.
pub fn format_field(col: &ColMeta, rec: &[u8]) -> String {
    Value::from_storage(
        col.col_type,
        &rec[col.offset as usize..(col.offset + col.len) as usize],
    )
    .to_string()
}
