use super::*;
use catalog::{ColMeta, TabMeta};
use common::DbError;
use index::{index_file_name, IndexHandle};
use parser::{CompOp, CondRhs, Condition, TabCol};
use pretty_assertions::assert_eq;
use record::RecordFile;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;
use types::{ColType, Value};

struct Harness {
    meta: DbMeta,
    pf: PagedFiles,
    files: BTreeMap<String, RecordFile>,
    indexes: BTreeMap<String, IndexHandle>,
}

impl Harness {
    fn ctx(&mut self) -> ExecutionContext<'_> {
        ExecutionContext {
            meta: &self.meta,
            pf: &mut self.pf,
            files: &mut self.files,
            indexes: &mut self.indexes,
        }
    }
}

fn int_col(tab: &str, name: &str, offset: i32, index: bool) -> ColMeta {
    ColMeta {
        tab_name: tab.into(),
        name: name.into(),
        col_type: ColType::Int,
        len: 4,
        offset,
        index,
    }
}

/// Table t(s int indexed, a int) plus table u(a int, b int), both open.
fn setup(dir: &Path) -> Harness {
    let mut meta = DbMeta::new("scratch");
    meta.tabs.insert(
        "t".into(),
        TabMeta {
            name: "t".into(),
            cols: vec![int_col("t", "s", 0, true), int_col("t", "a", 4, false)],
        },
    );
    meta.tabs.insert(
        "u".into(),
        TabMeta {
            name: "u".into(),
            cols: vec![int_col("u", "a", 0, false), int_col("u", "b", 4, false)],
        },
    );

    let mut pf = PagedFiles::new();
    let mut files = BTreeMap::new();
    let mut indexes = BTreeMap::new();
    for tab in ["t", "u"] {
        let path = dir.join(tab);
        RecordFile::create(&mut pf, &path, 8).unwrap();
        files.insert(tab.to_string(), RecordFile::open(&mut pf, &path).unwrap());
    }
    let ih_name = index_file_name("t", 0);
    let ih_path = dir.join(&ih_name);
    IndexHandle::create(&mut pf, &ih_path, ColType::Int, 4).unwrap();
    indexes.insert(ih_name, IndexHandle::open(&mut pf, &ih_path).unwrap());

    Harness {
        meta,
        pf,
        files,
        indexes,
    }
}

fn cond(lhs: TabCol, op: CompOp, rhs: CondRhs) -> Condition {
    Condition { lhs, op, rhs }
}

fn int_rhs(v: i32) -> CondRhs {
    CondRhs::Value(Value::Int(v))
}

#[test]
fn insert_and_select_star() {
    let dir = tempdir().unwrap();
    let mut h = setup(dir.path());
    let mut ctx = h.ctx();

    for (s, a) in [(0, 10), (2, 20), (2, 21), (4, 40), (5, 50)] {
        insert_into(&mut ctx, "t", vec![Value::Int(s), Value::Int(a)]).unwrap();
    }

    let (captions, rows) = select_from(&mut ctx, vec![], vec!["t".into()], vec![]).unwrap();
    assert_eq!(captions, vec!["s", "a"]);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], vec!["0", "10"]);
}

#[test]
fn select_equality_on_indexed_column() {
    let dir = tempdir().unwrap();
    let mut h = setup(dir.path());
    let mut ctx = h.ctx();

    for (s, a) in [(0, 10), (2, 20), (2, 21), (4, 40), (5, 50)] {
        insert_into(&mut ctx, "t", vec![Value::Int(s), Value::Int(a)]).unwrap();
    }
    let (_, rows) = select_from(
        &mut ctx,
        vec![],
        vec!["t".into()],
        vec![cond(TabCol::new("", "s"), CompOp::Eq, int_rhs(2))],
    )
    .unwrap();
    assert_eq!(rows, vec![vec!["2", "20"], vec!["2", "21"]]);

    // Every interval operator maps onto index bounds.
    for (op, expect) in [
        (CompOp::Lt, vec!["0", "2", "2"]),
        (CompOp::Le, vec!["0", "2", "2", "4"]),
        (CompOp::Gt, vec!["5"]),
        (CompOp::Ge, vec!["4", "5"]),
    ] {
        let (_, rows) = select_from(
            &mut ctx,
            vec![TabCol::new("", "s")],
            vec!["t".into()],
            vec![cond(TabCol::new("", "s"), op, int_rhs(4))],
        )
        .unwrap();
        let got: Vec<String> = rows.into_iter().map(|mut r| r.remove(0)).collect();
        assert_eq!(got, expect, "operator {op:?}");
    }
}

#[test]
fn delete_and_update_maintain_the_index() {
    let dir = tempdir().unwrap();
    let mut h = setup(dir.path());
    let mut ctx = h.ctx();

    for (s, a) in [(1, 10), (2, 20), (3, 30)] {
        insert_into(&mut ctx, "t", vec![Value::Int(s), Value::Int(a)]).unwrap();
    }

    let n = delete_from(
        &mut ctx,
        "t",
        vec![cond(TabCol::new("", "s"), CompOp::Eq, int_rhs(2))],
    )
    .unwrap();
    assert_eq!(n, 1);
    let (_, rows) = select_from(
        &mut ctx,
        vec![],
        vec!["t".into()],
        vec![cond(TabCol::new("", "s"), CompOp::Eq, int_rhs(2))],
    )
    .unwrap();
    assert!(rows.is_empty());

    let n = update_set(
        &mut ctx,
        "t",
        vec![("s".into(), Value::Int(9))],
        vec![cond(TabCol::new("", "s"), CompOp::Eq, int_rhs(1))],
    )
    .unwrap();
    assert_eq!(n, 1);
    let (_, rows) = select_from(
        &mut ctx,
        vec![],
        vec!["t".into()],
        vec![cond(TabCol::new("", "s"), CompOp::Eq, int_rhs(9))],
    )
    .unwrap();
    assert_eq!(rows, vec![vec!["9".to_string(), "10".to_string()]]);
}

#[test]
fn join_on_columns_across_tables() {
    let dir = tempdir().unwrap();
    let mut h = setup(dir.path());
    let mut ctx = h.ctx();

    for (s, a) in [(1, 100), (2, 200)] {
        insert_into(&mut ctx, "t", vec![Value::Int(s), Value::Int(a)]).unwrap();
    }
    for (a, b) in [(100, 7), (300, 8)] {
        insert_into(&mut ctx, "u", vec![Value::Int(a), Value::Int(b)]).unwrap();
    }

    let (captions, rows) = select_from(
        &mut ctx,
        vec![],
        vec!["t".into(), "u".into()],
        vec![cond(
            TabCol::new("t", "a"),
            CompOp::Eq,
            CondRhs::Column(TabCol::new("u", "a")),
        )],
    )
    .unwrap();
    assert_eq!(captions, vec!["s", "a", "a", "b"]);
    assert_eq!(rows, vec![vec!["1", "100", "100", "7"]]);
}

#[test]
fn semantic_errors_are_reported() {
    let dir = tempdir().unwrap();
    let mut h = setup(dir.path());
    let mut ctx = h.ctx();

    // Bare `a` exists in both t and u.
    let err = select_from(
        &mut ctx,
        vec![TabCol::new("", "a")],
        vec!["t".into(), "u".into()],
        vec![],
    )
    .unwrap_err();
    assert!(matches!(err, DbError::AmbiguousColumn(_)));

    let err = select_from(
        &mut ctx,
        vec![TabCol::new("", "missing")],
        vec!["t".into()],
        vec![],
    )
    .unwrap_err();
    assert!(matches!(err, DbError::ColumnNotFound(_)));

    let err = insert_into(&mut ctx, "t", vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(err, DbError::InvalidValueCount));

    let err = insert_into(&mut ctx, "t", vec![Value::Int(1), Value::Str("x".into())])
        .unwrap_err();
    assert!(matches!(err, DbError::IncompatibleType(_, _)));

    let err = select_from(
        &mut ctx,
        vec![],
        vec!["t".into()],
        vec![cond(TabCol::new("", "s"), CompOp::Eq, CondRhs::Value(Value::Str("x".into())))],
    )
    .unwrap_err();
    assert!(matches!(err, DbError::IncompatibleType(_, _)));
}
