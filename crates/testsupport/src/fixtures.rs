//! Scratch databases and SQL driving helpers.

use common::DbResult;
use database::{Database, QueryResult};
use tempfile::TempDir;

/// A fresh database in a temp directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn scratch_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db_dir = dir.path().join("db");
    Database::create(&db_dir).unwrap();
    let db = Database::open(&db_dir).unwrap();
    (dir, db)
}

/// Parse and run a SQL string, returning the last statement's result.
pub fn exec(db: &mut Database, sql: &str) -> DbResult<QueryResult> {
    let mut last = QueryResult::Empty;
    for stmt in parser::parse_sql(sql)? {
        last = db.execute(stmt)?;
    }
    Ok(last)
}

/// Run a SELECT and return its rows, panicking on anything else.
pub fn rows(db: &mut Database, sql: &str) -> Vec<Vec<String>> {
    match exec(db, sql).unwrap() {
        QueryResult::Rows { rows, .. } => rows,
        other => panic!("expected rows from {sql:?}, got {other:?}"),
    }
}
