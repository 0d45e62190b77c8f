//! The database engine: one value owning every moving part.
//!
//! A database is a directory holding the `db.meta` catalog sidecar, one
//! record file per table, and one `<table>.<col>.idx` file per indexed
//! column. [`Database`] owns the page cache, the loaded catalog, and the
//! open record/index handles, and passes them to the executor as an explicit
//! context; there is no process-wide state. `open` and `close` must be
//! paired: close writes the catalog and every file header back and flushes
//! all cached pages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::{ColMeta, DbMeta, TabMeta, DB_META_NAME};
use common::{DbError, DbResult};
use executor::ExecutionContext;
use index::{index_file_name, IndexHandle};
use pagefile::PagedFiles;
use parser::{ColDef, Statement};
use record::{RecordFile, RmScan};
use tracing::info;
use types::ColType;

/// What a statement hands back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// A result set, already stringified for display.
    Rows {
        captions: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Number of rows a DML statement touched.
    Count(usize),
    /// DDL and other statements with no output.
    Empty,
    Help,
    Exit,
}

const HELP_TEXT: &str = "\
Supported SQL syntax:
  command ;
command:
  CREATE TABLE table_name (column_name type [, column_name type ...])
  DROP TABLE table_name
  CREATE INDEX table_name (column_name)
  DROP INDEX table_name (column_name)
  INSERT INTO table_name VALUES (value [, value ...])
  DELETE FROM table_name [WHERE where_clause]
  UPDATE table_name SET column_name = value [, ...] [WHERE where_clause]
  SELECT selector FROM table_name [, table_name ...] [WHERE where_clause]
  SHOW TABLES
  DESC table_name
type:
  {INT | FLOAT | CHAR(n)}
where_clause:
  condition [AND condition ...]
condition:
  column op {column | value}
column:
  [table_name.]column_name
op:
  {= | <> | < | > | <= | >=}
selector:
  {* | column [, column ...]}";

pub fn help_text() -> &'static str {
    HELP_TEXT
}

/// A single-user database over one directory.
#[derive(Debug)]
pub struct Database {
    dir: PathBuf,
    meta: DbMeta,
    pf: PagedFiles,
    files: BTreeMap<String, RecordFile>,
    indexes: BTreeMap<String, IndexHandle>,
}

impl Database {
    /// Does `dir` look like a database directory?
    pub fn exists(dir: &Path) -> bool {
        dir.is_dir()
    }

    /// Create a fresh database directory with an empty catalog.
    pub fn create(dir: &Path) -> DbResult<()> {
        if Self::exists(dir) {
            return Err(DbError::DatabaseExists(dir.display().to_string()));
        }
        fs::create_dir_all(dir)?;
        DbMeta::new(dir.display().to_string()).save(&dir.join(DB_META_NAME))?;
        Ok(())
    }

    /// Remove a database directory and everything in it.
    pub fn destroy(dir: &Path) -> DbResult<()> {
        if !Self::exists(dir) {
            return Err(DbError::DatabaseNotFound(dir.display().to_string()));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    /// Open a database: load the catalog, then open every record file and
    /// every index the catalog declares.
    pub fn open(dir: &Path) -> DbResult<Self> {
        if !Self::exists(dir) {
            return Err(DbError::DatabaseNotFound(dir.display().to_string()));
        }
        let meta = DbMeta::load(&dir.join(DB_META_NAME))?;
        let mut db = Self {
            dir: dir.to_path_buf(),
            meta,
            pf: PagedFiles::new(),
            files: BTreeMap::new(),
            indexes: BTreeMap::new(),
        };
        for tab in db.meta.tabs.values() {
            let fh = RecordFile::open(&mut db.pf, &db.dir.join(&tab.name))?;
            db.files.insert(tab.name.clone(), fh);
            for (col_idx, col) in tab.cols.iter().enumerate() {
                if col.index {
                    let name = index_file_name(&tab.name, col_idx);
                    let ih = IndexHandle::open(&mut db.pf, &db.dir.join(&name))?;
                    db.indexes.insert(name, ih);
                }
            }
        }
        info!(dir = %dir.display(), tables = db.files.len(), "opened database");
        Ok(db)
    }

    /// Write the catalog and every open file back, releasing all handles.
    pub fn close(mut self) -> DbResult<()> {
        self.meta.save(&self.dir.join(DB_META_NAME))?;
        for (_, fh) in std::mem::take(&mut self.files) {
            fh.close(&mut self.pf)?;
        }
        for (_, ih) in std::mem::take(&mut self.indexes) {
            ih.close(&mut self.pf)?;
        }
        info!(dir = %self.dir.display(), "closed database");
        Ok(())
    }

    /// Run one parsed statement.
    pub fn execute(&mut self, stmt: Statement) -> DbResult<QueryResult> {
        match stmt {
            Statement::CreateTable { name, cols } => {
                self.create_table(&name, cols)?;
                Ok(QueryResult::Empty)
            }
            Statement::DropTable { name } => {
                self.drop_table(&name)?;
                Ok(QueryResult::Empty)
            }
            Statement::CreateIndex { table, column } => {
                self.create_index(&table, &column)?;
                Ok(QueryResult::Empty)
            }
            Statement::DropIndex { table, column } => {
                self.drop_index(&table, &column)?;
                Ok(QueryResult::Empty)
            }
            Statement::Insert { table, values } => {
                let n = executor::insert_into(&mut self.ctx(), &table, values)?;
                Ok(QueryResult::Count(n))
            }
            Statement::Delete { table, conds } => {
                let n = executor::delete_from(&mut self.ctx(), &table, conds)?;
                Ok(QueryResult::Count(n))
            }
            Statement::Update { table, sets, conds } => {
                let n = executor::update_set(&mut self.ctx(), &table, sets, conds)?;
                Ok(QueryResult::Count(n))
            }
            Statement::Select {
                cols,
                tables,
                conds,
            } => {
                let (captions, rows) =
                    executor::select_from(&mut self.ctx(), cols, tables, conds)?;
                Ok(QueryResult::Rows { captions, rows })
            }
            Statement::ShowTables => Ok(self.show_tables()),
            Statement::DescTable { name } => self.desc_table(&name),
            Statement::Help => Ok(QueryResult::Help),
            Statement::Exit => Ok(QueryResult::Exit),
        }
    }

    fn ctx(&mut self) -> ExecutionContext<'_> {
        ExecutionContext {
            meta: &self.meta,
            pf: &mut self.pf,
            files: &mut self.files,
            indexes: &mut self.indexes,
        }
    }

    fn create_table(&mut self, tab_name: &str, col_defs: Vec<ColDef>) -> DbResult<()> {
        if self.meta.is_table(tab_name) {
            return Err(DbError::TableExists(tab_name.to_string()));
        }
        let mut cols = Vec::with_capacity(col_defs.len());
        let mut offset = 0;
        for def in &col_defs {
            let (col_type, len) = map_sql_type(&def.ty)?;
            cols.push(ColMeta {
                tab_name: tab_name.to_string(),
                name: def.name.clone(),
                col_type,
                len,
                offset,
                index: false,
            });
            offset += len;
        }
        let tab = TabMeta {
            name: tab_name.to_string(),
            cols,
        };

        RecordFile::create(&mut self.pf, &self.dir.join(tab_name), tab.record_size())?;
        let fh = RecordFile::open(&mut self.pf, &self.dir.join(tab_name))?;
        self.files.insert(tab_name.to_string(), fh);
        self.meta.tabs.insert(tab_name.to_string(), tab);
        Ok(())
    }

    fn drop_table(&mut self, tab_name: &str) -> DbResult<()> {
        let tab = self.meta.table(tab_name)?.clone();
        // Drop the indexes first, then the record file.
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let name = index_file_name(tab_name, col_idx);
                if let Some(ih) = self.indexes.remove(&name) {
                    ih.close(&mut self.pf)?;
                }
                IndexHandle::destroy(&self.pf, &self.dir.join(&name))?;
            }
        }
        if let Some(fh) = self.files.remove(tab_name) {
            fh.close(&mut self.pf)?;
        }
        RecordFile::destroy(&self.pf, &self.dir.join(tab_name))?;
        self.meta.tabs.remove(tab_name);
        Ok(())
    }

    /// Create an index and bulk-load every existing record into it.
    fn create_index(&mut self, tab_name: &str, col_name: &str) -> DbResult<()> {
        let tab = self.meta.table(tab_name)?;
        let col = tab.col(col_name)?.clone();
        if col.index {
            return Err(DbError::IndexExists(
                tab_name.to_string(),
                col_name.to_string(),
            ));
        }
        let col_idx = tab.col_idx(col_name)?;
        let name = index_file_name(tab_name, col_idx);
        let path = self.dir.join(&name);
        IndexHandle::create(&mut self.pf, &path, col.col_type, col.len)?;
        let mut ih = IndexHandle::open(&mut self.pf, &path)?;

        let fh = self
            .files
            .get(tab_name)
            .ok_or_else(|| DbError::TableNotFound(tab_name.to_string()))?;
        let mut scan = RmScan::new(&mut self.pf, fh)?;
        while !scan.is_end() {
            let rid = scan.rid();
            let rec = fh.get_record(&mut self.pf, rid)?;
            let key = &rec[col.offset as usize..(col.offset + col.len) as usize];
            ih.insert_entry(&mut self.pf, key, rid)?;
            scan.next(&mut self.pf)?;
        }

        self.indexes.insert(name, ih);
        self.meta.table_mut(tab_name)?.col_mut(col_name)?.index = true;
        Ok(())
    }

    fn drop_index(&mut self, tab_name: &str, col_name: &str) -> DbResult<()> {
        let tab = self.meta.table(tab_name)?;
        if !tab.col(col_name)?.index {
            return Err(DbError::IndexNotFound(
                tab_name.to_string(),
                col_name.to_string(),
            ));
        }
        let col_idx = tab.col_idx(col_name)?;
        let name = index_file_name(tab_name, col_idx);
        if let Some(ih) = self.indexes.remove(&name) {
            ih.close(&mut self.pf)?;
        }
        IndexHandle::destroy(&self.pf, &self.dir.join(&name))?;
        self.meta.table_mut(tab_name)?.col_mut(col_name)?.index = false;
        Ok(())
    }

    fn show_tables(&self) -> QueryResult {
        QueryResult::Rows {
            captions: vec!["Tables".to_string()],
            rows: self
                .meta
                .tabs
                .values()
                .map(|tab| vec![tab.name.clone()])
                .collect(),
        }
    }

    fn desc_table(&self, tab_name: &str) -> DbResult<QueryResult> {
        let tab = self.meta.table(tab_name)?;
        Ok(QueryResult::Rows {
            captions: vec!["Field".into(), "Type".into(), "Index".into()],
            rows: tab
                .cols
                .iter()
                .map(|col| {
                    vec![
                        col.name.clone(),
                        render_col_type(col),
                        if col.index { "YES" } else { "NO" }.to_string(),
                    ]
                })
                .collect(),
        })
    }
}

fn render_col_type(col: &ColMeta) -> String {
    match col.col_type {
        ColType::Str => format!("CHAR({})", col.len),
        other => other.to_string(),
    }
}

/// Resolve a SQL type as written (`INT`, `FLOAT`, `CHAR(n)`) to its storage
/// type and width.
fn map_sql_type(raw: &str) -> DbResult<(ColType, i32)> {
    let raw = raw.trim().to_uppercase();
    match raw.as_str() {
        "INT" | "INTEGER" => Ok((ColType::Int, 4)),
        "FLOAT" | "REAL" => Ok((ColType::Float, 4)),
        _ => {
            let len = raw
                .strip_prefix("CHAR(")
                .or_else(|| raw.strip_prefix("VARCHAR("))
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.trim().parse::<i32>().ok())
                .ok_or_else(|| DbError::Parser(format!("unsupported SQL type '{raw}'")))?;
            Ok((ColType::Str, len))
        }
    }
}
