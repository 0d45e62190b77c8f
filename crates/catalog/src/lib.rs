//! System catalog: table and column metadata, persisted as a text sidecar.
//!
//! The catalog lives in `db.meta` inside the database directory and is the
//! source of truth for schemas and for which columns carry an index. When
//! [`ColMeta::index`] is set, the index file named
//! `<table>.<column ordinal>.idx` exists next to the record file.

use std::collections::BTreeMap;
use std::{fs, path::Path};

use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use types::ColType;

/// File name of the catalog sidecar within a database directory.
pub const DB_META_NAME: &str = "db.meta";

/// Describes one column of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColMeta {
    pub tab_name: String,
    pub name: String,
    pub col_type: ColType,
    pub len: i32,
    /// Byte offset of this column within the fixed-width record.
    pub offset: i32,
    /// Whether a B+ tree index exists on this column.
    pub index: bool,
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabMeta {
    pub name: String,
    pub cols: Vec<ColMeta>,
}

impl TabMeta {
    pub fn is_col(&self, col_name: &str) -> bool {
        self.cols.iter().any(|c| c.name == col_name)
    }

    pub fn col(&self, col_name: &str) -> DbResult<&ColMeta> {
        self.cols
            .iter()
            .find(|c| c.name == col_name)
            .ok_or_else(|| DbError::ColumnNotFound(col_name.to_string()))
    }

    pub fn col_mut(&mut self, col_name: &str) -> DbResult<&mut ColMeta> {
        self.cols
            .iter_mut()
            .find(|c| c.name == col_name)
            .ok_or_else(|| DbError::ColumnNotFound(col_name.to_string()))
    }

    /// Ordinal of a column, which doubles as its index-file number.
    pub fn col_idx(&self, col_name: &str) -> DbResult<usize> {
        self.cols
            .iter()
            .position(|c| c.name == col_name)
            .ok_or_else(|| DbError::ColumnNotFound(col_name.to_string()))
    }

    /// Total record width in bytes.
    pub fn record_size(&self) -> i32 {
        self.cols.last().map(|c| c.offset + c.len).unwrap_or(0)
    }
}

/// The whole catalog: every table of the open database, in name order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DbMeta {
    pub name: String,
    pub tabs: BTreeMap<String, TabMeta>,
}

impl DbMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tabs: BTreeMap::new(),
        }
    }

    pub fn is_table(&self, tab_name: &str) -> bool {
        self.tabs.contains_key(tab_name)
    }

    pub fn table(&self, tab_name: &str) -> DbResult<&TabMeta> {
        self.tabs
            .get(tab_name)
            .ok_or_else(|| DbError::TableNotFound(tab_name.to_string()))
    }

    pub fn table_mut(&mut self, tab_name: &str) -> DbResult<&mut TabMeta> {
        self.tabs
            .get_mut(tab_name)
            .ok_or_else(|| DbError::TableNotFound(tab_name.to_string()))
    }

    /// Load the sidecar at `path`.
    pub fn load(path: &Path) -> DbResult<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|err| DbError::Internal(format!("invalid catalog file: {err}")))
    }

    /// Persist the catalog as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Internal(format!("catalog serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_table() -> TabMeta {
        TabMeta {
            name: "users".into(),
            cols: vec![
                ColMeta {
                    tab_name: "users".into(),
                    name: "id".into(),
                    col_type: ColType::Int,
                    len: 4,
                    offset: 0,
                    index: true,
                },
                ColMeta {
                    tab_name: "users".into(),
                    name: "name".into(),
                    col_type: ColType::Str,
                    len: 16,
                    offset: 4,
                    index: false,
                },
            ],
        }
    }

    #[test]
    fn lookups_and_record_size() {
        let tab = sample_table();
        assert!(tab.is_col("id"));
        assert!(!tab.is_col("missing"));
        assert_eq!(tab.col_idx("name").unwrap(), 1);
        assert_eq!(tab.record_size(), 20);
        assert!(matches!(
            tab.col("missing"),
            Err(DbError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn table_lookup_errors() {
        let mut meta = DbMeta::new("db");
        assert!(matches!(
            meta.table("users"),
            Err(DbError::TableNotFound(_))
        ));
        meta.tabs.insert("users".into(), sample_table());
        assert_eq!(meta.table("users").unwrap().name, "users");
    }

    #[test]
    fn persistence_round_trip() {
        let mut meta = DbMeta::new("db");
        meta.tabs.insert("users".into(), sample_table());

        let dir = tempdir().unwrap();
        let path = dir.path().join(DB_META_NAME);
        meta.save(&path).unwrap();

        let loaded = DbMeta::load(&path).unwrap();
        assert_eq!(loaded, meta);
        assert!(loaded.table("users").unwrap().cols[0].index);
    }
}
