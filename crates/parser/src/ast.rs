use types::Value;

/// A column definition as written in `CREATE TABLE`, type still in SQL form
/// (e.g. `INT`, `CHAR(16)`); the database layer resolves it.
#[derive(Clone, Debug, PartialEq)]
pub struct ColDef {
    pub name: String,
    pub ty: String,
}

/// A possibly table-qualified column reference. An empty `tab_name` means
/// the table is inferred from context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabCol {
    pub tab_name: String,
    pub col_name: String,
}

impl TabCol {
    pub fn new(tab_name: impl Into<String>, col_name: impl Into<String>) -> Self {
        Self {
            tab_name: tab_name.into(),
            col_name: col_name.into(),
        }
    }
}

impl std::fmt::Display for TabCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tab_name.is_empty() {
            write!(f, "{}", self.col_name)
        } else {
            write!(f, "{}.{}", self.tab_name, self.col_name)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Right-hand side of a comparison: a literal or another column.
#[derive(Clone, Debug, PartialEq)]
pub enum CondRhs {
    Value(Value),
    Column(TabCol),
}

/// One conjunct of a WHERE clause: `column op (column | literal)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub lhs: TabCol,
    pub op: CompOp,
    pub rhs: CondRhs,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        cols: Vec<ColDef>,
    },
    DropTable {
        name: String,
    },
    CreateIndex {
        table: String,
        column: String,
    },
    DropIndex {
        table: String,
        column: String,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        conds: Vec<Condition>,
    },
    Update {
        table: String,
        sets: Vec<(String, Value)>,
        conds: Vec<Condition>,
    },
    /// `cols` empty means `SELECT *`.
    Select {
        cols: Vec<TabCol>,
        tables: Vec<String>,
        conds: Vec<Condition>,
    },
    ShowTables,
    DescTable {
        name: String,
    },
    Help,
    Exit,
}
