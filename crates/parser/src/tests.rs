use super::*;
use pretty_assertions::assert_eq;

fn one(sql: &str) -> Statement {
    let mut stmts = parse_sql(sql).unwrap();
    assert_eq!(stmts.len(), 1, "expected one statement from {sql:?}");
    stmts.pop().unwrap()
}

#[test]
fn create_table_keeps_raw_types() {
    let stmt = one("CREATE TABLE tb (a INT, b FLOAT, s CHAR(16));");
    assert_eq!(
        stmt,
        Statement::CreateTable {
            name: "tb".into(),
            cols: vec![
                ColDef { name: "a".into(), ty: "INT".into() },
                ColDef { name: "b".into(), ty: "FLOAT".into() },
                ColDef { name: "s".into(), ty: "CHAR(16)".into() },
            ],
        }
    );
}

#[test]
fn insert_parses_literals() {
    let stmt = one("INSERT INTO tb VALUES (1, -2.5, 'ada');");
    assert_eq!(
        stmt,
        Statement::Insert {
            table: "tb".into(),
            values: vec![
                types::Value::Int(1),
                types::Value::Float(-2.5),
                types::Value::Str("ada".into()),
            ],
        }
    );
}

#[test]
fn select_star_with_conjunction() {
    let stmt = one("SELECT * FROM tb WHERE a = 1 AND s > 'm';");
    match stmt {
        Statement::Select { cols, tables, conds } => {
            assert!(cols.is_empty());
            assert_eq!(tables, vec!["tb".to_string()]);
            assert_eq!(conds.len(), 2);
            assert_eq!(conds[0].lhs, TabCol::new("", "a"));
            assert_eq!(conds[0].op, CompOp::Eq);
            assert_eq!(conds[0].rhs, CondRhs::Value(types::Value::Int(1)));
            assert_eq!(conds[1].op, CompOp::Gt);
        }
        other => panic!("unexpected statement {other:?}"),
    }
}

#[test]
fn select_qualified_columns_from_two_tables() {
    let stmt = one("SELECT x.a, y.b FROM x, y WHERE x.a = y.b;");
    match stmt {
        Statement::Select { cols, tables, conds } => {
            assert_eq!(cols, vec![TabCol::new("x", "a"), TabCol::new("y", "b")]);
            assert_eq!(tables, vec!["x".to_string(), "y".to_string()]);
            assert_eq!(conds[0].rhs, CondRhs::Column(TabCol::new("y", "b")));
        }
        other => panic!("unexpected statement {other:?}"),
    }
}

#[test]
fn update_and_delete_with_where() {
    let stmt = one("UPDATE tb SET a = 3 WHERE s <> 'x';");
    match stmt {
        Statement::Update { table, sets, conds } => {
            assert_eq!(table, "tb");
            assert_eq!(sets, vec![("a".to_string(), types::Value::Int(3))]);
            assert_eq!(conds[0].op, CompOp::Ne);
        }
        other => panic!("unexpected statement {other:?}"),
    }

    let stmt = one("DELETE FROM tb WHERE a <= 5;");
    match stmt {
        Statement::Delete { table, conds } => {
            assert_eq!(table, "tb");
            assert_eq!(conds[0].op, CompOp::Le);
        }
        other => panic!("unexpected statement {other:?}"),
    }
}

#[test]
fn index_shorthand_and_standard_forms() {
    assert_eq!(
        one("CREATE INDEX tb (a);"),
        Statement::CreateIndex { table: "tb".into(), column: "a".into() }
    );
    assert_eq!(
        one("CREATE INDEX idx_a ON tb (a);"),
        Statement::CreateIndex { table: "tb".into(), column: "a".into() }
    );
    assert_eq!(
        one("DROP INDEX tb (a);"),
        Statement::DropIndex { table: "tb".into(), column: "a".into() }
    );
}

#[test]
fn utility_commands() {
    assert_eq!(one("help;"), Statement::Help);
    assert_eq!(one("exit"), Statement::Exit);
    assert_eq!(one("SHOW TABLES;"), Statement::ShowTables);
    assert_eq!(one("desc tb;"), Statement::DescTable { name: "tb".into() });
    assert_eq!(
        one("DROP TABLE tb;"),
        Statement::DropTable { name: "tb".into() }
    );
}

#[test]
fn rejects_what_the_engine_cannot_run() {
    assert!(parse_sql("SELECT * FROM t JOIN u ON t.a = u.b;").is_err());
    assert!(parse_sql("SELECT a FROM t ORDER BY a;").is_err());
    assert!(parse_sql("INSERT INTO t VALUES (1), (2);").is_err());
    assert!(parse_sql("SELECT * FROM t WHERE a = 1 OR b = 2;").is_err());
    assert!(parse_sql("not sql at all;").is_err());
}
