//! SQL front-end: maps `sqlparser` ASTs onto the internal statement set.
//!
//! Utility commands that plain SQL grammars do not cover (`HELP`,
//! `SHOW TABLES`, `DESC t`, the `CREATE/DROP INDEX t (col)` shorthand, and
//! `EXIT`) are matched directly before the SQL parser runs.

mod ast;

#[cfg(test)]
mod tests;

pub use ast::*;

use common::{DbError, DbResult};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::Value;

/// Parse SQL text into internal statements.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    if let Some(stmt) = parse_utility(sql)? {
        return Ok(vec![stmt]);
    }
    let dialect = GenericDialect {};
    let stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::Parser(format!("SQL parse error: {e}")))?;
    stmts.into_iter().map(map_statement).collect()
}

/// Recognize the line-oriented utility commands.
fn parse_utility(sql: &str) -> DbResult<Option<Statement>> {
    let text = sql.trim().trim_end_matches(';').trim();
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let stmt = match words.iter().map(String::as_str).collect::<Vec<_>>()[..] {
        ["help"] => Statement::Help,
        ["exit"] | ["quit"] => Statement::Exit,
        ["show", "tables"] => Statement::ShowTables,
        ["desc", name] | ["describe", name] => Statement::DescTable { name: name.into() },
        ["create", "index", ..] => match parse_index_target(&words[2..]) {
            Some((table, column)) => Statement::CreateIndex { table, column },
            None => return Ok(None),
        },
        ["drop", "index", ..] => match parse_index_target(&words[2..]) {
            Some((table, column)) => Statement::DropIndex { table, column },
            None => {
                return Err(DbError::Parser(
                    "expected DROP INDEX <table> (<column>)".into(),
                ))
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(stmt))
}

/// Match the `<table> (<column>)` tail of the index shorthand.
fn parse_index_target(words: &[String]) -> Option<(String, String)> {
    let tail = words.join(" ");
    let (table, rest) = tail.split_once('(')?;
    let column = rest.strip_suffix(')')?;
    let table = table.trim();
    let column = column.trim();
    if table.is_empty() || column.is_empty() || table.contains(char::is_whitespace) {
        return None;
    }
    Some((table.to_string(), column.to_string()))
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable { name, columns, .. } => {
            let table = normalize_object_name(&name)?;
            let cols = columns
                .into_iter()
                .map(|col| ColDef {
                    name: normalize_ident(&col.name),
                    ty: col.data_type.to_string().to_uppercase(),
                })
                .collect();
            Ok(Statement::CreateTable { name: table, cols })
        }
        SqlStatement::Drop {
            object_type, names, ..
        } => match object_type {
            sqlast::ObjectType::Table => Ok(Statement::DropTable {
                name: first_name(names)?,
            }),
            sqlast::ObjectType::Index => Err(DbError::Parser(
                "expected DROP INDEX <table> (<column>)".into(),
            )),
            _ => Err(DbError::Parser(format!(
                "unsupported DROP type: {object_type:?}"
            ))),
        },
        SqlStatement::CreateIndex {
            table_name,
            columns,
            ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let column = map_index_column(columns.first())?;
            Ok(Statement::CreateIndex { table, column })
        }
        SqlStatement::Insert {
            table_name, source, ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source = source.ok_or_else(|| DbError::Parser("INSERT source missing".into()))?;
            let values = extract_values(*source)?;
            Ok(Statement::Insert { table, values })
        }
        SqlStatement::Query(query) => map_select(*query),
        SqlStatement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let table = table_name_from_with_joins(&table)?;
            let sets = assignments
                .into_iter()
                .map(|assign| {
                    let ident = assign
                        .id
                        .last()
                        .ok_or_else(|| DbError::Parser("invalid assignment target".into()))?;
                    Ok((normalize_ident(ident), map_literal(assign.value)?))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let conds = map_where(selection)?;
            Ok(Statement::Update { table, sets, conds })
        }
        SqlStatement::Delete {
            from, selection, ..
        } => {
            if from.len() != 1 {
                return Err(DbError::Parser("DELETE requires one FROM table".into()));
            }
            let table = table_name_from_with_joins(&from[0])?;
            let conds = map_where(selection)?;
            Ok(Statement::Delete { table, conds })
        }
        _ => Err(DbError::Parser("unsupported statement".into())),
    }
}

fn map_select(query: sqlast::Query) -> DbResult<Statement> {
    use sqlast::SetExpr;

    if !query.order_by.is_empty() || query.limit.is_some() || query.offset.is_some() {
        return Err(DbError::Parser(
            "ORDER BY / LIMIT / OFFSET not supported".into(),
        ));
    }
    let select = match *query.body {
        SetExpr::Select(select) => select,
        _ => return Err(DbError::Parser("only plain SELECT is supported".into())),
    };
    let sqlast::Select {
        projection,
        from,
        selection,
        ..
    } = *select;

    if from.is_empty() {
        return Err(DbError::Parser("SELECT requires FROM clause".into()));
    }
    let tables = from
        .iter()
        .map(table_name_from_with_joins)
        .collect::<DbResult<Vec<_>>>()?;

    let mut cols = Vec::new();
    for item in projection {
        match item {
            sqlast::SelectItem::Wildcard(_) => {
                if !cols.is_empty() {
                    return Err(DbError::Parser("cannot mix * with named columns".into()));
                }
                // Empty selector means every column of every FROM table.
                return Ok(Statement::Select {
                    cols: Vec::new(),
                    tables,
                    conds: map_where(selection)?,
                });
            }
            sqlast::SelectItem::UnnamedExpr(expr) => cols.push(map_column(expr)?),
            other => {
                return Err(DbError::Parser(format!(
                    "unsupported select item: {other:?}"
                )))
            }
        }
    }

    Ok(Statement::Select {
        cols,
        tables,
        conds: map_where(selection)?,
    })
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Value>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            let mut rows = values.rows.into_iter();
            let row = rows
                .next()
                .ok_or_else(|| DbError::Parser("INSERT requires a VALUES row".into()))?;
            if rows.next().is_some() {
                return Err(DbError::Parser("multi-row INSERT not supported".into()));
            }
            row.into_iter().map(map_literal).collect()
        }
        _ => Err(DbError::Parser("INSERT expects VALUES list".into())),
    }
}

/// Split a WHERE clause into its AND-ed comparisons.
fn map_where(selection: Option<sqlast::Expr>) -> DbResult<Vec<Condition>> {
    let mut conds = Vec::new();
    if let Some(expr) = selection {
        collect_conds(expr, &mut conds)?;
    }
    Ok(conds)
}

fn collect_conds(expr: sqlast::Expr, out: &mut Vec<Condition>) -> DbResult<()> {
    use sqlast::BinaryOperator as SqlBinary;
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Nested(inner) => collect_conds(*inner, out),
        SqlExpr::BinaryOp { left, op, right } if op == SqlBinary::And => {
            collect_conds(*left, out)?;
            collect_conds(*right, out)
        }
        SqlExpr::BinaryOp { left, op, right } => {
            let lhs = map_column(*left)?;
            let op = map_comp_op(op)?;
            let rhs = match *right {
                SqlExpr::Identifier(_) | SqlExpr::CompoundIdentifier(_) => {
                    CondRhs::Column(map_column(*right)?)
                }
                other => CondRhs::Value(map_literal(other)?),
            };
            out.push(Condition { lhs, op, rhs });
            Ok(())
        }
        other => Err(DbError::Parser(format!(
            "unsupported WHERE clause: {other:?}"
        ))),
    }
}

fn map_comp_op(op: sqlast::BinaryOperator) -> DbResult<CompOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => CompOp::Eq,
        SqlBinary::NotEq => CompOp::Ne,
        SqlBinary::Lt => CompOp::Lt,
        SqlBinary::Gt => CompOp::Gt,
        SqlBinary::LtEq => CompOp::Le,
        SqlBinary::GtEq => CompOp::Ge,
        other => return Err(DbError::Parser(format!("unsupported operator: {other:?}"))),
    })
}

fn map_column(expr: sqlast::Expr) -> DbResult<TabCol> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(TabCol::new("", normalize_ident(&ident))),
        sqlast::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => Ok(TabCol::new(
                normalize_ident(table),
                normalize_ident(column),
            )),
            _ => Err(DbError::Parser("invalid column reference".into())),
        },
        other => Err(DbError::Parser(format!("expected a column, got {other:?}"))),
    }
}

/// Map a literal expression, including a leading minus, to a value.
fn map_literal(expr: sqlast::Expr) -> DbResult<Value> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Value(value) => map_value(value, false),
        SqlExpr::UnaryOp {
            op: sqlast::UnaryOperator::Minus,
            expr,
        } => match *expr {
            SqlExpr::Value(value) => map_value(value, true),
            other => Err(DbError::Parser(format!("unsupported literal: {other:?}"))),
        },
        SqlExpr::Nested(inner) => map_literal(*inner),
        other => Err(DbError::Parser(format!("expected a literal, got {other:?}"))),
    }
}

fn map_value(value: sqlast::Value, negate: bool) -> DbResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            if num.contains(['.', 'e', 'E']) {
                let parsed: f32 = num
                    .parse()
                    .map_err(|_| DbError::Parser(format!("invalid float literal: {num}")))?;
                Ok(Value::Float(if negate { -parsed } else { parsed }))
            } else {
                let parsed: i32 = num
                    .parse()
                    .map_err(|_| DbError::Parser(format!("invalid int literal: {num}")))?;
                Ok(Value::Int(if negate { -parsed } else { parsed }))
            }
        }
        SqlValue::SingleQuotedString(s) if !negate => Ok(Value::Str(s)),
        other => Err(DbError::Parser(format!("unsupported literal: {other:?}"))),
    }
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| DbError::Parser("invalid object name".into()))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(DbError::Parser("DROP requires a target".into()));
    }
    normalize_object_name(&names.remove(0))
}

fn table_name_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(DbError::Parser(
            "explicit JOIN syntax not supported; list tables in FROM".into(),
        ));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name),
        _ => Err(DbError::Parser("unsupported table factor".into())),
    }
}

fn map_index_column(column: Option<&sqlast::OrderByExpr>) -> DbResult<String> {
    let column = column.ok_or_else(|| DbError::Parser("index column required".into()))?;
    match &column.expr {
        sqlast::Expr::Identifier(ident) => Ok(normalize_ident(ident)),
        sqlast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(normalize_ident)
            .ok_or_else(|| DbError::Parser("invalid identifier".into())),
        other => Err(DbError::Parser(format!(
            "unsupported index column: {other:?}"
        ))),
    }
}
