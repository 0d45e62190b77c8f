//! Interactive SQL console: one argument, the database directory.
//!
//! Statements are terminated by `;` and may span lines. Engine errors are
//! printed and the session continues; only setup and teardown failures are
//! fatal.

use anyhow::Result;
use clap::Parser;
use common::pretty::{self, TableStyleKind};
use database::{Database, QueryResult};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shale", about = "Interactive SQL console for the shale database")]
struct Args {
    /// Database directory; created if it does not exist
    db_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !Database::exists(&args.db_dir) {
        Database::create(&args.db_dir)?;
    }
    let mut db = Database::open(&args.db_dir)?;
    println!("shale {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help;' for help.\n");

    let mut rl = DefaultEditor::new()?;
    let mut buffer = String::new();
    'session: loop {
        let prompt = if buffer.is_empty() { "shale> " } else { "   ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if line.trim().is_empty() && buffer.is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str()).ok();
                buffer.push_str(&line);
                buffer.push('\n');
                for stmt in drain_statements(&mut buffer) {
                    if !run_statement(&mut db, &stmt) {
                        break 'session;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    db.close()?;
    println!("Bye");
    Ok(())
}

/// Cut every `;`-terminated statement out of the buffer, leaving the rest.
/// Semicolons inside single-quoted strings do not terminate.
fn drain_statements(buffer: &mut String) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    let mut consumed = 0;
    for (at, ch) in buffer.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => {
                let stmt = buffer[start..=at].trim();
                if !stmt.trim_end_matches(';').trim().is_empty() {
                    out.push(stmt.to_string());
                }
                start = at + 1;
                consumed = at + 1;
            }
            _ => {}
        }
    }
    buffer.drain(..consumed);
    out
}

/// Run one statement; false means the session should end.
fn run_statement(db: &mut Database, sql: &str) -> bool {
    let stmts = match parser::parse_sql(sql) {
        Ok(stmts) => stmts,
        Err(err) => {
            eprintln!("{err}");
            return true;
        }
    };
    for stmt in stmts {
        match db.execute(stmt) {
            Ok(QueryResult::Rows { captions, rows }) => {
                let count = rows.len();
                println!(
                    "{}",
                    pretty::render_table(&captions, &rows, TableStyleKind::Ascii)
                );
                println!("{}", pretty::record_count_line(count));
            }
            Ok(QueryResult::Count(n)) => println!("{}", pretty::record_count_line(n)),
            Ok(QueryResult::Empty) => {}
            Ok(QueryResult::Help) => println!("{}", database::help_text()),
            Ok(QueryResult::Exit) => return false,
            Err(err) => eprintln!("{err}"),
        }
    }
    true
}
