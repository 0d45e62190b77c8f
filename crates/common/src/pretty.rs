//! Tabular rendering of query output.

use tabled::{builder::Builder, settings};

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Ascii,
    Modern,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut tabled::Table) {
        match self {
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Modern => table.with(settings::Style::modern()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render header and string rows into a human-friendly table string.
pub fn render_table(headers: &[String], rows: &[Vec<String>], style: TableStyleKind) -> String {
    if headers.is_empty() && rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    if !headers.is_empty() {
        builder.push_record(headers.iter().cloned());
    }
    for row in rows {
        builder.push_record(row.iter().cloned());
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Footer line reporting how many records a statement touched or returned.
pub fn record_count_line(n: usize) -> String {
    format!("{n} record(s)")
}
