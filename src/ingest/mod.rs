//! Turning a [`StatTable`] into a derived schema and persistable rows.
//!
//! Nothing here touches the database; see [`crate::store`] for that.

use tracing::warn;

use crate::error::{NbaError, Result};
use crate::model::{Cell, Column, DerivedSchema, StatRow, StatTable, StatValue};

/// Season label stored for the footer's aggregate row.
pub const CAREER_LABEL: &str = "CAREER";

/// Header labels that become text columns verbatim.
const TEXT_COLUMNS: [&str; 2] = ["Season", "TEAM"];

/// Footer label that marks the aggregate row.
const OVERALL_LABEL: &str = "Overall:";

/// Map a header label to its persisted column.
///
/// `Season` and `TEAM` keep their name and hold text. Every other label
/// is numeric and is rewritten into a valid identifier: `%` becomes
/// `percent` and `3` becomes `three`, so `FG%` is stored as `FGpercent`
/// and `3PM` as `threePM`.
pub fn column_for_label(label: &str) -> Column {
    let label = label.trim();
    if TEXT_COLUMNS.contains(&label) {
        return Column::text(label);
    }
    Column::numeric(label.replace('%', "percent").replace('3', "three"))
}

pub fn derive_schema(headers: &[String]) -> DerivedSchema {
    headers.iter().map(|label| column_for_label(label)).collect()
}

/// Parse a numeric cell. Blank cells and a lone dash are null.
pub fn parse_number(raw: &str) -> Result<StatValue> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Ok(StatValue::Null);
    }
    raw.parse::<f64>()
        .map(StatValue::Number)
        .map_err(|source| NbaError::NumberParse {
            value: raw.to_string(),
            source,
        })
}

/// Rebuild logical rows from the flat body cell sequence.
///
/// Every [`Cell::Player`] opens a new row that runs until the next player
/// cell or the end of the sequence. Cells seen before the first player
/// cell belong to no row and are dropped.
pub fn segment_rows(cells: &[Cell], playoffs: bool) -> Result<Vec<StatRow>> {
    let mut rows = Vec::new();
    let mut current: Option<StatRow> = None;
    let mut orphans = 0usize;

    for cell in cells {
        let value = match cell {
            Cell::Player(id) => {
                rows.extend(current.take());
                current = Some(StatRow {
                    playoffs,
                    values: vec![StatValue::Text(id.clone())],
                });
                continue;
            }
            // Orphans are never parsed; placeholder text must not fail the batch.
            _ if current.is_none() => {
                orphans += 1;
                continue;
            }
            Cell::Text(label) => StatValue::Text(label.clone()),
            Cell::Value(raw) => parse_number(raw)?,
        };
        if let Some(row) = current.as_mut() {
            row.values.push(value);
        }
    }
    rows.extend(current);

    if orphans > 0 {
        warn!(orphans, "dropped body cells that precede the first player cell");
    }
    Ok(rows)
}

/// Convert the footer into the aggregate row.
///
/// Blank and dash cells are null, the `Overall:` label becomes
/// [`CAREER_LABEL`], numbers are kept as numbers and anything else as
/// text.
pub fn career_row(footer: &[String], playoffs: bool) -> StatRow {
    let values = footer
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw == "-" {
                StatValue::Null
            } else if raw == OVERALL_LABEL {
                StatValue::Text(CAREER_LABEL.to_string())
            } else {
                raw.parse::<f64>()
                    .map(StatValue::Number)
                    .unwrap_or_else(|_| StatValue::Text(raw.to_string()))
            }
        })
        .collect();
    StatRow { playoffs, values }
}

/// All rows one ingest call persists: body rows first, career row last.
pub fn extract_rows(table: &StatTable, playoffs: bool) -> Result<Vec<StatRow>> {
    let mut rows = segment_rows(&table.body, playoffs)?;
    if let Some(footer) = table.footer.as_deref().filter(|f| !f.is_empty()) {
        rows.push(career_row(footer, playoffs));
    }
    Ok(rows)
}
