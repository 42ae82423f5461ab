use ::scraper::{ElementRef, Html, Selector};
use itertools::Itertools;
use tracing::debug;

use crate::error::{NbaError, Result};
use crate::model::{Cell, StatTable};
use crate::scraper::{first_query_value, has_class, leading_text, span_text};

/// Parse the first `<table>` in `html` into a [`StatTable`].
///
/// `html` is usually a table's `outerHTML` as read from the browser, but
/// a whole page works too.
pub fn parse_stat_table(html: &str) -> Result<StatTable> {
    let document = Html::parse_fragment(html);
    let table_selector = Selector::parse("table")?;
    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| NbaError::malformed("no <table> element in fragment"))?;

    let headers = parse_headers(&table)?;
    let body = parse_body(&table)?;
    let footer = parse_footer(&table)?;

    debug!(
        headers = headers.len(),
        cells = body.len(),
        has_footer = footer.is_some(),
        "parsed stat table"
    );

    Ok(StatTable {
        headers,
        body,
        footer,
    })
}

fn parse_headers(table: &ElementRef) -> Result<Vec<String>> {
    let th_selector = Selector::parse("th")?;
    table
        .select(&th_selector)
        .map(|th| {
            if has_class(&th, "text") {
                span_text(&th)
            } else {
                Ok(leading_text(&th))
            }
        })
        .collect()
}

fn parse_body(table: &ElementRef) -> Result<Vec<Cell>> {
    let tbody_selector = Selector::parse("tbody")?;
    let tbody = table
        .select(&tbody_selector)
        .next()
        .ok_or_else(|| NbaError::malformed("stat table has no <tbody>"))?;

    let td_selector = Selector::parse("td")?;
    tbody.select(&td_selector).map(|td| parse_cell(&td)).collect()
}

fn parse_cell(td: &ElementRef) -> Result<Cell> {
    if has_class(td, "player") {
        let link_selector = Selector::parse("a[href]")?;
        let id = td
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(first_query_value)
            .ok_or_else(|| NbaError::malformed("player cell without a linked identifier"))?;
        return Ok(Cell::Player(id.to_string()));
    }

    if has_class(td, "text") {
        return Ok(Cell::Text(span_text(td)?));
    }

    Ok(Cell::Value(leading_text(td)))
}

fn parse_footer(table: &ElementRef) -> Result<Option<Vec<String>>> {
    let tfoot_selector = Selector::parse("tfoot")?;
    let Some(tfoot) = table.select(&tfoot_selector).next() else {
        return Ok(None);
    };

    let td_selector = Selector::parse("td")?;
    Ok(Some(
        tfoot.select(&td_selector).map(|td| leading_text(&td)).collect_vec(),
    ))
}
