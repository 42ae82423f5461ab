pub(crate) mod table;

use ::scraper::{ElementRef, Selector};

use crate::error::Result;

pub use table::parse_stat_table;

/// Text that precedes the first child element of `element`, trimmed.
pub(crate) fn leading_text(element: &ElementRef) -> String {
    element
        .children()
        .next()
        .and_then(|node| node.value().as_text())
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Leading text of the first `span` inside `element`, or of `element`
/// itself when it has no span.
pub(crate) fn span_text(element: &ElementRef) -> Result<String> {
    let span_selector = Selector::parse("span")?;
    Ok(element
        .select(&span_selector)
        .next()
        .map(|span| leading_text(&span))
        .unwrap_or_else(|| leading_text(element)))
}

pub(crate) fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Value of the first query parameter in `href`, e.g. `2017-18` for
/// `/player/2544/?Season=2017-18&SeasonType=Regular%20Season`.
pub(crate) fn first_query_value(href: &str) -> Option<&str> {
    href.split('=').nth(1)?.split('&').next()
}
