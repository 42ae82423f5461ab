use serde::Serialize;

/// Which of a player's career tables a render should return.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    Hash,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum RenderMode {
    Season,
    Playoffs,
    #[default]
    Both,
}

impl RenderMode {
    /// Playoffs flag of each table a render in this mode returns, in order.
    pub fn playoff_flags(self) -> &'static [bool] {
        match self {
            RenderMode::Season => &[false],
            RenderMode::Playoffs => &[true],
            RenderMode::Both => &[false, true],
        }
    }
}

/// Immutable HTML snapshot taken from a browser session that has since
/// been shut down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    url: String,
    html: String,
}

impl RenderedDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parse the snapshot into a navigable document.
    pub fn document(&self) -> ::scraper::Html {
        ::scraper::Html::parse_document(&self.html)
    }
}

/// One body cell, tagged by the role its markup gives it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Cell {
    /// Starts a new logical row; carries the identifier taken from the
    /// cell's link.
    Player(String),
    /// A label cell, e.g. the team abbreviation.
    Text(String),
    /// Anything else; holds the raw text to be parsed as a number.
    Value(String),
}

/// A stat table as it appears on the page.
///
/// Body cells are kept as one flat sequence; rows are reconstructed from
/// the [`Cell::Player`] markers during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatTable {
    pub headers: Vec<String>,
    pub body: Vec<Cell>,
    pub footer: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub enum ColumnKind {
    Text,
    Numeric,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Numeric => "NUMERIC",
        }
    }

    pub(crate) fn from_sql_type(declared: &str) -> Self {
        if declared.eq_ignore_ascii_case("TEXT") {
            ColumnKind::Text
        } else {
            ColumnKind::Numeric
        }
    }
}

/// A persisted column derived from a header cell.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Text,
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
        }
    }
}

/// Ordered column list inferred from a table's header cells.
pub type DerivedSchema = Vec<Column>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Null,
    Text(String),
    Number(f64),
}

impl StatValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StatValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StatValue::Null)
    }
}

/// A single persisted record: the playoffs flag followed by one value
/// per derived column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub playoffs: bool,
    pub values: Vec<StatValue>,
}
