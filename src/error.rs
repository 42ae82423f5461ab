use ::scraper::error::SelectorErrorKind;
use std::num::ParseFloatError;
use std::time::Duration;

use crate::model::Browser;

/// All errors that can occur while resolving a browser, rendering a page,
/// or ingesting stat tables.
#[derive(thiserror::Error, Debug)]
pub enum NbaError {
    /// No browser in the preference list could start a session.
    #[error("no supported browser found; install Chrome or Firefox for optimal usage")]
    NoBrowserAvailable,

    /// The expected tables did not appear before the deadline.
    #[error("timed out after {timeout:?} waiting for tables on {url}")]
    PageTimeout { url: String, timeout: Duration },

    /// The page's table structure deviates from the expected shape.
    #[error("malformed document: {context}")]
    MalformedDocument { context: String },

    /// A scrape derived columns that differ from the persisted schema.
    #[error("schema mismatch for {table}: stored columns {expected:?}, page columns {found:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// An extracted row does not have one value per stored column.
    #[error("row for {table} has {found} values but the table has {expected} stat columns")]
    RowWidth {
        table: String,
        expected: usize,
        found: usize,
    },

    /// A row with the same season and playoffs flag is already stored.
    #[error("duplicate row in {table} for season {season} (playoffs: {playoffs})")]
    DuplicateRow {
        table: String,
        season: String,
        playoffs: bool,
    },

    /// Failed to parse a floating-point number from a numeric cell.
    #[error("failed to parse number from {value:?}: {source}")]
    NumberParse {
        value: String,
        source: ParseFloatError,
    },

    /// The resolved browser could not start a session for a render.
    #[error("failed to launch {browser}: {message}")]
    Launch { browser: Browser, message: String },

    /// The WebDriver endpoint answered a command with an error.
    #[error("webdriver command {command} failed: {message}")]
    WebDriver {
        command: &'static str,
        message: String,
    },

    /// Transport failure while talking to the WebDriver endpoint.
    #[error("http request failed for {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// The relational store failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A CSS selector string could not be parsed.
    #[error("invalid CSS selector: {0}")]
    Selector(String),
}

impl NbaError {
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        NbaError::MalformedDocument {
            context: context.into(),
        }
    }
}

impl<'a> From<SelectorErrorKind<'a>> for NbaError {
    fn from(err: SelectorErrorKind<'a>) -> Self {
        NbaError::Selector(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NbaError>;
