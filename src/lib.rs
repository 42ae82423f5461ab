//! Scrape NBA career stat tables from a browser-rendered page into
//! per-player SQLite tables.

pub use browser::webdriver::{LaunchOptions, WebDriverLauncher};
pub use browser::{probe_browsers, BrowserSession, Driver, ElementHandle, LaunchFailure, Resolver};
pub use client::{career_url, NbaClient};
pub use error::{NbaError, Result};
pub use model::*;
pub use render::{RenderOptions, Renderer, DEFAULT_USER_AGENT};
pub use crate::scraper::parse_stat_table;
pub use store::{DuplicatePolicy, StatStore, StoreOptions, DEFAULT_DATABASE};

pub mod browser;
mod client;
mod error;
pub mod ingest;
mod model;
mod render;
pub(crate) mod scraper;
pub mod store;
