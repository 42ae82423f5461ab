//! In-memory [`Driver`] for tests, plus a log sink.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::subscriber::DefaultGuard;

use crate::browser::{BrowserSession, Driver, ElementHandle, LaunchFailure};
use crate::error::{NbaError, Result};
use crate::model::{Browser, SessionSettings};

#[derive(Default)]
struct Journal {
    attempts: Mutex<Vec<Browser>>,
    settings: Mutex<Vec<SessionSettings>>,
    navigations: Mutex<Vec<String>>,
    polls: AtomicUsize,
    quits: AtomicUsize,
}

/// Starts sessions only for the browsers it was told about and serves a
/// fixed list of table fragments.
#[derive(Clone, Default)]
pub(crate) struct FakeDriver {
    outcomes: HashMap<Browser, std::result::Result<(), LaunchFailure>>,
    tables: Vec<String>,
    page_source: String,
    empty_polls: usize,
    journal: Arc<Journal>,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_browser(mut self, browser: Browser) -> Self {
        self.outcomes.insert(browser, Ok(()));
        self
    }

    pub(crate) fn with_failure(mut self, browser: Browser, failure: LaunchFailure) -> Self {
        self.outcomes.insert(browser, Err(failure));
        self
    }

    /// Outer HTML of each table the page will eventually show.
    pub(crate) fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn with_page_source(mut self, html: impl Into<String>) -> Self {
        self.page_source = html.into();
        self
    }

    /// Number of lookups that find nothing before the tables show up.
    pub(crate) fn with_empty_polls(mut self, polls: usize) -> Self {
        self.empty_polls = polls;
        self
    }

    pub(crate) fn attempts(&self) -> Vec<Browser> {
        self.journal.attempts.lock().unwrap().clone()
    }

    pub(crate) fn settings(&self) -> Vec<SessionSettings> {
        self.journal.settings.lock().unwrap().clone()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.journal.navigations.lock().unwrap().clone()
    }

    pub(crate) fn polls(&self) -> usize {
        self.journal.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn quits(&self) -> usize {
        self.journal.quits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn start(
        &self,
        browser: Browser,
        settings: &SessionSettings,
    ) -> std::result::Result<Box<dyn BrowserSession>, LaunchFailure> {
        self.journal.attempts.lock().unwrap().push(browser);
        self.journal.settings.lock().unwrap().push(settings.clone());

        match self.outcomes.get(&browser) {
            Some(Ok(())) => Ok(Box::new(FakeSession {
                driver: self.clone(),
            })),
            Some(Err(failure)) => Err(failure.clone()),
            None => Err(LaunchFailure::Unavailable(format!("{browser} is not installed"))),
        }
    }
}

struct FakeSession {
    driver: FakeDriver,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.driver
            .journal
            .navigations
            .lock()
            .unwrap()
            .push(url.to_string());
        Ok(())
    }

    async fn find_all(&mut self, css: &str) -> Result<Vec<ElementHandle>> {
        assert_eq!(css, "table");
        let poll = self.driver.journal.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.driver.empty_polls {
            return Ok(Vec::new());
        }
        Ok((0..self.driver.tables.len())
            .map(|idx| ElementHandle::new(idx.to_string()))
            .collect())
    }

    async fn outer_html(&mut self, element: &ElementHandle) -> Result<String> {
        element
            .as_str()
            .parse::<usize>()
            .ok()
            .and_then(|idx| self.driver.tables.get(idx).cloned())
            .ok_or(NbaError::WebDriver {
                command: "outer_html",
                message: format!("stale element {}", element.as_str()),
            })
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.driver.page_source.clone())
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        self.driver.journal.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Formatted log output collected while the guard from
/// [`CapturedLogs::install`] is alive on the current thread.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(" WARN "))
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
