use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use crate::browser::{BrowserSession, Driver, ElementHandle};
use crate::error::{NbaError, Result};
use crate::model::{BrowserCapability, RenderMode, RenderedDocument, SessionSettings, StatTable};
use crate::scraper::parse_stat_table;

pub const DEFAULT_USER_AGENT: &str = "Kobe";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub user_agent: String,
    /// How long to wait for tables to appear after navigation.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub table_selector: String,
    /// Position of the regular season table among the page's tables.
    pub season_table: usize,
    /// Position of the playoffs table among the page's tables.
    pub playoffs_table: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            table_selector: "table".to_string(),
            // The career page shows season totals, then season highs,
            // then playoff totals.
            season_table: 0,
            playoffs_table: 2,
        }
    }
}

/// Renders pages in a browser and pulls stat tables out of them.
///
/// Every call starts its own session and ends it before returning,
/// whether or not the call succeeded.
pub struct Renderer<D> {
    driver: D,
    capability: BrowserCapability,
    options: RenderOptions,
}

impl<D: Driver> Renderer<D> {
    pub fn new(driver: D, capability: BrowserCapability) -> Self {
        Self::with_options(driver, capability, RenderOptions::default())
    }

    pub fn with_options(driver: D, capability: BrowserCapability, options: RenderOptions) -> Self {
        Self {
            driver,
            capability,
            options,
        }
    }

    pub fn capability(&self) -> BrowserCapability {
        self.capability
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    async fn start_session(&self) -> Result<Box<dyn BrowserSession>> {
        if !self.capability.is_available() {
            return Err(NbaError::NoBrowserAvailable);
        }
        let browser = self.capability.browser();
        let settings = SessionSettings {
            headless: self.capability.headless(),
            user_agent: Some(self.options.user_agent.clone()),
        };
        self.driver
            .start(browser, &settings)
            .await
            .map_err(|failure| NbaError::Launch {
                browser,
                message: failure.to_string(),
            })
    }

    async fn end_session(session: Box<dyn BrowserSession>) {
        if let Err(err) = session.quit().await {
            warn!(%err, "failed to end browser session");
        }
    }

    /// Render `url` and return its stat tables for `mode`.
    ///
    /// `Season` returns the regular season table, `Playoffs` the playoffs
    /// table and `Both` returns both in that order.
    #[instrument(skip(self))]
    pub async fn render(&self, url: &str, mode: RenderMode) -> Result<Vec<StatTable>> {
        let mut session = self.start_session().await?;
        let result = self.collect_tables(session.as_mut(), url, mode).await;
        Self::end_session(session).await;
        result
    }

    /// Render `url` and return a snapshot of the whole page.
    #[instrument(skip(self))]
    pub async fn render_page(&self, url: &str) -> Result<RenderedDocument> {
        let mut session = self.start_session().await?;
        let result = async {
            session.navigate(url).await?;
            session.page_source().await
        }
        .await;
        Self::end_session(session).await;
        result.map(|html| RenderedDocument::new(url, html))
    }

    async fn collect_tables(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        mode: RenderMode,
    ) -> Result<Vec<StatTable>> {
        session.navigate(url).await?;

        let positions = match mode {
            RenderMode::Season => vec![self.options.season_table],
            RenderMode::Playoffs => vec![self.options.playoffs_table],
            RenderMode::Both => vec![self.options.season_table, self.options.playoffs_table],
        };
        let needed = positions.iter().max().map_or(1, |max| max + 1);
        let elements = self.wait_for_tables(session, url, needed).await?;

        let mut tables = Vec::with_capacity(positions.len());
        for position in positions {
            let element = elements.get(position).ok_or_else(|| {
                NbaError::malformed(format!(
                    "expected at least {} tables on {url}, found {}",
                    position + 1,
                    elements.len()
                ))
            })?;
            let html = session.outer_html(element).await?;
            tables.push(parse_stat_table(&html)?);
        }

        debug!(count = tables.len(), url, %mode, "rendered stat tables");
        Ok(tables)
    }

    /// Poll until at least `needed` tables are present or the timeout
    /// passes. Returns whatever was found at the deadline as long as it
    /// is not nothing.
    async fn wait_for_tables(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        needed: usize,
    ) -> Result<Vec<ElementHandle>> {
        let deadline = Instant::now() + self.options.timeout;
        loop {
            let found = session.find_all(&self.options.table_selector).await?;
            if found.len() >= needed {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                if found.is_empty() {
                    return Err(NbaError::PageTimeout {
                        url: url.to_string(),
                        timeout: self.options.timeout,
                    });
                }
                return Ok(found);
            }
            sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeDriver;
    use crate::model::{Browser, Cell};

    const URL: &str = "https://stats.nba.com/player/2544/career";

    fn table(label: &str) -> String {
        format!(
            r#"<table><thead><tr><th>PTS</th></tr></thead>
               <tbody><tr><td class="player"><a href="/p/?Season={label}">{label}</a></td><td>1</td></tr></tbody></table>"#
        )
    }

    fn quick() -> RenderOptions {
        RenderOptions {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            ..RenderOptions::default()
        }
    }

    fn renderer(driver: FakeDriver) -> Renderer<FakeDriver> {
        Renderer::with_options(driver, BrowserCapability::new(Browser::Chrome), quick())
    }

    fn first_label(table: &StatTable) -> &Cell {
        &table.body[0]
    }

    #[tokio::test]
    async fn test_season_mode_returns_first_table() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_tables([table("season"), table("highs"), table("playoffs")]);
        let tables = renderer(driver.clone()).render(URL, RenderMode::Season).await.unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(first_label(&tables[0]), &Cell::Player("season".to_string()));
        assert_eq!(driver.navigations(), vec![URL.to_string()]);
        assert_eq!(driver.quits(), 1);
    }

    #[tokio::test]
    async fn test_both_mode_selects_first_and_third() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_tables([table("season"), table("highs"), table("playoffs")]);
        let tables = renderer(driver.clone()).render(URL, RenderMode::Both).await.unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(first_label(&tables[0]), &Cell::Player("season".to_string()));
        assert_eq!(first_label(&tables[1]), &Cell::Player("playoffs".to_string()));

        let tables = renderer(driver.clone()).render(URL, RenderMode::Playoffs).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(first_label(&tables[0]), &Cell::Player("playoffs".to_string()));
        assert_eq!(driver.quits(), 2);
    }

    #[tokio::test]
    async fn test_session_uses_headless_and_user_agent() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_tables([table("season")]);
        renderer(driver.clone()).render(URL, RenderMode::Season).await.unwrap();

        let settings = driver.settings();
        assert!(settings[0].headless);
        assert_eq!(settings[0].user_agent.as_deref(), Some(DEFAULT_USER_AGENT));
    }

    #[tokio::test]
    async fn test_waits_for_tables_to_appear() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_empty_polls(3)
            .with_tables([table("season")]);
        let tables = renderer(driver.clone()).render(URL, RenderMode::Season).await.unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(driver.polls(), 4);
    }

    #[tokio::test]
    async fn test_timeout_still_ends_session() {
        let driver = FakeDriver::new().with_browser(Browser::Chrome);
        let err = renderer(driver.clone()).render(URL, RenderMode::Season).await.unwrap_err();

        assert!(matches!(err, NbaError::PageTimeout { .. }));
        assert_eq!(driver.quits(), 1);
    }

    #[tokio::test]
    async fn test_too_few_tables_is_malformed() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_tables([table("season")]);
        let err = renderer(driver.clone()).render(URL, RenderMode::Both).await.unwrap_err();

        assert!(matches!(err, NbaError::MalformedDocument { .. }));
        assert_eq!(driver.quits(), 1);
    }

    #[tokio::test]
    async fn test_no_browser() {
        let driver = FakeDriver::new();
        let renderer = Renderer::new(driver.clone(), BrowserCapability::none());
        let err = renderer.render(URL, RenderMode::Season).await.unwrap_err();

        assert!(matches!(err, NbaError::NoBrowserAvailable));
        assert!(driver.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let driver = FakeDriver::new();
        let err = renderer(driver).render(URL, RenderMode::Season).await.unwrap_err();
        assert!(matches!(err, NbaError::Launch { browser: Browser::Chrome, .. }));
    }

    #[tokio::test]
    async fn test_render_page_snapshot() {
        let driver = FakeDriver::new()
            .with_browser(Browser::Chrome)
            .with_page_source("<html><body><p>players</p></body></html>");
        let document = renderer(driver.clone()).render_page(URL).await.unwrap();

        assert_eq!(document.url(), URL);
        assert!(document.html().contains("players"));
        assert_eq!(driver.quits(), 1);
    }
}
