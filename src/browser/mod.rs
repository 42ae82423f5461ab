//! Choosing a browser and the seam over browser automation.
//!
//! [`Driver`] starts sessions and [`BrowserSession`] drives one.
//! [`WebDriverLauncher`](webdriver::WebDriverLauncher) is the real
//! implementation; tests substitute an in-memory one.

pub mod webdriver;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{NbaError, Result};
use crate::model::{Browser, BrowserCapability, SessionSettings};

const SAFARI_AUTOMATION_HINT: &str = "To use Safari for scraping, enable 'Allow Remote Automation' \
     in Safari's Develop menu. Safari does not support headless mode, so consider installing \
     Chrome or Firefox.";

/// Why a browser session could not be started.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchFailure {
    /// Driver binary missing, failed to launch, or refused the session.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The browser is installed but automation is switched off.
    #[error("not permitted: {0}")]
    NotPermitted(String),
}

/// Opaque reference to an element inside a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(String);

impl ElementHandle {
    /// Wrap the driver's own identifier for an element.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One live browser session.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Every element currently matching the CSS selector, in document order.
    async fn find_all(&mut self, css: &str) -> Result<Vec<ElementHandle>>;

    async fn outer_html(&mut self, element: &ElementHandle) -> Result<String>;

    async fn page_source(&mut self) -> Result<String>;

    /// End the session and release everything it holds.
    async fn quit(self: Box<Self>) -> Result<()>;
}

/// Starts browser sessions.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn start(
        &self,
        browser: Browser,
        settings: &SessionSettings,
    ) -> std::result::Result<Box<dyn BrowserSession>, LaunchFailure>;
}

/// Try every browser in [`Browser::PREFERENCE`] order and return the
/// first one that starts a session.
///
/// The probe session is ended immediately. Unavailable browsers are
/// skipped quietly; a browser that refuses automation is skipped with a
/// warning.
#[instrument(skip(driver))]
pub async fn probe_browsers<D: Driver + ?Sized>(driver: &D) -> Result<BrowserCapability> {
    for browser in Browser::PREFERENCE {
        let settings = SessionSettings {
            headless: browser.supports_headless(),
            ..SessionSettings::probe()
        };
        match driver.start(browser, &settings).await {
            Ok(session) => {
                if let Err(err) = session.quit().await {
                    warn!(%browser, %err, "failed to end probe session");
                }
                if let Some(warning) = browser.warning() {
                    warn!(%browser, "{warning}");
                }
                info!(%browser, "selected browser");
                return Ok(BrowserCapability::new(browser));
            }
            Err(LaunchFailure::Unavailable(reason)) => {
                debug!(%browser, reason = %reason, "browser unavailable");
            }
            Err(LaunchFailure::NotPermitted(reason)) => {
                let hint = match browser {
                    Browser::Safari => SAFARI_AUTOMATION_HINT,
                    _ => "Automation is disabled for this browser.",
                };
                warn!(%browser, reason = %reason, "{hint}");
            }
        }
    }
    Err(NbaError::NoBrowserAvailable)
}

/// Resolves the browser once and remembers the answer.
///
/// The resulting [`BrowserCapability`] is meant to be handed to a
/// [`Renderer`](crate::Renderer) at startup.
pub struct Resolver<D> {
    driver: D,
    resolved: Option<BrowserCapability>,
}

impl<D: Driver> Resolver<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            resolved: None,
        }
    }

    /// Probe on the first call; later calls return the cached choice.
    pub async fn resolve(&mut self) -> Result<BrowserCapability> {
        if let Some(capability) = self.resolved {
            return Ok(capability);
        }
        let capability = probe_browsers(&self.driver).await?;
        self.resolved = Some(capability);
        Ok(capability)
    }

    pub fn cached(&self) -> Option<BrowserCapability> {
        self.resolved
    }

    /// Forget the cached choice so the next [`resolve`](Self::resolve)
    /// probes again.
    pub fn clear(&mut self) {
        self.resolved = None;
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}
