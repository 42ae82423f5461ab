use serde::Serialize;

/// A browser automation backend, in the order the resolver tries them.
#[derive(
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
pub enum Browser {
    Chrome,
    Firefox,
    PhantomJs,
    Opera,
    Safari,
    None,
}

impl Browser {
    /// Candidates in preference order. `None` is never probed.
    pub const PREFERENCE: [Browser; 5] = [
        Browser::Chrome,
        Browser::Firefox,
        Browser::PhantomJs,
        Browser::Opera,
        Browser::Safari,
    ];

    pub fn supports_headless(self) -> bool {
        matches!(self, Browser::Chrome | Browser::Firefox | Browser::PhantomJs)
    }

    /// Diagnostic shown when a non-preferred browser ends up selected.
    pub fn warning(self) -> Option<&'static str> {
        match self {
            Browser::PhantomJs => Some(
                "Using PhantomJS, which is an unsupported browser. \
                 Consider installing Chrome or Firefox.",
            ),
            Browser::Opera => Some(
                "Using Opera. Opera does not support headless mode, \
                 so consider installing Chrome or Firefox.",
            ),
            Browser::Safari => Some(
                "Using Safari. Safari does not support headless mode, \
                 so consider installing Chrome or Firefox.",
            ),
            Browser::Chrome | Browser::Firefox | Browser::None => None,
        }
    }

    /// Name of the WebDriver executable that automates this browser.
    pub fn driver_binary(self) -> Option<&'static str> {
        match self {
            Browser::Chrome => Some("chromedriver"),
            Browser::Firefox => Some("geckodriver"),
            Browser::PhantomJs => Some("phantomjs"),
            Browser::Opera => Some("operadriver"),
            Browser::Safari => Some("safaridriver"),
            Browser::None => None,
        }
    }
}

/// The automation capability chosen for this process.
///
/// Produced once by [`crate::Resolver`] and handed to the renderer;
/// it never changes after construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct BrowserCapability {
    browser: Browser,
}

impl BrowserCapability {
    pub fn new(browser: Browser) -> Self {
        Self { browser }
    }

    /// A capability with no usable browser; every render fails with
    /// [`crate::NbaError::NoBrowserAvailable`].
    pub fn none() -> Self {
        Self::new(Browser::None)
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    pub fn headless(&self) -> bool {
        self.browser.supports_headless()
    }

    pub fn warning(&self) -> Option<&'static str> {
        self.browser.warning()
    }

    pub fn is_available(&self) -> bool {
        self.browser != Browser::None
    }
}

/// Knobs forwarded to every new browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub headless: bool,
    pub user_agent: Option<String>,
}

impl SessionSettings {
    /// Bare settings used to probe whether a browser starts at all.
    pub fn probe() -> Self {
        Self {
            headless: true,
            user_agent: None,
        }
    }
}
