//! A small W3C WebDriver client.
//!
//! [`WebDriverLauncher`] spawns the browser's driver executable on a
//! free local port and talks to it over HTTP; each session owns its
//! driver process and kills it on [`quit`](BrowserSession::quit).

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use crate::browser::{BrowserSession, Driver, ElementHandle, LaunchFailure};
use crate::error::{NbaError, Result};
use crate::model::{Browser, SessionSettings};

/// Key of an element reference in W3C responses.
const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52f-4f1c4b6a1d49";
/// Key of an element reference in legacy JSON Wire responses.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const SESSION_NOT_CREATED: &str = "session not created";
/// JSON Wire status code for a refused session.
const LEGACY_SESSION_NOT_CREATED: i64 = 33;

const READY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// How long a freshly spawned driver may take to answer `/status`.
    pub startup_timeout: Duration,
    /// Driver executables to use instead of looking them up on `PATH`.
    pub binaries: HashMap<Browser, PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(10),
            binaries: HashMap::new(),
        }
    }
}

impl LaunchOptions {
    pub fn with_binary(mut self, browser: Browser, path: impl Into<PathBuf>) -> Self {
        self.binaries.insert(browser, path.into());
        self
    }
}

/// Starts real browser sessions through their WebDriver executables.
pub struct WebDriverLauncher {
    http: reqwest::Client,
    options: LaunchOptions,
}

impl WebDriverLauncher {
    pub fn new() -> Self {
        Self::with_options(LaunchOptions::default())
    }

    pub fn with_options(options: LaunchOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            options,
        }
    }

    fn binary(&self, browser: Browser) -> Option<PathBuf> {
        self.options
            .binaries
            .get(&browser)
            .cloned()
            .or_else(|| browser.driver_binary().map(PathBuf::from))
    }

    async fn wait_until_ready(&self, base: &str, child: &mut Child) -> std::result::Result<(), String> {
        let deadline = Instant::now() + self.options.startup_timeout;
        let status_url = format!("{base}/status");
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(format!("driver exited early with {status}"));
            }
            if let Ok(response) = self.http.get(&status_url).send().await {
                if response.status().is_success() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "driver did not become ready within {:?}",
                    self.options.startup_timeout
                ));
            }
            sleep(READY_POLL).await;
        }
    }
}

impl Default for WebDriverLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for WebDriverLauncher {
    #[instrument(skip(self, settings))]
    async fn start(
        &self,
        browser: Browser,
        settings: &SessionSettings,
    ) -> std::result::Result<Box<dyn BrowserSession>, LaunchFailure> {
        let binary = self
            .binary(browser)
            .ok_or_else(|| LaunchFailure::Unavailable(format!("no driver for {browser}")))?;
        let port = free_port().map_err(|e| LaunchFailure::Unavailable(e.to_string()))?;

        let mut child = Command::new(&binary)
            .args(driver_args(browser, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LaunchFailure::Unavailable(format!("{}: {e}", binary.display())))?;

        let base = format!("http://127.0.0.1:{port}");
        self.wait_until_ready(&base, &mut child)
            .await
            .map_err(LaunchFailure::Unavailable)?;

        let body = new_session_body(browser, settings);
        let response = self
            .http
            .post(format!("{base}/session"))
            .json(&body)
            .send()
            .await
            .map_err(|e| LaunchFailure::Unavailable(e.to_string()))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LaunchFailure::Unavailable(e.to_string()))?;

        let session_id = match parse_session_id(&payload) {
            Ok(id) => id,
            Err(refusal) => {
                stop_driver(&mut child).await;
                return Err(match refusal {
                    Refusal::NotCreated(message) if browser == Browser::Safari => {
                        LaunchFailure::NotPermitted(message)
                    }
                    Refusal::NotCreated(message) | Refusal::Other(message) => {
                        LaunchFailure::Unavailable(message)
                    }
                });
            }
        };

        debug!(%browser, port, session_id = %session_id, "started webdriver session");
        Ok(Box::new(WebDriverSession {
            endpoint: Endpoint {
                http: self.http.clone(),
                base,
                session_id,
            },
            child,
        }))
    }
}

/// A live session plus the driver process serving it.
pub struct WebDriverSession {
    endpoint: Endpoint,
    child: Child,
}

/// Where a session's commands are sent.
struct Endpoint {
    http: reqwest::Client,
    base: String,
    session_id: String,
}

impl Endpoint {
    async fn command(
        &self,
        name: &'static str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}/session/{}{path}", self.base, self.session_id);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| NbaError::Http {
            url: url.clone(),
            source: e,
        })?;
        let payload: Value = response.json().await.map_err(|e| NbaError::Http {
            url: url.clone(),
            source: e,
        })?;

        if let Some(message) = command_error(&payload) {
            return Err(NbaError::WebDriver {
                command: name,
                message,
            });
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.endpoint
            .command("navigate", Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find_all(&mut self, css: &str) -> Result<Vec<ElementHandle>> {
        let value = self
            .endpoint
            .command(
                "find_elements",
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;

        Ok(value
            .as_array()
            .map(|elements| elements.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn outer_html(&mut self, element: &ElementHandle) -> Result<String> {
        let property = format!("/element/{}/property/outerHTML", element.as_str());
        let value = match self
            .endpoint
            .command("element_property", Method::GET, &property, None)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, "property lookup failed; falling back to attribute");
                let attribute = format!("/element/{}/attribute/outerHTML", element.as_str());
                self.endpoint
                    .command("element_attribute", Method::GET, &attribute, None)
                    .await?
            }
        };
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&mut self) -> Result<String> {
        let value = self
            .endpoint
            .command("page_source", Method::GET, "/source", None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        let mut session = *self;
        let result = session
            .endpoint
            .command("delete_session", Method::DELETE, "", None)
            .await
            .map(|_| ());
        stop_driver(&mut session.child).await;
        debug!(session_id = %session.endpoint.session_id, "ended webdriver session");
        result
    }
}

enum Refusal {
    NotCreated(String),
    Other(String),
}

fn parse_session_id(payload: &Value) -> std::result::Result<String, Refusal> {
    let value = payload.get("value");

    // W3C: {"value": {"sessionId": ..}}; JSON Wire: {"sessionId": .., "status": 0}
    let id = value
        .and_then(|v| v.get("sessionId"))
        .or_else(|| payload.get("sessionId"))
        .and_then(Value::as_str);
    if let (Some(id), None) = (id, command_error(payload)) {
        return Ok(id.to_string());
    }

    let message = command_error(payload).unwrap_or_else(|| "no session id in response".to_string());
    let w3c_not_created = value
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        == Some(SESSION_NOT_CREATED);
    let legacy_not_created =
        payload.get("status").and_then(Value::as_i64) == Some(LEGACY_SESSION_NOT_CREATED);

    if w3c_not_created || legacy_not_created {
        Err(Refusal::NotCreated(message))
    } else {
        Err(Refusal::Other(message))
    }
}

/// Error message carried by a W3C or JSON Wire error payload.
fn command_error(payload: &Value) -> Option<String> {
    let value = payload.get("value");
    let message = || {
        value
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    if let Some(error) = value.and_then(|v| v.get("error")).and_then(Value::as_str) {
        return Some(format!("{error}: {}", message()));
    }
    match payload.get("status").and_then(Value::as_i64) {
        Some(0) | None => None,
        Some(status) => Some(format!("status {status}: {}", message())),
    }
}

fn element_id(element: &Value) -> Option<ElementHandle> {
    element
        .get(W3C_ELEMENT_KEY)
        .or_else(|| element.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(ElementHandle::new)
}

async fn stop_driver(child: &mut Child) {
    if let Err(err) = child.kill().await {
        warn!(%err, "failed to stop webdriver process");
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn driver_args(browser: Browser, port: u16) -> Vec<String> {
    match browser {
        Browser::Chrome | Browser::Opera => vec![format!("--port={port}")],
        Browser::Firefox | Browser::Safari => vec!["--port".to_string(), port.to_string()],
        Browser::PhantomJs => vec![format!("--webdriver={port}")],
        Browser::None => Vec::new(),
    }
}

/// `POST /session` body with browser-specific headless and user agent
/// switches, sent in both W3C and legacy form.
fn new_session_body(browser: Browser, settings: &SessionSettings) -> Value {
    let headless = settings.headless && browser.supports_headless();
    let user_agent = settings.user_agent.as_deref();

    let mut capabilities = json!({ "browserName": browser.to_string() });
    match browser {
        Browser::Chrome => {
            let mut args = Vec::new();
            if headless {
                args.push("--headless".to_string());
            }
            if let Some(agent) = user_agent {
                args.push(format!("--user-agent={agent}"));
            }
            capabilities["goog:chromeOptions"] = json!({ "args": args });
        }
        Browser::Firefox => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { Vec::new() };
            let mut options = json!({ "args": args });
            if let Some(agent) = user_agent {
                options["prefs"] = json!({ "general.useragent.override": agent });
            }
            capabilities["moz:firefoxOptions"] = options;
        }
        Browser::PhantomJs => {
            if let Some(agent) = user_agent {
                capabilities["phantomjs.page.settings.userAgent"] = json!(agent);
            }
        }
        Browser::Opera => {
            if let Some(agent) = user_agent {
                capabilities["operaOptions"] = json!({ "args": [format!("--user-agent={agent}")] });
            }
        }
        Browser::Safari | Browser::None => {}
    }

    json!({
        "capabilities": { "alwaysMatch": capabilities.clone() },
        "desiredCapabilities": capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::CapturedLogs;

    fn kobe() -> SessionSettings {
        SessionSettings {
            headless: true,
            user_agent: Some("Kobe".to_string()),
        }
    }

    #[test]
    fn test_chrome_session_body() {
        let body = new_session_body(Browser::Chrome, &kobe());
        let caps = &body["capabilities"]["alwaysMatch"];
        assert_eq!(caps["browserName"], "chrome");
        assert_eq!(
            caps["goog:chromeOptions"]["args"],
            json!(["--headless", "--user-agent=Kobe"])
        );
        assert_eq!(body["desiredCapabilities"], *caps);
    }

    #[test]
    fn test_firefox_session_body() {
        let body = new_session_body(Browser::Firefox, &kobe());
        let options = &body["capabilities"]["alwaysMatch"]["moz:firefoxOptions"];
        assert_eq!(options["args"], json!(["-headless"]));
        assert_eq!(options["prefs"]["general.useragent.override"], "Kobe");
    }

    #[test]
    fn test_safari_is_never_headless() {
        let body = new_session_body(Browser::Safari, &kobe());
        assert_eq!(body["capabilities"]["alwaysMatch"], json!({ "browserName": "safari" }));
    }

    #[test]
    fn test_driver_args() {
        assert_eq!(driver_args(Browser::Chrome, 9515), vec!["--port=9515"]);
        assert_eq!(driver_args(Browser::Firefox, 4444), vec!["--port", "4444"]);
        assert_eq!(driver_args(Browser::PhantomJs, 8910), vec!["--webdriver=8910"]);
    }

    #[test]
    fn test_parse_session_id() {
        let w3c = json!({ "value": { "sessionId": "abc", "capabilities": {} } });
        assert_eq!(parse_session_id(&w3c).ok(), Some("abc".to_string()));

        let legacy = json!({ "sessionId": "def", "status": 0, "value": {} });
        assert_eq!(parse_session_id(&legacy).ok(), Some("def".to_string()));
    }

    #[test]
    fn test_session_refusals() {
        let refused = json!({ "value": { "error": "session not created", "message": "Allow Remote Automation" } });
        assert!(matches!(parse_session_id(&refused), Err(Refusal::NotCreated(m)) if m.contains("Allow Remote")));

        let legacy = json!({ "status": 33, "value": { "message": "nope" } });
        assert!(matches!(parse_session_id(&legacy), Err(Refusal::NotCreated(_))));

        let other = json!({ "value": { "error": "unknown error", "message": "boom" } });
        assert!(matches!(parse_session_id(&other), Err(Refusal::Other(_))));
    }

    #[test]
    fn test_element_ids() {
        let w3c = json!({ "element-6066-11e4-a52f-4f1c4b6a1d49": "e1" });
        let legacy = json!({ "ELEMENT": "e2" });
        assert_eq!(element_id(&w3c), Some(ElementHandle::new("e1")));
        assert_eq!(element_id(&legacy), Some(ElementHandle::new("e2")));
        assert_eq!(element_id(&json!({})), None);
    }

    #[test]
    fn test_command_error() {
        assert_eq!(command_error(&json!({ "value": null })), None);
        assert_eq!(command_error(&json!({ "status": 0, "value": "x" })), None);
        assert_eq!(
            command_error(&json!({ "value": { "error": "no such element", "message": "gone" } })),
            Some("no such element: gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_driver_is_unavailable() {
        let launcher = WebDriverLauncher::with_options(
            LaunchOptions::default().with_binary(Browser::Chrome, "/nonexistent/chromedriver"),
        );
        let failure = launcher
            .start(Browser::Chrome, &SessionSettings::probe())
            .await
            .err()
            .unwrap();
        assert!(matches!(failure, LaunchFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_failed_driver_stop_is_logged() {
        let (logs, _guard) = CapturedLogs::install();
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        // The process is already reaped, so the kill itself fails.
        stop_driver(&mut child).await;

        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("failed to stop webdriver process"));
    }
}
