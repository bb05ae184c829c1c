//! Browser automation over the WebDriver protocol

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder, Locator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};

/// Attribute carrying the UI element tags of the frontend
pub const TEST_TAG_ATTRIBUTE: &str = "data-test-tag";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }

    /// Port the matching standalone driver listens on by default
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            Browser::Chrome => "http://localhost:9515",
            Browser::Firefox => "http://localhost:4444",
        }
    }

    /// Session capabilities for this engine.
    pub fn capabilities(&self, headless: bool, width: u32, height: u32) -> Map<String, Value> {
        let mut caps = Map::new();
        match self {
            Browser::Chrome => {
                let mut args = vec![
                    "--no-sandbox".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                    format!("--window-size={},{}", width, height),
                ];
                if headless {
                    args.push("--headless".to_string());
                }
                caps.insert("browserName".to_string(), json!("chrome"));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
                caps.insert("goog:loggingPrefs".to_string(), json!({ "browser": "ALL" }));
            }
            Browser::Firefox => {
                let mut args = vec![
                    "-width".to_string(),
                    width.to_string(),
                    "-height".to_string(),
                    height.to_string(),
                ];
                if headless {
                    args.push("-headless".to_string());
                }
                caps.insert("browserName".to_string(), json!("firefox"));
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
        }
        caps
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            other => Err(E2eError::Driver(format!("Unsupported browser: {}", other))),
        }
    }
}

/// How a scenario finds an element on the page.
///
/// Written as a single-key map (`tag: helpButton`) in scenario files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LocatorKeys", into = "LocatorKeys")]
pub enum ElementLocator {
    /// Element registered under a UI test tag
    Tag(String),

    /// Tab whose visible label matches exactly
    Tab(String),

    /// Raw CSS selector
    Css(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocatorKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
}

impl TryFrom<LocatorKeys> for ElementLocator {
    type Error = String;

    fn try_from(keys: LocatorKeys) -> Result<Self, Self::Error> {
        match (keys.tag, keys.tab, keys.css) {
            (Some(tag), None, None) => Ok(ElementLocator::Tag(tag)),
            (None, Some(label), None) => Ok(ElementLocator::Tab(label)),
            (None, None, Some(css)) => Ok(ElementLocator::Css(css)),
            _ => Err("locator needs exactly one of `tag`, `tab` or `css`".to_string()),
        }
    }
}

impl From<ElementLocator> for LocatorKeys {
    fn from(locator: ElementLocator) -> Self {
        match locator {
            ElementLocator::Tag(tag) => LocatorKeys { tag: Some(tag), ..Default::default() },
            ElementLocator::Tab(label) => LocatorKeys { tab: Some(label), ..Default::default() },
            ElementLocator::Css(css) => LocatorKeys { css: Some(css), ..Default::default() },
        }
    }
}

impl ElementLocator {
    pub fn tag(tag: impl Into<String>) -> Self {
        ElementLocator::Tag(tag.into())
    }

    pub fn tab(label: impl Into<String>) -> Self {
        ElementLocator::Tab(label.into())
    }

    /// The selector string in the query language of `is_xpath()`.
    pub fn selector(&self) -> String {
        match self {
            ElementLocator::Tag(tag) => format!(r#"[{}="{}"]"#, TEST_TAG_ATTRIBUTE, tag),
            ElementLocator::Tab(label) => format!(
                r#"//*[@role="tab" and normalize-space(.)="{}"]"#,
                label.replace('"', "")
            ),
            ElementLocator::Css(css) => css.clone(),
        }
    }

    pub fn is_xpath(&self) -> bool {
        matches!(self, ElementLocator::Tab(_))
    }
}

impl fmt::Display for ElementLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementLocator::Tag(tag) => write!(f, "tag:{}", tag),
            ElementLocator::Tab(label) => write!(f, "tab:{}", label),
            ElementLocator::Css(css) => write!(f, "css:{}", css),
        }
    }
}

/// The browser operations a scenario needs
#[async_trait]
pub trait CaptureDriver: Send {
    type Element: Send + Sync;

    fn browser(&self) -> Browser;

    /// Load a page. Bounded by the driver's page load timeout.
    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    /// Poll for an element until it is present; `NotReady` after `timeout`.
    async fn wait_for(&mut self, locator: &ElementLocator, timeout: Duration) -> E2eResult<Self::Element>;

    async fn click(&mut self, element: &Self::Element) -> E2eResult<()>;

    /// Full-window screenshot, PNG encoded
    async fn screenshot(&mut self) -> E2eResult<Vec<u8>>;
}

/// WebDriver session against chromedriver or geckodriver
pub struct WebDriverCapture {
    client: Client,
    browser: Browser,
    load_timeout: Duration,
}

impl WebDriverCapture {
    /// Open a new browser session for `browser`.
    pub async fn connect(browser: Browser, headless: bool, config: &HarnessConfig) -> E2eResult<Self> {
        let url = config
            .webdriver_url
            .clone()
            .unwrap_or_else(|| browser.default_webdriver_url().to_string());

        info!("Connecting to {} WebDriver at {}", browser, url);

        let caps = browser.capabilities(headless, config.window_width, config.window_height);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&url)
            .await
            .map_err(|e| E2eError::Driver(format!("Cannot start {} session at {}: {}", browser, url, e)))?;

        client
            .update_timeouts(TimeoutConfiguration::new(None, Some(config.load_timeout), None))
            .await
            .map_err(driver_error)?;

        if let Err(e) = client.set_window_size(config.window_width, config.window_height).await {
            warn!("Could not resize {} window: {}", browser, e);
        }

        Ok(Self {
            client,
            browser,
            load_timeout: config.load_timeout,
        })
    }

    /// End the browser session.
    pub async fn close(self) -> E2eResult<()> {
        debug!("Closing {} session", self.browser);
        self.client.close().await.map_err(driver_error)
    }
}

#[async_trait]
impl CaptureDriver for WebDriverCapture {
    type Element = fantoccini::elements::Element;

    fn browser(&self) -> Browser {
        self.browser
    }

    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        let start = Instant::now();
        match self.client.goto(url).await {
            Ok(()) => Ok(()),
            Err(_) if start.elapsed() >= self.load_timeout => Err(E2eError::LoadTimeout {
                url: url.to_string(),
                timeout_ms: self.load_timeout.as_millis() as u64,
            }),
            Err(e) => Err(driver_error(e)),
        }
    }

    async fn wait_for(&mut self, locator: &ElementLocator, timeout: Duration) -> E2eResult<Self::Element> {
        let selector = locator.selector();
        let query = if locator.is_xpath() {
            Locator::XPath(&selector)
        } else {
            Locator::Css(&selector)
        };

        match self.client.wait().at_most(timeout).for_element(query).await {
            Ok(element) => Ok(element),
            Err(CmdError::WaitTimeout) => Err(E2eError::NotReady {
                locator: locator.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(e) => Err(driver_error(e)),
        }
    }

    async fn click(&mut self, element: &Self::Element) -> E2eResult<()> {
        element.click().await.map_err(driver_error)
    }

    async fn screenshot(&mut self) -> E2eResult<Vec<u8>> {
        self.client.screenshot().await.map_err(driver_error)
    }
}

fn driver_error(e: CmdError) -> E2eError {
    E2eError::Driver(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("chrome", Browser::Chrome ; "chrome")]
    #[test_case("Chromium", Browser::Chrome ; "chromium alias")]
    #[test_case("FIREFOX", Browser::Firefox ; "firefox uppercase")]
    fn test_parse_browser(input: &str, expected: Browser) {
        assert_eq!(input.parse::<Browser>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_browser_is_rejected() {
        assert!("netscape".parse::<Browser>().is_err());
    }

    #[test]
    fn test_browser_identifier_round_trips_through_display() {
        for browser in [Browser::Chrome, Browser::Firefox] {
            assert_eq!(browser.to_string().parse::<Browser>().unwrap(), browser);
        }
    }

    #[test]
    fn test_chrome_capabilities() {
        let caps = Browser::Chrome.capabilities(true, 1280, 720);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless")));
        assert!(args.contains(&json!("--window-size=1280,720")));
        assert!(args.contains(&json!("--no-sandbox")));
    }

    #[test]
    fn test_firefox_capabilities_without_headless() {
        let caps = Browser::Firefox.capabilities(false, 1280, 720);
        let args = caps["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert!(!args.contains(&json!("-headless")));
        assert_eq!(args[..2], [json!("-width"), json!("1280")]);
    }

    #[test]
    fn test_locator_selectors() {
        assert_eq!(ElementLocator::tag("helpButton").selector(), r#"[data-test-tag="helpButton"]"#);
        assert!(!ElementLocator::tag("helpButton").is_xpath());

        let tab = ElementLocator::tab("Similarity Map");
        assert!(tab.is_xpath());
        assert_eq!(tab.selector(), r#"//*[@role="tab" and normalize-space(.)="Similarity Map"]"#);
        assert_eq!(tab.to_string(), "tab:Similarity Map");
    }

    #[test]
    fn test_locator_is_a_single_key_map() {
        let value = serde_json::to_value(ElementLocator::tag("helpButton")).unwrap();
        assert_eq!(value, json!({ "tag": "helpButton" }));

        let css: ElementLocator = serde_yaml::from_str("css: \"#root\"").unwrap();
        assert_eq!(css, ElementLocator::Css("#root".to_string()));
    }

    #[test_case("{}" ; "no key")]
    #[test_case("{ tag: a, css: b }" ; "two keys")]
    #[test_case("{ xpath: //div }" ; "unknown key")]
    fn test_malformed_locator_is_rejected(yaml: &str) {
        assert!(serde_yaml::from_str::<ElementLocator>(yaml).is_err());
    }
}
