//! Process-wide run configuration
//!
//! Everything here is fixed before the first scenario runs and is only read
//! afterwards. The runner binary fills these from command line arguments;
//! tests build them directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::Browser;

/// Where the harness points and where it writes.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Browser engine used for every scenario of the session
    pub browser: Browser,

    /// Run the browser without a visible window
    pub headless: bool,

    /// Base URL of the web frontend
    pub frontend_base_url: String,

    /// Base URL of the HTTP API
    pub backend_base_url: String,

    /// Root of all screenshots and result files
    pub results_folder: PathBuf,

    /// Directory the datasets are served from
    pub test_data_path: PathBuf,
}

impl RunContext {
    /// Absolute frontend URL for a scenario path such as `/` or `/inspect`.
    pub fn frontend_url(&self, path: &str) -> String {
        join_url(&self.frontend_base_url, path)
    }

    /// Dataset location as the API expects it.
    pub fn dataset_path(&self, file: &str) -> String {
        self.test_data_path.join(file).to_string_lossy().replace('\\', "/")
    }

    pub fn results_folder(&self) -> &Path {
        &self.results_folder
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            browser: Browser::Chrome,
            headless: false,
            frontend_base_url: "http://localhost:3000".to_string(),
            backend_base_url: "http://localhost:5000".to_string(),
            results_folder: PathBuf::from("build/ui_tests"),
            test_data_path: PathBuf::from("build/datasets"),
        }
    }
}

/// Timing and policy knobs of the visual regression engine.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Upper bound for a page navigation
    pub load_timeout: Duration,

    /// Upper bound for the readiness element to show up
    pub ready_timeout: Duration,

    /// Upper bound for elements targeted by interactions
    pub element_timeout: Duration,

    /// Ratios below this are "no meaningful change"
    pub diff_threshold: f64,

    /// Browser window size in CSS pixels
    pub window_width: u32,
    pub window_height: u32,

    /// WebDriver endpoint; `None` uses the browser's default port
    pub webdriver_url: Option<String>,
}

pub const DEFAULT_DIFF_THRESHOLD: f64 = 1e-9;

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(20),
            ready_timeout: Duration::from_secs(10),
            element_timeout: Duration::from_secs(10),
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            window_width: 1280,
            window_height: 720,
            webdriver_url: None,
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, path.trim_start_matches('/'))
}
