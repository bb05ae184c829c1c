//! Session lifecycle and per-scenario orchestration
//!
//! A [`Session`] owns everything that lives for one test process: the run
//! context, the snapshot store, the differ and the result bag. Scenarios are
//! executed one after another against a caller-provided [`CaptureDriver`];
//! each one walks
//!
//! ```text
//! Init → Navigating → AwaitingReady → Interacting → Settling → Capturing
//!      → Compared | BaselineEstablished | Failed
//! ```
//!
//! without retries. A failed scenario never prevents the final flush of the
//! result bag in [`Session::finish`].

use std::path::PathBuf;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::{HarnessConfig, RunContext};
use crate::driver::{Browser, CaptureDriver};
use crate::error::{E2eError, E2eResult};
use crate::recorder::{ResultBag, VersionProvider};
use crate::scenario::{Interaction, Scenario, Settle};
use crate::snapshot::{SnapshotPaths, SnapshotStore};
use crate::visual::Differ;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Init,
    Navigating,
    AwaitingReady,
    Interacting,
    Settling,
    Capturing,
    Compared,
    BaselineEstablished,
    Failed,
}

impl ScenarioState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioState::Compared | ScenarioState::BaselineEstablished | ScenarioState::Failed
        )
    }
}

/// Terminal result of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Compared {
        ratio: f64,
        diff_image_path: Option<PathBuf>,
        normalized: bool,
    },
    BaselineEstablished,
    Failed {
        /// State the scenario was in when it failed
        stage: ScenarioState,
        error: String,
        diagnostic_screenshot: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub browser: Browser,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub candidate_path: PathBuf,
    pub outcome: ScenarioOutcome,
}

impl ScenarioReport {
    pub fn state(&self) -> ScenarioState {
        match self.outcome {
            ScenarioOutcome::Compared { .. } => ScenarioState::Compared,
            ScenarioOutcome::BaselineEstablished => ScenarioState::BaselineEstablished,
            ScenarioOutcome::Failed { .. } => ScenarioState::Failed,
        }
    }

    pub fn success(&self) -> bool {
        self.state() != ScenarioState::Failed
    }

    pub fn ratio(&self) -> Option<f64> {
        match self.outcome {
            ScenarioOutcome::Compared { ratio, .. } => Some(ratio),
            _ => None,
        }
    }
}

/// What a finished session leaves behind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub result_path: PathBuf,
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<ScenarioReport>,
}

/// One test process worth of scenarios
pub struct Session {
    ctx: RunContext,
    config: HarnessConfig,
    store: SnapshotStore,
    differ: Differ,
    bag: ResultBag,
    reports: Vec<ScenarioReport>,
}

impl Session {
    /// Start a session. Fails before anything runs if the version of the
    /// build under test cannot be determined.
    pub fn open(ctx: RunContext, config: HarnessConfig, version: &dyn VersionProvider) -> E2eResult<Self> {
        let bag = ResultBag::open(version)?;

        let store = SnapshotStore::new(&ctx.results_folder);
        store.ensure_dirs()?;

        info!(
            "Session for {} (version {}), results in {}",
            ctx.browser,
            bag.version(),
            ctx.results_folder.display()
        );

        Ok(Self {
            differ: Differ::new(config.diff_threshold),
            ctx,
            config,
            store,
            bag,
            reports: Vec::new(),
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn bag(&self) -> &ResultBag {
        &self.bag
    }

    pub fn bag_mut(&mut self) -> &mut ResultBag {
        &mut self.bag
    }

    pub fn reports(&self) -> &[ScenarioReport] {
        &self.reports
    }

    /// Drive one scenario to its terminal state.
    ///
    /// With an API client, the scenario's dataset is opened and the
    /// walkthroughs are suppressed first; the walkthrough flags are reset
    /// afterwards whatever the outcome.
    pub async fn run_scenario<D: CaptureDriver>(
        &mut self,
        driver: &mut D,
        scenario: &Scenario,
        api: Option<&ApiClient>,
    ) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let browser = self.ctx.browser;

        // The name becomes part of file names; nothing touches disk or the
        // browser for an invalid one.
        if let Err(e) = scenario.validate() {
            error!("✗ {}", e);
            let report = ScenarioReport {
                name: scenario.name.clone(),
                browser,
                started_at,
                duration_ms: 0,
                candidate_path: PathBuf::new(),
                outcome: ScenarioOutcome::Failed {
                    stage: ScenarioState::Init,
                    error: e.to_string(),
                    diagnostic_screenshot: None,
                },
            };
            self.reports.push(report.clone());
            return report;
        }

        let paths = self.store.resolve_paths(&scenario.name, browser);

        if driver.browser() != browser {
            warn!(
                "Driver runs {} but the session records {}",
                driver.browser(),
                browser
            );
        }

        debug!("Running scenario: {}", scenario.name);

        let mut state = ScenarioState::Init;
        let result = match self.prepare(scenario, api).await {
            Ok(()) => self.drive(driver, scenario, &paths, &mut state).await,
            Err(e) => Err(e),
        };

        if let Some(api) = api.filter(|_| scenario.skip_tour) {
            if let Err(e) = api.restore_tours().await {
                warn!("Could not restore walkthrough flags: {}", e);
            }
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("✗ {} failed while {:?}: {}", scenario.name, state, e);
                let diagnostic_screenshot = self.capture_diagnostic(driver, &scenario.name).await;
                ScenarioOutcome::Failed {
                    stage: state,
                    error: e.to_string(),
                    diagnostic_screenshot,
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.record_metric(format!("{}.duration_ms", scenario.name), duration_ms);
        if let ScenarioOutcome::Compared { ratio, .. } = outcome {
            self.record_metric(format!("{}.diff_ratio", scenario.name), ratio);
        }

        let report = ScenarioReport {
            name: scenario.name.clone(),
            browser,
            started_at,
            duration_ms,
            candidate_path: paths.candidate,
            outcome,
        };

        if report.success() {
            info!("✓ {} ({:?}, {} ms)", report.name, report.state(), duration_ms);
        }

        self.reports.push(report.clone());
        report
    }

    /// Write the result bag and close the session.
    pub fn finish(self) -> E2eResult<SessionSummary> {
        let result_path = self.bag.flush(self.ctx.browser, &self.ctx.results_folder)?;

        let failed = self.reports.iter().filter(|r| !r.success()).count();
        let passed = self.reports.len() - failed;

        info!("Scenario results: {} passed, {} failed", passed, failed);

        Ok(SessionSummary {
            result_path,
            passed,
            failed,
            reports: self.reports,
        })
    }

    async fn prepare(&self, scenario: &Scenario, api: Option<&ApiClient>) -> E2eResult<()> {
        let Some(api) = api else {
            return Ok(());
        };

        if let Some(dataset) = &scenario.dataset {
            api.open_table(&self.ctx.dataset_path(dataset)).await?;
        }
        if scenario.skip_tour {
            api.skip_tours().await?;
        }
        Ok(())
    }

    async fn drive<D: CaptureDriver>(
        &self,
        driver: &mut D,
        scenario: &Scenario,
        paths: &SnapshotPaths,
        state: &mut ScenarioState,
    ) -> E2eResult<ScenarioOutcome> {
        *state = ScenarioState::Navigating;
        let url = self.ctx.frontend_url(&scenario.url);
        debug!("Navigating to {}", url);
        match tokio::time::timeout(self.config.load_timeout, driver.navigate(&url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(E2eError::LoadTimeout {
                    url,
                    timeout_ms: self.config.load_timeout.as_millis() as u64,
                })
            }
        }

        *state = ScenarioState::AwaitingReady;
        driver.wait_for(&scenario.ready, self.config.ready_timeout).await?;

        *state = ScenarioState::Interacting;
        for step in &scenario.steps {
            let element = driver
                .wait_for(step.target(), step.timeout(self.config.element_timeout))
                .await?;
            if let Interaction::Click { .. } = step {
                driver.click(&element).await?;
            }
        }

        *state = ScenarioState::Settling;
        settle(driver, &scenario.settle).await;

        *state = ScenarioState::Capturing;
        let png = driver.screenshot().await?;
        self.store.write(&png, &paths.candidate)?;

        if !self.store.reference_exists(&scenario.name, self.ctx.browser) {
            self.store.delete_diff(&paths.diff)?;
            info!(
                "No reference for '{}' - candidate becomes the baseline once promoted",
                scenario.name
            );
            *state = ScenarioState::BaselineEstablished;
            return Ok(ScenarioOutcome::BaselineEstablished);
        }

        let diff = self.differ.compare(&self.store, paths)?;
        info!("Computed difference of {} for '{}'", diff.ratio, scenario.name);

        *state = ScenarioState::Compared;
        Ok(ScenarioOutcome::Compared {
            ratio: diff.ratio,
            diff_image_path: diff.diff_image_path,
            normalized: diff.normalized,
        })
    }

    /// Best effort; errors are logged and dropped so they never hide the
    /// failure that triggered the capture.
    async fn capture_diagnostic<D: CaptureDriver>(&self, driver: &mut D, scenario: &str) -> Option<PathBuf> {
        let path = self.store.failure_path(scenario, self.ctx.browser);

        let result = match tokio::time::timeout(self.config.load_timeout, driver.screenshot()).await {
            Ok(Ok(png)) => self.store.write(&png, &path),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(E2eError::Driver("diagnostic screenshot timed out".to_string())),
        };

        match result {
            Ok(()) => {
                info!("Diagnostic screenshot saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Diagnostic screenshot for '{}' failed: {}", scenario, e);
                None
            }
        }
    }

    fn record_metric(&mut self, key: String, value: impl Serialize) {
        if let Err(e) = self.bag.record(key.clone(), value) {
            warn!("Could not record {}: {}", key, e);
        }
    }
}

/// Prefer the application's settled signal; fall back to the fixed delay.
async fn settle<D: CaptureDriver>(driver: &mut D, settle: &Settle) {
    if let Some(signal) = &settle.signal {
        match driver.wait_for(signal, settle.signal_timeout()).await {
            Ok(_) => {
                debug!("Rendering settled ({})", signal);
                return;
            }
            Err(e) => warn!(
                "No settle signal ({}), falling back to {} ms delay",
                e, settle.delay_ms
            ),
        }
    }
    tokio::time::sleep(settle.delay()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ScenarioState::Compared.is_terminal());
        assert!(ScenarioState::BaselineEstablished.is_terminal());
        assert!(ScenarioState::Failed.is_terminal());
        assert!(!ScenarioState::Settling.is_terminal());
    }

    #[test]
    fn test_report_serializes_outcome_tag() {
        let report = ScenarioReport {
            name: "gui".to_string(),
            browser: Browser::Chrome,
            started_at: Utc::now(),
            duration_ms: 10,
            candidate_path: PathBuf::from("screenshots/gui-chrome.png"),
            outcome: ScenarioOutcome::Failed {
                stage: ScenarioState::Navigating,
                error: "Page load exceeded 20000 ms: http://localhost:3000/".to_string(),
                diagnostic_screenshot: None,
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["browser"], "chrome");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["stage"], "navigating");
        assert!(!report.success());
        assert_eq!(report.ratio(), None);
    }
}
