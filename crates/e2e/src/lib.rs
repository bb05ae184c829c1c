//! DataLens visual regression harness
//!
//! This crate drives a running DataLens instance to a deterministic UI
//! state, captures a screenshot and compares it against the accepted
//! reference of a previous run:
//! - Talks to chromedriver/geckodriver over the WebDriver protocol
//! - Parses declarative YAML scenarios
//! - Keeps reference, candidate and diff screenshots in two directory trees
//! - Records per-session metrics into a versioned JSON result bag
//! - Smoke-tests the table and config endpoints of the HTTP API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Session (one per test process)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  open(ctx, config, version) -> Session | VersionUnavailable │
//! │  run_scenario(driver, scenario, api) -> ScenarioReport      │
//! │    ├── ApiClient: open dataset, skip walkthroughs           │
//! │    ├── CaptureDriver: navigate, wait, click, screenshot     │
//! │    ├── SnapshotStore: <results>/screenshots/…-<browser>.png │
//! │    └── Differ: ratio vs <results>/old-screenshots/…         │
//! │  finish() -> <browser>_timings_<version>.json               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod recorder;
pub mod runner;
pub mod scenario;
pub mod snapshot;
pub mod visual;

pub use config::{HarnessConfig, RunContext};
pub use driver::{Browser, CaptureDriver, ElementLocator, WebDriverCapture};
pub use error::{E2eError, E2eResult};
pub use recorder::{CommandVersion, FixedVersion, ResultBag, VersionProvider};
pub use runner::{ScenarioOutcome, ScenarioReport, ScenarioState, Session, SessionSummary};
pub use scenario::{Interaction, Scenario, Settle};
pub use snapshot::{SnapshotPaths, SnapshotStore};
pub use visual::{DiffOutcome, Differ};
