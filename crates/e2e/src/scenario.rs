//! Declarative YAML scenario definitions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::driver::ElementLocator;
use crate::error::{E2eError, E2eResult};

/// One named UI flow ending in a screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Snapshot name; part of every file name of this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Page to open, relative to the frontend base URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Dataset file (under the test data path) to load before navigating
    #[serde(default)]
    pub dataset: Option<String>,

    /// Suppress the onboarding walkthroughs while the scenario runs
    #[serde(default = "default_true")]
    pub skip_tour: bool,

    /// Element whose presence means the application has booted
    pub ready: ElementLocator,

    /// Interactions leading to the captured state
    #[serde(default)]
    pub steps: Vec<Interaction>,

    /// How to wait for rendering to finish before the capture
    #[serde(default)]
    pub settle: Settle,
}

fn default_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// A single interaction with the page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Interaction {
    /// Wait for an element, then click it
    Click {
        target: ElementLocator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for an element without touching it
    Wait {
        target: ElementLocator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl Interaction {
    pub fn target(&self) -> &ElementLocator {
        match self {
            Interaction::Click { target, .. } | Interaction::Wait { target, .. } => target,
        }
    }

    /// Per-step timeout, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        let timeout_ms = match self {
            Interaction::Click { timeout_ms, .. } | Interaction::Wait { timeout_ms, .. } => *timeout_ms,
        };
        timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// Quiescence before capture.
///
/// With a `signal`, the scenario waits up to `signal_timeout_ms` for that
/// element and skips the fixed delay when it shows up. Without one, or when
/// it never appears, the fixed `delay_ms` applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settle {
    #[serde(default = "default_settle_delay")]
    pub delay_ms: u64,

    #[serde(default)]
    pub signal: Option<ElementLocator>,

    #[serde(default = "default_signal_timeout")]
    pub signal_timeout_ms: u64,
}

fn default_settle_delay() -> u64 {
    3000
}

fn default_signal_timeout() -> u64 {
    5000
}

impl Default for Settle {
    fn default() -> Self {
        Self {
            delay_ms: default_settle_delay(),
            signal: None,
            signal_timeout_ms: default_signal_timeout(),
        }
    }
}

impl Settle {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn signal_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_timeout_ms)
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid scenario name pattern"))
}

impl Scenario {
    /// The start page: similarity map next to the full datagrid.
    pub fn startpage() -> Self {
        Self {
            name: "gui".to_string(),
            description: "Start page with similarity map and the full datagrid".to_string(),
            url: default_url(),
            dataset: Some("tallymarks_dataset_small.h5".to_string()),
            skip_tour: true,
            ready: ElementLocator::tag("helpButton"),
            steps: vec![
                Interaction::Click {
                    target: ElementLocator::tab("Similarity Map"),
                    timeout_ms: None,
                },
                Interaction::Click {
                    target: ElementLocator::tag("datagridAllTabButton"),
                    timeout_ms: None,
                },
            ],
            settle: Settle::default(),
        }
    }

    /// Names end up in file names, so only a conservative set is allowed.
    pub fn validate(&self) -> E2eResult<()> {
        if !name_pattern().is_match(&self.name) {
            return Err(E2eError::InvalidScenario(format!(
                "'{}' is not a valid scenario name",
                self.name
            )));
        }
        Ok(())
    }

    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        scenarios.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pair) = scenarios.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(E2eError::InvalidScenario(format!(
                "duplicate scenario name '{}'",
                pair[0].name
            )));
        }

        Ok(scenarios)
    }
}
