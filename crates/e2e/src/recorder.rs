//! Session-scoped result bag
//!
//! One bag per test session. It is created with the version of the build
//! under test, scenarios add metrics to it, and it is written once at the
//! end as `<results>/screenshots/<browser>_timings_<version>.json`. The
//! file name only depends on browser and version, so re-running the same
//! build overwrites the previous file instead of piling up new ones.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::driver::Browser;
use crate::error::{E2eError, E2eResult};
use crate::snapshot::CANDIDATE_DIR;

pub const VERSION_KEY: &str = "version";

/// Source of the version string of the software under test
pub trait VersionProvider {
    fn version(&self) -> E2eResult<String>;
}

/// Version obtained from an external command, e.g. `poetry version -s`
#[derive(Debug, Clone)]
pub struct CommandVersion {
    program: String,
    args: Vec<String>,
}

impl CommandVersion {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace separated command line such as `"poetry version -s"`.
    pub fn from_command_line(line: &str) -> E2eResult<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| E2eError::VersionUnavailable("empty version command".to_string()))?;
        Ok(Self::new(program, parts))
    }
}

impl VersionProvider for CommandVersion {
    fn version(&self) -> E2eResult<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| E2eError::VersionUnavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(E2eError::VersionUnavailable(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(E2eError::VersionUnavailable(format!(
                "{} printed no version",
                self.program
            )));
        }

        Ok(version)
    }
}

/// A version known up front
#[derive(Debug, Clone)]
pub struct FixedVersion(pub String);

impl VersionProvider for FixedVersion {
    fn version(&self) -> E2eResult<String> {
        if self.0.trim().is_empty() {
            return Err(E2eError::VersionUnavailable("empty version".to_string()));
        }
        Ok(self.0.trim().to_string())
    }
}

/// Serializable metrics of one session
#[derive(Debug, Clone)]
pub struct ResultBag {
    version: String,
    metrics: Map<String, Value>,
}

impl ResultBag {
    /// Start a bag for the current build. There is no fallback version.
    pub fn open(provider: &dyn VersionProvider) -> E2eResult<Self> {
        let version = provider.version()?;
        info!("Recording results for version {}", version);

        let mut metrics = Map::new();
        metrics.insert(VERSION_KEY.to_string(), Value::String(version.clone()));

        Ok(Self { version, metrics })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Insert or overwrite a metric.
    pub fn record(&mut self, key: impl Into<String>, value: impl Serialize) -> E2eResult<()> {
        let key = key.into();
        if key == VERSION_KEY {
            return Err(E2eError::ReservedMetric(key));
        }

        let value = serde_json::to_value(value)?;
        debug!("Recorded {} = {}", key, value);
        self.metrics.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.metrics.clone())
    }

    pub fn output_path(&self, browser: Browser, output_root: &Path) -> PathBuf {
        let version = self.version.replace(|c: char| c == '/' || c == '\\', "_");
        output_root
            .join(CANDIDATE_DIR)
            .join(format!("{}_timings_{}.json", browser, version))
    }

    /// Write the bag, replacing any file of the same browser and version.
    pub fn flush(&self, browser: Browser, output_root: &Path) -> E2eResult<PathBuf> {
        let path = self.output_path(browser, output_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
