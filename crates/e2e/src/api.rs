//! Client for the application HTTP API
//!
//! Used for fixture preparation (loading a dataset, silencing the
//! onboarding tours) and for API smoke checks.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::join_url;
use crate::error::E2eResult;

/// Config flags that start the spotlight walkthroughs when unset
pub const WALKTHROUGH_KEYS: [&str; 2] = [
    "walkthrough.main_tour.did_run",
    "walkthrough.filebrowser_tour.did_run",
];

const CONFIG_TIMEOUT: Duration = Duration::from_secs(1);
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// The part of `GET /api/table/` the harness relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub generation_id: i64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of an API smoke run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmokeReport {
    pub generation_id: i64,
    pub passed: Vec<String>,
    pub failed: Vec<SmokeFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeFailure {
    pub column: String,
    pub error: String,
}

impl SmokeReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// `GET /api/table/`
    pub async fn get_table(&self) -> E2eResult<TableSummary> {
        let summary = self
            .client
            .get(self.url("/api/table/"))
            .send()
            .await?
            .error_for_status()?
            .json::<TableSummary>()
            .await?;

        debug!("Table generation {}", summary.generation_id);
        Ok(summary)
    }

    /// `GET /api/table/{col}/{row}?generation_id=<id>`; the raw cell payload.
    pub async fn get_cell(&self, column: &str, row: usize, generation_id: i64) -> E2eResult<Vec<u8>> {
        let bytes = self
            .client
            .get(self.url(&format!("/api/table/{}/{}", column, row)))
            .query(&[("generation_id", generation_id)])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(bytes.to_vec())
    }

    /// `POST /api/table/open/<path>`: replace the loaded dataset.
    pub async fn open_table(&self, dataset_path: &str) -> E2eResult<()> {
        info!("Opening dataset {}", dataset_path);
        self.client
            .post(self.url(&format!("/api/table/open/{}", dataset_path.trim_start_matches('/'))))
            .timeout(OPEN_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `PUT /api/config/<key>` with a boolean value.
    pub async fn set_config(&self, key: &str, value: bool) -> E2eResult<()> {
        self.client
            .put(self.url(&format!("/api/config/{}", key)))
            .timeout(CONFIG_TIMEOUT)
            .json(&json!({ "value": value }))
            .send()
            .await?
            .error_for_status()?;
        debug!("Config {} = {}", key, value);
        Ok(())
    }

    /// Mark all walkthroughs as already shown.
    pub async fn skip_tours(&self) -> E2eResult<()> {
        for key in WALKTHROUGH_KEYS {
            self.set_config(key, true).await?;
        }
        Ok(())
    }

    /// Undo `skip_tours`. Every key is attempted; the first error is returned.
    pub async fn restore_tours(&self) -> E2eResult<()> {
        let mut first_error = None;
        for key in WALKTHROUGH_KEYS {
            if let Err(e) = self.set_config(key, false).await {
                warn!("Could not reset {}: {}", key, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetch the table and the first cell of each column.
    pub async fn smoke(&self, columns: &[String]) -> E2eResult<SmokeReport> {
        let table = self.get_table().await?;
        let mut report = SmokeReport {
            generation_id: table.generation_id,
            ..Default::default()
        };

        for column in columns {
            match self.get_cell(column, 0, table.generation_id).await {
                Ok(_) => report.passed.push(column.clone()),
                Err(e) => {
                    warn!("Cell {}/0 failed: {}", column, e);
                    report.failed.push(SmokeFailure {
                        column: column.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "API smoke: {} passed, {} failed",
            report.passed.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
