//! DataLens UI test runner
//!
//! Runs visual regression scenarios against a running frontend, smoke-tests
//! the HTTP API, or promotes candidates to references.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use datalens_e2e::api::ApiClient;
use datalens_e2e::{
    Browser, CommandVersion, E2eResult, HarnessConfig, RunContext, Scenario, Session,
    SnapshotStore, WebDriverCapture,
};

#[derive(Parser, Debug)]
#[command(name = "datalens-e2e")]
#[command(about = "Visual regression and API smoke runner for DataLens")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture scenarios and compare them with their references
    Run(RunArgs),

    /// Check the table endpoints of a running backend
    Smoke(SmokeArgs),

    /// Accept the current candidates as references
    Promote(PromoteArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Browser to use (chrome, firefox)
    #[arg(long, env = "DATALENS_BROWSER", default_value = "chrome")]
    browser: Browser,

    /// Output directory for screenshots and results
    #[arg(long, env = "DATALENS_RESULTS_FOLDER", default_value = "build/ui_tests")]
    results_folder: PathBuf,

    /// Directory with scenario YAML files (built-in start page if omitted)
    #[arg(long)]
    scenarios: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Frontend base URL
    #[arg(long, env = "DATALENS_FRONTEND_URL", default_value = "http://localhost:3000")]
    frontend_base_url: String,

    /// Backend base URL
    #[arg(long, env = "DATALENS_BACKEND_URL", default_value = "http://localhost:5000")]
    backend_base_url: String,

    /// Directory the backend loads datasets from
    #[arg(long, default_value = "build/datasets")]
    test_data_path: PathBuf,

    /// WebDriver endpoint (defaults to the browser's driver port)
    #[arg(long, env = "DATALENS_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Command printing the version under test
    #[arg(long, default_value = "poetry version -s")]
    version_cmd: String,

    /// Ratios below this count as unchanged
    #[arg(long, default_value = "1e-9")]
    diff_threshold: f64,

    /// Page load timeout in seconds
    #[arg(long, default_value = "20")]
    load_timeout: u64,

    /// Run only the scenario with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Skip dataset loading and walkthrough suppression
    #[arg(long)]
    no_fixtures: bool,
}

#[derive(Args, Debug)]
struct SmokeArgs {
    /// Backend base URL
    #[arg(long, env = "DATALENS_BACKEND_URL", default_value = "http://localhost:5000")]
    backend_base_url: String,

    /// Dataset to open before checking, relative to the backend
    #[arg(long)]
    dataset: Option<String>,

    /// Columns whose first cell must be retrievable
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
}

#[derive(Args, Debug)]
struct PromoteArgs {
    #[command(flatten)]
    target: TargetArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run(args) => run(args).await,
            Commands::Smoke(args) => smoke(args).await,
            Commands::Promote(args) => promote(args),
        }
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn load_scenarios(target: &TargetArgs) -> E2eResult<Vec<Scenario>> {
    match &target.scenarios {
        Some(dir) => Scenario::load_all(dir),
        None => Ok(vec![Scenario::startpage()]),
    }
}

async fn run(args: RunArgs) -> E2eResult<bool> {
    let mut scenarios = load_scenarios(&args.target)?;
    if let Some(name) = &args.name {
        scenarios.retain(|s| &s.name == name);
        if scenarios.is_empty() {
            return Err(datalens_e2e::E2eError::InvalidScenario(format!(
                "Scenario not found: {}",
                name
            )));
        }
    }

    let ctx = RunContext {
        browser: args.target.browser,
        headless: args.headless,
        frontend_base_url: args.frontend_base_url,
        backend_base_url: args.backend_base_url,
        results_folder: args.target.results_folder,
        test_data_path: args.test_data_path,
    };
    let config = HarnessConfig {
        load_timeout: Duration::from_secs(args.load_timeout),
        diff_threshold: args.diff_threshold,
        webdriver_url: args.webdriver_url,
        ..Default::default()
    };

    // Nothing between Session::open and finish() may return early
    let api = if args.no_fixtures {
        None
    } else {
        Some(ApiClient::new(ctx.backend_base_url.clone())?)
    };

    let version = CommandVersion::from_command_line(&args.version_cmd)?;
    let mut session = Session::open(ctx.clone(), config.clone(), &version)?;

    info!("Running {} scenario(s)...", scenarios.len());

    for scenario in &scenarios {
        // one browser session per scenario
        let mut driver = match WebDriverCapture::connect(ctx.browser, ctx.headless, &config).await {
            Ok(driver) => driver,
            Err(e) => {
                error!("✗ {} - {}", scenario.name, e);
                continue;
            }
        };

        session.run_scenario(&mut driver, scenario, api.as_ref()).await;

        if let Err(e) = driver.close().await {
            warn!("Closing browser failed: {}", e);
        }
    }

    let summary = session.finish()?;
    let all_ran = summary.reports.len() == scenarios.len();
    Ok(summary.failed == 0 && all_ran)
}

async fn smoke(args: SmokeArgs) -> E2eResult<bool> {
    let api = ApiClient::new(args.backend_base_url)?;
    if let Some(dataset) = &args.dataset {
        api.open_table(dataset).await?;
    }

    let report = api.smoke(&args.columns).await?;
    for failure in &report.failed {
        error!("✗ {} - {}", failure.column, failure.error);
    }
    Ok(report.success())
}

fn promote(args: PromoteArgs) -> E2eResult<bool> {
    let store = SnapshotStore::new(&args.target.results_folder);
    for scenario in load_scenarios(&args.target)? {
        store.promote(&scenario.name, args.target.browser)?;
    }
    Ok(true)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_args(results: &std::path::Path, scenarios: &std::path::Path) -> RunArgs {
        RunArgs {
            target: TargetArgs {
                browser: Browser::Firefox,
                results_folder: results.to_path_buf(),
                scenarios: Some(scenarios.to_path_buf()),
            },
            headless: true,
            frontend_base_url: "http://localhost:3000".to_string(),
            backend_base_url: "http://localhost:5000".to_string(),
            test_data_path: PathBuf::from("build/datasets"),
            webdriver_url: None,
            version_cmd: "echo 2.0.1".to_string(),
            diff_threshold: 1e-9,
            load_timeout: 20,
            name: None,
            no_fixtures: false,
        }
    }

    #[tokio::test]
    async fn test_run_with_fixtures_flushes_result_bag() {
        let results = TempDir::new().unwrap();
        let scenarios = TempDir::new().unwrap();

        assert!(run(run_args(results.path(), scenarios.path())).await.unwrap());
        assert!(results.path().join("screenshots/firefox_timings_2.0.1.json").is_file());
    }

    #[tokio::test]
    async fn test_run_without_version_writes_nothing() {
        let results = TempDir::new().unwrap();
        let scenarios = TempDir::new().unwrap();
        let args = RunArgs {
            version_cmd: "false".to_string(),
            ..run_args(results.path(), scenarios.path())
        };

        assert!(run(args).await.is_err());
        assert!(!results.path().join("screenshots").exists());
    }
}
