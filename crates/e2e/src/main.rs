//! Runs one dual-channel category workflow against a live deployment.
//!
//! Exit status: 0 all checks passed, 1 a check failed, 2 the run could not
//! be set up.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use category_e2e::api::CategoryOrdering;
use category_e2e::playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
use category_e2e::{DualChannelValidator, RunSuffix, WorkflowConfig};

#[derive(Parser, Debug)]
#[command(name = "category-e2e")]
#[command(author, version, about = "Dual-channel E2E check of category management")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CATEGORY_E2E_CONFIG", default_value = "category-e2e.toml")]
    config: PathBuf,

    /// Backend API root
    #[arg(long, env = "CATEGORY_E2E_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Rendered application root
    #[arg(long, env = "CATEGORY_E2E_UI_BASE_URL")]
    ui_base_url: Option<String>,

    /// Browser engine
    #[arg(long, value_enum)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// How to pick the newest category from the API listing
    #[arg(long, value_enum)]
    ordering: Option<CategoryOrdering>,

    /// Reuse a known run suffix instead of drawing a random one
    #[arg(long)]
    suffix: Option<String>,

    /// Where registered accounts are appended
    #[arg(long, env = "CATEGORY_E2E_FIXTURE_PATH")]
    fixture_path: Option<PathBuf>,

    /// Output directory for reports and screenshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also check that a wrong password is rejected
    #[arg(long)]
    check_rejected_login: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn resolve(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = WorkflowConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.clone();
        }
        if let Some(url) = &self.ui_base_url {
            config.ui_base_url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.browser.engine = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(ordering) = self.ordering {
            config.ordering = ordering;
        }
        if let Some(path) = &self.fixture_path {
            config.fixture_path = path.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if self.check_rejected_login {
            config.check_rejected_login = true;
        }

        Ok(config.validate()?)
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let config = args.resolve()?;
    let suffix = args.suffix.clone().map(RunSuffix::fixed).unwrap_or_else(RunSuffix::random);

    info!("API: {}  UI: {}", config.api_base_url, config.ui_base_url);

    let driver = PlaywrightDriver::launch(PlaywrightConfig::from_workflow(&config))
        .await
        .context("starting the browser")?;

    let output_dir = config.output_dir.clone();
    let mut validator = DualChannelValidator::new(config, driver)?;
    let report = validator.run(suffix).await;
    report.write(&output_dir)?;

    Ok(report.success)
}
