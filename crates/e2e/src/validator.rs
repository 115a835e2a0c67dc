//! Dual-channel validation: create through the UI, confirm through UI and API
//!
//! ```text
//! register (API) ─► sink
//!      │
//! open login ─► login (UI) ─► dashboard?
//!      │
//! create category (UI) ─► visible in list? (UI, polled)
//!      │                 ─► latest == category? (API, polled)
//! create subcategory (UI) ─► visible in list? (UI, polled)
//!                          ─► latest == subcategory? (API, polled)
//! ```
//!
//! Strictly sequential. The first failing step ends the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::{latest_category, ApiClient, CategoryRecord, Credential};
use crate::config::WorkflowConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{unique_login_email, AccountFixture, CategoryPair, RunSuffix};
use crate::interface::{Interface, NewCategory};
use crate::sink::FixtureSink;
use crate::wait::{poll_until, Poller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStep {
    RegisterAccount,
    OpenLogin,
    RejectedLogin,
    Login,
    CreateCategory,
    VerifyCategoryApi,
    CreateSubcategory,
    VerifySubcategoryApi,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::RegisterAccount => "register-account",
            WorkflowStep::OpenLogin => "open-login",
            WorkflowStep::RejectedLogin => "rejected-login",
            WorkflowStep::Login => "login",
            WorkflowStep::CreateCategory => "create-category",
            WorkflowStep::VerifyCategoryApi => "verify-category-api",
            WorkflowStep::CreateSubcategory => "create-subcategory",
            WorkflowStep::VerifySubcategoryApi => "verify-subcategory-api",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Outcome of one run, written out as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub suffix: RunSuffix,
    pub login_email: Option<String>,
    pub category: String,
    pub subcategory: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl WorkflowReport {
    /// Write to `<dir>/workflow-report-<suffix>.json`; one file per run so
    /// parallel runs never share it
    pub fn write(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("workflow-report-{}.json", self.suffix));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

/// Everything one successful pass produced. Not persisted.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub fixture: AccountFixture,
    pub credential: Credential,
    pub category: CategoryRecord,
    pub subcategory: CategoryRecord,
}

/// Orchestrates fixture, API and interface into the six-check workflow
pub struct DualChannelValidator<I: Interface> {
    config: WorkflowConfig,
    api: ApiClient,
    sink: FixtureSink,
    ui: I,
    steps: Vec<StepRecord>,
    /// Set once registration succeeds, so failed runs still name the account
    login_email: Option<String>,
}

impl<I: Interface> DualChannelValidator<I> {
    pub fn new(config: WorkflowConfig, ui: I) -> E2eResult<Self> {
        let api = ApiClient::new(&config.api_base_url, config.timeouts.request())?;
        let sink = FixtureSink::new(config.fixture_path.clone());
        Ok(Self {
            config,
            api,
            sink,
            ui,
            steps: Vec::new(),
            login_email: None,
        })
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Run the workflow and close the interface. Never fails: the outcome,
    /// including which step broke, is in the report.
    pub async fn run(&mut self, suffix: RunSuffix) -> WorkflowReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let pair = CategoryPair::new(&suffix);
        self.steps.clear();
        self.login_email = None;

        info!("Starting workflow run {}", suffix);

        let outcome = self.execute(&suffix).await;

        let mut screenshot = None;
        if let Err(e) = &outcome {
            error!("✗ run {} - {}", suffix, e);
            if self.config.browser.screenshot_on_failure {
                match self.ui.screenshot(&format!("failure-{}", suffix)).await {
                    Ok(path) => screenshot = path,
                    Err(shot_err) => warn!("Failure screenshot not taken: {}", shot_err),
                }
            }
        }

        if let Err(e) = self.ui.close().await {
            warn!("Interface did not close cleanly: {}", e);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_ok() {
            info!("✓ run {} ({} ms)", suffix, duration_ms);
        }

        WorkflowReport {
            suffix,
            login_email: self.login_email.clone(),
            category: pair.category,
            subcategory: pair.subcategory,
            started_at,
            duration_ms,
            success: outcome.is_ok(),
            steps: self.steps.clone(),
            error: outcome.err().map(|e| e.to_string()),
            screenshot,
        }
    }

    /// The strict step sequence. Stops at the first failure.
    pub async fn execute(&mut self, suffix: &RunSuffix) -> E2eResult<WorkflowRun> {
        let pair = CategoryPair::new(suffix);

        let started = Instant::now();
        let result = self.register_account(suffix).await;
        let fixture = self.finish(WorkflowStep::RegisterAccount, started, result)?;
        self.login_email = Some(fixture.login_email().to_string());

        let started = Instant::now();
        let result = self.open_login().await;
        self.finish(WorkflowStep::OpenLogin, started, result)?;

        if self.config.check_rejected_login {
            let started = Instant::now();
            let wrong = format!("{}-wrong", fixture.password());
            let result = self.check_rejected_login(fixture.login_email(), &wrong).await;
            self.finish(WorkflowStep::RejectedLogin, started, result)?;
        }

        let started = Instant::now();
        let result = self.login(&fixture).await;
        self.finish(WorkflowStep::Login, started, result)?;

        let category = NewCategory::root(pair.category);
        let started = Instant::now();
        let result = self.create_and_show(&category, true).await;
        self.finish(WorkflowStep::CreateCategory, started, result)?;

        // The API session is independent of the browser session
        let started = Instant::now();
        let result = self.authenticate_and_verify(&fixture, &category).await;
        let (credential, category_record) = self.finish(WorkflowStep::VerifyCategoryApi, started, result)?;

        let subcategory = NewCategory::child(pair.subcategory, category.name.clone());
        let started = Instant::now();
        let result = self.create_and_show(&subcategory, false).await;
        self.finish(WorkflowStep::CreateSubcategory, started, result)?;

        let started = Instant::now();
        let result = self.verify_latest(&credential, &subcategory).await;
        let subcategory_record = self.finish(WorkflowStep::VerifySubcategoryApi, started, result)?;

        Ok(WorkflowRun {
            fixture,
            credential,
            category: category_record,
            subcategory: subcategory_record,
        })
    }

    fn finish<T>(&mut self, step: WorkflowStep, started: Instant, result: E2eResult<T>) -> E2eResult<T> {
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                info!("✓ {} ({} ms)", step, duration_ms);
                self.steps.push(StepRecord {
                    step,
                    success: true,
                    duration_ms,
                    error: None,
                });
                Ok(value)
            }
            Err(e) => {
                self.steps.push(StepRecord {
                    step,
                    success: false,
                    duration_ms,
                    error: Some(e.to_string()),
                });
                Err(e.in_step(step.as_str()))
            }
        }
    }

    async fn register_account(&mut self, suffix: &RunSuffix) -> E2eResult<AccountFixture> {
        let account = &self.config.account;
        let email = unique_login_email(&account.base_email, &account.domain, suffix);

        let info = self.api.register(&email, &account.password, &account.roles).await?;
        let fixture = AccountFixture::from_registration(&email, &account.password, &account.roles, &info);

        // flock and file I/O block; keep them off the runtime's worker threads
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || sink.append(&info))
            .await
            .map_err(std::io::Error::from)??;

        Ok(fixture)
    }

    async fn open_login(&mut self) -> E2eResult<()> {
        self.ui.navigate_to_login().await?;
        if !self.ui.login_page_ready().await? {
            let at = self.ui.current_location().await?;
            return Err(E2eError::AssertionFailed(format!(
                "login page not displayed correctly (expected {}, at {})",
                self.config.login_url(),
                at
            )));
        }
        Ok(())
    }

    async fn login(&mut self, fixture: &AccountFixture) -> E2eResult<()> {
        self.ui.submit_login(fixture.login_email(), fixture.password()).await?;
        if !self.ui.is_authenticated_landing_visible().await? {
            let at = self.ui.current_location().await?;
            return Err(E2eError::AssertionFailed(format!(
                "not logged in: expected {} with category navigation, at {}",
                self.config.dashboard_url(),
                at
            )));
        }
        Ok(())
    }

    /// Wrong credentials must leave the dashboard-only element hidden and the
    /// browser on the login location. Returns to a fresh login page.
    pub async fn check_rejected_login(&mut self, email: &str, wrong_password: &str) -> E2eResult<()> {
        self.ui.submit_login(email, wrong_password).await?;

        if self.ui.is_authenticated_landing_visible().await? {
            return Err(E2eError::AssertionFailed(
                "wrong password reached the dashboard".to_string(),
            ));
        }
        let at = self.ui.current_location().await?;
        if at != self.config.login_url() {
            return Err(E2eError::AssertionFailed(format!(
                "wrong password left the login page: at {}",
                at
            )));
        }

        self.ui.navigate_to_login().await
    }

    async fn create_and_show(&mut self, category: &NewCategory, from_dashboard: bool) -> E2eResult<()> {
        if from_dashboard {
            self.ui.open_categories().await?;
        }
        self.ui.create_category(category).await?;

        let mut poller = Poller::start(self.config.timeouts.visibility_policy());
        let visible = loop {
            let seen = self.ui.is_category_visible_in_list(&category.name).await?;
            if seen || !poller.again().await {
                break seen;
            }
        };

        if !visible {
            return Err(E2eError::AssertionFailed(format!(
                "'{}' not shown in the category list after {} checks ({:?})",
                category.name,
                poller.attempts(),
                poller.elapsed()
            )));
        }
        debug!("'{}' visible after {} checks", category.name, poller.attempts());
        Ok(())
    }

    async fn authenticate_and_verify(
        &mut self,
        fixture: &AccountFixture,
        category: &NewCategory,
    ) -> E2eResult<(Credential, CategoryRecord)> {
        let credential = self
            .api
            .authenticate(fixture.login_email(), fixture.password(), fixture.user_name())
            .await?;
        let record = self.verify_latest(&credential, category).await?;
        Ok((credential, record))
    }

    /// The API's newest record must be the one just created through the UI
    async fn verify_latest(&self, credential: &Credential, expected: &NewCategory) -> E2eResult<CategoryRecord> {
        let api = &self.api;
        let ordering = self.config.ordering;

        let outcome = poll_until(
            self.config.timeouts.api_policy(),
            move || async move {
                let records = api.list_categories(credential).await?;
                Ok::<_, E2eError>(latest_category(&records, ordering)?.clone())
            },
            |latest| latest.name == expected.name,
        )
        .await?;

        if !outcome.satisfied {
            return Err(E2eError::AssertionFailed(format!(
                "API latest category is '{}', expected '{}' ({} reads)",
                outcome.last.name, expected.name, outcome.attempts
            )));
        }

        let record = outcome.last;
        if let (Some(want), Some(got)) = (&expected.parent, &record.parent_name) {
            if want != got {
                return Err(E2eError::AssertionFailed(format!(
                    "'{}' has parent '{}' in the API, expected '{}'",
                    record.name, got, want
                )));
            }
        }

        Ok(record)
    }
}
