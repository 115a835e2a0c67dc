//! Workflow configuration
//!
//! Resolved once at run start: defaults, then an optional TOML file, then
//! command-line / environment overrides applied by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::CategoryOrdering;
use crate::error::{E2eError, E2eResult};
use crate::interface::Selectors;
use crate::playwright::Browser;
use crate::wait::PollPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Backend API root, e.g. `https://api.example.com`
    pub api_base_url: String,

    /// Rendered application root, e.g. `https://app.example.com`
    pub ui_base_url: String,

    pub account: AccountConfig,

    pub timeouts: TimeoutConfig,

    pub browser: BrowserConfig,

    pub selectors: Selectors,

    /// How the newest record is picked from the API listing
    pub ordering: CategoryOrdering,

    /// JSON array of registered accounts
    pub fixture_path: PathBuf,

    /// Reports and failure screenshots
    pub output_dir: PathBuf,

    /// Also verify that a wrong password keeps the user on the login page
    pub check_rejected_login: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.club-administration.qa.qubika.com".to_string(),
            ui_base_url: "https://club-administration.qa.qubika.com".to_string(),
            account: AccountConfig::default(),
            timeouts: TimeoutConfig::default(),
            browser: BrowserConfig::default(),
            selectors: Selectors::default(),
            ordering: CategoryOrdering::default(),
            fixture_path: PathBuf::from("userdata/user_info.json"),
            output_dir: PathBuf::from("test-results"),
            check_rejected_login: false,
        }
    }
}

/// Fixture account parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Local part the random suffix is appended to
    pub base_email: String,
    pub domain: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            base_email: "vicmoller18".to_string(),
            domain: "gmail.com".to_string(),
            password: "PassQBK".to_string(),
            roles: vec!["ROLE_ADMIN".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Max wait for an element to become ready before acting on it
    pub readiness_ms: u64,
    /// Max wait for a created record to show up in the rendered list
    pub visibility_ms: u64,
    /// Max wait for the API listing to reflect a created record
    pub api_consistency_ms: u64,
    pub poll_interval_ms: u64,
    /// Per HTTP request
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            readiness_ms: 10_000,
            visibility_ms: 10_000,
            api_consistency_ms: 10_000,
            poll_interval_ms: 500,
            request_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn visibility_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.visibility_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn api_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.api_consistency_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub screenshot_on_failure: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            screenshot_on_failure: true,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            warn!("Config {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Normalize base URLs and reject settings the workflow cannot run with
    pub fn validate(mut self) -> E2eResult<Self> {
        self.api_base_url = normalize_base_url("api_base_url", &self.api_base_url)?;
        self.ui_base_url = normalize_base_url("ui_base_url", &self.ui_base_url)?;

        if self.account.base_email.is_empty() || self.account.base_email.contains('@') {
            return Err(E2eError::Config(format!(
                "account.base_email must be a bare local part, got '{}'",
                self.account.base_email
            )));
        }
        if self.account.domain.is_empty() {
            return Err(E2eError::Config("account.domain is empty".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config("timeouts.poll_interval_ms must be > 0".to_string()));
        }

        Ok(self)
    }

    pub fn login_url(&self) -> String {
        format!("{}/#/auth/login", self.ui_base_url)
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/#/dashboard", self.ui_base_url)
    }
}

fn normalize_base_url(field: &str, url: &str) -> E2eResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(E2eError::Config(format!("{} must be an http(s) URL, got '{}'", field, url)));
    }
    Ok(trimmed.to_string())
}
