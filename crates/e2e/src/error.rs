//! Error types for the category E2E workflow

use thiserror::Error;

/// Why the backend refused to hand out a bearer credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("login rejected with status {status}")]
    Rejected { status: u16 },

    #[error("login succeeded but the response carried no token")]
    MissingToken,
}

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Registration failed with status {status}: {body}")]
    Registration { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Authentication(AuthFailure),

    #[error("Failed to retrieve categories: status {status}")]
    Retrieval { status: u16 },

    #[error("No categories found")]
    EmptyResult,

    #[error("Timeout after {timeout_ms} ms waiting for: {target}")]
    UiTimeout { target: String, timeout_ms: u64 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Step failed: {step} - {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<E2eError>,
    },

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Wrap an error with the name of the workflow step it aborted.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        E2eError::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through step wrappers.
    pub fn root(&self) -> &E2eError {
        match self {
            E2eError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
