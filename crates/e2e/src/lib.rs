//! Category management E2E verifier
//!
//! Creates a category and a subcategory through the rendered application and
//! confirms each one through two independent channels: the rendered list and
//! a direct backend API read. A divergence between what the user sees and
//! what the backend stored fails the run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                DualChannelValidator (validator)             │
//! ├──────────────────┬──────────────────┬───────────────────────┤
//! │  fixtures        │  api::ApiClient  │  interface::Interface │
//! │   RunSuffix      │   register       │   PlaywrightDriver    │
//! │   login email    │   authenticate   │    (node bridge,      │
//! │   category names │   list_categories│     JSON over stdio)  │
//! ├──────────────────┴──────────────────┴───────────────────────┤
//! │  sink::FixtureSink (locked JSON array)   wait::poll_until   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod interface;
pub mod playwright;
pub mod sink;
pub mod validator;
pub mod wait;

pub use api::{ApiClient, CategoryOrdering, CategoryRecord, Credential};
pub use config::WorkflowConfig;
pub use error::{AuthFailure, E2eError, E2eResult};
pub use fixtures::{AccountFixture, CategoryPair, RunSuffix};
pub use interface::{Interface, NewCategory};
pub use validator::{DualChannelValidator, WorkflowReport, WorkflowStep};
