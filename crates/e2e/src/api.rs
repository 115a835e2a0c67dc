//! Backend API client: register, login, list categories
//!
//! A thin reqwest wrapper. Every call surfaces failure immediately; there is
//! no caching and no retry.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{AuthFailure, E2eError, E2eResult};

pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const CATEGORIES_PATH: &str = "/api/category-type";

/// Account as returned by the register endpoint.
///
/// Unknown fields are kept so the fixture sink stores the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bearer credential for API reads
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    /// Login email the token was issued for
    pub subject: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

/// A category or subcategory as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCategory")]
pub struct CategoryRecord {
    pub id: Option<i64>,
    pub name: String,
    pub parent_name: Option<String>,
}

// `id` and `parent` come in whatever shape the backend uses; only integer
// ids and `{ "name": "..." }` parents carry meaning here.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCategory {
    #[serde(default)]
    id: Option<Value>,
    name: String,
    #[serde(default)]
    parent_name: Option<String>,
    #[serde(default)]
    parent_category_name: Option<String>,
    #[serde(default)]
    parent: Option<Value>,
}

impl From<RawCategory> for CategoryRecord {
    fn from(raw: RawCategory) -> Self {
        let nested = raw
            .parent
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let parent_name = raw.parent_name.or(raw.parent_category_name).or(nested);
        Self {
            id: raw.id.as_ref().and_then(Value::as_i64),
            name: raw.name,
            parent_name,
        }
    }
}

/// How to decide which listed record is the most recent one.
///
/// The backend does not document its listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOrdering {
    /// Trust position: the last element is the newest
    Positional,
    /// Highest `id` is the newest; positional when any record lacks one
    #[default]
    SequenceId,
}

/// Pick the most recently created record.
pub fn latest_category(records: &[CategoryRecord], ordering: CategoryOrdering) -> E2eResult<&CategoryRecord> {
    let last = records.last().ok_or(E2eError::EmptyResult)?;

    match ordering {
        CategoryOrdering::Positional => Ok(last),
        CategoryOrdering::SequenceId => {
            if records.iter().all(|r| r.id.is_some()) {
                Ok(records.iter().max_by_key(|r| r.id).unwrap_or(last))
            } else {
                debug!("Some categories carry no id, using positional order");
                Ok(last)
            }
        }
    }
}

/// Client for the club administration backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register a new account
    pub async fn register(&self, email: &str, password: &str, roles: &[String]) -> E2eResult<AccountInfo> {
        debug!("POST {} for {}", REGISTER_PATH, email);

        let resp = self
            .http
            .post(self.url(REGISTER_PATH))
            .header("accept", "*/*")
            .json(&json!({
                "email": email,
                "password": password,
                "roles": roles,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(E2eError::Registration {
                status: status.as_u16(),
                body,
            });
        }

        let info: AccountInfo = serde_json::from_str(&body)?;
        info!("Registered account {}", info.user_name);
        Ok(info)
    }

    /// Log in and obtain a bearer credential
    pub async fn authenticate(&self, email: &str, password: &str, user_name: &str) -> E2eResult<Credential> {
        debug!("POST {} for {}", LOGIN_PATH, email);

        let resp = self
            .http
            .post(self.url(LOGIN_PATH))
            .header("accept", "*/*")
            .json(&json!({
                "email": email,
                "password": password,
                "userName": user_name,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(E2eError::Authentication(AuthFailure::Rejected {
                status: status.as_u16(),
            }));
        }

        // A 2xx without a usable token is its own failure, not a decode error
        let body = resp.text().await?;
        let token = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("token").and_then(Value::as_str).map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or(E2eError::Authentication(AuthFailure::MissingToken))?;

        Ok(Credential {
            token,
            subject: email.to_string(),
        })
    }

    /// List every category visible to the credential, in backend order
    pub async fn list_categories(&self, credential: &Credential) -> E2eResult<Vec<CategoryRecord>> {
        let resp = self
            .http
            .get(self.url(CATEGORIES_PATH))
            .header("accept", "*/*")
            .bearer_auth(&credential.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(E2eError::Retrieval {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        let records: Vec<CategoryRecord> = serde_json::from_str(&body)?;
        debug!("Listed {} categories", records.len());
        Ok(records)
    }
}
