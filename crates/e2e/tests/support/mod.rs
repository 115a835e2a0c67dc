//! Shared fixtures for integration tests: an in-process backend speaking the
//! club administration API, and a fake interface that creates categories in
//! that same backend.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use category_e2e::config::WorkflowConfig;
use category_e2e::error::{E2eError, E2eResult};
use category_e2e::interface::{Interface, NewCategory};

pub const UI_BASE: &str = "http://ui.test";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginMode {
    #[default]
    Normal,
    /// 200 with a body that has no token
    NoToken,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub email: String,
    pub password: String,
    pub user_name: String,
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub accounts: Vec<Account>,
    pub categories: Vec<Value>,
    pub next_id: i64,
    pub register_status: Option<u16>,
    pub list_status: Option<u16>,
    pub login_mode: LoginMode,
    /// Serve the listing newest-first instead of oldest-first
    pub newest_first: bool,
    pub last_register_body: Option<Value>,
    pub last_login_body: Option<Value>,
    pub list_requests: usize,
}

impl BackendState {
    pub fn add_category(&mut self, name: &str, parent: Option<&str>) {
        self.next_id += 1;
        let parent = parent.map(|p| json!({ "name": p }));
        self.categories.push(json!({
            "id": self.next_id,
            "name": name,
            "root": parent.is_none(),
            "parent": parent,
        }));
    }

    fn token_for(&self, account: &Account) -> String {
        format!("token-{}", account.user_name)
    }
}

pub type Shared = Arc<Mutex<BackendState>>;

pub struct MockBackend {
    pub url: String,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Shared::default();

        let app = Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/category-type", get(list_categories))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    /// Workflow config pointed at this backend, with short waits
    pub fn config(&self, dir: &Path) -> WorkflowConfig {
        let mut config = WorkflowConfig {
            api_base_url: self.url.clone(),
            ui_base_url: UI_BASE.to_string(),
            fixture_path: dir.join("userdata/user_info.json"),
            output_dir: dir.join("test-results"),
            ..Default::default()
        };
        config.timeouts.visibility_ms = 1000;
        config.timeouts.api_consistency_ms = 300;
        config.timeouts.poll_interval_ms = 10;
        config.timeouts.request_ms = 5000;
        config.browser.screenshot_on_failure = false;
        config.validate().unwrap()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn register(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut st = state.lock();
    st.last_register_body = Some(body.clone());

    if let Some(code) = st.register_status {
        return (status(code), Json(json!({ "message": "registration refused" }))).into_response();
    }

    let email = body["email"].as_str().unwrap_or_default().to_string();
    let user_name = email.split('@').next().unwrap_or_default().to_string();
    st.accounts.push(Account {
        email: email.clone(),
        password: body["password"].as_str().unwrap_or_default().to_string(),
        user_name: user_name.clone(),
    });

    let id = format!("user-{}", st.accounts.len());
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "email": email,
            "userName": user_name,
            "roles": body["roles"],
        })),
    )
        .into_response()
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut st = state.lock();
    st.last_login_body = Some(body.clone());

    let account = st
        .accounts
        .iter()
        .find(|a| {
            body["email"] == a.email.as_str()
                && body["password"] == a.password.as_str()
                && body["userName"] == a.user_name.as_str()
        })
        .cloned();

    match (account, st.login_mode) {
        (None, _) => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "bad credentials" }))).into_response(),
        (Some(_), LoginMode::NoToken) => (StatusCode::OK, Json(json!({ "message": "ok" }))).into_response(),
        (Some(a), LoginMode::Normal) => {
            (StatusCode::OK, Json(json!({ "token": st.token_for(&a), "email": a.email }))).into_response()
        }
    }
}

async fn list_categories(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock();
    st.list_requests += 1;

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let known = bearer.map_or(false, |t| st.accounts.iter().any(|a| st.token_for(a) == t));
    if !known {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(code) = st.list_status {
        return status(code).into_response();
    }

    let mut categories = st.categories.clone();
    if st.newest_first {
        categories.reverse();
    }
    Json(Value::Array(categories)).into_response()
}

/// In-memory stand-in for the rendered application.
///
/// Created categories land in the shared backend unless listed in
/// `unsaved`; the rendered list lags `render_lag` checks behind.
pub struct FakeUi {
    backend: Shared,
    location: String,
    logged_in: bool,
    rendered: Vec<String>,
    lag: HashMap<String, usize>,
    pub render_lag: usize,
    pub unsaved: HashSet<String>,
    pub accept_any_password: bool,
    pub broken_login_page: bool,
    pub actions: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl FakeUi {
    pub fn new(backend: &MockBackend) -> Self {
        Self {
            backend: backend.state.clone(),
            location: "about:blank".to_string(),
            logged_in: false,
            rendered: Vec::new(),
            lag: HashMap::new(),
            render_lag: 0,
            unsaved: HashSet::new(),
            accept_any_password: false,
            broken_login_page: false,
            actions: Arc::default(),
            closed: Arc::default(),
        }
    }

    fn login_url() -> String {
        format!("{}/#/auth/login", UI_BASE)
    }

    fn dashboard_url() -> String {
        format!("{}/#/dashboard", UI_BASE)
    }

    fn act(&self, action: impl Into<String>) {
        self.actions.lock().push(action.into());
    }

    fn never_ready(target: &str) -> E2eError {
        E2eError::UiTimeout {
            target: target.to_string(),
            timeout_ms: 10,
        }
    }
}

#[async_trait]
impl Interface for FakeUi {
    async fn navigate_to_login(&mut self) -> E2eResult<()> {
        self.act("navigate:login");
        self.location = Self::login_url();
        self.logged_in = false;
        Ok(())
    }

    async fn login_page_ready(&mut self) -> E2eResult<bool> {
        Ok(!self.broken_login_page && self.location == Self::login_url())
    }

    async fn submit_login(&mut self, email: &str, password: &str) -> E2eResult<()> {
        self.act(format!("login:{}", email));
        let valid = self
            .backend
            .lock()
            .accounts
            .iter()
            .any(|a| a.email == email && (self.accept_any_password || a.password == password));
        if valid {
            self.logged_in = true;
            self.location = Self::dashboard_url();
        }
        Ok(())
    }

    async fn is_authenticated_landing_visible(&mut self) -> E2eResult<bool> {
        Ok(self.logged_in && self.location == Self::dashboard_url())
    }

    async fn open_categories(&mut self) -> E2eResult<()> {
        if !self.logged_in {
            return Err(Self::never_ready("a.nav-link"));
        }
        self.act("open:categories");
        self.location = format!("{}/#/category-type", UI_BASE);
        Ok(())
    }

    async fn create_category(&mut self, category: &NewCategory) -> E2eResult<()> {
        if !self.logged_in {
            return Err(Self::never_ready("button.btn.btn-primary"));
        }
        if let Some(parent) = &category.parent {
            // The autocomplete only offers categories that exist
            if !self.rendered.contains(parent) {
                return Err(Self::never_ready(&format!("span.ng-option-label with text '{}'", parent)));
            }
        }

        self.act(format!("create:{}", category.name));
        if !self.unsaved.contains(&category.name) {
            self.backend
                .lock()
                .add_category(&category.name, category.parent.as_deref());
        }
        self.rendered.push(category.name.clone());
        self.lag.insert(category.name.clone(), self.render_lag);
        Ok(())
    }

    async fn is_category_visible_in_list(&mut self, name: &str) -> E2eResult<bool> {
        match self.lag.get_mut(name) {
            Some(0) => Ok(true),
            Some(remaining) => {
                *remaining -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn current_location(&mut self) -> E2eResult<String> {
        Ok(self.location.clone())
    }

    async fn close(&mut self) -> E2eResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}
