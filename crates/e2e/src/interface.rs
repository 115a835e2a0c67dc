//! What the workflow needs from the rendered application
//!
//! [`Interface`] is the seam between the validator and whatever drives the
//! browser. Implementations must wait for each element to be ready before
//! touching it and report a missed wait as [`E2eError::UiTimeout`].
//!
//! [`E2eError::UiTimeout`]: crate::error::E2eError::UiTimeout

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// A category to create; `parent` makes it a subcategory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub parent: Option<String>,
}

impl NewCategory {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
        }
    }

    pub fn child(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    pub fn is_subcategory(&self) -> bool {
        self.parent.is_some()
    }
}

#[async_trait]
pub trait Interface: Send {
    /// Open the login page
    async fn navigate_to_login(&mut self) -> E2eResult<()>;

    /// Header, both fields and the submit control are visible and the
    /// location is the login location
    async fn login_page_ready(&mut self) -> E2eResult<bool>;

    async fn submit_login(&mut self, email: &str, password: &str) -> E2eResult<()>;

    /// The post-login navigation link shows up and the location is the
    /// dashboard. Not showing up in time is `false`, not an error.
    async fn is_authenticated_landing_visible(&mut self) -> E2eResult<bool>;

    /// Follow the post-login link to the category list
    async fn open_categories(&mut self) -> E2eResult<()>;

    async fn create_category(&mut self, category: &NewCategory) -> E2eResult<()>;

    /// Jump to the last page of the list and check for `name`. One look,
    /// no waiting; callers poll.
    async fn is_category_visible_in_list(&mut self, name: &str) -> E2eResult<bool>;

    async fn current_location(&mut self) -> E2eResult<String>;

    /// Best-effort capture for failure reports
    async fn screenshot(&mut self, _name: &str) -> E2eResult<Option<std::path::PathBuf>> {
        Ok(None)
    }

    async fn close(&mut self) -> E2eResult<()>;
}

/// CSS selectors for the club administration app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login_header: String,
    pub email_input: String,
    pub password_input: String,
    pub login_submit: String,
    /// Only rendered once logged in
    pub category_nav_link: String,
    pub add_category_button: String,
    pub category_name_input: String,
    pub subcategory_toggle: String,
    pub subcategory_toggle_text: String,
    pub parent_autocomplete_input: String,
    pub parent_option_label: String,
    pub confirm_button: String,
    pub page_link: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            login_header: "h3".to_string(),
            email_input: r#"input[formcontrolname="email"]"#.to_string(),
            password_input: r#"input[formcontrolname="password"]"#.to_string(),
            login_submit: r#"button[type="submit"]"#.to_string(),
            category_nav_link: r##"a.nav-link[href="#/category-type"]"##.to_string(),
            add_category_button: "button.btn.btn-primary".to_string(),
            category_name_input: r#"[formcontrolname="name"]"#.to_string(),
            subcategory_toggle: "span.text-muted".to_string(),
            subcategory_toggle_text: "Es subcategoria?".to_string(),
            parent_autocomplete_input: r#"input[aria-autocomplete="list"]"#.to_string(),
            parent_option_label: "span.ng-option-label".to_string(),
            confirm_button: "button.btn.btn-primary.my-3".to_string(),
            page_link: "a.page-link".to_string(),
        }
    }
}
