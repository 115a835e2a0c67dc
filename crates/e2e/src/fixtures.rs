//! Fixture generation: collision-resistant login names and category labels
//!
//! A run draws one [`RunSuffix`] and reuses it for the login email and both
//! category names, so everything a run created can be traced back to it.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::api::AccountInfo;

const SUFFIX_LEN: usize = 5;
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short random base-36 tag. Not cryptographically unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunSuffix(String);

impl RunSuffix {
    /// Draw a fresh suffix from the thread RNG
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let tag = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(tag)
    }

    /// Use a known suffix (replaying a run, tests)
    pub fn fixed(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `base+suffix@domain`
pub fn unique_login_email(base: &str, domain: &str, suffix: &RunSuffix) -> String {
    format!("{}+{}@{}", base, suffix, domain)
}

/// `prefix suffix`, e.g. `Category ab3f9`
pub fn unique_name(prefix: &str, suffix: &RunSuffix) -> String {
    format!("{} {}", prefix, suffix)
}

/// Category and subcategory names sharing one suffix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPair {
    pub category: String,
    pub subcategory: String,
}

impl CategoryPair {
    pub fn new(suffix: &RunSuffix) -> Self {
        Self {
            category: unique_name("Category", suffix),
            subcategory: unique_name("Subcategory", suffix),
        }
    }
}

/// The account a run registers and logs in with.
///
/// Fields are private so the fixture cannot change once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFixture {
    login_email: String,
    password: String,
    user_name: String,
    roles: Vec<String>,
}

impl AccountFixture {
    /// Combine the generated credentials with what registration returned.
    ///
    /// The backend's `userName` wins; if it echoed no email we keep ours.
    pub fn from_registration(login_email: &str, password: &str, roles: &[String], info: &AccountInfo) -> Self {
        Self {
            login_email: info.email.clone().unwrap_or_else(|| login_email.to_string()),
            password: password.to_string(),
            user_name: info.user_name.clone(),
            roles: roles.to_vec(),
        }
    }

    pub fn login_email(&self) -> &str {
        &self.login_email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}
