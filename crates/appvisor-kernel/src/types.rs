//! Identifier and environment types shared by every kernel module.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Id of the transient system instance that exists before any application
/// has been resolved.
pub const SYSTEM_ID: &str = "wa-system";

/// Id of the always-present bootstrap application (login, sitemaps, config
/// fallback).
pub const BOOTSTRAP_APP: &str = "webasyst";

/// Identifier of a contact record in the contact store.
pub type ContactId = u64;

/// Identifier of an installed application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_bootstrap(&self) -> bool {
        self.0 == BOOTSTRAP_APP
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ID
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AppId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for AppId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AppId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AppId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Which side of the site an instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Backend,
    Frontend,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Backend => f.write_str("backend"),
            Environment::Frontend => f.write_str("frontend"),
        }
    }
}
