//! Authentication: password logins, remember-me tokens and session binding.

mod provider;
mod session;
mod token;
mod user;

pub use provider::AuthProvider;
pub use session::MemorySession;
pub use token::{derive_token, token_contact_id, TOKEN_AFFIX_LEN};
pub use user::{Blake3PasswordHasher, CurrentUser};

pub use crate::traits::{PasswordHasher, SessionStorage};

use serde::{Deserialize, Serialize};

use crate::types::ContactId;

/// Session key holding the [`AuthenticatedIdentity`].
pub const AUTH_USER_KEY: &str = "auth_user";

/// Cookie carrying the remember-me token.
pub const TOKEN_COOKIE: &str = "auth_token";

/// Marker cookie set when the user asked to be remembered.
pub const REMEMBER_COOKIE: &str = "remember";

/// POST field identifying a submitted login form.
pub const LOGIN_FORM_FIELD: &str = "wa_auth_login";

/// Minimal outcome of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub id: ContactId,
    pub login: String,
    pub is_user: bool,
}

/// Contact row as returned by the contact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: ContactId,
    pub login: String,
    /// Stored password hash
    pub password: String,
    pub is_user: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

impl ContactRecord {
    pub fn identity(&self) -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            id: self.id,
            login: self.login.clone(),
            is_user: self.is_user,
        }
    }
}

/// Explicit parameters for [`AuthProvider::auth`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    /// Trusted re-authentication of a known contact
    pub id: Option<ContactId>,
    pub login: Option<String>,
    pub password: Option<String>,
}

impl AuthParams {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by_id(id: ContactId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn credentials(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }
}
