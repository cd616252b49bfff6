use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{AuthenticatedIdentity, AUTH_USER_KEY};
use crate::error::StoreError;
use crate::traits::{ContactStore, PasswordHasher, SessionStorage};
use crate::types::ContactId;

/// Default password hashing: hex-encoded blake3 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3PasswordHasher;

impl PasswordHasher for Blake3PasswordHasher {
    fn hash(&self, password: &str) -> String {
        blake3::hash(password.as_bytes()).to_hex().to_string()
    }
}

/// The caller as seen by every application instance of one request.
///
/// Built once through the common `auth_user` factory and re-initialized
/// from the session after every successful authentication.
pub struct CurrentUser {
    identity: RwLock<Option<AuthenticatedIdentity>>,
    locale: RwLock<String>,
    hasher: Arc<dyn PasswordHasher>,
    contacts: Arc<dyn ContactStore>,
}

impl CurrentUser {
    pub fn new(
        default_locale: impl Into<String>,
        hasher: Arc<dyn PasswordHasher>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        Self {
            identity: RwLock::new(None),
            locale: RwLock::new(default_locale.into()),
            hasher,
            contacts,
        }
    }

    /// Reload the identity from the session.
    ///
    /// A contact that carries its own locale overrides the current one.
    pub fn init(&self, session: &dyn SessionStorage) {
        let identity = session
            .read(AUTH_USER_KEY)
            .and_then(|value| serde_json::from_value::<AuthenticatedIdentity>(value).ok());

        if let Some(identity) = &identity {
            match self.contacts.by_id(identity.id) {
                Ok(Some(record)) => {
                    if let Some(locale) = record.locale.filter(|l| !l.is_empty()) {
                        *self.locale.write() = locale;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(contact = identity.id, error = %err, "Failed to load contact locale"),
            }
            debug!(contact = identity.id, login = %identity.login, "User initialized from session");
        }

        *self.identity.write() = identity;
    }

    /// Whether an identity has been loaded from the session.
    pub fn has_identity(&self) -> bool {
        self.identity.read().is_some()
    }

    pub fn identity(&self) -> Option<AuthenticatedIdentity> {
        self.identity.read().clone()
    }

    pub fn id(&self) -> Option<ContactId> {
        self.identity.read().as_ref().map(|i| i.id)
    }

    pub fn locale(&self) -> String {
        self.locale.read().clone()
    }

    pub fn set_locale(&self, locale: &str) {
        *self.locale.write() = locale.to_string();
    }

    /// Hash a password with this user's hashing strategy.
    pub fn password_hash(&self, password: &str) -> String {
        self.hasher.hash(password)
    }

    /// Record the current time as the user's last activity.
    pub fn update_last_time(&self) -> Result<(), StoreError> {
        match self.id() {
            Some(id) => self.contacts.touch_last_active(id),
            None => Ok(()),
        }
    }

    /// Forget the loaded identity.
    pub fn clear(&self) {
        *self.identity.write() = None;
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("identity", &*self.identity.read())
            .field("locale", &*self.locale.read())
            .finish()
    }
}
