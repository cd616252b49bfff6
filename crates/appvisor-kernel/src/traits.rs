//! Collaborator seams.
//!
//! The kernel drives these but never implements their business side. Every
//! trait is object-safe; the kernel stores them as `Arc<dyn _>`.

use std::collections::HashMap;
use std::time::SystemTime;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::auth::{AuthenticatedIdentity, ContactRecord};
use crate::context::Context;
use crate::dispatch::CliArgs;
use crate::error::{KernelResult, StoreError};
use crate::http::Route;
use crate::types::{AppId, ContactId};

/// Data access to contact records.
pub trait ContactStore: Send + Sync {
    fn by_id(&self, id: ContactId) -> Result<Option<ContactRecord>, StoreError>;

    fn by_login(&self, login: &str) -> Result<Option<ContactRecord>, StoreError>;

    /// Lookup by primary email address.
    fn by_email(&self, email: &str) -> Result<Option<ContactRecord>, StoreError>;

    /// Record "now" as the contact's last activity.
    fn touch_last_active(&self, id: ContactId) -> Result<(), StoreError>;
}

/// Per-application key/value settings.
pub trait SettingsStore: Send + Sync {
    fn get(&self, app: &str, name: &str) -> Option<String>;
}

/// Authorization decisions.
pub trait RightsModel: Send + Sync {
    fn has_backend_rights(&self, identity: Option<&AuthenticatedIdentity>, app: &str) -> bool;
}

/// Frontend routing table.
pub trait RoutingTable: Send + Sync {
    fn match_route(&self, path: &str) -> Option<Route>;
}

/// Translation catalogs by locale and domain.
pub trait LocaleSource: Send + Sync {
    fn load(&self, locale: &str, domain: &str) -> Option<HashMap<String, String>>;
}

/// The installed-applications manifest and per-application metadata.
pub trait ManifestSource: Send + Sync {
    /// Modification marker of the manifest itself. Fails with
    /// [`KernelError::Manifest`](crate::KernelError::Manifest) when the
    /// manifest is missing.
    fn modified(&self) -> KernelResult<SystemTime>;

    /// Application id -> enabled flag, in manifest order.
    fn enabled_apps(&self) -> KernelResult<IndexMap<AppId, bool>>;

    /// Static metadata of one application, `None` when it ships none.
    fn app_config(&self, app: &AppId) -> KernelResult<Option<Map<String, Value>>>;

    /// Build number recorded for the application, if any.
    fn build(&self, app: &AppId) -> KernelResult<Option<u64>>;
}

/// Password hashing strategy of the user record.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;
}

/// Key/value session storage.
pub trait SessionStorage: Send + Sync {
    fn read(&self, key: &str) -> Option<Value>;

    fn write(&self, key: &str, value: Value);

    fn remove(&self, key: &str);

    /// Drop every key.
    fn destroy(&self);
}

/// Per-application request handler.
pub trait FrontController: Send + Sync {
    /// Handle the current request, optionally with an already-matched route.
    fn dispatch(&self, ctx: &mut Context, route: Option<&Route>) -> KernelResult<()>;

    /// Run one module/action pair directly.
    fn execute(&self, ctx: &mut Context, module: &str, action: Option<&str>) -> KernelResult<()>;
}

pub trait SitemapGenerator: Send + Sync {
    fn generate(&self, ctx: &mut Context) -> KernelResult<()>;
}

/// Application-level event handler.
///
/// `params` is shared by every handler of one publication; mutations are
/// visible to the handlers that run afterwards.
pub trait EventHandler: Send + Sync {
    fn execute(&self, ctx: &mut Context, params: &mut Value) -> KernelResult<Option<Value>>;
}

/// A plugin of an application; `method` is the name bound in its
/// registration.
pub trait Plugin: Send + Sync {
    fn call(&self, method: &str, ctx: &mut Context, params: &mut Value) -> KernelResult<Option<Value>>;
}

/// A command runnable from the CLI entry point.
pub trait CliCommand: Send + Sync {
    fn run(&self, ctx: &mut Context, args: &CliArgs) -> KernelResult<()>;
}
