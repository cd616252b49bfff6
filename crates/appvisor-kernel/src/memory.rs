//! In-memory collaborators for single-process setups such as the CLI.
//!
//! Nothing here persists; [`Collaborators::in_memory`] wires them together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::auth::{AuthenticatedIdentity, Blake3PasswordHasher, ContactRecord};
use crate::error::{KernelResult, StoreError};
use crate::http::Route;
use crate::kernel::Collaborators;
use crate::traits::{
    ContactStore, LocaleSource, ManifestSource, RightsModel, RoutingTable, SettingsStore,
};
use crate::types::{AppId, ContactId, BOOTSTRAP_APP};

pub use crate::auth::MemorySession;

/// Contact store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    records: RwLock<IndexMap<ContactId, ContactRecord>>,
    last_active: RwLock<HashMap<ContactId, DateTime<Utc>>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ContactRecord) {
        self.records.write().insert(record.id, record);
    }

    /// Replace the stored password hash of a contact.
    pub fn set_password(&self, id: ContactId, hash: impl Into<String>) {
        if let Some(record) = self.records.write().get_mut(&id) {
            record.password = hash.into();
        }
    }

    /// When the contact was last recorded as active.
    pub fn last_active(&self, id: ContactId) -> Option<DateTime<Utc>> {
        self.last_active.read().get(&id).copied()
    }

    fn find(&self, predicate: impl Fn(&ContactRecord) -> bool) -> Option<ContactRecord> {
        self.records.read().values().find(|r| predicate(r)).cloned()
    }
}

impl ContactStore for MemoryContactStore {
    fn by_id(&self, id: ContactId) -> Result<Option<ContactRecord>, StoreError> {
        Ok(self.find(|r| r.id == id))
    }

    fn by_login(&self, login: &str) -> Result<Option<ContactRecord>, StoreError> {
        Ok(self.find(|r| r.login == login))
    }

    fn by_email(&self, email: &str) -> Result<Option<ContactRecord>, StoreError> {
        Ok(self.find(|r| r.email.as_deref() == Some(email)))
    }

    fn touch_last_active(&self, id: ContactId) -> Result<(), StoreError> {
        if !self.records.read().contains_key(&id) {
            return Err(StoreError::NotFound(format!("contact {id}")));
        }
        self.last_active.write().insert(id, Utc::now());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, app: &str, name: &str, value: impl Into<String>) {
        self.values
            .write()
            .insert((app.to_string(), name.to_string()), value.into());
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, app: &str, name: &str) -> Option<String> {
        self.values
            .read()
            .get(&(app.to_string(), name.to_string()))
            .cloned()
    }
}

/// Rights granted per contact and application.
#[derive(Debug, Default)]
pub struct StaticRights {
    allow_all: bool,
    grants: HashSet<(ContactId, String)>,
}

impl StaticRights {
    /// Every authenticated contact may use every backend application.
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            grants: HashSet::new(),
        }
    }

    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn grant(mut self, contact: ContactId, app: &str) -> Self {
        self.grants.insert((contact, app.to_string()));
        self
    }
}

impl RightsModel for StaticRights {
    fn has_backend_rights(&self, identity: Option<&AuthenticatedIdentity>, app: &str) -> bool {
        match identity {
            Some(identity) => {
                self.allow_all || self.grants.contains(&(identity.id, app.to_string()))
            }
            None => false,
        }
    }
}

/// Routing table matching URL prefixes in insertion order.
#[derive(Debug, Default)]
pub struct PrefixRoutes {
    routes: Vec<(String, Route)>,
}

impl PrefixRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, prefix: impl Into<String>, route: Route) -> Self {
        self.routes.push((prefix.into(), route));
        self
    }
}

impl RoutingTable for PrefixRoutes {
    fn match_route(&self, path: &str) -> Option<Route> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, route)| route.clone())
    }
}

/// Translation catalogs held in memory.
#[derive(Debug, Default)]
pub struct MemoryLocales {
    catalogs: HashMap<(String, String), HashMap<String, String>>,
}

impl MemoryLocales {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locale: &str, domain: &str, msgid: &str, translation: &str) -> Self {
        self.catalogs
            .entry((locale.to_string(), domain.to_string()))
            .or_default()
            .insert(msgid.to_string(), translation.to_string());
        self
    }
}

impl LocaleSource for MemoryLocales {
    fn load(&self, locale: &str, domain: &str) -> Option<HashMap<String, String>> {
        self.catalogs
            .get(&(locale.to_string(), domain.to_string()))
            .cloned()
    }
}

/// Manifest defined in code.
#[derive(Debug, Clone)]
pub struct StaticManifest {
    apps: IndexMap<AppId, (bool, Option<Map<String, Value>>)>,
    builds: HashMap<AppId, u64>,
    modified: SystemTime,
}

impl Default for StaticManifest {
    fn default() -> Self {
        Self {
            apps: IndexMap::new(),
            builds: HashMap::new(),
            modified: SystemTime::UNIX_EPOCH,
        }
    }
}

impl StaticManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// An enabled application with the given metadata object.
    pub fn app(mut self, id: &str, metadata: Value) -> Self {
        self.apps.insert(AppId::from(id), (true, Some(object(metadata))));
        self
    }

    pub fn disabled(mut self, id: &str, metadata: Value) -> Self {
        self.apps.insert(AppId::from(id), (false, Some(object(metadata))));
        self
    }

    /// An enabled application that ships no metadata.
    pub fn bare(mut self, id: &str) -> Self {
        self.apps.insert(AppId::from(id), (true, None));
        self
    }

    pub fn build(mut self, id: &str, build: u64) -> Self {
        self.builds.insert(AppId::from(id), build);
        self
    }

    pub fn modified_at(mut self, modified: SystemTime) -> Self {
        self.modified = modified;
        self
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ManifestSource for StaticManifest {
    fn modified(&self) -> KernelResult<SystemTime> {
        Ok(self.modified)
    }

    fn enabled_apps(&self) -> KernelResult<IndexMap<AppId, bool>> {
        Ok(self
            .apps
            .iter()
            .map(|(id, (enabled, _))| (id.clone(), *enabled))
            .collect())
    }

    fn app_config(&self, app: &AppId) -> KernelResult<Option<Map<String, Value>>> {
        Ok(self.apps.get(app).and_then(|(_, config)| config.clone()))
    }

    fn build(&self, app: &AppId) -> KernelResult<Option<u64>> {
        Ok(self.builds.get(app).copied())
    }
}

impl Collaborators {
    /// Empty in-memory collaborators: no contacts, no settings, every
    /// authenticated contact has all rights, no frontend routes, and a
    /// manifest holding only the bootstrap application.
    pub fn in_memory() -> Self {
        Self {
            contacts: Arc::new(MemoryContactStore::new()),
            settings: Arc::new(MemorySettingsStore::new()),
            rights: Arc::new(StaticRights::allow_all()),
            routing: Arc::new(PrefixRoutes::new()),
            locales: Arc::new(MemoryLocales::new()),
            manifest: Arc::new(
                StaticManifest::new().app(BOOTSTRAP_APP, serde_json::json!({"name": "Webasyst"})),
            ),
            hasher: Arc::new(Blake3PasswordHasher),
        }
    }
}
