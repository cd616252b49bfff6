//! Configuration for the Appvisor kernel
//!
//! Two layers exist: [`KernelConfig`] is process-wide and loaded once, while
//! [`InstanceConfig`] belongs to a single application instance and is owned by
//! that instance for its whole lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KernelError, KernelResult};
use crate::types::{AppId, Environment, BOOTSTRAP_APP};

/// Process-wide kernel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Debug mode: foreign errors are rendered in full and the manifest
    /// cache is always rebuilt
    #[serde(default)]
    pub debug: bool,

    /// Locale used until an authenticated user supplies one
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Public root URL of the installation
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Backend path segment below the root URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Installation root on disk
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Directory holding derived caches
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Source manifest listing installed applications
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Authentication options
    #[serde(default)]
    pub auth: AuthOptions,

    /// Common factory overrides (factory name -> implementation).
    ///
    /// Without a `storage` override all contexts share one in-memory session.
    #[serde(default)]
    pub factories: BTreeMap<String, FactorySpec>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_locale: default_locale(),
            root_url: default_root_url(),
            backend_url: default_backend_url(),
            root_path: default_root_path(),
            cache_path: default_cache_path(),
            manifest_path: default_manifest_path(),
            auth: AuthOptions::default(),
            factories: BTreeMap::new(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from defaults, an optional file and `APPVISOR__*`
    /// environment variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> KernelResult<Self> {
        let defaults = ::config::Config::try_from(&KernelConfig::default())
            .map_err(|e| KernelError::Config(e.to_string()))?;
        let mut builder = ::config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("APPVISOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| KernelError::Config(e.to_string()))
    }

    /// URL of the backend root, used as the redirect target of every
    /// authorization gate.
    pub fn backend_root(&self) -> String {
        let root = self.root_url.trim_end_matches('/');
        format!("{}/{}/", root, self.backend_url.trim_matches('/'))
    }
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_root_url() -> String {
    "/".to_string()
}

fn default_backend_url() -> String {
    BOOTSTRAP_APP.to_string()
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("config/apps.json")
}

/// Which contact field a password login is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginField {
    #[default]
    Login,
    Email,
}

/// Authentication provider options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    /// Lifetime of the remember-me token cookie, in seconds
    pub cookie_expire: u64,

    /// Only contacts flagged as users may authenticate
    pub is_user: bool,

    /// Field matched by password logins
    pub login: LoginField,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            cookie_expire: 2_592_000,
            is_user: true,
            login: LoginField::Login,
        }
    }
}

/// Declarative factory override: either a bare implementation name or an
/// `[implementation, options]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorySpec {
    Name(String),
    WithOptions(String, Value),
}

impl FactorySpec {
    pub fn implementation(&self) -> &str {
        match self {
            FactorySpec::Name(name) | FactorySpec::WithOptions(name, _) => name,
        }
    }

    pub fn options(&self) -> Option<&Value> {
        match self {
            FactorySpec::Name(_) => None,
            FactorySpec::WithOptions(_, options) => Some(options),
        }
    }
}

/// Whether an instance config describes the system bootstrap context or a
/// concrete application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigKind {
    System,
    Application(AppId),
}

/// Configuration owned by one application instance.
#[derive(Debug)]
pub struct InstanceConfig {
    kind: ConfigKind,
    environment: Environment,
    root_path: PathBuf,
    domain: String,
    prefix: String,
    locale: RwLock<String>,
    factories: BTreeMap<String, FactorySpec>,
}

impl InstanceConfig {
    /// Config of the system bootstrap context.
    pub fn system(environment: Environment, root_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ConfigKind::System,
            environment,
            root_path: root_path.into(),
            domain: String::new(),
            prefix: BOOTSTRAP_APP.to_string(),
            locale: RwLock::new(String::new()),
            factories: BTreeMap::new(),
        }
    }

    /// Config of a concrete application.
    pub fn application(
        app_id: impl Into<AppId>,
        environment: Environment,
        root_path: impl Into<PathBuf>,
    ) -> Self {
        let app_id = app_id.into();
        Self {
            prefix: app_id.to_string(),
            kind: ConfigKind::Application(app_id),
            environment,
            root_path: root_path.into(),
            domain: String::new(),
            locale: RwLock::new(String::new()),
            factories: BTreeMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_locale(self, locale: impl Into<String>) -> Self {
        *self.locale.write() = locale.into();
        self
    }

    pub fn with_factory(mut self, name: impl Into<String>, spec: FactorySpec) -> Self {
        self.factories.insert(name.into(), spec);
        self
    }

    pub fn kind(&self) -> &ConfigKind {
        &self.kind
    }

    pub fn is_application(&self) -> bool {
        matches!(self.kind, ConfigKind::Application(_))
    }

    /// The application id, if this is an application config.
    pub fn app_id(&self) -> Option<&AppId> {
        match &self.kind {
            ConfigKind::Application(id) => Some(id),
            ConfigKind::System => None,
        }
    }

    /// The application this config speaks for; the system context speaks
    /// for the bootstrap application.
    pub fn application_name(&self) -> &str {
        match &self.kind {
            ConfigKind::Application(id) => id.as_str(),
            ConfigKind::System => BOOTSTRAP_APP,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn locale(&self) -> String {
        self.locale.read().clone()
    }

    pub fn set_locale(&self, locale: &str) {
        *self.locale.write() = locale.to_string();
    }

    pub fn factory(&self, name: &str) -> Option<&FactorySpec> {
        self.factories.get(name)
    }

    pub fn factories(&self) -> &BTreeMap<String, FactorySpec> {
        &self.factories
    }
}
