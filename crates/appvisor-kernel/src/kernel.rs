//! The Appvisor kernel: immutable, shareable process state.
//!
//! A [`Kernel`] is built once per process from a [`KernelConfig`], a set of
//! [`Collaborators`] and the registered [`Application`]s. It is cheap to
//! clone and never mutated after [`KernelBuilder::build`]; all per-request
//! state lives in a [`Context`].

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::application::Application;
use crate::auth::{AuthProvider, CurrentUser, MemorySession};
use crate::config::{InstanceConfig, KernelConfig};
use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::factory::{shared, FactoryArgs, FactoryCatalog, SharedObject};
use crate::http::Request;
use crate::manifest::{AppCatalog, ManifestCache};
use crate::traits::{
    ContactStore, FrontController, LocaleSource, ManifestSource, PasswordHasher, RightsModel,
    RoutingTable, SessionStorage, SettingsStore,
};
use crate::types::{AppId, Environment, BOOTSTRAP_APP};

/// Per-instance authentication provider.
pub const AUTH_FACTORY: &str = "auth";
/// Common session storage.
pub const STORAGE_FACTORY: &str = "storage";
/// Common current-user object.
pub const USER_FACTORY: &str = "auth_user";
/// Per-instance front controller.
pub const FRONT_CONTROLLER_FACTORY: &str = "front_controller";

pub const DEFAULT_AUTH_IMPL: &str = "auth";
pub const DEFAULT_STORAGE_IMPL: &str = "memory_session";
pub const DEFAULT_USER_IMPL: &str = "auth_user";

/// Implementation name of an application's own front controller.
pub fn front_controller_impl(app: &str) -> String {
    format!("{app}.{FRONT_CONTROLLER_FACTORY}")
}

/// External data-access and policy collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub contacts: Arc<dyn ContactStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub rights: Arc<dyn RightsModel>,
    pub routing: Arc<dyn RoutingTable>,
    pub locales: Arc<dyn LocaleSource>,
    pub manifest: Arc<dyn ManifestSource>,
    pub hasher: Arc<dyn PasswordHasher>,
}

/// Shared kernel handle
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    config: KernelConfig,
    applications: IndexMap<AppId, Arc<Application>>,
    factories: FactoryCatalog,
    collaborators: Collaborators,
    manifest_cache: ManifestCache,
}

impl Kernel {
    pub fn builder(config: KernelConfig, collaborators: Collaborators) -> KernelBuilder {
        KernelBuilder::new(config, collaborators)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn application(&self, id: &str) -> Option<&Arc<Application>> {
        self.inner.applications.get(id)
    }

    /// Registered applications in registration order.
    pub fn applications(&self) -> impl Iterator<Item = &Arc<Application>> {
        self.inner.applications.values()
    }

    pub fn factories(&self) -> &FactoryCatalog {
        &self.inner.factories
    }

    pub fn contacts(&self) -> &Arc<dyn ContactStore> {
        &self.inner.collaborators.contacts
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.inner.collaborators.settings
    }

    pub fn rights(&self) -> &Arc<dyn RightsModel> {
        &self.inner.collaborators.rights
    }

    pub fn routing(&self) -> &Arc<dyn RoutingTable> {
        &self.inner.collaborators.routing
    }

    pub fn locales(&self) -> &Arc<dyn LocaleSource> {
        &self.inner.collaborators.locales
    }

    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.inner.collaborators.hasher
    }

    /// Installed-applications catalog for `locale`.
    pub fn catalog(&self, locale: &str) -> KernelResult<AppCatalog> {
        self.inner.manifest_cache.load(
            self.inner.collaborators.manifest.as_ref(),
            self.inner.collaborators.locales.as_ref(),
            locale,
        )
    }

    /// Config of the system bootstrap context rooted at the configured path.
    pub fn system_config(&self, environment: Environment) -> InstanceConfig {
        InstanceConfig::system(environment, self.inner.config.root_path.clone())
    }

    /// Config of a registered application.
    pub fn app_config(&self, id: &str, environment: Environment) -> KernelResult<InstanceConfig> {
        let application = self
            .application(id)
            .ok_or_else(|| KernelError::UnknownApplication(id.to_string()))?;
        Ok(
            InstanceConfig::application(id, environment, self.inner.config.root_path.clone())
                .with_prefix(application.prefix()),
        )
    }

    /// Open a request context whose entry instance is built from `config`.
    pub fn context(&self, config: InstanceConfig, request: Request) -> KernelResult<Context> {
        Context::new(self.clone(), config, request)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("applications", &self.inner.applications.keys().collect::<Vec<_>>())
            .field("factories", &self.inner.factories)
            .finish()
    }
}

/// Builder for [`Kernel`]
pub struct KernelBuilder {
    config: KernelConfig,
    collaborators: Collaborators,
    applications: IndexMap<AppId, Arc<Application>>,
    factories: FactoryCatalog,
    manifest_cache: Option<ManifestCache>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            applications: IndexMap::new(),
            factories: default_catalog(),
            manifest_cache: None,
        }
    }

    /// Register an application. Registering the same id twice replaces the
    /// earlier registration.
    pub fn register(mut self, application: Application) -> Self {
        self.applications
            .insert(application.id().clone(), Arc::new(application));
        self
    }

    /// Register (or replace) a factory implementation.
    pub fn factory<F>(mut self, implementation: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&FactoryArgs<'_>) -> KernelResult<SharedObject> + Send + Sync + 'static,
    {
        self.factories.register(implementation, builder);
        self
    }

    pub fn manifest_cache(mut self, cache: ManifestCache) -> Self {
        self.manifest_cache = Some(cache);
        self
    }

    pub fn build(self) -> KernelResult<Kernel> {
        tracing::info!("Building Appvisor kernel");

        if !self.applications.contains_key(BOOTSTRAP_APP) {
            return Err(KernelError::UnknownApplication(BOOTSTRAP_APP.to_string()));
        }

        // ═══════════════════════════════════════════════════════════════
        // FACTORIES
        // ═══════════════════════════════════════════════════════════════
        let mut factories = self.factories;
        for application in self.applications.values() {
            let implementation = front_controller_impl(application.id().as_str());
            let Some(factory) = application.front_controller().cloned() else {
                continue;
            };
            if factories.contains(&implementation) {
                continue;
            }
            factories.register(implementation, move |args| {
                let controller: Arc<dyn FrontController> = factory(args)?;
                Ok(shared(controller))
            });
        }

        for (name, spec) in &self.config.factories {
            if !factories.contains(spec.implementation()) {
                warn!(
                    factory = %name,
                    implementation = spec.implementation(),
                    "Common factory override names an unknown implementation"
                );
            }
        }

        // ═══════════════════════════════════════════════════════════════
        // MANIFEST CACHE
        // ═══════════════════════════════════════════════════════════════
        let manifest_cache = self.manifest_cache.unwrap_or_else(|| {
            ManifestCache::on_disk(
                self.config.root_path.join(&self.config.cache_path),
                self.config.debug,
            )
        });
        debug!(cache = ?manifest_cache.path(&self.config.default_locale), "Manifest cache configured");

        info!(
            applications = self.applications.len(),
            debug = self.config.debug,
            "Appvisor kernel ready"
        );

        Ok(Kernel {
            inner: Arc::new(KernelInner {
                config: self.config,
                applications: self.applications,
                factories,
                collaborators: self.collaborators,
                manifest_cache,
            }),
        })
    }
}

/// Built-in implementations.
fn default_catalog() -> FactoryCatalog {
    let mut catalog = FactoryCatalog::new();

    catalog.register(DEFAULT_AUTH_IMPL, |args| {
        AuthProvider::from_options(&args.kernel.config().auth, args.options).map(shared)
    });

    // One session per kernel: every context of a single-process setup sees
    // the same logged-in user. Multi-client hosts override `storage`.
    let session: Arc<dyn SessionStorage> = Arc::new(MemorySession::new());
    catalog.register(DEFAULT_STORAGE_IMPL, move |_| Ok(shared(session.clone())));

    catalog.register(DEFAULT_USER_IMPL, |args| {
        let locale = args
            .options
            .get("locale")
            .and_then(|v| v.as_str())
            .unwrap_or(args.kernel.config().default_locale.as_str())
            .to_string();
        Ok(shared(CurrentUser::new(
            locale,
            args.kernel.hasher().clone(),
            args.kernel.contacts().clone(),
        )))
    });

    catalog
}
