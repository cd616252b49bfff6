//! Instance Registry - the table of application instances for one request
//!
//! At most one [`ApplicationInstance`] exists per application id. Instances
//! are created on first resolution and live as long as the registry. The
//! registry also tracks which instance is *current* and owns the common
//! factory cache for singletons that must not vary with the current instance
//! (the authenticated user, session storage).

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::auth::{CurrentUser, SessionStorage};
use crate::config::InstanceConfig;
use crate::error::{KernelError, KernelResult};
use crate::factory::{resolve_spec, FactoryArgs, FactoryCache};
use crate::instance::ApplicationInstance;
use crate::kernel::{Kernel, DEFAULT_STORAGE_IMPL, DEFAULT_USER_IMPL, STORAGE_FACTORY, USER_FACTORY};
use crate::types::{AppId, SYSTEM_ID};

/// Registry of application instances with a single current pointer
pub struct InstanceRegistry {
    kernel: Kernel,
    instances: IndexMap<AppId, Arc<ApplicationInstance>>,
    current: AppId,
    common: FactoryCache,
}

impl InstanceRegistry {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            instances: IndexMap::new(),
            current: AppId::from(SYSTEM_ID),
            common: FactoryCache::new(),
        }
    }

    /// Resolve an instance, constructing it on first use.
    ///
    /// Without `id` the application named by `config` is used, else the
    /// current one. A missing instance needs either `config` or a config
    /// derivable from the current instance; otherwise the call fails with
    /// [`KernelError::UnknownApplication`].
    ///
    /// The first resolution made while the system context is current becomes
    /// the new current instance; `set_current` forces the switch.
    pub fn resolve(
        &mut self,
        id: Option<&str>,
        config: Option<InstanceConfig>,
        set_current: bool,
    ) -> KernelResult<Arc<ApplicationInstance>> {
        let name = match id {
            Some(id) => AppId::from(id),
            None => config
                .as_ref()
                .and_then(|c| c.app_id().cloned())
                .unwrap_or_else(|| self.current.clone()),
        };

        if !self.instances.contains_key(&name) {
            let config = match config {
                Some(config) => config,
                None => self.derive_config(&name)?,
            };
            let instance = Arc::new(ApplicationInstance::new(name.clone(), config, &self.kernel));
            info!(
                app = %name,
                environment = %instance.environment(),
                degraded = instance.is_degraded(),
                "Application instance constructed"
            );
            self.instances.insert(name.clone(), instance);
        }

        if set_current {
            self.set_active(name.as_str());
        } else if self.current.is_system() {
            self.current = name.clone();
        }

        self.instances
            .get(&name)
            .cloned()
            .ok_or_else(|| KernelError::UnknownApplication(name.to_string()))
    }

    /// Make an existing instance current and sync its locale with the user's.
    ///
    /// Unknown ids are ignored.
    pub fn set_active(&mut self, id: &str) {
        let Some(instance) = self.instances.get(id).cloned() else {
            debug!(app = id, "Ignoring activation of unknown instance");
            return;
        };
        self.current = instance.id().clone();
        let locale = self.user_locale();
        instance.config().set_locale(&locale);
        debug!(app = id, locale = %locale, "Instance activated");
    }

    /// Build the config of a not-yet-seen application from the current
    /// instance's environment and root path.
    fn derive_config(&self, name: &AppId) -> KernelResult<InstanceConfig> {
        let unknown = || KernelError::UnknownApplication(name.to_string());
        let current = self.instances.get(&self.current).ok_or_else(unknown)?;
        let application = self.kernel.application(name.as_str()).ok_or_else(unknown)?;

        Ok(InstanceConfig::application(
            name.clone(),
            current.environment(),
            current.config().root_path(),
        )
        .with_prefix(application.prefix())
        .with_domain(current.config().domain())
        .with_locale(self.user_locale()))
    }

    fn user_locale(&self) -> String {
        self.user()
            .map(|user| user.locale())
            .unwrap_or_else(|_| self.kernel.config().default_locale.clone())
    }

    pub fn current_id(&self) -> &AppId {
        &self.current
    }

    pub fn current(&self) -> Option<Arc<ApplicationInstance>> {
        self.instances.get(&self.current).cloned()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ApplicationInstance>> {
        self.instances.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Instance ids in construction order.
    pub fn ids(&self) -> impl Iterator<Item = &AppId> {
        self.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Cross-instance singleton for `name`, overridable through the kernel
    /// config's `factories` table.
    pub fn common<T: Any + Send + Sync>(&self, name: &str, default_impl: &str) -> KernelResult<Arc<T>> {
        let spec = self.kernel.config().factories.get(name);
        let (implementation, options) = resolve_spec(spec, default_impl);
        let kernel = &self.kernel;
        let app_id = self.current.as_str();

        self.common.get_or_build(name, || {
            kernel.factories().build(
                &implementation,
                &FactoryArgs {
                    name,
                    app_id,
                    options: &options,
                    kernel,
                },
            )
        })
    }

    pub fn common_cache(&self) -> &FactoryCache {
        &self.common
    }

    /// The process-wide user object.
    pub fn user(&self) -> KernelResult<Arc<CurrentUser>> {
        self.common(USER_FACTORY, DEFAULT_USER_IMPL)
    }

    /// Session storage shared by every instance.
    pub fn storage(&self) -> KernelResult<Arc<dyn SessionStorage>> {
        let slot = self.common::<Arc<dyn SessionStorage>>(STORAGE_FACTORY, DEFAULT_STORAGE_IMPL)?;
        Ok(slot.as_ref().clone())
    }
}
