//! A running application bound to an environment and a configuration.

use std::any::Any;
use std::sync::Arc;

use tracing::warn;

use crate::config::InstanceConfig;
use crate::error::{KernelError, KernelResult};
use crate::factory::{resolve_spec, FactoryArgs, FactoryCache};
use crate::kernel::Kernel;
use crate::types::{AppId, Environment};

/// One application instance. Only the [`InstanceRegistry`](crate::InstanceRegistry)
/// constructs these; everything else holds `Arc` handles to them.
#[derive(Debug)]
pub struct ApplicationInstance {
    id: AppId,
    config: InstanceConfig,
    factories: FactoryCache,
    degraded: bool,
}

impl ApplicationInstance {
    pub(crate) fn new(id: AppId, config: InstanceConfig, kernel: &Kernel) -> Self {
        let mut instance = Self {
            id,
            config,
            factories: FactoryCache::new(),
            degraded: false,
        };

        if let Err(err) = instance.initialize(kernel) {
            warn!(
                app = %instance.id,
                error = %err,
                "Instance initialization failed, continuing without factory overrides"
            );
            instance.degraded = true;
        }

        instance
    }

    /// Check every per-instance factory override against the catalog.
    fn initialize(&self, kernel: &Kernel) -> KernelResult<()> {
        for (name, spec) in self.config.factories() {
            if !kernel.factories().contains(spec.implementation()) {
                return Err(KernelError::Factory {
                    name: name.clone(),
                    reason: format!("unknown implementation \"{}\"", spec.implementation()),
                });
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &AppId {
        &self.id
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.config.environment()
    }

    /// Initialization failed; per-instance factory overrides are ignored.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Per-instance singleton for `name`, built on first use.
    ///
    /// The implementation is taken from this instance's override, then the
    /// kernel-wide override, then `default_impl`.
    pub fn factory<T: Any + Send + Sync>(
        &self,
        kernel: &Kernel,
        name: &str,
        default_impl: &str,
    ) -> KernelResult<Arc<T>> {
        let own = if self.degraded {
            None
        } else {
            self.config.factory(name)
        };
        let spec = own.or_else(|| kernel.config().factories.get(name));
        let (implementation, options) = resolve_spec(spec, default_impl);

        self.factories.get_or_build(name, || {
            kernel.factories().build(
                &implementation,
                &FactoryArgs {
                    name,
                    app_id: self.id.as_str(),
                    options: &options,
                    kernel,
                },
            )
        })
    }

    pub fn factory_cache(&self) -> &FactoryCache {
        &self.factories
    }
}
