//! Lazily-built singletons keyed by factory name.
//!
//! A [`FactoryCatalog`] maps implementation names to constructors and is
//! populated when the kernel is built. A [`FactoryCache`] memoizes the first
//! value built for each factory name; instances own one cache each and the
//! registry owns the common, cross-instance one.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::FactorySpec;
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;

/// Type-erased factory product.
pub type SharedObject = Arc<dyn Any + Send + Sync>;

/// Constructor registered under an implementation name.
pub type FactoryFn = Arc<dyn Fn(&FactoryArgs<'_>) -> KernelResult<SharedObject> + Send + Sync>;

/// Wrap a value as a factory product.
pub fn shared<T: Any + Send + Sync>(value: T) -> SharedObject {
    Arc::new(value)
}

/// Everything a constructor may consult.
pub struct FactoryArgs<'a> {
    /// Factory name being built (`auth`, `storage`, ...)
    pub name: &'a str,
    /// Application the value is built for
    pub app_id: &'a str,
    /// Options from the override, or `Value::Null`
    pub options: &'a Value,
    pub kernel: &'a Kernel,
}

/// Implementation name -> constructor.
#[derive(Clone, Default)]
pub struct FactoryCatalog {
    builders: HashMap<String, FactoryFn>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an implementation.
    pub fn register<F>(&mut self, implementation: impl Into<String>, builder: F)
    where
        F: Fn(&FactoryArgs<'_>) -> KernelResult<SharedObject> + Send + Sync + 'static,
    {
        self.builders.insert(implementation.into(), Arc::new(builder));
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.builders.contains_key(implementation)
    }

    pub fn build(&self, implementation: &str, args: &FactoryArgs<'_>) -> KernelResult<SharedObject> {
        let builder = self
            .builders
            .get(implementation)
            .ok_or_else(|| KernelError::Factory {
                name: args.name.to_string(),
                reason: format!("unknown implementation \"{implementation}\""),
            })?;
        builder(args)
    }
}

impl fmt::Debug for FactoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.builders.keys().collect();
        names.sort();
        f.debug_struct("FactoryCatalog")
            .field("implementations", &names)
            .finish()
    }
}

/// Pick the implementation and options for a factory: the override wins,
/// otherwise the default implementation with no options.
pub(crate) fn resolve_spec(spec: Option<&FactorySpec>, default_impl: &str) -> (String, Value) {
    match spec {
        Some(spec) => (
            spec.implementation().to_string(),
            spec.options().cloned().unwrap_or(Value::Null),
        ),
        None => (default_impl.to_string(), Value::Null),
    }
}

/// Memoized factory products, built at most once per name.
#[derive(Default)]
pub struct FactoryCache {
    slots: RwLock<HashMap<String, SharedObject>>,
}

impl FactoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `name`, building it on first use.
    pub fn get_or_build<T, F>(&self, name: &str, build: F) -> KernelResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> KernelResult<SharedObject>,
    {
        let cached = self.slots.read().get(name).cloned();
        let object = match cached {
            Some(object) => object,
            None => {
                let built = build()?;
                // First writer wins if a constructor re-entered the cache.
                self.slots
                    .write()
                    .entry(name.to_string())
                    .or_insert(built)
                    .clone()
            }
        };
        downcast(name, object)
    }

    /// Seed a slot with a ready-made value, replacing any previous one.
    pub fn insert(&self, name: impl Into<String>, object: SharedObject) {
        self.slots.write().insert(name.into(), object);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl fmt::Debug for FactoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        let mut names: Vec<_> = slots.keys().collect();
        names.sort();
        f.debug_struct("FactoryCache").field("built", &names).finish()
    }
}

fn downcast<T: Any + Send + Sync>(name: &str, object: SharedObject) -> KernelResult<Arc<T>> {
    object.downcast::<T>().map_err(|_| KernelError::Factory {
        name: name.to_string(),
        reason: format!("built value is not a {}", type_name::<T>()),
    })
}
