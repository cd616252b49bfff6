//! Application registrations.
//!
//! An [`Application`] declares, at kernel build time, everything the kernel
//! would otherwise discover by naming convention: its front controller, its
//! sitemap generator, its event handlers, its plugins and its CLI commands.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::KernelResult;
use crate::factory::FactoryArgs;
use crate::traits::{CliCommand, EventHandler, FrontController, Plugin, SitemapGenerator};
use crate::types::AppId;

/// Constructor of an application's front controller.
pub type FrontControllerFactory =
    Arc<dyn Fn(&FactoryArgs<'_>) -> KernelResult<Arc<dyn FrontController>> + Send + Sync>;

/// Constructor of an event handler, invoked once per publication.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn EventHandler> + Send + Sync>;

/// Constructor of a plugin object, invoked once per publication.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// A plugin declared by an application together with its event bindings.
#[derive(Clone)]
pub struct PluginRegistration {
    id: String,
    factory: PluginFactory,
    handlers: IndexMap<String, String>,
    localized: bool,
}

impl PluginRegistration {
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            factory: Arc::new(factory),
            handlers: IndexMap::new(),
            localized: false,
        }
    }

    /// Bind `event` to the plugin method `method`.
    pub fn handle(mut self, event: impl Into<String>, method: impl Into<String>) -> Self {
        self.handlers.insert(event.into(), method.into());
        self
    }

    /// The plugin ships its own locale catalog.
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handlers(&self) -> &IndexMap<String, String> {
        &self.handlers
    }

    pub fn method_for(&self, event: &str) -> Option<&str> {
        self.handlers.get(event).map(String::as_str)
    }

    pub fn is_localized(&self) -> bool {
        self.localized
    }

    pub fn instantiate(&self) -> Arc<dyn Plugin> {
        (self.factory)()
    }
}

impl fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("id", &self.id)
            .field("handlers", &self.handlers)
            .field("localized", &self.localized)
            .finish()
    }
}

/// Static declaration of one installable application.
#[derive(Clone)]
pub struct Application {
    id: AppId,
    prefix: String,
    front_controller: Option<FrontControllerFactory>,
    sitemap: Option<Arc<dyn SitemapGenerator>>,
    login: Option<(String, Option<String>)>,
    handlers: IndexMap<String, HandlerFactory>,
    plugins: IndexMap<String, PluginRegistration>,
    commands: IndexMap<String, Arc<dyn CliCommand>>,
}

impl Application {
    pub fn new(id: impl Into<AppId>) -> Self {
        let id = id.into();
        Self {
            prefix: id.to_string(),
            id,
            front_controller: None,
            sitemap: None,
            login: None,
            handlers: IndexMap::new(),
            plugins: IndexMap::new(),
            commands: IndexMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_front_controller<F>(mut self, factory: F) -> Self
    where
        F: Fn(&FactoryArgs<'_>) -> KernelResult<Arc<dyn FrontController>> + Send + Sync + 'static,
    {
        self.front_controller = Some(Arc::new(factory));
        self
    }

    pub fn with_sitemap(mut self, generator: Arc<dyn SitemapGenerator>) -> Self {
        self.sitemap = Some(generator);
        self
    }

    /// Declare the application's own login action.
    pub fn with_login(mut self, module: impl Into<String>, action: Option<&str>) -> Self {
        self.login = Some((module.into(), action.map(str::to_string)));
        self
    }

    /// Handle `event` published by the application whose prefix is
    /// `publisher_prefix`.
    pub fn on_event<F>(mut self, publisher_prefix: &str, event: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn EventHandler> + Send + Sync + 'static,
    {
        self.handlers
            .insert(handler_key(publisher_prefix, event), Arc::new(factory));
        self
    }

    pub fn with_plugin(mut self, plugin: PluginRegistration) -> Self {
        self.plugins.insert(plugin.id.clone(), plugin);
        self
    }

    pub fn with_command(mut self, name: impl Into<String>, command: Arc<dyn CliCommand>) -> Self {
        self.commands.insert(name.into(), command);
        self
    }

    pub fn id(&self) -> &AppId {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn front_controller(&self) -> Option<&FrontControllerFactory> {
        self.front_controller.as_ref()
    }

    pub fn sitemap(&self) -> Option<&Arc<dyn SitemapGenerator>> {
        self.sitemap.as_ref()
    }

    pub fn login(&self) -> Option<(&str, Option<&str>)> {
        self.login
            .as_ref()
            .map(|(module, action)| (module.as_str(), action.as_deref()))
    }

    /// Handler for `event` published under `publisher_prefix`.
    pub fn handler(&self, publisher_prefix: &str, event: &str) -> Option<&HandlerFactory> {
        self.handlers.get(&handler_key(publisher_prefix, event))
    }

    /// Plugins in declaration order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginRegistration> {
        self.plugins.values()
    }

    pub fn plugin(&self, id: &str) -> Option<&PluginRegistration> {
        self.plugins.get(id)
    }

    pub fn command(&self, name: &str) -> Option<&Arc<dyn CliCommand>> {
        self.commands.get(name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn handler_key(publisher_prefix: &str, event: &str) -> String {
    format!("{publisher_prefix}.{event}")
}
