//! Event Bus - best-effort broadcast to applications, then plugins.
//!
//! Publishing visits, in order:
//!
//! 1. every installed application (manifest order) that registered a handler
//!    for `<publisher prefix>.<event>`;
//! 2. every plugin of the publishing application bound to `<event>`
//!    (declaration order), each inside its own active-plugin frame.
//!
//! `params` is handed by mutable reference to every contributor, so a
//! handler sees the changes made by those that ran before it. Failures never
//! reach the publisher: they are logged and collected in the
//! [`Publication`].

mod plugin_stack;

pub use plugin_stack::{ActivePluginStack, PluginFrame};

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::types::AppId;

/// Event name, optionally qualified with the application to publish as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventName {
    pub app: Option<AppId>,
    pub name: String,
}

impl EventName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            app: None,
            name: name.into(),
        }
    }

    /// Publish as if `app` were the active application.
    pub fn qualified(app: impl Into<AppId>, name: impl Into<String>) -> Self {
        Self {
            app: Some(app.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::new(name)
    }
}

impl From<(&str, &str)> for EventName {
    fn from((app, name): (&str, &str)) -> Self {
        EventName::qualified(app, name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.app {
            Some(app) => write!(f, "{}:{}", app, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A contained handler error.
#[derive(Debug)]
pub struct HandlerFailure {
    pub contributor: String,
    pub error: KernelError,
}

/// Outcome of one publication.
#[derive(Debug, Default)]
pub struct Publication {
    /// Contributor id -> non-null result, in invocation order
    pub results: IndexMap<String, Value>,
    pub failures: Vec<HandlerFailure>,
}

impl Publication {
    pub fn get(&self, contributor: &str) -> Option<&Value> {
        self.results.get(contributor)
    }

    pub fn contributors(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, contributor: String, outcome: KernelResult<Option<Value>>) {
        match outcome {
            Ok(Some(value)) => {
                self.results.insert(contributor, value);
            }
            Ok(None) => {}
            Err(error) => {
                warn!(contributor = %contributor, error = %error, "Event handler failed");
                self.failures.push(HandlerFailure { contributor, error });
            }
        }
    }
}

/// Contributor id of a plugin.
pub fn plugin_contributor(plugin: &str) -> String {
    format!("{plugin}-plugin")
}

/// Broadcast entry point.
pub struct EventBus;

impl EventBus {
    pub fn publish(
        ctx: &mut Context,
        event: impl Into<EventName>,
        params: &mut Value,
    ) -> KernelResult<Publication> {
        let event = event.into();
        let publisher = match &event.app {
            Some(app) => app.clone(),
            None => ctx.current_app(),
        };
        let prefix = ctx.instance(publisher.as_str())?.config().prefix().to_string();
        debug!(event = %event, publisher = %publisher, prefix = %prefix, "Publishing event");

        let mut publication = Publication::default();

        // Phase 1: application handlers
        let installed: Vec<AppId> = ctx.apps(false)?.into_iter().map(|info| info.id).collect();
        for app_id in installed {
            let Some(application) = ctx.kernel().application(app_id.as_str()).cloned() else {
                continue;
            };
            let Some(factory) = application.handler(&prefix, &event.name) else {
                continue;
            };
            debug!(event = %event, app = %app_id, "Invoking application handler");
            let outcome = ctx
                .instance(app_id.as_str())
                .and_then(|_| factory().execute(ctx, params));
            publication.record(app_id.to_string(), outcome);
        }

        // Phase 2: plugins of the publishing application
        let Some(application) = ctx.kernel().application(publisher.as_str()).cloned() else {
            return Ok(publication);
        };
        for plugin in application.plugins() {
            let Some(method) = plugin.method_for(&event.name) else {
                continue;
            };
            debug!(event = %event, plugin = plugin.id(), method, "Invoking plugin handler");

            let depth = ctx.plugins().depth();
            ctx.plugins_mut()
                .push(PluginFrame::plugin(prefix.as_str(), plugin.id()));
            if plugin.is_localized() {
                ctx.load_active_locale();
            }
            let outcome = plugin.instantiate().call(method, ctx, params);
            ctx.plugins_mut().truncate(depth);

            publication.record(plugin_contributor(plugin.id()), outcome);
        }

        Ok(publication)
    }
}
