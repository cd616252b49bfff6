//! Appvisor kernel: many applications, one process.
//!
//! The kernel hosts several logically isolated applications, routes every
//! inbound request to exactly one of them, authenticates the caller across
//! requests and broadcasts domain events to the handlers of applications and
//! their plugins.
//!
//! ## Components
//!
//! - **Instance Registry** ([`InstanceRegistry`]): at most one
//!   [`ApplicationInstance`] per application id, constructed lazily, with a
//!   single *current* pointer and two factory caches (per instance and
//!   common).
//! - **Dispatcher** ([`Dispatcher`]): sitemap, OAuth callback, backend login
//!   gate, rights gate, frontend routing and the CLI form.
//! - **Auth Provider** ([`AuthProvider`]): id, parameter, login-form and
//!   remember-me token authentication, bound to the session.
//! - **Event Bus** ([`EventBus`]): application handlers first, then the
//!   publisher's plugins inside balanced active-plugin frames.
//! - **Manifest cache** ([`ManifestCache`]): installed-applications catalog
//!   cached per locale and invalidated by the manifest's modification time.
//!
//! ## Execution model
//!
//! A [`Kernel`] is immutable and shared. Each request gets its own
//! [`Context`] holding every piece of mutable state, so concurrent requests
//! never observe each other.

pub mod application;
pub mod auth;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod factory;
pub mod http;
pub mod instance;
pub mod kernel;
pub mod locale;
pub mod manifest;
pub mod memory;
pub mod mocks;
pub mod registry;
pub mod traits;
pub mod types;

pub use application::{Application, PluginRegistration};
pub use auth::{AuthParams, AuthProvider, AuthenticatedIdentity, ContactRecord, CurrentUser};
pub use config::{AuthOptions, FactorySpec, InstanceConfig, KernelConfig, LoginField};
pub use context::Context;
pub use dispatch::{parse_cli, CliArgs, CliInvocation, DispatchOutcome, Dispatcher};
pub use error::{KernelError, KernelResult, StoreError};
pub use events::{ActivePluginStack, EventBus, EventName, PluginFrame, Publication};
pub use factory::{shared, FactoryArgs, FactoryCatalog, SharedObject};
pub use http::{Cookie, CookieExpiry, Request, Response, Route};
pub use instance::ApplicationInstance;
pub use kernel::{Collaborators, Kernel, KernelBuilder};
pub use manifest::{AppCatalog, AppInfo, FileManifestSource, ManifestCache};
pub use registry::InstanceRegistry;
pub use traits::{
    CliCommand, ContactStore, EventHandler, FrontController, LocaleSource, ManifestSource,
    PasswordHasher, Plugin, RightsModel, RoutingTable, SessionStorage, SettingsStore,
    SitemapGenerator,
};
pub use types::{AppId, ContactId, Environment, BOOTSTRAP_APP, SYSTEM_ID};
