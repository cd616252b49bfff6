//! Per-request execution context.
//!
//! Everything that is mutable while one request (or one CLI invocation) is
//! processed lives here: the instance registry with its current pointer,
//! the common factory cache, the active-plugin stack, loaded translations,
//! the manifest snapshot and the request/response pair. Concurrent requests
//! each get their own `Context` over a shared [`Kernel`].

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::auth::{AuthParams, AuthProvider, AuthenticatedIdentity, CurrentUser, AUTH_USER_KEY};
use crate::config::InstanceConfig;
use crate::error::{KernelError, KernelResult};
use crate::events::{ActivePluginStack, EventBus, EventName, Publication};
use crate::http::{Request, Response};
use crate::instance::ApplicationInstance;
use crate::kernel::{front_controller_impl, Kernel, AUTH_FACTORY, DEFAULT_AUTH_IMPL, FRONT_CONTROLLER_FACTORY};
use crate::locale::Translations;
use crate::manifest::{AppCatalog, AppInfo, DEFAULT_VERSION};
use crate::registry::InstanceRegistry;
use crate::traits::{FrontController, SessionStorage};
use crate::types::{AppId, Environment, BOOTSTRAP_APP};

pub struct Context {
    kernel: Kernel,
    registry: InstanceRegistry,
    entry: AppId,
    plugins: ActivePluginStack,
    translations: Translations,
    catalog: Option<Arc<AppCatalog>>,
    request: Request,
    response: Response,
}

impl Context {
    /// Open a context and construct its entry instance from `config`.
    pub fn new(kernel: Kernel, config: InstanceConfig, request: Request) -> KernelResult<Self> {
        let mut registry = InstanceRegistry::new(kernel.clone());
        let entry = registry.resolve(None, Some(config), false)?;
        let translations = Translations::new(kernel.config().default_locale.clone());

        debug!(entry = %entry.id(), environment = %entry.environment(), url = request.url(), "Context opened");
        Ok(Self {
            entry: entry.id().clone(),
            kernel,
            registry,
            plugins: ActivePluginStack::new(),
            translations,
            catalog: None,
            request,
            response: Response::new(),
        })
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InstanceRegistry {
        &mut self.registry
    }

    // ═══════════════════════════════════════════════════════════════════
    // INSTANCES
    // ═══════════════════════════════════════════════════════════════════

    /// The instance this context was opened on.
    pub fn entry(&self) -> KernelResult<Arc<ApplicationInstance>> {
        self.registry
            .get(self.entry.as_str())
            .ok_or_else(|| KernelError::UnknownApplication(self.entry.to_string()))
    }

    pub fn environment(&self) -> Environment {
        self.registry
            .get(self.entry.as_str())
            .map(|entry| entry.environment())
            .unwrap_or_default()
    }

    /// Resolve an application instance without switching to it (unless the
    /// context is still on the system instance).
    pub fn instance(&mut self, id: &str) -> KernelResult<Arc<ApplicationInstance>> {
        self.registry.resolve(Some(id), None, false)
    }

    /// Resolve an application instance and make it current.
    pub fn activate(&mut self, id: &str) -> KernelResult<Arc<ApplicationInstance>> {
        let instance = self.registry.resolve(Some(id), None, true)?;
        self.translations.set_locale(&instance.config().locale());
        Ok(instance)
    }

    pub fn current(&self) -> KernelResult<Arc<ApplicationInstance>> {
        self.registry
            .current()
            .ok_or_else(|| KernelError::UnknownApplication(self.registry.current_id().to_string()))
    }

    /// Application the current instance speaks for.
    pub fn current_app(&self) -> AppId {
        self.registry
            .current()
            .map(|instance| AppId::from(instance.config().application_name()))
            .unwrap_or_else(|| AppId::from(BOOTSTRAP_APP))
    }

    pub fn front_controller(&self, instance: &ApplicationInstance) -> KernelResult<Arc<dyn FrontController>> {
        let default_impl = front_controller_impl(instance.config().application_name());
        let slot = instance.factory::<Arc<dyn FrontController>>(
            &self.kernel,
            FRONT_CONTROLLER_FACTORY,
            &default_impl,
        )?;
        Ok(slot.as_ref().clone())
    }

    // ═══════════════════════════════════════════════════════════════════
    // REQUEST / RESPONSE
    // ═══════════════════════════════════════════════════════════════════

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    // ═══════════════════════════════════════════════════════════════════
    // AUTHENTICATION
    // ═══════════════════════════════════════════════════════════════════

    pub fn session(&self) -> KernelResult<Arc<dyn SessionStorage>> {
        self.registry.storage()
    }

    pub fn user(&self) -> KernelResult<Arc<CurrentUser>> {
        self.registry.user()
    }

    /// Authentication provider of the current instance.
    pub fn auth(&self) -> KernelResult<Arc<AuthProvider>> {
        self.current()?
            .factory(&self.kernel, AUTH_FACTORY, DEFAULT_AUTH_IMPL)
    }

    pub fn authenticate(&mut self, params: &AuthParams) -> KernelResult<Option<AuthenticatedIdentity>> {
        let auth = self.auth()?;
        auth.auth(self, params)
    }

    pub fn clear_auth(&mut self) -> KernelResult<()> {
        let auth = self.auth()?;
        auth.clear_auth(self)
    }

    /// Whether the caller is authenticated: an identity in the session, or
    /// else a valid remember-me token.
    pub fn is_authenticated(&mut self) -> KernelResult<bool> {
        let session = self.session()?;
        if session.read(AUTH_USER_KEY).is_some() {
            let user = self.user()?;
            if !user.has_identity() {
                user.init(session.as_ref());
            }
            return Ok(true);
        }
        let auth = self.auth()?;
        Ok(auth.auth_by_token(self)?.is_some())
    }

    /// Run the login flow of `app`: its own login action when it declares
    /// one, otherwise the bootstrap application's.
    pub fn login(&mut self, app: &str) -> KernelResult<()> {
        let own = self
            .kernel
            .application(app)
            .and_then(|application| application.login().map(|(m, a)| (m.to_string(), a.map(str::to_string))));

        let (target, module, action) = match own {
            Some((module, action)) => (app, module, action),
            None => (BOOTSTRAP_APP, "login".to_string(), None),
        };
        debug!(app, target, module = %module, "Running login flow");

        let instance = self.instance(target)?;
        let controller = self.front_controller(&instance)?;
        controller.execute(self, &module, action.as_deref())
    }

    // ═══════════════════════════════════════════════════════════════════
    // CATALOG
    // ═══════════════════════════════════════════════════════════════════

    /// The installed-applications snapshot, loaded once per context.
    pub fn catalog(&mut self) -> KernelResult<Arc<AppCatalog>> {
        if let Some(catalog) = &self.catalog {
            return Ok(catalog.clone());
        }
        let catalog = Arc::new(self.kernel.catalog(&self.locale())?);
        self.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    pub fn apps(&mut self, include_system: bool) -> KernelResult<Vec<AppInfo>> {
        Ok(self.catalog()?.installed(include_system).cloned().collect())
    }

    pub fn app_exists(&mut self, id: &str) -> KernelResult<bool> {
        Ok(id == BOOTSTRAP_APP || self.catalog()?.contains(id))
    }

    /// Metadata of `id`, or of the current application.
    pub fn app_info(&mut self, id: Option<&str>) -> KernelResult<Option<AppInfo>> {
        let id = id.map_or_else(|| self.current_app(), AppId::from);
        Ok(self.catalog()?.get(id.as_str()).cloned())
    }

    pub fn version(&mut self, id: Option<&str>) -> KernelResult<String> {
        Ok(self
            .app_info(id)?
            .map(|info| info.full_version())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // LOCALE
    // ═══════════════════════════════════════════════════════════════════

    /// The caller's locale, falling back to the kernel default.
    pub fn locale(&self) -> String {
        self.user()
            .map(|user| user.locale())
            .unwrap_or_else(|_| self.kernel.config().default_locale.clone())
    }

    pub fn plugins(&self) -> &ActivePluginStack {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut ActivePluginStack {
        &mut self.plugins
    }

    /// `<prefix>_<plugin>` of the executing plugin, else the current
    /// application id.
    pub fn active_locale_domain(&self) -> String {
        match self.plugins.top() {
            Some(frame) => frame.locale_domain(),
            None => self.current_app().to_string(),
        }
    }

    /// Make sure the catalog of the active locale domain is loaded.
    pub fn load_active_locale(&mut self) {
        let locale = self.locale();
        let domain = self.active_locale_domain();
        self.translations.set_locale(&locale);
        self.translations
            .ensure_loaded(self.kernel.locales().as_ref(), &domain);
    }

    /// Translate `msgid` in the active locale domain.
    pub fn translate(&mut self, msgid: &str) -> String {
        self.load_active_locale();
        let domain = self.active_locale_domain();
        self.translations.translate(&domain, msgid)
    }

    // ═══════════════════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════════════════

    pub fn publish(&mut self, event: impl Into<EventName>, params: &mut Value) -> KernelResult<Publication> {
        EventBus::publish(self, event, params)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("entry", &self.entry)
            .field("current", self.registry.current_id())
            .field("plugin_depth", &self.plugins.depth())
            .field("url", &self.request.url())
            .finish()
    }
}
