//! Shared fixtures for the kernel integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use appvisor_kernel::auth::AUTH_USER_KEY;
use appvisor_kernel::memory::{
    MemorySession, MemorySettingsStore, PrefixRoutes, StaticManifest, StaticRights,
};
use appvisor_kernel::mocks::{MockContactStore, MockLocales};
use appvisor_kernel::*;
use parking_lot::Mutex;
use serde_json::{json, Value};

pub type Log = Arc<Mutex<Vec<String>>>;

pub const ADMIN_ID: ContactId = 1;
pub const GUEST_ID: ContactId = 2;
pub const ADMIN_PASSWORD: &str = "secret";

pub fn hash(password: &str) -> String {
    Blake3PasswordHasher.hash(password)
}

pub use appvisor_kernel::auth::Blake3PasswordHasher;

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

/// Front controller that records `<app>:dispatch:<route app>` and
/// `<app>:execute:<module>/<action>`.
pub struct RecordingController {
    app: String,
    log: Log,
}

impl FrontController for RecordingController {
    fn dispatch(&self, _ctx: &mut Context, route: Option<&Route>) -> KernelResult<()> {
        let target = route
            .and_then(|r| r.app.as_ref())
            .map_or("-".to_string(), AppId::to_string);
        self.log.lock().push(format!("{}:dispatch:{}", self.app, target));
        Ok(())
    }

    fn execute(&self, _ctx: &mut Context, module: &str, action: Option<&str>) -> KernelResult<()> {
        self.log.lock().push(format!(
            "{}:execute:{}/{}",
            self.app,
            module,
            action.unwrap_or("-")
        ));
        Ok(())
    }
}

/// Front controller whose dispatch always fails.
pub struct FailingController {
    make: fn() -> KernelError,
}

impl FrontController for FailingController {
    fn dispatch(&self, _ctx: &mut Context, _route: Option<&Route>) -> KernelResult<()> {
        Err((self.make)())
    }

    fn execute(&self, _ctx: &mut Context, _module: &str, _action: Option<&str>) -> KernelResult<()> {
        Err((self.make)())
    }
}

pub struct RecordingSitemap {
    log: Log,
}

impl SitemapGenerator for RecordingSitemap {
    fn generate(&self, ctx: &mut Context) -> KernelResult<()> {
        let app = ctx.current_app();
        self.log.lock().push(format!("sitemap:{app}"));
        ctx.response_mut().write("<urlset/>");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Kernel under construction.
pub struct Fixture {
    pub config: KernelConfig,
    pub rights: StaticRights,
    pub routes: PrefixRoutes,
    pub locales: MockLocales,
    pub manifest: StaticManifest,
    applications: Vec<Application>,
    log: Log,
}

impl Fixture {
    /// Bootstrap application with a recording front controller, installed
    /// in the manifest.
    pub fn new() -> Self {
        let log: Log = Arc::default();
        let mut fixture = Self {
            config: KernelConfig::default(),
            rights: StaticRights::allow_all(),
            routes: PrefixRoutes::new(),
            locales: MockLocales::new(),
            manifest: StaticManifest::new().app(BOOTSTRAP_APP, json!({"name": "Webasyst"})),
            applications: Vec::new(),
            log,
        };
        let bootstrap = fixture.recording_app(BOOTSTRAP_APP);
        fixture.applications.push(bootstrap);
        fixture
    }

    pub fn log(&self) -> Log {
        self.log.clone()
    }

    /// An application whose front controller records into the fixture log.
    pub fn recording_app(&self, id: &str) -> Application {
        let log = self.log.clone();
        let app = id.to_string();
        Application::new(id).with_front_controller(move |_| {
            let controller: Arc<dyn FrontController> = Arc::new(RecordingController {
                app: app.clone(),
                log: log.clone(),
            });
            Ok(controller)
        })
    }

    pub fn failing_app(&self, id: &str, make: fn() -> KernelError) -> Application {
        Application::new(id).with_front_controller(move |_| {
            let controller: Arc<dyn FrontController> = Arc::new(FailingController { make });
            Ok(controller)
        })
    }

    pub fn sitemap(&self) -> Arc<dyn SitemapGenerator> {
        Arc::new(RecordingSitemap {
            log: self.log.clone(),
        })
    }

    /// Register an application; replaces an earlier one with the same id.
    pub fn register(mut self, application: Application) -> Self {
        self.applications
            .retain(|existing| existing.id() != application.id());
        self.applications.push(application);
        self
    }

    /// Register an application and install it in the manifest.
    pub fn install(mut self, application: Application) -> Self {
        let id = application.id().to_string();
        self.manifest = self.manifest.app(&id, json!({"name": id.clone()}));
        self.register(application)
    }

    pub fn rights(mut self, rights: StaticRights) -> Self {
        self.rights = rights;
        self
    }

    pub fn routes(mut self, routes: PrefixRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn locales(mut self, locales: MockLocales) -> Self {
        self.locales = locales;
        self
    }

    pub fn configure(mut self, configure: impl FnOnce(&mut KernelConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let contacts = Arc::new(MockContactStore::new());
        contacts.insert(ContactRecord {
            id: ADMIN_ID,
            login: "admin".into(),
            password: hash(ADMIN_PASSWORD),
            is_user: true,
            email: Some("admin@example.com".into()),
            locale: None,
        });
        contacts.insert(ContactRecord {
            id: GUEST_ID,
            login: "guest".into(),
            password: hash("guest"),
            is_user: false,
            email: None,
            locale: None,
        });
        let settings = Arc::new(MemorySettingsStore::new());
        let locales = Arc::new(self.locales);
        let session = Arc::new(MemorySession::new());

        let mut config = self.config;
        config
            .factories
            .insert("storage".into(), FactorySpec::Name("shared_session".into()));

        let collaborators = Collaborators {
            contacts: contacts.clone(),
            settings: settings.clone(),
            rights: Arc::new(self.rights),
            routing: Arc::new(self.routes),
            locales: locales.clone(),
            manifest: Arc::new(self.manifest),
            hasher: Arc::new(Blake3PasswordHasher),
        };

        let shared_session = session.clone();
        let mut builder = Kernel::builder(config, collaborators)
            .manifest_cache(ManifestCache::in_memory(false))
            .factory("shared_session", move |_| {
                let storage: Arc<dyn SessionStorage> = shared_session.clone();
                Ok(shared(storage))
            });
        for application in self.applications {
            builder = builder.register(application);
        }

        Harness {
            kernel: builder.build().expect("kernel builds"),
            contacts,
            settings,
            locales,
            session,
            log: self.log,
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A built kernel plus handles on its in-memory collaborators.
///
/// Session storage is shared by every context, so consecutive contexts
/// behave like consecutive requests of one browser.
pub struct Harness {
    pub kernel: Kernel,
    pub contacts: Arc<MockContactStore>,
    pub settings: Arc<MemorySettingsStore>,
    pub locales: Arc<MockLocales>,
    pub session: Arc<MemorySession>,
    log: Log,
}

impl Harness {
    pub fn context(&self, environment: Environment, request: Request) -> Context {
        self.kernel
            .context(self.kernel.system_config(environment), request)
            .expect("context opens")
    }

    pub fn backend(&self, url: &str) -> Context {
        self.context(Environment::Backend, Request::get(url))
    }

    pub fn frontend(&self, url: &str) -> Context {
        self.context(Environment::Frontend, Request::get(url))
    }

    /// Context whose entry instance is the application `app`.
    pub fn app_context(&self, app: &str, environment: Environment, url: &str) -> Context {
        let config = self
            .kernel
            .app_config(app, environment)
            .expect("application is registered");
        self.kernel
            .context(config, Request::get(url))
            .expect("context opens")
    }

    /// Put the admin's identity in the session, as a previous login would.
    pub fn sign_in_admin(&self) {
        self.session.write(
            AUTH_USER_KEY,
            json!({"id": ADMIN_ID, "login": "admin", "is_user": true}),
        );
    }

    pub fn signed_in(&self) -> Option<Value> {
        self.session.read(AUTH_USER_KEY)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}
