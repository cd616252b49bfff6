//! End-to-end dispatch: every branch of the decision order, from a raw
//! request to the front controller that handled it.

mod common;

use std::sync::Arc;

use appvisor_kernel::memory::{PrefixRoutes, StaticRights};
use appvisor_kernel::*;
use common::*;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_blog() -> Fixture {
    let fixture = Fixture::new();
    let blog = fixture.recording_app("blog").with_sitemap(fixture.sitemap());
    let contacts = fixture.recording_app("contacts");
    fixture.install(blog).install(contacts)
}

struct SyncCommand {
    log: Log,
}

impl CliCommand for SyncCommand {
    fn run(&self, ctx: &mut Context, args: &CliArgs) -> KernelResult<()> {
        let force = args.flag("force").unwrap_or("-");
        self.log
            .lock()
            .push(format!("{}:cli:sync:force={}", ctx.current_app(), force));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sitemaps
// ---------------------------------------------------------------------------

#[test]
fn sitemap_runs_generator_of_installed_app() {
    let harness = with_blog().build();
    let mut ctx = harness.frontend("sitemap-blog.xml");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some("blog"));
    assert_eq!(harness.log(), ["sitemap:blog"]);
    assert_eq!(ctx.response().body(), "<urlset/>");
    assert_eq!(ctx.response().status(), 200);
}

#[test]
fn sitemap_of_missing_app_is_not_found() {
    let harness = with_blog().build();
    let mut ctx = harness.frontend("sitemap-shop.xml");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::NotFound {
            message: "Page not found".into()
        }
    );
    assert_eq!(ctx.response().status(), 404);
    assert_eq!(ctx.response().body(), "Page not found");
    assert!(harness.log().is_empty());
}

#[test]
fn sitemap_without_generator_is_not_found() {
    let harness = with_blog().build();
    let mut ctx = harness.frontend("sitemap-contacts.xml");

    assert!(matches!(
        Dispatcher::dispatch(&mut ctx),
        DispatchOutcome::NotFound { .. }
    ));
}

#[test]
fn default_sitemap_belongs_to_bootstrap() {
    let fixture = Fixture::new();
    let bootstrap = fixture
        .recording_app(BOOTSTRAP_APP)
        .with_sitemap(fixture.sitemap());
    let harness = fixture.register(bootstrap).build();
    let mut ctx = harness.frontend("sitemap.xml");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some(BOOTSTRAP_APP));
    assert_eq!(harness.log(), ["sitemap:webasyst"]);
}

// ---------------------------------------------------------------------------
// OAuth and the backend login gate
// ---------------------------------------------------------------------------

#[test]
fn oauth_callback_runs_bootstrap_oauth_action() {
    let harness = with_blog().build();
    let mut ctx = harness.frontend("oauth.php?provider=github&code=x");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some(BOOTSTRAP_APP));
    assert_eq!(harness.log(), ["webasyst:execute:login/OAuth"]);
}

#[test]
fn unauthenticated_backend_request_gets_login_with_action() {
    let harness = with_blog().build();
    let mut ctx = harness.backend("webasyst/contacts/?action=recover");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some(BOOTSTRAP_APP));
    assert_eq!(harness.log(), ["webasyst:execute:login/recover"]);
}

#[test]
fn unauthenticated_backend_request_without_action() {
    let harness = with_blog().build();
    let mut ctx = harness.backend("webasyst/");

    Dispatcher::dispatch(&mut ctx);

    assert_eq!(harness.log(), ["webasyst:execute:login/-"]);
}

// ---------------------------------------------------------------------------
// Backend routing and rights
// ---------------------------------------------------------------------------

#[test]
fn backend_app_without_rights_redirects_to_backend_root() {
    let harness = with_blog().rights(StaticRights::deny_all()).build();
    harness.sign_in_admin();
    let mut ctx = harness.backend("webasyst/contacts/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::Redirected {
            location: "/webasyst/".into()
        }
    );
    assert_eq!(ctx.response().status(), 302);
    assert_eq!(ctx.response().location(), Some("/webasyst/"));
    assert!(harness.log().is_empty());
}

#[test]
fn backend_app_with_rights_is_dispatched_and_current() {
    let harness = with_blog()
        .rights(StaticRights::deny_all().grant(ADMIN_ID, "contacts"))
        .build();
    harness.sign_in_admin();
    let mut ctx = harness.backend("webasyst/contacts/?id=5");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some("contacts"));
    assert_eq!(harness.log(), ["contacts:dispatch:-"]);
    assert_eq!(ctx.current_app(), "contacts");
    assert!(ctx.registry().contains(BOOTSTRAP_APP));
}

#[test]
fn bare_backend_path_goes_to_bootstrap_without_rights_check() {
    let harness = with_blog().rights(StaticRights::deny_all()).build();
    harness.sign_in_admin();
    let mut ctx = harness.backend("webasyst/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some(BOOTSTRAP_APP));
    assert_eq!(harness.log(), ["webasyst:dispatch:-"]);
}

#[test]
fn unknown_backend_app_fails_with_server_error() {
    let harness = with_blog().build();
    harness.sign_in_admin();
    let mut ctx = harness.backend("webasyst/nope/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    match outcome {
        DispatchOutcome::Failed { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("nope"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn application_entry_is_rights_gated_in_backend() {
    let harness = with_blog().rights(StaticRights::deny_all()).build();
    harness.sign_in_admin();
    let mut ctx = harness.app_context("blog", Environment::Backend, "blog/");

    assert!(matches!(
        Dispatcher::dispatch(&mut ctx),
        DispatchOutcome::Redirected { .. }
    ));
    assert!(harness.log().is_empty());
}

#[test]
fn application_entry_dispatches_to_its_own_controller() {
    let harness = with_blog().build();
    let mut ctx = harness.app_context("blog", Environment::Frontend, "blog/post/1");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some("blog"));
    assert_eq!(harness.log(), ["blog:dispatch:-"]);
}

// ---------------------------------------------------------------------------
// Frontend
// ---------------------------------------------------------------------------

#[test]
fn logout_clears_session_and_redirects_without_parameter() {
    let harness = with_blog().build();
    harness.sign_in_admin();
    let mut ctx = harness.frontend("blog/?logout&page=2");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::Redirected {
            location: "blog/?page=2".into()
        }
    );
    assert!(harness.session.is_empty());
    assert_eq!(harness.contacts.touched(), [ADMIN_ID]);
    assert!(harness.log().is_empty());
}

#[test]
fn unmatched_frontend_path_redirects_to_backend_root() {
    let harness = with_blog().build();
    let mut ctx = harness.frontend("nowhere/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::Redirected {
            location: "/webasyst/".into()
        }
    );
}

#[test]
fn matched_route_is_exposed_and_dispatched() {
    let routes = PrefixRoutes::new()
        .route("blog/", Route::to("blog").with_param("category", json!("news")));
    let harness = with_blog().routes(routes).build();
    let mut ctx = harness.frontend("blog/post/1");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some("blog"));
    assert_eq!(harness.log(), ["blog:dispatch:blog"]);
    assert_eq!(ctx.request().param("app"), Some(&json!("blog")));
    assert_eq!(ctx.request().param("category"), Some(&json!("news")));
    assert_eq!(ctx.request().param("secure"), None);
    assert_eq!(ctx.current_app(), "blog");
}

#[test]
fn route_without_app_goes_to_bootstrap() {
    let routes = PrefixRoutes::new().route("", Route::default());
    let harness = with_blog().routes(routes).build();
    let mut ctx = harness.frontend("about/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some(BOOTSTRAP_APP));
    assert_eq!(harness.log(), ["webasyst:dispatch:-"]);
}

#[test]
fn secure_route_runs_app_login_when_unauthenticated() {
    let fixture = with_blog();
    let shop = fixture.recording_app("shop").with_login("login", Some("shop"));
    let routes = PrefixRoutes::new().route("account/", Route::to("shop").secure());
    let harness = fixture.install(shop).routes(routes).build();
    let mut ctx = harness.frontend("account/orders/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(outcome.handled_by().map(AppId::as_str), Some("shop"));
    assert_eq!(harness.log(), ["shop:execute:login/shop"]);
    assert_eq!(ctx.request().param("secure"), Some(&Value::Bool(true)));
}

#[test]
fn secure_route_falls_back_to_bootstrap_login() {
    let routes = PrefixRoutes::new().route("my/", Route::to("blog").secure());
    let harness = with_blog().routes(routes).build();
    let mut ctx = harness.frontend("my/drafts/");

    Dispatcher::dispatch(&mut ctx);

    assert_eq!(harness.log(), ["webasyst:execute:login/-"]);
}

#[test]
fn secure_route_proceeds_when_authenticated() {
    let routes = PrefixRoutes::new().route("my/", Route::to("blog").secure());
    let harness = with_blog().routes(routes).build();
    harness.sign_in_admin();
    let mut ctx = harness.frontend("my/drafts/");

    Dispatcher::dispatch(&mut ctx);

    assert_eq!(harness.log(), ["blog:dispatch:blog"]);
}

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

fn broken_fixture(make: fn() -> KernelError) -> Fixture {
    let fixture = with_blog();
    let broken = fixture.failing_app("broken", make);
    fixture
        .install(broken)
        .routes(PrefixRoutes::new().route("broken/", Route::to("broken")))
}

#[test]
fn foreign_errors_are_hidden_outside_debug() {
    let harness = broken_fixture(|| KernelError::unexpected("database exploded")).build();
    let mut ctx = harness.frontend("broken/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            status: 500,
            message: "internal error".into()
        }
    );
    assert_eq!(ctx.response().status(), 500);
    assert_eq!(ctx.response().body(), "internal error");
}

#[test]
fn foreign_errors_are_shown_in_debug() {
    let harness = broken_fixture(|| KernelError::unexpected("database exploded"))
        .configure(|config| config.debug = true)
        .build();
    let mut ctx = harness.frontend("broken/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert!(matches!(
        outcome,
        DispatchOutcome::Failed { status: 500, ref message } if message.contains("database exploded")
    ));
}

#[test]
fn access_denied_renders_forbidden() {
    let harness = broken_fixture(|| KernelError::access_denied("no edit rights")).build();
    let mut ctx = harness.frontend("broken/");

    let outcome = Dispatcher::dispatch(&mut ctx);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            status: 403,
            message: "access denied: no edit rights".into()
        }
    );
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

fn cli_harness() -> Harness {
    let fixture = with_blog();
    let sync: Arc<dyn CliCommand> = Arc::new(SyncCommand { log: fixture.log() });
    let contacts = fixture.recording_app("contacts").with_command("sync", sync);
    fixture.install(contacts).build()
}

#[test]
fn cli_runs_command_of_target_app() {
    let harness = cli_harness();
    let mut ctx = harness.backend("");

    Dispatcher::dispatch_cli(&mut ctx, &["appvisor", "contacts", "sync", "--force", "1"]).unwrap();

    assert_eq!(harness.log(), ["contacts:cli:sync:force=1"]);
    assert_eq!(ctx.request().param("force"), Some(&json!("1")));
    assert!(ctx.registry().contains(BOOTSTRAP_APP));
    assert_eq!(ctx.current_app(), "contacts");
}

#[test]
fn cli_unknown_command_is_not_found() {
    let harness = cli_harness();
    let mut ctx = harness.backend("");

    let err = Dispatcher::dispatch_cli(&mut ctx, &["appvisor", "contacts", "purge"]).unwrap_err();

    assert_eq!(err.status(), 404);
    assert_eq!(err.to_string(), "command \"contacts purge\" not found");
}

#[test]
fn cli_unknown_app_is_reported() {
    let harness = cli_harness();
    let mut ctx = harness.backend("");

    let err = Dispatcher::dispatch_cli(&mut ctx, &["appvisor", "nope", "sync"]).unwrap_err();

    assert!(matches!(err, KernelError::UnknownApplication(id) if id == "nope"));
}

#[test]
fn cli_requires_app_and_command() {
    let harness = cli_harness();
    let mut ctx = harness.backend("");

    let err = Dispatcher::dispatch_cli(&mut ctx, &["appvisor", "contacts"]).unwrap_err();

    assert!(matches!(err, KernelError::MissingField(field) if field == "command"));
    assert!(harness.log().is_empty());
}
