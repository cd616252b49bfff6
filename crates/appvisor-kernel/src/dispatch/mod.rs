//! Dispatcher - picks the one application instance that handles a request.
//!
//! Decision order for HTTP requests:
//!
//! 1. `sitemap[-<app>].xml` runs the application's sitemap generator
//! 2. `oauth.php` goes to the bootstrap login flow (`login`/`OAuth`)
//! 3. an unauthenticated backend caller gets the bootstrap login flow
//! 4. an application entry config is rights-gated in the backend, then
//!    handed to its own front controller
//! 5. the bootstrap entry config routes: the frontend through logout
//!    handling and the routing table, the backend by the second path
//!    segment
//!
//! Authorization failures at this boundary redirect to the backend root.
//! Errors raised further down are rendered by [`Dispatcher::dispatch`].

mod cli;

pub use cli::{parse_cli, CliArgs, CliInvocation};

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::http::Route;
use crate::types::{AppId, Environment, BOOTSTRAP_APP};

/// Path of the OAuth callback endpoint.
pub const OAUTH_ENDPOINT: &str = "oauth.php";

/// Query parameter signalling a frontend logout.
pub const LOGOUT_PARAM: &str = "logout";

static SITEMAP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^sitemap-?([a-z0-9_]+)?\.xml$").expect("sitemap pattern is valid")
});

/// Terminal outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The named application produced the response
    Handled { app: AppId },
    Redirected { location: String },
    NotFound { message: String },
    Failed { status: u16, message: String },
}

impl DispatchOutcome {
    pub fn handled_by(&self) -> Option<&AppId> {
        match self {
            DispatchOutcome::Handled { app } => Some(app),
            _ => None,
        }
    }
}

pub struct Dispatcher;

impl Dispatcher {
    /// Dispatch the context's request; every error ends up rendered into
    /// the response.
    pub fn dispatch(ctx: &mut Context) -> DispatchOutcome {
        match Self::route(ctx) {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Dispatch finished");
                outcome
            }
            Err(err) => Self::render_error(ctx, err),
        }
    }

    /// Render an error into the response. Foreign errors lose their
    /// message outside debug mode.
    pub fn render_error(ctx: &mut Context, err: KernelError) -> DispatchOutcome {
        let debug = ctx.kernel().config().debug;
        let status = err.status();
        let message = err.public_message(debug);

        if err.is_native() {
            warn!(status, error = %err, url = ctx.request().url(), "Dispatch failed");
        } else {
            error!(status, error = %err, url = ctx.request().url(), "Unexpected error during dispatch");
        }

        let response = ctx.response_mut();
        response.set_status(status);
        response.write(&message);

        if status == 404 {
            DispatchOutcome::NotFound { message }
        } else {
            DispatchOutcome::Failed { status, message }
        }
    }

    fn route(ctx: &mut Context) -> KernelResult<DispatchOutcome> {
        let path = ctx.request().path().to_string();

        if let Some(captures) = SITEMAP_PATTERN.captures(&path) {
            let app = captures
                .get(1)
                .map_or(BOOTSTRAP_APP, |m| m.as_str())
                .to_string();
            return Self::sitemap(ctx, &app);
        }

        if path.starts_with(OAUTH_ENDPOINT) {
            debug!("OAuth callback");
            return Self::bootstrap_execute(ctx, "login", Some("OAuth"));
        }

        let entry = ctx.entry()?;
        let environment = entry.environment();

        if environment == Environment::Backend && !ctx.is_authenticated()? {
            let action = ctx.request().query("action").map(str::to_string);
            debug!(action = ?action, "Unauthenticated backend request, running login");
            return Self::bootstrap_execute(ctx, "login", action.as_deref());
        }

        if let Some(app) = entry.config().app_id().cloned() {
            if environment == Environment::Backend && !Self::has_backend_rights(ctx, &app)? {
                return Ok(Self::redirect_to_backend(ctx));
            }
            let controller = ctx.front_controller(&entry)?;
            controller.dispatch(ctx, None)?;
            return Ok(DispatchOutcome::Handled { app });
        }

        let (app, route) = match environment {
            Environment::Frontend => {
                if ctx.request().query(LOGOUT_PARAM).is_some() {
                    ctx.clear_auth()?;
                    let location = ctx.request().url_without(LOGOUT_PARAM);
                    ctx.response_mut().redirect(location.clone());
                    info!(location = %location, "Logged out");
                    return Ok(DispatchOutcome::Redirected { location });
                }

                let Some(route) = ctx.kernel().routing().match_route(&path) else {
                    debug!(path = %path, "No frontend route matched");
                    return Ok(Self::redirect_to_backend(ctx));
                };
                let app = route
                    .app
                    .clone()
                    .unwrap_or_else(|| AppId::from(BOOTSTRAP_APP));
                Self::expose_route(ctx, &app, &route);

                if route.secure {
                    ctx.instance(app.as_str())?;
                    if !ctx.is_authenticated()? {
                        debug!(app = %app, "Secure route requires login");
                        ctx.login(app.as_str())?;
                        return Ok(DispatchOutcome::Handled { app });
                    }
                }
                (app, Some(route))
            }
            Environment::Backend => {
                ctx.instance(BOOTSTRAP_APP)?;
                (backend_target(&path), None)
            }
        };

        let instance = ctx.activate(app.as_str())?;
        if !app.is_bootstrap()
            && environment == Environment::Backend
            && !Self::has_backend_rights(ctx, &app)?
        {
            return Ok(Self::redirect_to_backend(ctx));
        }

        debug!(app = %app, environment = %environment, "Delegating to front controller");
        let controller = ctx.front_controller(&instance)?;
        controller.dispatch(ctx, route.as_ref())?;
        Ok(DispatchOutcome::Handled { app })
    }

    fn sitemap(ctx: &mut Context, app: &str) -> KernelResult<DispatchOutcome> {
        if ctx.app_exists(app)? {
            let generator = ctx
                .kernel()
                .application(app)
                .and_then(|application| application.sitemap().cloned());
            if let Some(generator) = generator {
                ctx.instance(app)?;
                generator.generate(ctx)?;
                return Ok(DispatchOutcome::Handled {
                    app: AppId::from(app),
                });
            }
        }
        Err(KernelError::not_found("Page not found"))
    }

    fn bootstrap_execute(
        ctx: &mut Context,
        module: &str,
        action: Option<&str>,
    ) -> KernelResult<DispatchOutcome> {
        let bootstrap = ctx.instance(BOOTSTRAP_APP)?;
        let controller = ctx.front_controller(&bootstrap)?;
        controller.execute(ctx, module, action)?;
        Ok(DispatchOutcome::Handled {
            app: AppId::from(BOOTSTRAP_APP),
        })
    }

    fn has_backend_rights(ctx: &Context, app: &AppId) -> KernelResult<bool> {
        let identity = ctx.user()?.identity();
        let allowed = ctx
            .kernel()
            .rights()
            .has_backend_rights(identity.as_ref(), app.as_str());
        if !allowed {
            warn!(app = %app, contact = ?identity.map(|i| i.id), "Backend access refused");
        }
        Ok(allowed)
    }

    fn redirect_to_backend(ctx: &mut Context) -> DispatchOutcome {
        let location = ctx.kernel().config().backend_root();
        ctx.response_mut().redirect(location.clone());
        DispatchOutcome::Redirected { location }
    }

    /// Make the matched route visible as request parameters.
    fn expose_route(ctx: &mut Context, app: &AppId, route: &Route) {
        let request = ctx.request_mut();
        for (name, value) in &route.params {
            request.set_param(name.clone(), value.clone());
        }
        request.set_param("app", Value::String(app.to_string()));
        if route.secure {
            request.set_param("secure", Value::Bool(true));
        }
    }
}

/// Target application of a backend URL: the second path segment, ignoring
/// the query string and `index.php`.
fn backend_target(path: &str) -> AppId {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    match path.split('/').nth(1) {
        Some(segment) if !segment.is_empty() && segment != "index.php" => AppId::from(segment),
        _ => AppId::from(BOOTSTRAP_APP),
    }
}
