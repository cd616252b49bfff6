use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    derive_token, token_contact_id, AuthParams, AuthenticatedIdentity, ContactRecord,
    AUTH_USER_KEY, LOGIN_FORM_FIELD, REMEMBER_COOKIE, TOKEN_COOKIE,
};
use crate::config::{AuthOptions, LoginField};
use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::http::CookieExpiry;
use crate::types::BOOTSTRAP_APP;

/// Stateless authentication protocol against the contact store.
#[derive(Debug, Clone, Default)]
pub struct AuthProvider {
    options: AuthOptions,
}

/// Where a login/password pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialSource {
    Params,
    Form,
}

impl AuthProvider {
    pub fn new(options: AuthOptions) -> Self {
        Self { options }
    }

    /// Build from factory options layered over `base`.
    pub fn from_options(base: &AuthOptions, options: &Value) -> KernelResult<Self> {
        let mut merged = serde_json::to_value(base)?;
        if let (Value::Object(target), Value::Object(overrides)) = (&mut merged, options) {
            for (key, value) in overrides {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(Self::new(serde_json::from_value(merged)?))
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    /// Authenticate and, on success, bind the identity to the session and
    /// re-initialize the current user.
    pub fn auth(
        &self,
        ctx: &mut Context,
        params: &AuthParams,
    ) -> KernelResult<Option<AuthenticatedIdentity>> {
        let identity = self.authenticate(ctx, params)?;
        if let Some(identity) = &identity {
            bind_session(ctx, identity)?;
        }
        Ok(identity)
    }

    /// Authenticate from the remember-me cookie alone.
    pub fn auth_by_token(&self, ctx: &mut Context) -> KernelResult<Option<AuthenticatedIdentity>> {
        let identity = self.by_token(ctx)?;
        if let Some(identity) = &identity {
            bind_session(ctx, identity)?;
        }
        Ok(identity)
    }

    /// Run the four authentication paths in order without touching the
    /// session.
    ///
    /// Only a submitted login form can fail; every other unsuccessful
    /// attempt yields `Ok(None)`.
    pub fn authenticate(
        &self,
        ctx: &mut Context,
        params: &AuthParams,
    ) -> KernelResult<Option<AuthenticatedIdentity>> {
        if let Some(id) = params.id {
            return self.by_id(ctx, id);
        }

        let credentials = match (&params.login, &params.password) {
            (Some(login), Some(password)) => {
                Some((login.clone(), password.clone(), CredentialSource::Params))
            }
            _ if self.form_submitted(ctx) => {
                let request = ctx.request();
                let login = request.post_field("login").unwrap_or_default().to_string();
                if login.is_empty() {
                    return Err(KernelError::MissingField("login".into()));
                }
                let password = request.post_field("password").unwrap_or_default().to_string();
                Some((login, password, CredentialSource::Form))
            }
            _ => None,
        };

        match credentials {
            Some((login, password, source)) if !login.is_empty() => {
                self.by_password(ctx, &login, &password, source)
            }
            _ => self.by_token(ctx),
        }
    }

    /// The remember-me token for a contact's current credentials.
    pub fn token(&self, record: &ContactRecord) -> String {
        derive_token(&record.login, &record.password, record.id)
    }

    /// Whether the session holds an authenticated identity.
    pub fn is_auth(&self, ctx: &Context) -> KernelResult<bool> {
        Ok(ctx.session()?.read(AUTH_USER_KEY).is_some())
    }

    /// Log out: touch the user's last activity (best effort), destroy the
    /// whole session and drop the token cookie if the caller sent one.
    pub fn clear_auth(&self, ctx: &mut Context) -> KernelResult<()> {
        let user = ctx.user()?;
        let session = ctx.session()?;
        if !user.has_identity() {
            user.init(session.as_ref());
        }
        let contact = user.id();
        if let Err(err) = user.update_last_time() {
            warn!(error = %err, "Failed to update last activity on logout");
        }
        session.destroy();
        user.clear();

        if ctx.request().cookie(TOKEN_COOKIE).is_some() {
            ctx.response_mut().delete_cookie(TOKEN_COOKIE);
        }
        info!(contact = ?contact, "Authentication cleared");
        Ok(())
    }

    fn form_submitted(&self, ctx: &Context) -> bool {
        let request = ctx.request();
        request.is_post()
            && request
                .post_field(LOGIN_FORM_FIELD)
                .is_some_and(|v| !v.is_empty())
    }

    fn accepts(&self, record: &ContactRecord) -> bool {
        record.is_user || !self.options.is_user
    }

    fn by_id(&self, ctx: &mut Context, id: u64) -> KernelResult<Option<AuthenticatedIdentity>> {
        let record = ctx.kernel().contacts().by_id(id)?;
        match record.filter(|r| self.accepts(r)) {
            Some(record) => {
                ctx.response_mut().delete_cookie(TOKEN_COOKIE);
                debug!(contact = id, "Authenticated by id");
                Ok(Some(record.identity()))
            }
            None => Ok(None),
        }
    }

    fn by_password(
        &self,
        ctx: &mut Context,
        login: &str,
        password: &str,
        source: CredentialSource,
    ) -> KernelResult<Option<AuthenticatedIdentity>> {
        let contacts = ctx.kernel().contacts().clone();
        let record = match self.options.login {
            LoginField::Login => contacts.by_login(login)?,
            LoginField::Email => contacts.by_email(login)?,
        };
        let user = ctx.user()?;

        let record = match record {
            Some(record) if self.accepts(&record) && user.password_hash(password) == record.password => record,
            _ => {
                warn!(login, "Password authentication failed");
                return match source {
                    CredentialSource::Form => Err(KernelError::InvalidCredentials),
                    CredentialSource::Params => Ok(None),
                };
            }
        };

        let remember = ctx
            .request()
            .post_field(REMEMBER_COOKIE)
            .is_some_and(|v| !v.is_empty() && v != "0");
        let expiry = CookieExpiry::after_seconds(self.options.cookie_expire);
        let token = self.token(&record);
        let response = ctx.response_mut();
        if remember {
            response.set_cookie(TOKEN_COOKIE, token, expiry);
            response.set_cookie(REMEMBER_COOKIE, "1", CookieExpiry::Session);
            info!(contact = record.id, "Remember-me token minted");
        } else {
            response.delete_cookie(REMEMBER_COOKIE);
        }

        info!(contact = record.id, login = %record.login, "Password login succeeded");
        Ok(Some(record.identity()))
    }

    fn by_token(&self, ctx: &mut Context) -> KernelResult<Option<AuthenticatedIdentity>> {
        let Some(token) = ctx.request().cookie(TOKEN_COOKIE).map(str::to_string) else {
            return Ok(None);
        };
        if !self.remember_enabled(ctx) {
            return Ok(None);
        }

        let record = match token_contact_id(&token) {
            Some(id) => ctx.kernel().contacts().by_id(id)?,
            None => None,
        };

        match record {
            Some(record) if self.accepts(&record) && self.token(&record) == token => {
                let expiry = CookieExpiry::after_seconds(self.options.cookie_expire);
                ctx.response_mut().set_cookie(TOKEN_COOKIE, token, expiry);
                debug!(contact = record.id, "Authenticated by remember-me token");
                Ok(Some(record.identity()))
            }
            _ => {
                warn!("Remember-me token rejected, clearing cookie");
                ctx.response_mut().delete_cookie(TOKEN_COOKIE);
                Ok(None)
            }
        }
    }

    fn remember_enabled(&self, ctx: &Context) -> bool {
        ctx.kernel()
            .settings()
            .get(BOOTSTRAP_APP, "rememberme")
            .map_or(true, |value| !value.is_empty() && value != "0")
    }
}

fn bind_session(ctx: &mut Context, identity: &AuthenticatedIdentity) -> KernelResult<()> {
    let session = ctx.session()?;
    session.write(AUTH_USER_KEY, serde_json::to_value(identity)?);
    ctx.user()?.init(session.as_ref());
    Ok(())
}
