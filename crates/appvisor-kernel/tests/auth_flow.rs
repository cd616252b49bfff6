//! Authentication across consecutive requests sharing one session.

mod common;

use appvisor_kernel::auth::{derive_token, REMEMBER_COOKIE, TOKEN_COOKIE};
use appvisor_kernel::*;
use common::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn login_form(login: &str, password: &str) -> Request {
    Request::post("webasyst/")
        .with_post("wa_auth_login", "1")
        .with_post("login", login)
        .with_post("password", password)
}

fn admin_token(password: &str) -> String {
    derive_token("admin", &hash(password), ADMIN_ID)
}

fn backend_with_token(harness: &Harness, token: &str) -> Context {
    harness.context(
        Environment::Backend,
        Request::get("webasyst/").with_cookie(TOKEN_COOKIE, token),
    )
}

// ---------------------------------------------------------------------------
// Login form and explicit credentials
// ---------------------------------------------------------------------------

#[test]
fn empty_form_login_is_rejected_before_any_lookup() {
    let harness = Fixture::new().build();
    let mut ctx = harness.context(Environment::Backend, login_form("", "whatever"));

    let err = ctx.authenticate(&AuthParams::none()).unwrap_err();

    assert!(matches!(err, KernelError::MissingField(field) if field == "login"));
    assert_eq!(harness.contacts.lookups(), 0);
    assert!(harness.signed_in().is_none());
}

#[test]
fn wrong_form_password_is_invalid_credentials() {
    let harness = Fixture::new().build();
    let mut ctx = harness.context(Environment::Backend, login_form("admin", "nope"));

    let err = ctx.authenticate(&AuthParams::none()).unwrap_err();

    assert!(matches!(err, KernelError::InvalidCredentials));
    assert_eq!(err.status(), 400);
    assert!(harness.signed_in().is_none());
}

#[test]
fn wrong_explicit_password_is_a_quiet_failure() {
    let harness = Fixture::new().build();
    let mut ctx = harness.backend("webasyst/");

    let identity = ctx
        .authenticate(&AuthParams::credentials("admin", "nope"))
        .unwrap();

    assert!(identity.is_none());
    assert!(harness.signed_in().is_none());
}

#[test]
fn form_login_binds_session_and_user() {
    let harness = Fixture::new().build();
    let mut ctx = harness.context(Environment::Backend, login_form("admin", ADMIN_PASSWORD));

    let identity = ctx.authenticate(&AuthParams::none()).unwrap().unwrap();

    assert_eq!(identity.id, ADMIN_ID);
    assert_eq!(
        harness.signed_in(),
        Some(json!({"id": ADMIN_ID, "login": "admin", "is_user": true}))
    );
    assert_eq!(ctx.user().unwrap().id(), Some(ADMIN_ID));
    assert!(ctx.is_authenticated().unwrap());
}

#[test]
fn remember_me_sets_token_and_marker_cookies() {
    let harness = Fixture::new().build();
    let request = login_form("admin", ADMIN_PASSWORD).with_post(REMEMBER_COOKIE, "1");
    let mut ctx = harness.context(Environment::Backend, request);

    ctx.authenticate(&AuthParams::none()).unwrap().unwrap();

    let token = ctx.response().cookie(TOKEN_COOKIE).unwrap();
    assert_eq!(token.value, admin_token(ADMIN_PASSWORD));
    assert!(matches!(token.expiry, CookieExpiry::At(_)));

    let marker = ctx.response().cookie(REMEMBER_COOKIE).unwrap();
    assert_eq!(marker.value, "1");
    assert_eq!(marker.expiry, CookieExpiry::Session);
}

#[test]
fn login_without_remember_me_drops_marker_cookie() {
    let harness = Fixture::new().build();
    let mut ctx = harness.context(Environment::Backend, login_form("admin", ADMIN_PASSWORD));

    ctx.authenticate(&AuthParams::none()).unwrap().unwrap();

    assert!(ctx.response().cookie(TOKEN_COOKIE).is_none());
    assert_eq!(
        ctx.response().cookie(REMEMBER_COOKIE).map(|c| c.expiry),
        Some(CookieExpiry::Expired)
    );
}

#[test]
fn email_login_when_configured() {
    let harness = Fixture::new()
        .configure(|config| config.auth.login = LoginField::Email)
        .build();
    let mut ctx = harness.backend("webasyst/");

    let by_email = ctx
        .authenticate(&AuthParams::credentials("admin@example.com", ADMIN_PASSWORD))
        .unwrap();
    assert_eq!(by_email.map(|identity| identity.id), Some(ADMIN_ID));

    let by_login = ctx
        .authenticate(&AuthParams::credentials("admin", ADMIN_PASSWORD))
        .unwrap();
    assert!(by_login.is_none());
}

// ---------------------------------------------------------------------------
// Users and non-users
// ---------------------------------------------------------------------------

#[test]
fn non_users_are_refused_by_default() {
    let harness = Fixture::new().build();
    let mut ctx = harness.backend("webasyst/");

    assert!(ctx
        .authenticate(&AuthParams::credentials("guest", "guest"))
        .unwrap()
        .is_none());
    assert!(ctx.authenticate(&AuthParams::by_id(GUEST_ID)).unwrap().is_none());
}

#[test]
fn auth_factory_options_admit_non_users() {
    let harness = Fixture::new()
        .configure(|config| {
            config.factories.insert(
                "auth".into(),
                FactorySpec::WithOptions("auth".into(), json!({"is_user": false})),
            );
        })
        .build();
    let mut ctx = harness.backend("webasyst/");

    let identity = ctx
        .authenticate(&AuthParams::credentials("guest", "guest"))
        .unwrap()
        .unwrap();

    assert_eq!(identity.id, GUEST_ID);
    assert!(!identity.is_user);
}

#[test]
fn id_authentication_drops_token_cookie() {
    let harness = Fixture::new().build();
    let mut ctx = harness.backend("webasyst/");

    let identity = ctx.authenticate(&AuthParams::by_id(ADMIN_ID)).unwrap();

    assert_eq!(identity.map(|identity| identity.id), Some(ADMIN_ID));
    assert_eq!(
        ctx.response().cookie(TOKEN_COOKIE).map(|c| c.expiry),
        Some(CookieExpiry::Expired)
    );
    assert!(harness.signed_in().is_some());
}

#[test]
fn contact_locale_follows_the_user() {
    let harness = Fixture::new().build();
    harness.contacts.insert(ContactRecord {
        id: 3,
        login: "ivan".into(),
        password: hash("pw"),
        is_user: true,
        email: None,
        locale: Some("ru_RU".into()),
    });
    let mut ctx = harness.backend("webasyst/");

    ctx.authenticate(&AuthParams::credentials("ivan", "pw"))
        .unwrap()
        .unwrap();
    let bootstrap = ctx.activate(BOOTSTRAP_APP).unwrap();

    assert_eq!(ctx.locale(), "ru_RU");
    assert_eq!(bootstrap.config().locale(), "ru_RU");
}

// ---------------------------------------------------------------------------
// Remember-me tokens
// ---------------------------------------------------------------------------

#[test]
fn token_authenticates_a_fresh_session_and_rolls_expiry() {
    let harness = Fixture::new().build();
    let token = admin_token(ADMIN_PASSWORD);
    let mut ctx = backend_with_token(&harness, &token);

    assert!(ctx.is_authenticated().unwrap());

    assert_eq!(
        harness.signed_in().and_then(|identity| identity["id"].as_u64()),
        Some(ADMIN_ID)
    );
    let cookie = ctx.response().cookie(TOKEN_COOKIE).unwrap();
    assert_eq!(cookie.value, token);
    assert!(matches!(cookie.expiry, CookieExpiry::At(_)));
}

#[test]
fn password_change_invalidates_token() {
    let harness = Fixture::new().build();
    let token = admin_token(ADMIN_PASSWORD);
    harness.contacts.set_password(ADMIN_ID, hash("rotated"));
    let mut ctx = backend_with_token(&harness, &token);

    assert!(!ctx.is_authenticated().unwrap());

    assert!(harness.signed_in().is_none());
    assert_eq!(
        ctx.response().cookie(TOKEN_COOKIE).map(|c| c.expiry),
        Some(CookieExpiry::Expired)
    );
}

#[test]
fn malformed_token_is_discarded() {
    let harness = Fixture::new().build();
    let mut ctx = backend_with_token(&harness, "garbage");

    assert!(!ctx.is_authenticated().unwrap());
    assert_eq!(
        ctx.response().cookie(TOKEN_COOKIE).map(|c| c.value.as_str()),
        Some("")
    );
}

#[test]
fn disabled_remember_me_ignores_tokens() {
    let harness = Fixture::new().build();
    harness.settings.set(BOOTSTRAP_APP, "rememberme", "0");
    let mut ctx = backend_with_token(&harness, &admin_token(ADMIN_PASSWORD));

    assert!(!ctx.is_authenticated().unwrap());
    assert!(ctx.response().cookie(TOKEN_COOKIE).is_none());
    assert_eq!(harness.contacts.lookups(), 0);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[test]
fn clear_auth_touches_user_and_destroys_session() {
    let harness = Fixture::new().build();
    let request = login_form("admin", ADMIN_PASSWORD).with_cookie(TOKEN_COOKIE, "stale");
    let mut ctx = harness.context(Environment::Backend, request);
    ctx.authenticate(&AuthParams::none()).unwrap().unwrap();
    harness.session.write("cart", json!([1, 2]));

    ctx.clear_auth().unwrap();

    assert!(harness.session.is_empty());
    assert_eq!(harness.contacts.touched(), [ADMIN_ID]);
    assert!(!ctx.user().unwrap().has_identity());
    assert_eq!(
        ctx.response().cookie(TOKEN_COOKIE).map(|c| c.expiry),
        Some(CookieExpiry::Expired)
    );
}

#[test]
fn clear_auth_survives_failing_activity_update() {
    let harness = Fixture::new().build();
    harness.contacts.fail_touches();
    let mut ctx = harness.backend("webasyst/");
    ctx.authenticate(&AuthParams::by_id(ADMIN_ID)).unwrap();

    ctx.clear_auth().unwrap();

    assert!(harness.session.is_empty());
    assert!(harness.contacts.touched().is_empty());
}

#[test]
fn clear_auth_leaves_absent_token_cookie_alone() {
    let harness = Fixture::new().build();
    harness.sign_in_admin();
    let mut ctx = harness.backend("webasyst/");

    ctx.clear_auth().unwrap();

    assert!(ctx.response().cookie(TOKEN_COOKIE).is_none());
    assert!(harness.signed_in().is_none());
}

#[test]
fn clear_auth_touches_user_known_only_from_session() {
    let harness = Fixture::new().build();
    harness.sign_in_admin();
    let mut ctx = harness.frontend("blog/");
    assert!(!ctx.user().unwrap().has_identity());

    ctx.clear_auth().unwrap();

    assert_eq!(harness.contacts.touched(), [ADMIN_ID]);
    assert!(harness.session.is_empty());
    assert!(!ctx.user().unwrap().has_identity());
}
