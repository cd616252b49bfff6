//! Minimal request/response model consumed by the dispatcher and the auth
//! provider.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::AppId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// One inbound request. `url` is relative to the installation root, e.g.
/// `webasyst/contacts/?id=1` or `sitemap-blog.xml`.
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Method,
    url: String,
    query: IndexMap<String, String>,
    post: IndexMap<String, String>,
    cookies: HashMap<String, String>,
    params: IndexMap<String, Value>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        let url = url.into();
        let query = parse_query(&url);
        Self {
            method: Method::Get,
            url,
            query,
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn with_post(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.post.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL without its query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn post_field(&self, name: &str) -> Option<&str> {
        self.post.get(name).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn params(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    /// The request URL with `name` removed from its query string.
    pub fn url_without(&self, name: &str) -> String {
        let rest: Vec<String> = self
            .query
            .iter()
            .filter(|(key, _)| key.as_str() != name)
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect();

        let path = self.path();
        if rest.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, rest.join("&"))
        }
    }
}

fn parse_query(url: &str) -> IndexMap<String, String> {
    let Some((_, query)) = url.split_once('?') else {
        return IndexMap::new();
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// When a cookie stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieExpiry {
    /// Until the browser session ends
    Session,
    At(DateTime<Utc>),
    /// Delete on the client
    Expired,
}

impl CookieExpiry {
    /// `seconds` from now, saturating at the latest representable instant.
    pub fn after_seconds(seconds: u64) -> Self {
        let at = i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        CookieExpiry::At(at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub value: String,
    pub expiry: CookieExpiry,
}

/// Outbound side of one request.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    redirect: Option<String>,
    cookies: IndexMap<String, Cookie>,
    body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            redirect: None,
            cookies: IndexMap::new(),
            body: String::new(),
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn redirect(&mut self, location: impl Into<String>) {
        self.status = 302;
        self.redirect = Some(location.into());
    }

    pub fn location(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>, expiry: CookieExpiry) {
        self.cookies.insert(
            name.into(),
            Cookie {
                value: value.into(),
                expiry,
            },
        );
    }

    /// Empty the cookie and expire it on the client.
    pub fn delete_cookie(&mut self, name: impl Into<String>) {
        self.set_cookie(name, "", CookieExpiry::Expired);
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn cookies(&self) -> &IndexMap<String, Cookie> {
        &self.cookies
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn write(&mut self, text: &str) {
        self.body.push_str(text);
    }
}

/// Outcome of a frontend routing match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    /// Target application; the bootstrap application when absent
    pub app: Option<AppId>,
    /// Only authenticated users may proceed
    pub secure: bool,
    pub params: IndexMap<String, Value>,
}

impl Route {
    pub fn to(app: impl Into<AppId>) -> Self {
        Self {
            app: Some(app.into()),
            ..Default::default()
        }
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}
