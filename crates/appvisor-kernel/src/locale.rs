//! Per-request translation catalogs, loaded lazily by domain.

use std::collections::HashMap;

use tracing::debug;

use crate::traits::LocaleSource;

/// Loaded catalogs for one locale.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    locale: String,
    domains: HashMap<String, HashMap<String, String>>,
}

impl Translations {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            domains: HashMap::new(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Switch locale; catalogs of the previous locale are dropped.
    pub fn set_locale(&mut self, locale: &str) {
        if self.locale != locale {
            self.locale = locale.to_string();
            self.domains.clear();
        }
    }

    pub fn is_loaded(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Load `domain` on first use. A domain without a catalog is remembered
    /// as empty so the source is asked only once.
    pub fn ensure_loaded(&mut self, source: &dyn LocaleSource, domain: &str) {
        if self.is_loaded(domain) {
            return;
        }
        let catalog = source.load(&self.locale, domain).unwrap_or_default();
        debug!(locale = %self.locale, domain, messages = catalog.len(), "Locale domain loaded");
        self.domains.insert(domain.to_string(), catalog);
    }

    /// Translation of `msgid` in `domain`, or `msgid` itself.
    pub fn translate(&self, domain: &str, msgid: &str) -> String {
        self.domains
            .get(domain)
            .and_then(|catalog| catalog.get(msgid))
            .cloned()
            .unwrap_or_else(|| msgid.to_string())
    }
}
