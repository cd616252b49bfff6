//! Instrumented collaborators for tests.
//!
//! Each wraps its [`memory`](crate::memory) counterpart and records how the
//! kernel used it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::auth::ContactRecord;
use crate::error::StoreError;
use crate::memory::{MemoryContactStore, MemoryLocales};
use crate::traits::{ContactStore, LocaleSource};
use crate::types::ContactId;

/// Contact store that counts lookups, records touches in order and can be
/// switched to fail them.
#[derive(Debug, Default)]
pub struct MockContactStore {
    inner: MemoryContactStore,
    lookups: AtomicUsize,
    touched: RwLock<Vec<ContactId>>,
    fail_touch: AtomicBool,
}

impl MockContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ContactRecord) {
        self.inner.insert(record);
    }

    pub fn set_password(&self, id: ContactId, hash: impl Into<String>) {
        self.inner.set_password(id, hash);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Contacts whose last activity was recorded, in order.
    pub fn touched(&self) -> Vec<ContactId> {
        self.touched.read().clone()
    }

    /// Make `touch_last_active` fail from now on.
    pub fn fail_touches(&self) {
        self.fail_touch.store(true, Ordering::SeqCst);
    }

    fn lookup(&self) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
    }
}

impl ContactStore for MockContactStore {
    fn by_id(&self, id: ContactId) -> Result<Option<ContactRecord>, StoreError> {
        self.lookup();
        self.inner.by_id(id)
    }

    fn by_login(&self, login: &str) -> Result<Option<ContactRecord>, StoreError> {
        self.lookup();
        self.inner.by_login(login)
    }

    fn by_email(&self, email: &str) -> Result<Option<ContactRecord>, StoreError> {
        self.lookup();
        self.inner.by_email(email)
    }

    fn touch_last_active(&self, id: ContactId) -> Result<(), StoreError> {
        if self.fail_touch.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("contact store is read-only".into()));
        }
        self.inner.touch_last_active(id)?;
        self.touched.write().push(id);
        Ok(())
    }
}

/// Locale source that counts catalog loads.
#[derive(Debug, Default)]
pub struct MockLocales {
    inner: MemoryLocales,
    loads: AtomicUsize,
}

impl MockLocales {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locale: &str, domain: &str, msgid: &str, translation: &str) -> Self {
        Self {
            inner: self.inner.with(locale, domain, msgid, translation),
            ..self
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LocaleSource for MockLocales {
    fn load(&self, locale: &str, domain: &str) -> Option<HashMap<String, String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(locale, domain)
    }
}
