//! Installed-applications catalog and its on-disk cache.
//!
//! The catalog is derived from a [`ManifestSource`] and cached per locale at
//! `<cache>/config/apps.<locale>.json`. A cache file older than the source
//! manifest is stale and gets regenerated. Concurrent regeneration by
//! several processes is tolerated: the artifact is derived deterministically
//! and every writer replaces it atomically, so the last writer wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::traits::{LocaleSource, ManifestSource};
use crate::types::{AppId, BOOTSTRAP_APP};

/// Version reported for applications that declare none.
pub const DEFAULT_VERSION: &str = "0.0.1";

/// Directory holding installed applications, relative to the root.
pub const APPS_DIR: &str = "wa-apps";

/// Derived metadata of one installed application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub id: AppId,
    /// Display name in the catalog's locale
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub build: u64,
    /// Icon path relative to the root
    pub img: String,
    /// Remaining metadata, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppInfo {
    /// `version` (default `0.0.1`) followed by `.build` when the build is
    /// non-zero.
    pub fn full_version(&self) -> String {
        let version = self.version.as_deref().unwrap_or(DEFAULT_VERSION);
        if self.build != 0 {
            format!("{}.{}", version, self.build)
        } else {
            version.to_string()
        }
    }
}

/// Installed applications in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppCatalog {
    apps: IndexMap<AppId, AppInfo>,
}

impl AppCatalog {
    pub fn get(&self, id: &str) -> Option<&AppInfo> {
        self.apps.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.apps.contains_key(id)
    }

    /// Installed applications; the bootstrap application only when
    /// `include_system` is set.
    pub fn installed(&self, include_system: bool) -> impl Iterator<Item = &AppInfo> {
        self.apps
            .values()
            .filter(move |info| include_system || !info.id.is_bootstrap())
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl FromIterator<AppInfo> for AppCatalog {
    fn from_iter<I: IntoIterator<Item = AppInfo>>(iter: I) -> Self {
        Self {
            apps: iter.into_iter().map(|info| (info.id.clone(), info)).collect(),
        }
    }
}

/// Manifest stored as JSON files under the installation root:
///
/// - `<manifest>`: `{"<app>": true|false, ...}`
/// - `wa-apps/<app>/lib/config/app.json`: application metadata
/// - `wa-apps/<app>/lib/config/build.json`: build number
#[derive(Debug, Clone)]
pub struct FileManifestSource {
    root: PathBuf,
    manifest: PathBuf,
}

impl FileManifestSource {
    pub fn new(root: impl Into<PathBuf>, manifest_path: impl AsRef<Path>) -> Self {
        let root = root.into();
        Self {
            manifest: root.join(manifest_path),
            root,
        }
    }

    fn app_file(&self, app: &AppId, name: &str) -> PathBuf {
        self.root
            .join(APPS_DIR)
            .join(app.as_str())
            .join("lib/config")
            .join(name)
    }

    fn read_optional(path: &Path) -> KernelResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl ManifestSource for FileManifestSource {
    fn modified(&self) -> KernelResult<SystemTime> {
        fs::metadata(&self.manifest)
            .and_then(|meta| meta.modified())
            .map_err(|_| KernelError::Manifest(format!("{} not found", self.manifest.display())))
    }

    fn enabled_apps(&self) -> KernelResult<IndexMap<AppId, bool>> {
        let text = fs::read_to_string(&self.manifest)
            .map_err(|_| KernelError::Manifest(format!("{} not found", self.manifest.display())))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn app_config(&self, app: &AppId) -> KernelResult<Option<Map<String, Value>>> {
        match Self::read_optional(&self.app_file(app, "app.json"))? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn build(&self, app: &AppId) -> KernelResult<Option<u64>> {
        match Self::read_optional(&self.app_file(app, "build.json"))? {
            Some(text) => Ok(Some(serde_json::from_str(text.trim())?)),
            None => Ok(None),
        }
    }
}

/// Locale-keyed cache of the derived [`AppCatalog`].
#[derive(Debug, Clone)]
pub struct ManifestCache {
    dir: Option<PathBuf>,
    debug: bool,
}

impl ManifestCache {
    /// Cache files under `dir`.
    pub fn on_disk(dir: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            dir: Some(dir.into()),
            debug,
        }
    }

    /// No persistence; every load regenerates.
    pub fn in_memory(debug: bool) -> Self {
        Self { dir: None, debug }
    }

    pub fn path(&self, locale: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join("config").join(format!("apps.{locale}.json")))
    }

    /// The catalog for `locale`, regenerated when the cache is missing or
    /// older than the source manifest. Debug mode always regenerates but
    /// only rewrites a stale cache.
    pub fn load(
        &self,
        source: &dyn ManifestSource,
        locales: &dyn LocaleSource,
        locale: &str,
    ) -> KernelResult<AppCatalog> {
        let source_modified = source.modified()?;
        let path = self.path(locale);
        let cached_modified = path
            .as_deref()
            .and_then(|p| fs::metadata(p).and_then(|meta| meta.modified()).ok());
        let mut stale = cached_modified.map_or(true, |modified| modified < source_modified);

        if !stale && !self.debug {
            if let Some(path) = &path {
                match read_catalog(path) {
                    Ok(catalog) => {
                        debug!(path = %path.display(), apps = catalog.len(), "Manifest cache hit");
                        return Ok(catalog);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Manifest cache unreadable, rebuilding");
                        stale = true;
                    }
                }
            }
        }

        let catalog = regenerate(source, locales, locale, self.debug)?;
        if stale {
            if let Some(path) = &path {
                match write_atomic(path, &catalog) {
                    Ok(()) => {
                        info!(path = %path.display(), apps = catalog.len(), "Manifest cache written")
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Failed to write manifest cache")
                    }
                }
            }
        }
        Ok(catalog)
    }
}

fn read_catalog(path: &Path) -> KernelResult<AppCatalog> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Write through a temp file private to this writer, then rename over the
/// cache. Concurrent writers never share a temp file; the last rename wins.
fn write_atomic(path: &Path, catalog: &AppCatalog) -> KernelResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, catalog)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Derive the catalog from the source manifest.
fn regenerate(
    source: &dyn ManifestSource,
    locales: &dyn LocaleSource,
    locale: &str,
    debug: bool,
) -> KernelResult<AppCatalog> {
    let mut enabled = source.enabled_apps()?;
    enabled.insert(AppId::from(BOOTSTRAP_APP), true);

    let mut apps = Vec::with_capacity(enabled.len());
    for (id, on) in enabled {
        if !on {
            continue;
        }
        let Some(mut config) = source.app_config(&id)? else {
            debug!(app = %id, "Application ships no metadata, skipping");
            continue;
        };

        let build = match source.build(&id)? {
            Some(build) => build,
            None if debug => u64::try_from(Utc::now().timestamp()).unwrap_or_default(),
            None => 0,
        };
        let raw_name = match config.remove("name") {
            Some(Value::String(name)) => name,
            _ => id.to_string(),
        };
        let name = locales
            .load(locale, id.as_str())
            .and_then(|catalog| catalog.get(&raw_name).cloned())
            .unwrap_or(raw_name);
        let img = match config.remove("img") {
            Some(Value::String(img)) => format!("{APPS_DIR}/{id}/{img}"),
            _ => format!("{APPS_DIR}/{id}/img/{id}.png"),
        };
        let version = match config.remove("version") {
            Some(Value::String(version)) => Some(version),
            Some(Value::Number(version)) => Some(version.to_string()),
            _ => None,
        };
        config.remove("id");
        config.remove("build");

        apps.push(AppInfo {
            id,
            name,
            version,
            build,
            img,
            extra: config,
        });
    }

    Ok(apps.into_iter().collect())
}
