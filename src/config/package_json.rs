use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::trace;

use crate::error::ConfigError;
use crate::format::ModuleFormat;

/// Parsed package.json files and the package types derived from them.
///
/// Entries are filled on first access and never invalidated. A missing
/// manifest is cached as `None` so the filesystem is only asked once.
#[derive(Debug, Default)]
pub struct PackageJsonCache {
    manifests: Mutex<HashMap<PathBuf, Option<Arc<Value>>>>,
    types: Mutex<HashMap<PathBuf, ModuleFormat>>,
}

impl PackageJsonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a package.json, or `None` when the file does not exist.
    pub fn read(&self, manifest: &Path) -> Result<Option<Arc<Value>>, ConfigError> {
        if let Some(cached) = self.lock_manifests().get(manifest) {
            return Ok(cached.clone());
        }

        let parsed = match std::fs::read_to_string(manifest) {
            Ok(content) => {
                let value: Value =
                    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                        path: manifest.to_path_buf(),
                        source,
                    })?;
                Some(Arc::new(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: manifest.to_path_buf(),
                    source,
                })
            }
        };

        trace!(manifest = %manifest.display(), found = parsed.is_some(), "package.json cached");
        self.lock_manifests()
            .insert(manifest.to_path_buf(), parsed.clone());
        Ok(parsed)
    }

    /// The nearest package.json at or above `dir`, stopping at a `node_modules` directory.
    pub fn find_nearest(&self, dir: &Path) -> Result<Option<(PathBuf, Arc<Value>)>, ConfigError> {
        for ancestor in dir.ancestors() {
            if ancestor.file_name().is_some_and(|n| n == "node_modules") {
                return Ok(None);
            }
            let manifest = ancestor.join("package.json");
            if let Some(value) = self.read(&manifest)? {
                return Ok(Some((manifest, value)));
            }
        }
        Ok(None)
    }

    /// The declared default format of the package enclosing `file`.
    ///
    /// `"type": "module"` gives [`ModuleFormat::Module`]; anything else,
    /// including no enclosing package, gives [`ModuleFormat::Script`].
    pub fn package_type(&self, file: &Path) -> Result<ModuleFormat, ConfigError> {
        let dir = file.parent().unwrap_or(file);

        let Some((manifest, value)) = self.find_nearest(dir)? else {
            return Ok(ModuleFormat::Script);
        };
        let boundary = manifest.parent().unwrap_or(dir).to_path_buf();

        if let Some(cached) = self.lock_types().get(&boundary) {
            return Ok(*cached);
        }

        let format = match value.get("type").and_then(|t| t.as_str()) {
            Some("module") => ModuleFormat::Module,
            _ => ModuleFormat::Script,
        };
        self.lock_types().insert(boundary, format);
        Ok(format)
    }

    fn lock_manifests(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Option<Arc<Value>>>> {
        self.manifests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_types(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, ModuleFormat>> {
        self.types.lock().unwrap_or_else(|e| e.into_inner())
    }
}
