//! Standalone stand-in for the host's default loader.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::trace;
use url::Url;

use super::{Load, LoadContext, Loaded};
use crate::config::PackageJsonCache;
use crate::error::LoadError;
use crate::format::ModuleFormat;
use crate::session::Session;

/// Reads `file:` URLs from disk. `node:` builtins have no source: the host
/// synthesizes them.
pub struct FsLoader {
    packages: Arc<PackageJsonCache>,
}

impl FsLoader {
    pub fn new(session: &Session) -> Self {
        FsLoader {
            packages: Arc::clone(&session.packages),
        }
    }

    fn host_format(&self, path: &Path) -> Result<Option<ModuleFormat>, LoadError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("mjs") => Some(ModuleFormat::Module),
            Some("cjs") => Some(ModuleFormat::Script),
            Some("json") => Some(ModuleFormat::Json),
            Some("wasm") => Some(ModuleFormat::Wasm),
            Some("js") => Some(self.packages.package_type(path)?),
            _ => None,
        };
        Ok(format)
    }
}

impl Load for FsLoader {
    fn load(&self, url: &Url, context: &LoadContext) -> Result<Loaded, LoadError> {
        match url.scheme() {
            "node" => Ok(Loaded {
                format: Some(ModuleFormat::Builtin),
                source: None,
            }),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| LoadError::UnsupportedUrl { url: url.clone() })?;
                trace!(path = %path.display(), "reading module source");
                let source = fs::read(&path).map_err(|source| LoadError::Read {
                    path: path.clone(),
                    source,
                })?;
                let format = match context.format {
                    Some(format) => Some(format),
                    None => self.host_format(&path)?,
                };
                Ok(Loaded {
                    format,
                    source: Some(source),
                })
            }
            _ => Err(LoadError::UnsupportedUrl { url: url.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::HostCapabilities;
    use crate::config::ProjectRegistry;
    use tempfile::TempDir;

    fn loader(root: &Path) -> FsLoader {
        let session = Session::with_parts(root, HostCapabilities::default(), ProjectRegistry::empty());
        FsLoader::new(&session)
    }

    #[test]
    fn test_reads_file_with_host_format() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "type": "module" }"#).unwrap();
        fs::write(dir.path().join("a.js"), "export default 1;").unwrap();
        fs::write(dir.path().join("b.cjs"), "module.exports = 1;").unwrap();

        let loader = loader(dir.path());
        let url = Url::from_file_path(dir.path().join("a.js")).unwrap();
        let loaded = loader.load(&url, &LoadContext::default()).unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::Module));
        assert_eq!(loaded.source.as_deref(), Some(b"export default 1;".as_slice()));

        let url = Url::from_file_path(dir.path().join("b.cjs")).unwrap();
        let loaded = loader.load(&url, &LoadContext::default()).unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::Script));
    }

    #[test]
    fn test_context_format_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export {};").unwrap();

        let url = Url::from_file_path(dir.path().join("a.ts")).unwrap();
        let context = LoadContext::with_format(ModuleFormat::Module);
        let loaded = loader(dir.path()).load(&url, &context).unwrap();
        assert_eq!(loaded.format, Some(ModuleFormat::Module));

        let loaded = loader(dir.path()).load(&url, &LoadContext::default()).unwrap();
        assert_eq!(loaded.format, None);
    }

    #[test]
    fn test_builtin_has_no_source() {
        let dir = TempDir::new().unwrap();
        let url = Url::parse("node:fs").unwrap();
        let loaded = loader(dir.path()).load(&url, &LoadContext::default()).unwrap();
        assert!(loaded.source.is_none());
    }

    #[test]
    fn test_missing_file_and_foreign_scheme() {
        let dir = TempDir::new().unwrap();
        let loader = loader(dir.path());

        let url = Url::from_file_path(dir.path().join("missing.js")).unwrap();
        assert!(matches!(
            loader.load(&url, &LoadContext::default()),
            Err(LoadError::Read { .. })
        ));

        let url = Url::parse("https://example.com/a.js").unwrap();
        assert!(matches!(
            loader.load(&url, &LoadContext::default()),
            Err(LoadError::UnsupportedUrl { .. })
        ));
    }
}
