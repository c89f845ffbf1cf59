use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::{ResolveError, ResolveErrorKind};
use crate::format::{self, ModuleFormat};
use crate::session::Session;
use crate::specifier::{is_explicit_directory, source_alternates, strip_node_prefix};

pub mod exports;
pub mod host;
pub mod mapping;
pub mod probe;

pub use host::NodeResolver;
pub use probe::EXTENSIONS;

/// Where a specifier is being resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveContext {
    /// The referencing module, or `None` for the entry point.
    pub parent_url: Option<Url>,
    /// Active export/import condition names, in priority order.
    pub conditions: Vec<String>,
}

impl Default for ResolveContext {
    fn default() -> Self {
        ResolveContext {
            parent_url: None,
            conditions: vec!["node".to_string(), "import".to_string()],
        }
    }
}

impl ResolveContext {
    pub fn from_parent(parent_url: Url) -> Self {
        ResolveContext {
            parent_url: Some(parent_url),
            ..Self::default()
        }
    }

    /// Resolve from a file path rather than a URL.
    pub fn from_parent_path(path: &Path) -> Self {
        ResolveContext {
            parent_url: Url::from_file_path(path).ok(),
            ..Self::default()
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    fn parent_path(&self) -> Option<PathBuf> {
        self.parent_url
            .as_ref()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
    }

    fn parent_is_source(&self) -> bool {
        self.parent_url
            .as_ref()
            .is_some_and(|u| format::is_source_path(u.path()))
    }
}

/// A resolved location and the format it will be loaded as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub url: Url,
    /// May be `None` coming out of a host resolver; never `None` out of [`ShimResolver`].
    pub format: Option<ModuleFormat>,
}

impl ResolvedTarget {
    pub fn new(url: Url, format: Option<ModuleFormat>) -> Self {
        ResolvedTarget { url, format }
    }
}

/// A resolve hook. The shim both consumes and provides this, so stages chain.
pub trait Resolve: Send + Sync {
    fn resolve(&self, specifier: &str, context: &ResolveContext)
        -> Result<ResolvedTarget, ResolveError>;
}

impl<T: Resolve + ?Sized> Resolve for Box<T> {
    fn resolve(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        (**self).resolve(specifier, context)
    }
}

impl<T: Resolve + ?Sized> Resolve for Arc<T> {
    fn resolve(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        (**self).resolve(specifier, context)
    }
}

/// Whether the directory and extension fallbacks may run after the next
/// resolver fails.
///
/// Probes re-enter resolution with `Nested` so a probe candidate never
/// probes again. Prefix stripping, path mapping and source-priority retry
/// still run on nested attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Allowed,
    Nested,
}

/// Resolve hook adding path mapping, source-extension priority, extension
/// and directory probing, and format inference on top of a host resolver.
pub struct ShimResolver<R> {
    next: R,
    session: Arc<Session>,
}

impl<R: Resolve> ShimResolver<R> {
    pub fn new(next: R, session: Arc<Session>) -> Self {
        ShimResolver { next, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn resolve_with(
        &self,
        specifier: &str,
        context: &ResolveContext,
        fallback: Fallback,
    ) -> Result<ResolvedTarget, ResolveError> {
        let specifier = strip_node_prefix(specifier, &self.session.capabilities);
        let specifier = specifier.as_ref();
        trace!(specifier, ?fallback, "resolving");

        if is_explicit_directory(specifier) {
            return self.probe_directory(specifier, context);
        }

        if let Some(target) = self.resolve_mapped(specifier, context)? {
            return Ok(target);
        }

        if let Some(target) = self.resolve_source_priority(specifier, context)? {
            return Ok(target);
        }

        let err = match self.next.resolve(specifier, context) {
            Ok(target) => return self.finalize(target),
            Err(err) => err,
        };

        if fallback == Fallback::Nested {
            return Err(err);
        }

        match err.kind() {
            ResolveErrorKind::UnsupportedDirectory => {
                debug!(specifier, "directory import, probing index files");
                match self.probe_directory(specifier, context) {
                    Ok(target) => Ok(target),
                    Err(nested) if nested.kind() == ResolveErrorKind::ImportNotDefined => Err(err),
                    Err(nested) => Err(nested),
                }
            }
            ResolveErrorKind::NotFound => {
                debug!(specifier, "not found, probing extensions");
                self.probe_extensions(specifier, context)
            }
            _ => Err(err),
        }
    }

    /// From a source-file parent, try `x.ts` before `x.js` (and the other
    /// compiled/source pairs). Not-found class errors fall through to the
    /// literal specifier; anything else propagates.
    fn resolve_source_priority(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<Option<ResolvedTarget>, ResolveError> {
        if !context.parent_is_source() {
            return Ok(None);
        }

        for alternate in source_alternates(specifier) {
            match self.resolve_with(&alternate, context, Fallback::Nested) {
                Ok(target) => {
                    trace!(specifier, alternate = %alternate, "source extension preferred");
                    return Ok(Some(target));
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ResolveErrorKind::NotFound | ResolveErrorKind::PathNotExported
                    ) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Fill in a missing format: extension first, then the package type for
    /// files, `dynamic` for anything not file-backed.
    fn finalize(&self, target: ResolvedTarget) -> Result<ResolvedTarget, ResolveError> {
        if target.format.is_some() {
            return Ok(target);
        }

        let format = if target.url.scheme() == "file" {
            match format::classify(target.url.path()) {
                Some(format) => format,
                None => match target.url.to_file_path() {
                    Ok(path) => self.session.packages.package_type(&path)?,
                    Err(()) => ModuleFormat::Script,
                },
            }
        } else {
            ModuleFormat::Dynamic
        };

        Ok(ResolvedTarget {
            format: Some(format),
            ..target
        })
    }
}

impl<R: Resolve> Resolve for ShimResolver<R> {
    fn resolve(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let result = self
            .resolve_with(specifier, context, Fallback::Allowed)
            .map_err(|err| err.with_specifier(specifier));

        match &result {
            Ok(target) => debug!(
                specifier,
                url = %target.url,
                format = ?target.format,
                "resolved"
            ),
            Err(err) => debug!(specifier, error = %err, "resolution failed"),
        }
        result
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                // Only pop if there's a normal component to pop
                if components
                    .last()
                    .is_some_and(|c| matches!(c, std::path::Component::Normal(_)))
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            std::path::Component::CurDir => {}
            other => {
                components.push(other);
            }
        }
    }
    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::HostCapabilities;
    use crate::config::ProjectRegistry;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// A next resolver that records what it was asked and only knows a fixed
    /// set of files, builtins and directories.
    struct Recorder {
        files: Vec<PathBuf>,
        dirs: Vec<PathBuf>,
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(files: &[&str], dirs: &[&str]) -> Self {
            Recorder {
                files: files.iter().map(PathBuf::from).collect(),
                dirs: dirs.iter().map(PathBuf::from).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Resolve for Recorder {
        fn resolve(
            &self,
            specifier: &str,
            context: &ResolveContext,
        ) -> Result<ResolvedTarget, ResolveError> {
            self.calls.lock().unwrap().push(specifier.to_string());
            if specifier == "fs" || specifier == "node:fs" {
                return Ok(ResolvedTarget::new(
                    Url::parse("node:fs").unwrap(),
                    Some(ModuleFormat::Builtin),
                ));
            }
            let base = context
                .parent_url
                .clone()
                .unwrap_or_else(|| Url::parse("file:///virtual/").unwrap());
            let url = base
                .join(specifier)
                .map_err(|_| ResolveError::not_found(specifier, None))?;
            let path = url.to_file_path().unwrap();
            if self.dirs.contains(&path) {
                return Err(ResolveError::UnsupportedDirectory {
                    specifier: specifier.to_string(),
                    attempted: specifier.to_string(),
                    parent: context.parent_url.clone(),
                });
            }
            if self.files.contains(&path) {
                return Ok(ResolvedTarget::new(url, None));
            }
            Err(ResolveError::not_found(specifier, context.parent_url.as_ref()))
        }
    }

    fn shim(next: Recorder, capabilities: HostCapabilities) -> ShimResolver<Recorder> {
        let session = Session::with_parts("/virtual", capabilities, ProjectRegistry::empty());
        ShimResolver::new(next, Arc::new(session))
    }

    fn from(path: &str) -> ResolveContext {
        ResolveContext::from_parent(Url::from_file_path(path).unwrap())
    }

    // ---------------------------------------------------------------
    // Orchestration order
    // ---------------------------------------------------------------

    #[test]
    fn test_source_priority_from_ts_parent() {
        let next = Recorder::new(&["/virtual/lib/index.ts", "/virtual/lib/index.js"], &[]);
        let resolver = shim(next, HostCapabilities::default());

        let target = resolver.resolve("./lib/index.js", &from("/virtual/app.ts")).unwrap();
        assert_eq!(target.url.path(), "/virtual/lib/index.ts");
        assert_eq!(resolver.next.calls(), vec!["./lib/index.ts"]);
    }

    #[test]
    fn test_no_source_priority_from_js_parent() {
        let next = Recorder::new(&["/virtual/lib/index.ts", "/virtual/lib/index.js"], &[]);
        let resolver = shim(next, HostCapabilities::default());

        let target = resolver.resolve("./lib/index.js", &from("/virtual/app.js")).unwrap();
        assert_eq!(target.url.path(), "/virtual/lib/index.js");
    }

    #[test]
    fn test_extensionless_prefers_source_from_ts_parent() {
        let next = Recorder::new(&["/virtual/lib/index.ts", "/virtual/lib/index.js"], &[]);
        let resolver = shim(next, HostCapabilities::default());

        let target = resolver.resolve("./lib/index", &from("/virtual/app.ts")).unwrap();
        assert_eq!(target.url.path(), "/virtual/lib/index.ts");
    }

    #[test]
    fn test_extension_probe_order() {
        let next = Recorder::new(&["/virtual/x.jsx"], &[]);
        let resolver = shim(next, HostCapabilities::default());

        resolver.resolve("./x", &from("/virtual/app.js")).unwrap();
        assert_eq!(
            resolver.next.calls(),
            vec!["./x", "./x.js", "./x.json", "./x.ts", "./x.tsx", "./x.jsx"]
        );
    }

    #[test]
    fn test_explicit_directory_never_probes_file() {
        let next = Recorder::new(&["/virtual/pkg/index.ts", "/virtual/pkg.ts"], &["/virtual/pkg"]);
        let resolver = shim(next, HostCapabilities::default());

        let target = resolver.resolve("./pkg/", &from("/virtual/app.js")).unwrap();
        assert_eq!(target.url.path(), "/virtual/pkg/index.ts");
        assert!(resolver.next.calls().iter().all(|c| c.starts_with("./pkg/index")));
    }

    #[test]
    fn test_implicit_directory_tries_index_then_extensions() {
        let next = Recorder::new(&["/virtual/pkg.ts"], &["/virtual/pkg"]);
        let resolver = shim(next, HostCapabilities::default());

        let target = resolver.resolve("./pkg", &from("/virtual/app.js")).unwrap();
        assert_eq!(target.url.path(), "/virtual/pkg.ts");

        let calls = resolver.next.calls();
        let first_index = calls.iter().position(|c| c == "./pkg/index.js").unwrap();
        let first_ext = calls.iter().position(|c| c == "./pkg.js").unwrap();
        assert!(first_index < first_ext);
    }

    #[test]
    fn test_node_prefix_stripped_on_old_host() {
        let next = Recorder::new(&[], &[]);
        let caps = HostCapabilities {
            supports_node_prefix: false,
            ..HostCapabilities::default()
        };
        let resolver = shim(next, caps);

        let prefixed = resolver.resolve("node:fs", &from("/virtual/app.ts")).unwrap();
        let plain = resolver.resolve("fs", &from("/virtual/app.ts")).unwrap();
        assert_eq!(prefixed, plain);
        assert_eq!(resolver.next.calls(), vec!["fs", "fs"]);
    }

    // ---------------------------------------------------------------
    // Errors
    // ---------------------------------------------------------------

    #[test]
    fn test_not_found_reports_original_specifier() {
        let next = Recorder::new(&[], &[]);
        let resolver = shim(next, HostCapabilities::default());

        let err = resolver.resolve("./missing", &from("/virtual/app.ts")).unwrap_err();
        assert_eq!(err.kind(), ResolveErrorKind::NotFound);
        assert_eq!(err.specifier(), Some("./missing"));
        assert_eq!(err.attempted(), Some("./missing.js"));
        assert!(err.to_string().contains("'./missing'"));
    }

    #[test]
    fn test_directory_failure_hides_index_suffix() {
        let next = Recorder::new(&[], &["/virtual/empty"]);
        let resolver = shim(next, HostCapabilities::default());

        let err = resolver.resolve("./empty/", &from("/virtual/app.js")).unwrap_err();
        assert_eq!(err.specifier(), Some("./empty/"));
        assert_eq!(err.attempted(), Some("./empty/index.js"));
    }

    // ---------------------------------------------------------------
    // Format inference
    // ---------------------------------------------------------------

    #[test]
    fn test_format_inferred_from_package_type() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("package.json"), r#"{"type":"module"}"#).unwrap();
        fs::write(root.join("a.ts"), "").unwrap();
        fs::write(root.join("b.cts"), "").unwrap();

        let file = root.join("a.ts");
        let cts = root.join("b.cts");
        let next = Recorder::new(&[file.to_str().unwrap(), cts.to_str().unwrap()], &[]);
        let resolver = shim(next, HostCapabilities::default());
        let ctx = ResolveContext::from_parent_path(&root.join("main.ts"));

        let target = resolver.resolve("./a.ts", &ctx).unwrap();
        assert_eq!(target.format, Some(ModuleFormat::Module));

        let target = resolver.resolve("./b.cts", &ctx).unwrap();
        assert_eq!(target.format, Some(ModuleFormat::Script));
    }

    #[test]
    fn test_non_file_without_format_is_dynamic() {
        struct Remote;
        impl Resolve for Remote {
            fn resolve(
                &self,
                specifier: &str,
                _context: &ResolveContext,
            ) -> Result<ResolvedTarget, ResolveError> {
                Ok(ResolvedTarget::new(Url::parse(specifier).unwrap(), None))
            }
        }

        let session = Session::with_parts("/virtual", HostCapabilities::default(), ProjectRegistry::empty());
        let resolver = ShimResolver::new(Remote, Arc::new(session));
        let target = resolver
            .resolve("https://esm.sh/react", &ResolveContext::default())
            .unwrap();
        assert_eq!(target.format, Some(ModuleFormat::Dynamic));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let next = Recorder::new(&["/virtual/lib/index.ts"], &["/virtual/lib"]);
        let resolver = shim(next, HostCapabilities::default());
        let ctx = from("/virtual/app.ts");

        let first = resolver.resolve("./lib", &ctx).unwrap();
        let second = resolver.resolve("./lib", &ctx).unwrap();
        assert_eq!(first, second);
    }

    // ---------------------------------------------------------------
    // normalize_path
    // ---------------------------------------------------------------

    #[test]
    fn test_normalize_path_parent_dir() {
        assert_eq!(
            normalize_path(Path::new("/project/src/../lib/utils")),
            PathBuf::from("/project/lib/utils")
        );
    }

    #[test]
    fn test_normalize_path_current_dir() {
        assert_eq!(
            normalize_path(Path::new("/project/./src/./utils")),
            PathBuf::from("/project/src/utils")
        );
    }

    #[test]
    fn test_normalize_path_leading_parent_kept() {
        assert_eq!(normalize_path(Path::new("../a/./b")), PathBuf::from("../a/b"));
    }
}
