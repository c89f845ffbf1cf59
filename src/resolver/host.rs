//! A standalone default resolver with host ESM semantics: builtins, URL
//! joining, package `imports`/`exports`, and `node_modules` lookup. No
//! extension or index probing happens here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;
use url::Url;

use super::exports::{resolve_exports, resolve_imports};
use super::{Resolve, ResolveContext, ResolvedTarget};
use crate::capabilities::HostCapabilities;
use crate::config::PackageJsonCache;
use crate::error::ResolveError;
use crate::format::ModuleFormat;
use crate::session::Session;
use crate::specifier::{has_url_scheme, is_path_specifier};

const BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Whether `name` (without `node:`) is a host builtin, including subpaths
/// such as `fs/promises`.
pub fn is_builtin(name: &str) -> bool {
    let root = name.split('/').next().unwrap_or(name);
    BUILTINS.contains(&root)
}

pub struct NodeResolver {
    cwd: PathBuf,
    capabilities: HostCapabilities,
    packages: Arc<PackageJsonCache>,
}

impl NodeResolver {
    pub fn new(session: &Session) -> Self {
        NodeResolver {
            cwd: session.cwd.clone(),
            capabilities: session.capabilities,
            packages: Arc::clone(&session.packages),
        }
    }

    fn base_url(&self, context: &ResolveContext) -> Result<Url, ResolveError> {
        match &context.parent_url {
            Some(parent) => Ok(parent.clone()),
            None => Url::from_directory_path(&self.cwd).map_err(|()| {
                ResolveError::InvalidSpecifier {
                    specifier: self.cwd.display().to_string(),
                    reason: "working directory is not absolute".to_string(),
                }
            }),
        }
    }

    fn base_dir(&self, context: &ResolveContext) -> PathBuf {
        context
            .parent_path()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.cwd.clone())
    }

    fn resolve_builtin(&self, specifier: &str, name: &str) -> Result<ResolvedTarget, ResolveError> {
        if !is_builtin(name) {
            return Err(ResolveError::UnknownBuiltin {
                specifier: specifier.to_string(),
            });
        }
        let url = Url::parse(&format!("node:{}", name)).map_err(|e| {
            ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(ResolvedTarget::new(url, Some(ModuleFormat::Builtin)))
    }

    /// A concrete file URL: must exist and must not be a directory.
    fn resolve_file(
        &self,
        url: Url,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let path = url
            .to_file_path()
            .map_err(|()| ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: format!("'{}' is not a local file URL", url),
            })?;

        if path.is_dir() {
            return Err(ResolveError::UnsupportedDirectory {
                specifier: specifier.to_string(),
                attempted: specifier.to_string(),
                parent: context.parent_url.clone(),
            });
        }
        if !path.is_file() {
            return Err(ResolveError::not_found(specifier, context.parent_url.as_ref()));
        }

        let format = self.host_format(&path)?;
        Ok(ResolvedTarget::new(url, format))
    }

    /// The format the host would assign from the file alone. Extensions it
    /// does not know are left undecided.
    fn host_format(&self, path: &Path) -> Result<Option<ModuleFormat>, ResolveError> {
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

    fn resolve_package_import(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let dir = self.base_dir(context);
        let not_defined = |manifest: PathBuf| ResolveError::ImportNotDefined {
            specifier: specifier.to_string(),
            attempted: specifier.to_string(),
            package_json: manifest,
        };

        let Some((manifest, value)) = self.packages.find_nearest(&dir)? else {
            return Err(not_defined(dir.join("package.json")));
        };

        let target = value
            .get("imports")
            .and_then(|imports| resolve_imports(imports, specifier, &context.conditions_with_default()));
        let Some(target) = target else {
            return Err(not_defined(manifest));
        };

        if target.starts_with("./") {
            let package_dir = manifest.parent().unwrap_or(&dir);
            return self.resolve_file(file_url(&package_dir.join(&target))?, specifier, context);
        }
        // Imports may point at a dependency.
        self.resolve_package(&target, context)
    }

    fn resolve_package(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let name = extract_package_name(specifier);
        let rest = &specifier[name.len()..];
        let subpath = if rest.is_empty() {
            ".".to_string()
        } else {
            format!(".{}", rest)
        };

        let start = self.base_dir(context);
        let Some(package_dir) = start
            .ancestors()
            .map(|dir| dir.join("node_modules").join(name))
            .find(|candidate| candidate.is_dir())
        else {
            return Err(ResolveError::not_found(specifier, context.parent_url.as_ref()));
        };
        trace!(specifier, package = %package_dir.display(), "found package");

        let manifest_path = package_dir.join("package.json");
        let manifest = self.packages.read(&manifest_path)?;

        if let Some(exports) = manifest.as_ref().and_then(|m| m.get("exports")) {
            let target = resolve_exports(exports, &subpath, &context.conditions_with_default())
                .ok_or_else(|| ResolveError::PathNotExported {
                    specifier: specifier.to_string(),
                    subpath: subpath.clone(),
                    package_json: manifest_path.clone(),
                })?;
            let url = file_url(&package_dir.join(&target))?;
            return self.resolve_file(url, specifier, context);
        }

        let path = if subpath == "." {
            manifest
                .as_ref()
                .and_then(|m| m.get("main"))
                .and_then(|m| m.as_str())
                .map(|main| package_dir.join(main))
                .filter(|p| p.is_file())
                .unwrap_or_else(|| package_dir.join("index.js"))
        } else {
            package_dir.join(&rest[1..])
        };
        self.resolve_file(file_url(&path)?, specifier, context)
    }
}

impl Resolve for NodeResolver {
    fn resolve(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        if let Some(name) = specifier.strip_prefix("node:") {
            if !self.capabilities.supports_node_prefix {
                return Err(ResolveError::UnknownBuiltin {
                    specifier: specifier.to_string(),
                });
            }
            return self.resolve_builtin(specifier, name);
        }
        if is_builtin(specifier) {
            return self.resolve_builtin(specifier, specifier);
        }

        if is_path_specifier(specifier) {
            let url = self.base_url(context)?.join(specifier).map_err(|e| {
                ResolveError::InvalidSpecifier {
                    specifier: specifier.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return self.resolve_file(url, specifier, context);
        }

        if has_url_scheme(specifier) {
            // data:, http: and friends are the host's business; leave the format open.
            let url = Url::parse(specifier).map_err(|e| ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(ResolvedTarget::new(url, None));
        }

        if specifier.starts_with('#') {
            return self.resolve_package_import(specifier, context);
        }

        self.resolve_package(specifier, context)
    }
}

impl ResolveContext {
    fn conditions_with_default(&self) -> Vec<String> {
        let mut conditions = self.conditions.clone();
        if !conditions.iter().any(|c| c == "default") {
            conditions.push("default".to_string());
        }
        conditions
    }
}

fn file_url(path: &Path) -> Result<Url, ResolveError> {
    let path = super::normalize_path(path);
    Url::from_file_path(&path).map_err(|()| ResolveError::InvalidSpecifier {
        specifier: path.display().to_string(),
        reason: "not an absolute path".to_string(),
    })
}

/// Extract the package name from a bare specifier.
/// e.g. "react" -> "react", "@types/node" -> "@types/node",
/// "lodash/debounce" -> "lodash"
fn extract_package_name(specifier: &str) -> &str {
    if specifier.starts_with('@') {
        // Scoped package: @scope/package or @scope/package/subpath
        match specifier.find('/') {
            Some(first_slash) => match specifier[first_slash + 1..].find('/') {
                Some(second_slash) => &specifier[..first_slash + 1 + second_slash],
                None => specifier,
            },
            None => specifier,
        }
    } else {
        match specifier.find('/') {
            Some(slash) => &specifier[..slash],
            None => specifier,
        }
    }
}
