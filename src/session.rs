use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use semver::Version;
use tracing::debug;

use crate::capabilities::HostCapabilities;
use crate::config::{PackageJsonCache, ProjectRegistry};
use crate::error::ConfigError;

/// Explicit config file path; bypasses tsconfig discovery.
pub const TSCONFIG_PATH_ENV: &str = "TSLOADER_TSCONFIG_PATH";
/// Host runtime version used to compute capability flags.
pub const NODE_VERSION_ENV: &str = "TSLOADER_NODE_VERSION";

/// Inputs for building a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub cwd: PathBuf,
    pub tsconfig_override: Option<PathBuf>,
    /// `None` means a modern host.
    pub host_version: Option<Version>,
}

impl SessionOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        SessionOptions {
            cwd: cwd.into(),
            tsconfig_override: None,
            host_version: None,
        }
    }

    pub fn tsconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.tsconfig_override = Some(path.into());
        self
    }

    pub fn host_version(mut self, version: Version) -> Self {
        self.host_version = Some(version);
        self
    }

    /// Read the working directory and the `TSLOADER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let mut options = SessionOptions::new(cwd);

        if let Some(path) = std::env::var_os(TSCONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
            options.tsconfig_override = Some(PathBuf::from(path));
        }
        if let Ok(raw) = std::env::var(NODE_VERSION_ENV) {
            let version = HostCapabilities::parse_version(&raw)
                .with_context(|| format!("invalid {} value '{}'", NODE_VERSION_ENV, raw))?;
            options.host_version = Some(version);
        }
        Ok(options)
    }
}

/// State shared by every hook call in one run: host capabilities, the
/// project registry and the package.json cache.
#[derive(Debug)]
pub struct Session {
    pub cwd: PathBuf,
    pub capabilities: HostCapabilities,
    pub projects: ProjectRegistry,
    pub packages: Arc<PackageJsonCache>,
}

impl Session {
    /// Build a session, discovering project configuration eagerly.
    /// A malformed config is reported here rather than on first use.
    pub fn new(options: SessionOptions) -> Result<Self, ConfigError> {
        let capabilities = options
            .host_version
            .as_ref()
            .map(HostCapabilities::for_version)
            .unwrap_or_default();
        debug!(?capabilities, "host capabilities");

        let projects =
            ProjectRegistry::discover(&options.cwd, options.tsconfig_override.as_deref())?;

        Ok(Session {
            cwd: options.cwd,
            capabilities,
            projects,
            packages: Arc::new(PackageJsonCache::new()),
        })
    }

    /// A session with explicit parts, mainly for tests and embedding.
    pub fn with_parts(
        cwd: impl Into<PathBuf>,
        capabilities: HostCapabilities,
        projects: ProjectRegistry,
    ) -> Self {
        Session {
            cwd: cwd.into(),
            capabilities,
            projects,
            packages: Arc::new(PackageJsonCache::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_session_uses_version_capabilities() {
        let tmp = TempDir::new().unwrap();
        let options = SessionOptions::new(tmp.path())
            .host_version(Version::new(12, 19, 0));
        let session = Session::new(options).unwrap();
        assert!(!session.capabilities.supports_node_prefix);
        assert!(!session.capabilities.supports_load_hook);
    }

    #[test]
    fn test_session_surfaces_malformed_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("tsconfig.json"), "{ nope").unwrap();
        let err = Session::new(SessionOptions::new(tmp.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_session_with_override() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("alt.json"),
            r#"{ "compilerOptions": { "baseUrl": "." } }"#,
        )
        .unwrap();
        let session = Session::new(SessionOptions::new(tmp.path()).tsconfig("alt.json")).unwrap();
        assert!(session.projects.root().is_some());
    }
}
