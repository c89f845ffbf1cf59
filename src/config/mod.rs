//! Project configuration: tsconfig discovery with project references, and
//! package.json lookups.

pub mod package_json;
pub mod tsconfig;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::resolver::normalize_path;

pub use package_json::PackageJsonCache;
pub use tsconfig::TsConfig;

const TSCONFIG_FILE: &str = "tsconfig.json";

/// Every project config reachable from the root config through `references`.
///
/// Built once per run. Per-directory lookups are memoized.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: Vec<Arc<TsConfig>>,
    lookups: Mutex<HashMap<PathBuf, Option<Arc<TsConfig>>>>,
}

impl ProjectRegistry {
    /// A registry with no configuration: no path mapping, default formats only.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the explicit override when given, otherwise the nearest
    /// tsconfig.json at or above `cwd`. Finding nothing is not an error.
    pub fn discover(cwd: &Path, override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let root_path = match override_path {
            Some(path) => Some(normalize_path(&cwd.join(path))),
            None => find_upward(cwd),
        };

        let Some(root_path) = root_path else {
            debug!(cwd = %cwd.display(), "no tsconfig.json found");
            return Ok(Self::empty());
        };

        debug!(tsconfig = %root_path.display(), "loading project config");
        Self::from_root(TsConfig::parse(&root_path)?)
    }

    /// Build the registry from a parsed root config, following references
    /// breadth-first. Each config path is loaded at most once.
    pub fn from_root(root: TsConfig) -> Result<Self, ConfigError> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(root.path.clone());

        let mut queue: VecDeque<PathBuf> = root.references.iter().cloned().collect();
        let mut projects = vec![Arc::new(root)];

        while let Some(reference) = queue.pop_front() {
            if !seen.insert(reference.clone()) {
                continue;
            }
            if !reference.is_file() {
                warn!(reference = %reference.display(), "referenced project config not found, skipping");
                continue;
            }
            let config = TsConfig::parse(&reference)?;
            debug!(tsconfig = %reference.display(), "loaded referenced project");
            queue.extend(config.references.iter().cloned());
            projects.push(Arc::new(config));
        }

        Ok(ProjectRegistry {
            projects,
            lookups: Mutex::new(HashMap::new()),
        })
    }

    /// The config discovery started from.
    pub fn root(&self) -> Option<&Arc<TsConfig>> {
        self.projects.first()
    }

    /// All projects, root first, then references in discovery order.
    pub fn projects(&self) -> &[Arc<TsConfig>] {
        &self.projects
    }

    /// The project owning `file`: the deepest project directory above it,
    /// or the root project when none contains it.
    pub fn config_for(&self, file: &Path) -> Option<Arc<TsConfig>> {
        let dir = normalize_path(file.parent().unwrap_or(file));

        let mut lookups = self.lookups.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = lookups.get(&dir) {
            return cached.clone();
        }

        let owner = self
            .projects
            .iter()
            .filter(|p| dir.starts_with(&p.config_dir))
            .max_by_key(|p| p.config_dir.components().count())
            .or_else(|| self.root())
            .cloned();

        lookups.insert(dir, owner.clone());
        owner
    }
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(TSCONFIG_FILE))
        .find(|candidate| candidate.is_file())
        .map(|p| normalize_path(&p))
}
