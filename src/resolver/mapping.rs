use tracing::{debug, trace};
use url::Url;

use super::{Fallback, Resolve, ResolveContext, ResolvedTarget, ShimResolver};
use crate::error::ResolveError;
use crate::specifier::{is_bare, is_vendored};

impl<R: Resolve> ShimResolver<R> {
    /// Rewrite a bare specifier through the applicable tsconfig `paths`/`baseUrl`.
    ///
    /// Candidates are fully resolved in table order and the first success wins.
    /// `Ok(None)` means no mapping applied and the caller continues with the
    /// bare specifier. Mapping is skipped for importers under `node_modules`.
    pub(crate) fn resolve_mapped(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<Option<ResolvedTarget>, ResolveError> {
        if !is_bare(specifier) || is_vendored(context.parent_url.as_ref()) {
            return Ok(None);
        }

        let projects = &self.session.projects;
        let config = match context.parent_path() {
            Some(parent) => projects.config_for(&parent),
            None => projects.root().cloned(),
        };
        let Some(config) = config.filter(|c| c.has_mappings()) else {
            return Ok(None);
        };

        for candidate in config.path_candidates(specifier) {
            let Ok(url) = Url::from_file_path(&candidate) else {
                continue;
            };
            match self.resolve_with(url.as_str(), context, Fallback::Allowed) {
                Ok(target) => {
                    debug!(specifier, mapped = %target.url, "resolved through path mapping");
                    return Ok(Some(target));
                }
                Err(err) if err.is_recoverable() => {
                    trace!(specifier, candidate = %candidate.display(), "mapping candidate failed");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::capabilities::HostCapabilities;
    use crate::config::ProjectRegistry;
    use crate::resolver::{NodeResolver, Resolve, ResolveContext, ShimResolver};
    use crate::session::Session;

    fn setup_test_project(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        for (file, content) in files {
            let full_path = root.join(file);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full_path, content).unwrap();
        }
        (dir, root)
    }

    fn shim_for(root: &PathBuf) -> ShimResolver<NodeResolver> {
        let projects = ProjectRegistry::discover(root, None).unwrap();
        let session = Arc::new(Session::with_parts(
            root.clone(),
            HostCapabilities::default(),
            projects,
        ));
        ShimResolver::new(NodeResolver::new(&session), session)
    }

    #[test]
    fn test_first_resolving_candidate_wins() {
        let (_dir, root) = setup_test_project(&[
            (
                "tsconfig.json",
                r#"{ "compilerOptions": { "paths": { "@/*": ["gen/*", "src/*", "lib/*"] } } }"#,
            ),
            ("src/util.ts", ""),
            ("lib/util.ts", ""),
            ("app.ts", ""),
        ]);
        let resolver = shim_for(&root);

        let target = resolver
            .resolve("@/util", &ResolveContext::from_parent_path(&root.join("app.ts")))
            .unwrap();
        assert_eq!(target.url.to_file_path().unwrap(), root.join("src/util.ts"));
    }

    #[test]
    fn test_unresolvable_mapping_falls_through_to_bare() {
        let (_dir, root) = setup_test_project(&[
            (
                "tsconfig.json",
                r#"{ "compilerOptions": { "paths": { "*": ["types/*"] } } }"#,
            ),
            ("node_modules/dep/package.json", r#"{ "main": "main.js" }"#),
            ("node_modules/dep/main.js", ""),
            ("app.ts", ""),
        ]);
        let resolver = shim_for(&root);

        let target = resolver
            .resolve("dep", &ResolveContext::from_parent_path(&root.join("app.ts")))
            .unwrap();
        assert_eq!(
            target.url.to_file_path().unwrap(),
            root.join("node_modules/dep/main.js")
        );
    }

    #[test]
    fn test_mapping_skipped_inside_node_modules() {
        let (_dir, root) = setup_test_project(&[
            (
                "tsconfig.json",
                r#"{ "compilerOptions": { "paths": { "shared": ["src/shared.ts"] } } }"#,
            ),
            ("src/shared.ts", ""),
            ("node_modules/dep/index.js", ""),
        ]);
        let resolver = shim_for(&root);

        let from_dep = ResolveContext::from_parent_path(&root.join("node_modules/dep/index.js"));
        assert!(resolver.resolve("shared", &from_dep).is_err());

        let from_app = ResolveContext::from_parent_path(&root.join("app.ts"));
        assert!(resolver.resolve("shared", &from_app).is_ok());
    }

    #[test]
    fn test_mapping_to_directory_uses_index() {
        let (_dir, root) = setup_test_project(&[
            (
                "tsconfig.json",
                r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@ui": ["src/ui"] } } }"#,
            ),
            ("src/ui/index.tsx", ""),
        ]);
        let resolver = shim_for(&root);

        let target = resolver
            .resolve("@ui", &ResolveContext::from_parent_path(&root.join("app.ts")))
            .unwrap();
        assert_eq!(target.url.to_file_path().unwrap(), root.join("src/ui/index.tsx"));
    }
}
