use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::TsConfig;
use crate::format::ModuleFormat;
use crate::loader::{FsLoader, Load, LoadContext, ShimLoader};
use crate::notify::IpcReporter;
use crate::resolver::{NodeResolver, Resolve, ResolveContext, ResolvedTarget, ShimResolver};
use crate::session::Session;

use super::output::{format_config, format_loaded, format_resolved};
use super::OutputFormat;

#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub url: String,
    pub format: Option<ModuleFormat>,
    /// `None` for modules the host synthesizes, such as builtins.
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PathMappingReport {
    pub pattern: String,
    pub substitutions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub path: PathBuf,
    pub base_url: Option<PathBuf>,
    pub paths: Vec<PathMappingReport>,
    pub references: Vec<PathBuf>,
    /// Whether the queried path is inside the project's compile scope.
    pub includes: bool,
}

impl ConfigReport {
    fn new(config: &TsConfig, queried: &Path) -> Self {
        ConfigReport {
            path: config.path.clone(),
            base_url: config.base_url.clone(),
            paths: config
                .paths
                .iter()
                .map(|m| PathMappingReport {
                    pattern: m.pattern.clone(),
                    substitutions: m.substitutions.iter().map(|s| s.template.clone()).collect(),
                })
                .collect(),
            references: config.references.clone(),
            includes: config.includes(queried),
        }
    }
}

fn context_for(session: &Session, from: Option<&Path>) -> ResolveContext {
    match from {
        Some(from) => ResolveContext::from_parent_path(&session.cwd.join(from)),
        None => ResolveContext::default(),
    }
}

fn resolve(
    session: &Arc<Session>,
    specifier: &str,
    context: &ResolveContext,
) -> Result<ResolvedTarget> {
    let resolver = ShimResolver::new(NodeResolver::new(session), Arc::clone(session));
    resolver
        .resolve(specifier, context)
        .with_context(|| format!("failed to resolve '{}'", specifier))
}

/// Run the resolve command.
pub fn run_resolve(
    session: &Arc<Session>,
    specifier: &str,
    from: Option<&Path>,
    conditions: &[String],
    format: &OutputFormat,
) -> Result<String> {
    let mut context = context_for(session, from);
    if !conditions.is_empty() {
        context = context.with_conditions(conditions.to_vec());
    }
    let target = resolve(session, specifier, &context)?;
    Ok(format_resolved(&target, format))
}

/// Run the load command: resolve, then load through the shim.
pub fn run_load(
    session: &Arc<Session>,
    specifier: &str,
    from: Option<&Path>,
    report_dependencies: bool,
    format: &OutputFormat,
) -> Result<String> {
    let context = context_for(session, from);
    let target = resolve(session, specifier, &context)?;

    let mut loader = ShimLoader::new(FsLoader::new(session), Arc::clone(session));
    if report_dependencies {
        loader = loader.with_reporter(IpcReporter::new(std::io::stderr()));
    }

    let report = if session.capabilities.supports_load_hook {
        let load_context = LoadContext {
            format: target.format,
            conditions: context.conditions.clone(),
            ..LoadContext::default()
        };
        let loaded = loader
            .load(&target.url, &load_context)
            .with_context(|| format!("failed to load '{}'", target.url))?;
        LoadReport {
            url: target.url.to_string(),
            format: loaded.format,
            source: loaded
                .source
                .as_deref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        }
    } else {
        load_legacy(&loader, &target)?
    };
    Ok(format_loaded(&report, format))
}

/// Drive the `getFormat`/`transformSource` pair the way a host without a
/// load hook does, reading the source in between.
fn load_legacy(loader: &ShimLoader<FsLoader>, target: &ResolvedTarget) -> Result<LoadReport> {
    let url = &target.url;
    let Ok(path) = url.to_file_path() else {
        // builtins and other host-provided modules have no source to transform
        return Ok(LoadReport {
            url: url.to_string(),
            format: target.format,
            source: None,
        });
    };

    let format = loader
        .get_format(url)
        .with_context(|| format!("failed to get the format of '{}'", url))?;
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let source = loader
        .transform_source(&raw, url, format)
        .with_context(|| format!("failed to transform '{}'", url))?;

    Ok(LoadReport {
        url: url.to_string(),
        format: Some(format),
        source: Some(source),
    })
}

/// Run the config command.
pub fn run_config(session: &Session, from: Option<&Path>, format: &OutputFormat) -> Result<String> {
    let queried = match from {
        Some(from) => session.cwd.join(from),
        None => session.cwd.join("index.ts"),
    };
    let config = session.projects.config_for(&queried);
    let report = config.as_deref().map(|c| ConfigReport::new(c, &queried));
    Ok(format_config(report.as_ref(), format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::HostCapabilities;
    use crate::config::ProjectRegistry;
    use crate::session::SessionOptions;
    use tempfile::TempDir;

    fn setup_test_project(files: &[(&str, &str)]) -> (TempDir, Arc<Session>) {
        let dir = TempDir::new().unwrap();
        for (file, content) in files {
            let full_path = dir.path().join(file);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full_path, content).unwrap();
        }
        let session = Session::new(SessionOptions::new(dir.path())).unwrap();
        (dir, Arc::new(session))
    }

    #[test]
    fn test_run_resolve_json() {
        let (dir, session) = setup_test_project(&[("src/main.ts", ""), ("src/util.ts", "")]);
        let out = run_resolve(
            &session,
            "./util.js",
            Some(Path::new("src/main.ts")),
            &[],
            &OutputFormat::Compact,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let url = url::Url::parse(value["url"].as_str().unwrap()).unwrap();
        assert_eq!(url.to_file_path().unwrap(), dir.path().join("src/util.ts"));
        assert_eq!(value["format"], "commonjs");
    }

    #[test]
    fn test_run_resolve_failure_names_specifier() {
        let (_dir, session) = setup_test_project(&[("main.ts", "")]);
        let err = run_resolve(&session, "./nope", None, &[], &OutputFormat::Text).unwrap_err();
        assert!(format!("{:#}", err).contains("'./nope'"));
    }

    #[test]
    fn test_run_load_text() {
        let (_dir, session) = setup_test_project(&[("main.ts", "const a: number = 1;\n")]);
        let out = run_load(&session, "./main", None, false, &OutputFormat::Text).unwrap();
        assert!(out.contains("const a         = 1;"));
    }

    #[test]
    fn test_run_load_on_host_without_load_hook() {
        let (dir, _) = setup_test_project(&[
            ("package.json", r#"{ "type": "module" }"#),
            ("main.ts", "const a: number = 1;\n"),
            ("lazy.js", "export const b = await import('./main.js');\n"),
        ]);
        let capabilities = HostCapabilities::for_version(&semver::Version::new(16, 0, 0));
        assert!(!capabilities.supports_load_hook);
        let projects = ProjectRegistry::discover(dir.path(), None).unwrap();
        let session = Arc::new(Session::with_parts(dir.path(), capabilities, projects));

        let out = run_load(&session, "./main.ts", None, false, &OutputFormat::Compact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["format"], "module");
        assert!(value["source"].as_str().unwrap().starts_with("const a         = 1;"));

        let out = run_load(&session, "./lazy.js", None, false, &OutputFormat::Text).unwrap();
        assert!(out.contains("mod.default.__esModule"));

        let out = run_load(&session, "fs", None, false, &OutputFormat::Compact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["format"], "builtin");
        assert!(value["source"].is_null());
    }

    #[test]
    fn test_run_config() {
        let (dir, session) = setup_test_project(&[(
            "tsconfig.json",
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@/*": ["src/*"] } } }"#,
        )]);
        let out = run_config(&session, None, &OutputFormat::Compact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            PathBuf::from(value["path"].as_str().unwrap()),
            dir.path().join("tsconfig.json")
        );
        assert_eq!(value["paths"][0]["pattern"], "@/*");
        assert_eq!(value["paths"][0]["substitutions"][0], "src/*");
        assert_eq!(value["includes"], true);
    }

    #[test]
    fn test_run_config_without_project() {
        let (_dir, session) = setup_test_project(&[]);
        let out = run_config(&session, None, &OutputFormat::Text).unwrap();
        assert_eq!(out, "No tsconfig.json applies");
    }
}
