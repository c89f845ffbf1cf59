use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::LoadError;
use crate::format::{self, ModuleFormat};
use crate::notify::{DependencyReporter, Notification};
use crate::session::Session;

pub mod dynamic_import;
pub mod host;
pub mod json;
pub mod legacy;
pub mod sourcemap;
pub mod strip;
pub mod syntax;
pub mod transform;

pub use host::FsLoader;
pub use sourcemap::{SourceMap, SourceMapRegistry};
pub use strip::TypeStripper;
pub use transform::{TransformOptions, TransformOutput, Transformer};

use dynamic_import::rewrite_dynamic_imports;
use syntax::{is_esm_syntax, Grammar};

/// What the resolve step decided about a location, plus import attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    pub format: Option<ModuleFormat>,
    pub conditions: Vec<String>,
    pub import_attributes: BTreeMap<String, String>,
}

impl Default for LoadContext {
    fn default() -> Self {
        LoadContext {
            format: None,
            conditions: vec!["node".to_string(), "import".to_string()],
            import_attributes: BTreeMap::new(),
        }
    }
}

impl LoadContext {
    pub fn with_format(format: ModuleFormat) -> Self {
        LoadContext {
            format: Some(format),
            ..Self::default()
        }
    }
}

/// Loaded module source. `source` is `None` for host-synthesized modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loaded {
    pub format: Option<ModuleFormat>,
    #[serde(skip)]
    pub source: Option<Vec<u8>>,
}

impl Loaded {
    /// The source as text, if there is any and it is UTF-8.
    pub fn source_text(&self) -> Option<&str> {
        self.source
            .as_deref()
            .and_then(|s| std::str::from_utf8(s).ok())
    }
}

/// A load hook. Like [`crate::resolver::Resolve`], the shim consumes and
/// provides the same shape.
pub trait Load: Send + Sync {
    fn load(&self, url: &Url, context: &LoadContext) -> Result<Loaded, LoadError>;
}

impl<T: Load + ?Sized> Load for Box<T> {
    fn load(&self, url: &Url, context: &LoadContext) -> Result<Loaded, LoadError> {
        (**self).load(url, context)
    }
}

impl<T: Load + ?Sized> Load for Arc<T> {
    fn load(&self, url: &Url, context: &LoadContext) -> Result<Loaded, LoadError> {
        (**self).load(url, context)
    }
}

/// Load hook that transpiles typed sources and JSON to module code,
/// rewrites dynamic imports in module code, and decides the format of
/// ambiguous `.js` files from their syntax.
pub struct ShimLoader<L> {
    next: L,
    session: Arc<Session>,
    transformer: Box<dyn Transformer>,
    source_maps: Arc<SourceMapRegistry>,
    reporter: Option<Box<dyn DependencyReporter>>,
}

impl<L: Load> ShimLoader<L> {
    pub fn new(next: L, session: Arc<Session>) -> Self {
        ShimLoader {
            next,
            session,
            transformer: Box::new(TypeStripper::new()),
            source_maps: Arc::new(SourceMapRegistry::new()),
            reporter: None,
        }
    }

    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Box::new(transformer);
        self
    }

    pub fn with_reporter(mut self, reporter: impl DependencyReporter + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn with_source_maps(mut self, registry: Arc<SourceMapRegistry>) -> Self {
        self.source_maps = registry;
        self
    }

    pub fn source_maps(&self) -> &Arc<SourceMapRegistry> {
        &self.source_maps
    }

    fn report(&self, url: &Url) {
        if let Some(reporter) = &self.reporter {
            reporter.report(&Notification::dependency(url.as_str()));
        }
    }

    /// Transpile a typed source file or a JSON document to module code.
    pub(crate) fn transpile(&self, url: &Url, code: &str) -> Result<String, LoadError> {
        let path = location_path(url);
        let output = if format::is_json_path(url.path()) {
            json::transform_json(code, &path)?
        } else {
            let options = self.transform_options(url);
            self.transformer.transform(code, &path, &options)?
        };
        debug!(url = %url, "transpiled");
        Ok(self.attach_map(url, output))
    }

    /// Apply the dynamic-import interop rewrite to module code. Returns
    /// `None` when nothing changed.
    pub(crate) fn rewrite_module(&self, url: &Url, code: &str) -> Result<Option<String>, LoadError> {
        let path = location_path(url);
        let rewritten = rewrite_dynamic_imports(code, &path, Grammar::for_path(&path))?;
        Ok(rewritten.map(|output| {
            trace!(url = %url, "rewrote dynamic imports");
            self.attach_map(url, output)
        }))
    }

    fn transform_options(&self, url: &Url) -> TransformOptions {
        let Ok(path) = url.to_file_path() else {
            return TransformOptions::default();
        };
        let config = self
            .session
            .projects
            .config_for(&path)
            .filter(|config| config.includes(&path));
        TransformOptions {
            compiler_options: config.map(|c| c.compiler_options.clone()),
        }
    }

    /// Register the output's map under `url` and append the inline map
    /// comment when the host reads inline maps.
    fn attach_map(&self, url: &Url, output: TransformOutput) -> String {
        let TransformOutput { mut code, map } = output;
        let Some(mut map) = map else {
            return code;
        };
        map.file = Some(url.to_string());

        if self.session.capabilities.supports_inline_source_maps {
            match map.to_comment() {
                Ok(comment) => {
                    if !code.ends_with('\n') {
                        code.push('\n');
                    }
                    code.push_str(&comment);
                }
                Err(e) => warn!(url = %url, error = %e, "failed to encode inline source map"),
            }
        }
        self.source_maps.set(url, map);
        code
    }
}

impl<L: Load> Load for ShimLoader<L> {
    fn load(&self, url: &Url, context: &LoadContext) -> Result<Loaded, LoadError> {
        self.report(url);

        let mut context = context.clone();
        if format::is_json_path(url.path()) {
            context
                .import_attributes
                .insert("type".to_string(), "json".to_string());
        }

        let loaded = self.next.load(url, &context)?;
        let Some(bytes) = &loaded.source else {
            return Ok(loaded);
        };
        let code = std::str::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8 { url: url.clone() })?;

        if loaded.format == Some(ModuleFormat::Json) || format::is_source_path(url.path()) {
            let code = self.transpile(url, code)?;
            return Ok(Loaded {
                format: Some(ModuleFormat::Module),
                source: Some(code.into_bytes()),
            });
        }

        // A module package can still contain script-style `.js` files, so a
        // module format that came from package configuration is checked
        // against the syntax. A script format is never promoted.
        let mut format = loaded.format;
        if format != Some(ModuleFormat::Script) && format::is_ambiguous_script(url.path()) {
            if !is_esm_syntax(code) {
                debug!(url = %url, "no module syntax, loading as script");
                format = Some(ModuleFormat::Script);
            } else if format.is_none() {
                format = Some(ModuleFormat::Module);
            }
        }

        if format == Some(ModuleFormat::Module) {
            if let Some(code) = self.rewrite_module(url, code)? {
                return Ok(Loaded {
                    format,
                    source: Some(code.into_bytes()),
                });
            }
        }

        Ok(Loaded {
            format,
            source: loaded.source,
        })
    }
}

/// The filesystem path for a `file:` URL, else the URL text itself.
fn location_path(url: &Url) -> PathBuf {
    url.to_file_path()
        .unwrap_or_else(|()| PathBuf::from(url.as_str()))
}
