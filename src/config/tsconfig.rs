use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::ConfigError;
use crate::resolver::normalize_path;

const DEFAULT_INCLUDE: &[&str] = &["**/*"];
const DEFAULT_EXCLUDE: &[&str] = &["node_modules", "bower_components", "jspm_packages"];

/// A tsconfig.json with its `extends` chain merged in.
#[derive(Debug, Clone)]
pub struct TsConfig {
    /// The tsconfig.json file itself.
    pub path: PathBuf,
    /// The directory containing the tsconfig.json file.
    pub config_dir: PathBuf,
    /// The baseUrl for non-relative module resolution, made absolute.
    pub base_url: Option<PathBuf>,
    /// Path alias mappings from compilerOptions.paths.
    pub paths: Vec<PathMapping>,
    /// Merged compilerOptions, handed to the transformer.
    pub compiler_options: Map<String, Value>,
    /// Referenced project config files, made absolute.
    pub references: Vec<PathBuf>,
    scope: Scope,
}

/// A single path mapping from tsconfig.json paths.
#[derive(Debug, Clone)]
pub struct PathMapping {
    /// The pattern as written, e.g. "@utils/*".
    pub pattern: String,
    /// The prefix before the wildcard, e.g. "@utils/" for "@utils/*".
    pub prefix: String,
    /// The suffix after the wildcard (usually empty).
    pub suffix: String,
    /// Patterns without `*` only match the exact specifier.
    pub has_wildcard: bool,
    /// Substitutions in declaration order.
    pub substitutions: Vec<PathSubstitution>,
}

/// A single substitution target for a path mapping.
#[derive(Debug, Clone)]
pub struct PathSubstitution {
    /// The substitution as written, with at most its first `*` replaced.
    pub template: String,
    /// The directory the template is relative to.
    pub base: PathBuf,
}

impl PathSubstitution {
    fn expand(&self, captured: &str) -> PathBuf {
        normalize_path(&self.base.join(self.template.replacen('*', captured, 1)))
    }
}

/// The files a config claims through `files`, `include` and `exclude`.
#[derive(Debug, Clone)]
struct Scope {
    dir: PathBuf,
    files: Vec<PathBuf>,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

/// Raw, not yet merged view of one config file in an `extends` chain.
#[derive(Debug, Default)]
struct Layer {
    compiler_options: Map<String, Value>,
    base_url: Option<PathBuf>,
    paths: Option<(Map<String, Value>, PathBuf)>,
    files: Option<(Vec<String>, PathBuf)>,
    include: Option<(Vec<String>, PathBuf)>,
    exclude: Option<(Vec<String>, PathBuf)>,
}

impl Layer {
    /// Apply `child` on top of `self`: child keys win.
    fn overlay(mut self, child: Layer) -> Layer {
        self.compiler_options.extend(child.compiler_options);
        self.base_url = child.base_url.or(self.base_url);
        self.paths = child.paths.or(self.paths);
        self.files = child.files.or(self.files);
        self.include = child.include.or(self.include);
        self.exclude = child.exclude.or(self.exclude);
        self
    }
}

impl TsConfig {
    /// Parse a tsconfig.json file, following its `extends` chain.
    pub fn parse(tsconfig_path: &Path) -> Result<Self, ConfigError> {
        let tsconfig_path = normalize_path(tsconfig_path);
        let mut chain = Vec::new();
        let (layer, json) = load_layer(&tsconfig_path, &mut chain)?;
        Self::assemble(tsconfig_path, layer, &json)
    }

    /// Parse tsconfig.json content from a string.
    /// `tsconfig_path` is used to resolve relative paths; `extends` is followed on disk.
    pub fn parse_from_str(content: &str, tsconfig_path: &Path) -> Result<Self, ConfigError> {
        let tsconfig_path = normalize_path(tsconfig_path);
        let json = parse_jsonc(content, &tsconfig_path)?;
        let mut chain = vec![tsconfig_path.clone()];
        let layer = layer_from_json(&json, &tsconfig_path, &mut chain)?;
        Self::assemble(tsconfig_path, layer, &json)
    }

    fn assemble(path: PathBuf, layer: Layer, json: &Value) -> Result<Self, ConfigError> {
        let config_dir = parent_dir(&path);

        let paths = match &layer.paths {
            Some((table, declared_in)) => {
                let base = layer.base_url.as_deref().unwrap_or(declared_in);
                parse_paths(table, base)
            }
            None => Vec::new(),
        };

        let references = json
            .get("references")
            .and_then(|r| r.as_array())
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| r.get("path").and_then(|p| p.as_str()))
                    .map(|p| reference_config_path(&config_dir, p))
                    .collect()
            })
            .unwrap_or_default();

        let scope = Scope::build(&path, &config_dir, &layer)?;

        Ok(TsConfig {
            config_dir,
            base_url: layer.base_url,
            paths,
            compiler_options: layer.compiler_options,
            references,
            scope,
            path,
        })
    }

    /// Candidate absolute paths for a bare specifier, in priority order.
    ///
    /// An exact pattern beats any wildcard; among wildcards the longest
    /// matching prefix wins, and only the winner's substitutions are returned.
    /// With no matching pattern, `baseUrl` contributes a single candidate.
    pub fn path_candidates(&self, specifier: &str) -> Vec<PathBuf> {
        if let Some(exact) = self
            .paths
            .iter()
            .find(|m| !m.has_wildcard && m.pattern == specifier)
        {
            return exact.substitutions.iter().map(|s| s.expand("")).collect();
        }

        let best = self
            .paths
            .iter()
            .filter(|m| m.has_wildcard)
            .filter_map(|m| match_pattern(specifier, &m.prefix, &m.suffix).map(|w| (m, w)))
            // the first declared pattern wins a tie
            .min_by_key(|(m, _)| Reverse(m.prefix.len()));

        if let Some((mapping, captured)) = best {
            trace!(pattern = %mapping.pattern, captured, "path mapping matched");
            return mapping
                .substitutions
                .iter()
                .map(|s| s.expand(captured))
                .collect();
        }

        match &self.base_url {
            Some(base_url) if !specifier.starts_with('.') && !specifier.starts_with('/') => {
                vec![normalize_path(&base_url.join(specifier))]
            }
            _ => Vec::new(),
        }
    }

    /// Whether a mapping table (paths or baseUrl) is active.
    pub fn has_mappings(&self) -> bool {
        !self.paths.is_empty() || self.base_url.is_some()
    }

    /// Whether `file` is part of this project through `files`/`include`/`exclude`.
    pub fn includes(&self, file: &Path) -> bool {
        self.scope.contains(&normalize_path(file))
    }
}

impl Scope {
    fn build(path: &Path, config_dir: &Path, layer: &Layer) -> Result<Self, ConfigError> {
        let files = layer
            .files
            .as_ref()
            .map(|(names, dir)| names.iter().map(|f| normalize_path(&dir.join(f))).collect())
            .unwrap_or_default();

        // An explicit `files` list without `include` means nothing else is included.
        let include = match (&layer.include, &layer.files) {
            (Some((patterns, dir)), _) => Some(glob_set(path, config_dir, dir, patterns, true)?),
            (None, Some(_)) => None,
            (None, None) => {
                let defaults: Vec<String> = DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect();
                Some(glob_set(path, config_dir, config_dir, &defaults, true)?)
            }
        };

        let exclude = match &layer.exclude {
            Some((patterns, dir)) => glob_set(path, config_dir, dir, patterns, false)?,
            None => {
                let defaults: Vec<String> = DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect();
                glob_set(path, config_dir, config_dir, &defaults, false)?
            }
        };

        Ok(Scope {
            dir: config_dir.to_path_buf(),
            files,
            include,
            exclude,
        })
    }

    fn contains(&self, file: &Path) -> bool {
        if self.files.iter().any(|f| f == file) {
            return true;
        }
        let Some(include) = &self.include else {
            return false;
        };
        let Ok(relative) = file.strip_prefix(&self.dir) else {
            return false;
        };
        include.is_match(relative) && !self.exclude.is_match(relative)
    }
}

/// Compile include/exclude patterns relative to the config directory.
///
/// A pattern naming a directory (no wildcard, no extension) covers everything below it.
fn glob_set(
    config_path: &Path,
    config_dir: &Path,
    declared_in: &Path,
    patterns: &[String],
    is_include: bool,
) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let absolute = normalize_path(&declared_in.join(pattern));
        let relative = absolute
            .strip_prefix(config_dir)
            .unwrap_or(&absolute)
            .to_string_lossy()
            .replace('\\', "/");
        let relative = relative.trim_end_matches('/');

        let expanded = if relative.is_empty() {
            "**/*".to_string()
        } else if relative.ends_with("**") {
            format!("{}/*", relative)
        } else if !relative.contains('*') && Path::new(relative).extension().is_none() {
            if is_include {
                format!("{}/**/*", relative)
            } else {
                format!("{}/**", relative)
            }
        } else {
            relative.to_string()
        };

        let glob = GlobBuilder::new(&expanded)
            .literal_separator(true)
            .build()
            .map_err(|source| ConfigError::Glob {
                path: config_path.to_path_buf(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConfigError::Glob {
        path: config_path.to_path_buf(),
        source,
    })
}

fn parse_paths(table: &Map<String, Value>, base: &Path) -> Vec<PathMapping> {
    let mut mappings = Vec::new();

    for (pattern, targets) in table {
        let targets = match targets.as_array() {
            Some(arr) => arr,
            None => continue,
        };

        let (prefix, suffix) = split_on_wildcard(pattern);

        let substitutions = targets
            .iter()
            .filter_map(|t| t.as_str())
            .map(|target| PathSubstitution {
                template: target.to_string(),
                base: base.to_path_buf(),
            })
            .collect();

        mappings.push(PathMapping {
            pattern: pattern.clone(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            has_wildcard: pattern.contains('*'),
            substitutions,
        });
    }

    mappings
}

/// Read one config file and everything it extends.
fn load_layer(path: &Path, chain: &mut Vec<PathBuf>) -> Result<(Layer, Value), ConfigError> {
    if chain.iter().any(|p| p == path) {
        return Err(ConfigError::CircularExtends {
            path: path.to_path_buf(),
        });
    }
    chain.push(path.to_path_buf());

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let json = parse_jsonc(&content, path)?;
    let layer = layer_from_json(&json, path, chain)?;

    chain.pop();
    Ok((layer, json))
}

fn layer_from_json(
    json: &Value,
    path: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<Layer, ConfigError> {
    let dir = parent_dir(path);

    let extends: Vec<&str> = match json.get("extends") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => Vec::new(),
    };

    let mut merged = Layer::default();
    for parent in extends {
        let parent_path = resolve_extends(&dir, parent).ok_or_else(|| {
            ConfigError::ExtendsNotFound {
                extends: parent.to_string(),
                path: path.to_path_buf(),
            }
        })?;
        trace!(config = %path.display(), extends = %parent_path.display(), "following extends");
        let (parent_layer, _) = load_layer(&parent_path, chain)?;
        merged = merged.overlay(parent_layer);
    }

    let compiler_options = json
        .get("compilerOptions")
        .and_then(|co| co.as_object())
        .cloned()
        .unwrap_or_default();

    let base_url = compiler_options
        .get("baseUrl")
        .and_then(|v| v.as_str())
        .map(|url| normalize_path(&dir.join(url)));

    let paths = compiler_options
        .get("paths")
        .and_then(|p| p.as_object())
        .map(|table| (table.clone(), dir.clone()));

    let string_list = |key: &str| {
        json.get(key).and_then(|v| v.as_array()).map(|items| {
            let list = items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect::<Vec<_>>();
            (list, dir.clone())
        })
    };

    let own = Layer {
        compiler_options,
        base_url,
        paths,
        files: string_list("files"),
        include: string_list("include"),
        exclude: string_list("exclude"),
    };

    Ok(merged.overlay(own))
}

/// Locate the config named by an `extends` entry.
fn resolve_extends(dir: &Path, extends: &str) -> Option<PathBuf> {
    if extends.starts_with('.') || Path::new(extends).is_absolute() {
        let candidate = normalize_path(&dir.join(extends));
        if candidate.is_file() {
            return Some(candidate);
        }
        if !extends.ends_with(".json") {
            let with_ext = PathBuf::from(format!("{}.json", candidate.display()));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
        return None;
    }

    // Package-provided base config, e.g. "@tsconfig/node16/tsconfig.json".
    for ancestor in dir.ancestors() {
        let package = ancestor.join("node_modules").join(extends);
        let candidate = if extends.ends_with(".json") {
            package
        } else if package.is_dir() {
            package.join("tsconfig.json")
        } else {
            PathBuf::from(format!("{}.json", package.display()))
        };
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// A reference names either a config file or a directory holding tsconfig.json.
fn reference_config_path(config_dir: &Path, reference: &str) -> PathBuf {
    let target = normalize_path(&config_dir.join(reference));
    if target.extension().is_some_and(|e| e == "json") {
        target
    } else {
        target.join("tsconfig.json")
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().unwrap_or(Path::new(".")).to_path_buf()
}

/// Parse JSON with comments and trailing commas, as tsc accepts.
pub(crate) fn parse_jsonc(content: &str, path: &Path) -> Result<Value, ConfigError> {
    let cleaned = strip_trailing_commas(&strip_comments(content));
    serde_json::from_str(&cleaned).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Blank out `//` and `/* */` comments, leaving string contents alone.
/// Newlines are kept so parse errors report the original line.
fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Split a pattern string on the first "*" wildcard.
/// Returns (prefix, suffix). If no wildcard, the entire string is the prefix.
fn split_on_wildcard(pattern: &str) -> (&str, &str) {
    match pattern.find('*') {
        Some(pos) => (&pattern[..pos], &pattern[pos + 1..]),
        None => (pattern, ""),
    }
}

/// Match a specifier against a wildcard pattern.
/// Returns the portion matched by the wildcard, or None if no match.
fn match_pattern<'a>(specifier: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    if specifier.len() < prefix.len() + suffix.len() {
        return None;
    }
    specifier.strip_prefix(prefix)?.strip_suffix(suffix)
}
