use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Machine-readable category of a resolution failure, used for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveErrorKind {
    NotFound,
    UnsupportedDirectory,
    PathNotExported,
    ImportNotDefined,
    UnknownBuiltin,
    InvalidSpecifier,
    Config,
}

/// Failure to resolve a specifier.
///
/// `specifier` is what gets displayed and is always the text the user wrote
/// once the error leaves the shim. `attempted` keeps the internal candidate
/// (appended extension, `/index` suffix, mapped path) that actually failed.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot find module '{}'{}", .specifier, imported_from(.parent.as_ref()))]
    NotFound {
        specifier: String,
        attempted: String,
        parent: Option<Url>,
    },

    #[error(
        "Directory import '{}' is not supported resolving ES modules{}",
        .specifier,
        imported_from(.parent.as_ref())
    )]
    UnsupportedDirectory {
        specifier: String,
        attempted: String,
        parent: Option<Url>,
    },

    #[error(
        "Package subpath '{}' is not defined by \"exports\" in {}",
        .subpath,
        .package_json.display()
    )]
    PathNotExported {
        specifier: String,
        subpath: String,
        package_json: PathBuf,
    },

    #[error(
        "Package import specifier '{}' is not defined in {}",
        .specifier,
        .package_json.display()
    )]
    ImportNotDefined {
        specifier: String,
        attempted: String,
        package_json: PathBuf,
    },

    #[error("No such built-in module: {specifier}")]
    UnknownBuiltin { specifier: String },

    #[error("Invalid module specifier '{specifier}': {reason}")]
    InvalidSpecifier { specifier: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn imported_from(parent: Option<&Url>) -> String {
    match parent {
        Some(url) => format!(" imported from {}", url),
        None => String::new(),
    }
}

impl ResolveError {
    pub fn not_found(specifier: &str, parent: Option<&Url>) -> Self {
        ResolveError::NotFound {
            specifier: specifier.to_string(),
            attempted: specifier.to_string(),
            parent: parent.cloned(),
        }
    }

    pub fn kind(&self) -> ResolveErrorKind {
        match self {
            ResolveError::NotFound { .. } => ResolveErrorKind::NotFound,
            ResolveError::UnsupportedDirectory { .. } => ResolveErrorKind::UnsupportedDirectory,
            ResolveError::PathNotExported { .. } => ResolveErrorKind::PathNotExported,
            ResolveError::ImportNotDefined { .. } => ResolveErrorKind::ImportNotDefined,
            ResolveError::UnknownBuiltin { .. } => ResolveErrorKind::UnknownBuiltin,
            ResolveError::InvalidSpecifier { .. } => ResolveErrorKind::InvalidSpecifier,
            ResolveError::Config(_) => ResolveErrorKind::Config,
        }
    }

    /// Whether a fallback step may swallow this error and try its next candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ResolveErrorKind::NotFound
                | ResolveErrorKind::UnsupportedDirectory
                | ResolveErrorKind::PathNotExported
                | ResolveErrorKind::ImportNotDefined
        )
    }

    /// The specifier shown to the user.
    pub fn specifier(&self) -> Option<&str> {
        match self {
            ResolveError::NotFound { specifier, .. }
            | ResolveError::UnsupportedDirectory { specifier, .. }
            | ResolveError::PathNotExported { specifier, .. }
            | ResolveError::ImportNotDefined { specifier, .. }
            | ResolveError::UnknownBuiltin { specifier }
            | ResolveError::InvalidSpecifier { specifier, .. } => Some(specifier),
            ResolveError::Config(_) => None,
        }
    }

    /// The internal candidate that failed, when it differs from the shown specifier.
    pub fn attempted(&self) -> Option<&str> {
        match self {
            ResolveError::NotFound { attempted, .. }
            | ResolveError::UnsupportedDirectory { attempted, .. }
            | ResolveError::ImportNotDefined { attempted, .. } => Some(attempted),
            _ => None,
        }
    }

    /// Relabel the error with the specifier the caller asked for.
    pub fn with_specifier(mut self, original: &str) -> Self {
        match &mut self {
            ResolveError::NotFound { specifier, .. }
            | ResolveError::UnsupportedDirectory { specifier, .. }
            | ResolveError::PathNotExported { specifier, .. }
            | ResolveError::ImportNotDefined { specifier, .. }
            | ResolveError::UnknownBuiltin { specifier }
            | ResolveError::InvalidSpecifier { specifier, .. } => {
                *specifier = original.to_string();
            }
            ResolveError::Config(_) => {}
        }
        self
    }
}

/// Failure to read or parse a tsconfig or package.json file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid glob pattern in {}: {source}", .path.display())]
    Glob {
        path: PathBuf,
        #[source]
        source: globset::Error,
    },

    #[error("circular \"extends\" chain through {}", .path.display())]
    CircularExtends { path: PathBuf },

    #[error("cannot find base config '{extends}' extended by {}", .path.display())]
    ExtendsNotFound { extends: String, path: PathBuf },
}

/// The transform capability rejected a source file.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("{}:{line}:{column}: {message}", .path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{}:{line}:{column}: unsupported syntax: {construct}", .path.display())]
    Unsupported {
        path: PathBuf,
        line: usize,
        column: usize,
        construct: String,
    },

    #[error("failed to initialize parser: {0}")]
    Parser(String),
}

/// A source map that could not be read back.
#[derive(Error, Debug)]
pub enum SourceMapError {
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported source map version {0}")]
    Version(u32),

    #[error("invalid mappings at byte {offset}: {reason}")]
    Mappings { offset: usize, reason: &'static str },
}

/// Failure inside a load hook.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load '{url}': unsupported URL scheme")]
    UnsupportedUrl { url: Url },

    #[error("'{url}' is not valid UTF-8")]
    InvalidUtf8 { url: Url },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
