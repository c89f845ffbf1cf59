use std::path::Path;

use serde_json::{Map, Value};

use super::sourcemap::SourceMap;
use crate::error::TransformError;

/// Project settings handed to a transform.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Merged `compilerOptions` of the project owning the file, or `None`
    /// when the file is outside every project's scope.
    pub compiler_options: Option<Map<String, Value>>,
}

impl TransformOptions {
    /// A string compiler option, e.g. `jsx` or `target`.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.compiler_options.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<SourceMap>,
}

/// Turns a typed source file into plain module code.
///
/// Implementations must be deterministic for identical input and must not
/// retry on failure.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError>;
}
