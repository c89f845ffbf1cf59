use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The execution mode a loaded module is interpreted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// Non-ESM executable (CommonJS).
    #[serde(rename = "commonjs")]
    Script,
    /// ESM executable.
    Module,
    /// Data document.
    Json,
    /// Host-provided builtin.
    Builtin,
    /// Opaque, host-synthesized.
    Dynamic,
    Wasm,
}

impl ModuleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleFormat::Script => "commonjs",
            ModuleFormat::Module => "module",
            ModuleFormat::Json => "json",
            ModuleFormat::Builtin => "builtin",
            ModuleFormat::Dynamic => "dynamic",
            ModuleFormat::Wasm => "wasm",
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commonjs" | "script" => Ok(ModuleFormat::Script),
            "module" => Ok(ModuleFormat::Module),
            "json" => Ok(ModuleFormat::Json),
            "builtin" => Ok(ModuleFormat::Builtin),
            "dynamic" => Ok(ModuleFormat::Dynamic),
            "wasm" => Ok(ModuleFormat::Wasm),
            _ => Err(format!("unknown module format: {}", s)),
        }
    }
}

/// Source extensions that always go through the transform: `.ts`, `.cts`, `.mts`, `.tsx`, `.jsx`.
static SOURCE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([cm]?ts|[tj]sx)$").unwrap());

/// Classify a location by its extension alone.
///
/// Returns `None` for the ambiguous extensions (`.js`, `.ts`, `.tsx`, `.jsx`
/// and anything unrecognized); those defer to the package's declared type.
pub fn classify(location: &str) -> Option<ModuleFormat> {
    match extension_of(location) {
        Some("json") => Some(ModuleFormat::Json),
        Some("cjs" | "cts") => Some(ModuleFormat::Script),
        Some("mjs" | "mts") => Some(ModuleFormat::Module),
        _ => None,
    }
}

/// Whether the location names an uncompiled source file.
pub fn is_source_path(location: &str) -> bool {
    SOURCE_EXTENSION.is_match(strip_suffixes(location))
}

pub fn is_json_path(location: &str) -> bool {
    extension_of(location) == Some("json")
}

/// Plain `.js`: executable, but its format depends on package configuration.
pub fn is_ambiguous_script(location: &str) -> bool {
    extension_of(location) == Some("js")
}

fn strip_suffixes(location: &str) -> &str {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    &location[..end]
}

fn extension_of(location: &str) -> Option<&str> {
    Path::new(strip_suffixes(location))
        .extension()
        .and_then(|e| e.to_str())
}
