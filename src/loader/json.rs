use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::sourcemap::SourceMap;
use super::transform::TransformOutput;
use crate::error::TransformError;

const BINDING: &str = "__json__";
const PREFIX: &str = "const __json__ = ";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

fn is_exportable(key: &str) -> bool {
    key != BINDING && IDENTIFIER.is_match(key) && !RESERVED.contains(&key)
}

/// Turn a JSON document into an ES module whose default export is the
/// parsed value. Top-level keys that are usable identifiers also become
/// named exports.
pub fn transform_json(source: &str, path: &Path) -> Result<TransformOutput, TransformError> {
    let document = source.strip_prefix('\u{feff}').unwrap_or(source);
    let value: Value = serde_json::from_str(document).map_err(|e| TransformError::Syntax {
        path: path.to_path_buf(),
        line: e.line(),
        column: e.column(),
        message: format!("invalid JSON: {e}"),
    })?;

    let body = document.trim_end();
    let mut code = format!("{PREFIX}{body};\nexport default {BINDING};\n");
    if let Value::Object(entries) = &value {
        for key in entries.keys().filter(|k| is_exportable(k)) {
            code.push_str(&format!("export const {key} = {BINDING}[\"{key}\"];\n"));
        }
    }

    let mut map = SourceMap::new();
    let idx = map.add_source(&path.to_string_lossy(), Some(source));
    map.add(0, 0, idx, 0, 0);
    map.add(0, PREFIX.len() as u32, idx, 0, 0);
    for line in 1..body.split('\n').count() as u32 {
        map.add(line, 0, idx, line, 0);
    }

    Ok(TransformOutput {
        code,
        map: Some(map),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_document() {
        let out = transform_json("{\n  \"name\": \"demo\",\n  \"version\": 2\n}\n", Path::new("pkg.json"))
            .unwrap();
        assert!(out.code.starts_with("const __json__ = {\n  \"name\": \"demo\","));
        assert!(out.code.contains("export default __json__;"));
        assert!(out.code.contains("export const name = __json__[\"name\"];"));
        assert!(out.code.contains("export const version = __json__[\"version\"];"));
    }

    #[test]
    fn test_unusable_keys_are_default_only() {
        let out = transform_json(
            r#"{ "kebab-case": 1, "default": 2, "__json__": 3, "9lives": 4, "ok": 5 }"#,
            Path::new("a.json"),
        )
        .unwrap();
        assert_eq!(out.code.matches("export const").count(), 1);
        assert!(out.code.contains("export const ok ="));
    }

    #[test]
    fn test_non_object_document() {
        let out = transform_json("[1, 2, 3]", Path::new("list.json")).unwrap();
        assert_eq!(out.code, "const __json__ = [1, 2, 3];\nexport default __json__;\n");
    }

    #[test]
    fn test_invalid_json_is_syntax_error() {
        let err = transform_json("{\n  \"a\": ,\n}", Path::new("bad.json")).unwrap_err();
        match err {
            TransformError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_map_shifts_first_line_only() {
        let out = transform_json("{\n  \"a\": 1\n}", Path::new("a.json")).unwrap();
        let map = out.map.unwrap();
        let origin = map.original_position(0, PREFIX.len() as u32).unwrap();
        assert_eq!((origin.line, origin.column), (0, 0));
        let origin = map.original_position(1, 2).unwrap();
        assert_eq!((origin.line, origin.column), (1, 0));
    }
}
