//! package.json `exports` and `imports` map evaluation.
//!
//! Keys are matched exactly first, then against single-`*` patterns with the
//! longest prefix winning. Condition objects are walked in declaration order
//! and the first key that is an active condition (or `default`) is taken.

use serde_json::{Map, Value};

/// Resolve `subpath` (`"."` or `"./feature"`) through an `exports` field.
/// Returns the target as written in the manifest, usually `"./..."`.
pub fn resolve_exports(exports: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    match exports.as_object() {
        Some(obj) if has_subpath_keys(obj) => resolve_map(obj, subpath, conditions),
        // String, array or root-level conditions object: only "." is exported.
        _ if subpath == "." => resolve_target(exports, conditions, None),
        _ => None,
    }
}

/// Resolve a `#`-prefixed specifier through an `imports` field.
pub fn resolve_imports(imports: &Value, specifier: &str, conditions: &[String]) -> Option<String> {
    resolve_map(imports.as_object()?, specifier, conditions)
}

fn resolve_map(map: &Map<String, Value>, key: &str, conditions: &[String]) -> Option<String> {
    if let Some(target) = map.get(key).filter(|_| !key.contains('*')) {
        return resolve_target(target, conditions, None);
    }

    let (target, captured) = map
        .iter()
        .filter(|(pattern, _)| pattern.matches('*').count() == 1)
        .filter_map(|(pattern, target)| {
            let (prefix, suffix) = pattern.split_once('*')?;
            let captured = key.strip_prefix(prefix)?.strip_suffix(suffix)?;
            if captured.is_empty() || key.len() < prefix.len() + suffix.len() {
                return None;
            }
            Some((prefix.len(), target, captured))
        })
        .max_by_key(|(prefix_len, _, _)| *prefix_len)
        .map(|(_, target, captured)| (target, captured))?;

    resolve_target(target, conditions, Some(captured))
}

fn resolve_target(target: &Value, conditions: &[String], captured: Option<&str>) -> Option<String> {
    match target {
        Value::String(s) => {
            let resolved = match captured {
                Some(value) => s.replace('*', value),
                None => s.clone(),
            };
            // Targets may not escape the package.
            if resolved.split('/').any(|segment| segment == "..") {
                return None;
            }
            Some(resolved)
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_target(item, conditions, captured)),
        Value::Object(obj) => obj
            .iter()
            .filter(|(key, _)| key.as_str() == "default" || conditions.iter().any(|c| c == *key))
            .find_map(|(_, value)| resolve_target(value, conditions, captured)),
        _ => None,
    }
}

fn has_subpath_keys(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with('.'))
}
