//! Specifier normalization: prefix stripping, relative/bare classification
//! and the source-extension alternates tried ahead of compiled extensions.

use std::borrow::Cow;

use url::Url;

use crate::capabilities::HostCapabilities;

const NODE_PREFIX: &str = "node:";

/// Strip the `node:` prefix when the host cannot resolve it.
pub fn strip_node_prefix<'a>(specifier: &'a str, capabilities: &HostCapabilities) -> Cow<'a, str> {
    if capabilities.supports_node_prefix {
        return Cow::Borrowed(specifier);
    }
    match specifier.strip_prefix(NODE_PREFIX) {
        Some(rest) => Cow::Owned(rest.to_string()),
        None => Cow::Borrowed(specifier),
    }
}

/// Relative (`./`, `../`), absolute (`/`) or `file:` URL specifiers.
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("file://")
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
}

/// A specifier that carries its own URL scheme (`node:`, `data:`, `https:` ...).
pub fn has_url_scheme(specifier: &str) -> bool {
    if specifier.starts_with('#') || specifier.starts_with('@') {
        return false;
    }
    match Url::parse(specifier) {
        // Single-letter schemes are Windows drive letters, not URLs.
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Bare specifiers are package names or mapped aliases.
pub fn is_bare(specifier: &str) -> bool {
    !is_path_specifier(specifier) && !has_url_scheme(specifier)
}

/// A trailing separator asks for a directory explicitly.
pub fn is_explicit_directory(specifier: &str) -> bool {
    specifier.ends_with('/')
}

/// Whether the referencing module lives inside a vendored dependency.
pub fn is_vendored(parent: Option<&Url>) -> bool {
    parent.is_some_and(|url| url.path().contains("/node_modules/"))
}

/// Source-extension alternates for a compiled-extension specifier, in the
/// order they take priority. Empty when the specifier has no compiled extension.
pub fn source_alternates(specifier: &str) -> Vec<String> {
    let split = specifier.find(['?', '#']).unwrap_or(specifier.len());
    let (path, suffix) = specifier.split_at(split);

    let replacements: &[(&str, &[&str])] = &[
        (".js", &[".ts", ".tsx"]),
        (".jsx", &[".tsx"]),
        (".mjs", &[".mts"]),
        (".cjs", &[".cts"]),
    ];

    for (compiled, sources) in replacements {
        if let Some(stem) = path.strip_suffix(compiled) {
            if stem.is_empty() || stem.ends_with('/') {
                return Vec::new();
            }
            return sources
                .iter()
                .map(|ext| format!("{}{}{}", stem, ext, suffix))
                .collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_host() -> HostCapabilities {
        HostCapabilities {
            supports_node_prefix: false,
            ..HostCapabilities::default()
        }
    }

    #[test]
    fn test_strip_node_prefix_only_on_old_hosts() {
        assert_eq!(strip_node_prefix("node:fs", &legacy_host()), "fs");
        assert_eq!(strip_node_prefix("node:fs", &HostCapabilities::default()), "node:fs");
        assert_eq!(strip_node_prefix("fs", &legacy_host()), "fs");
    }

    #[test]
    fn test_path_specifiers() {
        assert!(is_path_specifier("./a"));
        assert!(is_path_specifier("../a"));
        assert!(is_path_specifier("/abs/a"));
        assert!(is_path_specifier("file:///abs/a"));
        assert!(!is_path_specifier("lodash"));
        assert!(!is_path_specifier("@scope/pkg"));
        assert!(!is_path_specifier(".hidden"));
    }

    #[test]
    fn test_bare_specifiers() {
        assert!(is_bare("lodash"));
        assert!(is_bare("@utils/format"));
        assert!(is_bare("#internal"));
        assert!(!is_bare("node:fs"));
        assert!(!is_bare("https://esm.sh/react"));
        assert!(!is_bare("./local"));
    }

    #[test]
    fn test_vendored_parent() {
        let vendored = Url::parse("file:///p/node_modules/dep/index.js").unwrap();
        let local = Url::parse("file:///p/src/index.ts").unwrap();
        assert!(is_vendored(Some(&vendored)));
        assert!(!is_vendored(Some(&local)));
        assert!(!is_vendored(None));
    }

    #[test]
    fn test_source_alternates() {
        assert_eq!(source_alternates("./a.js"), vec!["./a.ts", "./a.tsx"]);
        assert_eq!(source_alternates("./a.jsx"), vec!["./a.tsx"]);
        assert_eq!(source_alternates("./a.mjs"), vec!["./a.mts"]);
        assert_eq!(source_alternates("./a.cjs"), vec!["./a.cts"]);
        assert_eq!(source_alternates("./a.js?x=1"), vec!["./a.ts?x=1", "./a.tsx?x=1"]);
        assert!(source_alternates("./a.ts").is_empty());
        assert!(source_alternates("./a").is_empty());
        assert!(source_alternates("./dir/.js").is_empty());
    }
}
