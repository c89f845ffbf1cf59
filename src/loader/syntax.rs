//! tree-sitter helpers shared by the loader: grammar selection, the ESM
//! syntax sniff and dynamic `import()` detection.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Grammar {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "mts" | "cts") => Grammar::TypeScript,
            Some("tsx") => Grammar::Tsx,
            _ => Grammar::JavaScript,
        }
    }

    fn create_parser(self) -> Result<Parser, TransformError> {
        let mut parser = Parser::new();
        let language = match self {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        };
        parser
            .set_language(&language)
            .map_err(|e| TransformError::Parser(e.to_string()))?;
        Ok(parser)
    }

    /// Parse `source`. tree-sitter always produces a tree; syntax errors
    /// show up as ERROR or missing nodes inside it.
    pub fn parse(self, source: &str) -> Result<Tree, TransformError> {
        self.create_parser()?
            .parse(source, None)
            .ok_or_else(|| TransformError::Parser("tree-sitter failed to parse".to_string()))
    }
}

/// Whether the JavaScript source uses ESM syntax: a top-level
/// `import`/`export` statement, or `import.meta` anywhere.
pub fn is_esm_syntax(source: &str) -> bool {
    let Ok(tree) = Grammar::JavaScript.parse(source) else {
        return false;
    };
    let root = tree.root_node();

    let mut cursor = root.walk();
    let has_module_statement = root
        .children(&mut cursor)
        .any(|child| matches!(child.kind(), "import_statement" | "export_statement"));

    let uses_meta = has_module_statement
        || descendants(root).any(|node| node.kind() == "meta_property");
    uses_meta
}

/// Preorder traversal of `root` and everything below it. Driven by a
/// `TreeCursor`, so deeply nested sources never grow the call stack.
pub(crate) fn descendants<'tree>(root: Node<'tree>) -> impl Iterator<Item = Node<'tree>> {
    let mut cursor = root.walk();
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let node = cursor.node();
        if !cursor.goto_first_child() {
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    done = true;
                    break;
                }
            }
        }
        Some(node)
    })
}

/// Byte offsets just past each dynamic `import(...)` call, in source order.
pub fn dynamic_import_ends(source: &str, grammar: Grammar) -> Result<Vec<usize>, TransformError> {
    let tree = grammar.parse(source)?;
    let mut ends: Vec<usize> = descendants(tree.root_node())
        .filter(|node| {
            node.kind() == "call_expression"
                && node
                    .child_by_field_name("function")
                    .is_some_and(|f| f.kind() == "import")
        })
        .map(|node| node.end_byte())
        .collect();
    ends.sort_unstable();
    Ok(ends)
}

/// 1-based line and column (in characters) of a byte offset.
pub(crate) fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
