//! Type stripping: TypeScript source becomes runnable JavaScript by blanking
//! type-only syntax with whitespace, so every line and column keeps its
//! original position.

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

use tree_sitter::Node;

use super::sourcemap::SourceMap;
use super::syntax::{line_column, Grammar};
use super::transform::{TransformOptions, TransformOutput, Transformer};
use crate::error::TransformError;

/// Nodes that carry no runtime semantics and are blanked whole.
const TYPE_ONLY: &[&str] = &[
    "type_annotation",
    "type_predicate_annotation",
    "asserts_annotation",
    "omitting_type_annotation",
    "adding_type_annotation",
    "opting_type_annotation",
    "type_parameters",
    "type_arguments",
    "implements_clause",
];

/// Declarations that are removed entirely, together with an enclosing
/// `export`.
const TYPE_DECLARATIONS: &[&str] = &[
    "interface_declaration",
    "type_alias_declaration",
    "ambient_declaration",
    "function_signature",
    "method_signature",
    "abstract_method_signature",
    "index_signature",
];

/// The default transformer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeStripper;

impl TypeStripper {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for TypeStripper {
    fn transform(
        &self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        let grammar = Grammar::for_path(path);
        let tree = grammar.parse(source)?;
        let root = tree.root_node();

        if root.has_error() {
            return Err(syntax_error(source, path, root));
        }

        let mut walk = Walk {
            source,
            path,
            blanks: Vec::new(),
            used: HashSet::new(),
            imports: Vec::new(),
            moved: Vec::new(),
        };
        walk.run(root)?;

        let preserve_imports = ["verbatimModuleSyntax", "preserveValueImports"]
            .iter()
            .any(|key| {
                options
                    .compiler_options
                    .as_ref()
                    .and_then(|o| o.get(*key))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            });
        walk.elide_imports(preserve_imports);

        let code = blank_ranges(source, walk.blanks, &walk.moved);
        Ok(TransformOutput {
            code,
            map: Some(SourceMap::identity(&path.to_string_lossy(), source)),
        })
    }
}

struct ImportStatement<'a> {
    range: Range<usize>,
    /// Local name and the range to blank when that binding goes.
    bindings: Vec<(&'a str, Range<usize>)>,
    /// Inline `type` specifiers already blanked.
    type_only: usize,
}

struct Walk<'a> {
    source: &'a str,
    path: &'a Path,
    blanks: Vec<Range<usize>>,
    /// Identifiers referenced outside import statements and type syntax.
    used: HashSet<&'a str>,
    imports: Vec<ImportStatement<'a>>,
    /// Characters written over a blanked position instead of a space.
    moved: Vec<(usize, char)>,
}

impl<'a> Walk<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn unsupported(&self, node: Node, construct: &str) -> TransformError {
        let (line, column) = line_column(self.source, node.start_byte());
        TransformError::Unsupported {
            path: self.path.to_path_buf(),
            line,
            column,
            construct: construct.to_string(),
        }
    }

    fn blank(&mut self, node: Node) {
        self.blanks.push(node.byte_range());
    }

    /// Blank a list item along with the comma that follows it.
    fn blank_item(&mut self, node: Node) {
        self.blanks.push(item_range(node));
    }

    /// Blank a declaration or class member along with a trailing `;`.
    fn blank_member(&mut self, node: Node) {
        let end = match node.next_sibling().filter(|s| s.kind() == ";") {
            Some(semicolon) => semicolon.end_byte(),
            None => node.end_byte(),
        };
        self.blanks.push(node.start_byte()..end);
    }

    /// `(a)\n: T => a` would leave a line break before `=>` once the return
    /// type is gone, so the closing paren moves to the type's last character.
    fn move_paren_past_return_type(&mut self, node: Node) {
        let (Some(params), Some(return_type)) = (
            node.child_by_field_name("parameters"),
            node.child_by_field_name("return_type"),
        ) else {
            return;
        };
        let paren_end = params.end_byte();
        if !self.source[..paren_end].ends_with(')')
            || !self.source[paren_end..return_type.end_byte()].contains('\n')
        {
            return;
        }
        let Some((last, _)) = self.source[..return_type.end_byte()].char_indices().next_back() else {
            return;
        };
        self.blanks.push(paren_end - 1..paren_end);
        self.moved.push((last, ')'));
    }

    fn blank_children(&mut self, node: Node, kinds: &[&str]) {
        let mut cursor = node.walk();
        let matched: Vec<Range<usize>> = node
            .children(&mut cursor)
            .filter(|c| kinds.contains(&c.kind()))
            .map(|c| c.byte_range())
            .collect();
        self.blanks.extend(matched);
    }

    /// Visit every node under `root` in source order. Pending nodes live on an
    /// explicit stack, so nesting depth is bounded by memory only.
    fn run(&mut self, root: Node) -> Result<(), TransformError> {
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            self.visit(node, &mut pending)?;
        }
        Ok(())
    }

    fn visit<'t>(
        &mut self,
        node: Node<'t>,
        pending: &mut Vec<Node<'t>>,
    ) -> Result<(), TransformError> {
        let kind = node.kind();

        if TYPE_ONLY.contains(&kind) {
            self.blank(node);
            return Ok(());
        }
        if TYPE_DECLARATIONS.contains(&kind) {
            match node.parent().filter(|p| p.kind() == "export_statement") {
                Some(export) => self.blank(export),
                None => self.blank_member(node),
            }
            return Ok(());
        }

        match kind {
            "enum_declaration" => Err(self.unsupported(node, "enum")),
            "internal_module" | "module" => Err(self.unsupported(node, "namespace")),
            "import_alias" => Err(self.unsupported(node, "import alias")),
            "jsx_element" | "jsx_self_closing_element" => Err(self.unsupported(node, "JSX")),

            "import_statement" => self.visit_import(node),
            "export_statement" => self.visit_export(node, pending),
            "import_specifier" | "export_specifier" => {
                if has_child(node, "type") {
                    self.blank_item(node);
                    Ok(())
                } else {
                    descend(node, pending)
                }
            }

            "as_expression" | "satisfies_expression" => {
                let mut cursor = node.walk();
                let keyword = node
                    .children(&mut cursor)
                    .find(|c| matches!(c.kind(), "as" | "satisfies"));
                if let Some(keyword) = keyword {
                    self.blanks.push(keyword.start_byte()..node.end_byte());
                }
                pending.extend(node.named_child(0));
                Ok(())
            }
            "non_null_expression" | "variable_declarator" => {
                self.blank_children(node, &["!"]);
                descend(node, pending)
            }

            "required_parameter" | "optional_parameter" => {
                if has_child(node, "accessibility_modifier")
                    || has_child(node, "override_modifier")
                    || has_child(node, "readonly")
                {
                    return Err(self.unsupported(node, "parameter property"));
                }
                if has_child(node, "this") {
                    self.blank_item(node);
                    return Ok(());
                }
                self.blank_children(node, &["?"]);
                descend(node, pending)
            }
            "public_field_definition" => {
                if has_child(node, "declare") || has_child(node, "abstract") {
                    self.blank_member(node);
                    return Ok(());
                }
                self.blank_children(
                    node,
                    &["accessibility_modifier", "override_modifier", "readonly", "?", "!"],
                );
                descend(node, pending)
            }
            "method_definition" => {
                self.blank_children(node, &["accessibility_modifier", "override_modifier", "?"]);
                descend(node, pending)
            }
            "arrow_function" => {
                self.move_paren_past_return_type(node);
                descend(node, pending)
            }
            "abstract_class_declaration" => {
                self.blank_children(node, &["abstract"]);
                descend(node, pending)
            }

            "identifier" | "shorthand_property_identifier" => {
                let name = self.text(node);
                self.used.insert(name);
                Ok(())
            }
            _ => descend(node, pending),
        }
    }

    fn visit_import(&mut self, node: Node) -> Result<(), TransformError> {
        if has_child(node, "import_require_clause") {
            return Err(self.unsupported(node, "import = require()"));
        }
        if has_child(node, "type") || has_child(node, "typeof") {
            self.blank(node);
            return Ok(());
        }
        let Some(clause) = child_of_kind(node, "import_clause") else {
            return Ok(());
        };

        let mut statement = ImportStatement {
            range: node.byte_range(),
            bindings: Vec::new(),
            type_only: 0,
        };
        let mut cursor = clause.walk();
        let parts: Vec<Node> = clause.named_children(&mut cursor).collect();
        for part in parts {
            match part.kind() {
                "identifier" => statement.bindings.push((self.text(part), item_range(part))),
                "namespace_import" => {
                    if let Some(name) = child_of_kind(part, "identifier") {
                        statement.bindings.push((self.text(name), part.byte_range()));
                    }
                }
                "named_imports" => {
                    let mut inner = part.walk();
                    let specifiers: Vec<Node> = part
                        .named_children(&mut inner)
                        .filter(|s| s.kind() == "import_specifier")
                        .collect();
                    for specifier in specifiers {
                        if has_child(specifier, "type") || has_child(specifier, "typeof") {
                            self.blank_item(specifier);
                            statement.type_only += 1;
                            continue;
                        }
                        let local = specifier
                            .child_by_field_name("alias")
                            .or_else(|| specifier.child_by_field_name("name"));
                        if let Some(local) = local {
                            statement.bindings.push((self.text(local), item_range(specifier)));
                        }
                    }
                }
                _ => {}
            }
        }
        self.imports.push(statement);
        Ok(())
    }

    fn visit_export<'t>(
        &mut self,
        node: Node<'t>,
        pending: &mut Vec<Node<'t>>,
    ) -> Result<(), TransformError> {
        if has_child(node, "=") {
            return Err(self.unsupported(node, "export ="));
        }
        // `export type { .. }`, `export type * from ..`, `export as namespace X`
        if has_child(node, "type") || has_child(node, "namespace") {
            self.blank(node);
            return Ok(());
        }
        descend(node, pending)
    }

    /// Drop import bindings that are never referenced as values. A statement
    /// left with no bindings is removed whole; side-effect imports with no
    /// clause are kept.
    fn elide_imports(&mut self, preserve: bool) {
        for statement in std::mem::take(&mut self.imports) {
            if statement.bindings.is_empty() && statement.type_only == 0 {
                continue;
            }
            if preserve {
                if statement.bindings.is_empty() && statement.type_only > 0 {
                    self.blanks.push(statement.range);
                }
                continue;
            }
            let unused: Vec<Range<usize>> = statement
                .bindings
                .iter()
                .filter(|(name, _)| !self.used.contains(name))
                .map(|(_, range)| range.clone())
                .collect();
            if unused.len() == statement.bindings.len() {
                self.blanks.push(statement.range);
            } else {
                self.blanks.extend(unused);
            }
        }
    }
}

/// Queue the children of `node` so they pop off in source order.
fn descend<'t>(node: Node<'t>, pending: &mut Vec<Node<'t>>) -> Result<(), TransformError> {
    let start = pending.len();
    let mut cursor = node.walk();
    pending.extend(node.children(&mut cursor));
    pending[start..].reverse();
    Ok(())
}

fn has_child(node: Node, kind: &str) -> bool {
    child_of_kind(node, kind).is_some()
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn item_range(node: Node) -> Range<usize> {
    match node.next_sibling().filter(|s| s.kind() == ",") {
        Some(comma) => node.start_byte()..comma.end_byte(),
        None => node.byte_range(),
    }
}

/// The first ERROR or missing node, following only subtrees that contain one.
fn first_error(root: Node) -> Option<Node> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !cursor.goto_first_child() {
            return None;
        }
        while !(cursor.node().has_error() || cursor.node().is_missing()) {
            if !cursor.goto_next_sibling() {
                return None;
            }
        }
    }
}

fn syntax_error(source: &str, path: &Path, root: Node) -> TransformError {
    let node = first_error(root).unwrap_or(root);
    let (line, column) = line_column(source, node.start_byte());
    let message = if node.is_missing() {
        format!("expected \"{}\"", node.kind())
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or("");
        let snippet: String = text.chars().take(20).take_while(|c| *c != '\n').collect();
        format!("unexpected \"{snippet}\"")
    };
    TransformError::Syntax {
        path: path.to_path_buf(),
        line,
        column,
        message,
    }
}

/// Replace every character inside `ranges` with as many spaces as it has
/// UTF-16 code units. Line breaks are kept. A blanked offset listed in
/// `moved` takes that character in place of its first space.
fn blank_ranges(source: &str, mut ranges: Vec<Range<usize>>, moved: &[(usize, char)]) -> String {
    ranges.sort_by_key(|r| r.start);
    let mut out = String::with_capacity(source.len());
    let mut ranges = ranges.into_iter().peekable();
    let mut current: Option<Range<usize>> = None;

    for (offset, ch) in source.char_indices() {
        while current.as_ref().map_or(true, |r| offset >= r.end) {
            match ranges.peek() {
                Some(next) if next.start <= offset => current = ranges.next(),
                _ => break,
            }
        }
        let blanked = current.as_ref().is_some_and(|r| r.contains(&offset));
        if blanked && ch != '\n' && ch != '\r' {
            let mut width = ch.len_utf16();
            if let Some((_, replacement)) = moved.iter().find(|(at, _)| *at == offset) {
                out.push(*replacement);
                width -= 1;
            }
            for _ in 0..width {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn strip(source: &str) -> String {
        strip_path(source, "input.ts")
    }

    fn strip_path(source: &str, path: &str) -> String {
        TypeStripper::new()
            .transform(source, Path::new(path), &TransformOptions::default())
            .unwrap()
            .code
    }

    /// Collapse whitespace runs so assertions read as the emitted tokens.
    fn compact(code: &str) -> String {
        code.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    // ----------------------------------------------------------------
    // Blanking
    // ----------------------------------------------------------------

    #[test]
    fn test_annotations_blanked() {
        let out = strip("let x: number = 1;");
        assert_eq!(out, "let x         = 1;");
    }

    #[test]
    fn test_function_signature_types() {
        let out = strip("function f<T>(a: T, b?: string): T { return a!; }");
        assert_eq!(compact(&out), "function f (a , b ) { return a ; }");
        assert_eq!(out.len(), "function f<T>(a: T, b?: string): T { return a!; }".len());
    }

    #[test]
    fn test_declarations_removed() {
        let source = "interface A {\n  x: number;\n}\ntype B = A | null;\nexport interface C {}\ndeclare const d: string;\nconst e = 1;\n";
        let out = strip(source);
        assert_eq!(compact(&out), "const e = 1;");
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn test_overloads_removed() {
        let source = "export function f(a: string): string;\nexport function f(a: any) { return a; }";
        let out = strip(source);
        assert_eq!(compact(&out), "export function f(a ) { return a; }");
    }

    #[test]
    fn test_as_and_satisfies() {
        let out = strip("const a = b as unknown as string;\nconst c = { x: 1 } satisfies object;");
        assert_eq!(compact(&out), "const a = b ; const c = { x: 1 } ;");
    }

    #[test]
    fn test_class_members() {
        let source = "abstract class A extends B implements C {\n  private readonly x: number = 1;\n  declare y: string;\n  abstract z(): void;\n  public override m?(): void {}\n}";
        let out = strip(source);
        assert_eq!(compact(&out), "class A extends B { x = 1; m () {} }");
    }

    #[test]
    fn test_return_type_on_next_line_keeps_arrow_valid() {
        let out = strip("const f = (a: number)\n: number => a;\n");
        assert_eq!(out, "const f = (a         \n       ) => a;\n");

        // same-line return types leave the paren alone
        let out = strip("const g = (a: number): number => a;");
        assert_eq!(out, "const g = (a        )         => a;");
    }

    #[test]
    fn test_this_parameter_removed() {
        let out = strip("function f(this: Window, a: number) { return a; }");
        assert_eq!(compact(&out), "function f( a ) { return a; }");
    }

    #[test]
    fn test_generic_call_arguments() {
        let out = strip("const m = new Map<string, number>();\nfoo<T>(1);");
        assert_eq!(compact(&out), "const m = new Map (); foo (1);");
    }

    #[test]
    fn test_multibyte_in_type_keeps_columns() {
        let source = "let s: 'é' = 'é';";
        let out = strip(source);
        assert_eq!(out.encode_utf16().count(), source.encode_utf16().count());
        assert!(out.ends_with("= 'é';"));
    }

    // ----------------------------------------------------------------
    // Imports and exports
    // ----------------------------------------------------------------

    #[test]
    fn test_type_imports_removed() {
        let source = "import type { A } from './a';\nimport { type B, c } from './b';\nexport type { A };\nc();";
        let out = strip(source);
        assert_eq!(compact(&out), "import { c } from './b'; c();");
    }

    #[test]
    fn test_type_only_value_import_elided() {
        let source = "import { Shape, area } from './shapes';\nimport Config from './config';\nlet s: Shape;\nconsole.log(area(s));";
        let out = strip(source);
        assert_eq!(compact(&out), "import { area } from './shapes'; let s ; console.log(area(s));");
    }

    #[test]
    fn test_side_effect_import_kept() {
        let out = strip("import './polyfill';\nimport {} from './empty';");
        assert_eq!(compact(&out), "import './polyfill'; import {} from './empty';");
    }

    #[test]
    fn test_verbatim_module_syntax_keeps_imports() {
        let options = TransformOptions {
            compiler_options: json!({ "verbatimModuleSyntax": true })
                .as_object()
                .cloned(),
        };
        let out = TypeStripper::new()
            .transform(
                "import { Shape } from './shapes';\nimport { type T } from './t';",
                Path::new("a.ts"),
                &options,
            )
            .unwrap()
            .code;
        assert_eq!(compact(&out), "import { Shape } from './shapes';");
    }

    #[test]
    fn test_reexport_counts_as_use() {
        let out = strip("import { a } from './a';\nexport { a };");
        assert_eq!(compact(&out), "import { a } from './a'; export { a };");
    }

    // ----------------------------------------------------------------
    // Rejections
    // ----------------------------------------------------------------

    fn strip_err(source: &str, path: &str) -> TransformError {
        TypeStripper::new()
            .transform(source, Path::new(path), &TransformOptions::default())
            .unwrap_err()
    }

    fn construct(err: TransformError) -> String {
        match err {
            TransformError::Unsupported { construct, .. } => construct,
            other => panic!("expected unsupported syntax, got {other:?}"),
        }
    }

    #[test]
    fn test_runtime_typescript_rejected() {
        assert_eq!(construct(strip_err("enum E { A }", "a.ts")), "enum");
        assert_eq!(construct(strip_err("namespace N { export const a = 1; }", "a.ts")), "namespace");
        assert_eq!(
            construct(strip_err("class A { constructor(private x: number) {} }", "a.ts")),
            "parameter property"
        );
        assert_eq!(construct(strip_err("import fs = require('fs');", "a.ts")), "import = require()");
        assert_eq!(construct(strip_err("export = 1;", "a.ts")), "export =");
    }

    #[test]
    fn test_declared_runtime_constructs_are_blanked() {
        let out = strip("declare enum E { A }\ndeclare namespace N {}\nexport const a = 1;");
        assert_eq!(compact(&out), "export const a = 1;");
    }

    #[test]
    fn test_jsx_rejected() {
        let err = strip_err("const a = <div>hi</div>;", "a.tsx");
        match err {
            TransformError::Unsupported { construct, line, column, .. } => {
                assert_eq!(construct, "JSX");
                assert_eq!((line, column), (1, 11));
            }
            other => panic!("expected unsupported syntax, got {other:?}"),
        }
    }

    #[test]
    fn test_jsx_file_without_elements_passes() {
        let out = strip_path("export const a = 1;", "a.jsx");
        assert_eq!(out, "export const a = 1;");
    }

    #[test]
    fn test_syntax_error_position() {
        let err = strip_err("const a = 1;\nconst = ;", "a.ts");
        match err {
            TransformError::Syntax { line, path, .. } => {
                assert_eq!(line, 2);
                assert_eq!(path, Path::new("a.ts"));
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_deeply_nested_source() {
        let depth = 20_000;
        let source = format!(
            "const a: unknown = {}{};\nconst b = (x: number) => x;\n",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let out = strip(&source);
        assert_eq!(out.len(), source.len());
        assert!(out.ends_with("const b = (x        ) => x;\n"));
    }

    #[test]
    fn test_identity_map() {
        let output = TypeStripper::new()
            .transform("let a: A;\nlet b: B;", Path::new("/src/a.ts"), &TransformOptions::default())
            .unwrap();
        let map = output.map.unwrap();
        assert_eq!(map.sources, vec!["/src/a.ts".to_string()]);
        assert_eq!(map.original_position(1, 4).unwrap().line, 1);
    }

    // ----------------------------------------------------------------
    // Range blanking
    // ----------------------------------------------------------------

    #[test]
    fn test_blank_ranges_overlapping() {
        let out = blank_ranges("abcdef\ngh", vec![4..8, 1..3, 2..5], &[]);
        assert_eq!(out, "a     \n h");
    }

    #[test]
    fn test_blank_ranges_moved_character() {
        let out = blank_ranges("(a)\n: é", vec![2..3, 4..8], &[(6, ')')]);
        assert_eq!(out, "(a \n  )");
    }
}
