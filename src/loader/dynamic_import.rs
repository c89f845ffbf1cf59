//! Rewrites dynamic `import()` calls so that importing a transpiled CommonJS
//! module whose only export is an `__esModule`-flagged default resolves to
//! that default instead of the namespace wrapper.

use std::path::Path;

use super::sourcemap::SourceMap;
use super::syntax::{dynamic_import_ends, Grammar};
use super::transform::TransformOutput;
use crate::error::TransformError;

/// Appended after every dynamic `import(...)` call.
pub const CHECK_ES_MODULE: &str = ".then((mod)=>{const exports = Object.keys(mod);if(exports.length===1&&exports[0]==='default'&&mod.default&&mod.default.__esModule){return mod.default}return mod})";

/// Rewrite the dynamic imports of `code`. Returns `None` when there is
/// nothing to rewrite. The map points back into `code` itself.
pub fn rewrite_dynamic_imports(
    code: &str,
    path: &Path,
    grammar: Grammar,
) -> Result<Option<TransformOutput>, TransformError> {
    if !code.contains("import") {
        return Ok(None);
    }
    let ends = dynamic_import_ends(code, grammar)?;
    if ends.is_empty() {
        return Ok(None);
    }

    let mut out = String::with_capacity(code.len() + ends.len() * CHECK_ES_MODULE.len());
    let mut last = 0;
    for &end in &ends {
        out.push_str(&code[last..end]);
        out.push_str(CHECK_ES_MODULE);
        last = end;
    }
    out.push_str(&code[last..]);

    let map = insertion_map(code, &path.to_string_lossy(), &ends);
    Ok(Some(TransformOutput {
        code: out,
        map: Some(map),
    }))
}

/// Map for `code` with `CHECK_ES_MODULE` inserted at each byte offset in
/// `insertions`. Columns are UTF-16 code units. Inserted text maps to the
/// end of the call it follows.
fn insertion_map(code: &str, source_path: &str, insertions: &[usize]) -> SourceMap {
    let mut map = SourceMap::new();
    let source = map.add_source(source_path, Some(code));
    let inserted_width = CHECK_ES_MODULE.encode_utf16().count() as u32;

    let mut pending = insertions.iter().peekable();
    let mut line_start = 0;
    for (line, text) in code.split('\n').enumerate() {
        let line = line as u32;
        let line_end = line_start + text.len();
        map.add(line, 0, source, line, 0);

        let mut shift = 0;
        while let Some(&&at) = pending.peek() {
            if at > line_end {
                break;
            }
            pending.next();
            let column = code[line_start..at].encode_utf16().count() as u32;
            map.add(line, column + shift, source, line, column);
            shift += inserted_width;
            map.add(line, column + shift, source, line, column);
        }
        line_start = line_end + 1;
    }
    map
}
