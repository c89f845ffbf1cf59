//! V3 source maps: building, VLQ encoding, parsing, inline data URLs, and
//! the per-URL registry consulted when reporting positions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SourceMapError;

const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// One mapping on a generated line. All positions are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_column: u32,
    pub source: u32,
    pub original_line: u32,
    pub original_column: u32,
    pub name: Option<u32>,
}

/// Where a generated position came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    /// Segments per generated line, sorted by column.
    lines: Vec<Vec<Segment>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    file: Option<String>,
    sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map where every generated line comes from the same original line.
    pub fn identity(source_path: &str, source: &str) -> Self {
        let mut map = SourceMap::new();
        let idx = map.add_source(source_path, Some(source));
        for line in 0..line_count(source) {
            map.add(line, 0, idx, line, 0);
        }
        map
    }

    /// Register a source file and return its index.
    pub fn add_source(&mut self, path: &str, content: Option<&str>) -> u32 {
        if let Some(pos) = self.sources.iter().position(|s| s == path) {
            return pos as u32;
        }
        self.sources.push(path.to_string());
        self.sources_content.push(content.map(str::to_string));
        (self.sources.len() - 1) as u32
    }

    pub fn add(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source: u32,
        original_line: u32,
        original_column: u32,
    ) {
        self.push(
            generated_line,
            Segment {
                generated_column,
                source,
                original_line,
                original_column,
                name: None,
            },
        );
    }

    fn push(&mut self, generated_line: u32, segment: Segment) {
        let line = generated_line as usize;
        if self.lines.len() <= line {
            self.lines.resize_with(line + 1, Vec::new);
        }
        let segments = &mut self.lines[line];
        let at = segments.partition_point(|s| s.generated_column <= segment.generated_column);
        segments.insert(at, segment);
    }

    pub fn lines(&self) -> &[Vec<Segment>] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(Vec::is_empty)
    }

    /// The original position for a 0-based generated position: the last
    /// segment on that line starting at or before `column`.
    pub fn original_position(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let segments = self.lines.get(line as usize)?;
        let at = segments.partition_point(|s| s.generated_column <= column);
        let segment = segments.get(at.checked_sub(1)?)?;
        Some(OriginalPosition {
            source: self.sources.get(segment.source as usize)?.clone(),
            line: segment.original_line,
            column: segment.original_column,
            name: segment
                .name
                .and_then(|n| self.names.get(n as usize))
                .cloned(),
        })
    }

    /// Chain two maps: `self` maps output to an intermediate text that
    /// `earlier` maps back to the original sources.
    pub fn compose(&self, earlier: &SourceMap) -> SourceMap {
        let mut composed = SourceMap {
            file: self.file.clone(),
            ..SourceMap::default()
        };
        for (line, segments) in self.lines.iter().enumerate() {
            for segment in segments {
                let Some(origin) =
                    earlier.original_position(segment.original_line, segment.original_column)
                else {
                    continue;
                };
                let content = earlier
                    .sources
                    .iter()
                    .position(|s| *s == origin.source)
                    .and_then(|i| earlier.sources_content.get(i).cloned().flatten());
                let source = composed.add_source(&origin.source, content.as_deref());
                composed.add(line as u32, segment.generated_column, source, origin.line, origin.column);
            }
        }
        composed
    }

    fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;
        let mut prev_column: i64 = 0;
        let mut prev_name: i64 = 0;

        for (i, segments) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut prev_generated: i64 = 0;
            for (j, segment) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                vlq_encode(i64::from(segment.generated_column) - prev_generated, &mut out);
                vlq_encode(i64::from(segment.source) - prev_source, &mut out);
                vlq_encode(i64::from(segment.original_line) - prev_line, &mut out);
                vlq_encode(i64::from(segment.original_column) - prev_column, &mut out);
                if let Some(name) = segment.name {
                    vlq_encode(i64::from(name) - prev_name, &mut out);
                    prev_name = i64::from(name);
                }
                prev_generated = i64::from(segment.generated_column);
                prev_source = i64::from(segment.source);
                prev_line = i64::from(segment.original_line);
                prev_column = i64::from(segment.original_column);
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw = RawSourceMap {
            version: 3,
            file: self.file.clone(),
            sources: self.sources.clone(),
            sources_content: if self.sources_content.iter().all(Option::is_none) {
                Vec::new()
            } else {
                self.sources_content.clone()
            },
            names: self.names.clone(),
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&raw)
    }

    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(SourceMapError::Version(raw.version));
        }

        let mut map = SourceMap {
            file: raw.file,
            sources_content: if raw.sources_content.is_empty() {
                vec![None; raw.sources.len()]
            } else {
                raw.sources_content
            },
            sources: raw.sources,
            names: raw.names,
            lines: Vec::new(),
        };

        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;
        let mut prev_column: i64 = 0;
        let mut prev_name: i64 = 0;
        let mut offset = 0;

        for (line, group) in raw.mappings.split(';').enumerate() {
            map.lines.push(Vec::new());
            let mut prev_generated: i64 = 0;
            for field in group.split(',').filter(|f| !f.is_empty()) {
                let values = vlq_decode(field, offset)?;
                offset += field.len() + 1;
                match values.len() {
                    // Unmapped generated column.
                    1 => continue,
                    4 | 5 => {}
                    _ => {
                        return Err(SourceMapError::Mappings {
                            offset,
                            reason: "segment must have 1, 4 or 5 fields",
                        })
                    }
                }
                prev_generated += values[0];
                prev_source += values[1];
                prev_line += values[2];
                prev_column += values[3];
                let name = values.get(4).map(|delta| {
                    prev_name += delta;
                    prev_name as u32
                });
                map.push(
                    line as u32,
                    Segment {
                        generated_column: prev_generated as u32,
                        source: prev_source as u32,
                        original_line: prev_line as u32,
                        original_column: prev_column as u32,
                        name,
                    },
                );
            }
            offset += 1;
        }

        Ok(map)
    }

    /// `data:application/json;base64,...`
    pub fn to_data_url(&self) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(json.as_bytes());
        Ok(format!("data:application/json;base64,{}", encoded))
    }

    /// The trailing comment that makes a host pick the map up inline.
    pub fn to_comment(&self) -> Result<String, serde_json::Error> {
        Ok(format!("//# sourceMappingURL={}", self.to_data_url()?))
    }
}

/// VLQ-encode a signed integer and append to output string.
fn vlq_encode(value: i64, out: &mut String) {
    let mut v = (if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    }) as u64;
    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20; // continuation bit
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

fn vlq_decode(field: &str, offset: usize) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift = 0;

    for (i, byte) in field.bytes().enumerate() {
        let digit = B64
            .iter()
            .position(|&b| b == byte)
            .ok_or(SourceMapError::Mappings {
                offset: offset + i,
                reason: "invalid base64 digit",
            })? as i64;
        value += (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            if shift > 60 {
                return Err(SourceMapError::Mappings {
                    offset: offset + i,
                    reason: "VLQ value overflows",
                });
            }
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(SourceMapError::Mappings {
            offset: offset + field.len(),
            reason: "unterminated VLQ value",
        });
    }
    Ok(values)
}

fn line_count(source: &str) -> u32 {
    source.split('\n').count() as u32
}

/// Maps registered for loaded modules, keyed by URL.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    maps: Mutex<HashMap<String, Arc<SourceMap>>>,
}

impl SourceMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &Url, map: SourceMap) {
        self.lock().insert(url.to_string(), Arc::new(map));
    }

    pub fn get(&self, url: &Url) -> Option<Arc<SourceMap>> {
        self.lock().get(url.as_str()).cloned()
    }

    pub fn original_position(&self, url: &Url, line: u32, column: u32) -> Option<OriginalPosition> {
        self.get(url)?.original_position(line, column)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SourceMap>>> {
        self.maps.lock().unwrap_or_else(|e| e.into_inner())
    }
}
