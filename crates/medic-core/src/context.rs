//! Code context extraction around a crash line.
//!
//! Two tiers:
//! 1. Parse the file with tree-sitter-python and return the first
//!    `function_definition` (pre-order, outermost first) whose line span
//!    contains the crash line.
//! 2. Otherwise, a fixed window of lines around the crash, clipped to the file.
//!
//! A tree containing `ERROR` or `MISSING` nodes counts as a failed parse.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

use crate::error::{MedicError, Result};

/// Lines above and below the crash line in window mode.
pub const DEFAULT_WINDOW_RADIUS: usize = 5;

const FUNCTION_KIND: &str = "function_definition";

/// How a [`CodeContext`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    FunctionScope,
    LineWindow,
}

impl ContextOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FunctionScope => "function_scope",
            Self::LineWindow => "line_window",
        }
    }
}

/// Source fragment sent to the model and later patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    pub source: String,
    pub origin: ContextOrigin,
}

/// Extracts the enclosing code unit for a crash line.
#[derive(Debug, Clone, Copy)]
pub struct ContextExtractor {
    radius: usize,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_RADIUS)
    }
}

impl ContextExtractor {
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Read `path` and extract the context for 1-based `line`.
    pub fn extract(&self, path: &Path, line: usize) -> Result<CodeContext> {
        let source = std::fs::read_to_string(path)?;
        self.extract_from_source(&source, line)
            .ok_or_else(|| MedicError::ContextNotFound {
                path: path.to_path_buf(),
                line,
            })
    }

    /// Extract from already-loaded source. `None` only when the line lies
    /// past the end of the file.
    pub fn extract_from_source(&self, source: &str, line: usize) -> Option<CodeContext> {
        match enclosing_function(source, line) {
            Ok(Some(text)) => {
                return Some(CodeContext {
                    source: text,
                    origin: ContextOrigin::FunctionScope,
                })
            }
            Ok(None) => debug!(line, "no enclosing function; using line window"),
            Err(e) => warn!(error = %e, "syntax tree unavailable; using line window"),
        }

        line_window(source, line, self.radius).map(|text| CodeContext {
            source: text,
            origin: ContextOrigin::LineWindow,
        })
    }
}

/// Source text of the outermost function whose span contains `line`.
///
/// `Ok(None)` when the source does not parse cleanly or no function
/// contains the line.
pub fn enclosing_function(source: &str, line: usize) -> Result<Option<String>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| MedicError::Parser(e.to_string()))?;

    let Some(tree) = parser.parse(source, None) else {
        return Ok(None);
    };
    let root = tree.root_node();
    if root.has_error() {
        debug!("source has syntax errors");
        return Ok(None);
    }

    let mut stack: Vec<Node> = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == FUNCTION_KIND {
            let (start, end) = line_span(&node);
            if start <= line && line <= end {
                let text = &source[node.byte_range()];
                return Ok(Some(text.trim_end().to_string()));
            }
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }

    Ok(None)
}

/// 1-based inclusive line span of a node.
fn line_span(node: &Node) -> (usize, usize) {
    let start = node.start_position().row + 1;
    let end_pos = node.end_position();
    // A node ending at column 0 stops at the previous line's newline.
    let end = if end_pos.column == 0 && end_pos.row + 1 > start {
        end_pos.row
    } else {
        end_pos.row + 1
    };
    (start, end)
}

/// Lines `line - radius ..= line + radius`, clipped to the file.
pub fn line_window(source: &str, line: usize, radius: usize) -> Option<String> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let center = line.saturating_sub(1);
    let start = center.saturating_sub(radius);
    let end = lines.len().min(center + radius + 1);
    if start >= end {
        return None;
    }
    Some(lines[start..end].concat())
}
