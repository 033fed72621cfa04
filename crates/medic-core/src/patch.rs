//! Diff presentation and exact-substring patching.
//!
//! `apply_fix` is the only guard against patching stale context: it re-reads
//! the file and replaces the first exact occurrence of the trimmed original
//! code, or does nothing at all.

use std::path::Path;

use similar::{ChangeTag, TextDiff};
use tracing::{debug, warn};

use crate::error::Result;

const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

/// Unified line diff of the trimmed texts, headers `original` / `fixed`.
pub fn render_diff(old: &str, new: &str, color: bool) -> String {
    let old = old.trim();
    let new = new.trim();
    let diff = TextDiff::from_lines(old, new);

    let mut out = String::from("--- original\n+++ fixed\n");
    for group in diff.grouped_ops(3) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_range.start + 1,
            old_range.len(),
            new_range.start + 1,
            new_range.len()
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                let content = change.value().trim_end_matches('\n');
                let (sign, paint) = match change.tag() {
                    ChangeTag::Equal => (' ', None),
                    ChangeTag::Insert => ('+', Some(GREEN)),
                    ChangeTag::Delete => ('-', Some(RED)),
                };
                match paint {
                    Some(code) if color => {
                        out.push_str(&format!("{code}{sign}{content}{RESET}\n"))
                    }
                    _ => out.push_str(&format!("{sign}{content}\n")),
                }
            }
        }
    }
    out
}

/// Print the proposed change between banner lines.
pub fn present_diff(old: &str, new: &str) {
    println!("\n--- PROPOSED CHANGES ---");
    print!("{}", render_diff(old, new, true));
    println!("--- END CHANGES ---\n");
}

/// Replace the first occurrence of `old_code.trim()` in `path` with
/// `new_code.trim()`.
///
/// Returns `Ok(false)` and leaves the file untouched when the trimmed original
/// is empty or no longer present in the current contents.
pub fn apply_fix(path: &Path, old_code: &str, new_code: &str) -> Result<bool> {
    let content = std::fs::read_to_string(path)?;
    let needle = old_code.trim();

    if needle.is_empty() || !content.contains(needle) {
        warn!(file = %path.display(), "original code not found; file left unchanged");
        return Ok(false);
    }

    let patched = content.replacen(needle, new_code.trim(), 1);
    std::fs::write(path, patched)?;
    debug!(file = %path.display(), "fix written");
    Ok(true)
}
