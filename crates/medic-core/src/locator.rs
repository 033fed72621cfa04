//! Traceback location.
//!
//! Finds the `File "<path>", line <n>` frame closest to the end of the
//! captured output. Python prints the innermost frame last, so scanning
//! backward and stopping at the first hit picks the deepest frame.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A (file, line) pair named by a traceback frame. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashLocation {
    pub file: PathBuf,
    pub line: usize,
}

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("frame pattern is a valid regex")
    })
}

/// Locate the innermost frame in `text`, or `None` if no line matches.
pub fn locate(text: &str) -> Option<CrashLocation> {
    text.lines().rev().find_map(|line| {
        let caps = frame_pattern().captures(line)?;
        let line_no: usize = caps[2].parse().ok()?;
        if line_no == 0 {
            return None;
        }
        Some(CrashLocation {
            file: PathBuf::from(&caps[1]),
            line: line_no,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_FRAME: &str = r#"Traceback (most recent call last):
  File "/srv/app/main.py", line 40, in <module>
    run()
  File "/srv/app/main.py", line 12, in run
    return compute(values)
  File "/srv/app/stats.py", line 7, in compute
    return total / count
ZeroDivisionError: division by zero
"#;

    #[test]
    fn test_returns_innermost_frame() {
        let loc = locate(MULTI_FRAME).expect("frame");
        assert_eq!(loc.file, PathBuf::from("/srv/app/stats.py"));
        assert_eq!(loc.line, 7);
    }

    #[test]
    fn test_no_frame_is_none() {
        assert_eq!(locate("segmentation fault (core dumped)"), None);
        assert_eq!(locate(""), None);
    }

    #[test]
    fn test_line_zero_is_skipped() {
        let text = "  File \"a.py\", line 3, in f\n  File \"b.py\", line 0, in g\n";
        let loc = locate(text).expect("frame");
        assert_eq!(loc.file, PathBuf::from("a.py"));
        assert_eq!(loc.line, 3);
    }

    #[test]
    fn test_frame_amid_program_output() {
        let text = "starting\nloaded 3 items\n  File \"job.py\", line 19, in <module>\nKeyError: 'id'\ndone?\n";
        let loc = locate(text).expect("frame");
        assert_eq!(loc.line, 19);
    }

    #[test]
    fn test_paths_with_spaces() {
        let loc = locate("  File \"/home/me/my project/x.py\", line 5, in f").expect("frame");
        assert_eq!(loc.file, PathBuf::from("/home/me/my project/x.py"));
    }
}
