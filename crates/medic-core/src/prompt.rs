//! Repair prompt construction.
//!
//! The error category only changes the checklist embedded in the prompt; it
//! never influences extraction or patching.

use serde::{Deserialize, Serialize};

/// Error family detected in the captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    NameError,
    TypeError,
    IndexError,
    ZeroDivisionError,
    AttributeError,
    KeyError,
    ImportError,
    SyntaxError,
    Unknown,
}

/// Match order. The first category with a marker present wins.
const CLASSIFICATION_ORDER: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::NameError, &["NameError"]),
    (ErrorCategory::TypeError, &["TypeError"]),
    (ErrorCategory::IndexError, &["IndexError"]),
    (ErrorCategory::ZeroDivisionError, &["ZeroDivisionError"]),
    (ErrorCategory::AttributeError, &["AttributeError"]),
    (ErrorCategory::KeyError, &["KeyError"]),
    (ErrorCategory::ImportError, &["ImportError", "ModuleNotFoundError"]),
    (ErrorCategory::SyntaxError, &["SyntaxError"]),
];

impl ErrorCategory {
    /// Classify raw error text by substring match.
    pub fn classify(text: &str) -> Self {
        CLASSIFICATION_ORDER
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| text.contains(m)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameError => "NameError",
            Self::TypeError => "TypeError",
            Self::IndexError => "IndexError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::AttributeError => "AttributeError",
            Self::KeyError => "KeyError",
            Self::ImportError => "ImportError",
            Self::SyntaxError => "SyntaxError",
            Self::Unknown => "Unknown",
        }
    }

    /// Remediation checklist for this category.
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            Self::NameError => &[
                "Add the missing parameter to the function signature",
                "Define the variable before it is used",
                "Check variable names for typos",
                "Import the missing module or function",
            ],
            Self::TypeError => &[
                "Convert values to the expected type (int(), str(), float())",
                "Check types before combining values",
                "Pass the correct number of arguments",
                "Guard against None",
            ],
            Self::IndexError => &[
                "Check bounds before indexing (if index < len(items))",
                "Handle empty sequences before accessing elements",
                "Catch IndexError where an out-of-range access is expected",
            ],
            Self::ZeroDivisionError => &[
                "Check that the divisor is non-zero before dividing",
                "Return a sensible default or raise a descriptive error",
                "Catch ZeroDivisionError around the division",
            ],
            Self::AttributeError => &[
                "Make sure the object has the expected type",
                "Check for the attribute with hasattr() before use",
                "Guard against None before calling methods",
            ],
            Self::KeyError => &[
                "Use dict.get(key, default) instead of dict[key]",
                "Check membership with `if key in mapping`",
                "Provide default values for optional keys",
            ],
            Self::ImportError => &[
                "Remove the import if it is not needed",
                "Check the module name for typos",
                "Wrap optional imports in try/except ImportError",
            ],
            Self::SyntaxError => &[
                "Add missing colons, parentheses or brackets",
                "Fix inconsistent indentation",
                "Close unterminated strings",
            ],
            Self::Unknown => &[
                "Identify the root cause from the error message",
                "Add error handling where the failure occurs",
                "Keep the change minimal",
            ],
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the repair prompt for `code_context` and the captured error text.
pub fn build_prompt(code_context: &str, error_text: &str) -> String {
    let category = ErrorCategory::classify(error_text);
    let checklist: String = category
        .guidance()
        .iter()
        .map(|item| format!("- {item}\n"))
        .collect();

    format!(
        "You are an expert Python debugger repairing a crashed program.

ERROR TYPE: {category}

BROKEN CODE:
{code_context}

ERROR OUTPUT:
{error_text}

COMMON FIXES FOR {category}:
{checklist}
TASK:
1. Find the root cause of the error in the broken code.
2. Fix it with the smallest change that works.
3. Return the complete fixed code as a drop-in replacement for the broken code.

OUTPUT RULES:
- Return ONLY the replacement source code.
- No explanations and no prose.
- No markdown code fences.
- No diff or before/after comparison.
- Keep the original indentation and structure.

FIXED CODE:
"
    )
}
