//! Medic Core Library
//!
//! Supervises a command, and when it crashes finds the failing frame,
//! extracts the enclosing Python function, asks a model backend for a fix,
//! and applies it as an exact textual substitution.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod locator;
pub mod obs;
pub mod patch;
pub mod prompt;
pub mod supervisor;
pub mod telemetry;

pub use backend::{
    strip_fences, BackendFactory, BackendRegistry, BackendReply, ModelBackend, OllamaBackend,
    OpenAiBackend,
};
pub use config::{BackendConfig, MedicSettings};
pub use context::{
    enclosing_function, line_window, CodeContext, ContextExtractor, ContextOrigin,
    DEFAULT_WINDOW_RADIUS,
};
pub use error::{MedicError, Result};
pub use events::{EventRecord, EventSink, JsonEventLog};
pub use locator::{locate, CrashLocation};
pub use patch::{apply_fix, present_diff, render_diff};
pub use prompt::{build_prompt, ErrorCategory};
pub use supervisor::{
    CapturedRun, Confirmation, FixMode, FixedDecision, RunOutcome, StdinConfirmation, Supervisor,
    SupervisorOptions,
};
pub use telemetry::init_tracing;

/// Medic version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
