//! Structured tracing hooks for the diagnosis cycle.
//!
//! Each cycle runs inside a [`DiagnosisSpan`] tagged with a fresh cycle id,
//! and the supervisor emits one `info!` event per pipeline milestone.
//! Filter with `RUST_LOG=medic_core=debug`; use `--json` for JSON lines.

use tracing::{info, warn};
use uuid::Uuid;

/// Cycle-scoped span for one supervised run.
///
/// Attach it to the cycle future with `tracing::Instrument`, so every event
/// emitted while the cycle runs carries the cycle id.
pub struct DiagnosisSpan {
    cycle_id: Uuid,
    span: tracing::Span,
}

impl DiagnosisSpan {
    /// Create a span for `command`.
    pub fn new(command: &[String]) -> Self {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "medic.cycle",
            cycle_id = %cycle_id,
            command = %command.join(" "),
        );
        Self { cycle_id, span }
    }

    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: supervised command launched.
///
/// # Example
///
/// ```ignore
/// emit_cycle_started(&["python".into(), "app.py".into()]);
/// // logs: event=cycle.started program=python argc=2
/// ```
pub fn emit_cycle_started(command: &[String]) {
    let program = command.first().map(String::as_str).unwrap_or("");
    info!(event = "cycle.started", program = %program, argc = command.len());
}

/// Emit event: command exited non-zero with this many captured lines.
pub fn emit_cycle_crashed(exit_code: i32, captured_lines: usize) {
    info!(
        event = "cycle.crashed",
        exit_code = exit_code,
        captured_lines = captured_lines,
    );
}

/// Emit event: innermost traceback frame found and classified.
pub fn emit_crash_located(file: &str, line: usize, category: &str) {
    info!(event = "crash.located", file = %file, line = line, category = %category);
}

/// Emit event: code context extracted, by function scope or line window.
pub fn emit_context_extracted(origin: &str, bytes: usize) {
    info!(event = "context.extracted", origin = %origin, bytes = bytes);
}

/// Emit event: backend chosen for the query.
pub fn emit_backend_selected(name: &str, model: &str) {
    info!(event = "backend.selected", backend = %name, model = %model);
}

/// Emit event: backend answered; `is_error` marks an error reply.
pub fn emit_fix_proposed(bytes: usize, is_error: bool) {
    info!(event = "fix.proposed", bytes = bytes, is_error = is_error);
}

/// Emit event: patch attempted on `file`.
pub fn emit_fix_applied(file: &str, success: bool) {
    info!(event = "fix.applied", file = %file, success = success);
}

/// Emit event: cycle ended with its outcome and wall time.
pub fn emit_cycle_finished(outcome: &str, duration_ms: u64) {
    info!(event = "cycle.finished", outcome = %outcome, duration_ms = duration_ms);
}

/// Emit event: backend selection failed (warning level).
pub fn emit_backend_error(error: &dyn std::fmt::Display) {
    warn!(event = "backend.error", error = %error);
}
