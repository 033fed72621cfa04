//! Process supervision and the diagnosis cycle.
//!
//! One cycle: run the command while echoing and capturing its combined
//! output; on a non-zero exit locate the innermost frame, extract the
//! enclosing code, ask a backend for a replacement, show the diff, and apply
//! it according to the [`FixMode`].
//!
//! Every pipeline dead end finishes with a [`RunOutcome`]. Only failing to
//! launch the command is an error. The interrupt stays armed for the whole
//! cycle: it kills the child while streaming, and abandons the backend query
//! or the confirmation prompt without writing anything.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, Instrument};

use crate::backend::{strip_fences, BackendRegistry, BackendReply};
use crate::context::{ContextExtractor, ContextOrigin};
use crate::error::{MedicError, Result};
use crate::events::EventSink;
use crate::locator::{locate, CrashLocation};
use crate::obs;
use crate::patch::{apply_fix, present_diff};
use crate::prompt::{build_prompt, ErrorCategory};

/// What to do with a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixMode {
    /// Show the diff, never write, never ask.
    DryRun,
    /// Apply without asking.
    AutoFix,
    /// Show the diff and ask before applying.
    Interactive,
}

impl FixMode {
    /// Resolve mode flags; dry-run wins over auto-fix.
    pub fn from_flags(dry_run: bool, auto_fix: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else if auto_fix {
            Self::AutoFix
        } else {
            Self::Interactive
        }
    }
}

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Exit status 0.
    Success,
    /// Crashed, but no `File "...", line N` frame in the output.
    LocationNotFound,
    /// Crashed at a location whose source could not be read.
    ContextNotFound,
    /// The backend answered with an error or nothing usable.
    NoFixProduced,
    /// Dry run: the diff was shown.
    DiagnosisShown,
    FixApplied,
    /// The user declined the fix.
    FixRejected,
    /// The original code was no longer in the file.
    FixFailed,
    /// Interrupted while the command ran.
    Interrupted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::LocationNotFound => "location_not_found",
            Self::ContextNotFound => "context_not_found",
            Self::NoFixProduced => "no_fix_produced",
            Self::DiagnosisShown => "diagnosis_shown",
            Self::FixApplied => "fix_applied",
            Self::FixRejected => "fix_rejected",
            Self::FixFailed => "fix_failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined output and exit status of one child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRun {
    pub command: Vec<String>,
    pub output: Vec<String>,
    /// -1 when the child was killed by a signal.
    pub exit_code: i32,
}

impl CapturedRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured output as one string, one line per entry.
    pub fn text(&self) -> String {
        self.output.join("\n")
    }
}

/// Source of the yes/no decision in interactive mode.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal. Anything but `y`/`yes` is a no.
pub struct StdinConfirmation;

#[async_trait]
impl Confirmation for StdinConfirmation {
    async fn confirm(&self, question: &str) -> bool {
        print!("{question}");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut answer).await {
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Always answers the same way.
pub struct FixedDecision(pub bool);

#[async_trait]
impl Confirmation for FixedDecision {
    async fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub mode: FixMode,
    /// Registry name; `None` auto-selects.
    pub backend: Option<String>,
    /// Model override for whichever backend is used.
    pub model: Option<String>,
    /// Echo the child's output live.
    pub echo: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            mode: FixMode::Interactive,
            backend: None,
            model: None,
            echo: true,
        }
    }
}

/// Runs commands and diagnoses their crashes.
pub struct Supervisor {
    registry: BackendRegistry,
    extractor: ContextExtractor,
    options: SupervisorOptions,
    confirmation: Box<dyn Confirmation>,
    events: Option<Arc<dyn EventSink>>,
}

impl Supervisor {
    pub fn new(registry: BackendRegistry, options: SupervisorOptions) -> Self {
        Self {
            registry,
            extractor: ContextExtractor::default(),
            options,
            confirmation: Box::new(StdinConfirmation),
            events: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: Box<dyn Confirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_events(mut self, events: Option<Arc<dyn EventSink>>) -> Self {
        self.events = events;
        self
    }

    pub fn with_extractor(mut self, extractor: ContextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Run `command`, stopping early on Ctrl-C.
    pub async fn run(&self, command: &[String]) -> Result<RunOutcome> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler: never interrupt.
                std::future::pending::<()>().await;
            }
        };
        self.run_until(command, interrupt).await
    }

    /// Run `command`; resolving `interrupt` at any point before the fix is
    /// written ends the cycle with [`RunOutcome::Interrupted`].
    pub async fn run_until<F>(&self, command: &[String], interrupt: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let span = obs::DiagnosisSpan::new(command);
        let started = Instant::now();
        tokio::pin!(interrupt);

        let outcome = async {
            obs::emit_cycle_started(command);
            let Some(run) = self.capture(command, interrupt.as_mut()).await? else {
                println!("\nStopping: interrupted, no diagnosis attempted.");
                return Ok(RunOutcome::Interrupted);
            };
            if run.succeeded() {
                println!("\nProcess finished successfully.");
                return Ok(RunOutcome::Success);
            }
            Ok::<_, MedicError>(self.diagnose(&run, interrupt.as_mut()).await)
        }
        .instrument(span.span())
        .await;

        if let Ok(outcome) = &outcome {
            let _entered = span.span().entered();
            obs::emit_cycle_finished(outcome.as_str(), started.elapsed().as_millis() as u64);
        }
        outcome
    }

    /// Spawn and stream the child. `None` when interrupted.
    async fn capture<F>(
        &self,
        command: &[String],
        mut interrupt: Pin<&mut F>,
    ) -> Result<Option<CapturedRun>>
    where
        F: Future<Output = ()>,
    {
        let (program, args) = command.split_first().ok_or(MedicError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MedicError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr not captured"))?;
        let mut out = BufReader::new(stdout).split(b'\n');
        let mut err = BufReader::new(stderr).split(b'\n');

        let mut output = Vec::new();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                biased;
                _ = interrupt.as_mut() => {
                    child.kill().await?;
                    return Ok(None);
                }
                segment = out.next_segment(), if out_open => match segment? {
                    Some(bytes) => self.record(&mut output, &bytes),
                    None => out_open = false,
                },
                segment = err.next_segment(), if err_open => match segment? {
                    Some(bytes) => self.record(&mut output, &bytes),
                    None => err_open = false,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = interrupt.as_mut() => {
                child.kill().await?;
                return Ok(None);
            }
            status = child.wait() => status?,
        };

        Ok(Some(CapturedRun {
            command: command.to_vec(),
            output,
            exit_code: status.code().unwrap_or(-1),
        }))
    }

    fn record(&self, output: &mut Vec<String>, bytes: &[u8]) {
        let line = String::from_utf8_lossy(bytes);
        let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
        if self.options.echo {
            println!("{line}");
        }
        output.push(line);
    }

    /// Locate, extract, query, present and maybe apply.
    async fn diagnose<F>(&self, run: &CapturedRun, mut interrupt: Pin<&mut F>) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        println!("\nProcess crashed (exit code {}).", run.exit_code);
        obs::emit_cycle_crashed(run.exit_code, run.output.len());

        let log_text = run.text();
        let Some(CrashLocation { file, line }) = locate(&log_text) else {
            println!("Could not find a file path in the traceback.");
            return RunOutcome::LocationNotFound;
        };
        println!("Traceback points to: {} at line {}", file.display(), line);

        let category = ErrorCategory::classify(&log_text);
        obs::emit_crash_located(&file.display().to_string(), line, category.as_str());
        if let Some(events) = &self.events {
            events.log_crash(&file, line, category.as_str(), &log_text);
        }

        let context = match self.extractor.extract(&file, line) {
            Ok(context) => context,
            Err(e) => {
                println!("Could not extract code context: {e}");
                return RunOutcome::ContextNotFound;
            }
        };
        obs::emit_context_extracted(context.origin.as_str(), context.source.len());
        if context.origin == ContextOrigin::LineWindow {
            println!(
                "No enclosing function; using a {}-line window around the crash.",
                2 * self.extractor.radius() + 1
            );
        }
        println!("\n--- MEDIC DIAGNOSIS ---\n{}", context.source);

        let prompt = build_prompt(&context.source, &log_text);
        let reply = tokio::select! {
            biased;
            _ = interrupt.as_mut() => return stopped("while waiting for the backend"),
            reply = self.ask_backend(&prompt) => reply,
        };
        let fix = match reply {
            BackendReply::Text(raw) => strip_fences(&raw),
            BackendReply::Error(message) => {
                obs::emit_fix_proposed(message.len(), true);
                println!("\nNo fix produced:\n{message}");
                return RunOutcome::NoFixProduced;
            }
        };
        obs::emit_fix_proposed(fix.len(), false);
        if fix.is_empty() {
            println!("\nNo fix produced: the model returned an empty answer.");
            return RunOutcome::NoFixProduced;
        }

        println!("\n--- AI SUGGESTED FIX ---\n{fix}\n");
        if let Some(events) = &self.events {
            events.log_fix_generated(&file, &context.source, &fix);
        }
        present_diff(&context.source, &fix);

        match self.options.mode {
            FixMode::DryRun => {
                println!("DRY-RUN: fix preview shown above. No changes applied.");
                return RunOutcome::DiagnosisShown;
            }
            FixMode::AutoFix => println!("AUTO-FIX: applying fix automatically..."),
            FixMode::Interactive => {
                let approved = tokio::select! {
                    biased;
                    _ = interrupt.as_mut() => return stopped("before the fix was confirmed"),
                    approved = self
                        .confirmation
                        .confirm("\nDo you want to apply this fix? (y/n): ") => approved,
                };
                if !approved {
                    println!("Skipping fix.");
                    if let Some(events) = &self.events {
                        events.log_fix_rejected(&file);
                    }
                    return RunOutcome::FixRejected;
                }
            }
        }

        if fired(interrupt.as_mut()).await {
            return stopped("before the fix was written");
        }
        self.apply(&file, &context.source, &fix)
    }

    async fn ask_backend(&self, prompt: &str) -> BackendReply {
        let selected = self
            .registry
            .select(self.options.backend.as_deref(), self.options.model.as_deref())
            .await;
        match selected {
            Ok(backend) => {
                obs::emit_backend_selected(backend.name(), backend.model());
                println!("\nAsking {} ({})...", backend.name(), backend.model());
                backend.query(prompt).await
            }
            Err(e) => {
                obs::emit_backend_error(&e);
                BackendReply::Error(format!("Error: {e}"))
            }
        }
    }

    fn apply(&self, file: &Path, old_code: &str, new_code: &str) -> RunOutcome {
        let applied = match apply_fix(file, old_code, new_code) {
            Ok(applied) => applied,
            Err(e) => {
                debug!(error = %e, "apply failed");
                println!("Failed to apply fix: {e}");
                false
            }
        };

        obs::emit_fix_applied(&file.display().to_string(), applied);
        if let Some(events) = &self.events {
            events.log_fix_applied(file, applied);
        }

        if applied {
            println!("Fix applied! Run your command again.");
            RunOutcome::FixApplied
        } else {
            println!("Failed to apply fix: the original code is no longer in the file.");
            RunOutcome::FixFailed
        }
    }
}

/// Whether `interrupt` has already resolved. Yields once first so a signal
/// that arrived during the last await is delivered.
async fn fired<F>(interrupt: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::task::yield_now().await;
    tokio::select! {
        biased;
        _ = interrupt => true,
        _ = std::future::ready(()) => false,
    }
}

fn stopped(stage: &str) -> RunOutcome {
    println!("\nStopping: interrupted {stage}; no changes applied.");
    RunOutcome::Interrupted
}
