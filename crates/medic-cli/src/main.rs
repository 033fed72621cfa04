//! Medic CLI
//!
//! `medic` runs a command, and when it crashes with a Python traceback asks a
//! language model for a fix to the failing function.
//!
//! ```text
//! medic app.py                       # runs `python app.py`
//! medic --dry-run -- pytest -x       # diagnose only
//! medic --backend openai --auto-fix python app.py
//! medic --list-backends
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, Level};

use medic_core::{
    BackendConfig, BackendRegistry, EventSink, FixMode, JsonEventLog, MedicSettings, RunOutcome,
    Supervisor, SupervisorOptions,
};

#[derive(Parser, Debug)]
#[command(name = "medic")]
#[command(author = "Medic Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a command and propose AI fixes when it crashes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Backend to use instead of auto-selection (e.g. ollama, openai)
    #[arg(short, long)]
    backend: Option<String>,

    /// Model override for the selected backend
    #[arg(short, long)]
    model: Option<String>,

    /// Show the proposed fix without applying it
    #[arg(long)]
    dry_run: bool,

    /// Apply the proposed fix without asking
    #[arg(long)]
    auto_fix: bool,

    /// Do not write the daily JSON event log
    #[arg(long)]
    no_log: bool,

    /// List registered backends and whether they are reachable
    #[arg(long)]
    list_backends: bool,

    /// Command to supervise; a single `*.py` path runs with the configured Python
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    fn mode(&self) -> FixMode {
        FixMode::from_flags(self.dry_run, self.auto_fix)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    medic_core::init_tracing(cli.json, level);

    let registry = BackendRegistry::with_defaults(BackendConfig::from_env());

    if cli.list_backends {
        list_backends(&registry).await;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.command.is_empty() {
        bail!("no command given; try `medic app.py` or `medic --help`");
    }
    if let Some(name) = &cli.backend {
        if !registry.names().contains(name) {
            bail!(
                "unknown backend '{}' (available: {})",
                name,
                registry.names().join(", ")
            );
        }
    }

    let settings = MedicSettings::from_env();
    let command = settings.build_command(&cli.command);
    let mode = cli.mode();

    print_banner(&command, mode, cli.backend.as_deref(), cli.model.as_deref());

    let events: Option<Arc<dyn EventSink>> = if cli.no_log {
        None
    } else {
        match JsonEventLog::new(&settings.log_dir) {
            Ok(log) => Some(Arc::new(log)),
            Err(e) => {
                eprintln!(
                    "warning: event log disabled ({}): {}",
                    settings.log_dir.display(),
                    e
                );
                None
            }
        }
    };

    let options = SupervisorOptions {
        mode,
        backend: cli.backend.clone(),
        model: cli.model.clone(),
        echo: true,
    };
    let supervisor = Supervisor::new(registry, options).with_events(events);
    let outcome = supervisor
        .run(&command)
        .await
        .with_context(|| format!("failed to supervise `{}`", command.join(" ")))?;
    debug!(outcome = %outcome, "medic finished");

    Ok(ExitCode::from(exit_status(outcome)))
}

async fn list_backends(registry: &BackendRegistry) {
    println!("Registered backends (auto-select order):\n");
    for name in registry.names() {
        let backend = match registry.create(&name, None) {
            Ok(backend) => backend,
            Err(e) => {
                println!("  {name:<8} error: {e}");
                continue;
            }
        };
        let status = if backend.is_available().await {
            "available"
        } else {
            "unavailable"
        };
        println!("  {name:<8} {status}");
        for (key, value) in backend.details() {
            println!("           {key}: {value}");
        }
        if status == "unavailable" {
            println!("           hint: {}", backend.setup_hint());
        }
    }
    println!("\nWithout --backend, the first available one is used.");
}

fn print_banner(command: &[String], mode: FixMode, backend: Option<&str>, model: Option<&str>) {
    println!("MEDIC v{}", medic_core::VERSION);
    println!("Supervising: {}", command.join(" "));
    match mode {
        FixMode::DryRun => println!("Mode: dry-run (fixes are shown, never applied)"),
        FixMode::AutoFix => println!("Mode: auto-fix (fixes are applied without asking)"),
        FixMode::Interactive => println!("Mode: interactive"),
    }
    println!("Backend: {}", backend.unwrap_or("auto"));
    if let Some(model) = model {
        println!("Model: {model}");
    }
    println!("{}", "-".repeat(40));
}

/// Process exit status for a finished cycle.
fn exit_status(outcome: RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Success | RunOutcome::FixApplied => 0,
        RunOutcome::Interrupted => 130,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("medic").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_trailing_command_keeps_its_flags() {
        let cli = parse(&["--dry-run", "pytest", "-x", "--tb=short"]);
        assert!(cli.dry_run);
        assert_eq!(cli.command, vec!["pytest", "-x", "--tb=short"]);
        assert_eq!(cli.mode(), FixMode::DryRun);
    }

    #[test]
    fn test_dry_run_beats_auto_fix() {
        let cli = parse(&["--auto-fix", "--dry-run", "app.py"]);
        assert_eq!(cli.mode(), FixMode::DryRun);
    }

    #[test]
    fn test_backend_and_model() {
        let cli = parse(&["--backend", "openai", "--model", "gpt-4o", "python", "app.py"]);
        assert_eq!(cli.backend.as_deref(), Some("openai"));
        assert_eq!(cli.model.as_deref(), Some("gpt-4o"));
        assert_eq!(cli.mode(), FixMode::Interactive);
    }

    #[test]
    fn test_list_backends_needs_no_command() {
        let cli = parse(&["--list-backends"]);
        assert!(cli.list_backends);
        assert!(cli.command.is_empty());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_status(RunOutcome::Success), 0);
        assert_eq!(exit_status(RunOutcome::FixApplied), 0);
        assert_eq!(exit_status(RunOutcome::Interrupted), 130);
        assert_eq!(exit_status(RunOutcome::FixRejected), 1);
        assert_eq!(exit_status(RunOutcome::DiagnosisShown), 1);
        assert_eq!(exit_status(RunOutcome::LocationNotFound), 1);
    }
}
