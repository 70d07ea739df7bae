//! sf - specflow command-line entry point
//!
//! Runs the workflow against a working directory holding the seed documents,
//! printing progress events as they arrive.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};
use uuid::Uuid;

use specflow::cli::{Cli, Command, OutputFormat};
use specflow::config::Config;
use specflow::generator::Decomposition;
use specflow::parse::extract_principles;
use specflow::prompts::PromptLoader;
use specflow::validation::{Structured, ValidationContext, validate};
use specflow::{
    ApprovalLedger, ApprovalResponse, ArtifactStore, ContextLoader, FsArtifactStore, GeneratorTable, Phase,
    StateStore, StoreError, ValidationReport, WorkflowEngine, WorkflowError, WorkflowEvent, WorkflowRun,
    WorkflowState, create_gateway,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;
const EXIT_SUSPENDED: i32 = 3;

fn setup_logging(level: &str) -> Result<()> {
    let log_path = specflow::cli::get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to log file, not stdout/stderr
    let level: tracing::Level = level.parse().unwrap_or(tracing::Level::INFO);
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:?}", "Error:".red(), e);
            EXIT_FAILED
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let dir = workdir(&cli.command).to_path_buf();
    let config = Config::load(cli.config.as_ref(), &dir).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;
    info!(dir = %dir.display(), program = %config.gateway.program, "specflow loaded config");

    match cli.command {
        Command::Run { stack, detach, .. } => cmd_run(&config, &dir, &stack, detach).await,
        Command::Approve { run_id, rationale, .. } => cmd_decide(&config, &dir, &run_id, true, rationale).await,
        Command::Reject { run_id, rationale, .. } => cmd_decide(&config, &dir, &run_id, false, rationale).await,
        Command::Status { run_id, format, .. } => cmd_status(&config, &dir, run_id.as_deref(), format).await,
        Command::Validate { run_id, .. } => cmd_validate(&config, &dir, run_id.as_deref()).await,
    }
}

fn workdir(command: &Command) -> &Path {
    match command {
        Command::Run { dir, .. }
        | Command::Approve { dir, .. }
        | Command::Reject { dir, .. }
        | Command::Status { dir, .. }
        | Command::Validate { dir, .. } => dir.as_path(),
    }
}

/// Engine rooted at `dir`, checkpointing to its state directory
async fn build_engine(config: &Config, dir: &Path) -> Result<WorkflowEngine> {
    let state_dir = dir.join(&config.layout.state_dir);
    let ledger = ApprovalLedger::open(state_dir.join("approvals.jsonl"))
        .await
        .context("Failed to open approval ledger")?;

    Ok(WorkflowEngine::new(
        config.clone(),
        create_gateway(&config.gateway, dir),
        Arc::new(FsArtifactStore::new(dir)),
    )
    .with_state_store(StateStore::new(&state_dir))
    .with_prompts(PromptLoader::new(dir, &config.layout.state_dir))
    .with_ledger(Arc::new(ledger)))
}

/// Start a run and see it through the approval gate
async fn cmd_run(config: &Config, dir: &Path, stack: &str, detach: bool) -> Result<i32> {
    let engine = build_engine(config, dir).await?;

    let run = match engine.start(stack).await {
        Ok(run) => run,
        Err(e @ WorkflowError::MissingInput { .. }) => {
            eprintln!("{} {}", "Error:".red(), e);
            return Ok(EXIT_FAILED);
        }
        Err(e) => return Err(e).context("Failed to start workflow"),
    };
    println!("{} {} ({})", "Run".bold(), run.run_id(), stack);

    let mut state = follow(run).await?;
    loop {
        if state.phase() != Phase::AwaitingApproval {
            return Ok(exit_code(state.phase()));
        }
        if detach {
            print_resume_hint(&state, dir);
            return Ok(EXIT_SUSPENDED);
        }
        let Some((approved, rationale)) = ask_approval()? else {
            print_resume_hint(&state, dir);
            return Ok(EXIT_SUSPENDED);
        };
        let Some(request) = state.pending_request() else {
            return Ok(EXIT_FAILED);
        };
        let mut response = if approved {
            ApprovalResponse::approve(request.id)
        } else {
            ApprovalResponse::reject(request.id)
        };
        if let Some(rationale) = rationale {
            response = response.with_rationale(rationale);
        }
        let run = engine.resume(&state, response).await.context("Failed to resume workflow")?;
        state = follow(run).await?;
    }
}

/// Restore a suspended run and deliver a decision
async fn cmd_decide(
    config: &Config,
    dir: &Path,
    run_id: &str,
    approved: bool,
    rationale: Option<String>,
) -> Result<i32> {
    let run_id: Uuid = run_id.parse().context("Invalid run id")?;
    let engine = build_engine(config, dir).await?;
    let state = engine.load(run_id).await.context("Failed to restore run")?;

    let Some(request) = state.pending_request() else {
        eprintln!(
            "{} run {} is {}, not waiting for approval",
            "Error:".red(),
            run_id,
            state.phase()
        );
        return Ok(EXIT_FAILED);
    };
    let mut response = if approved {
        ApprovalResponse::approve(request.id)
    } else {
        ApprovalResponse::reject(request.id)
    };
    if let Some(rationale) = rationale {
        response = response.with_rationale(rationale);
    }

    let run = match engine.resume(&state, response).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return Ok(EXIT_FAILED);
        }
    };
    let state = follow(run).await?;
    Ok(exit_code(state.phase()))
}

/// Print events until the stream ends; Ctrl-C cancels the in-flight call
async fn follow(mut run: WorkflowRun) -> Result<WorkflowState> {
    let cancel = run.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    while let Some(event) = run.next().await {
        print_event(&event);
    }
    watcher.abort();
    Ok(run.finish().await?)
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::PhaseStarted { phase, .. } => {
            println!("{} generating {}", "..".dimmed(), phase);
        }
        WorkflowEvent::AttemptFailed {
            phase,
            attempt,
            error,
            retry_in_ms,
            ..
        } => {
            let retry = retry_in_ms
                .map(|ms| format!(", retrying in {:.1}s", ms as f64 / 1000.0))
                .unwrap_or_default();
            println!("{} {} attempt {} failed: {}{}", "!!".yellow(), phase, attempt, error, retry);
        }
        WorkflowEvent::CorrectiveRetry { phase, violations, .. } => {
            println!(
                "{} {} failed validation ({} errors), re-prompting",
                "!!".yellow(),
                phase,
                violations.len()
            );
        }
        WorkflowEvent::PhaseCompleted { phase, summary, .. } => {
            println!("{} {}: {}", "ok".green(), phase.to_string().bold(), summary);
        }
        WorkflowEvent::RequestInfo { request, .. } => {
            println!();
            println!("{}", request.message.bold());
            println!("{}", request.preview);
            println!();
        }
        WorkflowEvent::DecisionRecorded { approved, .. } => {
            let verdict = if *approved { "approved".green() } else { "rejected".red() };
            println!("{} task list {}", "ok".green(), verdict);
        }
        WorkflowEvent::Completed { files, .. } => {
            println!("{} {} ({} files)", "done".green().bold(), Phase::Implemented, files.len());
            for file in files {
                println!("   {}", file);
            }
        }
        WorkflowEvent::Rejected { rationale, .. } => {
            println!(
                "{} {}{}",
                "done".red().bold(),
                Phase::Rejected,
                rationale.as_deref().map(|r| format!(": {}", r)).unwrap_or_default()
            );
        }
        WorkflowEvent::Failed {
            phase,
            kind,
            message,
            violations,
            ..
        } => {
            println!("{} {} during {}: {}", "FAILED".red().bold(), kind, phase, message);
            for v in violations {
                println!("   {}", v);
            }
        }
    }
}

/// `Some((approved, rationale))`, or `None` to leave the run suspended
fn ask_approval() -> Result<Option<(bool, Option<String>)>> {
    let mut editor = DefaultEditor::new().context("Failed to open terminal")?;
    let approved = loop {
        match editor.readline("Approve? (yes/no) ") {
            Ok(line) => match line.trim().to_lowercase().as_str() {
                "y" | "yes" => break true,
                "n" | "no" => break false,
                _ => println!("Please answer yes or no"),
            },
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read answer"),
        }
    };
    let rationale = match editor.readline("Rationale (optional): ") {
        Ok(line) if !line.trim().is_empty() => Some(line.trim().to_string()),
        Ok(_) | Err(ReadlineError::Interrupted | ReadlineError::Eof) => None,
        Err(e) => return Err(e).context("Failed to read rationale"),
    };
    Ok(Some((approved, rationale)))
}

fn print_resume_hint(state: &WorkflowState, dir: &Path) {
    println!("Run {} is waiting for approval.", state.run_id().to_string().bold());
    println!("  sf approve {} {}", state.run_id(), dir.display());
    println!("  sf reject {} {}", state.run_id(), dir.display());
}

fn exit_code(phase: Phase) -> i32 {
    match phase {
        Phase::Implemented => EXIT_OK,
        Phase::Rejected => EXIT_REJECTED,
        Phase::AwaitingApproval => EXIT_SUSPENDED,
        _ => EXIT_FAILED,
    }
}

/// List runs, or show one
async fn cmd_status(config: &Config, dir: &Path, run_id: Option<&str>, format: OutputFormat) -> Result<i32> {
    let state_store = StateStore::new(dir.join(&config.layout.state_dir));

    let snapshots = match run_id {
        Some(id) => {
            let id: Uuid = id.parse().context("Invalid run id")?;
            match state_store.load(id).await {
                Ok(snapshot) => vec![snapshot],
                Err(StoreError::NotFound(_)) => {
                    eprintln!("{} no run {}", "Error:".red(), id);
                    return Ok(EXIT_FAILED);
                }
                Err(e) => return Err(e).context("Failed to load run"),
            }
        }
        None => state_store.list().await.context("Failed to list runs")?,
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(EXIT_OK);
    }

    if snapshots.is_empty() {
        println!("No runs in {}", dir.display());
        return Ok(EXIT_OK);
    }

    if run_id.is_none() {
        println!("{:<38} {:<18} {:<20} STACK", "RUN ID", "PHASE", "UPDATED");
        for s in &snapshots {
            println!(
                "{:<38} {:<18} {:<20} {}",
                s.run_id,
                s.phase.to_string(),
                s.updated_at().format("%Y-%m-%d %H:%M:%S"),
                s.context_ref.tech_stack
            );
        }
        return Ok(EXIT_OK);
    }

    for s in &snapshots {
        println!("{} {}", "Run".bold(), s.run_id);
        println!("Phase: {}", s.phase);
        println!("Stack: {}", s.context_ref.tech_stack);
        for loc in [&s.plan_ref, &s.tasks_ref, &s.implementation_ref].into_iter().flatten() {
            println!("Artifact: {}", loc);
        }
        if s.phase == Phase::AwaitingApproval
            && let Some(request) = &s.approval_request
        {
            println!("Pending: {} ({} tasks)", request.id, request.task_count);
        }
        println!();
        for entry in &s.history {
            println!(
                "  {}  {:<18} {}",
                entry.at.format("%H:%M:%S"),
                entry.phase.to_string(),
                entry.outcome.label()
            );
        }
    }
    Ok(EXIT_OK)
}

/// Run every validator over the seeds and one run's artifacts, the newest run by default
async fn cmd_validate(config: &Config, dir: &Path, run_id: Option<&str>) -> Result<i32> {
    let layout = &config.layout;
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir));

    let context = match ContextLoader::new(store.clone())
        .load(&layout.principles, &layout.specification, "")
        .await
    {
        Ok(context) => context,
        Err(e @ WorkflowError::MissingInput { .. }) => {
            eprintln!("{} {}", "Error:".red(), e);
            return Ok(EXIT_FAILED);
        }
        Err(e) => return Err(e).context("Failed to read seed documents"),
    };

    let mut all_valid = true;
    let principles = extract_principles(context.principles_text());
    let report = validate(
        context.principles_text(),
        Structured::Principles(&principles),
        &ValidationContext::default(),
    );
    all_valid &= print_report(&layout.principles, &report);

    let run_id = match run_id {
        Some(id) => Some(id.parse::<Uuid>().context("Invalid run id")?),
        None => StateStore::new(dir.join(&layout.state_dir))
            .list()
            .await
            .context("Failed to list runs")?
            .last()
            .map(|s| s.run_id),
    };
    let Some(run_id) = run_id else {
        println!("{} no runs yet, only the seed documents were checked", "--".dimmed());
        return Ok(if all_valid { EXIT_OK } else { EXIT_FAILED });
    };
    let run = layout.for_run(run_id);

    let generators = GeneratorTable::default();
    let mut vctx = ValidationContext::from_context(&context, config.validation.coverage_policy);
    for target in [Phase::PlanReady, Phase::TasksReady, Phase::Implemented] {
        let Some(generator) = generators.get(target) else {
            continue;
        };
        let name = run.output(generator.artifact_name());
        let raw = match store.read(&name).await {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => {
                println!("{} {} (not generated yet)", "--".dimmed(), name);
                continue;
            }
            Err(e) => return Err(e).context(format!("Failed to read {}", name)),
        };
        let assessment = generator.assess(&raw, &vctx);
        all_valid &= print_report(&name, &assessment.report);
        if let Decomposition::Tasks(list) = assessment.decomposition {
            vctx = vctx.with_tasks(list);
        }
    }

    Ok(if all_valid { EXIT_OK } else { EXIT_FAILED })
}

fn print_report(name: &str, report: &ValidationReport) -> bool {
    let verdict = if report.is_valid() { "ok".green() } else { "invalid".red() };
    println!("{} {}", verdict, name);
    for v in report.violations() {
        let line = format!("   {}", v);
        if v.is_error() {
            println!("{}", line.red());
        } else {
            println!("{}", line.yellow());
        }
    }
    report.is_valid()
}
