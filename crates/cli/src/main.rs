use backup::BackupManager;
use clap::{Parser, Subcommand};
use common::error::MigrationError;
use common::manifest::StackManifest;
use common::{exit_codes, probe, Category};
use executor::{ExecutionStatus, Executor, ExecutorOptions, StepStatus};
use planner::{FileChange, MigrationPlan, RiskLevel};
use registry::AdapterRegistry;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use validator::{Verdict, ValidatorOptions};

#[derive(Parser)]
#[command(name = "restack")]
#[command(about = "Swap one stack technology for another without losing your changes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate one technology category to a new implementation.
    Migrate {
        /// Current technology (optional; detection runs either way).
        #[arg(long)]
        from: Option<String>,
        /// Target technology.
        #[arg(long)]
        to: Option<String>,
        /// Category to migrate: auth, database, orm, storage or email.
        #[arg(long)]
        category: Option<String>,
        /// Compute and print the plan without touching anything.
        #[arg(long)]
        dry_run: bool,
        /// Ask for confirmation before executing medium/high-risk plans.
        #[arg(long)]
        interactive: bool,
        /// Roll the project back to the most recent backup snapshot.
        #[arg(long)]
        rollback: bool,
        /// List the registered technologies instead of migrating.
        #[arg(long)]
        list_available: bool,
        /// Acknowledge a database change flagged data_loss.
        #[arg(long)]
        acknowledge_data_loss: bool,
        /// Timeout in seconds for database migration steps.
        #[arg(long, default_value_t = 600)]
        db_timeout: u64,
        /// Shell command printing JSON {table: row_count} for parity checks.
        #[arg(long)]
        row_count_cmd: Option<String>,
        /// Emit line-delimited JSON progress events and a final result object.
        #[arg(long)]
        json: bool,
        /// JSON file with extra adapter entries merged over the built-ins.
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Project root.
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Show the project's append-only migration history.
    History {
        /// Project root.
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Delete old backup snapshots, keeping the newest N.
    Prune {
        /// Snapshots to keep.
        #[arg(long, default_value_t = 3)]
        keep: usize,
        /// Project root.
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Migrate {
            from,
            to,
            category,
            dry_run,
            interactive,
            rollback,
            list_available,
            acknowledge_data_loss,
            db_timeout,
            row_count_cmd,
            json,
            registry,
            path,
        } => {
            let registry = load_registry(registry.as_deref())?;
            if list_available {
                return cmd_list_available(&registry, category.as_deref());
            }
            let root = dunce::canonicalize(&path)?;
            if rollback {
                return cmd_rollback(&root, json);
            }
            cmd_migrate(MigrateArgs {
                root,
                registry,
                from,
                to,
                category,
                dry_run,
                interactive,
                acknowledge_data_loss,
                db_timeout,
                row_count_cmd,
                json,
            })
            .await
        }
        Commands::History { path } => cmd_history(&dunce::canonicalize(&path)?),
        Commands::Prune { keep, path } => cmd_prune(&dunce::canonicalize(&path)?, keep),
    }
}

fn load_registry(overlay: Option<&Path>) -> anyhow::Result<AdapterRegistry> {
    Ok(match overlay {
        Some(path) => AdapterRegistry::with_overlay(path)?,
        None => AdapterRegistry::builtin(),
    })
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

struct MigrateArgs {
    root: PathBuf,
    registry: AdapterRegistry,
    from: Option<String>,
    to: Option<String>,
    category: Option<String>,
    dry_run: bool,
    interactive: bool,
    acknowledge_data_loss: bool,
    db_timeout: u64,
    row_count_cmd: Option<String>,
    json: bool,
}

async fn cmd_migrate(args: MigrateArgs) -> anyhow::Result<i32> {
    let progress = Progress { json: args.json };

    let Some(category_str) = args.category.as_deref() else {
        eprintln!("--category is required (auth, database, orm, storage or email)");
        return Ok(exit_codes::ANALYSIS_FAILED);
    };
    let Some(to) = args.to.as_deref() else {
        eprintln!("--to is required");
        return Ok(exit_codes::ANALYSIS_FAILED);
    };
    let category: Category = match category_str.parse() {
        Ok(c) => c,
        Err(e) => return Ok(report_error(&e, args.json)),
    };

    // Analysis: read-only, no rollback needed on failure.
    progress.emit("analysis", 10, "fingerprinting the project");
    let analysis = match analyzer::analyze(
        &args.root,
        &args.registry,
        category,
        to,
        args.from.as_deref(),
    ) {
        Ok(a) => a,
        Err(e) => return Ok(report_error(&e, args.json)),
    };
    for warning in &analysis.compatibility.warnings {
        eprintln!("warning: {warning}");
    }
    for issue in &analysis.compatibility.blocking_issues {
        eprintln!("blocking: {issue}");
    }

    // Planning: still read-only.
    progress.emit("planning", 30, "computing the change set");
    let manifest = match StackManifest::load(&args.root) {
        Ok(m) => m,
        Err(e) => return Ok(report_error(&e, args.json)),
    };
    let plan = match planner::plan(&analysis, &args.root, &manifest) {
        Ok(p) => p,
        Err(e) => return Ok(report_error(&e, args.json)),
    };

    print_plan(&plan, args.json);

    if args.dry_run {
        if args.json {
            println!(
                "{}",
                serde_json::json!({ "phase": "done", "dry_run": true, "plan": plan })
            );
        } else {
            println!("Dry run — nothing was changed.");
        }
        return Ok(exit_codes::SUCCESS);
    }

    if args.interactive && plan.risk_level >= RiskLevel::Medium && !confirm_risk(&plan) {
        println!("Migration aborted by operator.");
        return Ok(exit_codes::SUCCESS);
    }

    let row_count_cmd = args
        .row_count_cmd
        .clone()
        .or_else(|| std::env::var(probe::ROW_COUNT_CMD_ENV).ok());
    let options = ExecutorOptions {
        acknowledge_data_loss: args.acknowledge_data_loss,
        db_timeout: Duration::from_secs(args.db_timeout),
        row_count_cmd: row_count_cmd.clone(),
    };
    let executor = Executor::new(&args.root, &args.registry, options);

    // Ctrl-C finishes the in-flight step, then rolls back.
    let cancel = executor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested; the current step will finish first");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    progress.emit("execution", 50, "applying the plan");
    let record = match executor.execute(&plan) {
        Ok(record) => record,
        Err(e) => return Ok(report_error(&e, args.json)),
    };
    print_execution(&record, args.json);

    if record.status != ExecutionStatus::Completed {
        if args.json {
            println!(
                "{}",
                serde_json::json!({ "phase": "done", "plan": plan, "execution": record })
            );
        }
        return Ok(exit_codes::EXECUTION_FAILED);
    }

    progress.emit("validation", 85, "running post-migration checks");
    let report = match validator::validate(
        &args.root,
        &plan,
        &args.registry,
        &record.migration_id,
        record.pre_row_counts.as_ref(),
        &ValidatorOptions {
            row_count_cmd,
            skip_tests: false,
        },
    ) {
        Ok(r) => r,
        Err(e) => return Ok(report_error(&e, args.json)),
    };
    print_validation(&report, args.json);

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "phase": "done",
                "plan": plan,
                "execution": record,
                "validation": report,
            })
        );
    }

    match report.overall {
        Verdict::Failure => {
            eprintln!(
                "validation failed — the migration is applied but looks unhealthy; \
                 consider `restack migrate --rollback`"
            );
            Ok(exit_codes::VALIDATION_FAILED)
        }
        _ => Ok(exit_codes::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// rollback / list / history / prune
// ---------------------------------------------------------------------------

fn cmd_rollback(root: &Path, json: bool) -> anyhow::Result<i32> {
    match executor::rollback_latest(root) {
        Ok(record) => {
            if json {
                println!("{}", serde_json::json!({ "phase": "done", "execution": record }));
            } else {
                println!(
                    "Rolled back migration {} (backup {}).",
                    record.migration_id,
                    record.backup_id.as_deref().unwrap_or("?")
                );
            }
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => Ok(report_error(&e, json)),
    }
}

fn cmd_list_available(registry: &AdapterRegistry, category: Option<&str>) -> anyhow::Result<i32> {
    let categories: Vec<Category> = match category {
        Some(c) => vec![c.parse()?],
        None => Category::all().to_vec(),
    };

    for category in categories {
        println!("{category}:");
        for adapter in registry.available(category) {
            println!(
                "  {:<14} v{:<6} {} files, {} deps, {} env vars",
                adapter.name,
                adapter.version,
                adapter.owned_files.len(),
                adapter.dependencies.len(),
                adapter.env_vars.len()
            );
        }
    }
    Ok(exit_codes::SUCCESS)
}

fn cmd_history(root: &Path) -> anyhow::Result<i32> {
    let manifest = StackManifest::load(root)?;
    if manifest.migration_history.is_empty() {
        println!("No migrations recorded.");
        return Ok(exit_codes::SUCCESS);
    }
    println!("+------------------------------------------------------------+");
    println!("| MIGRATION HISTORY                                          |");
    println!("+------------------------------------------------------------+");
    for entry in &manifest.migration_history {
        println!(
            "  {}  {}: {} -> {}  [{}]",
            entry.date, entry.category, entry.from, entry.to, entry.migration_id
        );
    }
    Ok(exit_codes::SUCCESS)
}

fn cmd_prune(root: &Path, keep: usize) -> anyhow::Result<i32> {
    let removed = BackupManager::new(root).prune(keep)?;
    println!("Pruned {removed} snapshot(s), kept the newest {keep}.");
    Ok(exit_codes::SUCCESS)
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

/// Structured progress for CI consumers; plain lines for humans.
struct Progress {
    json: bool,
}

impl Progress {
    fn emit(&self, phase: &str, percent: u8, step: &str) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({ "phase": phase, "percent": percent, "step": step })
            );
        } else {
            println!("[{percent:>3}%] {phase}: {step}");
        }
    }
}

fn report_error(error: &MigrationError, json: bool) -> i32 {
    if json {
        println!(
            "{}",
            serde_json::json!({ "phase": "error", "error": error.to_string() })
        );
    }
    eprintln!("error: {error}");
    error.exit_code()
}

fn print_plan(plan: &MigrationPlan, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "phase": "plan", "plan": plan }));
        return;
    }

    let (adds, modifies, deletes) =
        plan.file_changes
            .iter()
            .fold((0, 0, 0), |(a, m, d), c| match c {
                FileChange::Add { .. } => (a + 1, m, d),
                FileChange::Modify { .. } => (a, m + 1, d),
                FileChange::Delete { .. } => (a, m, d + 1),
            });

    println!("+------------------------------------------+");
    println!("| MIGRATION PLAN                           |");
    println!("+------------------------------------------+");
    println!("| {:<12} {:>27} |", "category", plan.category.to_string());
    println!("| {:<12} {:>27} |", "from -> to", format!("{} -> {}", plan.from, plan.to));
    println!("| {:<12} {:>27} |", "files", format!("+{adds} ~{modifies} -{deletes}"));
    println!("| {:<12} {:>27} |", "deps", plan.dependency_changes.len());
    println!("| {:<12} {:>27} |", "env vars", plan.env_var_changes.len());
    println!("| {:<12} {:>27} |", "user edits", plan.user_modified.len());
    println!("| {:<12} {:>27?} |", "risk", plan.risk_level);
    if let Some(db) = &plan.database_changes {
        println!(
            "| {:<12} {:>27} |",
            "database",
            format!(
                "{} steps, ~{}s{}",
                db.migration_steps.len(),
                db.estimated_duration_secs,
                if db.data_loss { ", DATA LOSS" } else { "" }
            )
        );
    }
    println!("+------------------------------------------+");

    for change in &plan.file_changes {
        match change {
            FileChange::Add { path, reason, .. } => println!("  + {path}  ({reason})"),
            FileChange::Modify { path, reason, .. } => println!("  ~ {path}  ({reason})"),
            FileChange::Delete { path, reason } => println!("  - {path}  ({reason})"),
        }
    }
}

fn print_execution(record: &executor::ExecutionRecord, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "phase": "execution", "execution": record })
        );
        return;
    }

    println!("+------------------------------------------+");
    println!("| EXECUTION {:<30?} |", record.status);
    println!("+------------------------------------------+");
    for step in &record.steps {
        let mark = match step.status {
            StepStatus::Completed => "ok",
            StepStatus::Failed => "FAILED",
            _ => "..",
        };
        println!("  [{mark}] {}", step.name);
        if let Some(error) = &step.error {
            println!("        {error}");
        }
    }
    if let Some(conflict) = &record.conflict {
        println!(
            "  {} has {} conflict region(s) needing manual resolution",
            conflict.file,
            conflict.conflict_regions.len()
        );
    }
    if let Some(rollback) = &record.rollback {
        println!("  rollback: {:?}", rollback.status);
        for note in &rollback.notes {
            println!("    {note}");
        }
    }
}

fn print_validation(report: &validator::ValidationReport, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "phase": "validation", "validation": report })
        );
        return;
    }

    println!("+------------------------------------------+");
    println!("| VALIDATION {:<29?} |", report.overall);
    println!("+------------------------------------------+");
    for check in &report.checks {
        let mark = if check.passed { "ok" } else { "!!" };
        println!("  [{mark}] {:<22} {}", check.name, check.message);
    }
    println!("  tests: {}", report.test_summary.detail);
}

/// Interactive confirmation for medium/high-risk plans.
fn confirm_risk(plan: &MigrationPlan) -> bool {
    print!(
        "This is a {:?}-risk migration ({} -> {}). Continue? [y/N] ",
        plan.risk_level, plan.from, plan.to
    );
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}
