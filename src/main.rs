//! Autonomy - unattended task queue execution with Claude Code.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use autonomy::agent::ClaudeAgent;
use autonomy::config::AutonomyConfig;
use autonomy::notify::notifier_from_config;
use autonomy::runloop::{LoopConfig, LoopController};
use autonomy::scheduler::{PriorityScheduler, TaskSource};
use autonomy::store::TaskStore;
use autonomy::AutonomyError;

#[derive(Parser)]
#[command(name = "autonomy")]
#[command(version = "0.1.0")]
#[command(about = "Unattended task queue execution with Claude Code", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the autonomy loop
    Run {
        /// Maximum iterations (0 = unlimited)
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Seconds between iterations
        #[arg(short, long)]
        cooldown: Option<u64>,

        /// Model passed to the agent CLI (e.g. opus, sonnet)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Per-task timeout in minutes
        #[arg(long, value_name = "MINUTES")]
        timeout: Option<u64>,
    },

    /// Show queue status counts
    Status,

    /// Show the next task the scheduler would pick
    Next,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "autonomy=debug,info"
    } else {
        "autonomy=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run {
            max_iterations,
            cooldown,
            model,
            timeout,
        } => run_loop(&project_path, max_iterations, cooldown, model, timeout).await,
        Commands::Status => show_status(&project_path),
        Commands::Next => show_next(&project_path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run_loop(
    project_path: &std::path::Path,
    max_iterations: Option<u32>,
    cooldown: Option<u64>,
    model: Option<String>,
    timeout: Option<u64>,
) -> Result<(), AutonomyError> {
    let mut config = AutonomyConfig::load(project_path)?;

    // CLI flags override the config file
    if let Some(max) = max_iterations {
        config.max_iterations = max;
    }
    if let Some(secs) = cooldown {
        config.cooldown_seconds = secs;
    }
    if let Some(minutes) = timeout {
        config.task_timeout_minutes = minutes;
    }
    if model.is_some() {
        config.model = model;
    }

    println!("{}", "=".repeat(50));
    println!("Autonomy loop driver");
    println!("{}", "=".repeat(50));

    let loop_config = LoopConfig::from_project_config(project_path, &config);
    let agent = Box::new(ClaudeAgent::new(project_path).with_model(config.model.clone()));
    let notifier = notifier_from_config(config.notify_command.as_deref());

    let mut controller = LoopController::new(loop_config, agent, notifier);
    controller.run().await?;
    Ok(())
}

fn show_status(project_path: &std::path::Path) -> Result<(), AutonomyError> {
    let doc = TaskStore::new(project_path).load()?;
    let counts = doc.counts();

    println!(
        "Tasks: {} total | {} done | {} pending | {} in progress | {} failed | {} blocked",
        counts.total(),
        counts.done.to_string().green(),
        counts.pending,
        counts.in_progress,
        counts.failed.to_string().red(),
        counts.blocked.to_string().yellow()
    );

    for task in &doc.features {
        let mut line = format!("  [{}] {} - {}", task.status, task.id, task.title);
        if let Some(ref reason) = task.blocked_reason {
            line.push_str(&format!(" ({})", reason));
        }
        println!("{}", line);
    }

    Ok(())
}

fn show_next(project_path: &std::path::Path) -> Result<(), AutonomyError> {
    let doc = TaskStore::new(project_path).load()?;

    match PriorityScheduler::new().next(&doc) {
        Some(task) => println!("{} - {}", task.id, task.title),
        None => println!("No eligible tasks"),
    }

    Ok(())
}
