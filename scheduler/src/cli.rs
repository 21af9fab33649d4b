// Command-line surface

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::bootstrap;
use common::config::{default_config_dir, Settings};
use common::db::repositories::TaskRegistry;
use common::models::{normalize_path, NewTask, TaskRecord};
use common::schedule::parse_task_interval;
use common::scheduler::Scheduler;
use common::telemetry::{self, mask_secret};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Periodically commit (and optionally push) changes in registered git repositories.
#[derive(Debug, Parser)]
#[command(name = "autocommit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (defaults to the platform config dir).
    #[arg(long, global = true, env = "AUTOCOMMIT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register a repository for automatic commits.
    Add(AddArgs),

    /// Unregister a repository by path or ID.
    Remove {
        /// Repository path or numeric task ID.
        target: String,
    },

    /// List registered repositories.
    List,

    /// Update or show configuration.
    Config(ConfigArgs),

    /// Run the scheduler until interrupted.
    Run,
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Path to the repository.
    path: PathBuf,

    /// Commit interval, e.g. 5m or 1h30m (minimum 1m).
    #[arg(short = 'e', long)]
    every: Option<String>,

    /// Only commit changes that are already staged.
    #[arg(long)]
    no_autoadd: bool,

    /// Push after each commit.
    #[arg(long)]
    autopush: bool,

    /// Static commit message, used when generation is unavailable or fails.
    #[arg(short, long)]
    message: Option<String>,

    /// Comma-separated glob patterns to keep out of automatic staging.
    #[arg(long)]
    exclude: Option<String>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Default commit interval for new repositories.
    #[arg(long)]
    interval: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// API key for message generation (empty string clears it).
    #[arg(long)]
    api_key: Option<String>,

    /// Model used for message generation.
    #[arg(long)]
    model: Option<String>,

    /// Print the effective configuration.
    #[arg(long)]
    show: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_dir = match self.config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };
        let settings = Settings::load_from_path(&config_dir)
            .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;

        let log_level = if self.verbose {
            "debug"
        } else {
            settings.observability.log_level.as_str()
        };
        telemetry::init_logging(log_level, settings.observability.json_logs)?;

        match self.command {
            Commands::Add(args) => add(&settings, &config_dir, args).await,
            Commands::Remove { target } => remove(&settings, &config_dir, &target).await,
            Commands::List => list(&settings, &config_dir).await,
            Commands::Config(args) => configure(settings, &config_dir, args),
            Commands::Run => run(&settings, &config_dir).await,
        }
    }
}

async fn add(settings: &Settings, config_dir: &Path, args: AddArgs) -> Result<()> {
    let path = resolve_path(&args.path)?;
    if !path.join(".git").exists() {
        bail!("{} is not a git repository", path.display());
    }

    let every = args
        .every
        .unwrap_or_else(|| settings.defaults.interval.clone());
    parse_task_interval(&every).context("Invalid interval")?;

    let static_msg = args.message.unwrap_or_default();
    if static_msg.trim().is_empty() && !settings.llm.has_credentials() {
        bail!("A commit message is required when no LLM API key is configured; use --message");
    }

    let task = NewTask {
        path: path.to_string_lossy().into_owned(),
        every,
        auto_add: !args.no_autoadd,
        auto_push: args.autopush,
        static_msg,
        exclude_patterns: args.exclude.unwrap_or_default(),
    };

    let registry = bootstrap::init_registry(settings, config_dir).await?;
    let record = registry
        .upsert(&task)
        .await
        .context("Failed to register repository")?;

    println!("Registered {}", describe(&record));
    Ok(())
}

async fn remove(settings: &Settings, config_dir: &Path, target: &str) -> Result<()> {
    let registry = bootstrap::init_registry(settings, config_dir).await?;

    if let Ok(id) = target.parse::<i64>() {
        registry
            .delete_by_id(id)
            .await
            .with_context(|| format!("Failed to unregister repository with ID {}", id))?;
        println!("Unregistered repository with ID {}", id);
        return Ok(());
    }

    let path = resolve_path(Path::new(target))?;
    let path = path.to_string_lossy();
    registry
        .delete_by_path(&path)
        .await
        .context("Failed to unregister repository")?;
    println!("Unregistered {}", path);
    Ok(())
}

/// Absolute, lexically cleaned form of a user-supplied repository path
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(normalize_path(&absolute))
}

async fn list(settings: &Settings, config_dir: &Path) -> Result<()> {
    let registry = bootstrap::init_registry(settings, config_dir).await?;
    let tasks = registry
        .get_all()
        .await
        .context("Failed to list repositories")?;

    if tasks.is_empty() {
        println!("No repositories registered");
        return Ok(());
    }

    println!("Registered repositories:");
    for task in &tasks {
        println!("[ID: {}] {}", task.id, describe(task));
    }
    Ok(())
}

fn configure(mut settings: Settings, config_dir: &Path, args: ConfigArgs) -> Result<()> {
    let changed = args.interval.is_some()
        || args.base_url.is_some()
        || args.api_key.is_some()
        || args.model.is_some();

    if let Some(interval) = args.interval {
        settings.defaults.interval = interval;
    }
    if let Some(base_url) = args.base_url {
        settings.llm.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        settings.llm.api_key = api_key;
    }
    if let Some(model) = args.model {
        settings.llm.model = model;
    }

    if changed {
        settings.validate()?;
        let path = settings.save_to_path(config_dir)?;
        println!("Configuration saved to {}", path.display());
    }

    if args.show || !changed {
        print!("{}", render_settings(&settings));
    }
    Ok(())
}

async fn run(settings: &Settings, config_dir: &Path) -> Result<()> {
    settings.validate()?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let registry = bootstrap::init_registry(settings, config_dir).await?;
    let executor = bootstrap::init_pipeline(settings)?;
    let engine = Arc::new(bootstrap::init_scheduler(settings, registry, executor));

    let mut runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.start().await }
    });

    println!("Monitoring changes. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut runner => {
            result.context("Scheduler task failed")??;
        }
        _ = crate::shutdown_signal() => {
            info!("Shutting down");
            engine.stop().await?;
            runner.await.context("Scheduler task failed")??;
        }
    }

    Ok(())
}

/// One-line summary of a task, as printed by `add` and `list`
fn describe(task: &TaskRecord) -> String {
    let mut line = format!("{} (every {}", task.path, task.every);
    if task.auto_add {
        line.push_str(", auto-add enabled");
    } else {
        line.push_str(", auto-add disabled");
    }
    if task.auto_push {
        line.push_str(", auto-push enabled");
    }
    if let Some(message) = task.static_message() {
        line.push_str(&format!(", message=\"{}\"", message));
    }
    if !task.exclude_patterns.trim().is_empty() {
        line.push_str(&format!(", exclude={}", task.exclude_patterns));
    }
    line.push(')');
    line
}

fn render_settings(settings: &Settings) -> String {
    format!(
        "Default interval: {}\nAPI base URL: {}\nAPI key: {}\nModel: {}\n",
        settings.defaults.interval,
        settings.llm.base_url,
        mask_secret(settings.llm.api_key.trim()),
        settings.llm.model,
    )
}
