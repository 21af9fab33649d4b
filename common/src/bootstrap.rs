// Bootstrap utilities for binary initialization
// Wires settings into the registry, pipeline and scheduler engine

use crate::config::Settings;
use crate::db::repositories::{TaskRegistry, TaskRepository};
use crate::db::DbPool;
use crate::git::{CommitIdentity, GitRepositoryOpener, RepositoryOpener};
use crate::llm::{MessageGenerator, OpenAiClient};
use crate::pipeline::{ExecutionPipeline, TaskExecutor};
use crate::scheduler::{EngineConfig, SchedulerEngine, SystemClock};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open the task registry database
///
/// # Errors
/// Returns error if the database file cannot be opened or initialized
#[tracing::instrument(skip(settings))]
pub async fn init_registry(settings: &Settings, config_dir: &Path) -> Result<Arc<TaskRepository>> {
    let path = settings.database_path(config_dir);
    info!(path = %path.display(), "Opening task registry");

    let pool = DbPool::open(&path)
        .await
        .with_context(|| format!("Failed to open task database at {}", path.display()))?;

    Ok(Arc::new(TaskRepository::new(pool)))
}

/// Build the commit message generator from the LLM settings
///
/// # Errors
/// Returns error if the HTTP client cannot be created
pub fn init_generator(settings: &Settings) -> Result<Arc<dyn MessageGenerator>> {
    let client = OpenAiClient::new(&settings.llm).context("Failed to create LLM client")?;

    if client.has_credentials() {
        info!(model = %settings.llm.model, base_url = %settings.llm.base_url, "LLM message generation enabled");
    } else {
        info!("No LLM API key configured, static messages only");
    }

    Ok(Arc::new(client))
}

/// Build the execution pipeline over git and the configured generator
///
/// # Errors
/// Returns error if the generator cannot be created
pub fn init_pipeline(settings: &Settings) -> Result<Arc<dyn TaskExecutor>> {
    let identity = CommitIdentity {
        name: settings.git.author_name.clone(),
        email: settings.git.author_email.clone(),
    };
    let opener: Arc<dyn RepositoryOpener> =
        Arc::new(GitRepositoryOpener::new(identity, settings.git.remote.clone()));

    Ok(Arc::new(ExecutionPipeline::new(
        opener,
        init_generator(settings)?,
    )))
}

/// Assemble the scheduler engine on the wall clock
pub fn init_scheduler(
    settings: &Settings,
    registry: Arc<dyn TaskRegistry>,
    executor: Arc<dyn TaskExecutor>,
) -> SchedulerEngine {
    let config = EngineConfig::from(&settings.scheduler);
    info!(
        tick_interval_ms = settings.scheduler.tick_interval_ms,
        reconcile_interval_seconds = settings.scheduler.reconcile_interval_seconds,
        "Scheduler engine created"
    );
    SchedulerEngine::new(config, registry, executor, Arc::new(SystemClock))
}
