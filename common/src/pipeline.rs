// Execution pipeline: drives one task run from change detection to push

use crate::errors::RepositoryError;
use crate::git::{Repository, RepositoryOpener};
use crate::llm::{resolve_message, MessageGenerator};
use crate::models::{ExecutionContext, PipelineStage, PushOutcome, RunOutcome};
use crate::telemetry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// TaskExecutor runs a single dispatched task to completion
///
/// Failures are contained in the returned outcome; execution never errors
/// back into the scheduler.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> RunOutcome;
}

/// Pipeline over a repository opener and a message generator
pub struct ExecutionPipeline {
    opener: Arc<dyn RepositoryOpener>,
    generator: Arc<dyn MessageGenerator>,
}

impl ExecutionPipeline {
    pub fn new(opener: Arc<dyn RepositoryOpener>, generator: Arc<dyn MessageGenerator>) -> Self {
        Self { opener, generator }
    }

    async fn run(&self, ctx: &ExecutionContext) -> RunOutcome {
        let repo = match self.opener.open(&ctx.path).await {
            Ok(repo) => repo,
            Err(e) => return aborted(PipelineStage::Open, e),
        };

        match repo.has_changes().await {
            Ok(true) => {}
            Ok(false) => return RunOutcome::NoChanges,
            Err(e) => return aborted(PipelineStage::ChangeDetection, e),
        }

        if let Some(outcome) = self.stage(repo.as_ref(), ctx).await {
            return outcome;
        }

        let diff = match repo.diff().await {
            Ok(diff) => diff,
            Err(e) => return aborted(PipelineStage::Diff, e),
        };

        let generator = &self.generator;
        let message = match resolve_message(
            generator.has_credentials(),
            ctx.static_message.as_deref(),
            || generator.generate(&diff),
        )
        .await
        {
            Ok(resolved) => {
                info!(source = ?resolved.source, "Commit message resolved");
                resolved.text
            }
            Err(e) => return aborted(PipelineStage::Message, e),
        };

        match repo.commit(&message).await {
            Ok(()) => {}
            Err(RepositoryError::NothingToCommit) => return RunOutcome::NothingToCommit,
            Err(e) => return aborted(PipelineStage::Commit, e),
        }

        let push = if ctx.auto_push {
            match repo.push().await {
                Ok(()) => PushOutcome::Pushed,
                Err(e) => PushOutcome::Failed(e.to_string()),
            }
        } else {
            PushOutcome::Disabled
        };

        RunOutcome::Committed { message, push }
    }

    /// Staging decision; `Some` ends the run early
    async fn stage(&self, repo: &dyn Repository, ctx: &ExecutionContext) -> Option<RunOutcome> {
        if ctx.auto_add {
            return repo
                .stage(&ctx.excludes)
                .await
                .err()
                .map(|e| aborted(PipelineStage::Staging, e));
        }

        match repo.has_staged_changes().await {
            Ok(true) => None,
            Ok(false) => Some(RunOutcome::NoStagedChanges),
            Err(e) => Some(aborted(PipelineStage::Staging, e)),
        }
    }
}

#[async_trait]
impl TaskExecutor for ExecutionPipeline {
    #[instrument(skip(self, ctx), fields(task_id = ctx.task_id, path = %ctx.path.display()))]
    async fn execute(&self, ctx: ExecutionContext) -> RunOutcome {
        let outcome = self.run(&ctx).await;

        match &outcome {
            RunOutcome::NoChanges => info!("No changes detected"),
            RunOutcome::NoStagedChanges => {
                info!("Auto-add disabled and nothing staged, skipping commit")
            }
            RunOutcome::NothingToCommit => info!("Nothing to commit"),
            RunOutcome::Committed { message, push } => match push {
                PushOutcome::Disabled => info!(message = %message, "Committed changes"),
                PushOutcome::Pushed => info!(message = %message, "Committed and pushed changes"),
                PushOutcome::Failed(reason) => {
                    error!(message = %message, error = %reason, "Committed changes but push failed")
                }
            },
            RunOutcome::Aborted {
                stage: PipelineStage::Message,
                reason,
            } => warn!(error = %reason, "No usable commit message, skipping commit"),
            RunOutcome::Aborted { stage, reason } => {
                error!(stage = stage.as_str(), error = %reason, "Run aborted")
            }
        }

        telemetry::record_run_outcome(outcome.label());
        outcome
    }
}

fn aborted(stage: PipelineStage, err: impl std::fmt::Display) -> RunOutcome {
    RunOutcome::Aborted {
        stage,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GenerationError;
    use crate::git::repository::MockRepository;
    use crate::llm::client::MockMessageGenerator;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct StubOpener {
        repo: Mutex<Option<MockRepository>>,
    }

    #[async_trait]
    impl RepositoryOpener for StubOpener {
        async fn open(&self, path: &Path) -> Result<Box<dyn Repository>, RepositoryError> {
            match self.repo.lock().unwrap().take() {
                Some(repo) => Ok(Box::new(repo)),
                None => Err(RepositoryError::NotARepository(path.display().to_string())),
            }
        }
    }

    fn context(auto_add: bool, auto_push: bool, static_message: Option<&str>) -> ExecutionContext {
        ExecutionContext {
            task_id: 1,
            path: PathBuf::from("/srv/repo"),
            auto_add,
            auto_push,
            static_message: static_message.map(str::to_string),
            excludes: vec!["*.log".to_string()],
        }
    }

    fn pipeline(repo: Option<MockRepository>, generator: MockMessageGenerator) -> ExecutionPipeline {
        ExecutionPipeline::new(
            Arc::new(StubOpener {
                repo: Mutex::new(repo),
            }),
            Arc::new(generator),
        )
    }

    fn generator_ok(message: &'static str) -> MockMessageGenerator {
        let mut generator = MockMessageGenerator::new();
        generator.expect_has_credentials().return_const(true);
        generator
            .expect_generate()
            .times(1)
            .returning(move |_| Ok(message.to_string()));
        generator
    }

    fn untouched_generator() -> MockMessageGenerator {
        let mut generator = MockMessageGenerator::new();
        generator.expect_has_credentials().never();
        generator.expect_generate().never();
        generator
    }

    /// Repository with changes that stages and diffs successfully
    fn dirty_repo() -> MockRepository {
        let mut repo = MockRepository::new();
        repo.expect_has_changes().returning(|| Ok(true));
        repo.expect_stage()
            .withf(|excludes: &[String]| excludes == ["*.log".to_string()])
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_diff()
            .returning(|| Ok("diff --git a/x b/x".to_string()));
        repo
    }

    #[tokio::test]
    async fn test_no_changes_skips_message_resolution() {
        let mut repo = MockRepository::new();
        repo.expect_has_changes().returning(|| Ok(false));
        repo.expect_stage().never();
        repo.expect_commit().never();

        let outcome = pipeline(Some(repo), untouched_generator())
            .execute(context(true, true, Some("static")))
            .await;

        assert_eq!(outcome, RunOutcome::NoChanges);
        assert!(!outcome.committed());
    }

    #[tokio::test]
    async fn test_auto_add_disabled_without_staged_changes() {
        let mut repo = MockRepository::new();
        repo.expect_has_changes().returning(|| Ok(true));
        repo.expect_has_staged_changes().returning(|| Ok(false));
        repo.expect_stage().never();
        repo.expect_diff().never();
        repo.expect_commit().never();

        let outcome = pipeline(Some(repo), untouched_generator())
            .execute(context(false, false, Some("static")))
            .await;

        assert_eq!(outcome, RunOutcome::NoStagedChanges);
    }

    #[tokio::test]
    async fn test_auto_add_disabled_commits_preexisting_staged_changes() {
        let mut repo = MockRepository::new();
        repo.expect_has_changes().returning(|| Ok(true));
        repo.expect_has_staged_changes().returning(|| Ok(true));
        repo.expect_stage().never();
        repo.expect_diff().returning(|| Ok("diff".to_string()));
        repo.expect_commit()
            .withf(|m: &str| m == "feat: x")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = pipeline(Some(repo), generator_ok("feat: x"))
            .execute(context(false, false, None))
            .await;

        assert_eq!(
            outcome,
            RunOutcome::Committed {
                message: "feat: x".to_string(),
                push: PushOutcome::Disabled,
            }
        );
    }

    #[tokio::test]
    async fn test_generated_message_is_preferred_over_static() {
        let mut repo = dirty_repo();
        repo.expect_commit()
            .withf(|m: &str| m == "feat: x")
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_push().times(1).returning(|| Ok(()));

        let outcome = pipeline(Some(repo), generator_ok("\"feat: x\""))
            .execute(context(true, true, Some("fallback")))
            .await;

        assert!(outcome.committed());
        assert!(outcome.pushed());
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back_to_static() {
        let mut generator = MockMessageGenerator::new();
        generator.expect_has_credentials().return_const(true);
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Err(GenerationError::Status(503)));

        let mut repo = dirty_repo();
        repo.expect_commit()
            .withf(|m: &str| m == "fallback")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = pipeline(Some(repo), generator)
            .execute(context(true, false, Some("fallback")))
            .await;

        assert_eq!(
            outcome,
            RunOutcome::Committed {
                message: "fallback".to_string(),
                push: PushOutcome::Disabled,
            }
        );
    }

    #[tokio::test]
    async fn test_unresolvable_message_never_commits() {
        let mut generator = MockMessageGenerator::new();
        generator.expect_has_credentials().return_const(false);
        generator.expect_generate().never();

        let mut repo = dirty_repo();
        repo.expect_commit().never();
        repo.expect_push().never();

        let outcome = pipeline(Some(repo), generator)
            .execute(context(true, true, None))
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                stage: PipelineStage::Message,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_nothing_to_commit_is_benign_and_skips_push() {
        let mut repo = dirty_repo();
        repo.expect_commit()
            .returning(|_| Err(RepositoryError::NothingToCommit));
        repo.expect_push().never();

        let outcome = pipeline(Some(repo), generator_ok("feat: x"))
            .execute(context(true, true, None))
            .await;

        assert_eq!(outcome, RunOutcome::NothingToCommit);
        assert_eq!(outcome.label(), "nothing_to_commit");
    }

    #[tokio::test]
    async fn test_push_failure_keeps_commit() {
        let mut repo = dirty_repo();
        repo.expect_commit().returning(|_| Ok(()));
        repo.expect_push().times(1).returning(|| {
            Err(RepositoryError::CommandFailed {
                command: "git push".to_string(),
                stderr: "rejected".to_string(),
            })
        });

        let outcome = pipeline(Some(repo), generator_ok("feat: x"))
            .execute(context(true, true, None))
            .await;

        assert!(outcome.committed());
        assert!(!outcome.pushed());
        assert_eq!(outcome.label(), "push_failed");
    }

    #[tokio::test]
    async fn test_invalid_pattern_aborts_at_staging() {
        let mut repo = MockRepository::new();
        repo.expect_has_changes().returning(|| Ok(true));
        repo.expect_stage().returning(|_| {
            Err(RepositoryError::InvalidPattern {
                pattern: "[".to_string(),
                reason: "unclosed character class".to_string(),
            })
        });
        repo.expect_diff().never();
        repo.expect_commit().never();

        let outcome = pipeline(Some(repo), untouched_generator())
            .execute(context(true, false, Some("static")))
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                stage: PipelineStage::Staging,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_failure_is_contained() {
        let outcome = pipeline(None, untouched_generator())
            .execute(context(true, false, Some("static")))
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                stage: PipelineStage::Open,
                ..
            }
        ));
    }
}
