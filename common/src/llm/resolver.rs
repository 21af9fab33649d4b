// Commit message resolution
//
// Decision table (first matching row wins):
//
// | credentials | static message | plan                      |
// |-------------|----------------|---------------------------|
// | yes         | set            | generate, static fallback |
// | yes         | empty          | generate only             |
// | no          | set            | static only               |
// | no          | empty          | unresolvable              |
//
// A configured static message never short-circuits generation.

use crate::errors::{GenerationError, MessageError};
use crate::llm::client::clean_message;
use std::future::Future;

/// Where a resolved commit message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    Generated,
    /// Static message used because generation failed
    StaticFallback,
    /// Static message used because generation is unavailable
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub text: String,
    pub source: MessageSource,
}

/// Resolution strategy chosen before any generation is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePlan {
    GenerateWithFallback,
    GenerateOnly,
    StaticOnly,
    Unavailable,
}

/// Pick the resolution strategy from the decision table
pub fn plan(has_credentials: bool, has_static_message: bool) -> MessagePlan {
    match (has_credentials, has_static_message) {
        (true, true) => MessagePlan::GenerateWithFallback,
        (true, false) => MessagePlan::GenerateOnly,
        (false, true) => MessagePlan::StaticOnly,
        (false, false) => MessagePlan::Unavailable,
    }
}

/// Resolve the commit message for one run
///
/// `generate` is invoked at most once, and only when credentials are present.
/// A generated message that is empty after cleaning counts as a failure.
pub async fn resolve_message<F, Fut>(
    has_credentials: bool,
    static_message: Option<&str>,
    generate: F,
) -> Result<ResolvedMessage, MessageError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, GenerationError>>,
{
    let static_message = static_message.filter(|m| !m.trim().is_empty());

    match plan(has_credentials, static_message.is_some()) {
        MessagePlan::Unavailable => Err(MessageError::NoSource),
        MessagePlan::StaticOnly => Ok(ResolvedMessage {
            text: static_message.unwrap_or_default().to_string(),
            source: MessageSource::Static,
        }),
        generating => match generated(generate().await) {
            Ok(text) => Ok(ResolvedMessage {
                text,
                source: MessageSource::Generated,
            }),
            Err(err) => match (generating, static_message) {
                (MessagePlan::GenerateWithFallback, Some(fallback)) => {
                    tracing::warn!(error = %err, "Message generation failed, using static message");
                    Ok(ResolvedMessage {
                        text: fallback.to_string(),
                        source: MessageSource::StaticFallback,
                    })
                }
                _ => Err(MessageError::GenerationFailed(err)),
            },
        },
    }
}

fn generated(result: Result<String, GenerationError>) -> Result<String, GenerationError> {
    let text = clean_message(&result?);
    if text.is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn resolve(
        credentials: bool,
        static_message: Option<&str>,
        outcome: Result<&str, ()>,
        calls: &AtomicUsize,
    ) -> Result<ResolvedMessage, MessageError> {
        resolve_message(credentials, static_message, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            outcome
                .map(str::to_string)
                .map_err(|_| GenerationError::Status(500))
        })
        .await
    }

    #[test]
    fn test_plan_table() {
        assert_eq!(plan(true, true), MessagePlan::GenerateWithFallback);
        assert_eq!(plan(true, false), MessagePlan::GenerateOnly);
        assert_eq!(plan(false, true), MessagePlan::StaticOnly);
        assert_eq!(plan(false, false), MessagePlan::Unavailable);
    }

    #[tokio::test]
    async fn test_credentials_and_static_generation_succeeds() {
        let calls = AtomicUsize::new(0);
        let msg = resolve(true, Some("fallback"), Ok("feat: x"), &calls)
            .await
            .unwrap();
        assert_eq!(msg.text, "feat: x");
        assert_eq!(msg.source, MessageSource::Generated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_credentials_and_static_generation_fails() {
        let calls = AtomicUsize::new(0);
        let msg = resolve(true, Some("fallback"), Err(()), &calls)
            .await
            .unwrap();
        assert_eq!(msg.text, "fallback");
        assert_eq!(msg.source, MessageSource::StaticFallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_credentials_no_static_generation_succeeds() {
        let calls = AtomicUsize::new(0);
        let msg = resolve(true, None, Ok("  \"fix: y\"  "), &calls)
            .await
            .unwrap();
        assert_eq!(msg.text, "fix: y");
        assert_eq!(msg.source, MessageSource::Generated);
    }

    #[tokio::test]
    async fn test_credentials_no_static_generation_fails() {
        let calls = AtomicUsize::new(0);
        let result = resolve(true, None, Err(()), &calls).await;
        assert!(matches!(result, Err(MessageError::GenerationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_credentials_with_static_never_generates() {
        for outcome in [Ok("feat: x"), Err(())] {
            let calls = AtomicUsize::new(0);
            let msg = resolve(false, Some("chore: autosave"), outcome, &calls)
                .await
                .unwrap();
            assert_eq!(msg.text, "chore: autosave");
            assert_eq!(msg.source, MessageSource::Static);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_no_credentials_no_static_is_unresolvable() {
        for outcome in [Ok("feat: x"), Err(())] {
            let calls = AtomicUsize::new(0);
            let result = resolve(false, None, outcome, &calls).await;
            assert!(matches!(result, Err(MessageError::NoSource)));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_blank_static_message_counts_as_unset() {
        let calls = AtomicUsize::new(0);
        let result = resolve(false, Some("   "), Ok("feat: x"), &calls).await;
        assert!(matches!(result, Err(MessageError::NoSource)));
    }

    #[tokio::test]
    async fn test_static_message_is_used_as_given() {
        let calls = AtomicUsize::new(0);
        let msg = resolve(false, Some("  wip  "), Ok("feat: x"), &calls)
            .await
            .unwrap();
        assert_eq!(msg.text, "  wip  ");

        let msg = resolve(true, Some("  wip  "), Err(()), &calls)
            .await
            .unwrap();
        assert_eq!(msg.text, "  wip  ");
        assert_eq!(msg.source, MessageSource::StaticFallback);
    }

    #[tokio::test]
    async fn test_empty_generated_message_falls_back() {
        let calls = AtomicUsize::new(0);
        let msg = resolve(true, Some("fallback"), Ok(" '' "), &calls)
            .await
            .unwrap();
        assert_eq!(msg.source, MessageSource::StaticFallback);
    }
}
