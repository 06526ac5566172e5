//! Backend processor contract
//!
//! The processor is the external collaborator that turns a user message into
//! a reply (typically an LLM agent). Both the channel router and the gateway
//! call it through [`process_with_cancel`], which bounds the call by a
//! cancellation token and an optional timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Processes one message for a conversation and returns the reply text
#[async_trait]
pub trait AgentProcessor: Send + Sync {
    async fn process(&self, session_id: &str, content: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl<T: AgentProcessor + ?Sized> AgentProcessor for Arc<T> {
    async fn process(&self, session_id: &str, content: &str) -> anyhow::Result<String> {
        (**self).process(session_id, content).await
    }
}

/// Failure of a processor invocation
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("processing cancelled")]
    Cancelled,

    #[error("processing timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Failed(anyhow::Error),
}

/// Invoke `processor`, giving up when `cancel` fires or `timeout` elapses.
pub async fn process_with_cancel(
    processor: &dyn AgentProcessor,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
    session_id: &str,
    content: &str,
) -> Result<String, ProcessorError> {
    if cancel.is_cancelled() {
        return Err(ProcessorError::Cancelled);
    }

    let call = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, processor.process(session_id, content))
                .await
                .map_err(|_| ProcessorError::TimedOut(limit))?
                .map_err(ProcessorError::Failed),
            None => processor
                .process(session_id, content)
                .await
                .map_err(ProcessorError::Failed),
        }
    };

    tokio::select! {
        result = call => result,
        _ = cancel.cancelled() => {
            debug!(session = %session_id, "processor call cancelled");
            Err(ProcessorError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl AgentProcessor for Echo {
        async fn process(&self, session_id: &str, content: &str) -> anyhow::Result<String> {
            Ok(format!("{}|{}", session_id, content))
        }
    }

    struct Slow;

    #[async_trait]
    impl AgentProcessor for Slow {
        async fn process(&self, _session_id: &str, _content: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentProcessor for Broken {
        async fn process(&self, _session_id: &str, _content: &str) -> anyhow::Result<String> {
            anyhow::bail!("model unavailable")
        }
    }

    #[tokio::test]
    async fn test_process_ok() {
        let cancel = CancellationToken::new();
        let out = process_with_cancel(&Echo, &cancel, None, "s", "hi").await.unwrap();
        assert_eq!(out, "s|hi");
    }

    #[tokio::test]
    async fn test_process_failure_is_wrapped() {
        let cancel = CancellationToken::new();
        let err = process_with_cancel(&Broken, &cancel, None, "s", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Failed(_)));
        assert_eq!(err.to_string(), "model unavailable");

        // The cause is printed once, even in alternate form
        let err = anyhow::Error::from(err);
        assert_eq!(format!("{:#}", err), "model unavailable");
    }

    #[tokio::test]
    async fn test_process_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = process_with_cancel(&Echo, &cancel, None, "s", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Cancelled));
    }

    #[tokio::test]
    async fn test_process_cancelled_mid_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = process_with_cancel(&Slow, &cancel, None, "s", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Cancelled));
    }

    #[tokio::test]
    async fn test_process_timeout() {
        let cancel = CancellationToken::new();
        let err = process_with_cancel(&Slow, &cancel, Some(Duration::from_millis(20)), "s", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_arc_processor() {
        let processor: Arc<dyn AgentProcessor> = Arc::new(Echo);
        let cancel = CancellationToken::new();
        let out = process_with_cancel(&processor, &cancel, None, "a", "b").await.unwrap();
        assert_eq!(out, "a|b");
    }
}
