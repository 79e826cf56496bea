//! Timeout wrapper for async operations.

use bc_core::BcError;
use std::future::Future;
use std::time::Duration;

/// Runs `fut`, failing with [`BcError::Timeout`] once `duration` elapses.
///
/// `operation` names the command in the error message.
pub async fn with_timeout<Fut, T>(
    duration: Duration,
    operation: &str,
    fut: Fut,
) -> Result<T, BcError>
where
    Fut: Future<Output = Result<T, BcError>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| BcError::Timeout(format!("{} timed out after {:?}", operation, duration)))?
}
