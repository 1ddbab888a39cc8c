//! Deadline for broker calls.

use std::future::Future;
use std::time::Duration;

use crate::application::ports::BrokerError;

/// Await a broker call, failing with [`BrokerError::Timeout`] once `timeout`
/// elapses.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| BrokerError::Timeout {
            seconds: timeout.as_secs(),
        })?
}
