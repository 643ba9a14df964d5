// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-call timeouts and per-tick fault boundaries.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

use crate::error::{CycleError, ErrorCode};

/// Await a collaborator call for at most `limit`.
///
/// Failures are classified as `code`; running out of time is
/// [`ErrorCode::Timeout`].
pub async fn bounded<T, F>(code: ErrorCode, limit: Duration, fut: F) -> Result<T, CycleError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CycleError::new(code, e)),
        Err(_) => Err(CycleError::new(
            ErrorCode::Timeout,
            anyhow::anyhow!("{} call timed out after {limit:?}", code.as_str().to_lowercase()),
        )),
    }
}

/// Run one tick, turning a panic into a logged event.
///
/// Returns `None` when the tick panicked.
pub async fn guarded<F: Future>(cycle: &'static str, fut: F) -> Option<F::Output> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(output) => Some(output),
        Err(payload) => {
            tracing::error!(
                cycle,
                code = %ErrorCode::Panicked,
                panic = %panic_message(payload.as_ref()),
                "cycle panicked; continuing on next tick"
            );
            None
        }
    }
}

/// Log a classified failure at a level matching its class.
pub fn report(cycle: &'static str, error: &CycleError) {
    if error.code.is_transient() {
        tracing::warn!(cycle, code = %error.code, err = %error, "cycle step failed");
    } else {
        tracing::error!(cycle, code = %error.code, err = %error, "cycle step failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_passes_values_through() -> anyhow::Result<()> {
        let value = bounded(ErrorCode::Store, Duration::from_secs(1), async { Ok(7) }).await?;
        assert_eq!(value, 7);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_classifies_failures() {
        let result: Result<(), _> = bounded(ErrorCode::Revoke, Duration::from_secs(1), async {
            anyhow::bail!("connection refused")
        })
        .await;
        let err = result.err();
        assert_eq!(err.as_ref().map(|e| e.code), Some(ErrorCode::Revoke));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_cuts_off_hung_calls() {
        let result: Result<(), _> = bounded(
            ErrorCode::Provision,
            Duration::from_secs(5),
            std::future::pending::<anyhow::Result<()>>(),
        )
        .await;
        let err = result.err();
        assert_eq!(err.as_ref().map(|e| e.code), Some(ErrorCode::Timeout));
        assert!(err.map(|e| e.to_string()).unwrap_or_default().contains("provision call timed out"));
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn guarded_contains_panics() {
        let out = guarded("test", async { panic!("boom") }).await;
        assert!(out.is_none());
        let out: Option<u8> = guarded("test", async { 3 }).await;
        assert_eq!(out, Some(3));
    }

    #[test]
    fn panic_messages_are_extracted() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
