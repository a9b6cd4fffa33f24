use std::time::Duration;

use ck_domain::error::{Error, Result};

/// Retry a fallible operation up to `max_attempts` times with exponential
/// back-off (100ms * 2^attempt), retrying only on `DependencyFailure` —
/// sqlite write contention (`SQLITE_BUSY`) surfaces as that variant.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(Error::DependencyFailure(msg)) if attempt < max_attempts => {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
                tracing::warn!(attempt, %msg, "retrying dependency failure");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(3, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::DependencyFailure("busy".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<()> =
            with_retry(2, || async { Err(Error::DependencyFailure("busy".into())) }).await;
        assert!(result.is_err());
    }
}
