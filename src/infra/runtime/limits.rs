use std::time::Duration;

use reqwest::header::HeaderMap;

/// Build a reqwest client with a short connect timeout and the given overall request timeout.
pub fn make_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    make_http_client_with_headers(timeout, HeaderMap::new())
}

/// Same limits, plus headers sent on every request.
pub fn make_http_client_with_headers(timeout: Duration, headers: HeaderMap) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2).min(timeout))
        .timeout(timeout)
        .default_headers(headers)
        .build()
}

/// Exponential backoff for async ops (50ms doubling, capped at 1s). Gives up
/// at once on errors `is_retryable` rejects.
pub async fn retry_async_if<T, E, Fut, F, R>(mut attempts: u32, is_retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut try_num: u32 = 0;
    let mut delay_ms: u64 = 50;
    loop {
        match op(try_num).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempts == 0 || !is_retryable(&e) {
                    return Err(e);
                }
                attempts -= 1;
                tracing::debug!(attempt = try_num + 1, delay_ms, "retrying after transient failure");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(1_000);
                try_num += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn it_retries_then_succeeds() {
        let mut calls = 0;
        let res: Result<i32, i32> = retry_async_if(3, |_| true, move |_| {
            calls += 1;
            let c = calls;
            async move {
                if c < 3 {
                    Err(-1)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 42);
    }

    #[tokio::test]
    async fn it_stops_on_permanent_errors() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = retry_async_if(5, |e| *e == "transient", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("permanent") }
        })
        .await;
        assert_eq!(res, Err("permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn it_gives_up_after_the_budget() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = retry_async_if(2, |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("transient") }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn builds_client_with_timeout() {
        assert!(make_http_client(Duration::from_secs(30)).is_ok());
    }
}
