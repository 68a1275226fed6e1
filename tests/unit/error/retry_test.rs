// Retry logic tests

use cdcstream::error::retry::*;
use cdcstream::error::CdcStreamError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(test)]
mod retry_tests {
    use super::*;

    fn fast_config(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.multiplier, 2.0);
        assert!(config.jitter);
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let counter = attempt_count.clone();

        let result = with_retry(&fast_config(3), "test_operation", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CdcStreamError>("Success".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_with_eventual_success() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let counter = attempt_count.clone();

        let result = with_retry(&fast_config(3), "login", || {
            let counter = counter.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if count < 3 {
                    Err(CdcStreamError::Transport("unavailable".to_string()))
                } else {
                    Ok(count)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let counter = attempt_count.clone();

        let result = with_retry(&fast_config(2), "login", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CdcStreamError::Authentication("expired".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(CdcStreamError::Authentication(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_decode_errors_are_not_retried() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let counter = attempt_count.clone();

        let result = with_retry(&fast_config(3), "decode", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CdcStreamError::BitmapFormat("0xZZ".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_classification() {
        use std::io::{Error, ErrorKind};

        assert!(CdcStreamError::Io(Error::new(ErrorKind::ConnectionReset, "reset")).is_retryable());
        assert!(!CdcStreamError::Io(Error::new(ErrorKind::NotFound, "missing")).is_retryable());
        assert!(CdcStreamError::Transport("down".to_string()).is_retryable());
        assert!(!CdcStreamError::ReplayTokenFormat(3).is_retryable());
        assert!(!CdcStreamError::Config("bad".to_string()).is_retryable());
    }
}
