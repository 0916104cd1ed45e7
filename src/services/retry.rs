//! 重试控制器 - 业务能力层
//!
//! 对任意异步操作做有限次重试，不关心被重试的是什么

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetrySettings;
use crate::error::Retryable;

/// 计算第 `attempt` 次失败后（从 1 开始）的等待时间
pub trait DelayPolicy: Send + Sync {
    fn delay_after(&self, attempt: u32) -> Duration;
}

/// 固定间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantDelay(pub Duration);

impl DelayPolicy for ConstantDelay {
    fn delay_after(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// 指数退避，`base * factor^(attempt-1)`，不超过 `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl DelayPolicy for ExponentialBackoff {
    fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exp);
        // 负数或 NaN 无法换算成时长，退回上限
        Duration::try_from_secs_f64(scaled.min(self.max.as_secs_f64())).unwrap_or(self.max)
    }
}

impl<F> DelayPolicy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay_after(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// 重试控制器
pub struct RetryController<P = ConstantDelay> {
    max_attempts: u32,
    policy: P,
}

impl RetryController<ConstantDelay> {
    /// 按配置创建固定间隔的控制器
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, ConstantDelay(settings.backoff_base))
    }
}

impl<P: DelayPolicy> RetryController<P> {
    pub fn new(max_attempts: u32, policy: P) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            policy,
        }
    }

    /// 执行操作，成功立即返回
    ///
    /// 可重试的错误会在等待后重新执行，直到用尽次数，返回最后一次的错误；
    /// 不可重试的错误直接返回
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} 在第 {} 次尝试时成功", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!("{} 失败 (不可重试): {}", label, e);
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        "{} 失败 ({}/{}): {}，已用尽重试次数",
                        label, attempt, self.max_attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        "{} 失败 ({}/{}): {}，{} ms 后重试...",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn controller(max_attempts: u32) -> RetryController {
        RetryController::new(max_attempts, ConstantDelay(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_success_after_k_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let retry = controller(4);

        let result = retry
            .run("导航", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    Err(AppError::navigation_failed("https://example.com", "timeout"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_always_failing_returns_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let retry = controller(3);

        let result: Result<(), AppError> = retry
            .run("上传", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(AppError::upload_failed(Some(500), format!("attempt {}", n)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AppError::Storage(StorageError::UploadFailed { body, .. })) => {
                assert_eq!(body, "attempt 3")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_success_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let retry = controller(5);

        let result: Result<&str, AppError> = retry
            .run("noop", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("done")
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let retry = controller(5);

        let result: Result<(), AppError> = retry
            .run("检查存储", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::backend_unavailable("bucket", "401"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_delay_policy_is_consulted() {
        let seen = std::sync::Mutex::new(Vec::new());
        let policy = |attempt: u32| {
            seen.lock().unwrap().push(attempt);
            Duration::from_millis(1)
        };
        let retry = RetryController::new(3, policy);

        let _: Result<(), AppError> = retry
            .run("导航", || async { Err(AppError::navigation_failed("u", "r")) })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = ExponentialBackoff {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff_odd_factors_fall_back_to_max() {
        let max = Duration::from_secs(2);
        let negative = ExponentialBackoff {
            base: Duration::from_millis(100),
            factor: -2.0,
            max,
        };
        assert_eq!(negative.delay_after(2), max);

        let huge = ExponentialBackoff {
            base: Duration::from_secs(1),
            factor: f64::MAX,
            max,
        };
        assert_eq!(huge.delay_after(u32::MAX), max);

        let nan = ExponentialBackoff {
            base: Duration::from_millis(100),
            factor: f64::NAN,
            max,
        };
        assert_eq!(nan.delay_after(3), max);
    }
}
