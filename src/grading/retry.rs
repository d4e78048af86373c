use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::error::AppError;

/// 有上限的顺序重试，每次尝试单独计时
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// 两次尝试之间的等待时间，为0时立即重试
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// 依次执行`operation`直到成功，超时也计为一次失败
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let outcome = match time::timeout(self.attempt_timeout, operation(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::Timeout(self.attempt_timeout)),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::error!("第{}/{}次尝试失败: {}", attempt, max_attempts, e);
                    if attempt < max_attempts && !self.retry_delay.is_zero() {
                        time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(AppError::GradingUnavailable {
            attempts: max_attempts,
        })
    }
}
