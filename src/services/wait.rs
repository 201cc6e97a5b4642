//! 有截止时间的轮询等待
//!
//! 所有等待都必须在截止时间内结束，并且可以被取消

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::UiError;

/// 等待策略：总超时 + 轮询间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(250))
    }
}

/// 单次尝试的结果
#[derive(Debug)]
pub enum Attempt<T> {
    /// 条件满足
    Ready(T),
    /// 暂不满足，稍后重试；附带最近一次的瞬时错误
    Retry(Option<UiError>),
    /// 不可恢复，立即结束等待
    Fail(UiError),
}

/// 等待失败
#[derive(Debug)]
pub enum WaitError {
    /// 截止时间已到
    Expired {
        last: Option<UiError>,
        waited: Duration,
    },
    /// 尝试返回了不可恢复的错误，或等待被取消
    Failed(UiError),
}

/// 反复执行 `attempt` 直到就绪、失败、取消或超时
///
/// 截止时间到达时最后再尝试一次，所以超时错误不会早于 `policy.timeout` 返回
pub async fn poll_until<T, F>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Attempt<T>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last = None;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Failed(UiError::Cancelled));
        }

        match attempt() {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Fail(err) => return Err(WaitError::Failed(err)),
            Attempt::Retry(err) => {
                if err.is_some() {
                    last = err;
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Expired {
                last,
                waited: now - started,
            });
        }

        let nap = policy.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Failed(UiError::Cancelled)),
            _ = sleep(nap) => {}
        }
    }
}
