//! 案例处理流程 - 流程层
//!
//! 核心职责：定义"一个案例"的完整处理流程
//!
//! 流程顺序：
//! 1. 打开录入界面 → 写入字段 → 点击计算
//! 2. 等待完成标志 → 读取结果
//! 3. 重置界面（失败时标记下一案例前重新同步）
//!
//! 任一步骤失败都会终止本案例，并尽力恢复界面后释放会话
//!
//! 另外提供显式的关闭和重启操作，由编排层在运行结束或按计划重启时调用

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Timing;
use crate::error::{FailureKind, UiError, UiResult};
use crate::infrastructure::{AppSession, UiBackend};
use crate::models::{
    CaseFailure, CaseOutcome, CaseRecord, ControlPath, DialogRule, ElementKind, FieldBinding,
    FieldValue, Profile, ResultRecord, StatePredicate,
};
use crate::services::{ControlDriver, WindowLocator};
use crate::workflow::case_ctx::CaseCtx;

/// 案例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Idle,
    Opened,
    Populated,
    Computing,
    Completed,
    Extracted,
    Closed,
    Errored(FailureKind),
}

/// 案例处理流程
///
/// - 按固定顺序推进案例状态，不重试任何一步
/// - 重试只发生在定位器和控件驱动各自的等待预算内
/// - 不持有会话，只借用
pub struct CaseFlow<'p> {
    profile: &'p Profile,
    timing: Timing,
    locator: WindowLocator,
    driver: ControlDriver,
}

impl<'p> CaseFlow<'p> {
    pub fn new(profile: &'p Profile, timing: Timing) -> Self {
        Self {
            profile,
            timing,
            locator: WindowLocator::new(timing.ui),
            driver: ControlDriver::new(timing.ui),
        }
    }

    /// 处理一个案例，总是返回一个结果并释放会话
    pub async fn run<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        record: &CaseRecord,
        ctx: &CaseCtx,
        cancel: &CancellationToken,
    ) -> CaseOutcome {
        let mut state = CaseState::Idle;

        let outcome = match self.drive(session, record, ctx, &mut state, cancel).await {
            Ok(results) => CaseOutcome::success(record, results),
            Err(failure) => {
                transition(ctx, &mut state, CaseState::Errored(failure.kind));
                if cancel.is_cancelled() || failure.kind == FailureKind::Cancelled {
                    debug!("{} 运行已取消，跳过恢复", ctx);
                } else if !session.is_process_alive() {
                    debug!("{} 目标进程已退出，跳过恢复", ctx);
                } else {
                    self.recover(session, ctx, cancel).await;
                }
                CaseOutcome::Failure(failure)
            }
        };

        session.release();
        outcome
    }

    async fn drive<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        record: &CaseRecord,
        ctx: &CaseCtx,
        state: &mut CaseState,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, CaseFailure> {
        // ========== 1. 打开录入界面 ==========
        self.open(session, cancel)
            .await
            .map_err(|e| fail(record, FailureKind::LaunchFailure, e))?;
        transition(ctx, state, CaseState::Opened);

        // ========== 2. 写入字段 ==========
        for binding in &self.profile.fields {
            let Some(value) = record.get(&binding.field) else {
                continue;
            };
            debug!("{} 写入 {} = {}", ctx, binding.field, value);
            self.write_field(session, binding, value, cancel)
                .await
                .map_err(|e| {
                    fail(record, FailureKind::FieldWriteFailure, e).with_field(&binding.field)
                })?;
        }
        transition(ctx, state, CaseState::Populated);

        // ========== 3. 点击计算 ==========
        for target in &self.profile.compute {
            self.click(session, target, cancel)
                .await
                .map_err(|e| fail(record, FailureKind::ComputeFailure, e))?;
        }
        transition(ctx, state, CaseState::Computing);

        // ========== 4. 等待完成 ==========
        self.await_completion(session, cancel)
            .await
            .map_err(|e| fail(record, FailureKind::ComputeTimeout, e))?;
        self.dismiss_dialogs(session, cancel).await;
        transition(ctx, state, CaseState::Completed);

        // ========== 5. 读取结果 ==========
        let mut results = ResultRecord::new();
        for output in &self.profile.outputs {
            let value = self
                .read(session, &output.target, cancel)
                .await
                .map_err(|e| {
                    fail(record, FailureKind::ExtractFailure, e).with_field(&output.field)
                })?;
            results.insert(output.field.clone(), value);
        }
        transition(ctx, state, CaseState::Extracted);

        // ========== 6. 重置界面 ==========
        if let Err(e) = self.reset(session, cancel).await {
            warn!("{} ⚠️ 重置界面失败，下一案例前将重新同步: {}", ctx, e);
            session.mark_resync();
        }
        transition(ctx, state, CaseState::Closed);

        Ok(results)
    }

    /// 绑定主窗口并执行打开序列
    async fn open<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let window = self
            .locator
            .locate_window(session, &self.profile.window, self.timing.launch, cancel)
            .await?;
        session.bind_base_window(window);

        self.dismiss_dialogs(session, cancel).await;
        for target in &self.profile.open {
            self.click(session, target, cancel).await?;
        }
        self.dismiss_dialogs(session, cancel).await;
        Ok(())
    }

    async fn write_field<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        binding: &FieldBinding,
        value: &FieldValue,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let handle = self.locator.locate(session, &binding.target, cancel).await?;
        self.driver.set_value(session, &handle, value, cancel).await
    }

    async fn click<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        target: &ControlPath,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let handle = self.locator.locate(session, target, cancel).await?;
        self.driver.click(session, &handle, cancel).await
    }

    async fn read<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        target: &ControlPath,
        cancel: &CancellationToken,
    ) -> UiResult<FieldValue> {
        let handle = self.locator.locate(session, target, cancel).await?;
        self.driver.read_value(session, &handle, cancel).await
    }

    /// 在计算超时内等待完成标志
    async fn await_completion<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let signal = &self.profile.completion;
        let policy = self.timing.compute;
        let started = Instant::now();

        let handle = if signal.state == StatePredicate::Hidden {
            // 进度指示已经消失即视为完成
            match self.locator.probe(session, &signal.target)? {
                Some(handle) => handle,
                None => return Ok(()),
            }
        } else {
            self.locator
                .locate_within(session, &signal.target, policy, cancel)
                .await?
        };

        let remaining = policy.timeout.saturating_sub(started.elapsed());
        self.driver
            .wait_for_state(
                session,
                &handle,
                &signal.state,
                policy.with_timeout(remaining),
                cancel,
            )
            .await
    }

    /// 关闭界面上出现的已知对话框，不等待
    async fn dismiss_dialogs<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> usize {
        self.dismiss_matching(session, &self.profile.dialogs, cancel)
            .await
    }

    async fn dismiss_matching<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        rules: &[DialogRule],
        cancel: &CancellationToken,
    ) -> usize {
        let mut dismissed = 0;
        for rule in rules {
            let handle = match self.locator.probe(session, &rule.button_path()) {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => {
                    debug!("探测对话框 {} 失败: {}", rule.display_name(), e);
                    continue;
                }
            };
            match self.driver.click(session, &handle, cancel).await {
                Ok(()) => {
                    info!("💬 已关闭对话框: {}", rule.display_name());
                    dismissed += 1;
                }
                Err(e) => warn!("关闭对话框 {} 失败: {}", rule.display_name(), e),
            }
        }
        dismissed
    }

    /// 执行重置序列，并把输入字段恢复为基准值
    async fn reset<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        for target in &self.profile.reset {
            self.click(session, target, cancel).await?;
        }
        if !self.profile.clear_on_reset {
            return Ok(());
        }
        for binding in &self.profile.fields {
            let handle = self.locator.locate(session, &binding.target, cancel).await?;
            match &binding.default {
                Some(value) => self.driver.set_value(session, &handle, value, cancel).await?,
                // 必填下拉框每个案例都会重新写入
                None if binding.required && handle.kind() == ElementKind::ComboBox => {}
                None => self.driver.clear(session, &handle, cancel).await?,
            }
        }
        Ok(())
    }

    /// 失败后的尽力恢复：关闭对话框并重置界面
    async fn recover<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        ctx: &CaseCtx,
        cancel: &CancellationToken,
    ) {
        debug!("{} 开始恢复界面", ctx);
        self.dismiss_dialogs(session, cancel).await;
        if session.base_window().is_none() {
            session.mark_resync();
            return;
        }
        if let Err(e) = self.reset(session, cancel).await {
            warn!("{} ⚠️ 恢复界面失败，下一案例前将重新同步: {}", ctx, e);
            session.mark_resync();
        }
    }

    /// 强制重新同步：重新绑定主窗口、关闭对话框、重置界面
    pub async fn resync<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        session.clear_resync();
        let result = match self.open(session, cancel).await {
            Ok(()) => self.reset(session, cancel).await,
            Err(e) => Err(e),
        };
        session.release();
        result
    }

    /// 关闭目标程序，处理退出确认对话框，直到进程退出
    pub async fn close<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let result = self.shut_down(session, cancel).await;
        session.release();
        result
    }

    /// 显式重启：关闭后重新启动，主窗口由下一个案例在启动超时内等待
    pub async fn restart<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        self.close(session, cancel).await?;
        session.backend_mut().relaunch()?;
        info!("🔄 目标程序已重新启动");
        Ok(())
    }

    async fn shut_down<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        if !session.is_process_alive() {
            debug!("目标程序已退出，无需关闭");
            return Ok(());
        }

        let main = ControlPath::in_window(self.profile.window.clone(), Vec::new());
        let window = self
            .locator
            .locate_within(session, &main, self.timing.ui, cancel)
            .await?;
        session.bind_base_window(window.element());
        self.dismiss_dialogs(session, cancel).await;
        self.driver.close_window(session, &window, cancel).await?;

        let policy = self.timing.launch;
        let started = Instant::now();
        loop {
            if !session.is_process_alive() {
                info!("🛑 目标程序已关闭");
                return Ok(());
            }
            self.dismiss_matching(session, &self.profile.close_dialogs, cancel)
                .await;
            self.dismiss_dialogs(session, cancel).await;

            let waited = started.elapsed();
            if waited >= policy.timeout {
                return Err(UiError::Timeout {
                    control: window.to_string(),
                    condition: "进程退出".to_string(),
                    waited,
                });
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(UiError::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }
}

fn transition(ctx: &CaseCtx, state: &mut CaseState, next: CaseState) {
    debug!("{} 状态 {:?} → {:?}", ctx, state, next);
    *state = next;
}

fn fail(record: &CaseRecord, kind: FailureKind, err: UiError) -> CaseFailure {
    let kind = match err {
        UiError::Cancelled => FailureKind::Cancelled,
        _ => kind,
    };
    CaseFailure::new(record, kind, err.to_string())
}
