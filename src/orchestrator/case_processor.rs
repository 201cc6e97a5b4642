//! 案例序列处理器 - 编排层
//!
//! ## 职责
//!
//! 按输入顺序逐个处理案例，保证每个案例恰好产生一个结果。
//!
//! ## 核心功能
//!
//! 1. **顺序处理**：一次只处理一个案例，目标程序同一时刻只服务一个案例
//! 2. **边界检查**：每个案例开始前先检查取消，再检查目标进程是否存活
//! 3. **重新同步**：上一个案例要求时，先强制重新同步界面；同步失败则本案例不处理
//! 4. **提前终止**：进程丢失或取消后，剩余案例直接标记失败，不再访问界面
//! 5. **计划重启**：每处理 N 个案例显式关闭并重新启动目标程序

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Timing;
use crate::error::{FailureKind, UiError};
use crate::infrastructure::{AppSession, UiBackend};
use crate::models::{CaseFailure, CaseOutcome, CaseRecord, Profile};
use crate::utils::logging;
use crate::workflow::{CaseCtx, CaseFlow};

/// 一次案例序列处理的结果
#[derive(Debug)]
pub struct ProcessedCases {
    /// 与输入一一对应、顺序一致
    pub outcomes: Vec<CaseOutcome>,
    /// 提前终止的原因
    pub aborted: Option<FailureKind>,
}

/// 处理全部案例
///
/// # 参数
/// - `session`: 目标程序会话（唯一资源）
/// - `profile`: 自动化配置
/// - `timing`: 各阶段等待策略
/// - `cases`: 已校验的案例
/// - `restart_every`: 每处理多少个案例重启一次目标程序，0 表示不重启
/// - `cancel`: 取消令牌
pub async fn process_cases<B: UiBackend>(
    session: &mut AppSession<B>,
    profile: &Profile,
    timing: Timing,
    cases: &[CaseRecord],
    restart_every: usize,
    cancel: &CancellationToken,
) -> ProcessedCases {
    let flow = CaseFlow::new(profile, timing);
    let total = cases.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut aborted = None;
    let mut handled = 0;

    for (position, record) in cases.iter().enumerate() {
        let ctx = CaseCtx::new(record, total);

        if let Some(kind) = aborted {
            outcomes.push(abandoned(record, kind));
            continue;
        }

        // ========== 案例边界检查 ==========
        if cancel.is_cancelled() {
            warn!("{} ⏹ 运行已取消，剩余案例不再处理", ctx);
            aborted = Some(FailureKind::Cancelled);
            outcomes.push(abandoned(record, FailureKind::Cancelled));
            continue;
        }
        if !session.is_process_alive() {
            error!("{} ❌ 目标进程已退出，剩余案例不再处理", ctx);
            aborted = Some(FailureKind::ProcessLost);
            outcomes.push(abandoned(record, FailureKind::ProcessLost));
            continue;
        }

        logging::log_case_start(&ctx);
        let mut outcome = match resync_if_needed(&flow, session, &ctx, cancel).await {
            Ok(()) => flow.run(session, record, &ctx, cancel).await,
            Err(e) => {
                // 界面状态未知，不在上面写入本案例
                session.mark_resync();
                let kind = match e {
                    UiError::Cancelled => FailureKind::Cancelled,
                    _ => FailureKind::LaunchFailure,
                };
                CaseOutcome::Failure(CaseFailure::new(
                    record,
                    kind,
                    format!("界面重新同步失败: {}", e),
                ))
            }
        };
        handled += 1;

        // ========== 失败原因归类 ==========
        if let CaseOutcome::Failure(failure) = &mut outcome {
            if failure.kind == FailureKind::Cancelled || cancel.is_cancelled() {
                aborted = Some(FailureKind::Cancelled);
            } else if !session.is_process_alive() {
                failure.message = format!("目标进程已退出 ({})", failure.message);
                failure.kind = FailureKind::ProcessLost;
                aborted = Some(FailureKind::ProcessLost);
            }
        }

        logging::log_case_result(&ctx, &outcome);
        outcomes.push(outcome);

        // ========== 计划重启 ==========
        let more_to_come = position + 1 < total;
        if restart_every > 0 && handled % restart_every == 0 && more_to_come && aborted.is_none()
        {
            info!("🔄 已处理 {} 个案例，按计划重启目标程序", handled);
            if let Err(e) = flow.restart(session, cancel).await {
                error!("❌ 重启目标程序失败: {}", e);
            }
        }
    }

    ProcessedCases { outcomes, aborted }
}

async fn resync_if_needed<B: UiBackend>(
    flow: &CaseFlow<'_>,
    session: &mut AppSession<B>,
    ctx: &CaseCtx,
    cancel: &CancellationToken,
) -> Result<(), UiError> {
    if !session.needs_resync() {
        return Ok(());
    }
    warn!("{} 🔄 上一案例未能正常重置，重新同步界面", ctx);
    flow.resync(session, cancel).await.map_err(|e| {
        error!("{} ❌ 重新同步失败，本案例不处理: {}", ctx, e);
        e
    })
}

fn abandoned(record: &CaseRecord, kind: FailureKind) -> CaseOutcome {
    let message = match kind {
        FailureKind::ProcessLost => "目标进程已退出，案例未处理",
        FailureKind::Cancelled => "运行已取消，案例未处理",
        _ => "案例未处理",
    };
    CaseOutcome::Failure(CaseFailure::new(record, kind, message))
}
