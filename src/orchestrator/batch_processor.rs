//! 运行处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一次运行的资源管理和输入输出。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志头、加载自动化配置和案例
//! 2. **输入校验**：全部案例校验通过后才连接或启动目标程序，有问题一次性报告后终止
//! 3. **顺序处理**：委托 case_processor 逐个处理案例
//! 4. **结果输出**：写 JSON 报告，把失败案例追加到运行日志
//! 5. **收尾**：关闭目标程序，汇总成功和失败数量
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有目标程序会话的模块
//! - **可取消**：持有取消令牌，外部（Ctrl-C）触发后在案例边界停止

use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{attach_or_launch, AppSession, TargetBackend, UiBackend};
use crate::models::{load_cases, load_profile, CaseRecord, Locator, Profile, RunReport};
use crate::orchestrator::case_processor::process_cases;
use crate::services::{FailureWriter, ReportWriter};
use crate::utils::logging;
use crate::workflow::CaseFlow;

/// 应用主结构
pub struct App<B: UiBackend = TargetBackend> {
    config: Config,
    profile: Profile,
    cases: Vec<CaseRecord>,
    session: AppSession<B>,
    cancel: CancellationToken,
}

impl App<TargetBackend> {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        Self::initialize_with(config, attach_or_launch).await
    }
}

impl<B: UiBackend> App<B> {
    /// 初始化应用，由 `connect` 连接或启动目标程序
    ///
    /// 输入全部校验通过后才调用 `connect`
    pub async fn initialize_with<F>(config: Config, connect: F) -> Result<Self>
    where
        F: FnOnce(&Locator, Option<&Path>) -> Result<B>,
    {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        logging::log_startup(&config);

        let profile = load_profile(Path::new(&config.profile_path)).await?;

        // 加载并校验所有案例
        let cases = load_case_file(&config, &profile).await?;
        profile.validate_cases(&cases)?;

        // 连接或启动目标程序
        let backend = connect(&profile.window, config.target_executable.as_deref())
            .context("无法连接目标程序")?;

        Ok(Self {
            config,
            profile,
            cases,
            session: AppSession::new(backend),
            cancel: CancellationToken::new(),
        })
    }

    /// 取消令牌，触发后在下一个等待点或案例边界停止
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&mut self) -> Result<RunReport> {
        let started_at = now();

        if self.cases.is_empty() {
            warn!("⚠️ 没有找到待处理的案例");
        } else {
            logging::log_cases_loaded(self.cases.len());
        }

        // 处理所有案例
        let processed = process_cases(
            &mut self.session,
            &self.profile,
            self.config.timing(),
            &self.cases,
            self.config.restart_every,
            &self.cancel,
        )
        .await;

        let report = RunReport::new(
            started_at,
            now(),
            processed.outcomes,
            processed.aborted.map(|kind| kind.to_string()),
        );

        // 输出报告和失败记录
        ReportWriter::new(&self.config.report_path)
            .write(&report)
            .await?;
        self.write_failures(&report)?;

        // 关闭目标程序
        if self.config.close_on_finish {
            self.close_target().await;
        }

        logging::print_final_stats(
            report.succeeded,
            report.failed,
            report.total,
            &self.config.output_log_file,
        );

        Ok(report)
    }

    async fn close_target(&mut self) {
        if self.cancel.is_cancelled() {
            warn!("⏹ 运行已取消，目标程序保持打开");
            return;
        }
        if !self.session.is_process_alive() {
            return;
        }
        info!("🛑 正在关闭目标程序...");
        let flow = CaseFlow::new(&self.profile, self.config.timing());
        if let Err(e) = flow.close(&mut self.session, &self.cancel).await {
            error!("❌ 关闭目标程序失败: {}", e);
        }
    }

    fn write_failures(&self, report: &RunReport) -> Result<()> {
        let writer = FailureWriter::with_path(self.config.output_log_file.clone());
        for failure in report.outcomes.iter().filter_map(|o| o.failure()) {
            writer
                .write(failure)
                .with_context(|| format!("写入失败记录失败: {}", self.config.output_log_file))?;
        }
        Ok(())
    }
}

/// 加载案例
async fn load_case_file(config: &Config, profile: &Profile) -> Result<Vec<CaseRecord>> {
    info!("\n📁 正在加载案例: {}", config.cases_path);
    load_cases(Path::new(&config.cases_path), &profile.label_field).await
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
