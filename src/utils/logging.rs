//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use anyhow::Result;
use std::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::CaseOutcome;
use crate::workflow::CaseCtx;

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先；否则默认 `info`，详细模式下为 `debug`
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n案例处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - ECO2 案例自动计算");
    info!("📄 配置: {} | 案例: {}", config.profile_path, config.cases_path);
    info!(
        "⏱ 超时: 控件 {:?} / 启动 {:?} / 计算 {:?}",
        config.ui_timeout, config.launch_timeout, config.compute_timeout
    );
    info!("{}", "=".repeat(60));
}

/// 记录案例加载信息
pub fn log_cases_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的案例", total);
    info!("💡 案例将按顺序逐个处理\n");
}

/// 记录案例开始信息
pub fn log_case_start(ctx: &CaseCtx) {
    info!("\n{}", "─".repeat(60));
    info!("{} ▶ 开始处理", ctx);
}

/// 记录案例结果
pub fn log_case_result(ctx: &CaseCtx, outcome: &CaseOutcome) {
    match outcome {
        CaseOutcome::Success { results, .. } => {
            info!("{} ✅ 完成，提取 {} 个结果", ctx, results.len());
        }
        CaseOutcome::Failure(failure) => {
            warn!("{} ❌ 失败: {}", ctx, failure);
        }
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(success: usize, failed: usize, total: usize, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        init_log_file(&path.to_string_lossy()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("案例处理日志"));
    }
}
