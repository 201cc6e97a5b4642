use std::path::PathBuf;
use std::time::Duration;

use crate::services::WaitPolicy;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 自动化配置（界面结构）文件
    pub profile_path: String,
    /// 案例文件
    pub cases_path: String,
    /// JSON 报告输出路径
    pub report_path: String,
    /// 运行日志文件，失败案例追加在末尾
    pub output_log_file: String,
    /// 目标程序路径，为空时在默认安装位置查找
    pub target_executable: Option<PathBuf>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 每处理多少个案例重启一次目标程序，0 表示不重启
    pub restart_every: usize,
    /// 运行结束后关闭目标程序
    pub close_on_finish: bool,
    // --- 等待预算 ---
    pub ui_timeout: Duration,
    pub poll_interval: Duration,
    pub launch_timeout: Duration,
    pub compute_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile_path: "profile.toml".to_string(),
            cases_path: "cases.toml".to_string(),
            report_path: "report.json".to_string(),
            output_log_file: "eco2auto.log".to_string(),
            target_executable: None,
            verbose_logging: false,
            restart_every: 0,
            close_on_finish: true,
            ui_timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(250),
            launch_timeout: Duration::from_millis(30_000),
            compute_timeout: Duration::from_millis(300_000),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            profile_path: std::env::var("PROFILE_PATH").unwrap_or(default.profile_path),
            cases_path: std::env::var("CASES_PATH").unwrap_or(default.cases_path),
            report_path: std::env::var("REPORT_PATH").unwrap_or(default.report_path),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            target_executable: std::env::var("TARGET_EXECUTABLE").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            restart_every: std::env::var("RESTART_EVERY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.restart_every),
            close_on_finish: std::env::var("CLOSE_ON_FINISH").ok().and_then(|v| v.parse().ok()).unwrap_or(default.close_on_finish),
            ui_timeout: env_millis("UI_TIMEOUT_MS").unwrap_or(default.ui_timeout),
            poll_interval: env_millis("POLL_INTERVAL_MS").unwrap_or(default.poll_interval),
            launch_timeout: env_millis("LAUNCH_TIMEOUT_MS").unwrap_or(default.launch_timeout),
            compute_timeout: env_millis("COMPUTE_TIMEOUT_MS").unwrap_or(default.compute_timeout),
        }
    }

    pub fn timing(&self) -> Timing {
        let ui = WaitPolicy::new(self.ui_timeout, self.poll_interval);
        Timing {
            ui,
            launch: ui.with_timeout(self.launch_timeout),
            compute: ui.with_timeout(self.compute_timeout),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).map(Duration::from_millis)
}

/// 各阶段的等待策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// 普通控件定位和操作
    pub ui: WaitPolicy,
    /// 等待案例录入主窗口出现
    pub launch: WaitPolicy,
    /// 等待计算完成
    pub compute: WaitPolicy,
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = Timing::default();
        assert_eq!(timing.ui.timeout, Duration::from_secs(10));
        assert_eq!(timing.ui.interval, Duration::from_millis(250));
        assert_eq!(timing.launch.timeout, Duration::from_secs(30));
        assert_eq!(timing.compute.timeout, Duration::from_secs(300));
        assert_eq!(timing.compute.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_default_run_schedule() {
        let config = Config::default();
        assert_eq!(config.restart_every, 0);
        assert!(config.close_on_finish);
    }
}
