//! 失败记录写入服务 - 业务能力层
//!
//! 只负责"把失败案例追加到运行日志"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::models::CaseFailure;

/// 失败记录写入服务
///
/// 职责：
/// - 将失败的案例追加到运行日志，供人工重试
/// - 只处理单个案例的失败
/// - 不关心流程顺序
pub struct FailureWriter {
    log_file_path: String,
}

impl FailureWriter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            log_file_path: path.into(),
        }
    }

    /// 追加一条失败记录
    pub fn write(&self, failure: &CaseFailure) -> Result<()> {
        debug!("写入失败记录: {}", failure);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)?;

        writeln!(file, "FAILED | {}", failure)?;

        Ok(())
    }
}

impl Default for FailureWriter {
    fn default() -> Self {
        Self::with_path("eco2auto.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::CaseRecord;

    #[test]
    fn test_appends_one_line_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "header\n").unwrap();

        let writer = FailureWriter::with_path(path.to_string_lossy());
        let record = CaseRecord::new(1, Some("A2".into()), []);
        writer
            .write(&CaseFailure::new(&record, FailureKind::ComputeTimeout, "超时"))
            .unwrap();
        writer
            .write(&CaseFailure::new(&record, FailureKind::ProcessLost, "进程已退出"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "FAILED | 案例 #2 [A2] | ComputeTimeout | 超时");
    }
}
