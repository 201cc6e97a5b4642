//! 报告写入服务 - 业务能力层
//!
//! 只负责"写报告文件"能力

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::models::RunReport;

/// 报告写入服务
///
/// 把一次运行的全部结果写成 JSON 报告
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, report: &RunReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report).context("序列化报告失败")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("写入报告失败: {}", self.path.display()))?;
        info!("📄 报告已写入: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::{CaseFailure, CaseOutcome, CaseRecord, FieldValue};

    #[tokio::test]
    async fn test_write_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let ok = CaseRecord::new(0, Some("A1".into()), []);
        let bad = CaseRecord::new(1, Some("A2".into()), []);
        let outcomes = vec![
            CaseOutcome::success(&ok, [("area".to_string(), FieldValue::Number(32.0))].into()),
            CaseOutcome::Failure(
                CaseFailure::new(&bad, FailureKind::FieldWriteFailure, "类型不匹配")
                    .with_field("width"),
            ),
        ];
        let report = RunReport::new("start".into(), "end".into(), outcomes, None);

        ReportWriter::new(&path).write(&report).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["outcomes"][1]["kind"], "FieldWriteFailure");
        assert_eq!(json["outcomes"][1]["field"], "width");
        assert!(json.get("aborted").is_none());
    }
}
