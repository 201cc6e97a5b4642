use serde::Serialize;

use crate::models::case::CaseOutcome;

/// 一次运行的汇总报告，交给输出写入方
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 运行被提前终止的原因（进程丢失或取消）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub outcomes: Vec<CaseOutcome>,
}

impl RunReport {
    pub fn new(
        started_at: String,
        finished_at: String,
        outcomes: Vec<CaseOutcome>,
        aborted: Option<String>,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            started_at,
            finished_at,
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            aborted,
            outcomes,
        }
    }
}
