//! 案例处理上下文
//!
//! 封装"我正在处理第几个案例"这一信息

use std::fmt::Display;

use crate::models::CaseRecord;

/// 案例处理上下文
#[derive(Debug, Clone)]
pub struct CaseCtx {
    /// 案例序号（从1开始，仅用于日志显示）
    pub case_number: usize,

    /// 案例总数
    pub total: usize,

    /// 案例标签或序号
    pub name: String,
}

impl CaseCtx {
    pub fn new(record: &CaseRecord, total: usize) -> Self {
        Self {
            case_number: record.index() + 1,
            total,
            name: record.display_name(),
        }
    }
}

impl Display for CaseCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[案例 {}/{} {}]", self.case_number, self.total, self.name)
    }
}
