use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::FailureKind;
use crate::models::value::FieldValue;

/// 结果记录：输出字段 → 提取到的值
pub type ResultRecord = BTreeMap<String, FieldValue>;

/// 案例记录
///
/// 输入序列中的一条数据，创建后不可修改
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    index: usize,
    label: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl CaseRecord {
    pub fn new(
        index: usize,
        label: Option<String>,
        fields: impl IntoIterator<Item = (String, FieldValue)>,
    ) -> Self {
        Self {
            index,
            label,
            fields: fields.into_iter().collect(),
        }
    }

    /// 在输入序列中的位置（从 0 开始）
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 日志和诊断里使用的名字：有标签用标签，否则用序号
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("#{}", self.index + 1),
        }
    }
}

/// 案例失败信息，包含人工重试所需的全部信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseFailure {
    pub index: usize,
    pub label: Option<String>,
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl CaseFailure {
    pub fn new(record: &CaseRecord, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            index: record.index(),
            label: record.label().map(str::to_string),
            kind,
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "案例 #{}", self.index + 1)?;
        if let Some(label) = &self.label {
            write!(f, " [{}]", label)?;
        }
        write!(f, " | {}", self.kind)?;
        if let Some(field) = &self.field {
            write!(f, " | 字段 {}", field)?;
        }
        write!(f, " | {}", self.message)
    }
}

/// 案例处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Success {
        index: usize,
        label: Option<String>,
        results: ResultRecord,
    },
    Failure(CaseFailure),
}

impl CaseOutcome {
    pub fn success(record: &CaseRecord, results: ResultRecord) -> Self {
        CaseOutcome::Success {
            index: record.index(),
            label: record.label().map(str::to_string),
            results,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            CaseOutcome::Success { index, .. } => *index,
            CaseOutcome::Failure(f) => f.index,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            CaseOutcome::Success { label, .. } => label.as_deref(),
            CaseOutcome::Failure(f) => f.label.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaseOutcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&CaseFailure> {
        match self {
            CaseOutcome::Failure(f) => Some(f),
            CaseOutcome::Success { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }

    pub fn results(&self) -> Option<&ResultRecord> {
        match self {
            CaseOutcome::Success { results, .. } => Some(results),
            CaseOutcome::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_carries_retry_info() {
        let record = CaseRecord::new(
            1,
            Some("A2".to_string()),
            [("width".to_string(), FieldValue::Text("bad".into()))],
        );
        let failure = CaseFailure::new(&record, FailureKind::FieldWriteFailure, "类型不匹配")
            .with_field("width");
        assert_eq!(
            failure.to_string(),
            "案例 #2 [A2] | FieldWriteFailure | 字段 width | 类型不匹配"
        );
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let record = CaseRecord::new(0, Some("A1".into()), []);
        let outcome = CaseOutcome::success(
            &record,
            [("area".to_string(), FieldValue::Number(32.0))].into(),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["results"]["area"], 32.0);
    }
}
