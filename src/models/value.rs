//! 字段值
//!
//! 表格单元格里读出来的松散类型值，在加载边界统一规整为数字、文本、布尔三种

use std::fmt;

use serde::{Deserialize, Serialize};

/// 案例字段或结果字段的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// 字段绑定声明的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Number,
    Text,
    Bool,
    /// 下拉框选项，值必须是文本
    Choice,
}

impl FieldValue {
    /// 从 TOML 值规整，不支持数组和表
    pub fn from_toml(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::Integer(i) => Ok(FieldValue::Number(*i as f64)),
            toml::Value::Float(f) => Ok(FieldValue::Number(*f)),
            toml::Value::Boolean(b) => Ok(FieldValue::Bool(*b)),
            toml::Value::String(s) => Ok(FieldValue::Text(s.trim().to_string())),
            toml::Value::Datetime(d) => Ok(FieldValue::Text(d.to_string())),
            toml::Value::Array(_) => Err("不支持数组".to_string()),
            toml::Value::Table(_) => Err("不支持嵌套表".to_string()),
        }
    }

    /// 把控件上显示的文本规整为值：能解析成数字的按数字处理
    pub fn from_display(text: &str) -> Self {
        let trimmed = text.trim();
        match parse_number(trimmed) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::Text(trimmed.to_string()),
        }
    }

    /// 值的类型名（用于诊断信息）
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
        }
    }

    /// 写入文本框时使用的文本
    pub fn to_input_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }

    /// 作为数字解释（文本可解析时也算）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => parse_number(s.trim()),
            FieldValue::Bool(_) => None,
        }
    }

    /// 是否与声明的类型兼容
    pub fn fits(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Number => self.as_number().is_some(),
            ValueKind::Text => !matches!(self, FieldValue::Bool(_)),
            ValueKind::Bool => matches!(self, FieldValue::Bool(_)),
            ValueKind::Choice => matches!(self, FieldValue::Text(_) | FieldValue::Number(_)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_input_text())
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Text => "text",
            ValueKind::Bool => "bool",
            ValueKind::Choice => "choice",
        };
        f.write_str(name)
    }
}

/// 解析数字，允许千分位逗号
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
