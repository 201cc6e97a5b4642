use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UI 层错误
///
/// 由定位器和控件驱动产生，要么在各自的超时预算内重试，要么上报给案例状态机
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UiError {
    /// 超时内未找到匹配的窗口或控件
    #[error("未找到控件: {locator}")]
    NotFound { locator: String },

    /// 匹配到多个控件且未指定序号
    #[error("匹配到 {count} 个控件，需要指定 index: {locator}")]
    Ambiguous { locator: String, count: usize },

    /// 控件所属窗口已关闭或会话已重置
    #[error("控件句柄已失效: {control}")]
    StaleHandle { control: String },

    /// 值的形态与控件类型不符
    #[error("值类型不匹配 ({control}): 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        control: String,
        expected: String,
        actual: String,
    },

    /// 控件在等待后仍不可用（禁用或不可见）
    #[error("控件未就绪: {control}")]
    NotReady { control: String },

    /// 状态等待超时
    #[error("等待 {control} 满足条件 '{condition}' 超时 ({waited:?})")]
    Timeout {
        control: String,
        condition: String,
        waited: Duration,
    },

    /// 读取属性时的瞬时失败（例如目标程序正在重绘）
    #[error("瞬时失败: {0}")]
    Transient(String),

    /// 运行被取消
    #[error("操作已取消")]
    Cancelled,

    /// 后端返回的不可重试错误
    #[error("UI 自动化后端错误: {0}")]
    Backend(String),
}

impl UiError {
    /// 是否可以在同一超时预算内重试
    pub fn is_transient(&self) -> bool {
        matches!(self, UiError::Transient(_) | UiError::NotReady { .. })
    }
}

/// 案例级失败类型（编排层）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// 案例录入窗口始终未出现
    LaunchFailure,
    /// 某个字段写入失败
    FieldWriteFailure,
    /// 点击计算按钮失败
    ComputeFailure,
    /// 计算在超时内未完成
    ComputeTimeout,
    /// 读取结果字段失败
    ExtractFailure,
    /// 目标进程已退出
    ProcessLost,
    /// 运行被操作员中断
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::LaunchFailure => "LaunchFailure",
            FailureKind::FieldWriteFailure => "FieldWriteFailure",
            FailureKind::ComputeFailure => "ComputeFailure",
            FailureKind::ComputeTimeout => "ComputeTimeout",
            FailureKind::ExtractFailure => "ExtractFailure",
            FailureKind::ProcessLost => "ProcessLost",
            FailureKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// 输入校验错误（加载阶段）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 案例中出现了没有绑定的字段
    #[error("案例 #{case} 包含未知字段: {field}")]
    UnknownField { case: String, field: String },

    /// 缺少必填字段
    #[error("案例 #{case} 缺少必填字段: {field}")]
    MissingField { case: String, field: String },

    /// 字段值与声明的类型不符
    #[error("案例 #{case} 字段 {field} 类型错误: 期望 {expected}, 实际 {actual}")]
    KindMismatch {
        case: String,
        field: String,
        expected: String,
        actual: String,
    },
}

/// 全部校验错误的集合
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "输入校验失败，共 {} 处问题:", self.0.len())?;
        for e in &self.0 {
            writeln!(f, "  - {}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ========== 便捷构造函数 ==========

impl UiError {
    pub fn not_found(locator: impl fmt::Display) -> Self {
        UiError::NotFound {
            locator: locator.to_string(),
        }
    }

    pub fn stale(control: impl Into<String>) -> Self {
        UiError::StaleHandle {
            control: control.into(),
        }
    }

    pub fn not_ready(control: impl Into<String>) -> Self {
        UiError::NotReady {
            control: control.into(),
        }
    }

    pub fn type_mismatch(
        control: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        UiError::TypeMismatch {
            control: control.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// UI 层结果类型
pub type UiResult<T> = Result<T, UiError>;
