//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次运行的资源管理和案例调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 运行处理器
//! - 管理应用生命周期（初始化、运行、关闭目标程序）
//! - 连接目标程序之前加载并校验案例（Vec<CaseRecord>）
//! - 持有目标程序会话（AppSession）和取消令牌
//! - 输出报告、失败记录和全局统计
//!
//! ### `case_processor` - 案例序列处理器
//! - 按顺序遍历案例，每个案例恰好一个结果
//! - 案例边界检查取消和进程存活
//! - 进程丢失或取消后标记剩余案例
//! - 按计划显式重启目标程序
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (持有 AppSession)
//!     ↓
//! case_processor (处理 Vec<CaseRecord>)
//!     ↓
//! workflow::CaseFlow (处理单个 CaseRecord)
//!     ↓
//! services (能力层：locator / driver / writer)
//!     ↓
//! infrastructure (基础设施：UiBackend)
//! ```

pub mod batch_processor;
pub mod case_processor;

// 重新导出主要类型
pub use batch_processor::App;
pub use case_processor::{process_cases, ProcessedCases};
