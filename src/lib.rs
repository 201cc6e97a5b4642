//! # ECO2 Auto
//!
//! 驱动 ECO2 建筑能耗评估程序批量计算案例的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（目标程序连接），只暴露能力
//! - `UiBackend` - 目标程序的 UI 访问原语（Windows UI Automation / 模拟程序）
//! - `AppSession` - 唯一的后端持有者，在案例边界回收句柄
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识案例
//! - `WindowLocator` - 定位窗口和控件
//! - `ControlDriver` - 写入、点击、读取、等待状态
//! - `ReportWriter` / `FailureWriter` - 写报告和失败记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个案例"的完整处理流程
//! - `CaseCtx` - 上下文封装（序号 + 标签）
//! - `CaseFlow` - 状态机（打开 → 写入 → 计算 → 等待 → 读取 → 重置）
//!   以及显式的关闭和重启
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 运行处理器，管理资源和输入输出
//! - `orchestrator/case_processor` - 案例序列处理器，顺序遍历案例
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, Timing};
pub use error::{FailureKind, UiError, UiResult, ValidationError, ValidationErrors};
pub use infrastructure::{AppSession, SimulatedApp, UiBackend};
pub use models::{CaseOutcome, CaseRecord, Profile, RunReport};
pub use orchestrator::{process_cases, App};
pub use workflow::{CaseCtx, CaseFlow};
