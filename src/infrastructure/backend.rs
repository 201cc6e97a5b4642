//! UI 自动化后端接口 - 基础设施层
//!
//! 自动化核心对目标程序只依赖这几项能力：进程存活检查、顶层窗口枚举、
//! 子控件查找，以及标准的读写/点击原语。

use crate::error::UiResult;
use crate::models::{ElementKind, Locator};

/// 后端内部的元素编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// 元素在某一时刻的状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    pub kind: ElementKind,
    pub enabled: bool,
    pub visible: bool,
    /// 当前显示的文本（编辑框的值、下拉框的选中项、标签的文字）
    pub text: String,
    /// 只接受数字的编辑框
    pub numeric_only: bool,
    /// 下拉框可选项
    pub choices: Vec<String>,
    /// 复选框状态
    pub checked: Option<bool>,
}

impl ElementState {
    pub fn is_ready(&self) -> bool {
        self.enabled && self.visible
    }
}

/// 目标程序的 UI 访问能力
///
/// 所有方法都是一次性的原语调用，不做等待；等待和重试由上层负责。
/// 找不到元素时查找方法返回空列表，元素已脱离窗口时返回 `StaleHandle`。
pub trait UiBackend {
    /// 目标进程是否仍在运行
    fn is_process_alive(&mut self) -> bool;

    /// 查找目标进程的顶层窗口
    fn find_windows(&mut self, query: &Locator) -> UiResult<Vec<ElementId>>;

    /// 在 `parent` 的子树中查找元素（文档顺序）
    fn find_descendants(&mut self, parent: ElementId, query: &Locator) -> UiResult<Vec<ElementId>>;

    fn element_state(&mut self, element: ElementId) -> UiResult<ElementState>;

    /// 用 `text` 整体替换编辑框内容
    fn write_text(&mut self, element: ElementId, text: &str) -> UiResult<()>;

    fn select_choice(&mut self, element: ElementId, choice: &str) -> UiResult<()>;

    fn set_checked(&mut self, element: ElementId, checked: bool) -> UiResult<()>;

    /// 执行默认动作（按钮点击、菜单项选择）
    fn invoke(&mut self, element: ElementId) -> UiResult<()>;

    /// 请求关闭窗口，不等待进程退出
    fn close_window(&mut self, window: ElementId) -> UiResult<()>;

    /// 重新启动目标程序
    ///
    /// 只在显式重启时调用，调用前进程应已退出
    fn relaunch(&mut self) -> UiResult<()>;

    /// 案例边界：丢弃后端为已发放元素保留的缓存
    fn release_elements(&mut self) {}
}
