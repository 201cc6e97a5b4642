//! 目标程序会话 - 基础设施层
//!
//! 持有唯一的后端连接，只暴露能力

use std::fmt;

use crate::error::{UiError, UiResult};
use crate::infrastructure::backend::{ElementId, ElementState, UiBackend};
use crate::models::ElementKind;

/// 已绑定控件的句柄
///
/// 只在一个案例的处理期间有效。会话在案例边界释放时会推进 epoch，
/// 此后旧句柄一律视为失效。
#[derive(Debug)]
pub struct ControlHandle {
    element: ElementId,
    epoch: u64,
    kind: ElementKind,
    description: String,
}

impl ControlHandle {
    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// 目标程序会话
///
/// 职责：
/// - 持有唯一的后端资源
/// - 记录当前绑定的主窗口
/// - 在案例边界发放和回收句柄
/// - 不认识案例 / 字段
pub struct AppSession<B: UiBackend> {
    backend: B,
    epoch: u64,
    base_window: Option<ElementId>,
    needs_resync: bool,
}

impl<B: UiBackend> AppSession<B> {
    /// 创建新的会话
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            epoch: 0,
            base_window: None,
            needs_resync: false,
        }
    }

    /// 获取后端的引用
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn is_process_alive(&mut self) -> bool {
        self.backend.is_process_alive()
    }

    pub fn base_window(&self) -> Option<ElementId> {
        self.base_window
    }

    pub fn bind_base_window(&mut self, window: ElementId) {
        self.base_window = Some(window);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 释放当前案例持有的全部句柄
    pub fn release(&mut self) {
        self.epoch += 1;
        self.base_window = None;
        self.backend.release_elements();
    }

    /// 标记下一个案例开始前需要强制重新同步
    pub fn mark_resync(&mut self) {
        self.needs_resync = true;
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn clear_resync(&mut self) {
        self.needs_resync = false;
    }

    /// 为元素发放句柄
    pub fn issue_handle(
        &self,
        element: ElementId,
        kind: ElementKind,
        description: impl Into<String>,
    ) -> ControlHandle {
        ControlHandle {
            element,
            epoch: self.epoch,
            kind,
            description: description.into(),
        }
    }

    /// 校验句柄仍属于当前案例，并读取其状态
    pub fn state_of(&mut self, handle: &ControlHandle) -> UiResult<ElementState> {
        self.check(handle)?;
        self.backend.element_state(handle.element)
    }

    /// 校验句柄仍属于当前案例，返回可操作的后端
    pub fn checked_backend(&mut self, handle: &ControlHandle) -> UiResult<&mut B> {
        self.check(handle)?;
        Ok(&mut self.backend)
    }

    fn check(&self, handle: &ControlHandle) -> UiResult<()> {
        if handle.epoch != self.epoch {
            return Err(UiError::stale(handle.description.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::simulated::{SimControl, SimulatedApp};

    #[test]
    fn test_release_invalidates_handles() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let edit = app.add_control(win, SimControl::edit("width"));

        let mut session = AppSession::new(app);
        let handle = session.issue_handle(edit, ElementKind::Edit, "width");
        assert!(session.state_of(&handle).is_ok());

        session.release();
        assert!(matches!(
            session.state_of(&handle),
            Err(UiError::StaleHandle { .. })
        ));
        assert_eq!(session.base_window(), None);
    }

    #[test]
    fn test_release_drops_backend_element_cache() {
        let app = SimulatedApp::new();
        let mut session = AppSession::new(app.clone());

        session.release();
        session.release();
        assert_eq!(app.releases(), 2);
    }
}
