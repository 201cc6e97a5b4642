//! Windows UI Automation 后端 - 基础设施层
//!
//! 通过 IUIAutomation（`uiautomation` crate）访问目标程序的窗口树。
//! COM 对象只能在创建它的线程上使用，所以整个运行时是单线程的。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use anyhow::{Context, Result};
use tracing::{debug, info, trace};
use uiautomation::patterns::{
    UIInvokePattern, UISelectionItemPattern, UITogglePattern, UIValuePattern, UIWindowPattern,
};
use uiautomation::types::{ControlType, ToggleState, TreeScope};
use uiautomation::{UIAutomation, UICondition, UIElement};
use windows::Win32::Foundation::{CloseHandle, HWND, STILL_ACTIVE};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongW, GWL_STYLE};

use crate::error::{UiError, UiResult};
use crate::infrastructure::backend::{ElementId, ElementState, UiBackend};
use crate::infrastructure::launcher::find_executable;
use crate::models::{ElementKind, ElementProps, Locator};

/// 元素已不可用（窗口关闭后访问旧元素）
const UIA_E_ELEMENTNOTAVAILABLE: i32 = 0x8004_0201_u32 as i32;

/// 编辑框只接受数字（Win32 `ES_NUMBER`）
const ES_NUMBER: u32 = 0x2000;

fn has_number_style(style: u32) -> bool {
    style & ES_NUMBER != 0
}

/// 读取编辑框的原生窗口样式；没有原生句柄时按普通编辑框处理
fn is_numeric_edit(element: &UIElement) -> bool {
    let Ok(handle) = element.get_native_window_handle() else {
        return false;
    };
    let hwnd: HWND = handle.into();
    if hwnd.is_invalid() {
        return false;
    }
    let style = unsafe { GetWindowLongW(hwnd, GWL_STYLE) } as u32;
    has_number_style(style)
}

fn map_err(err: uiautomation::Error, what: &str) -> UiError {
    if err.code() == UIA_E_ELEMENTNOTAVAILABLE {
        UiError::stale(what)
    } else {
        UiError::Transient(format!("{}: {}", what, err))
    }
}

fn element_kind(control_type: ControlType) -> ElementKind {
    match control_type {
        ControlType::Window => ElementKind::Window,
        ControlType::Pane => ElementKind::Pane,
        ControlType::Edit => ElementKind::Edit,
        ControlType::ComboBox => ElementKind::ComboBox,
        ControlType::CheckBox => ElementKind::CheckBox,
        ControlType::Button => ElementKind::Button,
        ControlType::MenuItem => ElementKind::MenuItem,
        ControlType::Text => ElementKind::Text,
        _ => ElementKind::Other,
    }
}

/// UI Automation 后端
pub struct UiaBackend {
    automation: UIAutomation,
    true_condition: UICondition,
    pid: u32,
    child: Option<Child>,
    /// 重新启动时使用，为空时在默认安装位置查找
    executable: Option<PathBuf>,
    elements: HashMap<ElementId, UIElement>,
    by_runtime_id: HashMap<Vec<i32>, ElementId>,
    next_id: u64,
}

impl UiaBackend {
    fn new(pid: u32, child: Option<Child>, executable: Option<PathBuf>) -> Result<Self> {
        let automation = UIAutomation::new().context("初始化 UI Automation 失败")?;
        let true_condition = automation
            .create_true_condition()
            .context("创建查询条件失败")?;
        Ok(Self {
            automation,
            true_condition,
            pid,
            child,
            executable,
            elements: HashMap::new(),
            by_runtime_id: HashMap::new(),
            next_id: 0,
        })
    }

    /// 连接到已在运行、标题匹配的目标程序
    pub fn attach(window: &Locator, executable: Option<&Path>) -> Result<Option<Self>> {
        let automation = UIAutomation::new().context("初始化 UI Automation 失败")?;
        let root = automation.get_root_element().context("获取桌面元素失败")?;
        let condition = automation.create_true_condition()?;
        let windows = root.find_all(TreeScope::Children, &condition)?;

        for candidate in windows {
            let name = candidate.get_name().unwrap_or_default();
            let props = ElementProps {
                name,
                class_name: candidate.get_classname().unwrap_or_default(),
                automation_id: candidate.get_automation_id().unwrap_or_default(),
                kind: candidate.get_control_type().ok().map(element_kind),
            };
            if window.matches(&props) {
                let pid = candidate.get_process_id()? as u32;
                info!("✓ 连接到已运行的目标程序: {} (pid {})", props.name, pid);
                return Ok(Some(Self::new(pid, None, executable.map(Path::to_path_buf))?));
            }
        }
        Ok(None)
    }

    /// 启动目标程序
    pub fn launch(executable: &Path) -> Result<Self> {
        let child = spawn(executable)?;
        let pid = child.id();
        Self::new(pid, Some(child), Some(executable.to_path_buf()))
    }

    fn register(&mut self, element: UIElement) -> UiResult<ElementId> {
        let runtime_id = element
            .get_runtime_id()
            .map_err(|e| map_err(e, "runtime id"))?;
        if let Some(id) = self.by_runtime_id.get(&runtime_id) {
            self.elements.insert(*id, element);
            return Ok(*id);
        }
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.by_runtime_id.insert(runtime_id, id);
        self.elements.insert(id, element);
        Ok(id)
    }

    fn element(&self, id: ElementId) -> UiResult<&UIElement> {
        self.elements
            .get(&id)
            .ok_or_else(|| UiError::stale(format!("{:?}", id)))
    }

    fn props(element: &UIElement) -> UiResult<ElementProps> {
        Ok(ElementProps {
            name: element.get_name().map_err(|e| map_err(e, "name"))?,
            class_name: element.get_classname().map_err(|e| map_err(e, "class"))?,
            automation_id: element
                .get_automation_id()
                .map_err(|e| map_err(e, "automation id"))?,
            kind: Some(element_kind(
                element
                    .get_control_type()
                    .map_err(|e| map_err(e, "control type"))?,
            )),
        })
    }

    /// 遍历途中消失的候选元素直接跳过，只有父元素失效才算失败
    fn matching(&mut self, candidates: Vec<UIElement>, query: &Locator) -> Vec<ElementId> {
        let mut found = Vec::new();
        for candidate in candidates {
            let props = match Self::props(&candidate) {
                Ok(props) => props,
                Err(e) => {
                    trace!("跳过无法读取的候选元素: {}", e);
                    continue;
                }
            };
            if !query.matches(&props) {
                continue;
            }
            match self.register(candidate) {
                Ok(id) => found.push(id),
                Err(e) => trace!("跳过已消失的候选元素: {}", e),
            }
        }
        found
    }

    fn list_items(&self, element: &UIElement) -> UiResult<Vec<UIElement>> {
        let items = element
            .find_all(TreeScope::Descendants, &self.true_condition)
            .map_err(|e| map_err(e, "list items"))?;
        Ok(items
            .into_iter()
            .filter(|i| matches!(i.get_control_type(), Ok(ControlType::ListItem)))
            .collect())
    }
}

impl UiBackend for UiaBackend {
    fn is_process_alive(&mut self) -> bool {
        if let Some(child) = self.child.as_mut() {
            return matches!(child.try_wait(), Ok(None));
        }
        // 附加模式下通过进程句柄查询退出码
        unsafe {
            let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, self.pid) else {
                return false;
            };
            let mut code = 0u32;
            let ok = GetExitCodeProcess(handle, &mut code).is_ok();
            let _ = CloseHandle(handle);
            ok && code == STILL_ACTIVE.0 as u32
        }
    }

    fn find_windows(&mut self, query: &Locator) -> UiResult<Vec<ElementId>> {
        let root = self
            .automation
            .get_root_element()
            .map_err(|e| map_err(e, "desktop"))?;
        let children = root
            .find_all(TreeScope::Children, &self.true_condition)
            .map_err(|e| map_err(e, "top-level windows"))?;
        let pid = self.pid;
        let own: Vec<UIElement> = children
            .into_iter()
            .filter(|w| matches!(w.get_process_id(), Ok(p) if p as u32 == pid))
            .collect();
        Ok(self.matching(own, query))
    }

    fn find_descendants(&mut self, parent: ElementId, query: &Locator) -> UiResult<Vec<ElementId>> {
        let candidates = self
            .element(parent)?
            .find_all(TreeScope::Descendants, &self.true_condition)
            .map_err(|e| map_err(e, "descendants"))?;
        Ok(self.matching(candidates, query))
    }

    fn element_state(&mut self, element: ElementId) -> UiResult<ElementState> {
        let el = self.element(element)?;
        let kind = element_kind(el.get_control_type().map_err(|e| map_err(e, "control type"))?);
        let enabled = el.is_enabled().map_err(|e| map_err(e, "enabled"))?;
        let offscreen = el.is_offscreen().map_err(|e| map_err(e, "offscreen"))?;

        let text = match el.get_pattern::<UIValuePattern>() {
            Ok(value) => value.get_value().map_err(|e| map_err(e, "value"))?,
            Err(_) => el.get_name().map_err(|e| map_err(e, "name"))?,
        };
        let checked = match kind {
            ElementKind::CheckBox => el
                .get_pattern::<UITogglePattern>()
                .and_then(|t| t.get_toggle_state())
                .map(|s| s == ToggleState::On)
                .ok(),
            _ => None,
        };
        let choices = match kind {
            ElementKind::ComboBox => self
                .list_items(el)?
                .iter()
                .filter_map(|i| i.get_name().ok())
                .collect(),
            _ => Vec::new(),
        };

        let numeric_only = kind == ElementKind::Edit && is_numeric_edit(el);

        debug!("元素状态 {:?}: enabled={} offscreen={}", element, enabled, offscreen);
        Ok(ElementState {
            kind,
            enabled,
            visible: !offscreen,
            text,
            numeric_only,
            choices,
            checked,
        })
    }

    fn write_text(&mut self, element: ElementId, text: &str) -> UiResult<()> {
        let el = self.element(element)?;
        let value = el
            .get_pattern::<UIValuePattern>()
            .map_err(|e| UiError::Backend(format!("不支持 ValuePattern: {}", e)))?;
        if value.is_readonly().unwrap_or(false) {
            return Err(UiError::not_ready(el.get_name().unwrap_or_default()));
        }
        value.set_value(text).map_err(|e| map_err(e, "set value"))
    }

    fn select_choice(&mut self, element: ElementId, choice: &str) -> UiResult<()> {
        let el = self.element(element)?;
        for item in self.list_items(el)? {
            if item.get_name().map(|n| n == choice).unwrap_or(false) {
                let pattern = item
                    .get_pattern::<UISelectionItemPattern>()
                    .map_err(|e| UiError::Backend(format!("不支持 SelectionItemPattern: {}", e)))?;
                return pattern.select().map_err(|e| map_err(e, "select"));
            }
        }
        Err(UiError::type_mismatch(
            el.get_name().unwrap_or_default(),
            "choice",
            choice,
        ))
    }

    fn set_checked(&mut self, element: ElementId, checked: bool) -> UiResult<()> {
        let el = self.element(element)?;
        let toggle = el
            .get_pattern::<UITogglePattern>()
            .map_err(|e| UiError::Backend(format!("不支持 TogglePattern: {}", e)))?;
        let current = toggle.get_toggle_state().map_err(|e| map_err(e, "toggle state"))?;
        if (current == ToggleState::On) != checked {
            toggle.toggle().map_err(|e| map_err(e, "toggle"))?;
        }
        Ok(())
    }

    fn invoke(&mut self, element: ElementId) -> UiResult<()> {
        let el = self.element(element)?;
        match el.get_pattern::<UIInvokePattern>() {
            Ok(pattern) => pattern.invoke().map_err(|e| map_err(e, "invoke")),
            Err(_) => {
                let _ = el.set_focus();
                el.click().map_err(|e| map_err(e, "click"))
            }
        }
    }

    fn close_window(&mut self, window: ElementId) -> UiResult<()> {
        let el = self.element(window)?;
        let pattern = el
            .get_pattern::<UIWindowPattern>()
            .map_err(|e| UiError::Backend(format!("不支持 WindowPattern: {}", e)))?;
        pattern.close().map_err(|e| map_err(e, "close window"))
    }

    fn relaunch(&mut self) -> UiResult<()> {
        if self.is_process_alive() {
            return Err(UiError::Backend("目标程序仍在运行".to_string()));
        }
        let executable = match &self.executable {
            Some(path) => path.clone(),
            None => find_executable(Path::new("C:/")).map_err(|e| UiError::Backend(e.to_string()))?,
        };
        let child = spawn(&executable).map_err(|e| UiError::Backend(format!("{:#}", e)))?;

        self.pid = child.id();
        self.child = Some(child);
        self.executable = Some(executable);
        self.release_elements();
        Ok(())
    }

    fn release_elements(&mut self) {
        trace!("释放 {} 个缓存元素", self.elements.len());
        self.elements.clear();
        self.by_runtime_id.clear();
    }
}

fn spawn(executable: &Path) -> Result<Child> {
    info!("🚀 启动目标程序: {}", executable.display());
    Command::new(executable)
        .spawn()
        .with_context(|| format!("无法启动: {}", executable.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_style_bit() {
        // WS_CHILD | WS_VISIBLE | ES_NUMBER | ES_AUTOHSCROLL
        assert!(has_number_style(0x5000_2080));
        // WS_CHILD | WS_VISIBLE | ES_AUTOHSCROLL
        assert!(!has_number_style(0x5000_0080));
    }
}
