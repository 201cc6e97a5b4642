//! 模拟目标程序 - 基础设施层
//!
//! 进程内的界面替身：窗口树、输入控件、按钮回调，以及故障注入
//! （控件忙、瞬时查找失败、写入被拒、回读失败、进程退出）。用于演练和测试。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{UiError, UiResult};
use crate::infrastructure::backend::{ElementId, ElementState, UiBackend};
use crate::models::value::parse_number;
use crate::models::{ElementKind, ElementProps, Locator};

/// 按钮被点击时执行的回调
pub type InvokeHook = Box<dyn FnMut(&mut SimWorld) + Send>;

/// 待添加的控件描述
#[derive(Debug, Clone)]
pub struct SimControl {
    props: ElementProps,
    text: String,
    numeric_only: bool,
    choices: Vec<String>,
    checked: Option<bool>,
    enabled: bool,
    visible: bool,
    attached: bool,
}

impl SimControl {
    pub fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            props: ElementProps {
                name: name.into(),
                class_name: String::new(),
                automation_id: String::new(),
                kind: Some(kind),
            },
            text: String::new(),
            numeric_only: false,
            choices: Vec::new(),
            checked: None,
            enabled: true,
            visible: true,
            attached: true,
        }
    }

    /// 编辑框，名称和 automation id 都是 `id`
    pub fn edit(id: &str) -> Self {
        Self::new(ElementKind::Edit, id).automation_id(id)
    }

    pub fn button(name: &str) -> Self {
        Self::new(ElementKind::Button, name)
    }

    /// 只读文本，名称和 automation id 都是 `id`
    pub fn label(id: &str) -> Self {
        Self::new(ElementKind::Text, id).automation_id(id)
    }

    pub fn pane(id: &str) -> Self {
        Self::new(ElementKind::Pane, id).automation_id(id)
    }

    pub fn combo_box(id: &str, choices: &[&str]) -> Self {
        let mut control = Self::new(ElementKind::ComboBox, id).automation_id(id);
        control.choices = choices.iter().map(|c| c.to_string()).collect();
        control
    }

    pub fn check_box(id: &str) -> Self {
        let mut control = Self::new(ElementKind::CheckBox, id).automation_id(id);
        control.checked = Some(false);
        control
    }

    pub fn automation_id(mut self, id: &str) -> Self {
        self.props.automation_id = id.to_string();
        self
    }

    pub fn class_name(mut self, class_name: &str) -> Self {
        self.props.class_name = class_name.to_string();
        self
    }

    pub fn numeric(mut self) -> Self {
        self.numeric_only = true;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 创建时不挂在窗口树上（例如尚未弹出的对话框）
    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }
}

#[derive(Debug)]
struct SimNode {
    parent: Option<ElementId>,
    control: SimControl,
    busy_polls: u32,
    reject_writes: bool,
    fail_read_back: bool,
    read_back_pending: bool,
}

/// 模拟程序的内部状态，回调里可以直接修改
#[derive(Default)]
pub struct SimWorld {
    nodes: Vec<SimNode>,
    hooks: HashMap<ElementId, Vec<InvokeHook>>,
    close_hooks: HashMap<ElementId, Vec<InvokeHook>>,
    launch_hooks: Vec<InvokeHook>,
    invocations: HashMap<ElementId, usize>,
    dead: bool,
    death_observed: bool,
    transient_finds: u32,
    vanishing_finds: u32,
    calls: usize,
    calls_after_death: usize,
    closes: usize,
    launches: usize,
    releases: usize,
}

impl SimWorld {
    fn node(&self, id: ElementId) -> Option<&SimNode> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: ElementId) -> Option<&mut SimNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn text(&self, id: ElementId) -> String {
        self.node(id).map(|n| n.control.text.clone()).unwrap_or_default()
    }

    /// 把文本当作数字读取，空或非数字按 0 处理
    pub fn number(&self, id: ElementId) -> f64 {
        parse_number(self.text(id).trim()).unwrap_or(0.0)
    }

    pub fn checked(&self, id: ElementId) -> Option<bool> {
        self.node(id).and_then(|n| n.control.checked)
    }

    pub fn set_text(&mut self, id: ElementId, text: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.control.text = text.into();
        }
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) {
        if let Some(node) = self.node_mut(id) {
            node.control.visible = visible;
        }
    }

    pub fn set_enabled(&mut self, id: ElementId, enabled: bool) {
        if let Some(node) = self.node_mut(id) {
            node.control.enabled = enabled;
        }
    }

    /// 挂上或摘下窗口树（打开/关闭对话框）
    pub fn set_attached(&mut self, id: ElementId, attached: bool) {
        if let Some(node) = self.node_mut(id) {
            node.control.attached = attached;
        }
    }

    /// 接下来 `polls` 次状态查询都报告控件被禁用
    pub fn set_busy(&mut self, id: ElementId, polls: u32) {
        if let Some(node) = self.node_mut(id) {
            node.busy_polls = polls;
        }
    }

    pub fn set_reject_writes(&mut self, id: ElementId, reject: bool) {
        if let Some(node) = self.node_mut(id) {
            node.reject_writes = reject;
        }
    }

    /// 目标进程退出
    pub fn kill(&mut self) {
        self.dead = true;
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    fn record_call(&mut self) {
        self.calls += 1;
        if self.death_observed {
            self.calls_after_death += 1;
        }
    }

    fn is_attached(&self, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.node(cur) {
                Some(node) if node.control.attached => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    fn live_node(&self, id: ElementId) -> UiResult<&SimNode> {
        if self.dead || !self.is_attached(id) {
            let name = self
                .node(id)
                .map(|n| n.control.props.name.clone())
                .unwrap_or_else(|| format!("{:?}", id));
            return Err(UiError::stale(name));
        }
        self.node(id)
            .ok_or_else(|| UiError::Backend(format!("未知元素 {:?}", id)))
    }

    fn ready_node(&mut self, id: ElementId) -> UiResult<&mut SimNode> {
        let node = self.live_node(id)?;
        if !node.control.enabled || !node.control.visible || node.busy_polls > 0 {
            return Err(UiError::not_ready(node.control.props.name.clone()));
        }
        self.node_mut(id)
            .ok_or_else(|| UiError::Backend(format!("未知元素 {:?}", id)))
    }

    fn take_transient(&mut self) -> UiResult<()> {
        if self.transient_finds > 0 {
            self.transient_finds -= 1;
            return Err(UiError::Transient("读取窗口属性失败".to_string()));
        }
        Ok(())
    }

    /// 遍历子树时有无关元素（提示框、重绘中的控件）消失
    fn take_vanishing(&mut self) -> UiResult<()> {
        if self.vanishing_finds > 0 {
            self.vanishing_finds -= 1;
            return Err(UiError::stale("tooltip"));
        }
        Ok(())
    }

    fn arm_read_back(&mut self, id: ElementId) {
        if let Some(node) = self.node_mut(id) {
            if node.fail_read_back {
                node.fail_read_back = false;
                node.read_back_pending = true;
            }
        }
    }

    fn collect_descendants(&self, parent: ElementId, query: &Locator, out: &mut Vec<ElementId>) {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.parent != Some(parent) || !node.control.attached {
                continue;
            }
            let id = ElementId(i as u64);
            if query.matches(&node.control.props) {
                out.push(id);
            }
            self.collect_descendants(id, query, out);
        }
    }
}

/// 模拟目标程序
///
/// 可克隆的共享句柄：一份交给会话驱动，一份留给测试观察和注入故障
#[derive(Clone, Default)]
pub struct SimulatedApp {
    world: Arc<Mutex<SimWorld>>,
}

impl SimulatedApp {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, SimWorld> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 直接访问内部状态
    pub fn with_world<R>(&self, f: impl FnOnce(&mut SimWorld) -> R) -> R {
        f(&mut self.world())
    }

    /// 添加顶层窗口
    pub fn add_window(&self, title: &str) -> ElementId {
        self.add_node(None, SimControl::new(ElementKind::Window, title))
    }

    /// 添加顶层窗口（完整描述）
    pub fn add_top_level(&self, control: SimControl) -> ElementId {
        self.add_node(None, control)
    }

    pub fn add_control(&self, parent: ElementId, control: SimControl) -> ElementId {
        self.add_node(Some(parent), control)
    }

    fn add_node(&self, parent: Option<ElementId>, control: SimControl) -> ElementId {
        let mut world = self.world();
        let id = ElementId(world.nodes.len() as u64);
        world.nodes.push(SimNode {
            parent,
            control,
            busy_polls: 0,
            reject_writes: false,
            fail_read_back: false,
            read_back_pending: false,
        });
        id
    }

    /// 注册点击回调
    pub fn on_invoke(&self, id: ElementId, hook: impl FnMut(&mut SimWorld) + Send + 'static) {
        self.world().hooks.entry(id).or_default().push(Box::new(hook));
    }

    /// 注册关闭窗口时执行的回调；没有回调时关闭主窗口即退出进程
    pub fn on_close(&self, window: ElementId, hook: impl FnMut(&mut SimWorld) + Send + 'static) {
        self.world()
            .close_hooks
            .entry(window)
            .or_default()
            .push(Box::new(hook));
    }

    /// 注册重新启动时执行的回调（例如恢复初始界面）
    pub fn on_launch(&self, hook: impl FnMut(&mut SimWorld) + Send + 'static) {
        self.world().launch_hooks.push(Box::new(hook));
    }

    pub fn kill(&self) {
        self.world().kill();
    }

    pub fn is_alive(&self) -> bool {
        self.world().is_alive()
    }

    pub fn set_busy(&self, id: ElementId, polls: u32) {
        self.world().set_busy(id, polls);
    }

    pub fn set_reject_writes(&self, id: ElementId, reject: bool) {
        self.world().set_reject_writes(id, reject);
    }

    /// 接下来 `count` 次查找返回瞬时失败
    pub fn fail_next_finds(&self, count: u32) {
        self.world().transient_finds = count;
    }

    /// 接下来 `count` 次子树查找途中有无关元素消失
    pub fn vanish_during_next_finds(&self, count: u32) {
        self.world().vanishing_finds = count;
    }

    /// 下一次写入成功后，紧接着的一次状态读取返回瞬时失败
    pub fn fail_next_read_back(&self, id: ElementId) {
        if let Some(node) = self.world().node_mut(id) {
            node.fail_read_back = true;
        }
    }

    pub fn text(&self, id: ElementId) -> String {
        self.world().text(id)
    }

    pub fn invocations(&self, id: ElementId) -> usize {
        self.world().invocations.get(&id).copied().unwrap_or(0)
    }

    /// UI 调用总次数（不含存活检查）
    pub fn calls(&self) -> usize {
        self.world().calls
    }

    /// 发现进程退出之后仍然发生的 UI 调用次数
    pub fn calls_after_death(&self) -> usize {
        self.world().calls_after_death
    }

    /// 关闭窗口请求次数
    pub fn closes(&self) -> usize {
        self.world().closes
    }

    /// 重新启动次数
    pub fn launches(&self) -> usize {
        self.world().launches
    }

    /// 案例边界释放次数
    pub fn releases(&self) -> usize {
        self.world().releases
    }
}

impl UiBackend for SimulatedApp {
    fn is_process_alive(&mut self) -> bool {
        let mut world = self.world();
        if world.dead {
            world.death_observed = true;
        }
        !world.dead
    }

    fn find_windows(&mut self, query: &Locator) -> UiResult<Vec<ElementId>> {
        let mut world = self.world();
        world.record_call();
        world.take_transient()?;
        if world.dead {
            return Ok(Vec::new());
        }
        Ok(world
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none() && n.control.attached)
            .filter(|(_, n)| query.matches(&n.control.props))
            .map(|(i, _)| ElementId(i as u64))
            .collect())
    }

    fn find_descendants(&mut self, parent: ElementId, query: &Locator) -> UiResult<Vec<ElementId>> {
        let mut world = self.world();
        world.record_call();
        world.take_transient()?;
        world.live_node(parent)?;
        world.take_vanishing()?;
        let mut found = Vec::new();
        world.collect_descendants(parent, query, &mut found);
        Ok(found)
    }

    fn element_state(&mut self, element: ElementId) -> UiResult<ElementState> {
        let mut world = self.world();
        world.record_call();
        world.live_node(element)?;
        let node = world
            .node_mut(element)
            .ok_or_else(|| UiError::Backend(format!("未知元素 {:?}", element)))?;
        if node.read_back_pending {
            node.read_back_pending = false;
            return Err(UiError::Transient("读取控件值失败".to_string()));
        }
        let busy = node.busy_polls > 0;
        if busy {
            node.busy_polls -= 1;
        }
        let control = &node.control;
        Ok(ElementState {
            kind: control.props.kind.unwrap_or(ElementKind::Other),
            enabled: control.enabled && !busy,
            visible: control.visible,
            text: control.text.clone(),
            numeric_only: control.numeric_only,
            choices: control.choices.clone(),
            checked: control.checked,
        })
    }

    fn write_text(&mut self, element: ElementId, text: &str) -> UiResult<()> {
        let mut world = self.world();
        world.record_call();
        let node = world.ready_node(element)?;
        let name = node.control.props.name.clone();
        if node.control.props.kind != Some(ElementKind::Edit) {
            return Err(UiError::type_mismatch(name, "edit", "text"));
        }
        if node.control.numeric_only && !text.is_empty() && parse_number(text).is_none() {
            return Err(UiError::type_mismatch(name, "number", text));
        }
        if node.reject_writes {
            return Err(UiError::Backend(format!("{} 拒绝写入", name)));
        }
        node.control.text = text.to_string();
        world.arm_read_back(element);
        Ok(())
    }

    fn select_choice(&mut self, element: ElementId, choice: &str) -> UiResult<()> {
        let mut world = self.world();
        world.record_call();
        let node = world.ready_node(element)?;
        let name = node.control.props.name.clone();
        if !node.control.choices.iter().any(|c| c == choice) {
            return Err(UiError::type_mismatch(name, "choice", choice));
        }
        if node.reject_writes {
            return Err(UiError::Backend(format!("{} 拒绝写入", name)));
        }
        node.control.text = choice.to_string();
        world.arm_read_back(element);
        Ok(())
    }

    fn set_checked(&mut self, element: ElementId, checked: bool) -> UiResult<()> {
        let mut world = self.world();
        world.record_call();
        let node = world.ready_node(element)?;
        if node.control.checked.is_none() {
            let name = node.control.props.name.clone();
            return Err(UiError::type_mismatch(name, "check_box", "bool"));
        }
        node.control.checked = Some(checked);
        Ok(())
    }

    fn invoke(&mut self, element: ElementId) -> UiResult<()> {
        let mut guard = self.world();
        let world = &mut *guard;
        world.record_call();
        world.ready_node(element)?;
        *world.invocations.entry(element).or_default() += 1;

        let mut hooks = world.hooks.remove(&element).unwrap_or_default();
        for hook in hooks.iter_mut() {
            hook(&mut *world);
        }
        if let Some(added) = world.hooks.remove(&element) {
            hooks.extend(added);
        }
        world.hooks.insert(element, hooks);
        Ok(())
    }

    fn close_window(&mut self, window: ElementId) -> UiResult<()> {
        let mut guard = self.world();
        let world = &mut *guard;
        world.record_call();
        world.live_node(window)?;
        world.closes += 1;

        match world.close_hooks.remove(&window) {
            Some(mut hooks) => {
                for hook in hooks.iter_mut() {
                    hook(&mut *world);
                }
                world.close_hooks.insert(window, hooks);
            }
            None => world.kill(),
        }
        Ok(())
    }

    fn relaunch(&mut self) -> UiResult<()> {
        let mut guard = self.world();
        let world = &mut *guard;
        if !world.dead {
            return Err(UiError::Backend("目标程序仍在运行".to_string()));
        }
        world.dead = false;
        world.death_observed = false;
        world.launches += 1;

        let mut hooks = std::mem::take(&mut world.launch_hooks);
        for hook in hooks.iter_mut() {
            hook(&mut *world);
        }
        world.launch_hooks = hooks;
        Ok(())
    }

    fn release_elements(&mut self) {
        self.world().releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_skips_detached_subtrees() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let dialog = app.add_control(win, SimControl::pane("dialog").detached());
        app.add_control(dialog, SimControl::button("OK"));

        let ok = Locator::title("OK").unwrap();
        assert!(app.find_descendants(win, &ok).unwrap().is_empty());

        app.with_world(|w| w.set_attached(dialog, true));
        assert_eq!(app.find_descendants(win, &ok).unwrap().len(), 1);
    }

    #[test]
    fn test_numeric_edit_rejects_text() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let width = app.add_control(win, SimControl::edit("width").numeric());

        assert!(matches!(
            app.write_text(width, "bad"),
            Err(UiError::TypeMismatch { .. })
        ));
        app.write_text(width, "10").unwrap();
        app.write_text(width, "12").unwrap();
        assert_eq!(app.text(width), "12");
    }

    #[test]
    fn test_busy_polls_count_down() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let width = app.add_control(win, SimControl::edit("width"));
        app.set_busy(width, 2);

        assert!(!app.element_state(width).unwrap().enabled);
        assert!(!app.element_state(width).unwrap().enabled);
        assert!(app.element_state(width).unwrap().enabled);
    }

    #[test]
    fn test_invoke_runs_hooks() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let out = app.add_control(win, SimControl::label("out"));
        let go = app.add_control(win, SimControl::button("Go"));
        app.on_invoke(go, move |w| w.set_text(out, "done"));

        app.invoke(go).unwrap();
        assert_eq!(app.text(out), "done");
        assert_eq!(app.invocations(go), 1);
    }

    #[test]
    fn test_calls_after_observed_death_are_counted() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        app.kill();
        app.find_windows(&Locator::default()).unwrap();
        assert_eq!(app.calls_after_death(), 0);

        assert!(!app.is_process_alive());
        assert!(matches!(
            app.element_state(win),
            Err(UiError::StaleHandle { .. })
        ));
        assert_eq!(app.calls_after_death(), 1);
    }

    #[test]
    fn test_close_without_confirmation_exits() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");

        app.close_window(win).unwrap();
        assert!(!app.is_process_alive());
        assert_eq!(app.closes(), 1);

        app.relaunch().unwrap();
        assert!(app.is_process_alive());
        assert_eq!(app.launches(), 1);
        assert!(matches!(app.relaunch(), Err(UiError::Backend(_))));
    }

    #[test]
    fn test_read_back_failure_is_one_shot() {
        let mut app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let width = app.add_control(win, SimControl::edit("width"));
        app.fail_next_read_back(width);

        assert!(app.element_state(width).is_ok());
        app.write_text(width, "3").unwrap();
        assert!(matches!(
            app.element_state(width),
            Err(UiError::Transient(_))
        ));
        app.write_text(width, "4").unwrap();
        assert_eq!(app.element_state(width).unwrap().text, "4");
    }
}
