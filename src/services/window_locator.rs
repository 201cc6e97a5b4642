//! 窗口定位服务 - 业务能力层
//!
//! 只负责"找到控件"能力，不修改目标程序状态

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{UiError, UiResult};
use crate::infrastructure::{AppSession, ControlHandle, ElementId, UiBackend};
use crate::models::{ControlPath, ElementKind, Locator};
use crate::services::wait::{poll_until, Attempt, WaitError, WaitPolicy};

/// 窗口定位器
///
/// 职责：
/// - 按路径解析窗口和控件，发放句柄
/// - 目标尚未出现或属性读取瞬时失败时，在超时预算内重试
/// - 多个匹配且未指定序号时报告歧义
pub struct WindowLocator {
    policy: WaitPolicy,
}

impl WindowLocator {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// 在默认策略内定位控件
    pub async fn locate<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        path: &ControlPath,
        cancel: &CancellationToken,
    ) -> UiResult<ControlHandle> {
        self.locate_within(session, path, self.policy, cancel).await
    }

    /// 在指定策略内定位控件
    pub async fn locate_within<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        path: &ControlPath,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> UiResult<ControlHandle> {
        let base = session.base_window();
        let found = poll_until(policy, cancel, || {
            resolve_with_kind(session.backend_mut(), base, path)
        })
        .await;

        match found {
            Ok((element, kind)) => {
                trace!("定位成功: {} -> {:?}", path, element);
                Ok(session.issue_handle(element, kind, path.to_string()))
            }
            Err(WaitError::Failed(err)) => Err(err),
            Err(WaitError::Expired { last, waited }) => {
                debug!(
                    "定位超时 ({:?}): {}，最近错误: {:?}",
                    waited, path, last
                );
                Err(UiError::not_found(path))
            }
        }
    }

    /// 定位顶层窗口（不依赖已绑定的主窗口）
    pub async fn locate_window<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        window: &Locator,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> UiResult<ElementId> {
        let path = ControlPath::in_window(window.clone(), Vec::new());
        let handle = self.locate_within(session, &path, policy, cancel).await?;
        Ok(handle.element())
    }

    /// 只尝试一次，不等待；用于探测可能出现的对话框
    pub fn probe<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        path: &ControlPath,
    ) -> UiResult<Option<ControlHandle>> {
        let base = session.base_window();
        match resolve_with_kind(session.backend_mut(), base, path) {
            Attempt::Ready((element, kind)) => {
                Ok(Some(session.issue_handle(element, kind, path.to_string())))
            }
            Attempt::Retry(_) => Ok(None),
            Attempt::Fail(err) => Err(err),
        }
    }
}

fn resolve_with_kind<B: UiBackend>(
    backend: &mut B,
    base: Option<ElementId>,
    path: &ControlPath,
) -> Attempt<(ElementId, ElementKind)> {
    let element = match resolve_once(backend, base, path) {
        Attempt::Ready(element) => element,
        Attempt::Retry(err) => return Attempt::Retry(err),
        Attempt::Fail(err) => return Attempt::Fail(err),
    };
    match backend.element_state(element) {
        Ok(state) => Attempt::Ready((element, state.kind)),
        Err(err) => classify(err, true),
    }
}

/// 沿路径解析一次
fn resolve_once<B: UiBackend>(
    backend: &mut B,
    base: Option<ElementId>,
    path: &ControlPath,
) -> Attempt<ElementId> {
    // 从桌面开始解析的路径，中途失效可以整体重来；主窗口失效则不能
    let from_desktop = path.window.is_some();

    let mut current = match &path.window {
        Some(window) => match backend.find_windows(window) {
            Ok(found) => match pick(found, window) {
                Attempt::Ready(element) => element,
                Attempt::Retry(err) => return Attempt::Retry(err),
                Attempt::Fail(err) => return Attempt::Fail(err),
            },
            Err(err) => return classify(err, true),
        },
        None => match base {
            Some(element) => element,
            None => return Attempt::Fail(UiError::stale("主窗口未绑定")),
        },
    };

    for step in &path.path {
        current = match backend.find_descendants(current, step) {
            Ok(found) => match pick(found, step) {
                Attempt::Ready(element) => element,
                Attempt::Retry(err) => return Attempt::Retry(err),
                Attempt::Fail(err) => return Attempt::Fail(err),
            },
            // 遍历途中消失的可能只是无关元素，主窗口还在就重来
            Err(err @ UiError::StaleHandle { .. }) if !from_desktop => {
                let base_alive = base.is_some_and(|b| backend.element_state(b).is_ok());
                return classify(err, base_alive);
            }
            Err(err) => return classify(err, from_desktop),
        };
    }

    Attempt::Ready(current)
}

fn pick(found: Vec<ElementId>, locator: &Locator) -> Attempt<ElementId> {
    match locator.index {
        Some(index) => match found.get(index) {
            Some(element) => Attempt::Ready(*element),
            None => Attempt::Retry(None),
        },
        None => match found.len() {
            0 => Attempt::Retry(None),
            1 => Attempt::Ready(found[0]),
            count => Attempt::Fail(UiError::Ambiguous {
                locator: locator.to_string(),
                count,
            }),
        },
    }
}

fn classify<T>(err: UiError, stale_is_retryable: bool) -> Attempt<T> {
    match err {
        UiError::StaleHandle { .. } if stale_is_retryable => Attempt::Retry(Some(err)),
        err if err.is_transient() => Attempt::Retry(Some(err)),
        err => Attempt::Fail(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{SimControl, SimulatedApp};
    use std::time::Duration;
    use tokio::time::Instant;

    fn window() -> Locator {
        Locator::title("Calc.*").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window_to_appear() {
        let app = SimulatedApp::new();
        let win = app.add_top_level(SimControl::new(ElementKind::Window, "Calc 1.0").detached());
        let mut session = AppSession::new(app.clone());
        let cancel = CancellationToken::new();

        let appear = app.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            appear.with_world(|w| w.set_attached(win, true));
        });

        let locator = WindowLocator::new(WaitPolicy::default());
        let found = locator
            .locate_window(&mut session, &window(), WaitPolicy::default(), &cancel)
            .await;
        assert_eq!(found, Ok(win));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_after_full_timeout() {
        let app = SimulatedApp::new();
        let mut session = AppSession::new(app);
        let cancel = CancellationToken::new();
        let policy = WaitPolicy::new(Duration::from_secs(3), Duration::from_millis(250));

        let started = Instant::now();
        let locator = WindowLocator::new(policy);
        let result = locator
            .locate_window(&mut session, &window(), policy, &cancel)
            .await;

        assert!(matches!(result, Err(UiError::NotFound { .. })));
        assert!(started.elapsed() >= policy.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let width = app.add_control(win, SimControl::edit("width"));
        app.fail_next_finds(3);

        let mut session = AppSession::new(app);
        session.bind_base_window(win);
        let locator = WindowLocator::new(WaitPolicy::default());
        let path = ControlPath::in_base(vec![Locator::automation_id("width")]);

        let handle = locator
            .locate(&mut session, &path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.element(), width);
        assert_eq!(handle.kind(), ElementKind::Edit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_element_vanishing_during_search_is_retried() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let width = app.add_control(win, SimControl::edit("width"));
        app.vanish_during_next_finds(1);

        let mut session = AppSession::new(app);
        session.bind_base_window(win);
        let policy = WaitPolicy::default();
        let locator = WindowLocator::new(policy);
        let path = ControlPath::in_base(vec![Locator::automation_id("width")]);

        let started = Instant::now();
        let handle = locator
            .locate(&mut session, &path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.element(), width);
        assert_eq!(started.elapsed(), policy.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_base_window_fails_at_once() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        app.add_control(win, SimControl::edit("width"));

        let mut session = AppSession::new(app.clone());
        session.bind_base_window(win);
        app.with_world(|w| w.set_attached(win, false));
        let locator = WindowLocator::new(WaitPolicy::default());
        let path = ControlPath::in_base(vec![Locator::automation_id("width")]);

        let started = Instant::now();
        let result = locator
            .locate(&mut session, &path, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(UiError::StaleHandle { .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_without_index() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        app.add_control(win, SimControl::edit("cell"));
        let second = app.add_control(win, SimControl::edit("cell"));

        let mut session = AppSession::new(app);
        session.bind_base_window(win);
        let locator = WindowLocator::new(WaitPolicy::default());
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let path = ControlPath::in_base(vec![Locator::automation_id("cell")]);
        let result = locator.locate(&mut session, &path, &cancel).await;
        assert!(matches!(result, Err(UiError::Ambiguous { count: 2, .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);

        let path = ControlPath::in_base(vec![Locator::automation_id("cell").with_index(1)]);
        let handle = locator.locate(&mut session, &path, &cancel).await.unwrap();
        assert_eq!(handle.element(), second);
    }

    #[test]
    fn test_probe_does_not_wait() {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let mut session = AppSession::new(app);
        session.bind_base_window(win);

        let locator = WindowLocator::new(WaitPolicy::default());
        let path = ControlPath::in_window(Locator::title("확인").unwrap(), vec![]);
        assert!(locator.probe(&mut session, &path).unwrap().is_none());
    }
}
