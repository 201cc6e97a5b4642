//! 控件驱动服务 - 业务能力层
//!
//! 只负责"读写控件"能力：写入、清空、点击、读取、等待状态

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{UiError, UiResult};
use crate::infrastructure::{AppSession, ControlHandle, ElementId, ElementState, UiBackend};
use crate::models::value::parse_number;
use crate::models::{ElementKind, FieldValue, StatePredicate};
use crate::services::wait::{poll_until, Attempt, WaitError, WaitPolicy};

/// 控件驱动
///
/// 职责：
/// - 写入前等待控件可用，写入后回读确认
/// - 按控件类型把值规整为对应的操作
/// - 不认识案例 / 字段名
pub struct ControlDriver {
    policy: WaitPolicy,
}

impl ControlDriver {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// 用 `value` 整体替换控件内容，并回读确认
    pub async fn set_value<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        value: &FieldValue,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        trace!("写入 {} = {}", handle, value);
        poll_until(self.policy, cancel, || {
            let state = match ready_state(session, handle) {
                Ok(state) => state,
                Err(attempt) => return attempt,
            };
            let action = match plan_write(handle, &state, value) {
                Ok(action) => action,
                Err(err) => return Attempt::Fail(err),
            };
            let applied = match session.checked_backend(handle) {
                Ok(backend) => apply(backend, handle.element(), &action),
                Err(err) => return Attempt::Fail(err),
            };
            if let Err(err) = applied {
                return retry_transient(Err(err));
            }

            // 回读确认，读取瞬时失败时整体重写
            match session.state_of(handle) {
                Ok(state) if action.is_reflected_in(&state) => Attempt::Ready(()),
                Ok(state) => {
                    debug!("回读不一致 {}: 期望 {:?}, 实际 '{}'", handle, action, state.text);
                    Attempt::Fail(UiError::Backend(format!(
                        "{} 回读不一致: 期望 {}, 实际 '{}'",
                        handle,
                        action.expected_text(),
                        state.text
                    )))
                }
                Err(err) => retry_transient(Err(err)),
            }
        })
        .await
        .map_err(|e| not_ready(e, handle))
    }

    /// 清空输入控件：编辑框置空，复选框取消勾选
    ///
    /// 下拉框没有"空"状态，只能写入基准值，这里报错
    pub async fn clear<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        poll_until(self.policy, cancel, || {
            let state = match ready_state(session, handle) {
                Ok(state) => state,
                Err(attempt) => return attempt,
            };
            let action = match state.kind {
                ElementKind::Edit => WriteAction::Text(String::new()),
                ElementKind::CheckBox => WriteAction::Check(false),
                ElementKind::ComboBox => {
                    return Attempt::Fail(UiError::Backend(format!(
                        "{} 是下拉框，无法清空，需要配置 default",
                        handle
                    )))
                }
                other => {
                    return Attempt::Fail(UiError::type_mismatch(
                        handle.to_string(),
                        "input",
                        other.to_string(),
                    ))
                }
            };
            match session.checked_backend(handle) {
                Ok(backend) => retry_transient(apply(backend, handle.element(), &action)),
                Err(err) => Attempt::Fail(err),
            }
        })
        .await
        .map_err(|e| not_ready(e, handle))
    }

    /// 等控件可用后执行默认动作
    pub async fn click<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        trace!("点击 {}", handle);
        poll_until(self.policy, cancel, || {
            if let Err(attempt) = ready_state(session, handle) {
                return attempt;
            }
            match session.checked_backend(handle) {
                Ok(backend) => retry_transient(backend.invoke(handle.element())),
                Err(err) => Attempt::Fail(err),
            }
        })
        .await
        .map_err(|e| not_ready(e, handle))
    }

    /// 请求关闭窗口
    pub async fn close_window<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        trace!("关闭窗口 {}", handle);
        poll_until(self.policy, cancel, || match session.checked_backend(handle) {
            Ok(backend) => retry_transient(backend.close_window(handle.element())),
            Err(err) => Attempt::Fail(err),
        })
        .await
        .map_err(|e| not_ready(e, handle))
    }

    /// 读取控件当前显示的值
    pub async fn read_value<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        cancel: &CancellationToken,
    ) -> UiResult<FieldValue> {
        poll_until(self.policy, cancel, || match session.state_of(handle) {
            Ok(state) if state.visible => Attempt::Ready(match state.checked {
                Some(checked) => FieldValue::Bool(checked),
                None => FieldValue::from_display(&state.text),
            }),
            Ok(_) => Attempt::Retry(None),
            Err(err) => retry_transient(Err(err)),
        })
        .await
        .map_err(|e| not_ready(e, handle))
    }

    /// 等待控件满足条件
    ///
    /// 控件已从窗口树消失时视为满足 `Hidden`
    pub async fn wait_for_state<B: UiBackend>(
        &self,
        session: &mut AppSession<B>,
        handle: &ControlHandle,
        predicate: &StatePredicate,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> UiResult<()> {
        let waited = poll_until(policy, cancel, || match session.state_of(handle) {
            Ok(state) if holds(predicate, &state) => Attempt::Ready(()),
            Ok(_) => Attempt::Retry(None),
            Err(UiError::StaleHandle { .. }) if *predicate == StatePredicate::Hidden => {
                Attempt::Ready(())
            }
            Err(err) => retry_transient(Err(err)),
        })
        .await;

        match waited {
            Ok(()) => Ok(()),
            Err(WaitError::Failed(err)) => Err(err),
            Err(WaitError::Expired { waited, .. }) => Err(UiError::Timeout {
                control: handle.to_string(),
                condition: predicate.to_string(),
                waited,
            }),
        }
    }
}

/// 一次写入操作
#[derive(Debug, Clone, PartialEq)]
enum WriteAction {
    Text(String),
    Choice(String),
    Check(bool),
}

impl WriteAction {
    fn expected_text(&self) -> String {
        match self {
            WriteAction::Text(text) | WriteAction::Choice(text) => text.clone(),
            WriteAction::Check(checked) => checked.to_string(),
        }
    }

    fn is_reflected_in(&self, state: &ElementState) -> bool {
        match self {
            WriteAction::Text(text) => same_text(text, &state.text),
            WriteAction::Choice(choice) => state.text.trim() == choice,
            WriteAction::Check(checked) => state.checked == Some(*checked),
        }
    }
}

fn plan_write(
    handle: &ControlHandle,
    state: &ElementState,
    value: &FieldValue,
) -> UiResult<WriteAction> {
    let mismatch = |expected: &str| {
        UiError::type_mismatch(handle.to_string(), expected, value.kind_name())
    };

    match state.kind {
        ElementKind::Edit => match value {
            FieldValue::Bool(_) => Err(mismatch("text")),
            FieldValue::Number(_) => Ok(WriteAction::Text(value.to_input_text())),
            FieldValue::Text(text) => {
                if state.numeric_only && parse_number(text.trim()).is_none() {
                    return Err(UiError::type_mismatch(handle.to_string(), "number", text));
                }
                Ok(WriteAction::Text(text.clone()))
            }
        },
        ElementKind::ComboBox => {
            let choice = match value {
                FieldValue::Bool(_) => return Err(mismatch("choice")),
                other => other.to_input_text(),
            };
            if !state.choices.iter().any(|c| *c == choice) {
                return Err(UiError::type_mismatch(
                    handle.to_string(),
                    format!("{:?} 之一", state.choices),
                    choice,
                ));
            }
            Ok(WriteAction::Choice(choice))
        }
        ElementKind::CheckBox => match value {
            FieldValue::Bool(checked) => Ok(WriteAction::Check(*checked)),
            _ => Err(mismatch("bool")),
        },
        other => Err(UiError::type_mismatch(
            handle.to_string(),
            "input",
            other.to_string(),
        )),
    }
}

fn apply<B: UiBackend>(backend: &mut B, element: ElementId, action: &WriteAction) -> UiResult<()> {
    match action {
        WriteAction::Text(text) => backend.write_text(element, text),
        WriteAction::Choice(choice) => backend.select_choice(element, choice),
        WriteAction::Check(checked) => backend.set_checked(element, *checked),
    }
}

/// 读取状态，未就绪时返回应交给轮询的结果
fn ready_state<B: UiBackend, T>(
    session: &mut AppSession<B>,
    handle: &ControlHandle,
) -> Result<ElementState, Attempt<T>> {
    match session.state_of(handle) {
        Ok(state) if state.is_ready() => Ok(state),
        Ok(_) => Err(Attempt::Retry(Some(UiError::not_ready(handle.to_string())))),
        Err(err) if err.is_transient() => Err(Attempt::Retry(Some(err))),
        Err(err) => Err(Attempt::Fail(err)),
    }
}

fn retry_transient<T>(result: UiResult<T>) -> Attempt<T> {
    match result {
        Ok(value) => Attempt::Ready(value),
        Err(err) if err.is_transient() => Attempt::Retry(Some(err)),
        Err(err) => Attempt::Fail(err),
    }
}

fn not_ready(err: WaitError, handle: &ControlHandle) -> UiError {
    match err {
        WaitError::Failed(err) => err,
        WaitError::Expired { last, .. } => {
            debug!("{} 等待超时，最近错误: {:?}", handle, last);
            UiError::not_ready(handle.to_string())
        }
    }
}

fn holds(predicate: &StatePredicate, state: &ElementState) -> bool {
    match predicate {
        StatePredicate::Enabled => state.enabled,
        StatePredicate::Disabled => !state.enabled,
        StatePredicate::Visible => state.visible,
        StatePredicate::Hidden => !state.visible,
        StatePredicate::TextEquals(text) => state.text.trim() == text.trim(),
        StatePredicate::TextContains(text) => state.text.contains(text.as_str()),
    }
}

/// 数字按数值比较（"10" 与 "10.0" 相同），其余按去空白后的文本比较
fn same_text(expected: &str, actual: &str) -> bool {
    match (parse_number(expected.trim()), parse_number(actual.trim())) {
        (Some(a), Some(b)) => (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0),
        _ => expected.trim() == actual.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{SimControl, SimulatedApp};
    use std::time::Duration;
    use tokio::time::Instant;

    fn setup(control: SimControl) -> (SimulatedApp, AppSession<SimulatedApp>, ControlHandle) {
        let app = SimulatedApp::new();
        let win = app.add_window("Calc");
        let kind = control_kind(&control);
        let id = app.add_control(win, control);
        let session = AppSession::new(app.clone());
        let handle = session.issue_handle(id, kind, "target");
        (app, session, handle)
    }

    fn control_kind(control: &SimControl) -> ElementKind {
        let mut probe = SimulatedApp::new();
        let id = probe.add_top_level(control.clone());
        probe.element_state(id).unwrap().kind
    }

    fn driver() -> ControlDriver {
        ControlDriver::new(WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_value_replaces_content() {
        let (app, mut session, handle) = setup(SimControl::edit("width").with_text("99"));
        let cancel = CancellationToken::new();

        driver()
            .set_value(&mut session, &handle, &FieldValue::Number(10.0), &cancel)
            .await
            .unwrap();
        assert_eq!(app.text(handle.element()), "10");

        driver()
            .set_value(&mut session, &handle, &FieldValue::Text("10.50".into()), &cancel)
            .await
            .unwrap();
        assert_eq!(app.text(handle.element()), "10.50");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_control_becomes_ready() {
        let (app, mut session, handle) = setup(SimControl::edit("width"));
        app.set_busy(handle.element(), 5);

        driver()
            .set_value(&mut session, &handle, &FieldValue::Number(3.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(app.text(handle.element()), "3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_after_full_timeout() {
        let (_app, mut session, handle) = setup(SimControl::edit("width").disabled());
        let started = Instant::now();

        let result = driver()
            .set_value(&mut session, &handle, &FieldValue::Number(3.0), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(UiError::NotReady { .. })));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_is_not_retried() {
        let (app, mut session, handle) = setup(SimControl::edit("width").numeric());
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let result = driver()
            .set_value(&mut session, &handle, &FieldValue::Text("bad".into()), &cancel)
            .await;
        assert!(matches!(result, Err(UiError::TypeMismatch { .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(app.text(handle.element()), "");

        let (_app, mut session, handle) = setup(SimControl::combo_box("zone", &["서울", "부산"]));
        let result = driver()
            .set_value(&mut session, &handle, &FieldValue::Text("제주".into()), &cancel)
            .await;
        assert!(matches!(result, Err(UiError::TypeMismatch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_choice_and_check_box() {
        let cancel = CancellationToken::new();
        let (app, mut session, handle) = setup(SimControl::combo_box("zone", &["서울", "부산"]));
        driver()
            .set_value(&mut session, &handle, &FieldValue::Text("부산".into()), &cancel)
            .await
            .unwrap();
        assert_eq!(app.text(handle.element()), "부산");

        let (app, mut session, handle) = setup(SimControl::check_box("heat"));
        driver()
            .set_value(&mut session, &handle, &FieldValue::Bool(true), &cancel)
            .await
            .unwrap();
        assert_eq!(app.with_world(|w| w.checked(handle.element())), Some(true));
        assert_eq!(
            driver().read_value(&mut session, &handle, &cancel).await,
            Ok(FieldValue::Bool(true))
        );

        driver().clear(&mut session, &handle, &cancel).await.unwrap();
        assert_eq!(app.with_world(|w| w.checked(handle.element())), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_back_is_retried() {
        let (app, mut session, handle) = setup(SimControl::edit("width"));
        app.fail_next_read_back(handle.element());
        let started = Instant::now();

        driver()
            .set_value(&mut session, &handle, &FieldValue::Number(7.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(app.text(handle.element()), "7");
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_combo_box_cannot_be_cleared() {
        let (app, mut session, handle) =
            setup(SimControl::combo_box("zone", &["서울", "부산"]).with_text("부산"));

        let result = driver()
            .clear(&mut session, &handle, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(UiError::Backend(_))));
        assert_eq!(app.text(handle.element()), "부산");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_window_requests_close() {
        let (app, mut session, handle) = setup(SimControl::new(ElementKind::Window, "Dialog"));

        driver()
            .close_window(&mut session, &handle, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(app.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_fails() {
        let (app, mut session, handle) = setup(SimControl::edit("width"));
        app.set_reject_writes(handle.element(), true);

        let result = driver()
            .set_value(&mut session, &handle, &FieldValue::Number(1.0), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(UiError::Backend(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_value_normalizes_numbers() {
        let (_app, mut session, handle) = setup(SimControl::label("area").with_text(" 1,024.5 "));
        let value = driver()
            .read_value(&mut session, &handle, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, FieldValue::Number(1024.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_times_out() {
        let (_app, mut session, handle) = setup(SimControl::label("done").hidden());
        let policy = WaitPolicy::new(Duration::from_secs(5), Duration::from_millis(250));
        let started = Instant::now();

        let result = driver()
            .wait_for_state(
                &mut session,
                &handle,
                &StatePredicate::Visible,
                policy,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(UiError::Timeout { .. })));
        assert!(started.elapsed() >= policy.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_is_satisfied_when_control_disappears() {
        let (app, mut session, handle) = setup(SimControl::label("progress"));
        let id = handle.element();
        let closer = app.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            closer.with_world(|w| w.set_attached(id, false));
        });

        driver()
            .wait_for_state(
                &mut session,
                &handle,
                &StatePredicate::Hidden,
                WaitPolicy::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_handle_after_release() {
        let (_app, mut session, handle) = setup(SimControl::button("Go"));
        session.release();
        let result = driver()
            .click(&mut session, &handle, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(UiError::StaleHandle { .. })));
    }

    #[test]
    fn test_same_text_is_numeric_aware() {
        assert!(same_text("10", "10.0"));
        assert!(same_text("1234.5", "1,234.5"));
        assert!(!same_text("10", "11"));
        assert!(same_text("abc ", "abc"));
    }
}
