//! 控件定位描述
//!
//! 一条 `ControlPath` 描述从桌面（或已绑定的主窗口）到目标控件的路径

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// 控件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Window,
    Pane,
    Edit,
    ComboBox,
    CheckBox,
    Button,
    MenuItem,
    Text,
    Other,
}

impl ElementKind {
    /// 是否是可写入的输入控件
    pub fn is_input(self) -> bool {
        matches!(
            self,
            ElementKind::Edit | ElementKind::ComboBox | ElementKind::CheckBox
        )
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 标题正则，整体匹配
#[derive(Clone)]
pub struct TitlePattern {
    source: String,
    regex: Regex,
}

impl TitlePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, title: &str) -> bool {
        self.regex.is_match(title)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for TitlePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TitlePattern({:?})", self.source)
    }
}

impl PartialEq for TitlePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl<'de> Deserialize<'de> for TitlePattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        TitlePattern::new(&source).map_err(serde::de::Error::custom)
    }
}

/// 元素可用于匹配的属性
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementProps {
    pub name: String,
    pub class_name: String,
    pub automation_id: String,
    pub kind: Option<ElementKind>,
}

/// 单级定位条件，未设置的条件不参与匹配
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Locator {
    #[serde(default)]
    pub title: Option<TitlePattern>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub automation_id: Option<String>,
    #[serde(default)]
    pub control_type: Option<ElementKind>,
    /// 多个匹配时选择第几个（从 0 开始）
    #[serde(default)]
    pub index: Option<usize>,
}

impl Locator {
    /// 按标题正则定位
    pub fn title(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            title: Some(TitlePattern::new(pattern)?),
            ..Default::default()
        })
    }

    /// 按 automation id 定位
    pub fn automation_id(id: impl Into<String>) -> Self {
        Self {
            automation_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_control_type(mut self, kind: ElementKind) -> Self {
        self.control_type = Some(kind);
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn matches(&self, props: &ElementProps) -> bool {
        if let Some(title) = &self.title {
            if !title.is_match(&props.name) {
                return false;
            }
        }
        if let Some(class_name) = &self.class_name {
            if class_name != &props.class_name {
                return false;
            }
        }
        if let Some(id) = &self.automation_id {
            if id != &props.automation_id {
                return false;
            }
        }
        if let Some(kind) = self.control_type {
            if props.kind != Some(kind) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("title~'{}'", title.as_str()));
        }
        if let Some(class_name) = &self.class_name {
            parts.push(format!("class='{}'", class_name));
        }
        if let Some(id) = &self.automation_id {
            parts.push(format!("id='{}'", id));
        }
        if let Some(kind) = self.control_type {
            parts.push(format!("type={}", kind));
        }
        if let Some(index) = self.index {
            parts.push(format!("#{}", index));
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// 控件路径
///
/// `window` 为空时相对于已绑定的主窗口解析；`path` 为空时目标就是窗口本身
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ControlPath {
    #[serde(default)]
    pub window: Option<Locator>,
    #[serde(default)]
    pub path: Vec<Locator>,
}

impl ControlPath {
    /// 主窗口下的控件
    pub fn in_base(path: Vec<Locator>) -> Self {
        Self { window: None, path }
    }

    /// 顶层窗口（或其子控件）
    pub fn in_window(window: Locator, path: Vec<Locator>) -> Self {
        Self {
            window: Some(window),
            path,
        }
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.window {
            Some(w) => write!(f, "[{}]", w)?,
            None => f.write_str("[主窗口]")?,
        }
        for step in &self.path {
            write!(f, " > {}", step)?;
        }
        Ok(())
    }
}

/// 控件状态条件
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatePredicate {
    Enabled,
    Disabled,
    Visible,
    Hidden,
    TextEquals(String),
    TextContains(String),
}

impl fmt::Display for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatePredicate::Enabled => f.write_str("enabled"),
            StatePredicate::Disabled => f.write_str("disabled"),
            StatePredicate::Visible => f.write_str("visible"),
            StatePredicate::Hidden => f.write_str("hidden"),
            StatePredicate::TextEquals(t) => write!(f, "text == '{}'", t),
            StatePredicate::TextContains(t) => write!(f, "text contains '{}'", t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(name: &str, id: &str, kind: ElementKind) -> ElementProps {
        ElementProps {
            name: name.to_string(),
            class_name: String::new(),
            automation_id: id.to_string(),
            kind: Some(kind),
        }
    }

    #[test]
    fn test_title_pattern_is_anchored() {
        let locator = Locator::title("건물에너지평가프로그램.*").unwrap();
        assert!(locator.matches(&props("건물에너지평가프로그램 - a.eco", "", ElementKind::Window)));
        assert!(!locator.matches(&props("[x] 건물에너지평가프로그램", "", ElementKind::Window)));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let locator = Locator::automation_id("txtWidth").with_control_type(ElementKind::Edit);
        assert!(locator.matches(&props("", "txtWidth", ElementKind::Edit)));
        assert!(!locator.matches(&props("", "txtWidth", ElementKind::Text)));
        assert!(!locator.matches(&props("", "txtHeight", ElementKind::Edit)));
    }

    #[test]
    fn test_deserialize_control_path() {
        let text = r#"
            window = { title = "결과그래프" }
            path = [{ title = "Export|내보내기", control_type = "menu_item" }]
        "#;
        let path: ControlPath = toml::from_str(text).unwrap();
        assert!(path.window.is_some());
        assert_eq!(path.path[0].control_type, Some(ElementKind::MenuItem));
        assert!(path.path[0].matches(&props("내보내기", "", ElementKind::MenuItem)));
    }

    #[test]
    fn test_deserialize_predicate() {
        #[derive(Deserialize)]
        struct Wrapper {
            state: StatePredicate,
        }
        let w: Wrapper = toml::from_str(r#"state = "hidden""#).unwrap();
        assert_eq!(w.state, StatePredicate::Hidden);
        let w: Wrapper = toml::from_str(r#"state = { text_equals = "완료" }"#).unwrap();
        assert_eq!(w.state, StatePredicate::TextEquals("완료".into()));
    }
}
