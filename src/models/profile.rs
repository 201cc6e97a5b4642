//! 自动化配置（Profile）
//!
//! 描述目标程序的界面结构：字段绑定、计算按钮、完成标志、结果字段和已知对话框。
//! 进程启动时加载一次，运行期间不变。

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{ValidationError, ValidationErrors};
use crate::models::case::CaseRecord;
use crate::models::locator::{ControlPath, Locator, StatePredicate};
use crate::models::value::{FieldValue, ValueKind};

fn default_label_field() -> String {
    "label".to_string()
}

fn default_true() -> bool {
    true
}

/// 输入字段绑定
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldBinding {
    pub field: String,
    #[serde(flatten)]
    pub target: ControlPath,
    #[serde(default = "default_true")]
    pub required: bool,
    /// 声明的值类型，设置后在加载阶段校验
    #[serde(default)]
    pub kind: Option<ValueKind>,
    /// 重置时写回的基准值，未设置时清空
    #[serde(default)]
    pub default: Option<FieldValue>,
}

impl FieldBinding {
    pub fn new(field: impl Into<String>, target: ControlPath) -> Self {
        Self {
            field: field.into(),
            target,
            required: true,
            kind: None,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_default(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// 结果字段绑定
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputBinding {
    pub field: String,
    #[serde(flatten)]
    pub target: ControlPath,
}

impl OutputBinding {
    pub fn new(field: impl Into<String>, target: ControlPath) -> Self {
        Self {
            field: field.into(),
            target,
        }
    }
}

/// 计算完成标志
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionSignal {
    #[serde(flatten)]
    pub target: ControlPath,
    pub state: StatePredicate,
}

/// 已知对话框：出现时点击指定按钮关闭
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialogRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub dialog: ControlPath,
    /// 相对于对话框的按钮路径
    pub dismiss: Vec<Locator>,
}

impl DialogRule {
    /// 按钮的完整路径
    pub fn button_path(&self) -> ControlPath {
        let mut path = self.dialog.path.clone();
        path.extend(self.dismiss.iter().cloned());
        ControlPath {
            window: self.dialog.window.clone(),
            path,
        }
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.dialog.to_string())
    }
}

/// 自动化配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
    /// 案例标签字段名，不绑定控件
    #[serde(default = "default_label_field")]
    pub label_field: String,
    /// 案例录入主窗口（顶层窗口）
    pub window: Locator,
    /// 打开/重置案例录入界面的点击序列
    #[serde(default)]
    pub open: Vec<ControlPath>,
    #[serde(default)]
    pub fields: Vec<FieldBinding>,
    /// 触发计算的点击序列
    pub compute: Vec<ControlPath>,
    pub completion: CompletionSignal,
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
    /// 关闭/清空界面的点击序列
    #[serde(default)]
    pub reset: Vec<ControlPath>,
    /// 重置时是否把输入字段恢复为基准值
    #[serde(default = "default_true")]
    pub clear_on_reset: bool,
    #[serde(default)]
    pub dialogs: Vec<DialogRule>,
    /// 关闭目标程序时额外处理的确认对话框（"是否退出"等）
    #[serde(default)]
    pub close_dialogs: Vec<DialogRule>,
}

impl Profile {
    pub fn binding(&self, field: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|b| b.field == field)
    }

    /// 处理开始前校验全部案例，一次性报告所有问题
    pub fn validate_cases(&self, cases: &[CaseRecord]) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        for record in cases {
            let case = record.display_name();

            for (field, value) in record.fields() {
                if field == self.label_field {
                    continue;
                }
                match self.binding(field) {
                    None => errors.push(ValidationError::UnknownField {
                        case: case.clone(),
                        field: field.to_string(),
                    }),
                    Some(binding) => {
                        if let Some(kind) = binding.kind {
                            if !value.fits(kind) {
                                errors.push(ValidationError::KindMismatch {
                                    case: case.clone(),
                                    field: field.to_string(),
                                    expected: kind.to_string(),
                                    actual: value.kind_name().to_string(),
                                });
                            }
                        }
                    }
                }
            }

            for binding in self.fields.iter().filter(|b| b.required) {
                if record.get(&binding.field).is_none() {
                    errors.push(ValidationError::MissingField {
                        case: case.clone(),
                        field: binding.field.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// 检查配置自身：字段名不能重复，可选下拉框必须有基准值
    pub fn check(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for binding in &self.fields {
            if binding.field == self.label_field {
                return Err(format!("字段 {} 与标签字段同名", binding.field));
            }
            if !seen.insert(binding.field.as_str()) {
                return Err(format!("字段 {} 重复绑定", binding.field));
            }
            if self.clear_on_reset
                && !binding.required
                && binding.kind == Some(ValueKind::Choice)
                && binding.default.is_none()
            {
                return Err(format!(
                    "可选下拉框字段 {} 无法清空，必须配置 default",
                    binding.field
                ));
            }
        }
        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.field.as_str()) {
                return Err(format!("结果字段 {} 重复绑定", output.field));
            }
        }
        if self.compute.is_empty() {
            return Err("compute 不能为空".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
        [window]
        title = "Calc.*"

        [[fields]]
        field = "width"
        path = [{ automation_id = "width" }]
        kind = "number"

        [[fields]]
        field = "height"
        path = [{ automation_id = "height" }]
        required = false

        [[compute]]
        path = [{ title = "Compute" }]

        [completion]
        path = [{ automation_id = "results" }]
        state = "visible"

        [[outputs]]
        field = "area"
        path = [{ automation_id = "area" }]

        [[dialogs]]
        name = "save?"
        window = { title = "확인" }
        dismiss = [{ title = "아니요\\(N\\)", control_type = "button" }]
    "#;

    fn record(index: usize, fields: &[(&str, FieldValue)]) -> CaseRecord {
        CaseRecord::new(
            index,
            None,
            fields.iter().map(|(k, v)| (k.to_string(), v.clone())),
        )
    }

    #[test]
    fn test_parse_profile() {
        let profile: Profile = toml::from_str(PROFILE).unwrap();
        assert_eq!(profile.label_field, "label");
        assert_eq!(profile.fields.len(), 2);
        assert!(profile.fields[0].required);
        assert!(!profile.fields[1].required);
        assert_eq!(profile.completion.state, StatePredicate::Visible);
        assert!(profile.clear_on_reset);
        assert_eq!(profile.dialogs[0].button_path().path.len(), 1);
        assert!(profile.check().is_ok());
    }

    #[test]
    fn test_optional_choice_requires_default() {
        let mut profile: Profile = toml::from_str(PROFILE).unwrap();
        profile.fields.push(
            FieldBinding::new("zone", ControlPath::in_base(vec![Locator::automation_id("zone")]))
                .optional()
                .with_kind(ValueKind::Choice),
        );
        assert!(profile.check().unwrap_err().contains("zone"));

        profile.fields[2].default = Some(FieldValue::Text("서울".into()));
        assert!(profile.check().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let profile: Profile = toml::from_str(PROFILE).unwrap();
        let cases = vec![
            record(0, &[("width", FieldValue::Number(1.0))]),
            record(1, &[("height", FieldValue::Number(1.0))]),
            record(
                2,
                &[
                    ("width", FieldValue::Text("wide".into())),
                    ("depth", FieldValue::Number(2.0)),
                ],
            ),
        ];

        let errors = profile.validate_cases(&cases).unwrap_err().0;
        assert_eq!(errors.len(), 3);
        assert!(matches!(&errors[0], ValidationError::MissingField { case, field } if case == "#2" && field == "width"));
        assert!(matches!(&errors[1], ValidationError::UnknownField { field, .. } if field == "depth"));
        assert!(matches!(&errors[2], ValidationError::KindMismatch { field, .. } if field == "width"));
    }

    #[test]
    fn test_label_field_is_not_bound() {
        let profile: Profile = toml::from_str(PROFILE).unwrap();
        let cases = vec![record(
            0,
            &[
                ("label", FieldValue::Text("A1".into())),
                ("width", FieldValue::Number(1.0)),
            ],
        )];
        assert!(profile.validate_cases(&cases).is_ok());
    }
}
