use crate::models::case::CaseRecord;
use crate::models::profile::Profile;
use crate::models::value::FieldValue;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载自动化配置
pub async fn load_profile(profile_path: &Path) -> Result<Profile> {
    let content = fs::read_to_string(profile_path)
        .await
        .with_context(|| format!("无法读取配置文件: {}", profile_path.display()))?;

    parse_profile(&content).with_context(|| format!("无法解析配置文件: {}", profile_path.display()))
}

/// 解析配置文本并做自检
pub fn parse_profile(content: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(content)?;
    profile.check().map_err(anyhow::Error::msg)?;
    Ok(profile)
}

/// 从 TOML 文件加载全部案例
///
/// 文件格式为 `[[cases]]` 表数组，每张表是一条案例
pub async fn load_cases(cases_path: &Path, label_field: &str) -> Result<Vec<CaseRecord>> {
    let content = fs::read_to_string(cases_path)
        .await
        .with_context(|| format!("无法读取案例文件: {}", cases_path.display()))?;

    let cases = parse_cases(&content, label_field)
        .with_context(|| format!("无法解析案例文件: {}", cases_path.display()))?;

    tracing::info!(
        "成功加载 {} 个案例: {}",
        cases.len(),
        cases_path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(cases)
}

/// 解析案例文本
pub fn parse_cases(content: &str, label_field: &str) -> Result<Vec<CaseRecord>> {
    let mut document: toml::Table = toml::from_str(content)?;

    let Some(raw) = document.remove("cases") else {
        anyhow::bail!("缺少 [[cases]] 表");
    };
    let toml::Value::Array(rows) = raw else {
        anyhow::bail!("cases 必须是表数组");
    };

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let toml::Value::Table(table) = row else {
            anyhow::bail!("第 {} 个案例不是表", index + 1);
        };

        let mut label = None;
        let mut fields = Vec::with_capacity(table.len());
        for (key, value) in table {
            let value = FieldValue::from_toml(&value)
                .map_err(|e| anyhow::anyhow!("第 {} 个案例字段 {}: {}", index + 1, key, e))?;
            if key == label_field {
                label = Some(value.to_input_text());
            }
            fields.push((key, value));
        }

        records.push(CaseRecord::new(index, label, fields));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cases_keeps_order_and_labels() {
        let text = r#"
            [[cases]]
            label = "A1"
            width = 10.0
            height = 3.2

            [[cases]]
            label = "A2"
            width = "bad"

            [[cases]]
            width = 4
        "#;

        let cases = parse_cases(text, "label").unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].label(), Some("A1"));
        assert_eq!(cases[0].get("height"), Some(&FieldValue::Number(3.2)));
        assert_eq!(cases[1].get("width"), Some(&FieldValue::Text("bad".into())));
        assert_eq!(cases[2].index(), 2);
        assert_eq!(cases[2].label(), None);
        assert_eq!(cases[2].display_name(), "#3");
    }

    #[test]
    fn test_parse_cases_rejects_nested_values() {
        let text = r#"
            [[cases]]
            width = [1, 2]
        "#;
        assert!(parse_cases(text, "label").is_err());
    }

    #[test]
    fn test_parse_cases_requires_table_array() {
        assert!(parse_cases("cases = 1", "label").is_err());
        assert!(parse_cases("other = 1", "label").is_err());
    }

    #[tokio::test]
    async fn test_load_profile_missing_file() {
        let result = load_profile(Path::new("no/such/profile.toml")).await;
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_sample_profile_accepts_sample_cases() {
        let profile = parse_profile(include_str!("../../../profiles/eco2.toml")).unwrap();
        assert_eq!(profile.compute.len(), 2);
        assert_eq!(profile.dialogs.len(), 4);
        assert!(profile.dialogs.iter().all(|d| d.dialog.window.is_none()));
        assert!(profile.dialogs.iter().any(|d| d.display_name() == "완료"));
        assert_eq!(profile.close_dialogs.len(), 1);

        let cases = parse_cases(include_str!("../../../profiles/cases.toml"), &profile.label_field)
            .unwrap();
        assert!(profile.validate_cases(&cases).is_ok());
    }
}
