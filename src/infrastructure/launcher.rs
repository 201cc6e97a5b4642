//! 连接或启动目标程序

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::models::Locator;

#[cfg(windows)]
pub type TargetBackend = super::windows_uia::UiaBackend;

#[cfg(not(windows))]
pub type TargetBackend = super::simulated::SimulatedApp;

/// 默认安装位置：`C:\ECO2_*\Eco2Ar.exe`
pub fn find_executable(root: &Path) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("ECO2_"))
        .map(|entry| entry.path().join("Eco2Ar.exe"))
        .filter(|path| path.is_file())
        .collect();
    found.sort();

    if found.len() > 1 {
        info!("发现 {} 个 ECO2 安装: {:?}", found.len(), found);
    }
    found
        .pop()
        .ok_or_else(|| anyhow::anyhow!("未找到 ECO2 程序: {}\\ECO2_*\\Eco2Ar.exe", root.display()))
}

/// 连接到已运行的目标程序，没有则启动
///
/// 只建立进程级连接；主窗口由案例流程在启动超时内等待
#[cfg(windows)]
pub fn attach_or_launch(window: &Locator, executable: Option<&Path>) -> Result<TargetBackend> {
    debug!("正在查找目标窗口: {}", window);
    if let Some(backend) = TargetBackend::attach(window, executable)? {
        return Ok(backend);
    }

    let executable = match executable {
        Some(path) => path.to_path_buf(),
        None => find_executable(Path::new("C:/"))?,
    };
    TargetBackend::launch(&executable)
}

#[cfg(not(windows))]
pub fn attach_or_launch(window: &Locator, executable: Option<&Path>) -> Result<TargetBackend> {
    debug!("目标窗口: {}, 程序: {:?}", window, executable);
    anyhow::bail!("目标程序只能在 Windows 上通过 UI Automation 驱动")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_executable_picks_last_install() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["ECO2_2023", "ECO2_2024", "Other"] {
            let path = root.path().join(dir);
            std::fs::create_dir(&path).unwrap();
            std::fs::write(path.join("Eco2Ar.exe"), b"").unwrap();
        }

        let exe = find_executable(root.path()).unwrap();
        assert!(exe.ends_with("ECO2_2024/Eco2Ar.exe"));
    }

    #[test]
    fn test_find_executable_missing() {
        let root = tempfile::tempdir().unwrap();
        assert!(find_executable(root.path()).is_err());
    }
}
