use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "ARCANOS_SHELL_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellSettings {
    pub user_shell: String,
    pub root_shell: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            user_shell: "sh".to_string(),
            root_shell: "su".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsSettings {
    pub logcat_max_lines: u32,
    pub bugreport_path: String,
    pub output_dir: String,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            logcat_max_lines: 100,
            bugreport_path: "/data/local/tmp/arcanos_bugreport.zip".to_string(),
            output_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    pub default_tcp_port: u16,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            default_tcp_port: 5555,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelSettings {
    /// Prefix for every sysfs/procfs path, `/` on a device.
    pub root: String,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LauncherSettings {
    pub self_package: String,
    pub blocked_packages: Vec<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            self_package: "com.arcanos.launcher".to_string(),
            blocked_packages: vec![
                "com.malware.miner".to_string(),
                "com.risco.spyware".to_string(),
                "com.adware.intrusivo".to_string(),
                "com.example.suspect".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub kernel: KernelSettings,
    #[serde(default)]
    pub launcher: LauncherSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    home_dir().join(".arcanos_shell_config.json")
}

pub fn backup_config_path(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<BridgeConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &BridgeConfig, trace_id: &str) -> Result<(), AppError> {
    let path = config_path();
    save_config_to_path(config, &path, &backup_config_path(&path), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<BridgeConfig, AppError> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config_from_value(&value)))
}

/// Sections that fail to deserialize fall back to their defaults individually.
fn config_from_value(value: &serde_json::Value) -> BridgeConfig {
    fn section<T: serde::de::DeserializeOwned + Default>(value: &serde_json::Value, key: &str) -> T {
        value
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    BridgeConfig {
        shell: section(value, "shell"),
        logging: section(value, "logging"),
        diagnostics: section(value, "diagnostics"),
        adb: section(value, "adb"),
        kernel: section(value, "kernel"),
        launcher: section(value, "launcher"),
    }
}

pub fn save_config_to_path(
    config: &BridgeConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: BridgeConfig) -> BridgeConfig {
    let defaults = BridgeConfig::default();
    if config.shell.user_shell.trim().is_empty() {
        config.shell.user_shell = defaults.shell.user_shell;
    }
    if config.shell.root_shell.trim().is_empty() {
        config.shell.root_shell = defaults.shell.root_shell;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = defaults.logging.log_level;
    }
    if !(1..=10_000).contains(&config.diagnostics.logcat_max_lines) {
        config.diagnostics.logcat_max_lines = defaults.diagnostics.logcat_max_lines;
    }
    if config.diagnostics.bugreport_path.trim().is_empty() {
        config.diagnostics.bugreport_path = defaults.diagnostics.bugreport_path;
    }
    if config.adb.default_tcp_port == 0 {
        config.adb.default_tcp_port = defaults.adb.default_tcp_port;
    }
    if config.kernel.root.trim().is_empty() {
        config.kernel.root = defaults.kernel.root;
    }
    config
        .launcher
        .blocked_packages
        .retain(|pkg| !pkg.trim().is_empty());
    config
}
