use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdbPort {
    /// `service.adb.tcp.port` is unset; adbd listens on USB only.
    Usb,
    Tcp { port: u16 },
    Invalid { raw: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum LaunchVerdict {
    Allowed,
    Blocked { package_name: String },
}

impl LaunchVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UninstallOutcome {
    Removed,
    /// Shell exited 0 but package manager printed a `Failure [...]` line.
    Rejected { reason: String },
    Failed { exit_code: i32, error: String },
}

impl UninstallOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    Reboot,
    PowerOff,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LauncherApp {
    pub package_name: String,
    pub apk_path: Option<String>,
    pub is_system: bool,
    pub is_arcanos_native: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}
