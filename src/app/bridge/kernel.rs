use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::bridge::args::{shell_quote, validate_token};
use crate::app::error::AppError;
use crate::app::shell::{CommandResult, ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

pub const CPU_GOVERNOR_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor";
pub const MEMINFO_PATH: &str = "/proc/meminfo";
pub const KERNEL_VERSION_PATH: &str = "/proc/version";

/// Direct sysfs/procfs access. Every path is resolved under `root`, which is
/// `/` on a device and a scratch directory in tests.
pub struct KernelInterface<S = SystemSpawner> {
    root: PathBuf,
    executor: Arc<ShellExecutor<S>>,
}

impl<S: ProcessSpawner> KernelInterface<S> {
    pub fn new(root: impl Into<PathBuf>, executor: Arc<ShellExecutor<S>>) -> Self {
        Self {
            root: root.into(),
            executor,
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    pub fn read_kernel_file(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path);
        match fs::read_to_string(&resolved) {
            Ok(content) => Some(content.trim().to_string()),
            Err(err) => {
                error!(path = %resolved.display(), error = %err, "failed to read kernel file");
                None
            }
        }
    }

    /// Only writes to a file that already exists; sysfs never creates nodes.
    pub fn write_kernel_control(&self, path: &str, value: &str) -> bool {
        let resolved = self.resolve(path);
        if !resolved.is_file() {
            error!(path = %resolved.display(), "kernel control file does not exist");
            return false;
        }
        match write_existing(&resolved, value) {
            Ok(()) => {
                info!(path = %resolved.display(), value = %value, "wrote kernel control");
                true
            }
            Err(err) => {
                error!(path = %resolved.display(), error = %err, "failed to write kernel control");
                false
            }
        }
    }

    pub fn current_cpu_governor(&self) -> String {
        self.read_kernel_file(CPU_GOVERNOR_PATH)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn set_cpu_governor(&self, governor: &str) -> bool {
        if validate_token(governor, "governor").is_err() {
            error!(governor = %governor, "rejected cpu governor name");
            return false;
        }
        warn!(governor = %governor, "setting cpu governor");
        self.write_kernel_control(CPU_GOVERNOR_PATH, governor.trim())
    }

    pub fn set_cpu_governor_to_performance(&self) -> bool {
        self.set_cpu_governor("performance")
    }

    /// Privileged variant for when the process itself cannot write sysfs.
    pub fn set_cpu_governor_via_shell(
        &self,
        governor: &str,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        validate_token(governor, "governor").map_err(|message| AppError::validation(message, trace_id))?;
        let target = self.resolve(CPU_GOVERNOR_PATH);
        let command = format!(
            "echo {} > {}",
            governor.trim(),
            shell_quote(&target.to_string_lossy())
        );
        Ok(self
            .executor
            .execute_traced(&[command], ShellPrivilege::Root, trace_id))
    }

    /// First token of `/proc/version`, e.g. `5.15.0-android13-9`.
    pub fn kernel_version(&self) -> String {
        self.read_kernel_file(KERNEL_VERSION_PATH)
            .and_then(|content| parse_kernel_version(&content))
            .unwrap_or_else(|| "unavailable".to_string())
    }

    pub fn meminfo_kb(&self) -> Option<HashMap<String, u64>> {
        self.read_kernel_file(MEMINFO_PATH)
            .map(|content| parse_meminfo(&content))
    }
}

fn write_existing(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(value.as_bytes())?;
    file.flush()
}

/// `/proc/version` reads `Linux version <release> (...)`; bare releases are accepted too.
pub fn parse_kernel_version(content: &str) -> Option<String> {
    let mut tokens = content.split_whitespace();
    let first = tokens.next()?;
    if first == "Linux" {
        if tokens.next() == Some("version") {
            return tokens.next().map(str::to_string);
        }
        return None;
    }
    Some(first.to_string())
}

pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some((key.trim().to_string(), value))
        })
        .collect()
}
