use std::sync::Arc;

use tracing::{error, info};

use crate::app::bridge::args::validate_package_name;
use crate::app::error::AppError;
use crate::app::models::UninstallOutcome;
use crate::app::shell::{CommandResult, ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

/// `pm` commands a launcher issues against installed packages.
pub struct PackageManagerBridge<S = SystemSpawner> {
    executor: Arc<ShellExecutor<S>>,
}

impl<S: ProcessSpawner> PackageManagerBridge<S> {
    pub fn new(executor: Arc<ShellExecutor<S>>) -> Self {
        Self { executor }
    }

    pub fn clear_app_data(
        &self,
        package_name: &str,
        privilege: ShellPrivilege,
        trace_id: &str,
    ) -> Result<bool, AppError> {
        validate_package_name(package_name).map_err(|message| AppError::validation(message, trace_id))?;
        let package_name = package_name.trim();

        let command = format!("pm clear {package_name}");
        let result = self.executor.execute_traced(&[command], privilege, trace_id);
        if result.success {
            info!(trace_id = %trace_id, package = %package_name, "cleared app data");
        } else {
            error!(trace_id = %trace_id, package = %package_name, error = %result.error, "failed to clear app data");
        }
        Ok(result.success)
    }

    pub fn uninstall_app(
        &self,
        package_name: &str,
        user_id: u32,
        privilege: ShellPrivilege,
        trace_id: &str,
    ) -> Result<UninstallOutcome, AppError> {
        validate_package_name(package_name).map_err(|message| AppError::validation(message, trace_id))?;
        let package_name = package_name.trim();

        let command = format!("pm uninstall --user {user_id} {package_name}");
        let result = self.executor.execute_traced(&[command], privilege, trace_id);
        let outcome = classify_uninstall(&result);
        match &outcome {
            UninstallOutcome::Removed => {
                info!(trace_id = %trace_id, package = %package_name, user_id, "uninstalled package");
            }
            UninstallOutcome::Rejected { reason } => {
                error!(trace_id = %trace_id, package = %package_name, reason = %reason, "package manager rejected uninstall");
            }
            UninstallOutcome::Failed { exit_code, error } => {
                error!(
                    trace_id = %trace_id,
                    package = %package_name,
                    exit_code = *exit_code,
                    error = %error,
                    "uninstall command failed"
                );
            }
        }
        Ok(outcome)
    }
}

/// `pm uninstall` can exit 0 while printing `Failure [REASON]`, so the exit code
/// alone is not enough; an explicit failure line wins over a clean exit.
pub fn classify_uninstall(result: &CommandResult) -> UninstallOutcome {
    if !result.success {
        return UninstallOutcome::Failed {
            exit_code: result.exit_code,
            error: result.combined_output(),
        };
    }
    let combined = result.combined_output();
    if let Some(line) = combined
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Failure"))
    {
        return UninstallOutcome::Rejected {
            reason: line.to_string(),
        };
    }
    UninstallOutcome::Removed
}
