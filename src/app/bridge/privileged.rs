use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::PowerAction;
use crate::app::shell::{CommandResult, ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

/// Platform operations that need system or root capability.
///
/// Implementations either perform the action or return `ERR_PRIVILEGED`; they
/// never report success for a request the platform refused. Power actions are
/// fire-and-forget: `Ok` means the request was accepted, not that the device
/// has already rebooted.
pub trait PrivilegedActions: Send + Sync {
    fn power(&self, action: PowerAction, trace_id: &str) -> Result<(), AppError>;
    fn start_user(&self, user_id: u32, trace_id: &str) -> Result<(), AppError>;
}

pub struct ShellPrivilegedActions<S = SystemSpawner> {
    executor: Arc<ShellExecutor<S>>,
}

impl<S: ProcessSpawner> ShellPrivilegedActions<S> {
    pub fn new(executor: Arc<ShellExecutor<S>>) -> Self {
        Self { executor }
    }

    fn run_root(&self, command: String, trace_id: &str) -> Result<CommandResult, AppError> {
        let result = self
            .executor
            .execute_traced(&[command.as_str()], ShellPrivilege::Root, trace_id);
        if !result.success {
            return Err(AppError::privileged(
                format!(
                    "`{command}` failed (exit code {}): {}",
                    result.exit_code,
                    result.combined_output()
                ),
                trace_id,
            ));
        }
        // `am` reports refusals on stdout with a clean exit.
        if let Some(line) = result
            .combined_output()
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("Error") || line.starts_with("Exception"))
        {
            return Err(AppError::privileged(format!("`{command}` refused: {line}"), trace_id));
        }
        Ok(result)
    }
}

pub fn power_command(action: PowerAction) -> &'static str {
    match action {
        PowerAction::Reboot => "svc power reboot",
        PowerAction::PowerOff => "svc power shutdown",
    }
}

impl<S: ProcessSpawner> PrivilegedActions for ShellPrivilegedActions<S> {
    fn power(&self, action: PowerAction, trace_id: &str) -> Result<(), AppError> {
        warn!(trace_id = %trace_id, ?action, "requesting power action");
        self.run_root(power_command(action).to_string(), trace_id)?;
        info!(trace_id = %trace_id, ?action, "power action accepted");
        Ok(())
    }

    fn start_user(&self, user_id: u32, trace_id: &str) -> Result<(), AppError> {
        warn!(trace_id = %trace_id, user_id, "starting user session");
        self.run_root(format!("am start-user {user_id}"), trace_id)?;
        info!(trace_id = %trace_id, user_id, "user session started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ShellSettings;
    use crate::app::shell::testing::{RecordingSpawner, ScriptedReply};

    fn actions(spawner: RecordingSpawner) -> ShellPrivilegedActions<RecordingSpawner> {
        ShellPrivilegedActions::new(Arc::new(ShellExecutor::with_spawner(
            spawner,
            &ShellSettings::default(),
        )))
    }

    #[test]
    fn reboot_runs_svc_as_root() {
        let spawner = RecordingSpawner::new();
        let actions = actions(spawner.clone());
        actions.power(PowerAction::Reboot, "t").expect("reboot accepted");

        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["su".to_string()]);
        assert_eq!(recorded.commands(0), vec!["svc power reboot".to_string()]);
    }

    #[test]
    fn power_failure_maps_to_privileged_error() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "Permission denial", Some(1)));
        let actions = actions(spawner);

        let err = actions
            .power(PowerAction::PowerOff, "trace-p")
            .expect_err("denied");
        assert_eq!(err.code, "ERR_PRIVILEGED");
        assert_eq!(err.trace_id, "trace-p");
        assert!(err.error.contains("svc power shutdown"));
    }

    #[test]
    fn start_user_detects_refusal_on_clean_exit() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("Error: could not start user 12\n"));
        let actions = actions(spawner.clone());

        let err = actions.start_user(12, "t").expect_err("refused");
        assert!(err.error.contains("could not start user 12"));
        assert_eq!(spawner.recorded().commands(0), vec!["am start-user 12".to_string()]);
    }

    #[test]
    fn start_user_succeeds() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("Success: user started\n"));
        let actions = actions(spawner);
        assert!(actions.start_user(10, "t").is_ok());
    }
}
