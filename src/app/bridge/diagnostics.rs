use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use zip::write::FileOptions;

use crate::app::bridge::args::{shell_quote, validate_token};
use crate::app::config::DiagnosticsSettings;
use crate::app::error::AppError;
use crate::app::shell::{CommandResult, ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

pub struct SystemDiagnostics<S = SystemSpawner> {
    executor: Arc<ShellExecutor<S>>,
    settings: DiagnosticsSettings,
}

/// Text of a diagnostic dump. On a failed shell run `text` describes the
/// failure instead of carrying output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticOutput {
    pub success: bool,
    pub text: String,
}

impl DiagnosticOutput {
    fn from_result(result: CommandResult, describe_failure: impl FnOnce(&CommandResult) -> String) -> Self {
        if result.success {
            Self {
                success: true,
                text: result.output,
            }
        } else {
            Self {
                success: false,
                text: describe_failure(&result),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct BundleManifest {
    crate_version: &'static str,
    os: &'static str,
    arch: &'static str,
    timestamp_utc: String,
    trace_id: String,
}

#[derive(Debug, Serialize)]
struct BundleSection {
    command: String,
    exit_code: i32,
    success: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct BundlePayload {
    manifest: BundleManifest,
    sections: Vec<BundleSection>,
}

pub fn logcat_command(max_lines: u32, filter_tag: Option<&str>) -> String {
    match filter_tag.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => format!("logcat -d -t {max_lines} -s {tag}:*"),
        None => format!("logcat -d -t {max_lines}"),
    }
}

impl<S: ProcessSpawner> SystemDiagnostics<S> {
    pub fn new(executor: Arc<ShellExecutor<S>>, settings: DiagnosticsSettings) -> Self {
        Self { executor, settings }
    }

    pub fn default_logcat_lines(&self) -> u32 {
        self.settings.logcat_max_lines
    }

    /// Dumps the log buffer. A failed shell run comes back as a descriptive
    /// text with `success: false`; only a malformed tag is an error.
    pub fn capture_logcat(
        &self,
        max_lines: u32,
        filter_tag: Option<&str>,
        trace_id: &str,
    ) -> Result<DiagnosticOutput, AppError> {
        if let Some(tag) = filter_tag.filter(|tag| !tag.trim().is_empty()) {
            validate_token(tag, "filter_tag").map_err(|message| AppError::validation(message, trace_id))?;
        }
        let command = logcat_command(max_lines.max(1), filter_tag);
        debug!(trace_id = %trace_id, command = %command, "capture logcat");

        let result = self
            .executor
            .execute_traced(&[command], ShellPrivilege::User, trace_id);
        Ok(DiagnosticOutput::from_result(result, |failed| {
            format!(
                "Failed to capture logcat (exit code {}): {}",
                failed.exit_code, failed.error
            )
        }))
    }

    pub fn dump_system_service(
        &self,
        service_name: &str,
        privilege: ShellPrivilege,
        trace_id: &str,
    ) -> Result<DiagnosticOutput, AppError> {
        validate_token(service_name, "service_name")
            .map_err(|message| AppError::validation(message, trace_id))?;
        let service_name = service_name.trim();
        debug!(trace_id = %trace_id, service = %service_name, ?privilege, "dumpsys");

        let command = format!("dumpsys {service_name}");
        let result = self.executor.execute_traced(&[command], privilege, trace_id);
        Ok(DiagnosticOutput::from_result(result, |failed| {
            format!(
                "Failed to run dumpsys {service_name} (exit code {}): {}",
                failed.exit_code, failed.error
            )
        }))
    }

    pub fn get_prop(&self, key: &str, trace_id: &str) -> Result<CommandResult, AppError> {
        validate_token(key, "key").map_err(|message| AppError::validation(message, trace_id))?;
        let command = format!("getprop {}", key.trim());
        Ok(self
            .executor
            .execute_traced(&[command], ShellPrivilege::User, trace_id))
    }

    /// Usually needs system or root permission, so it always runs privileged.
    pub fn generate_bugreport(&self, trace_id: &str) -> CommandResult {
        let command = format!("bugreport {}", shell_quote(&self.settings.bugreport_path));
        warn!(trace_id = %trace_id, command = %command, "generating full bugreport");
        self.executor
            .execute_traced(&[command], ShellPrivilege::Root, trace_id)
    }

    /// Zips recent logcat and all properties with a JSON manifest. Shell failures
    /// are recorded in the manifest; only filesystem errors abort the export.
    pub fn export_bundle(&self, output_dir: Option<&Path>, trace_id: &str) -> Result<PathBuf, AppError> {
        let resolved_dir = self.resolve_output_dir(output_dir);
        fs::create_dir_all(&resolved_dir).map_err(|err| {
            AppError::system(format!("Failed to create output dir: {err}"), trace_id)
        })?;

        let now = Utc::now();
        let trace_short = trace_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect::<String>();
        let filename = format!("diagnostics_{}_{}.zip", now.format("%Y%m%d_%H%M%S"), trace_short);
        let bundle_path = resolved_dir.join(filename);

        let logcat_cmd = logcat_command(self.settings.logcat_max_lines, None);
        let logcat = self
            .executor
            .execute_traced(&[logcat_cmd.clone()], ShellPrivilege::User, trace_id);
        let getprop = self
            .executor
            .execute_traced(&["getprop"], ShellPrivilege::User, trace_id);

        let payload = BundlePayload {
            manifest: BundleManifest {
                crate_version: env!("CARGO_PKG_VERSION"),
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
                timestamp_utc: now.to_rfc3339(),
                trace_id: trace_id.to_string(),
            },
            sections: vec![
                section(&logcat_cmd, &logcat),
                section("getprop", &getprop),
            ],
        };
        let json = serde_json::to_vec_pretty(&payload).map_err(|err| {
            AppError::system(format!("Failed to serialize diagnostics payload: {err}"), trace_id)
        })?;

        let file = fs::File::create(&bundle_path)
            .map_err(|err| AppError::system(format!("Failed to create bundle: {err}"), trace_id))?;
        let mut zip = zip::ZipWriter::new(file);
        for (name, bytes) in [
            ("diagnostics.json", json.as_slice()),
            ("logcat.txt", logcat.output.as_bytes()),
            ("getprop.txt", getprop.output.as_bytes()),
        ] {
            zip.start_file(name, FileOptions::<()>::default())
                .map_err(|err| AppError::system(format!("Failed to write bundle: {err}"), trace_id))?;
            zip.write_all(bytes)
                .map_err(|err| AppError::system(format!("Failed to write bundle: {err}"), trace_id))?;
        }
        zip.finish()
            .map_err(|err| AppError::system(format!("Failed to finalize bundle: {err}"), trace_id))?;

        info!(trace_id = %trace_id, path = %bundle_path.display(), "exported diagnostics bundle");
        Ok(bundle_path)
    }

    fn resolve_output_dir(&self, output_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = output_dir.filter(|dir| !dir.as_os_str().is_empty()) {
            return dir.to_path_buf();
        }
        if !self.settings.output_dir.trim().is_empty() {
            return PathBuf::from(self.settings.output_dir.trim());
        }
        std::env::temp_dir().join("arcanos_diagnostics")
    }
}

fn section(command: &str, result: &CommandResult) -> BundleSection {
    BundleSection {
        command: command.to_string(),
        exit_code: result.exit_code,
        success: result.success,
        error: result.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ShellSettings;
    use crate::app::shell::testing::{RecordingSpawner, ScriptedReply};
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn diagnostics(spawner: RecordingSpawner) -> SystemDiagnostics<RecordingSpawner> {
        SystemDiagnostics::new(
            Arc::new(ShellExecutor::with_spawner(spawner, &ShellSettings::default())),
            DiagnosticsSettings::default(),
        )
    }

    #[test]
    fn builds_logcat_commands() {
        assert_eq!(logcat_command(100, None), "logcat -d -t 100");
        assert_eq!(logcat_command(50, Some("  ")), "logcat -d -t 50");
        assert_eq!(logcat_command(50, Some("ArcanosCore")), "logcat -d -t 50 -s ArcanosCore:*");
    }

    #[test]
    fn capture_logcat_returns_output() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("I/ArcanosCore: boot\n"));
        let diagnostics = diagnostics(spawner.clone());

        let log = diagnostics
            .capture_logcat(20, Some("ArcanosCore"), "t")
            .expect("valid tag");
        assert!(log.success);
        assert_eq!(log.text, "I/ArcanosCore: boot");
        assert_eq!(spawner.recorded().programs, vec!["sh".to_string()]);
        assert_eq!(
            spawner.recorded().commands(0),
            vec!["logcat -d -t 20 -s ArcanosCore:*".to_string()]
        );
    }

    #[test]
    fn capture_logcat_describes_failure() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "permission denied", Some(1)));
        let diagnostics = diagnostics(spawner);

        let log = diagnostics.capture_logcat(20, None, "t").expect("no tag");
        assert!(!log.success);
        assert_eq!(log.text, "Failed to capture logcat (exit code 1): permission denied");
    }

    #[test]
    fn capture_logcat_rejects_bad_tag() {
        let spawner = RecordingSpawner::new();
        let diagnostics = diagnostics(spawner.clone());
        let err = diagnostics
            .capture_logcat(20, Some("x; rm -rf /"), "t")
            .expect_err("bad tag");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(spawner.recorded().spawned, 0);
    }

    #[test]
    fn dump_system_service_uses_privilege() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "Can't find service", Some(255)));
        let diagnostics = diagnostics(spawner.clone());

        let dump = diagnostics
            .dump_system_service("battery", ShellPrivilege::Root, "t")
            .expect("valid service");
        assert!(!dump.success);
        assert_eq!(
            dump.text,
            "Failed to run dumpsys battery (exit code 255): Can't find service"
        );
        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["su".to_string()]);
        assert_eq!(recorded.commands(0), vec!["dumpsys battery".to_string()]);
    }

    #[test]
    fn dump_system_service_returns_output_on_success() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("Current Battery Service state:\n  level: 80\n"));
        let diagnostics = diagnostics(spawner.clone());

        let dump = diagnostics
            .dump_system_service(" battery ", ShellPrivilege::User, "t")
            .expect("valid service");
        assert!(dump.success);
        assert_eq!(dump.text, "Current Battery Service state:\n  level: 80");
        assert_eq!(spawner.recorded().programs, vec!["sh".to_string()]);
    }

    #[test]
    fn get_prop_runs_getprop_for_key() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("Arcanos\n"));
        let diagnostics = diagnostics(spawner.clone());

        let result = diagnostics
            .get_prop("ro.product.model", "t")
            .expect("valid key");
        assert!(result.success);
        assert_eq!(result.output, "Arcanos");
        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["sh".to_string()]);
        assert_eq!(recorded.commands(0), vec!["getprop ro.product.model".to_string()]);
    }

    #[test]
    fn get_prop_rejects_bad_key() {
        let spawner = RecordingSpawner::new();
        let diagnostics = diagnostics(spawner.clone());

        let err = diagnostics
            .get_prop("ro.x; reboot", "trace-prop")
            .expect_err("bad key");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(err.trace_id, "trace-prop");
        assert_eq!(spawner.recorded().spawned, 0);
    }

    #[test]
    fn bugreport_runs_as_root_with_quoted_path() {
        let spawner = RecordingSpawner::new();
        let diagnostics = diagnostics(spawner.clone());
        let result = diagnostics.generate_bugreport("t");
        assert!(result.success);
        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["su".to_string()]);
        assert_eq!(
            recorded.commands(0),
            vec!["bugreport '/data/local/tmp/arcanos_bugreport.zip'".to_string()]
        );
    }

    #[test]
    fn export_bundle_records_shell_failures() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "logcat: not found", Some(127)));
        spawner.push_reply(ScriptedReply::ok("[ro.product.model]: [Arcanos]\n"));
        let diagnostics = diagnostics(spawner);
        let dir = TempDir::new().expect("tmp");

        let bundle = diagnostics
            .export_bundle(Some(dir.path()), "trace-bundle-1234")
            .expect("bundle");
        assert!(bundle
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("diagnostics_") && name.ends_with("_tracebun.zip"))
            .unwrap_or(false));

        let bytes = fs::read(&bundle).expect("read bundle");
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("zip");

        let mut manifest = String::new();
        archive
            .by_name("diagnostics.json")
            .expect("manifest entry")
            .read_to_string(&mut manifest)
            .expect("read manifest");
        assert!(manifest.contains("\"exit_code\": 127"));
        assert!(manifest.contains("trace-bundle-1234"));

        let mut props = String::new();
        archive
            .by_name("getprop.txt")
            .expect("getprop entry")
            .read_to_string(&mut props)
            .expect("read props");
        assert_eq!(props, "[ro.product.model]: [Arcanos]");
    }
}
