use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::models::AdbPort;
use crate::app::shell::{ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

pub const ADB_TCP_PROP: &str = "service.adb.tcp.port";
const ADBD_SERVICE: &str = "adbd";

/// Switches adbd between USB and TCP/IP by rewriting its port property and
/// restarting the daemon. Needs root.
pub struct AdbConnectionManager<S = SystemSpawner> {
    executor: Arc<ShellExecutor<S>>,
    default_tcp_port: u16,
}

impl<S: ProcessSpawner> AdbConnectionManager<S> {
    pub fn new(executor: Arc<ShellExecutor<S>>, default_tcp_port: u16) -> Self {
        Self {
            executor,
            default_tcp_port,
        }
    }

    /// `None` clears the property, returning adbd to USB mode.
    pub fn set_adb_tcp_port(&self, port: Option<u16>, trace_id: &str) -> bool {
        let port_value = port.map(|value| value.to_string()).unwrap_or_default();
        let commands = vec![
            format!("setprop {ADB_TCP_PROP} {port_value}").trim_end().to_string(),
            format!("stop {ADBD_SERVICE}"),
            format!("start {ADBD_SERVICE}"),
        ];
        warn!(trace_id = %trace_id, ?port, "switching adb mode");

        let result = self
            .executor
            .execute_traced(&commands, ShellPrivilege::Root, trace_id);
        if result.success {
            info!(trace_id = %trace_id, ?port, "adb mode switched; adbd restarted");
        } else {
            error!(trace_id = %trace_id, error = %result.error, "failed to switch adb mode");
        }
        result.success
    }

    pub fn enable_tcp_default(&self, trace_id: &str) -> bool {
        self.set_adb_tcp_port(Some(self.default_tcp_port), trace_id)
    }

    pub fn switch_to_usb_mode(&self, trace_id: &str) -> bool {
        self.set_adb_tcp_port(None, trace_id)
    }

    pub fn current_adb_port(&self, trace_id: &str) -> AdbPort {
        let command = format!("getprop {ADB_TCP_PROP}");
        let result = self
            .executor
            .execute_traced(&[command], ShellPrivilege::User, trace_id);
        if !result.success {
            warn!(trace_id = %trace_id, exit_code = result.exit_code, "getprop failed");
            return AdbPort::Invalid {
                raw: result.combined_output(),
            };
        }
        let port = parse_adb_port(&result.output);
        if let AdbPort::Invalid { raw } = &port {
            error!(trace_id = %trace_id, prop = ADB_TCP_PROP, raw = %raw, "invalid adb port property");
        }
        port
    }
}

pub fn parse_adb_port(raw: &str) -> AdbPort {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "''" {
        return AdbPort::Usb;
    }
    match trimmed.parse::<u16>() {
        Ok(port) if port > 0 => AdbPort::Tcp { port },
        _ => AdbPort::Invalid {
            raw: trimmed.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ShellSettings;
    use crate::app::shell::testing::{RecordingSpawner, ScriptedReply};

    fn manager(spawner: RecordingSpawner) -> AdbConnectionManager<RecordingSpawner> {
        AdbConnectionManager::new(
            Arc::new(ShellExecutor::with_spawner(spawner, &ShellSettings::default())),
            5555,
        )
    }

    #[test]
    fn parses_port_property() {
        assert_eq!(parse_adb_port(""), AdbPort::Usb);
        assert_eq!(parse_adb_port("''"), AdbPort::Usb);
        assert_eq!(parse_adb_port(" 5555\n"), AdbPort::Tcp { port: 5555 });
        assert_eq!(parse_adb_port("-1"), AdbPort::Invalid { raw: "-1".to_string() });
        assert_eq!(parse_adb_port("abc"), AdbPort::Invalid { raw: "abc".to_string() });
    }

    #[test]
    fn tcp_mode_sets_prop_and_restarts_adbd_as_root() {
        let spawner = RecordingSpawner::new();
        let manager = manager(spawner.clone());

        assert!(manager.set_adb_tcp_port(Some(5037), "t"));
        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["su".to_string()]);
        assert_eq!(
            recorded.commands(0),
            vec![
                "setprop service.adb.tcp.port 5037".to_string(),
                "stop adbd".to_string(),
                "start adbd".to_string(),
            ]
        );
    }

    #[test]
    fn usb_mode_clears_port() {
        let spawner = RecordingSpawner::new();
        let manager = manager(spawner.clone());

        assert!(manager.switch_to_usb_mode("t"));
        assert_eq!(
            spawner.recorded().commands(0)[0],
            "setprop service.adb.tcp.port"
        );
    }

    #[test]
    fn enable_tcp_default_uses_configured_port() {
        let spawner = RecordingSpawner::new();
        let manager = manager(spawner.clone());

        assert!(manager.enable_tcp_default("t"));
        assert_eq!(
            spawner.recorded().commands(0)[0],
            "setprop service.adb.tcp.port 5555"
        );
    }

    #[test]
    fn reports_failed_switch() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "su: not found", Some(127)));
        let manager = manager(spawner);
        assert!(!manager.set_adb_tcp_port(Some(5555), "t"));
    }

    #[test]
    fn current_port_reads_property_directly() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::ok("5555\n"));
        let manager = manager(spawner.clone());

        assert_eq!(manager.current_adb_port("t"), AdbPort::Tcp { port: 5555 });
        let recorded = spawner.recorded();
        assert_eq!(recorded.programs, vec!["sh".to_string()]);
        assert_eq!(recorded.commands(0), vec!["getprop service.adb.tcp.port".to_string()]);
    }

    #[test]
    fn current_port_invalid_when_shell_fails() {
        let spawner = RecordingSpawner::new();
        spawner.push_reply(ScriptedReply::new("", "getprop: not found", Some(127)));
        let manager = manager(spawner);

        assert_eq!(
            manager.current_adb_port("t"),
            AdbPort::Invalid {
                raw: "getprop: not found".to_string()
            }
        );
    }
}
