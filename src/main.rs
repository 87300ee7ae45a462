use std::path::PathBuf;
use std::process::ExitCode;

use arcanos_shell_lib::app::bridge::DiagnosticOutput;
use arcanos_shell_lib::app::config::{load_config, BridgeConfig};
use arcanos_shell_lib::app::logging::init_logging;
use arcanos_shell_lib::app::models::{CommandResponse, LaunchVerdict, UninstallOutcome};
use arcanos_shell_lib::{BridgeState, ShellPrivilege};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

const USAGE: &str = "Usage: arcanos_shell [--json] [--root] <command> [args]\n\
\n\
Commands:\n\
  run [--root] -- <cmd>...   run each argument as one shell line\n\
  clear <pkg> [--root]       pm clear\n\
  uninstall <pkg> [--user N] [--root]\n\
  logcat [--lines N] [--tag TAG]\n\
  dumpsys <service> [--root]\n\
  adb-tcp [PORT] | adb-usb | adb-port\n\
\n\
--json and --root are accepted anywhere before `--`.\n\
  governor | kernel-version\n\
  apps [--reload]\n\
  check <pkg>                launch blocklist check\n\
  bundle [--out DIR]         export diagnostics zip\n";

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Run(Vec<String>),
    Clear(String),
    Uninstall { package: String, user_id: u32 },
    Logcat { lines: Option<u32>, tag: Option<String> },
    Dumpsys(String),
    AdbTcp(Option<u16>),
    AdbUsb,
    AdbPort,
    Governor,
    KernelVersion,
    Apps { reload: bool },
    Check(String),
    Bundle { out_dir: Option<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    json: bool,
    privilege: ShellPrivilege,
    action: Action,
}

fn next_value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    it.next()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("{flag} expects a number, got {value}"))
}

fn parse_port(value: &str) -> Result<u16, String> {
    match parse_number::<u16>(value, "adb-tcp")? {
        0 => Err("adb-tcp port must be between 1 and 65535".to_string()),
        port => Ok(port),
    }
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut json = false;
    let mut privilege = ShellPrivilege::User;
    let mut words: Vec<String> = Vec::new();
    let mut verbatim: Option<Vec<String>> = None;

    // Global flags may appear anywhere before `--`; everything after it is
    // passed through untouched.
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--" => {
                verbatim = Some(raw.by_ref().collect());
                break;
            }
            "--json" => json = true,
            "--root" => privilege = ShellPrivilege::Root,
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => words.push(arg),
        }
    }

    let mut it = words.into_iter();
    let command = it.next().ok_or_else(|| USAGE.to_string())?;
    if command.starts_with('-') {
        return Err(format!("Unknown arg: {command}"));
    }
    if verbatim.is_some() && command != "run" {
        return Err(format!("Unexpected -- after {command}"));
    }
    let action = match command.as_str() {
        "run" => {
            let mut lines = it.collect::<Vec<_>>();
            lines.extend(verbatim.unwrap_or_default());
            Action::Run(lines)
        }
        "clear" => Action::Clear(next_value(&mut it, "clear")?),
        "uninstall" => {
            let package = next_value(&mut it, "uninstall")?;
            let mut user_id = 0;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--user" => user_id = parse_number(&next_value(&mut it, "--user")?, "--user")?,
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            Action::Uninstall { package, user_id }
        }
        "logcat" => {
            let mut lines = None;
            let mut tag = None;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--lines" => lines = Some(parse_number(&next_value(&mut it, "--lines")?, "--lines")?),
                    "--tag" => tag = Some(next_value(&mut it, "--tag")?),
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            Action::Logcat { lines, tag }
        }
        "dumpsys" => Action::Dumpsys(next_value(&mut it, "dumpsys")?),
        "adb-tcp" => {
            let port = match it.next() {
                Some(value) => Some(parse_port(&value)?),
                None => None,
            };
            Action::AdbTcp(port)
        }
        "adb-usb" => Action::AdbUsb,
        "adb-port" => Action::AdbPort,
        "governor" => Action::Governor,
        "kernel-version" => Action::KernelVersion,
        "apps" => {
            let mut reload = false;
            for arg in it.by_ref() {
                match arg.as_str() {
                    "--reload" => reload = true,
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            Action::Apps { reload }
        }
        "check" => Action::Check(next_value(&mut it, "check")?),
        "bundle" => {
            let mut out_dir = None;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--out" => out_dir = Some(PathBuf::from(next_value(&mut it, "--out")?)),
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            Action::Bundle { out_dir }
        }
        other => return Err(format!("Unknown command: {other}\n\n{USAGE}")),
    };

    Ok(Args {
        json,
        privilege,
        action,
    })
}

/// What a command produced, before it is rendered as text or JSON.
enum Outcome {
    Text { text: String, ok: bool },
    Json { value: serde_json::Value, text: String, ok: bool },
}

fn json_outcome<T: Serialize>(value: &T, text: String, ok: bool) -> Outcome {
    match serde_json::to_value(value) {
        Ok(value) => Outcome::Json { value, text, ok },
        Err(err) => Outcome::Text {
            text: format!("Failed to serialize output: {err}"),
            ok: false,
        },
    }
}

fn diagnostic_outcome(dump: DiagnosticOutput) -> Outcome {
    Outcome::Text {
        ok: dump.success,
        text: dump.text,
    }
}

fn execute(state: &BridgeState, args: &Args, trace_id: &str) -> Result<Outcome, arcanos_shell_lib::AppError> {
    let outcome = match &args.action {
        Action::Run(lines) => {
            let result = state.executor.execute_traced(lines, args.privilege, trace_id);
            let text = result.combined_output();
            let ok = result.success;
            json_outcome(&result, text, ok)
        }
        Action::Clear(package) => {
            let cleared = state
                .package_manager
                .clear_app_data(package, args.privilege, trace_id)?;
            json_outcome(&cleared, format!("cleared: {cleared}"), cleared)
        }
        Action::Uninstall { package, user_id } => {
            let outcome = state
                .package_manager
                .uninstall_app(package, *user_id, args.privilege, trace_id)?;
            let text = match &outcome {
                UninstallOutcome::Removed => "Success".to_string(),
                UninstallOutcome::Rejected { reason } => reason.clone(),
                UninstallOutcome::Failed { exit_code, error } => {
                    format!("exit code {exit_code}: {error}")
                }
            };
            let ok = outcome.succeeded();
            json_outcome(&outcome, text, ok)
        }
        Action::Logcat { lines, tag } => {
            let lines = lines.unwrap_or_else(|| state.diagnostics.default_logcat_lines());
            let dump = state
                .diagnostics
                .capture_logcat(lines, tag.as_deref(), trace_id)?;
            diagnostic_outcome(dump)
        }
        Action::Dumpsys(service) => {
            let dump = state
                .diagnostics
                .dump_system_service(service, args.privilege, trace_id)?;
            diagnostic_outcome(dump)
        }
        Action::AdbTcp(port) => {
            let ok = match port {
                Some(port) => state.adb.set_adb_tcp_port(Some(*port), trace_id),
                None => state.adb.enable_tcp_default(trace_id),
            };
            json_outcome(&ok, format!("switched: {ok}"), ok)
        }
        Action::AdbUsb => {
            let ok = state.adb.switch_to_usb_mode(trace_id);
            json_outcome(&ok, format!("switched: {ok}"), ok)
        }
        Action::AdbPort => {
            let port = state.adb.current_adb_port(trace_id);
            let text = format!("{port:?}");
            json_outcome(&port, text, true)
        }
        Action::Governor => Outcome::Text {
            text: state.kernel.current_cpu_governor(),
            ok: true,
        },
        Action::KernelVersion => Outcome::Text {
            text: state.kernel.kernel_version(),
            ok: true,
        },
        Action::Apps { reload } => {
            let apps = state.app_list.launcher_apps(*reload, trace_id)?;
            let text = apps
                .iter()
                .map(|app| {
                    let marker = if app.is_arcanos_native { "*" } else { " " };
                    format!("{marker} {}", app.package_name)
                })
                .collect::<Vec<_>>()
                .join("\n");
            json_outcome(&apps, text, true)
        }
        Action::Check(package) => {
            let verdict = state.launch_guard.check(package, trace_id);
            let text = match &verdict {
                LaunchVerdict::Allowed => format!("{package}: allowed"),
                LaunchVerdict::Blocked { package_name } => format!("{package_name}: blocked"),
            };
            let ok = verdict.is_allowed();
            json_outcome(&verdict, text, ok)
        }
        Action::Bundle { out_dir } => {
            let path = state
                .diagnostics
                .export_bundle(out_dir.as_deref(), trace_id)?;
            let text = path.to_string_lossy().to_string();
            json_outcome(&text, text.clone(), true)
        }
    };
    Ok(outcome)
}

/// An unreadable config is a runtime failure, not a usage error.
fn load_bridge_config(trace_id: &str) -> Result<BridgeConfig, u8> {
    load_config(trace_id).map_err(|err| {
        eprintln!("{err}");
        EXIT_FAILURE
    })
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_bridge_config(&trace_id) {
        Ok(config) => config,
        Err(status) => return ExitCode::from(status),
    };
    init_logging(&config.logging.log_level);
    let state = BridgeState::new(config);

    let outcome = match execute(&state, &args, &trace_id) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(trace_id = %trace_id, code = %err.code, error = %err.error, "command failed");
            if args.json {
                if let Ok(body) = serde_json::to_string_pretty(&err) {
                    println!("{body}");
                }
            } else {
                eprintln!("{err}");
            }
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let ok = match outcome {
        Outcome::Text { text, ok } => {
            if args.json {
                let response = CommandResponse {
                    trace_id: trace_id.clone(),
                    data: text,
                };
                if let Ok(body) = serde_json::to_string_pretty(&response) {
                    println!("{body}");
                }
            } else if !text.is_empty() {
                println!("{text}");
            }
            ok
        }
        Outcome::Json { value, text, ok } => {
            if args.json {
                let response = CommandResponse {
                    trace_id: trace_id.clone(),
                    data: value,
                };
                if let Ok(body) = serde_json::to_string_pretty(&response) {
                    println!("{body}");
                }
            } else if !text.is_empty() {
                println!("{text}");
            }
            ok
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}
