pub mod adb_connection;
pub mod app_list;
pub mod args;
pub mod diagnostics;
pub mod kernel;
pub mod launch_guard;
pub mod package_manager;
pub mod privileged;

pub use adb_connection::AdbConnectionManager;
pub use app_list::AppListLoader;
pub use diagnostics::{DiagnosticOutput, SystemDiagnostics};
pub use kernel::KernelInterface;
pub use launch_guard::LaunchGuard;
pub use package_manager::PackageManagerBridge;
pub use privileged::{PrivilegedActions, ShellPrivilegedActions};
