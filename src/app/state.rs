use std::sync::Arc;

use crate::app::bridge::{
    AdbConnectionManager, AppListLoader, KernelInterface, LaunchGuard, PackageManagerBridge,
    ShellPrivilegedActions, SystemDiagnostics,
};
use crate::app::config::BridgeConfig;
use crate::app::shell::{ProcessSpawner, ShellExecutor, SystemSpawner};

/// Every service, built once from config and sharing a single executor.
pub struct BridgeState<S = SystemSpawner> {
    pub config: BridgeConfig,
    pub executor: Arc<ShellExecutor<S>>,
    pub package_manager: PackageManagerBridge<S>,
    pub diagnostics: SystemDiagnostics<S>,
    pub adb: AdbConnectionManager<S>,
    pub kernel: KernelInterface<S>,
    pub privileged: ShellPrivilegedActions<S>,
    pub launch_guard: LaunchGuard,
    pub app_list: AppListLoader<S>,
}

impl BridgeState<SystemSpawner> {
    pub fn new(config: BridgeConfig) -> Self {
        let executor = Arc::new(ShellExecutor::new(&config.shell));
        Self::with_executor(config, executor)
    }
}

impl<S: ProcessSpawner> BridgeState<S> {
    pub fn with_executor(config: BridgeConfig, executor: Arc<ShellExecutor<S>>) -> Self {
        Self {
            package_manager: PackageManagerBridge::new(Arc::clone(&executor)),
            diagnostics: SystemDiagnostics::new(Arc::clone(&executor), config.diagnostics.clone()),
            adb: AdbConnectionManager::new(Arc::clone(&executor), config.adb.default_tcp_port),
            kernel: KernelInterface::new(config.kernel.root.clone(), Arc::clone(&executor)),
            privileged: ShellPrivilegedActions::new(Arc::clone(&executor)),
            launch_guard: LaunchGuard::new(&config.launcher),
            app_list: AppListLoader::new(Arc::clone(&executor), config.launcher.self_package.clone()),
            executor,
            config,
        }
    }
}
