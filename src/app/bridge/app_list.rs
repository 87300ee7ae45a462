use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::app::error::AppError;
use crate::app::models::LauncherApp;
use crate::app::shell::{ProcessSpawner, ShellExecutor, ShellPrivilege, SystemSpawner};

const NATIVE_PREFIX: &str = "com.arcanos.";

/// Installed packages for the app drawer, loaded once and cached until a
/// forced reload or `clear_cache`.
pub struct AppListLoader<S = SystemSpawner> {
    executor: Arc<ShellExecutor<S>>,
    self_package: String,
    cache: Mutex<Option<Vec<LauncherApp>>>,
}

impl<S: ProcessSpawner> AppListLoader<S> {
    pub fn new(executor: Arc<ShellExecutor<S>>, self_package: impl Into<String>) -> Self {
        Self {
            executor,
            self_package: self_package.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn launcher_apps(&self, force_reload: bool, trace_id: &str) -> Result<Vec<LauncherApp>, AppError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| AppError::system("App list cache lock poisoned", trace_id))?;
        if !force_reload {
            if let Some(apps) = cache.as_ref() {
                debug!(trace_id = %trace_id, count = apps.len(), "returning cached app list");
                return Ok(apps.clone());
            }
        }

        let result = self
            .executor
            .execute_traced(&["pm list packages -f"], ShellPrivilege::User, trace_id);
        if !result.success {
            return Err(AppError::shell(
                format!(
                    "Failed to list packages (exit code {}): {}",
                    result.exit_code, result.error
                ),
                trace_id,
            ));
        }

        let mut apps = parse_pm_list_packages_output(&result.output)
            .into_iter()
            .map(|mut app| {
                app.is_arcanos_native = self.is_arcanos_native(&app.package_name);
                app
            })
            .collect::<Vec<_>>();
        apps.sort_by_key(|app| app.package_name.to_lowercase());
        apps.dedup_by(|a, b| a.package_name == b.package_name);

        info!(trace_id = %trace_id, count = apps.len(), "loaded app list");
        *cache = Some(apps.clone());
        Ok(apps)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    pub fn is_arcanos_native(&self, package_name: &str) -> bool {
        package_name == self.self_package || package_name.starts_with(NATIVE_PREFIX)
    }
}

/// Parses `pm list packages -f` lines of the form `package:<apk path>=<package>`.
pub fn parse_pm_list_packages_output(output: &str) -> Vec<LauncherApp> {
    let mut apps = Vec::new();
    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let payload = line.strip_prefix("package:").unwrap_or(line);
        let app = match payload.rsplit_once('=') {
            Some((apk_path, pkg)) => {
                let apk_path = apk_path.trim();
                let pkg = pkg.trim();
                if pkg.is_empty() {
                    continue;
                }
                LauncherApp {
                    package_name: pkg.to_string(),
                    apk_path: Some(apk_path.to_string()).filter(|path| !path.is_empty()),
                    is_system: is_system_path(apk_path),
                    is_arcanos_native: false,
                }
            }
            None => LauncherApp {
                package_name: payload.to_string(),
                apk_path: None,
                is_system: false,
                is_arcanos_native: false,
            },
        };
        apps.push(app);
    }
    apps
}

fn is_system_path(path: &str) -> bool {
    ["/system/", "/product/", "/vendor/", "/system_ext/", "/apex/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}
