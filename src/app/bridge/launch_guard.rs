use std::collections::HashSet;

use tracing::{debug, warn};

use crate::app::config::LauncherSettings;
use crate::app::models::LaunchVerdict;

/// Pre-launch blocklist check. It cannot stop a process that is already
/// running; it only refuses to start a blocked package.
pub struct LaunchGuard {
    self_package: String,
    blocked: HashSet<String>,
}

impl LaunchGuard {
    pub fn new(settings: &LauncherSettings) -> Self {
        Self {
            self_package: settings.self_package.trim().to_string(),
            blocked: settings
                .blocked_packages
                .iter()
                .map(|pkg| pkg.trim().to_string())
                .filter(|pkg| !pkg.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, package_name: &str, trace_id: &str) -> LaunchVerdict {
        let package_name = package_name.trim();
        if package_name == self.self_package {
            return LaunchVerdict::Allowed;
        }
        if self.blocked.contains(package_name) {
            warn!(trace_id = %trace_id, package = %package_name, "blocked launch of flagged package");
            return LaunchVerdict::Blocked {
                package_name: package_name.to_string(),
            };
        }
        debug!(trace_id = %trace_id, package = %package_name, "launch allowed");
        LaunchVerdict::Allowed
    }
}
