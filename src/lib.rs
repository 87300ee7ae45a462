pub mod app;

pub use app::error::AppError;
pub use app::shell::{CommandResult, ShellExecutor, ShellPrivilege, FAILURE_EXIT_CODE};
pub use app::state::BridgeState;
