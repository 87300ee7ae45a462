pub mod executor;
pub mod process;
pub mod result;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{ShellExecutor, ShellPrivilege};
pub use process::{ProcessSpawner, ShellProcess, SystemSpawner};
pub use result::{CommandResult, FAILURE_EXIT_CODE};
