use serde::{Deserialize, Serialize};

/// Exit code reported when the shell never produced one: spawn or pipe failures,
/// or a child terminated by a signal.
pub const FAILURE_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
    pub error: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, output: &str, error: &str) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
            output: output.trim().to_string(),
            error: error.trim().to_string(),
        }
    }

    pub fn failure(error: &str) -> Self {
        Self::new(FAILURE_EXIT_CODE, "", error)
    }

    /// Output followed by error text, for callers that surface both to a user.
    pub fn combined_output(&self) -> String {
        match (self.output.is_empty(), self.error.is_empty()) {
            (_, true) => self.output.clone(),
            (true, false) => self.error.clone(),
            (false, false) => format!("{}\n{}", self.output, self.error),
        }
    }
}
