use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::app::config::ShellSettings;
use crate::app::shell::process::{ProcessSpawner, ShellProcess, SystemSpawner};
use crate::app::shell::result::{CommandResult, FAILURE_EXIT_CODE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellPrivilege {
    #[default]
    User,
    Root,
}

impl ShellPrivilege {
    pub fn from_root_flag(use_root: bool) -> Self {
        if use_root {
            Self::Root
        } else {
            Self::User
        }
    }
}

/// Runs command lines through one shell process per call.
///
/// Holds no per-invocation state, so one instance can be shared across threads;
/// every call gets its own process.
pub struct ShellExecutor<S = SystemSpawner> {
    spawner: S,
    user_shell: String,
    root_shell: String,
}

impl ShellExecutor<SystemSpawner> {
    pub fn new(settings: &ShellSettings) -> Self {
        Self::with_spawner(SystemSpawner, settings)
    }
}

impl Default for ShellExecutor<SystemSpawner> {
    fn default() -> Self {
        Self::new(&ShellSettings::default())
    }
}

impl<S: ProcessSpawner> ShellExecutor<S> {
    pub fn with_spawner(spawner: S, settings: &ShellSettings) -> Self {
        Self {
            spawner,
            user_shell: settings.user_shell.clone(),
            root_shell: settings.root_shell.clone(),
        }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn shell_program(&self, privilege: ShellPrivilege) -> &str {
        match privilege {
            ShellPrivilege::User => &self.user_shell,
            ShellPrivilege::Root => &self.root_shell,
        }
    }

    pub fn execute<C: AsRef<str>>(&self, commands: &[C], privilege: ShellPrivilege) -> CommandResult {
        let trace_id = Uuid::new_v4().to_string();
        self.execute_traced(commands, privilege, &trace_id)
    }

    /// Never fails: spawn and pipe errors come back as a result with
    /// `exit_code == FAILURE_EXIT_CODE` and the description in `error`.
    pub fn execute_traced<C: AsRef<str>>(
        &self,
        commands: &[C],
        privilege: ShellPrivilege,
        trace_id: &str,
    ) -> CommandResult {
        let program = self.shell_program(privilege);
        let mut stdout = String::new();
        let mut stderr = String::new();

        let mut script = String::new();
        for command in commands {
            let command = command.as_ref();
            debug!(trace_id = %trace_id, program = %program, command = %command, "queue shell command");
            script.push_str(command);
            script.push('\n');
        }
        script.push_str("exit\n");

        let exit_code = match self.run_script(program, &script, &mut stdout, &mut stderr, trace_id) {
            Ok(Some(code)) => code,
            Ok(None) => {
                stderr.push_str("Shell terminated without an exit code\n");
                FAILURE_EXIT_CODE
            }
            Err(err) => {
                error!(trace_id = %trace_id, program = %program, error = %err, "shell execution failed");
                stderr.push_str(&format!("Shell execution failed: {err}"));
                FAILURE_EXIT_CODE
            }
        };

        let result = CommandResult::new(exit_code, &stdout, &stderr);
        if !result.success {
            error!(
                trace_id = %trace_id,
                program = %program,
                exit_code = result.exit_code,
                error = %result.error,
                "shell commands failed"
            );
        }
        result
    }

    fn run_script(
        &self,
        program: &str,
        script: &str,
        stdout: &mut String,
        stderr: &mut String,
        trace_id: &str,
    ) -> io::Result<Option<i32>> {
        let mut process = ProcessGuard(self.spawner.spawn(program)?);

        let stdin = process
            .0
            .take_stdin()
            .ok_or_else(|| io::Error::other("Failed to capture stdin"))?;
        let stdout_reader = process
            .0
            .take_stdout()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;
        let stderr_reader = process
            .0
            .take_stderr()
            .ok_or_else(|| io::Error::other("Failed to capture stderr"))?;

        // Both streams drain on their own threads so a chatty child cannot fill
        // one pipe while we block on the other.
        let stdout_handle = std::thread::spawn(move || drain_lines(stdout_reader));
        let stderr_handle = std::thread::spawn(move || drain_lines(stderr_reader));

        let write_result = write_script(stdin, script, trace_id);

        let (out_text, out_err) = join_reader(stdout_handle);
        stdout.push_str(&out_text);
        let (err_text, err_err) = join_reader(stderr_handle);
        stderr.push_str(&err_text);

        let status = process.0.wait();
        write_result?;
        if let Some(err) = out_err.or(err_err) {
            return Err(err);
        }
        status
    }
}

/// Destroys the process on every exit path out of `run_script`.
struct ProcessGuard(Box<dyn ShellProcess>);

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

/// Dropping `stdin` on return closes it, which is what lets the shell see EOF.
fn write_script(mut stdin: Box<dyn Write + Send>, script: &str, trace_id: &str) -> io::Result<()> {
    let written = stdin
        .write_all(script.as_bytes())
        .and_then(|_| stdin.flush());
    match written {
        // The shell stopped reading early (an `exit` inside the script); its exit code
        // is still the real outcome.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            debug!(trace_id = %trace_id, "shell closed stdin before the script was fully written");
            Ok(())
        }
        other => other,
    }
}

fn drain_lines(reader: Box<dyn Read + Send>) -> (String, Option<io::Error>) {
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut line = Vec::<u8>::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return (captured, None),
            Ok(_) => {
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                captured.push_str(&String::from_utf8_lossy(&line));
                captured.push('\n');
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return (captured, Some(err)),
        }
    }
}

fn join_reader(handle: JoinHandle<(String, Option<io::Error>)>) -> (String, Option<io::Error>) {
    handle
        .join()
        .unwrap_or_else(|_| (String::new(), Some(io::Error::other("Output reader thread panicked"))))
}
