use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};

/// A spawned shell with piped stdio.
///
/// Each stream can be taken once. `destroy` must be safe to call after the
/// process has already exited and been waited on.
pub trait ShellProcess: Send {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>>;
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;
    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;
    /// Blocks until exit. `None` when the process ended without an exit code.
    fn wait(&mut self) -> io::Result<Option<i32>>;
    fn destroy(&mut self);
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, program: &str) -> io::Result<Box<dyn ShellProcess>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, program: &str) -> io::Result<Box<dyn ShellProcess>> {
        let child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(Box::new(SystemProcess { child }))
    }
}

struct SystemProcess {
    child: Child,
}

impl ShellProcess for SystemProcess {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as Box<dyn Write + Send>)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Box<dyn Read + Send>)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().map(|status| status.code())
    }

    fn destroy(&mut self) {
        // Pipes close when the handles drop; only a still-running child needs killing.
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
