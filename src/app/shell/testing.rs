//! Recording `ProcessSpawner` for tests: captures what was written to stdin,
//! replays scripted output, and counts `destroy` calls.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use crate::app::shell::process::{ProcessSpawner, ShellProcess};

#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl ScriptedReply {
    pub fn new(stdout: &str, stderr: &str, exit_code: Option<i32>) -> Self {
        Self::from_bytes(stdout.as_bytes().to_vec(), stderr.as_bytes().to_vec(), exit_code)
    }

    pub fn from_bytes(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    pub fn ok(stdout: &str) -> Self {
        Self::new(stdout, "", Some(0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub programs: Vec<String>,
    pub scripts: Vec<String>,
    pub spawned: usize,
    pub destroyed: usize,
}

impl Recorded {
    /// Command lines of the nth invocation, without the trailing `exit`.
    pub fn commands(&self, index: usize) -> Vec<String> {
        let mut lines = self.scripts[index]
            .lines()
            .map(|line| line.to_string())
            .collect::<Vec<_>>();
        if lines.last().map(|line| line == "exit").unwrap_or(false) {
            lines.pop();
        }
        lines
    }
}

#[derive(Default)]
struct SpawnerState {
    recorded: Recorded,
    buffers: Vec<Arc<Mutex<Vec<u8>>>>,
    replies: VecDeque<ScriptedReply>,
    spawn_error: Option<io::ErrorKind>,
    stdin_error: Option<io::ErrorKind>,
}

#[derive(Clone, Default)]
pub struct RecordingSpawner {
    state: Arc<Mutex<SpawnerState>>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies are consumed in order; once exhausted every spawn exits 0 silently.
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.lock().replies.push_back(reply);
    }

    pub fn fail_spawn(&self, kind: io::ErrorKind) {
        self.lock().spawn_error = Some(kind);
    }

    pub fn fail_stdin(&self, kind: io::ErrorKind) {
        self.lock().stdin_error = Some(kind);
    }

    pub fn recorded(&self) -> Recorded {
        let state = self.lock();
        let mut recorded = state.recorded.clone();
        recorded.scripts = state
            .buffers
            .iter()
            .map(|buffer| String::from_utf8_lossy(&buffer.lock().expect("stdin buffer")).to_string())
            .collect();
        recorded
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpawnerState> {
        self.state.lock().expect("spawner state")
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&self, program: &str) -> io::Result<Box<dyn ShellProcess>> {
        let mut state = self.lock();
        if let Some(kind) = state.spawn_error {
            return Err(io::Error::new(kind, format!("cannot spawn {program}")));
        }
        state.recorded.programs.push(program.to_string());
        state.recorded.spawned += 1;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        state.buffers.push(Arc::clone(&buffer));
        let reply = state
            .replies
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::ok(""));

        let stdin: Box<dyn Write + Send> = match state.stdin_error {
            Some(kind) => Box::new(FailingWriter(kind)),
            None => Box::new(SharedWriter(buffer)),
        };

        Ok(Box::new(FakeProcess {
            stdin: Some(stdin),
            stdout: Some(Box::new(Cursor::new(reply.stdout))),
            stderr: Some(Box::new(Cursor::new(reply.stderr))),
            exit_code: reply.exit_code,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeProcess {
    stdin: Option<Box<dyn Write + Send>>,
    stdout: Option<Box<dyn Read + Send>>,
    stderr: Option<Box<dyn Read + Send>>,
    exit_code: Option<i32>,
    state: Arc<Mutex<SpawnerState>>,
}

impl ShellProcess for FakeProcess {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.stdin.take()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr.take()
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.exit_code)
    }

    fn destroy(&mut self) {
        self.state.lock().expect("spawner state").recorded.destroyed += 1;
    }
}

struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("stdin buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingWriter(io::ErrorKind);

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(self.0, "stdin closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
