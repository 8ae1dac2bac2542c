use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::app::error::AppError;
use crate::app::models::StreamKind;

/// Incremental output from a streaming child process. Chunks are delivered in
/// generation order within each stream; no ordering holds between streams.
/// `Exited` is the terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { stream: StreamKind, chunk: String },
    Exited { exit_code: Option<i32> },
}

/// Live handle to a spawned child. Dropping the handle does not stop the
/// process; `kill` does, synchronously.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Arc<Mutex<Option<Child>>>,
}

impl ProcessHandle {
    /// Terminates the child and reaps it. The monitor thread still delivers
    /// the terminal `Exited` event afterwards, so callers observe a killed
    /// process exactly like an abnormal exit.
    pub fn kill(&self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Spawns `program args…` with piped stdio and streams its output through
/// `on_event` as it becomes available. A failure to launch is reported
/// synchronously as ERR_LAUNCH; nothing is ever delivered through `on_event`
/// in that case.
pub fn spawn_streaming(
    program: &str,
    args: &[String],
    trace_id: &str,
    on_event: impl Fn(ProcessEvent) + Send + Sync + 'static,
) -> Result<ProcessHandle, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::launch(format!("Failed to launch {program}: {err}"), trace_id)
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let sink: Arc<dyn Fn(ProcessEvent) + Send + Sync> = Arc::new(on_event);
    let child_slot = Arc::new(Mutex::new(Some(child)));

    let stdout_reader = spawn_reader(StreamKind::Stdout, stdout, Arc::clone(&sink));
    let stderr_reader = spawn_reader(StreamKind::Stderr, stderr, Arc::clone(&sink));

    let monitor_slot = Arc::clone(&child_slot);
    let monitor_trace = trace_id.to_string();
    thread::spawn(move || {
        // Both pipes hit EOF once the child exits (or is killed), so joining
        // the readers first guarantees every Output precedes Exited.
        let _ = stdout_reader.join();
        let _ = stderr_reader.join();

        let taken = monitor_slot.lock().ok().and_then(|mut guard| guard.take());
        let exit_code = match taken {
            Some(mut child) => match child.wait() {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(trace_id = %monitor_trace, error = %err, "failed to reap child process");
                    None
                }
            },
            None => None,
        };
        sink(ProcessEvent::Exited { exit_code });
    });

    Ok(ProcessHandle { child: child_slot })
}

fn spawn_reader(
    stream: StreamKind,
    mut pipe: impl Read + Send + 'static,
    sink: Arc<dyn Fn(ProcessEvent) + Send + Sync>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match pipe.read(&mut buffer) {
                Ok(0) => break,
                Ok(count) => {
                    let chunk = String::from_utf8_lossy(&buffer[..count]).to_string();
                    sink(ProcessEvent::Output { stream, chunk });
                }
                Err(_) => break,
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// One-shot runner for short host commands (the adb availability probe).
/// Output is drained concurrently so a chatty child cannot block on a full
/// pipe and get misreported as a timeout.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::launch(format!("Failed to launch {program}: {err}"), trace_id)
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let drain = |mut pipe: Box<dyn Read + Send>| {
        thread::spawn(move || {
            let mut collected = Vec::<u8>::new();
            let mut buffer = [0u8; 4096];
            loop {
                match pipe.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(count) => collected.extend_from_slice(&buffer[..count]),
                    Err(_) => break,
                }
            }
            collected
        })
    };
    let stdout_handle = drain(Box::new(stdout));
    let stderr_handle = drain(Box::new(stderr));

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::system("Command timed out", trace_id));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

/// Runs `<program> version` and returns its first output line, for surfacing
/// which adb the session is about to drive.
pub fn probe_adb_version(program: &str, trace_id: &str) -> Result<String, AppError> {
    let output = run_command_with_timeout(
        program,
        &["version".to_string()],
        Duration::from_secs(5),
        trace_id,
    )?;
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
        .ok_or_else(|| AppError::system("adb version produced no output", trace_id))
}
