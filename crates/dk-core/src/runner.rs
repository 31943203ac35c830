//! External process runner with timeout and output cap.
//!
//! The runner never fails: non-zero exits are results, and spawn failures
//! or missing exit codes (signal death, timeout kill) are normalized to exit
//! code 1 with the reason appended to stderr. Each stream is drained on its
//! own reader thread so a chatty child can't deadlock on a full pipe.
//!
//! On unix the child leads its own process group. A timeout signals the
//! whole group, so `dotkc run -- <cmd>` takes `<cmd>` down with it.

use crate::error::GuardError;
use dk_redact::ExternalResult;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};

/// Default maximum bytes kept per stream (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Exit code reported when the real one is unavailable.
pub const FALLBACK_EXIT_CODE: i32 = 1;

/// How long to wait for reader threads once the child is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time between SIGTERM and SIGKILL on timeout.
const SIGTERM_GRACE: Duration = Duration::from_millis(200);

/// One external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Text written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            cwd: None,
            timeout,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Anything that can turn an [`Invocation`] into an [`ExternalResult`].
pub trait Invoke: Send + Sync {
    fn invoke(&self, invocation: &Invocation) -> ExternalResult;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the bytes kept per stream. Excess output is read and discarded.
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, GuardError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|e| GuardError::Spawn {
            command: invocation.program.clone(),
            reason: e.to_string(),
        })
    }

    fn execute(&self, child: &mut Child, invocation: &Invocation, start: Instant) -> Captured {
        if let (Some(text), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            let text = text.clone();
            // Separate thread: a child that never reads must not block us.
            thread::spawn(move || {
                let _ = stdin.write_all(text.as_bytes());
            });
        }

        let stdout_reader = StreamReader::spawn(child.stdout.take(), self.max_output_bytes);
        let stderr_reader = StreamReader::spawn(child.stderr.take(), self.max_output_bytes);

        let deadline = start + invocation.timeout;
        let mut timed_out = false;
        let mut wait_error = None;
        let exit_code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) if Instant::now() >= deadline => {
                    timed_out = true;
                    warn!(
                        timeout_ms = invocation.timeout.as_millis() as u64,
                        "process timed out, killing"
                    );
                    break kill_with_grace(child);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    wait_error = Some(e.to_string());
                    break None;
                }
            }
        };

        Captured {
            exit_code,
            stdout: stdout_reader.collect(),
            stderr: stderr_reader.collect(),
            timed_out,
            wait_error,
        }
    }
}

struct Captured {
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timed_out: bool,
    wait_error: Option<String>,
}

impl Invoke for ProcessRunner {
    #[instrument(
        skip(self, invocation),
        fields(program = %invocation.program, args = invocation.args.len())
    )]
    fn invoke(&self, invocation: &Invocation) -> ExternalResult {
        debug!(
            timeout_ms = invocation.timeout.as_millis() as u64,
            has_stdin = invocation.stdin.is_some(),
            "running external command"
        );
        let start = Instant::now();

        let mut child = match self.spawn(invocation) {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "spawn failed");
                return ExternalResult::new(FALLBACK_EXIT_CODE, "", e.to_string())
                    .with_elapsed(start.elapsed());
            }
        };

        let captured = self.execute(&mut child, invocation, start);
        let elapsed = start.elapsed();

        let mut stderr = String::from_utf8_lossy(&captured.stderr).into_owned();
        if captured.timed_out {
            append_line(
                &mut stderr,
                &format!(
                    "{}: timed out after {}ms and was killed",
                    invocation.program,
                    invocation.timeout.as_millis()
                ),
            );
        } else if let Some(e) = &captured.wait_error {
            append_line(&mut stderr, &format!("{}: wait failed: {}", invocation.program, e));
        } else if captured.exit_code.is_none() {
            append_line(
                &mut stderr,
                &format!("{}: terminated without an exit code", invocation.program),
            );
        }
        let exit_code = captured.exit_code.unwrap_or(FALLBACK_EXIT_CODE);

        info!(
            exit_code,
            duration_ms = elapsed.as_millis() as u64,
            stdout_bytes = captured.stdout.len(),
            stderr_bytes = stderr.len(),
            timed_out = captured.timed_out,
            "external command complete"
        );

        ExternalResult::new(
            exit_code,
            String::from_utf8_lossy(&captured.stdout).into_owned(),
            stderr,
        )
        .with_elapsed(elapsed)
    }
}

/// Kill the child's process group: SIGTERM, a short grace, then SIGKILL.
///
/// SIGKILL goes to the group even when the leader already exited, since
/// grandchildren may ignore SIGTERM.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) -> Option<i32> {
    let pgid = child.id() as libc::pid_t;

    // SAFETY: signalling a process group we created; no memory is shared.
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }
    debug!(pgid, "sent SIGTERM to process group");

    let deadline = Instant::now() + SIGTERM_GRACE;
    let mut status = None;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(s)) => {
                trace!(pgid, "process exited after SIGTERM");
                status = Some(s);
                break;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(_) => break,
        }
    }

    // SAFETY: as above.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    match status {
        Some(s) => s.code(),
        None => {
            warn!(pgid, "process group did not exit after SIGTERM, sent SIGKILL");
            child.wait().ok().and_then(|s| s.code())
        }
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) -> Option<i32> {
    let _ = child.kill();
    child.wait().ok().and_then(|s| s.code())
}

/// Drains one stream on its own thread, keeping at most `max` bytes.
///
/// Bytes land in the shared buffer as they arrive, so a reader that never
/// sees EOF still hands back what it has read so far.
struct StreamReader {
    kept: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl StreamReader {
    fn spawn<R>(stream: Option<R>, max: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let kept = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        match stream {
            Some(mut stream) => {
                let buf = Arc::clone(&kept);
                thread::spawn(move || {
                    let mut chunk = [0u8; 8192];
                    loop {
                        match stream.read(&mut chunk) {
                            Ok(0) => break,
                            Ok(n) => {
                                let mut kept = lock(&buf);
                                let space = max.saturating_sub(kept.len());
                                kept.extend_from_slice(&chunk[..n.min(space)]);
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                            Err(_) => break,
                        }
                    }
                    let _ = tx.send(());
                });
            }
            None => {
                let _ = tx.send(());
            }
        }
        Self { kept, done }
    }

    /// Wait up to [`READER_GRACE`] for EOF, then take whatever was read.
    fn collect(self) -> Vec<u8> {
        if self.done.recv_timeout(READER_GRACE).is_err() {
            debug!("reader still open after grace, keeping partial output");
        }
        let mut kept = lock(&self.kept);
        std::mem::take(&mut *kept)
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}
