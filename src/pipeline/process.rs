//! External process supervision
//!
//! [`ManagedProcess`] owns one spawned OS process. Its stdout and stderr are
//! pumped line by line into a channel by a background task, so the caller
//! never blocks beyond the spawn itself. Every child is started as the leader
//! of its own process group so that [`ManagedProcess::kill_tree`] reaches
//! anything it forked as well.

use crate::error::{CachepackError, CachepackResult};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of process output, without its trailing newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Terminal status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ProcessExit {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Terminating signal, if the process was killed (unix only)
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Liveness of a managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(ProcessExit),
}

/// Event produced while a process runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputLine),
    /// Always the last event, delivered exactly once
    Exited(ProcessExit),
}

/// Program and arguments to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    program: String,
    args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A spawned process and the receiving end of its output
pub struct ManagedProcess {
    command: String,
    child: Child,
    pid: Option<u32>,
    output: Option<mpsc::UnboundedReceiver<OutputLine>>,
    state: ProcessState,
    exit_reported: bool,
    tree_signalled: bool,
}

impl ManagedProcess {
    /// Spawn `spec` with piped stdout/stderr and start pumping its output
    pub fn spawn(spec: &ProcessSpec) -> CachepackResult<Self> {
        let command = spec.to_string();
        debug!("Spawning: {}", command);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| CachepackError::command_failed(command.clone(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CachepackError::Internal(format!("stdout not piped for {}", command)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CachepackError::Internal(format!("stderr not piped for {}", command)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_output(stdout, stderr, tx));

        Ok(Self {
            command,
            pid: child.id(),
            child,
            output: Some(rx),
            state: ProcessState::Running,
            exit_reported: false,
            tree_signalled: false,
        })
    }

    /// Command line this process was started with
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Take the output channel, e.g. to relay it from another task.
    ///
    /// Once taken, [`next_event`](Self::next_event) only yields the exit.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<OutputLine>> {
        self.output.take()
    }

    /// Next output line, or the exit once both pipes are drained.
    ///
    /// Returns `Ok(None)` after the exit event has been delivered.
    pub async fn next_event(&mut self) -> CachepackResult<Option<ProcessEvent>> {
        if let Some(rx) = self.output.as_mut() {
            if let Some(line) = rx.recv().await {
                return Ok(Some(ProcessEvent::Output(line)));
            }
            self.output = None;
        }

        if self.exit_reported {
            return Ok(None);
        }

        let exit = self.wait().await?;
        self.exit_reported = true;
        Ok(Some(ProcessEvent::Exited(exit)))
    }

    /// Feed every output line to `on_line` and return the exit status
    pub async fn run_to_exit(
        &mut self,
        mut on_line: impl FnMut(OutputLine),
    ) -> CachepackResult<ProcessExit> {
        while let Some(event) = self.next_event().await? {
            match event {
                ProcessEvent::Output(line) => on_line(line),
                ProcessEvent::Exited(exit) => return Ok(exit),
            }
        }
        self.wait().await
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> CachepackResult<ProcessExit> {
        if let ProcessState::Exited(exit) = self.state {
            return Ok(exit);
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| CachepackError::io(format!("waiting for {}", self.command), e))?;

        let exit = ProcessExit::from_status(status);
        debug!("{} finished with {}", self.command, exit);
        self.state = ProcessState::Exited(exit);
        Ok(exit)
    }

    /// Forcefully kill the process and everything it spawned, then wait for it.
    ///
    /// Safe to call on a process that has already exited.
    pub async fn kill_tree(&mut self) -> CachepackResult<ProcessExit> {
        if !self.tree_signalled {
            self.tree_signalled = true;
            if let Some(pid) = self.pid {
                debug!("Killing process tree of {} (pid {})", self.command, pid);
                if let Err(e) = signal_tree(pid).await {
                    warn!("Tree kill failed for pid {}: {}, killing leader only", pid, e);
                    if let Err(e) = self.child.start_kill() {
                        debug!("Leader kill for pid {} failed: {}", pid, e);
                    }
                }
            }
        }

        self.wait().await
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if self.state != ProcessState::Running || self.tree_signalled {
            return;
        }
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                if let Err(e) = signal_group(pid) {
                    debug!("Group kill on drop failed for pid {}: {}", pid, e);
                }
            }
        }
        #[cfg(windows)]
        {
            if let Some(pid) = self.pid {
                let status = std::process::Command::new("taskkill")
                    .args(["/pid", &pid.to_string(), "/f", "/t"])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                if let Err(e) = status {
                    debug!("taskkill on drop failed for pid {}: {}", pid, e);
                }
            }
        }
        // kill_on_drop reaps the leader on every platform
    }
}

/// Stream stdout+stderr lines into `tx` until both pipes close.
///
/// Keeps draining after the receiver is gone so the child never blocks on a
/// full pipe. Lines are decoded lossily; a byte sequence that is not UTF-8
/// never stops the pump.
async fn pump_output<O, E>(stdout: O, stderr: E, tx: mpsc::UnboundedSender<OutputLine>)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);
    // Partial lines survive a cancelled read_until, so buffers are only
    // cleared once a line has been sent
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            read = stdout_reader.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                stdout_done = forward_line(read, &mut stdout_buf, OutputStream::Stdout, &tx);
            }
            read = stderr_reader.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                stderr_done = forward_line(read, &mut stderr_buf, OutputStream::Stderr, &tx);
            }
        }
    }
}

/// Send the buffered line, if any. Returns whether the pipe is finished.
fn forward_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    stream: OutputStream,
    tx: &mpsc::UnboundedSender<OutputLine>,
) -> bool {
    let finished = match read {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => {
            warn!("Reading child {:?} failed: {}", stream, e);
            true
        }
    };

    if !buf.is_empty() {
        let _ = tx.send(OutputLine {
            stream,
            text: decode_line(buf),
        });
        buf.clear();
    }
    finished
}

/// Strip the line ending and decode, replacing invalid UTF-8
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(unix)]
async fn signal_tree(pid: u32) -> std::io::Result<()> {
    signal_group(pid)
}

#[cfg(windows)]
async fn signal_tree(pid: u32) -> std::io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/f", "/t"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("taskkill exited with {}", status)))
    }
}

/// SIGKILL the process group led by `pid`. A group that is already gone is not an error.
#[cfg(unix)]
fn signal_group(pid: u32) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::other(format!("pid {} out of range", pid)))?;

    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid targets the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
