//! Background process supervision
//!
//! Tracks long-running children the client has asked to supervise: spawn
//! detached, capture stdout/stderr into bounded ring buffers, list, tail,
//! and terminate with SIGTERM→SIGKILL escalation. Children are detached
//! from the server's session and survive server shutdown.

use crate::error::{McpError, Result};
use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Capacity of each captured stream, in bytes. Oldest bytes are discarded
/// once the buffer is full.
pub const CAPTURE_CAPACITY: usize = 64 * 1024;

/// Grace period between SIGTERM and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Starting,
    Running,
    Exited(i32),
    Killed,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Starting => write!(f, "starting"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited(code) => write!(f, "exited({})", code),
            ProcessStatus::Killed => write!(f, "killed"),
        }
    }
}

/// Bounded byte ring used for stream capture.
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    discarded: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            discarded: 0,
        }
    }

    /// Append bytes, discarding the oldest once over capacity.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        if self.data.len() > self.capacity {
            let excess = self.data.len() - self.capacity;
            self.data.drain(..excess);
            self.discarded += excess as u64;
        }
    }

    /// The last `tail` lines of the captured stream.
    pub fn tail_lines(&self, tail: usize) -> String {
        let text = String::from_utf8_lossy(&self.data);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(tail);
        lines[start..].join("\n")
    }

    /// Total bytes dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

/// One supervised process.
struct ProcessRecord {
    id: String,
    pid: u32,
    command: String,
    cwd: Option<PathBuf>,
    started_at: DateTime<Utc>,
    status: Arc<Mutex<ProcessStatus>>,
    stdout: Arc<Mutex<RingBuffer>>,
    stderr: Arc<Mutex<RingBuffer>>,
}

/// Immutable view of a record handed to readers.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub id: String,
    pub pid: u32,
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub status: ProcessStatus,
}

/// Tail of both captured streams.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
    pub stdout_discarded: u64,
    pub stderr_discarded: u64,
}

/// Supervisor owning the process table. The table is mutated only here;
/// readers receive snapshots.
pub struct ProcessSupervisor {
    processes: RwLock<HashMap<String, ProcessRecord>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn a detached background process under the given id. Rejects ids
    /// that are already live. The table lock is held across the spawn so two
    /// concurrent calls with the same id cannot both succeed.
    pub async fn spawn(&self, id: &str, command: &str, cwd: Option<PathBuf>) -> Result<u32> {
        let mut processes = self.processes.write().await;
        if processes.contains_key(id) {
            return Err(McpError::Conflict(format!(
                "background process id '{}' already exists",
                id
            )));
        }

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        if let Some(ref dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Detach into its own session so the child survives the server and
        // never shares our controlling terminal.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::other)?;
                Ok(())
            });
        }
        // The child is reaped by our exit-watcher task, not by dropping.
        cmd.kill_on_drop(false);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::External(format!("failed to spawn '{}': {}", command, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| McpError::Internal("spawned child has no pid".to_string()))?;

        let status = Arc::new(Mutex::new(ProcessStatus::Starting));
        let stdout_buf = Arc::new(Mutex::new(RingBuffer::new(CAPTURE_CAPACITY)));
        let stderr_buf = Arc::new(Mutex::new(RingBuffer::new(CAPTURE_CAPACITY)));

        if let Some(stream) = child.stdout.take() {
            spawn_capture(stream, Arc::clone(&stdout_buf));
        }
        if let Some(stream) = child.stderr.take() {
            spawn_capture(stream, Arc::clone(&stderr_buf));
        }

        // Spawn reported success, so the process is now running.
        *status.lock().expect("status lock") = ProcessStatus::Running;

        let record = ProcessRecord {
            id: id.to_string(),
            pid,
            command: command.to_string(),
            cwd,
            started_at: Utc::now(),
            status: Arc::clone(&status),
            stdout: stdout_buf,
            stderr: stderr_buf,
        };

        info!(id = id, pid = pid, command = command, "spawned background process");
        processes.insert(id.to_string(), record);
        drop(processes);

        // Watch for exit and record the status. The record stays queryable
        // after exit until it is explicitly removed.
        let watch_status = status;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(exit) => {
                    let code = exit.code().unwrap_or(-1);
                    let mut status = watch_status.lock().expect("status lock");
                    if *status == ProcessStatus::Running || *status == ProcessStatus::Starting {
                        *status = ProcessStatus::Exited(code);
                    }
                    debug!(pid = pid, code = code, "background process exited");
                }
                Err(e) => {
                    warn!(pid = pid, error = %e, "failed to wait on background process");
                }
            }
        });

        Ok(pid)
    }

    /// Snapshot of every record.
    pub async fn list(&self) -> Vec<ProcessSnapshot> {
        let processes = self.processes.read().await;
        let mut snapshots: Vec<ProcessSnapshot> = processes
            .values()
            .map(|record| ProcessSnapshot {
                id: record.id.clone(),
                pid: record.pid,
                command: record.command.clone(),
                cwd: record.cwd.clone(),
                started_at: record.started_at,
                status: *record.status.lock().expect("status lock"),
            })
            .collect();
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    /// Tail of the captured streams for one process. Never mutates.
    pub async fn output(&self, id: &str, tail: usize) -> Result<ProcessOutput> {
        let processes = self.processes.read().await;
        let record = processes
            .get(id)
            .ok_or_else(|| McpError::NotFound(format!("no background process with id '{}'", id)))?;

        let stdout = record.stdout.lock().expect("stdout lock");
        let stderr = record.stderr.lock().expect("stderr lock");
        let result = Ok(ProcessOutput {
            status: *record.status.lock().expect("status lock"),
            stdout: stdout.tail_lines(tail),
            stderr: stderr.tail_lines(tail),
            stdout_discarded: stdout.discarded(),
            stderr_discarded: stderr.discarded(),
        });
        result
    }

    /// Terminate a process and remove its record: SIGTERM, wait the grace
    /// period, escalate to SIGKILL if still alive.
    pub async fn kill(&self, id: &str) -> Result<ProcessStatus> {
        let (pid, status) = {
            let processes = self.processes.read().await;
            let record = processes.get(id).ok_or_else(|| {
                McpError::NotFound(format!("no background process with id '{}'", id))
            })?;
            (record.pid, Arc::clone(&record.status))
        };

        let current = *status.lock().expect("status lock");
        if matches!(current, ProcessStatus::Running | ProcessStatus::Starting) {
            let target = Pid::from_raw(pid as i32);
            if signal::kill(target, Signal::SIGTERM).is_ok() {
                let deadline = tokio::time::Instant::now() + KILL_GRACE;
                loop {
                    if !alive(target) {
                        break;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        warn!(id = id, pid = pid, "escalating to SIGKILL");
                        let _ = signal::kill(target, Signal::SIGKILL);
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
            *status.lock().expect("status lock") = ProcessStatus::Killed;
        }

        let final_status = *status.lock().expect("status lock");
        self.processes.write().await.remove(id);
        info!(id = id, pid = pid, status = %final_status, "removed background process");
        Ok(final_status)
    }

    /// Drop the record of a process that has already exited.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut processes = self.processes.write().await;
        processes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| McpError::NotFound(format!("no background process with id '{}'", id)))
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn alive(pid: Pid) -> bool {
    signal::kill(pid, None).is_ok()
}

fn spawn_capture<S>(stream: S, buffer: Arc<Mutex<RingBuffer>>)
where
    S: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => buffer.lock().expect("capture lock").push(&line),
                Err(e) => {
                    debug!(error = %e, "capture stream closed");
                    break;
                }
            }
        }
    });
}
