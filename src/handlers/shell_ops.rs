//! Shell runner: synchronous commands and scripts with timeouts
//!
//! Commands run in their own process group so a timeout can terminate the
//! whole tree. Output is capped per stream; a non-zero exit status is
//! reported as data, not as an error.

use crate::config::{DEFAULT_COMMAND_TIMEOUT_MS, MAX_COMMAND_TIMEOUT_MS};
use crate::context::ServerContext;
use crate::error::{McpError, Result};
use crate::server::result::ToolResult;
use crate::server::schema::{bool_or, optional_str, optional_u64, required_str};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Per-stream capture cap.
const OUTPUT_CAP: usize = 10 * 1024 * 1024;

/// Outcome of running a command.
struct CommandOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
    stdout_truncated: bool,
    stderr_truncated: bool,
}

/// Handle the `run_command` tool.
pub async fn handle_run_command(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let command = required_str(args, "command")?;
    let use_login_shell = bool_or(args, "use_login_shell", false);
    let timeout_ms = clamp_timeout(ctx, optional_u64(args, "timeout"));
    let cwd = resolve_cwd(ctx, optional_str(args, "cwd"))?;
    let env = env_overlay(args);

    ctx.permissions.check_command(command)?;

    let (shell, shell_args) = if use_login_shell {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        (shell, vec!["-l".to_string(), "-c".to_string()])
    } else {
        ("/bin/sh".to_string(), vec!["-c".to_string()])
    };

    let mut cmd = Command::new(&shell);
    cmd.args(&shell_args).arg(command);

    let outcome = run_with_timeout(cmd, cwd.as_deref(), &env, timeout_ms).await?;
    info!(command = command, exit = outcome.exit_code, "ran command");
    Ok(render(outcome))
}

/// Handle the `run_script` tool: the script body goes to a temp file which
/// the interpreter executes under the same contract as `run_command`.
pub async fn handle_run_script(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let script = required_str(args, "script")?;
    let interpreter = optional_str(args, "interpreter").unwrap_or("bash");
    let timeout_ms = clamp_timeout(ctx, optional_u64(args, "timeout"));
    let cwd = resolve_cwd(ctx, optional_str(args, "cwd"))?;

    ctx.permissions.check_command(interpreter)?;

    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, script.as_bytes())?;
    let script_path = file.into_temp_path();

    let mut cmd = Command::new(interpreter);
    cmd.arg(&*script_path);

    let outcome = run_with_timeout(cmd, cwd.as_deref(), &Vec::new(), timeout_ms).await?;
    info!(interpreter = interpreter, exit = outcome.exit_code, "ran script");
    Ok(render(outcome))
}

fn clamp_timeout(ctx: &ServerContext, requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS)
        .min(ctx.config.max_command_timeout_ms)
        .min(MAX_COMMAND_TIMEOUT_MS)
}

fn resolve_cwd(ctx: &ServerContext, cwd: Option<&str>) -> Result<Option<PathBuf>> {
    match cwd {
        Some(dir) => {
            let canon = ctx.permissions.check_path(Path::new(dir))?;
            if !canon.is_dir() {
                return Err(McpError::NotFound(format!(
                    "working directory does not exist: {}",
                    dir
                )));
            }
            Ok(Some(canon))
        }
        None => Ok(None),
    }
}

fn env_overlay(args: &Map<String, Value>) -> Vec<(String, String)> {
    args.get("env")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

async fn run_with_timeout(
    mut cmd: Command,
    cwd: Option<&Path>,
    env: &[(String, String)],
    timeout_ms: u64,
) -> Result<CommandOutcome> {
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // Own process group so a timeout can take down the whole command tree.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| McpError::External(format!("failed to spawn: {}", e)))?;
    let pid = child.id();

    match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await
    {
        Ok(Ok(output)) => {
            let (stdout, stdout_truncated) = cap(&output.stdout);
            let (stderr, stderr_truncated) = cap(&output.stderr);
            Ok(CommandOutcome {
                exit_code: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
                stdout_truncated,
                stderr_truncated,
            })
        }
        Ok(Err(e)) => Err(McpError::External(format!("command failed: {}", e))),
        Err(_) => {
            if let Some(pid) = pid {
                warn!(pid = pid, timeout_ms = timeout_ms, "command timed out, killing group");
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            Err(McpError::Timeout(timeout_ms))
        }
    }
}

fn cap(bytes: &[u8]) -> (String, bool) {
    if bytes.len() > OUTPUT_CAP {
        (
            String::from_utf8_lossy(&bytes[..OUTPUT_CAP]).into_owned(),
            true,
        )
    } else {
        (String::from_utf8_lossy(bytes).into_owned(), false)
    }
}

fn render(outcome: CommandOutcome) -> ToolResult {
    let mut parts = vec![format!("Exit code: {}", outcome.exit_code)];
    if !outcome.stdout.is_empty() {
        let marker = if outcome.stdout_truncated {
            " (truncated)"
        } else {
            ""
        };
        parts.push(format!("STDOUT{}:\n{}", marker, outcome.stdout));
    }
    if !outcome.stderr.is_empty() {
        let marker = if outcome.stderr_truncated {
            " (truncated)"
        } else {
            ""
        };
        parts.push(format!("STDERR{}:\n{}", marker, outcome.stderr));
    }
    ToolResult::text(parts.join("\n\n"))
}
