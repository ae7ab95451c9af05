//! External command dispatch
//!
//! All external programs go through `run_step` so that every call:
//!
//! - runs in its own process group registered with `ChildRegistry`
//! - has stdout/stderr captured and echoed to the console
//! - is bounded by a timeout, after which the process group is killed and
//!   the call yields `Ok(None)` instead of an error
//! - aborts the run (`DeployError::CriticalStep`) only when marked critical
//!
//! There is no retry and no backoff.

use crate::error::{DeployError, Result};
use crate::process_guard::{self, ChildRegistry, CommandProcessGroup};
use crate::step_traits::StepCommand;
use crate::types::StepOutcome;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout applied when a caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_GRACE: Duration = Duration::from_secs(2);

/// How a single command should be executed
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Kill the command after this long; `None` waits forever
    pub timeout: Option<Duration>,
    /// Failure aborts the whole run
    pub critical: bool,
    /// Log the command instead of executing it
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            critical: false,
            dry_run: false,
        }
    }
}

impl RunOptions {
    pub fn best_effort(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn critical(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            critical: true,
            ..Self::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Output from a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal or never started).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    fn dry_run() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    fn spawn_failure(err: &std::io::Error) -> Self {
        Self {
            stdout: String::new(),
            stderr: err.to_string(),
            exit_code: None,
            success: false,
        }
    }
}

/// Run a command and wait for it.
///
/// # Returns
///
/// - `Ok(Some(output))` - the command finished (successfully or not)
/// - `Ok(None)` - the command hit its timeout and was killed
/// - `Err(CriticalStep | Spawn)` - a critical command failed
pub fn run_step<T: StepCommand + ?Sized>(
    cmd: &T,
    opts: &RunOptions,
) -> Result<Option<CommandOutput>> {
    let line = cmd.command_line();
    println!("\n--- Running: {}", line);

    if opts.dry_run {
        info!("[dry-run] would run: {}", line);
        return Ok(Some(CommandOutput::dry_run()));
    }

    info!(command = %line, critical = opts.critical, "running command");

    let mut command = Command::new(cmd.program());
    command
        .args(cmd.args())
        .envs(cmd.env_vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn {}: {}", cmd.program(), e);
            println!("Failed to start {}: {}", cmd.program(), e);
            if opts.critical {
                println!("Command failed and is critical; aborting.");
                return Err(DeployError::Spawn {
                    program: cmd.program().to_string(),
                    source: e,
                });
            }
            return Ok(Some(CommandOutput::spawn_failure(&e)));
        }
    };

    let Some(output) = wait_with_timeout(child, opts.timeout)? else {
        println!("Timed out after {}s: {}", opts.timeout.map_or(0, |t| t.as_secs()), line);
        warn!(command = %line, "command timed out");
        return Ok(None);
    };

    echo_output(&output);

    if !output.success {
        info!(command = %line, exit_code = ?output.exit_code, "command failed");
        if opts.critical {
            println!("Command failed and is critical; aborting.");
            return Err(DeployError::critical_step(line, output.exit_code));
        }
    } else {
        debug!(command = %line, "command succeeded");
    }

    Ok(Some(output))
}

/// Map a `run_step` result to the outcome recorded for its step.
pub fn outcome_of(result: Option<CommandOutput>) -> StepOutcome {
    match result {
        None => StepOutcome::TimedOut,
        Some(out) if out.success => StepOutcome::Succeeded,
        Some(_) => StepOutcome::Failed,
    }
}

/// Spawn a command without waiting for it (browser launch).
///
/// The child is placed in its own process group but is neither registered
/// nor given a parent-death signal, so it outlives the deployer.
pub fn spawn_detached<T: StepCommand + ?Sized>(cmd: &T, dry_run: bool) -> Result<bool> {
    use std::os::unix::process::CommandExt;

    let line = cmd.command_line();
    println!("\n--- Launching: {}", line);

    if dry_run {
        info!("[dry-run] would launch: {}", line);
        return Ok(true);
    }

    let spawned = Command::new(cmd.program())
        .args(cmd.args())
        .envs(cmd.env_vars())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn();

    match spawned {
        Ok(child) => {
            info!(command = %line, pid = child.id(), "launched detached command");
            Ok(true)
        }
        Err(e) => {
            warn!("Failed to launch {}: {}", cmd.program(), e);
            println!("Failed to launch {}: {}", cmd.program(), e);
            Ok(false)
        }
    }
}

/// Wait for `child`, draining its pipes on reader threads.
fn wait_with_timeout(mut child: Child, timeout: Option<Duration>) -> Result<Option<CommandOutput>> {
    let pid = child.id();
    register(pid);

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    // A timeout too large to represent is treated as no timeout
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                unregister(pid);
                return Err(e.into());
            }
        }

        if past(deadline) {
            process_guard::terminate_process_group(pid, KILL_GRACE);
            let _ = child.kill();
            let _ = child.wait();
            unregister(pid);
            // Reader threads are left to finish on their own; a grandchild
            // that escaped the group may still hold the pipe open.
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    };

    // The leader is reaped, but a background grandchild can still hold the
    // pipes open; the deadline covers draining them too.
    while !readers_finished(&stdout_reader, &stderr_reader) {
        if past(deadline) {
            process_guard::terminate_orphaned_group(pid, KILL_GRACE);
            unregister(pid);
            return Ok(None);
        }
        if deadline.is_none() {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    unregister(pid);

    Ok(Some(CommandOutput {
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
        exit_code: status.code(),
        success: status.success(),
    }))
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn readers_finished(stdout: &Option<JoinHandle<Vec<u8>>>, stderr: &Option<JoinHandle<Vec<u8>>>) -> bool {
    [stdout, stderr]
        .into_iter()
        .all(|reader| reader.as_ref().is_none_or(JoinHandle::is_finished))
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn register(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }
}

fn unregister(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

/// Console echo of a finished command, trimmed like the step log expects.
fn echo_output(output: &CommandOutput) {
    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();
    if !stdout.is_empty() {
        println!("{}", stdout);
    }
    if !stderr.is_empty() {
        println!("{}", stderr);
    }
    match output.exit_code {
        Some(code) => println!("Exit code: {}", code),
        None => println!("Exit code: none (terminated by signal)"),
    }
}
