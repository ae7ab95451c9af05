//! Process lifecycle management for child processes
//!
//! Every external command a deployment runs (git, unzip, mysql, systemctl...)
//! is spawned in its own process group and tracked here, so that:
//! - a command that exceeds its timeout can be torn down with its whole tree
//! - SIGINT/SIGTERM/SIGHUP on the deployer terminates in-flight children
//! - the scratch clone directory is removed even when a signal ends the run
//!
//! Children get SIGTERM first and a grace period before SIGKILL.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking spawned child processes and scratch directories
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Set of child PIDs currently running
    pids: HashSet<u32>,
    /// Directories to remove if the run is interrupted
    scratch_dirs: Vec<PathBuf>,
    /// Whether cleanup has already been initiated (prevent double-cleanup)
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    /// Get count of tracked children
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Track a directory that must not outlive an interrupted run
    pub fn register_scratch_dir(&mut self, path: &Path) {
        self.scratch_dirs.push(path.to_path_buf());
    }

    pub fn unregister_scratch_dir(&mut self, path: &Path) {
        self.scratch_dirs.retain(|p| p != path);
    }

    /// Best-effort removal of all registered scratch directories
    pub fn remove_scratch_dirs(&mut self) {
        for dir in self.scratch_dirs.drain(..) {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!("Failed to remove scratch directory {}: {}", dir.display(), e);
            }
        }
    }

    /// Terminate all tracked child processes
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            tracing::debug!("No child processes to terminate");
            return;
        }

        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            signal_group_or_pid(pid, Signal::SIGTERM);
        }

        if wait_until_dead(&pids_to_kill, grace_period) {
            tracing::info!("All child processes terminated gracefully");
            self.pids.clear();
            return;
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                signal_group_or_pid(pid, Signal::SIGKILL);
            }
        }

        self.pids.clear();
        tracing::info!("Child process cleanup complete");
    }
}

/// Tear down a single child's process group (used on command timeout).
///
/// The caller still owns the `Child` and must reap it afterwards.
pub fn terminate_process_group(pid: u32, grace_period: Duration) {
    signal_group_or_pid(pid, Signal::SIGTERM);
    if !wait_until_dead(&[pid], grace_period) {
        tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
        signal_group_or_pid(pid, Signal::SIGKILL);
    }
}

/// Tear down what is left of a group whose leader has already been reaped.
///
/// The leader PID may no longer exist, so liveness is judged by the group.
pub fn terminate_orphaned_group(pgid: u32, grace_period: Duration) {
    if send_signal_to_group(pgid, Signal::SIGTERM).is_err() {
        return;
    }
    let start = Instant::now();
    while group_exists(pgid) {
        if start.elapsed() >= grace_period {
            tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pgid);
            let _ = send_signal_to_group(pgid, Signal::SIGKILL);
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn group_exists(pgid: u32) -> bool {
    signal::kill(Pid::from_raw(-(pgid as i32)), None).is_ok()
}

/// Signal the whole group, falling back to the single PID if the group is gone
fn signal_group_or_pid(pid: u32, sig: Signal) {
    if let Err(e) = send_signal_to_group(pid, sig) {
        tracing::debug!("Failed to send {} to process group {}: {}", sig, pid, e);
        if let Err(e2) = send_signal(pid, sig) {
            tracing::debug!("Failed to send {} to PID {}: {}", sig, pid, e2);
        }
    } else {
        tracing::debug!("Sent {} to process group {}", sig, pid);
    }
}

/// Poll until every PID is dead or the grace period elapses
fn wait_until_dead(pids: &[u32], grace_period: Duration) -> bool {
    let start = Instant::now();
    loop {
        if pids.iter().all(|&pid| !is_process_alive(pid)) {
            return true;
        }
        if start.elapsed() >= grace_period {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Send a signal to a process
fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group (negative PID)
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state: Z=zombie, X=dead
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// RAII guard that terminates all children on drop
/// Held by the deployer for the duration of a run
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    /// Create a new process guard attached to the global registry
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        tracing::debug!("ProcessGuard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(Duration::from_secs(5));
        }
    }
}

/// Initialize global signal handlers for graceful shutdown
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP
/// Call this once at program start
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            tracing::info!("Received {} signal, cleaning up...", signal_name);

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
                registry.remove_scratch_dirs();
            }

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    /// This allows us to kill the entire process tree with a single signal
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // PGID = child PID
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // Child dies with the deployer; a half-finished `mysql -e` or
                // `chown -R` must not keep running unattended.
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        assert_eq!(registry.count(), 1);

        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);

        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_scratch_dirs_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scratch = dir.path().join("dvwa_clone_test");
        std::fs::create_dir_all(scratch.join("nested")).unwrap();

        let mut registry = ChildRegistry::default();
        registry.register_scratch_dir(&scratch);
        registry.remove_scratch_dirs();

        assert!(!scratch.exists());
    }

    #[test]
    fn test_unregistered_scratch_dir_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut registry = ChildRegistry::default();
        registry.register_scratch_dir(dir.path());
        registry.unregister_scratch_dir(dir.path());
        registry.remove_scratch_dirs();

        assert!(dir.path().exists());
    }

    /// Helper to wait for a process to terminate (reap zombie)
    fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
        use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};

        let start = Instant::now();
        let nix_pid = Pid::from_raw(pid as i32);

        while start.elapsed() < timeout {
            match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => {
                    return true;
                }
                Ok(WaitStatus::StillAlive) => {}
                Err(nix::errno::Errno::ECHILD) => {
                    if !is_process_alive(pid) {
                        return true;
                    }
                }
                _ => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_terminate_all_kills_real_process() {
        let child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("Failed to spawn sleep process");
        let pid = child.id();

        // Fresh registry, not the global one, to avoid interference
        let mut registry = ChildRegistry::default();
        registry.register(pid);
        assert!(is_process_alive(pid), "Process should be alive after spawn");

        registry.terminate_all(Duration::from_millis(500));

        assert!(
            wait_for_process_death(pid, Duration::from_secs(2)),
            "Process should be dead after terminate_all"
        );
    }

    #[test]
    fn test_terminate_process_group_kills_grouped_child() {
        let child = Command::new("sleep")
            .arg("60")
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn grouped sleep");
        let pid = child.id();

        terminate_process_group(pid, Duration::from_millis(500));

        assert!(wait_for_process_death(pid, Duration::from_secs(2)));
    }

    #[test]
    fn test_terminate_orphaned_group_kills_background_member() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pidfile = dir.path().join("pid");
        let mut leader = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 60 & echo $! > {}", pidfile.display()))
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn group leader");
        let pgid = leader.id();
        leader.wait().expect("leader exits right away");

        let member: u32 = std::fs::read_to_string(&pidfile)
            .expect("pid written")
            .trim()
            .parse()
            .expect("numeric pid");
        assert!(group_exists(pgid), "background sleep keeps the group alive");

        terminate_orphaned_group(pgid, Duration::from_millis(500));

        let start = Instant::now();
        while is_process_alive(member) && start.elapsed() < Duration::from_secs(3) {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_process_alive(member));
    }

    #[test]
    fn test_terminate_orphaned_group_missing_group() {
        let start = Instant::now();
        terminate_orphaned_group(999997, Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cleanup_initiated_flag_prevents_double_cleanup() {
        let mut registry = ChildRegistry::default();
        registry.register(999998);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);
    }

    #[test]
    fn test_send_signal_to_nonexistent_pid() {
        let result = send_signal(999999, Signal::SIGTERM);
        assert!(result.is_err(), "Should fail for nonexistent PID");
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999999));
    }
}
