//! Pidfile management and duplicate-daemon detection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default dot-directory holding the pidfile and the persisted configuration.
pub const SERVICE_DIR: &str = ".db-sync";

const PID_FILE: &str = "service.pid";

/// Ensure the service directory exists.
pub fn ensure_service_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create service directory: {}", dir.display()))?;
    }
    Ok(())
}

pub fn pid_file_path(dir: &Path) -> PathBuf {
    dir.join(PID_FILE)
}

/// Read the recorded pid, if a pidfile exists.
pub fn read_pid(dir: &Path) -> Result<Option<i32>> {
    let pid_file = pid_file_path(dir);
    if !pid_file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&pid_file)
        .with_context(|| format!("Failed to read PID file: {}", pid_file.display()))?;
    let pid: i32 = content
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in file: {}", content.trim()))?;
    Ok(Some(pid))
}

/// Record the current process in the pidfile.
pub fn write_pid(dir: &Path) -> Result<()> {
    ensure_service_dir(dir)?;
    let pid_file = pid_file_path(dir);
    fs::write(&pid_file, std::process::id().to_string())
        .with_context(|| format!("Failed to write PID file: {}", pid_file.display()))
}

pub fn remove_pid_file(dir: &Path) -> Result<()> {
    let pid_file = pid_file_path(dir);
    if pid_file.exists() {
        fs::remove_file(&pid_file)
            .with_context(|| format!("Failed to remove PID file: {}", pid_file.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn is_process_running(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: i32) -> bool {
    false
}

#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<i32>,
    pub pid_file_exists: bool,
}

/// Probe the pidfile and the recorded process.
pub fn check_status(dir: &Path) -> Result<DaemonStatus> {
    let pid_file_exists = pid_file_path(dir).exists();
    let (running, pid) = match read_pid(dir)? {
        Some(pid) => (is_process_running(pid), Some(pid)),
        None => (false, None),
    };
    Ok(DaemonStatus {
        running,
        pid,
        pid_file_exists,
    })
}

/// Deliver TERM to a running daemon and wait for it to exit. Returns false
/// when nothing was running (a stale pidfile is cleaned up).
#[cfg(unix)]
pub fn stop_daemon(dir: &Path) -> Result<bool> {
    let status = check_status(dir)?;

    if !status.running {
        if status.pid_file_exists {
            remove_pid_file(dir)?;
            println!("Removed stale PID file (process was not running)");
        }
        return Ok(false);
    }

    let pid = status.pid.context("running daemon without a pid")?;
    println!("Sending SIGTERM to daemon (PID: {pid})");
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        anyhow::bail!(
            "Failed to send SIGTERM to process {pid}: {}",
            std::io::Error::last_os_error()
        );
    }

    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(10);
    while is_process_running(pid) {
        if start.elapsed() > timeout {
            anyhow::bail!("Daemon (PID: {pid}) did not exit within 10 seconds");
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    remove_pid_file(dir)?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn stop_daemon(_dir: &Path) -> Result<bool> {
    anyhow::bail!("stopping a detached daemon is only supported on Unix")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pidfile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_pid(dir.path()).unwrap().is_none());

        write_pid(dir.path()).unwrap();
        assert_eq!(
            read_pid(dir.path()).unwrap(),
            Some(std::process::id() as i32)
        );

        let status = check_status(dir.path()).unwrap();
        assert!(status.running);
        assert!(status.pid_file_exists);

        remove_pid_file(dir.path()).unwrap();
        assert!(read_pid(dir.path()).unwrap().is_none());
    }

    #[test]
    fn garbage_pidfile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(pid_file_path(dir.path()), "not-a-pid").unwrap();
        assert!(read_pid(dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn current_process_is_running() {
        assert!(is_process_running(std::process::id() as i32));
    }
}
