//! Process primitives: force-kill by PID and detached spawning.

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::error::LaunchError;

/// Force-kill a process by PID. Cross-platform helper.
pub fn force_kill_pid(pid: u32) -> Result<(), LaunchError> {
    if pid == 0 || pid == std::process::id() {
        return Err(LaunchError::Kill {
            pid,
            reason: "refusing to kill self or process group".to_string(),
        });
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        let output = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| LaunchError::Kill { pid, reason: e.to_string() })?;
        if !output.status.success() {
            return Err(LaunchError::Kill {
                pid,
                reason: crate::utils::output_message(&output),
            });
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| LaunchError::Kill {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        signal::kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(|e| LaunchError::Kill {
            pid,
            reason: format!("Failed to send signal: {}", e),
        })?;
    }

    tracing::info!("Sent KILL to pid {}", pid);
    Ok(())
}

/// Kill every PID in `pids`; failures are logged and skipped. Returns the PIDs signalled.
pub fn force_kill_all(pids: &[u32]) -> Vec<u32> {
    pids.iter()
        .copied()
        .filter(|&pid| match force_kill_pid(pid) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        })
        .collect()
}

/// 프로세스를 분리(detach)하여 실행: 부모 종료 후에도 유지
///
/// stdin is `/dev/null`, stdout and stderr both go to `log_file`.
pub fn spawn_detached(cmd: &mut Command, log_file: &Path) -> Result<Child, LaunchError> {
    let log_err = |source| LaunchError::LogFile {
        path: log_file.to_path_buf(),
        source,
    };
    let stdout = File::options().append(true).open(log_file).map_err(log_err)?;
    let stderr = stdout.try_clone().map_err(log_err)?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // 새 세션: 제어 터미널에서 분리되어 터미널 종료 시 SIGHUP을 받지 않는다
        // SAFETY: setsid는 async-signal-safe, fork와 exec 사이에서 호출해도 된다
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_force_kill_live_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        force_kill_pid(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc_sigkill()));
    }

    #[test]
    fn test_force_kill_refuses_self() {
        let err = force_kill_pid(std::process::id()).unwrap_err();
        assert_eq!(err.error_code(), "KILL_FAILED");
        assert!(force_kill_pid(0).is_err());
    }

    #[test]
    fn test_force_kill_all_skips_failures() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let killed = force_kill_all(&[child.id(), 0]);
        assert_eq!(killed, vec![child.id()]);
        child.wait().unwrap();
    }

    #[test]
    fn test_spawn_detached_writes_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        std::fs::File::create(&log).unwrap();

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo to-stdout; echo to-stderr 1>&2"]);
        let mut child = spawn_detached(&mut cmd, &log).unwrap();
        child.wait().unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("to-stdout"));
        assert!(content.contains("to-stderr"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_spawn_detached_starts_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stat.log");
        std::fs::File::create(&log).unwrap();

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "cat /proc/$$/stat"]);
        let mut child = spawn_detached(&mut cmd, &log).unwrap();
        let pid = child.id();
        child.wait().unwrap();

        // pid (comm) state ppid pgrp session ...
        let content = std::fs::read_to_string(&log).unwrap();
        let fields: Vec<&str> = content.split_whitespace().collect();
        assert_eq!(fields[0], pid.to_string());
        assert_eq!(fields[4], pid.to_string(), "process group leader");
        assert_eq!(fields[5], pid.to_string(), "session leader");
        let own_sid = nix::unistd::getsid(None).unwrap().as_raw();
        assert_ne!(fields[5], own_sid.to_string());
    }

    #[test]
    fn test_spawn_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("missing.log");
        std::fs::File::create(&log).unwrap();

        let mut cmd = Command::new("/nonexistent/relaunch-test-binary");
        let err = spawn_detached(&mut cmd, &log).unwrap_err();
        assert_eq!(err.error_code(), "SPAWN_FAILED");
    }

    fn libc_sigkill() -> i32 {
        nix::sys::signal::Signal::SIGKILL as i32
    }
}
