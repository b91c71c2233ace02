//! Platform helpers shared by the commands relaunch shells out to.

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Hide the console window of short-lived helper commands on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut tokio::process::Command) -> &mut tokio::process::Command {
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut tokio::process::Command) -> &mut tokio::process::Command {
    cmd
}

/// Lossy stdout/stderr of a finished command, preferring stderr for error messages.
pub fn output_message(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn status(code: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn test_output_message_prefers_stderr() {
        let out = std::process::Output {
            status: status(1),
            stdout: b"some stdout\n".to_vec(),
            stderr: b"  no such service: qdrant \n".to_vec(),
        };
        assert_eq!(output_message(&out), "no such service: qdrant");
    }

    #[cfg(unix)]
    #[test]
    fn test_output_message_falls_back_to_stdout() {
        let out = std::process::Output {
            status: status(1),
            stdout: b"only stdout".to_vec(),
            stderr: Vec::new(),
        };
        assert_eq!(output_message(&out), "only stdout");
    }
}
