//! Server launcher: log directory, timestamped log file, detached spawn.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::config::{LogConfig, ServerConfig};
use crate::error::LaunchError;
use crate::process::spawn_detached;
use crate::python_env::RuntimeEnv;

/// 같은 초에 여러 번 실행될 때 붙일 수 있는 suffix 상한
const MAX_COLLISION_SUFFIX: u32 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct LaunchedServer {
    pub pid: u32,
    pub program: String,
    pub log_file: PathBuf,
}

/// Idempotent `mkdir -p`.
pub fn ensure_log_dir(dir: &Path) -> Result<(), LaunchError> {
    fs::create_dir_all(dir).map_err(|source| LaunchError::LogDir {
        path: dir.to_path_buf(),
        source,
    })
}

pub fn log_file_name(prefix: &str, timestamp: &str, suffix: Option<u32>) -> String {
    match suffix {
        Some(n) => format!("{}_{}_{}.log", prefix, timestamp, n),
        None => format!("{}_{}.log", prefix, timestamp),
    }
}

/// Create a fresh `<prefix>_<timestamp>.log` under `cfg.dir`.
///
/// An existing file is never reused: on collision `_1`, `_2`, ... is appended.
pub fn create_log_file(cfg: &LogConfig, now: DateTime<Local>) -> Result<PathBuf, LaunchError> {
    let timestamp = cfg.format_timestamp(now)?;

    let mut suffix = None;
    loop {
        let path = cfg.dir.join(log_file_name(&cfg.prefix, &timestamp, suffix));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let next = suffix.map_or(1, |n| n + 1);
                if next > MAX_COLLISION_SUFFIX {
                    return Err(LaunchError::LogFile { path, source: e });
                }
                suffix = Some(next);
            }
            Err(source) => return Err(LaunchError::LogFile { path, source }),
        }
    }
}

/// Build the server command with the runtime environment applied.
pub fn build_server_command(server: &ServerConfig, runtime: Option<&RuntimeEnv>) -> Command {
    let program = match runtime {
        Some(env) => env.resolve_program(&server.program),
        None => PathBuf::from(&server.program),
    };

    let mut cmd = Command::new(program);
    cmd.args(&server.args);
    if let Some(env) = runtime {
        env.apply(&mut cmd);
    }
    cmd.envs(&server.env);
    if let Some(dir) = &server.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Steps 3 and 4: ensure `logs/`, open a new log file, start the server detached.
///
/// Returns as soon as the process is spawned; readiness is not awaited.
pub fn launch_server(
    server: &ServerConfig,
    logs: &LogConfig,
    runtime: Option<&RuntimeEnv>,
) -> Result<LaunchedServer, LaunchError> {
    ensure_log_dir(&logs.dir)?;
    let log_file = create_log_file(logs, Local::now())?;

    let mut cmd = build_server_command(server, runtime);
    let program = cmd.get_program().to_string_lossy().into_owned();
    tracing::info!("Starting {} {:?} (log: {})", program, server.args, log_file.display());

    let child = spawn_detached(&mut cmd, &log_file)?;
    let pid = child.id();
    // Child를 drop해도 프로세스는 종료되지 않음: 더 이상 추적하지 않는다
    drop(child);

    tracing::info!("Server started with pid {}", pid);
    Ok(LaunchedServer {
        pid,
        program,
        log_file,
    })
}
