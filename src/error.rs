//! Launch 단계별 에러 타입: 실행 리포트에 단계마다 어떤 이유로
//! 실패했는지 기계가 읽을 수 있는 코드와 함께 남기기 위해 사용합니다.

use std::path::PathBuf;

/// Errors a launch step can produce. The pipeline records them, it never aborts on them.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to list listening sockets: {0}")]
    PortListing(String),

    #[error("Failed to kill process {pid}: {reason}")]
    Kill { pid: u32, reason: String },

    #[error("Failed to create log directory {}: {source}", .path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compose file not found: {}", .0.display())]
    ComposeFileMissing(PathBuf),

    #[error("Neither 'docker compose' nor 'docker-compose' is available")]
    ComposeUnavailable,

    #[error("Docker Compose up failed: {0}")]
    Compose(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl LaunchError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "INVALID_CONFIG",
            Self::PortListing(_) => "PORT_LISTING_FAILED",
            Self::Kill { .. } => "KILL_FAILED",
            Self::LogDir { .. } => "LOG_DIR_FAILED",
            Self::LogFile { .. } => "LOG_FILE_FAILED",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::ComposeFileMissing(_) => "COMPOSE_FILE_MISSING",
            Self::ComposeUnavailable => "COMPOSE_UNAVAILABLE",
            Self::Compose(_) => "COMPOSE_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// JSON 에러 표현
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}
