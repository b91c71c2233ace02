use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::error::LaunchError;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/relaunch.toml";
/// Env var that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "RELAUNCH_CONFIG";

pub const DEFAULT_PORT: u16 = 6502;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LaunchConfig {
    pub port: u16,
    pub server: ServerConfig,
    pub logs: LogConfig,
    pub python: PythonConfig,
    pub compose: ComposeConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// 포트 회수 시 추가로 종료할 프로세스 이름/커맨드라인 패턴
    pub process_name: String,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// chrono strftime format
    pub timestamp_format: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PythonConfig {
    pub venv: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ComposeConfig {
    pub enabled: bool,
    pub file: PathBuf,
    pub service: Option<String>,
    pub project_name: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            server: ServerConfig::default(),
            logs: LogConfig::default(),
            python: PythonConfig::default(),
            compose: ComposeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "gunicorn".to_string(),
            args: vec![
                "--bind".to_string(),
                format!("0.0.0.0:{}", DEFAULT_PORT),
                "server.app:app".to_string(),
            ],
            process_name: "gunicorn".to_string(),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            prefix: "gunicorn".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("/opt/relaunch/docker-compose.yml"),
            service: None,
            project_name: None,
        }
    }
}

impl LogConfig {
    /// Render `now` with `timestamp_format`; unknown specifiers are an error, not a panic.
    pub fn format_timestamp(&self, now: DateTime<Local>) -> Result<String, LaunchError> {
        use std::fmt::Write;

        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(LaunchError::Config(format!(
                "invalid logs.timestamp_format '{}'",
                self.timestamp_format
            )));
        }
        let mut out = String::new();
        write!(out, "{}", now.format(&self.timestamp_format)).map_err(|_| {
            LaunchError::Config(format!("cannot render logs.timestamp_format '{}'", self.timestamp_format))
        })?;
        if out.contains(['/', '\\']) {
            return Err(LaunchError::Config(format!(
                "logs.timestamp_format '{}' produces path separators",
                self.timestamp_format
            )));
        }
        Ok(out)
    }
}

impl LaunchConfig {
    /// Resolve the config path from `RELAUNCH_CONFIG`, falling back to the default.
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load() -> Result<Self, LaunchError> {
        Self::load_from(&Self::config_path())
    }

    /// 파일이 없으면 기본값, 파싱 실패 시에만 에러
    pub fn load_from(path: &Path) -> Result<Self, LaunchError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .map_err(|e| LaunchError::Config(format!("{}: {}", path.display(), e)))?;
        let cfg = Self::from_toml(&s)
            .map_err(|e| LaunchError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml(s: &str) -> Result<Self, LaunchError> {
        let cfg: Self = toml::from_str(s).map_err(|e| LaunchError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), LaunchError> {
        if self.port == 0 {
            return Err(LaunchError::Config("port must be non-zero".into()));
        }
        if self.server.program.trim().is_empty() {
            return Err(LaunchError::Config("server.program must not be empty".into()));
        }
        if self.logs.prefix.contains(['/', '\\']) {
            return Err(LaunchError::Config(
                "logs.prefix must not contain path separators".into(),
            ));
        }
        self.logs.format_timestamp(Local::now())?;
        Ok(())
    }
}
