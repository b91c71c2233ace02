//! Docker Compose integration for the auxiliary service.
//!
//! The compose file lives outside the app tree at a fixed path. relaunch
//! only ever runs `up -d` against it and does not wait for health.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::config::ComposeConfig;
use crate::error::LaunchError;
use crate::utils::{apply_creation_flags, output_message};

const PLUGIN_ARGS: &[&str] = &["compose"];
const NO_ARGS: &[&str] = &[];

/// Which Compose CLI flavour is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComposeFlavor {
    /// `docker compose` (V2 plugin)
    Plugin,
    /// standalone `docker-compose` (V1 or V2 binary)
    Standalone,
}

impl ComposeFlavor {
    fn base(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Plugin => ("docker", PLUGIN_ARGS),
            Self::Standalone => ("docker-compose", NO_ARGS),
        }
    }

    fn command(self) -> Command {
        let (program, base_args) = self.base();
        let mut cmd = Command::new(program);
        cmd.args(base_args);
        apply_creation_flags(&mut cmd);
        cmd
    }

    async fn is_available(self) -> bool {
        let mut cmd = self.command();
        cmd.arg("version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        cmd.status().await.map(|s| s.success()).unwrap_or(false)
    }
}

/// Detect the Docker Compose CLI: prefer the V2 plugin, fall back to `docker-compose`.
pub async fn detect_compose() -> Option<ComposeFlavor> {
    for flavor in [ComposeFlavor::Plugin, ComposeFlavor::Standalone] {
        if flavor.is_available().await {
            tracing::debug!("Using {:?} compose CLI", flavor);
            return Some(flavor);
        }
    }
    None
}

/// Manages Docker Compose operations for the dependency stack.
pub struct DockerComposeManager {
    compose_file: PathBuf,
    service_name: Option<String>,
    project_name: Option<String>,
}

impl DockerComposeManager {
    pub fn new(config: &ComposeConfig) -> Self {
        Self {
            compose_file: config.file.clone(),
            service_name: config.service.clone(),
            project_name: config.project_name.clone(),
        }
    }

    pub fn has_compose_file(&self) -> bool {
        self.compose_file.is_file()
    }

    /// Arguments after the compose base command, e.g. `-f <file> -p <name> up -d <service>`.
    pub fn up_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.compose_file.to_string_lossy().into_owned()];
        if let Some(ref project) = self.project_name {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        args.push("up".to_string());
        args.push("-d".to_string());
        if let Some(ref service) = self.service_name {
            args.push(service.clone());
        }
        args
    }

    /// Start containers: `docker compose -f <file> up -d`
    pub async fn start(&self) -> Result<Value, LaunchError> {
        if !self.has_compose_file() {
            return Err(LaunchError::ComposeFileMissing(self.compose_file.clone()));
        }
        let flavor = detect_compose().await.ok_or(LaunchError::ComposeUnavailable)?;
        self.start_with(flavor).await
    }

    pub async fn start_with(&self, flavor: ComposeFlavor) -> Result<Value, LaunchError> {
        let mut cmd = flavor.command();
        cmd.args(self.up_args());
        // 상대 경로 볼륨/빌드 컨텍스트가 compose 파일 기준으로 해석되도록
        if let Some(parent) = self.compose_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd.current_dir(parent);
        }

        tracing::info!("Docker Compose up: {}", self.compose_file.display());
        let output = cmd
            .output()
            .await
            .map_err(|e| LaunchError::Compose(e.to_string()))?;

        if output.status.success() {
            Ok(json!({
                "success": true,
                "message": "Docker Compose containers started",
                "compose_file": self.compose_file,
                "stdout": String::from_utf8_lossy(&output.stdout),
            }))
        } else {
            Err(LaunchError::Compose(output_message(&output)))
        }
    }
}
