//! The relaunch sequence and its run report.
//!
//! Steps run strictly in order. A failing step is recorded and the next one
//! still runs; nothing here turns into a non-zero exit status.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::LaunchConfig;
use crate::docker::DockerComposeManager;
use crate::error::LaunchError;
use crate::launcher::{self, LaunchedServer};
use crate::port::{self, ReclaimOutcome};
use crate::python_env::{self, RuntimeEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ActivateEnv,
    ReclaimPort,
    LaunchServer,
    StartCompose,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub ok: bool,
    pub skipped: bool,
    pub error_code: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LaunchReport {
    pub steps: Vec<StepReport>,
    pub venv: Option<PathBuf>,
    pub reclaimed: Option<ReclaimOutcome>,
    pub server: Option<LaunchedServer>,
    pub compose_started: bool,
}

impl LaunchReport {
    fn ok(&mut self, step: Step, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{:?}] {}", step, message);
        self.steps.push(StepReport {
            step,
            ok: true,
            skipped: false,
            error_code: None,
            message,
        });
    }

    fn skipped(&mut self, step: Step, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{:?}] skipped: {}", step, message);
        self.steps.push(StepReport {
            step,
            ok: true,
            skipped: true,
            error_code: None,
            message,
        });
    }

    fn failed(&mut self, step: Step, err: &LaunchError) {
        tracing::warn!("[{:?}] {} (ignored)", step, err);
        tracing::debug!("[{:?}] {}", step, err.to_json());
        self.steps.push(StepReport {
            step,
            ok: false,
            skipped: false,
            error_code: Some(err.error_code()),
            message: err.to_string(),
        });
    }

    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }

    /// Always 0: step failures never change the exit status.
    pub fn exit_code(&self) -> i32 {
        0
    }
}

/// Run every step in order and collect the outcome.
pub async fn run(cfg: &LaunchConfig) -> LaunchReport {
    let mut report = LaunchReport::default();

    // 1. runtime environment
    let base_dir = match &cfg.server.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let runtime: Option<RuntimeEnv> = match python_env::activate_runtime(cfg.python.venv.as_deref(), &base_dir) {
        Ok(Some(env)) => {
            report.ok(Step::ActivateEnv, format!("virtualenv {}", env.venv_dir.display()));
            report.venv = Some(env.venv_dir.clone());
            Some(env)
        }
        Ok(None) => {
            report.skipped(Step::ActivateEnv, "no virtualenv found");
            None
        }
        Err(e) => {
            report.failed(Step::ActivateEnv, &LaunchError::Internal(e));
            None
        }
    };

    // 2. port reclaimer
    match port::reclaim_port(cfg.port, &cfg.server.process_name).await {
        Ok(outcome) => {
            let msg = if outcome.was_occupied() {
                format!(
                    "killed {:?} on port {} and {} '{}' process(es)",
                    outcome.port_pids,
                    outcome.port,
                    outcome.pattern_pids.len(),
                    cfg.server.process_name
                )
            } else {
                format!("port {} was free", outcome.port)
            };
            report.ok(Step::ReclaimPort, msg);
            report.reclaimed = Some(outcome);
        }
        Err(e) => report.failed(Step::ReclaimPort, &e),
    }

    // 3 + 4. log dir, detached server
    match launcher::launch_server(&cfg.server, &cfg.logs, runtime.as_ref()) {
        Ok(server) => {
            report.ok(
                Step::LaunchServer,
                format!("pid {} logging to {}", server.pid, server.log_file.display()),
            );
            report.server = Some(server);
        }
        Err(e) => report.failed(Step::LaunchServer, &e),
    }

    // 5. compose dependency
    if cfg.compose.enabled {
        match DockerComposeManager::new(&cfg.compose).start().await {
            Ok(_) => {
                report.ok(Step::StartCompose, format!("up -d {}", cfg.compose.file.display()));
                report.compose_started = true;
            }
            Err(e) => report.failed(Step::StartCompose, &e),
        }
    } else {
        report.skipped(Step::StartCompose, "compose disabled in config");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_always_zero() {
        let mut report = LaunchReport::default();
        assert_eq!(report.exit_code(), 0);
        report.failed(Step::LaunchServer, &LaunchError::Config("bad".into()));
        report.failed(Step::StartCompose, &LaunchError::ComposeUnavailable);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_step_lookup() {
        let mut report = LaunchReport::default();
        report.skipped(Step::ActivateEnv, "none");
        report.ok(Step::ReclaimPort, "port 6502 was free");
        assert!(report.step(Step::ActivateEnv).unwrap().skipped);
        assert!(report.step(Step::ReclaimPort).unwrap().ok);
        assert!(report.step(Step::StartCompose).is_none());
    }

    #[test]
    fn test_report_serializes() {
        let mut report = LaunchReport::default();
        report.failed(Step::StartCompose, &LaunchError::ComposeUnavailable);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["step"], "start_compose");
        assert_eq!(json["steps"][0]["error_code"], "COMPOSE_UNAVAILABLE");
        assert_eq!(json["compose_started"], false);
    }
}
