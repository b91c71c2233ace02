//! Python 가상환경 활성화: 셸의 `source venv/bin/activate`에 해당
//!
//! relaunch는 셸을 거치지 않으므로, 활성화는 서버 자식 프로세스의 환경변수로만 표현됩니다:
//! - `VIRTUAL_ENV=<venv>`
//! - `PATH=<venv>/bin:<기존 PATH>` (Windows: `<venv>\Scripts`)
//! - `PYTHONHOME` 제거
//!
//! ## venv 탐색 순서
//! 1. 설정 파일 `[python] venv`
//! 2. 환경변수 `VIRTUAL_ENV` (이미 활성화된 셸에서 실행한 경우)
//! 3. `./venv`
//! 4. `./.venv`
//!
//! 아무것도 없으면 상속받은 환경을 그대로 사용합니다.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

const CANDIDATE_DIRS: [&str; 2] = ["venv", ".venv"];

/// An activated virtual environment, applied to child commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnv {
    pub venv_dir: PathBuf,
    pub bin_dir: PathBuf,
    path: OsString,
}

impl RuntimeEnv {
    /// Activate `venv_dir` on top of the given base `PATH`.
    pub fn activate(venv_dir: &Path, base_path: Option<OsString>) -> Result<Self> {
        let bin_dir = venv_bin_dir(venv_dir);
        let mut entries = vec![bin_dir.clone()];
        if let Some(base) = base_path {
            entries.extend(std::env::split_paths(&base));
        }
        let path = std::env::join_paths(entries)
            .with_context(|| format!("PATH 구성 실패: {}", bin_dir.display()))?;

        Ok(Self {
            venv_dir: venv_dir.to_path_buf(),
            bin_dir,
            path,
        })
    }

    /// Set the activation variables on `cmd`.
    pub fn apply(&self, cmd: &mut Command) {
        cmd.env("VIRTUAL_ENV", &self.venv_dir)
            .env("PATH", &self.path)
            .env_remove("PYTHONHOME");
    }

    /// Resolve a bare program name against the venv's bin dir.
    /// Paths and names not installed in the venv are returned unchanged.
    pub fn resolve_program(&self, program: &str) -> PathBuf {
        let as_path = Path::new(program);
        if as_path.components().count() != 1 {
            return as_path.to_path_buf();
        }
        let candidate = self.bin_dir.join(executable_name(program));
        if candidate.is_file() {
            candidate
        } else {
            as_path.to_path_buf()
        }
    }
}

/// Find the venv to use, relative to `base_dir`.
pub fn discover_venv(configured: Option<&Path>, base_dir: &Path) -> Option<PathBuf> {
    let env_venv = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from);
    discover_venv_from(configured, env_venv.as_deref(), base_dir)
}

fn discover_venv_from(
    configured: Option<&Path>,
    env_venv: Option<&Path>,
    base_dir: &Path,
) -> Option<PathBuf> {
    if let Some(dir) = configured {
        let dir = if dir.is_absolute() { dir.to_path_buf() } else { base_dir.join(dir) };
        if is_venv(&dir) {
            return Some(dir);
        }
        tracing::warn!("Configured venv {} is not a virtualenv, ignoring", dir.display());
    }

    if let Some(dir) = env_venv.filter(|d| is_venv(d)) {
        return Some(dir.to_path_buf());
    }

    CANDIDATE_DIRS
        .iter()
        .map(|name| base_dir.join(name))
        .find(|dir| is_venv(dir))
}

/// Discover and activate; `None` when no venv exists.
pub fn activate_runtime(configured: Option<&Path>, base_dir: &Path) -> Result<Option<RuntimeEnv>> {
    let Some(venv_dir) = discover_venv(configured, base_dir) else {
        tracing::warn!("No Python virtualenv found under {}, using inherited environment", base_dir.display());
        return Ok(None);
    };
    let env = RuntimeEnv::activate(&venv_dir, std::env::var_os("PATH"))?;
    tracing::info!("Activated virtualenv {}", env.venv_dir.display());
    Ok(Some(env))
}

/// venv 판별: pyvenv.cfg 또는 bin 디렉토리 내 python 존재
fn is_venv(dir: &Path) -> bool {
    dir.join("pyvenv.cfg").is_file() || venv_python_exe(dir).is_file()
}

fn venv_bin_dir(venv_dir: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        venv_dir.join("Scripts")
    }
    #[cfg(not(target_os = "windows"))]
    {
        venv_dir.join("bin")
    }
}

fn venv_python_exe(venv_dir: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        venv_bin_dir(venv_dir).join("python.exe")
    }
    #[cfg(not(target_os = "windows"))]
    {
        venv_bin_dir(venv_dir).join("python")
    }
}

fn executable_name(program: &str) -> String {
    if cfg!(target_os = "windows") && !program.to_lowercase().ends_with(".exe") {
        format!("{}.exe", program)
    } else {
        program.to_string()
    }
}
