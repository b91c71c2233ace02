use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
    /// 프로세스 커맨드라인 인수 (예: ["python3", "/app/venv/bin/gunicorn", "server.app:app"])
    pub cmd: Vec<String>,
}

impl RunningProcess {
    /// `pkill -f` semantics: the pattern may appear in the name or anywhere in the command line.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let pattern = pattern.to_lowercase();
        self.name.to_lowercase().contains(&pattern)
            || self.cmd.join(" ").to_lowercase().contains(&pattern)
    }
}

/// 크로스 플랫폼: 실행 중인 모든 프로세스 목록 가져오기
pub fn get_running_processes() -> Vec<RunningProcess> {
    let mut sys = System::new();
    sys.refresh_processes();

    let processes: Vec<RunningProcess> = sys
        .processes()
        .iter()
        // Linux에서는 스레드도 프로세스 목록에 나온다: 스레드 ID는 건너뛴다
        .filter(|(_, process)| process.thread_kind().is_none())
        .map(|(pid, process)| RunningProcess {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            cmd: process.cmd().to_vec(),
        })
        .collect();

    tracing::debug!("Found {} running processes", processes.len());
    processes
}

/// Every process matching `pattern` by name or command line, excluding this process.
pub fn find_matching(pattern: &str) -> Vec<RunningProcess> {
    let own_pid = std::process::id();
    filter_matching(get_running_processes(), pattern, own_pid)
}

fn filter_matching(
    processes: Vec<RunningProcess>,
    pattern: &str,
    own_pid: u32,
) -> Vec<RunningProcess> {
    processes
        .into_iter()
        .filter(|p| p.pid != own_pid && p.matches(pattern))
        .collect()
}

/// `find_matching`의 비동기 래퍼. 프로세스 테이블 스캔은 블로킹이므로 spawn_blocking 사용.
pub async fn find_matching_async(pattern: &str) -> Vec<RunningProcess> {
    let pattern = pattern.to_string();
    tokio::task::spawn_blocking(move || find_matching(&pattern))
        .await
        .unwrap_or_default()
}
