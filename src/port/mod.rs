//! Port reclaimer: find who listens on the app port and kill it.
//!
//! Listening sockets come from `netstat` (falling back to `ss` on Unix hosts
//! without net-tools). The PID is taken from the owning-process column, so
//! rows whose owner is hidden (`-`, not root) are skipped.

use serde::Serialize;
use tokio::process::Command;

use crate::error::LaunchError;
use crate::process::force_kill_all;
use crate::process_monitor;
use crate::utils::{apply_creation_flags, output_message};

/// Which socket listing tool produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingTool {
    Netstat,
    Ss,
}

impl ListingTool {
    fn command(self) -> Command {
        let mut cmd = match self {
            Self::Netstat => {
                let mut cmd = Command::new("netstat");
                if cfg!(target_os = "windows") {
                    cmd.args(["-ano", "-p", "TCP"]);
                } else {
                    cmd.arg("-tlnp");
                }
                cmd
            }
            Self::Ss => {
                let mut cmd = Command::new("ss");
                cmd.arg("-ltnp");
                cmd
            }
        };
        apply_creation_flags(&mut cmd);
        cmd
    }

    pub fn parse(self, output: &str, port: u16) -> Vec<u32> {
        match self {
            Self::Netstat => parse_netstat(output, port),
            Self::Ss => parse_ss(output, port),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclaimOutcome {
    pub port: u16,
    /// PIDs that were listening on the port
    pub port_pids: Vec<u32>,
    /// PIDs killed by the server-name sweep
    pub pattern_pids: Vec<u32>,
}

impl ReclaimOutcome {
    pub fn was_occupied(&self) -> bool {
        !self.port_pids.is_empty()
    }
}

/// Run the listing tool and return the PIDs listening on `port`.
pub async fn listening_pids(port: u16) -> Result<Vec<u32>, LaunchError> {
    let mut tools = vec![ListingTool::Netstat];
    if cfg!(unix) {
        tools.push(ListingTool::Ss);
    }

    let mut last_err = None;
    for tool in tools {
        match tool.command().output().await {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let pids = tool.parse(&stdout, port);
                tracing::debug!("{:?} reports {} listener(s) on port {}", tool, pids.len(), port);
                return Ok(pids);
            }
            Ok(output) => {
                last_err = Some(format!("{:?} exited with {}: {}", tool, output.status, output_message(&output)));
            }
            Err(e) => {
                last_err = Some(format!("{:?}: {}", tool, e));
            }
        }
    }

    Err(LaunchError::PortListing(
        last_err.unwrap_or_else(|| "no listing tool available".to_string()),
    ))
}

/// Kill whatever listens on `port`, then every process matching `process_name`.
///
/// A free port is not an error. Kills are not verified.
pub async fn reclaim_port(port: u16, process_name: &str) -> Result<ReclaimOutcome, LaunchError> {
    let own_pid = std::process::id();
    let pids: Vec<u32> = listening_pids(port)
        .await?
        .into_iter()
        .filter(|&pid| pid != own_pid)
        .collect();

    let mut outcome = ReclaimOutcome {
        port,
        ..Default::default()
    };

    if pids.is_empty() {
        tracing::info!("Port {} is free", port);
        return Ok(outcome);
    }

    tracing::info!("Port {} held by pid(s) {:?}, killing", port, pids);
    force_kill_all(&pids);
    outcome.port_pids = pids;

    let sweep: Vec<u32> = process_monitor::find_matching_async(process_name)
        .await
        .into_iter()
        .map(|p| p.pid)
        .filter(|pid| !outcome.port_pids.contains(pid))
        .collect();
    if !sweep.is_empty() {
        tracing::info!("Killing {} leftover '{}' process(es): {:?}", sweep.len(), process_name, sweep);
        // 이미 죽은 워커는 ESRCH로 실패할 수 있음: 무시
        force_kill_all(&sweep);
    }
    outcome.pattern_pids = sweep;

    Ok(outcome)
}

/// `0.0.0.0:6502`, `[::]:6502`, `:::6502`, `*:6502`, `127.0.0.1%lo:6502`
fn address_has_port(addr: &str, port: u16) -> bool {
    addr.rsplit_once(':')
        .map(|(_, p)| p == port.to_string())
        .unwrap_or(false)
}

fn push_unique(pids: &mut Vec<u32>, pid: u32) {
    if !pids.contains(&pid) {
        pids.push(pid);
    }
}

/// Parse `netstat -tlnp` (Linux) or `netstat -ano` (Windows) output.
///
/// Linux:   `tcp 0 0 0.0.0.0:6502 0.0.0.0:* LISTEN 1234/python3`
/// Windows: `TCP 0.0.0.0:6502 0.0.0.0:0 LISTENING 1234`
pub fn parse_netstat(output: &str, port: u16) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let Some(state_idx) = fields.iter().position(|f| f.starts_with("LISTEN")) else {
            continue;
        };
        // local address: 첫 번째로 ':'를 포함하는 컬럼
        let Some(local) = fields[..state_idx].iter().find(|f| f.contains(':')) else {
            continue;
        };
        if !address_has_port(local, port) {
            continue;
        }
        // PID/Program name 컬럼은 state 바로 다음. 프로그램 이름은 공백을 포함할 수 있다
        let Some(owner) = fields.get(state_idx + 1) else { continue };
        let pid_str = owner.split('/').next().unwrap_or("");
        if let Ok(pid) = pid_str.parse::<u32>() {
            push_unique(&mut pids, pid);
        }
    }
    pids
}

/// Parse `ss -ltnp` output.
///
/// `LISTEN 0 2048 0.0.0.0:6502 0.0.0.0:* users:(("gunicorn",pid=1234,fd=5),("gunicorn",pid=1240,fd=5))`
pub fn parse_ss(output: &str, port: u16) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first().map(|s| *s != "LISTEN").unwrap_or(true) {
            continue;
        }
        let Some(local) = fields.get(3) else { continue };
        if !address_has_port(local, port) {
            continue;
        }
        for chunk in line.split("pid=").skip(1) {
            let digits: String = chunk.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(pid) = digits.parse::<u32>() {
                push_unique(&mut pids, pid);
            }
        }
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_NETSTAT: &str = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 0.0.0.0:6502            0.0.0.0:*               LISTEN      4321/python3
tcp        0      0 127.0.0.1:65020         0.0.0.0:*               LISTEN      999/redis-server
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN      -
tcp6       0      0 :::6502                 :::*                    LISTEN      4321/python3
tcp6       0      0 :::16502                :::*                    LISTEN      777/other
tcp        0      0 0.0.0.0:6503            0.0.0.0:*               LISTEN      5555/gunicorn: maste
";

    const WINDOWS_NETSTAT: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:6502           0.0.0.0:0              LISTENING       5120
  TCP    192.168.0.5:50123      10.0.0.1:6502          ESTABLISHED     888
  TCP    [::]:6502              [::]:0                 LISTENING       5120
";

    const SS_OUTPUT: &str = "\
State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
LISTEN 0      2048         0.0.0.0:6502       0.0.0.0:*     users:((\"gunicorn\",pid=1240,fd=5),(\"gunicorn\",pid=1234,fd=5))
LISTEN 0      4096            [::]:6502          [::]:*     users:((\"gunicorn\",pid=1234,fd=6))
LISTEN 0      128          0.0.0.0:22         0.0.0.0:*     users:((\"sshd\",pid=612,fd=3))
";

    #[test]
    fn test_parse_linux_netstat_dedupes_v4_v6() {
        assert_eq!(parse_netstat(LINUX_NETSTAT, 6502), vec![4321]);
    }

    #[test]
    fn test_parse_netstat_exact_port_only() {
        // 65020, 16502는 6502와 다른 포트
        assert_eq!(parse_netstat(LINUX_NETSTAT, 16502), vec![777]);
        assert_eq!(parse_netstat(LINUX_NETSTAT, 65020), vec![999]);
    }

    #[test]
    fn test_parse_netstat_program_name_with_spaces() {
        // setproctitle로 바뀐 gunicorn master 이름은 잘리고 공백을 포함한다
        assert_eq!(parse_netstat(LINUX_NETSTAT, 6503), vec![5555]);
        assert_eq!(
            parse_netstat("tcp 0 0 0.0.0.0:6502 0.0.0.0:* LISTEN 4321/gunicorn: maste\n", 6502),
            vec![4321]
        );
    }

    #[test]
    fn test_parse_netstat_hidden_owner_skipped() {
        assert!(parse_netstat(LINUX_NETSTAT, 22).is_empty());
    }

    #[test]
    fn test_parse_windows_netstat_ignores_established() {
        assert_eq!(parse_netstat(WINDOWS_NETSTAT, 6502), vec![5120]);
    }

    #[test]
    fn test_parse_netstat_free_port() {
        assert!(parse_netstat(LINUX_NETSTAT, 8080).is_empty());
        assert!(parse_netstat("", 6502).is_empty());
    }

    #[test]
    fn test_parse_ss_collects_all_workers() {
        assert_eq!(parse_ss(SS_OUTPUT, 6502), vec![1240, 1234]);
        assert_eq!(parse_ss(SS_OUTPUT, 22), vec![612]);
        assert!(parse_ss(SS_OUTPUT, 80).is_empty());
    }

    #[test]
    fn test_address_has_port() {
        assert!(address_has_port("0.0.0.0:6502", 6502));
        assert!(address_has_port(":::6502", 6502));
        assert!(address_has_port("[::]:6502", 6502));
        assert!(address_has_port("*:6502", 6502));
        assert!(!address_has_port("0.0.0.0:65020", 6502));
        assert!(!address_has_port("6502", 6502));
    }

    #[test]
    fn test_tool_dispatch() {
        assert_eq!(ListingTool::Netstat.parse(LINUX_NETSTAT, 6502), vec![4321]);
        assert_eq!(ListingTool::Ss.parse(SS_OUTPUT, 6502), vec![1240, 1234]);
    }

    #[test]
    fn test_outcome_occupied() {
        let mut outcome = ReclaimOutcome { port: 6502, ..Default::default() };
        assert!(!outcome.was_occupied());
        outcome.port_pids.push(1);
        assert!(outcome.was_occupied());
    }
}
