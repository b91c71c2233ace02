use relaunch::config::LaunchConfig;
use relaunch::pipeline;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("relaunch starting");

    let cfg = LaunchConfig::load().unwrap_or_else(|e| {
        tracing::warn!("{}, falling back to defaults", e);
        LaunchConfig::default()
    });

    let report = pipeline::run(&cfg).await;
    match serde_json::to_string(&report) {
        Ok(json) => tracing::debug!("report: {}", json),
        Err(e) => tracing::debug!("report not serializable: {}", e),
    }
    tracing::info!(
        "relaunch finished ({} of {} step(s) failed)",
        report.failures(),
        report.steps.len()
    );

    std::process::exit(report.exit_code());
}
