use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use slotwise::command::Dispatcher;
use slotwise::config::SchedulerConfig;
use slotwise::engine::Scheduler;
use slotwise::store::InMemoryStore;

const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let metrics_port: Option<u16> = std::env::var("SLOTWISE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    slotwise::observability::init(metrics_port);

    let config = Arc::new(SchedulerConfig::from_env());
    let store = match std::env::var("SLOTWISE_SNAPSHOT") {
        Ok(path) => {
            let json = tokio::fs::read_to_string(&path).await?;
            info!("loading snapshot from {path}");
            InMemoryStore::from_snapshot_json(&json)?
        }
        Err(_) => InMemoryStore::new(),
    };

    info!("slotwise ready");
    info!("  slot step: {} min", config.slot_step.num_minutes());
    info!(
        "  working hours: {}-{} (utc offset {})",
        config.working_hours.start, config.working_hours.end, config.utc_offset
    );
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let dispatcher = Dispatcher::new(Scheduler::new(Arc::new(store), config));

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled = 0u64;
    let mut prune = tokio::time::interval(LOCK_PRUNE_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let mut response = dispatcher.handle_line(&line).await;
                response.push('\n');
                stdout.write_all(response.as_bytes()).await?;
                stdout.flush().await?;
                handled += 1;
            }
            _ = prune.tick() => {
                dispatcher.prune_locks();
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("slotwise stopped after {handled} command(s)");
    Ok(())
}
