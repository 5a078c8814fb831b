/**
 * claimsync agent entry point
 *
 * Runs the offline queue and sync engine headless: probes the claims API for
 * connectivity, drains queued mutations and logs every sync event.
 */

#[cfg(feature = "agent")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use claimsync::client::api_client::HttpRemoteApi;
    use claimsync::client::config::Config;
    use claimsync::client::offline::OfflineManager;
    use claimsync::client::sync::{ConnectivityProbe, NetworkStatus, RemoteApi};
    use std::sync::Arc;

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "claimsync=debug".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        server_url = config.server_url(),
        db_path = %config.db_path().display(),
        "Starting claimsync agent"
    );

    let api: Arc<dyn RemoteApi> = Arc::new(HttpRemoteApi::new(config.clone())?);
    let manager = OfflineManager::open(config.clone(), Arc::clone(&api)).await?;

    // Skip the debounce window for the very first observation.
    let monitor = Arc::clone(manager.engine().monitor());
    monitor.force(NetworkStatus::from_online(api.health_check().await));
    let _probe = ConnectivityProbe::spawn(api, monitor, config.sync().debounce);

    let mut events = manager.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => tracing::info!(event = %line, "Sync event"),
                    Err(e) => tracing::warn!(error = %e, "Unserializable sync event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    manager.start().await;

    let report = manager.status_report().await;
    tracing::info!(
        queue_depth = report.queue_depth,
        dead_lettered = report.dead_lettered,
        open_conflicts = report.open_conflicts,
        "Agent ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    manager.stop().await;

    Ok(())
}

#[cfg(not(feature = "agent"))]
fn main() {
    eprintln!("The agent requires the 'agent' feature to be enabled.");
    eprintln!("Run with: cargo run --bin claimsync-agent --features agent");
    std::process::exit(1);
}
