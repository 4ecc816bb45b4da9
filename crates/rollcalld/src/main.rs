use anyhow::Result;
use rollcall_client::DetectionClient;
use rollcall_store::Store;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod dbus_interface;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let cfg = config::Config::load();
    tracing::info!(
        service_url = %cfg.service_url,
        camera = %cfg.camera_device,
        interval_ms = cfg.capture_interval_ms,
        tardy = %cfg.tardy_rule,
        "configuration loaded"
    );

    let store = Store::open(&cfg.db_path).await?;
    let client = DetectionClient::new(
        cfg.service_url.clone(),
        Duration::from_secs(cfg.request_timeout_secs),
    )?;
    let controller = session::SessionController::new(cfg, client, store);
    let service = dbus_interface::RollcallService::new(controller);

    let _conn = zbus::connection::Builder::session()?
        .name("org.campus.Rollcall1")?
        .serve_at("/org/campus/Rollcall1", service)?
        .build()
        .await?;

    tracing::info!("rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
