use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use swift_portal::{
    airtable::{build_client, build_store},
    config::AppConfig,
    create_router,
    mailer::ResendMailer,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        airtable_api_key = %config.redacted_airtable_key(),
        airtable_base_configured = config.airtable_base_id.is_some(),
        resend_api_key = %config.redacted_resend_key(),
        internal_recipients = config.internal_alert_recipients.len(),
        max_upload_bytes = config.max_upload_bytes,
        "loaded portal configuration"
    );

    let client = build_client()?;
    let records = Arc::new(build_store(client.clone(), &config));
    let mailer = Arc::new(ResendMailer::new(
        client,
        config.resend_api_url.clone(),
        config.resend_api_key.clone(),
    ));

    let address = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config, records, mailer);
    let app = create_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "portal listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("portal received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
