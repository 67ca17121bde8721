pub mod attest;
pub mod config;
pub mod http;
pub mod primus;
pub mod store;

use std::sync::Arc;

use anyhow::Context as _;

pub async fn run(cfg: config::Config) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    tracing::info!("Starting passbind");

    let store = store::open_store(&cfg).await?;

    let broker = Arc::new(primus::PrimusBroker::new(
        cfg.primus_app_id.clone(),
        cfg.primus_app_secret.clone(),
        cfg.primus_base_url.clone(),
    ));

    let attest_opts = attest::AttestOptions {
        strict_nonce: cfg.strict_nonce,
        rp_id_hash: cfg.app_id.as_deref().map(|id| {
            use sha2::Digest as _;
            sha2::Sha256::digest(id.as_bytes()).into()
        }),
    };

    let state = http::AppState {
        store,
        broker,
        attest_opts: Arc::new(attest_opts),
    };

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("bind tcp {}", cfg.listen))?;
    tracing::info!(addr = %listener.local_addr()?, "passbind listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve tcp")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
