use login_shield::{
    api::create_router,
    config::Config,
    observability::init_tracing,
    rate_limit::{build_store, LimiterPolicy, LoginGate},
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; invalid limiter settings stop the process here
    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config.observability)?;

    tracing::info!("Starting Login Shield service");
    tracing::info!("Configuration loaded: {:?}", config.server);

    let policy = LimiterPolicy::from_config(&config.rate_limit)?;
    tracing::info!(
        window_ms = policy.window_ms(),
        max_attempts = policy.max_attempts(),
        block_ms = policy.block_ms(),
        "Login rate limit policy configured"
    );

    let store = build_store(&config)?;
    let gate = Arc::new(LoginGate::new(store, policy, &config.rate_limit));

    let app = create_router(gate, config.observability.metrics_enabled);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Login Shield service is ready to accept requests");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    tracing::info!("Login Shield service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
