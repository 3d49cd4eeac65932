use dotenv::dotenv;
use recova_backend::accounts::AccountService;
use recova_backend::api::{self, AppState};
use recova_backend::breaker::{BreakerConfig, CircuitBreaker};
use recova_backend::cache::{init_cache_pool, CacheConfig, RedisStore};
use recova_backend::config::Config;
use recova_backend::database::account_repository::AccountRepository;
use recova_backend::database::activity_repository::ActivityRepository;
use recova_backend::database::payment_repository::PaymentRepository;
use recova_backend::database::processor_repository::ProcessorRepository;
use recova_backend::database::{init_pool, PoolConfig};
use recova_backend::payments::{
    IdempotencyStore, PaymentOrchestrator, WebhookProcessor, WebhookVerifier,
};
use recova_backend::processor::{ProcessorClient, StripeGateway};
use recova_backend::tasks::PaymentWorker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenv().ok();
    info!("Starting Recova backend service");

    let config = Config::from_env()?;

    // Database connection pool
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..Default::default()
    };
    let db_pool = init_pool(&config.database.url, Some(pool_config)).await?;
    info!("Database connection pool initialized");

    // Redis pool backing the idempotency store and circuit breaker
    let cache_config = CacheConfig {
        redis_url: config.redis.url.clone(),
        ..Default::default()
    };
    let cache_pool = init_cache_pool(cache_config).await?;
    info!("Cache connection pool initialized");

    let store = Arc::new(RedisStore::new(cache_pool.clone()));
    let breaker = Arc::new(CircuitBreaker::new(
        "stripe",
        store.clone(),
        BreakerConfig::from_env(),
    ));
    let gateway = Arc::new(StripeGateway::from_env()?);
    let client = Arc::new(ProcessorClient::new(gateway, breaker));
    let idempotency = IdempotencyStore::new(store);

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        PaymentRepository::new(db_pool.clone()),
        AccountRepository::new(db_pool.clone()),
        ActivityRepository::new(db_pool.clone()),
        ProcessorRepository::new(db_pool.clone()),
        client.clone(),
        idempotency.clone(),
    ));
    let accounts = Arc::new(AccountService::new(
        AccountRepository::new(db_pool.clone()),
        ActivityRepository::new(db_pool.clone()),
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        WebhookVerifier::new(
            config.webhook.signing_secret.clone(),
            config.webhook.tolerance_secs,
        ),
        PaymentRepository::new(db_pool.clone()),
        ActivityRepository::new(db_pool.clone()),
        idempotency,
    ));

    // Background reconciliation worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = PaymentWorker::new(
        PaymentRepository::new(db_pool.clone()),
        orchestrator.clone(),
        client,
        config.worker.clone(),
    );
    let worker_handle = tokio::spawn(worker.run_reconciler(shutdown_rx));

    let app = api::router(AppState {
        orchestrator,
        accounts,
        webhooks,
        db_pool,
        cache_pool,
        environment: config.server.environment.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the background worker once the server has drained
    let _ = shutdown_tx.send(true);
    worker_handle.await?;

    info!("Recova backend stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
