use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::{
    api::{create_router, AppState},
    checkout::Checkout,
    config::Config,
    crypto::{CredentialHasher, SessionIssuer},
    db::{self, SqliteProductDb, SqlitePurchaseDb, SqliteUserDb},
    error::AppError,
    ledger::{HttpLedger, MemoryLedger, PaymentOracle},
    models::{purchase_service, Users},
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting storefront server v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("✅ Configuration loaded");

    let pool = db::connect(&config).await?;
    tracing::info!("✅ Database connected and migrated: {}", config.database_url);

    let hasher = Arc::new(CredentialHasher::new(&config.password_pepper)?);
    let sessions = Arc::new(SessionIssuer::new(
        config.session_key.as_bytes(),
        config.session_ttl(),
    )?);
    tracing::info!(
        "✅ Session issuer ready (tokens valid {} min)",
        config.session_ttl_minutes
    );

    let (ledger, store_wallet) = connect_ledger(&config).await?;

    let users = Arc::new(Users::new(
        Arc::new(SqliteUserDb::new(pool.clone())),
        hasher,
        sessions.clone(),
        ledger.clone(),
        config.ledger_timeout(),
    ));
    let products = Arc::new(SqliteProductDb::new(pool.clone()));
    let purchases = purchase_service(Arc::new(SqlitePurchaseDb::new(pool.clone())));
    let checkout = Arc::new(Checkout::new(
        products.clone(),
        purchases.clone(),
        ledger.clone(),
        store_wallet.clone(),
        config.ledger_timeout(),
    ));

    let state = AppState {
        users,
        products,
        purchases,
        checkout,
        sessions,
        ledger,
        config: config.clone(),
        store_wallet,
    };

    let app = create_router(state);

    // Bind and serve
    let addr = config.server_address();
    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("🏥 Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Remote gateway when `LEDGER_URL` is set, otherwise an in-process ledger
/// with a freshly opened store account.
async fn connect_ledger(config: &Config) -> Result<(Arc<dyn PaymentOracle>, String), AppError> {
    if let Some(url) = &config.ledger_url {
        let ledger = HttpLedger::new(url, config.ledger_timeout())?;
        let store_wallet = config
            .store_wallet_address
            .clone()
            .ok_or_else(|| AppError::Config("STORE_WALLET_ADDRESS is required".to_string()))?;
        tracing::info!("✅ Ledger gateway: {}", url);
        return Ok((Arc::new(ledger), store_wallet));
    }

    let ledger = MemoryLedger::new(config.ledger_starting_balance);
    let store_wallet = match &config.store_wallet_address {
        Some(address) => address.clone(),
        None => ledger.open_account().await?.address,
    };
    tracing::warn!(
        "⚠️  No LEDGER_URL set; using in-process ledger (balances are not persisted)"
    );
    Ok((Arc::new(ledger), store_wallet))
}
