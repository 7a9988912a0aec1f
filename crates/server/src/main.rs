//! Process bootstrap: configuration, logging, dependency wiring, serving.

mod response;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shardgate_core::client::HttpCaller;
use shardgate_core::config::{AppConfig, LoggingConfig};
use shardgate_core::encoding::{HexAddressCodec, JsonMarshaller, Sha256Hasher};
use shardgate_core::observer::ObserverPool;
use shardgate_core::outcome::OutcomeParser;
use shardgate_core::process::{
    AccountProcessor, BaseProcessor, LogsMerger, NetworkProcessor, TransactionProcessor,
    ValidatorProcessor, VmQueryProcessor,
};
use shardgate_core::routing::MaskShardRouter;

use router::AppState;

/// Initializes the tracing subscriber from the logging configuration.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,shardgate_core={level},shardgate_server={level}",
            level = config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(false))
            .init();
    }
}

/// Wires the processors with explicit dependency injection.
fn build_state(config: &AppConfig) -> Result<AppState> {
    let caller = Arc::new(
        HttpCaller::new(config.request_timeout()).context("building the observer caller")?,
    );
    let pool = Arc::new(ObserverPool::new(config.to_observers()));
    let shard_router = Arc::new(MaskShardRouter::new(config.general.shard_count));
    let codec = Arc::new(HexAddressCodec::strict(config.general.address_length));
    let hasher = Arc::new(Sha256Hasher);

    let base = BaseProcessor::new(pool, shard_router, caller);

    Ok(AppState {
        transactions: TransactionProcessor::new(
            base.clone(),
            codec.clone(),
            hasher.clone(),
            Arc::new(JsonMarshaller),
            OutcomeParser,
            LogsMerger::new(hasher),
            config.general.mempool_api_enabled,
        ),
        network: NetworkProcessor::new(base.clone()),
        validators: ValidatorProcessor::new(base.clone()),
        vm_queries: VmQueryProcessor::new(base.clone(), codec.clone()),
        accounts: AccountProcessor::new(base, codec),
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SHARDGATE_CONFIG").ok())
        .map(PathBuf::from);

    let config =
        AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.logging);

    let state = Arc::new(build_state(&config)?);
    let app = router::build(state);

    let address = format!("{}:{}", config.server.bind_address, config.server.bind_port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;

    tracing::info!(
        %address,
        shards = config.general.shard_count,
        observers = config.observers.len(),
        mempool_api = config.general.mempool_api_enabled,
        "shardgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    Ok(())
}
