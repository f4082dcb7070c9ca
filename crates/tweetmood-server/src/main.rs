mod api;
mod middleware;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tweetmood_core::AppConfig;
use tweetmood_db::{PersistenceGateway, PgRecordStore, RecordStore, TableNames};
use tweetmood_sentiment::{
    BatchConfig, BatchOrchestrator, ClassifierConfig, Classify, IngestError, IngestionTrigger,
    PipelineConfig, ProcessingPipeline, SentimentClassifierClient,
};

use crate::{
    api::{build_app, AppState, SharedPipeline},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = tweetmood_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = tweetmood_db::PoolConfig::from_app_config(&config);
    let pool = tweetmood_db::connect_pool(&config.database_url, pool_config).await?;
    tweetmood_db::health_check(&pool).await?;

    let pipeline = build_shared_pipeline(&config, Arc::new(PgRecordStore::new(pool))).await?;
    let ingest = match IngestionTrigger::from_app_config(&config) {
        Ok(trigger) => Some(Arc::new(trigger)),
        Err(IngestError::NotConfigured) => {
            tracing::info!("ingestion webhook not configured; POST /api/v1/ingest disabled");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let shutdown = CancellationToken::new();
    let auth = AuthState::new(
        &config.api_keys,
        matches!(config.env, tweetmood_core::Environment::Development),
    )?;
    let app = build_app(
        AppState::new(Arc::new(pipeline), ingest, shutdown.clone()),
        auth,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "tweetmood server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

async fn build_shared_pipeline(
    config: &AppConfig,
    store: Arc<dyn RecordStore>,
) -> anyhow::Result<SharedPipeline> {
    let client = Arc::new(SentimentClassifierClient::new(
        ClassifierConfig::from_app_config(config),
    )?);
    let backend = client.warm_up().await;
    tracing::info!(backend = %backend.name, "classifier backend selected");

    let classifier: Arc<dyn Classify> = client;
    Ok(ProcessingPipeline::new(
        PersistenceGateway::new(store, TableNames::from_app_config(config)),
        BatchOrchestrator::new(classifier, BatchConfig::from_app_config(config)),
        PipelineConfig::from_app_config(config),
    ))
}

/// Resolves on ctrl-c or SIGTERM and cancels background runs.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
    shutdown.cancel();
}
