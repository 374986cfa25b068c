use std::sync::Arc;

use organizer_core::{
    db, AnalyserClient, CatalogueClient, HttpAnalyserClient, IdentityRegistry, StatusManager,
    TmdbCatalogueClient,
};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::dispatcher;
use crate::scanner_task;
use crate::worker;

/// Owns every long-lived resource of the pipeline and coordinates
/// startup/shutdown (§4.10): the pool, the dispatcher channel, the
/// cancellation token, and the join handles for the scanner and all
/// workers.
pub struct Lifecycle {
    cancellation: CancellationToken,
    scanner_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
    pool: PgPool,
}

impl Lifecycle {
    pub async fn start(config: Config) -> organizer_core::Result<Self> {
        let config = Arc::new(config);
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let registry = Arc::new(IdentityRegistry::new(pool.clone()));
        let status = Arc::new(StatusManager::new(pool.clone()));
        let analyser: Arc<dyn AnalyserClient> = Arc::new(HttpAnalyserClient::new(
            config.analyser_endpoint.clone(),
            config.analyser_api_key.clone(),
            config.analyser_cache_capacity,
            config.enable_llm,
        ));
        let catalogue: Arc<dyn CatalogueClient> = Arc::new(TmdbCatalogueClient::new(
            config.tmdb_api_key.clone(),
            config.tmdb_language.clone(),
            config.tmdb_concurrency,
            config.enable_tmdb,
        ));

        let worker_count = config.worker_count_at_least_one();
        let (sender, receiver) = dispatcher::channel(worker_count);
        let shared_receiver = Arc::new(Mutex::new(receiver));
        let cancellation = CancellationToken::new();

        let scanner_handle = tokio::spawn(scanner_task::run(
            config.clone(),
            registry.clone(),
            sender,
            cancellation.clone(),
        ));

        let mut worker_handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            worker_handles.push(tokio::spawn(worker::run(
                worker_id,
                config.clone(),
                registry.clone(),
                status.clone(),
                analyser.clone(),
                catalogue.clone(),
                shared_receiver.clone(),
                cancellation.clone(),
            )));
        }

        info!("lifecycle started with {worker_count} workers");

        Ok(Self {
            cancellation,
            scanner_handle,
            worker_handles,
            pool,
        })
    }

    /// Signals cancellation, waits for the scanner to stop producing and
    /// drop its sender (closing the dispatcher channel), then waits for
    /// every worker to drain whatever was still buffered and exit, then
    /// closes the store. Awaiting the scanner before the workers matters:
    /// the channel only closes once the scanner's `run` returns, and
    /// workers rely on that close (not on `cancellation` directly) to stop
    /// `recv()`-ing, so this order is what actually drains the queue
    /// instead of racing a full channel against an early worker exit.
    pub async fn shutdown(self) {
        self.cancellation.cancel();

        if let Err(err) = self.scanner_handle.await {
            tracing::warn!("scanner task join error during shutdown: {err}");
        }

        for handle in self.worker_handles {
            if let Err(err) = handle.await {
                tracing::warn!("worker task join error during shutdown: {err}");
            }
        }

        self.pool.close().await;
        info!("lifecycle shut down");
    }
}
