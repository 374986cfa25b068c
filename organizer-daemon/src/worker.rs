use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use organizer_core::{
    generate_destination, link, AnalyserClient, CatalogueClient, CompletionFields, ErrorKind,
    IdentityRegistry, LinkOutcome, SearchOutcome, StatusManager, TransitionOutcome,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// One long-running worker (§4.9). Pulls ids one at a time from the
/// shared receiver and drives the six-step pipeline for each.
pub async fn run(
    worker_id: usize,
    config: Arc<Config>,
    registry: Arc<IdentityRegistry>,
    status: Arc<StatusManager>,
    analyser: Arc<dyn AnalyserClient>,
    catalogue: Arc<dyn CatalogueClient>,
    queue: Arc<Mutex<mpsc::Receiver<i64>>>,
    cancellation: CancellationToken,
) {
    info!("worker {worker_id} started");

    // Deliberately does not race `recv()` against `cancellation.cancelled()`:
    // the scanner keeps its sender alive until it has itself observed
    // cancellation and stopped producing, and may be blocked in
    // `send().await` on a full channel until a worker polls again. Racing
    // here would let a worker exit early while ids are still buffered or
    // the scanner is still waiting for a receiver, stranding a full channel
    // forever. Workers instead keep draining until the channel is closed
    // *and* empty (`recv()` returns `None`), which only happens once the
    // scanner has exited and dropped its sender; cancellation is still
    // honoured inside `process_one` for aborting in-flight work.
    loop {
        let id = match queue.lock().await.recv().await {
            Some(id) => id,
            None => {
                info!("worker {worker_id}: dispatcher channel closed and drained, stopping");
                return;
            }
        };

        let outcome = AssertUnwindSafe(process_one(
            &config,
            &registry,
            &status,
            &analyser,
            &catalogue,
            id,
            &cancellation,
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("worker {worker_id} failed to finalise id {id}: {err}"),
            Err(panic) => {
                error!("worker {worker_id} pipeline panicked on id {id}: {panic:?}");
                if let Err(err) = status.fail(id, "internal error: pipeline panicked").await {
                    warn!("failed to record panic failure for id {id}: {err}");
                }
            }
        }
    }
}

async fn process_one(
    config: &Config,
    registry: &IdentityRegistry,
    status: &StatusManager,
    analyser: &Arc<dyn AnalyserClient>,
    catalogue: &Arc<dyn CatalogueClient>,
    id: i64,
    cancellation: &CancellationToken,
) -> organizer_core::Result<()> {
    // Step 1: claim.
    match status.claim(id).await? {
        TransitionOutcome::Applied => {}
        TransitionOutcome::Stale => {
            debug!("id {id} was already claimed or retried away, skipping");
            return Ok(());
        }
    }

    let file = registry.get(id).await?;

    if cancellation.is_cancelled() {
        status.fail(id, "cancelled before processing started").await?;
        return Ok(());
    }

    // Step 2: analyse.
    let guess = match analyser.analyse(&file.original_filename).await {
        Ok(guess) => guess,
        Err(err) => {
            let kind = if err.is_retryable() {
                ErrorKind::AnalyserTransient
            } else {
                ErrorKind::AnalyserPermanent
            };
            status.fail(id, &format!("{kind}: {err}")).await?;
            return Ok(());
        }
    };

    if let Err(err) = status.record_guess(id, guess.to_json()).await {
        warn!("failed to persist analyser guess for id {id}: {err}");
    }

    // Step 3: match.
    let media_match = match catalogue.search(&guess).await {
        Ok(SearchOutcome::Match(m)) => m,
        Ok(SearchOutcome::NoMatch) => {
            status
                .no_match(id, Some(&format!("{}: catalogue returned no results", ErrorKind::NoMatch)))
                .await?;
            return Ok(());
        }
        Err(err) => {
            let kind = if err.is_retryable() {
                ErrorKind::CatalogueTransient
            } else {
                ErrorKind::CataloguePermanent
            };
            status.fail(id, &format!("{kind}: {err}")).await?;
            return Ok(());
        }
    };

    // Step 4: path.
    let extension = std::path::Path::new(&file.original_filepath)
        .extension()
        .and_then(|e| e.to_str());
    let destination = match generate_destination(&config.target_dir, &media_match, extension) {
        Ok(path) => path,
        Err(err) => {
            status
                .fail(id, &format!("{}: {err}", ErrorKind::PathInsufficient))
                .await?;
            return Ok(());
        }
    };

    // Step 5: link (blocking syscalls, offloaded).
    let source = file.original_filepath.clone();
    let destination_clone = destination.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        link(std::path::Path::new(&source), &destination_clone)
    })
    .await
    .map_err(|e| {
        organizer_core::MediaError::InvalidMedia(format!("link task panicked: {e}"))
    })?;

    let destination_str = destination.to_string_lossy().to_string();

    match outcome {
        LinkOutcome::Success => {
            status
                .complete(
                    id,
                    CompletionFields {
                        new_filepath: destination_str,
                        tmdb_id: media_match.tmdb_id,
                        media_type: media_match.media_type,
                        processed_data: media_match.to_json(),
                    },
                )
                .await?;
        }
        LinkOutcome::Conflict => {
            status
                .conflict(id, &destination_str, "destination exists")
                .await?;
        }
        LinkOutcome::CrossDevice => {
            status
                .fail(
                    id,
                    &format!(
                        "{}: source and destination on different filesystems",
                        ErrorKind::LinkCrossDevice
                    ),
                )
                .await?;
        }
        LinkOutcome::NoSource => {
            status
                .fail(
                    id,
                    &format!("{}: source disappeared before linking", ErrorKind::LinkMissingSource),
                )
                .await?;
        }
        LinkOutcome::Unknown(msg) => {
            status
                .fail(id, &format!("{}: {msg}", ErrorKind::LinkUnknown))
                .await?;
        }
    }

    Ok(())
}
