use std::sync::Arc;
use std::time::Duration;

use organizer_core::{FilesystemProber, IdentityRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Periodic driver of the filesystem prober and identity registry
/// (§4.8). Runs until `cancellation` fires, checking it between files and
/// between scans.
pub async fn run(
    config: Arc<Config>,
    registry: Arc<IdentityRegistry>,
    dispatcher: mpsc::Sender<i64>,
    cancellation: CancellationToken,
) {
    let prober = FilesystemProber::new()
        .with_extensions(config.video_extensions.clone())
        .with_min_file_size(config.min_file_size_bytes)
        .with_follow_symlinks(config.scan_follow_symlinks)
        .with_excluded_subtree(
            config
                .scan_exclude_target_dir
                .then(|| config.target_dir.clone()),
        );

    let mut interval = tokio::time::interval(Duration::from_secs(config.scan_interval_seconds));

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!("scanner received cancellation, stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        info!("scan started: {}", config.source_dir.display());
        let found = prober.scan(&config.source_dir);
        let mut new_rows = 0usize;

        for file in found {
            if cancellation.is_cancelled() {
                info!("scanner cancelled mid-walk, stopping before next file");
                return;
            }

            let path = file.path.to_string_lossy().to_string();
            let filename = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());

            let registered = registry
                .register_if_new(
                    &path,
                    &filename,
                    file.device_id as i64,
                    file.inode as i64,
                    file.size as i64,
                )
                .await;

            let (id, was_new) = match registered {
                Ok(result) => result,
                Err(err) => {
                    warn!("failed to register {path}: {err}");
                    continue;
                }
            };

            if !was_new {
                debug!("already known: {path}");
                continue;
            }

            new_rows += 1;
            if dispatcher.send(id).await.is_err() {
                warn!("dispatcher channel closed, stopping scan early");
                return;
            }
        }

        info!("scan complete: {new_rows} new files registered");
    }
}
