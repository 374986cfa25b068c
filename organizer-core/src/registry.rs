use sqlx::PgPool;

use crate::error::Result;
use crate::model::MediaFile;

/// Persistent mapping from `(device_id, inode)` to a `MediaFile` id
/// (§4.2). Implementations must make registration idempotent under
/// concurrent scans.
pub struct IdentityRegistry {
    pool: PgPool,
}

impl IdentityRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a newly-probed file if its `(device_id, inode)` pair is
    /// not already known. Returns the row id and whether it was newly
    /// created. On conflict the existing row wins untouched — the
    /// registry never rewrites `original_filepath` for a file already
    /// known, per §3's "not updated even if the file is renamed on disk".
    pub async fn register_if_new(
        &self,
        path: &str,
        filename: &str,
        device_id: i64,
        inode: i64,
        size: i64,
    ) -> Result<(i64, bool)> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO media_files
                (device_id, inode, original_filepath, original_filename, file_size, status, retry_count)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0)
            ON CONFLICT (device_id, inode) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(device_id)
        .bind(inode)
        .bind(path)
        .bind(filename)
        .bind(size)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok((id, true));
        }

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM media_files WHERE device_id = $1 AND inode = $2",
        )
        .bind(device_id)
        .bind(inode)
        .fetch_one(&self.pool)
        .await?;

        Ok((id, false))
    }

    /// Fetches the full row for a claimed id, used by the worker to read
    /// `original_filepath`/`original_filename` before running the pipeline.
    pub async fn get(&self, id: i64) -> Result<MediaFile> {
        let file = sqlx::query_as::<_, MediaFile>("SELECT * FROM media_files WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(file)
    }
}
