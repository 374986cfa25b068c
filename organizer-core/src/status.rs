use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::Result;
use crate::model::{MediaType, Status};

/// Pure transition-graph check (§4.7), deliberately free of any database
/// dependency so the state machine is unit-testable on its own.
pub fn allowed(from: Status, to: Status) -> bool {
    use Status::*;
    match (from, to) {
        (Pending, Processing) => true,
        (Processing, Completed | Failed | NoMatch | Conflict) => true,
        (Failed | NoMatch | Conflict, Pending) => true,
        _ => false,
    }
}

/// Result of a guarded single-row transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The row's status no longer matched the expected `from` state by
    /// the time the update ran — another worker or a retry already acted.
    Stale,
}

/// Fields written alongside a `PROCESSING -> COMPLETED` transition.
#[derive(Debug, Clone)]
pub struct CompletionFields {
    pub new_filepath: String,
    pub tmdb_id: i64,
    pub media_type: MediaType,
    pub processed_data: Value,
}

/// Performs the guarded, single-row status transitions of §4.7. Every
/// method issues exactly one `UPDATE ... WHERE id = $1 AND status = $2`
/// and reports `Stale` when `rows_affected() == 0`.
pub struct StatusManager {
    pool: PgPool,
}

impl StatusManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `PENDING -> PROCESSING`. `retry_count` is untouched here — it is
    /// bumped on the `retry()` transition that sent the row back to
    /// `PENDING` in the first place, not on the claim that picks it back
    /// up (§3: "incremented on every transition into PROCESSING after the
    /// first" is satisfied by bumping at the one point that actually
    /// distinguishes a first attempt from a subsequent one).
    pub async fn claim(&self, id: i64) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'processing', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    pub async fn complete(&self, id: i64, fields: CompletionFields) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'completed',
                new_filepath = $2,
                tmdb_id = $3,
                media_type = $4,
                processed_data = $5,
                updated_at = $6
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(fields.new_filepath)
        .bind(fields.tmdb_id)
        .bind(fields.media_type)
        .bind(fields.processed_data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    pub async fn fail(&self, id: i64, error_message: &str) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'failed', error_message = $2, updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    pub async fn no_match(&self, id: i64, error_message: Option<&str>) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'no_match', error_message = $2, updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    pub async fn conflict(&self, id: i64, new_filepath: &str, error_message: &str) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'conflict', new_filepath = $2, error_message = $3, updated_at = $4
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(new_filepath)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    /// Records the analyser's guess against an in-flight row without
    /// changing its status — the worker calls this right after a
    /// successful analyse step so `llm_guess` reflects the last attempt
    /// even if a later stage (match/path/link) fails (§3: "last analyser
    /// output").
    pub async fn record_guess(&self, id: i64, guess: Value) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET llm_guess = $2, updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(guess)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }

    /// User-initiated retry: any terminal-non-success state back to
    /// `PENDING`. This is the one transition that distinguishes a first
    /// attempt from a subsequent one, so it bumps `retry_count`
    /// unconditionally — the next `claim()` leaves it alone.
    pub async fn retry(&self, id: i64) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'pending', retry_count = retry_count + 1, updated_at = $2
            WHERE id = $1 AND status IN ('failed', 'no_match', 'conflict')
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(outcome_for(result.rows_affected()))
    }
}

fn outcome_for(rows_affected: u64) -> TransitionOutcome {
    if rows_affected == 0 {
        TransitionOutcome::Stale
    } else {
        TransitionOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    #[test]
    fn pending_can_only_move_to_processing() {
        assert!(allowed(Pending, Processing));
        assert!(!allowed(Pending, Completed));
        assert!(!allowed(Pending, Failed));
    }

    #[test]
    fn processing_can_reach_any_terminal_state() {
        for terminal in [Completed, Failed, NoMatch, Conflict] {
            assert!(allowed(Processing, terminal));
        }
        assert!(!allowed(Processing, Pending));
    }

    #[test]
    fn terminal_non_success_states_can_retry_to_pending() {
        assert!(allowed(Failed, Pending));
        assert!(allowed(NoMatch, Pending));
        assert!(allowed(Conflict, Pending));
        assert!(!allowed(Completed, Pending));
    }

    #[test]
    fn completed_is_a_dead_end() {
        for to in [Pending, Processing, Completed, Failed, NoMatch, Conflict] {
            if to != Completed {
                assert!(!allowed(Completed, to));
            }
        }
    }
}
