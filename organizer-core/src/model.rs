use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State-machine position of a [`MediaFile`] (§4.7).
///
/// The only writer of this field is the status manager; transition
/// legality is decided by [`crate::status::allowed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
    NoMatch,
    Conflict,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::NoMatch => "no_match",
            Status::Conflict => "conflict",
        };
        write!(f, "{s}")
    }
}

/// Catalogue media kind, attached to a [`Guess`] and to a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    /// The opposite kind, used by the catalogue client's hybrid fallback (§4.4).
    pub fn opposite(self) -> MediaType {
        match self {
            MediaType::Movie => MediaType::Tv,
            MediaType::Tv => MediaType::Movie,
        }
    }
}

/// Structured output of the filename analyser (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    pub title: String,
    pub year: Option<u16>,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Structured output of the catalogue client (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueMatch {
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<u16>,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// The sole persistent entity (spec §3). Mirrors the `media_files` table
/// 1:1; `llm_guess`/`processed_data` round-trip through JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaFile {
    pub id: i64,
    pub device_id: i64,
    pub inode: i64,
    pub original_filepath: String,
    pub original_filename: String,
    pub file_size: i64,
    pub status: Status,
    pub retry_count: i32,
    pub tmdb_id: Option<i64>,
    pub media_type: Option<MediaType>,
    pub llm_guess: Option<serde_json::Value>,
    pub processed_data: Option<serde_json::Value>,
    pub new_filepath: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Guess {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Guess is always serializable")
    }
}

impl CatalogueMatch {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("CatalogueMatch is always serializable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_type_round_trips() {
        assert_eq!(MediaType::Movie.opposite(), MediaType::Tv);
        assert_eq!(MediaType::Tv.opposite(), MediaType::Movie);
        assert_eq!(MediaType::Movie.opposite().opposite(), MediaType::Movie);
    }

    #[test]
    fn status_display_matches_persisted_tag() {
        assert_eq!(Status::NoMatch.to_string(), "no_match");
        assert_eq!(Status::Pending.to_string(), "pending");
    }

    #[test]
    fn guess_serializes_to_object() {
        let guess = Guess {
            title: "Chernobyl".to_string(),
            year: None,
            media_type: MediaType::Tv,
            season: Some(1),
            episode: Some(2),
        };
        let value = guess.to_json();
        assert_eq!(value["title"], "Chernobyl");
        assert_eq!(value["season"], 1);
    }
}
