use std::path::PathBuf;

use anyhow::{Context, Result};

/// Typed configuration, built once at startup from the environment
/// (SPEC_FULL §2 item 12, §6). Unlike `server/src/config.rs`'s
/// `unwrap_or(default)` style, a key that is *present* but malformed is a
/// startup error here rather than a silently substituted default — a
/// mistyped `WORKER_COUNT=abc` should refuse to start, not quietly run
/// with a wrong value.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub scan_interval_seconds: u64,
    pub video_extensions: Vec<String>,
    pub min_file_size_bytes: u64,
    pub scan_exclude_target_dir: bool,
    pub scan_follow_symlinks: bool,
    pub worker_count: usize,
    pub tmdb_concurrency: usize,
    pub tmdb_language: String,
    pub tmdb_api_key: String,
    pub enable_tmdb: bool,
    pub enable_llm: bool,
    pub database_url: String,
    pub analyser_endpoint: String,
    pub analyser_api_key: Option<String>,
    pub analyser_cache_capacity: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            source_dir: required_path("SOURCE_DIR")?,
            target_dir: required_path("TARGET_DIR")?,
            scan_interval_seconds: parse_or_default("SCAN_INTERVAL_SECONDS", 300)?,
            video_extensions: extensions_or_default()?,
            min_file_size_bytes: parse_or_default::<u64>("MIN_FILE_SIZE_MB", 0)? * 1024 * 1024,
            scan_exclude_target_dir: parse_or_default("SCAN_EXCLUDE_TARGET_DIR", true)?,
            scan_follow_symlinks: parse_or_default("SCAN_FOLLOW_SYMLINKS", false)?,
            worker_count: parse_required("WORKER_COUNT", "1")?,
            tmdb_concurrency: parse_or_default("TMDB_CONCURRENCY", 10)?,
            tmdb_language: std::env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "en-US".to_string()),
            tmdb_api_key: std::env::var("TMDB_API_KEY").unwrap_or_default(),
            enable_tmdb: parse_or_default("ENABLE_TMDB", true)?,
            enable_llm: parse_or_default("ENABLE_LLM", true)?,
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            analyser_endpoint: std::env::var("ANALYSER_ENDPOINT")
                .context("ANALYSER_ENDPOINT must be set")?,
            analyser_api_key: std::env::var("ANALYSER_API_KEY").ok(),
            analyser_cache_capacity: parse_or_default("ANALYSER_CACHE_CAPACITY", 256)?,
            log_level: std::env::var("LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn worker_count_at_least_one(&self) -> usize {
        self.worker_count.max(1)
    }
}

fn required_path(key: &str) -> Result<PathBuf> {
    std::env::var(key)
        .map(PathBuf::from)
        .with_context(|| format!("{key} must be set"))
}

/// Parses `key` when present, applying `default` when absent. A present
/// value that fails to parse is a hard error rather than a fallback.
fn parse_or_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is set to {raw:?} but failed to parse: {e}")),
        Err(_) => Ok(default),
    }
}

/// Like `parse_or_default`, but `fallback` is itself a default *string* to
/// parse when the key is absent — used where a literal default value
/// can't be expressed generically (e.g. `usize`).
fn parse_required<T: std::str::FromStr>(key: &str, fallback: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| fallback.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{key} is set to {raw:?} but failed to parse: {e}"))
}

fn extensions_or_default() -> Result<Vec<String>> {
    match std::env::var("VIDEO_EXTENSIONS") {
        Ok(raw) => {
            let extensions: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if extensions.is_empty() {
                anyhow::bail!("VIDEO_EXTENSIONS is set but contains no usable extensions");
            }
            Ok(extensions)
        }
        Err(_) => Ok(organizer_core::FilesystemProber::default().extensions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialise tests that
    // touch them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "SOURCE_DIR",
            "TARGET_DIR",
            "SCAN_INTERVAL_SECONDS",
            "VIDEO_EXTENSIONS",
            "MIN_FILE_SIZE_MB",
            "WORKER_COUNT",
            "DATABASE_URL",
            "ANALYSER_ENDPOINT",
            "TMDB_API_KEY",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn malformed_present_key_is_an_error_not_a_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("SOURCE_DIR", "/s");
        std::env::set_var("TARGET_DIR", "/t");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("ANALYSER_ENDPOINT", "http://localhost:9000");
        std::env::set_var("WORKER_COUNT", "not-a-number");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("WORKER_COUNT"));
        clear_all();
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("SOURCE_DIR", "/s");
        std::env::set_var("TARGET_DIR", "/t");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("ANALYSER_ENDPOINT", "http://localhost:9000");

        let config = Config::from_env().unwrap();
        assert_eq!(config.scan_interval_seconds, 300);
        assert_eq!(config.worker_count, 1);
        assert!(config.enable_tmdb);
        clear_all();
    }
}
