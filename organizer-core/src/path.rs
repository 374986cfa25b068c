use std::path::{Path, PathBuf};

use crate::model::{CatalogueMatch, MediaType};

/// Characters disallowed by common target filesystems (§4.5).
const DISALLOWED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Strips disallowed characters, collapses internal whitespace, and
/// trims leading/trailing dots and whitespace.
pub fn sanitise_title(title: &str) -> String {
    let stripped: String = title.chars().filter(|c| !DISALLOWED.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string()
}

/// Raised when the catalogue match lacks a field the chosen layout requires.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PathError {
    #[error("TV layout requires an episode number, none was provided")]
    MissingEpisode,
}

/// Computes the canonical destination path for a completed match and the
/// file's original extension. Pure and deterministic (§4.5).
pub fn generate_destination(
    root: &Path,
    media_match: &CatalogueMatch,
    original_extension: Option<&str>,
) -> Result<PathBuf, PathError> {
    let title = sanitise_title(&media_match.title);
    let ext = original_extension.unwrap_or("");

    match media_match.media_type {
        MediaType::Movie => {
            let folder = match media_match.year {
                Some(year) => format!("{title} ({year})"),
                None => title.clone(),
            };
            let filename = if ext.is_empty() {
                folder.clone()
            } else {
                format!("{folder}.{ext}")
            };
            Ok(root.join("Movies").join(&folder).join(filename))
        }
        MediaType::Tv => {
            let episode = media_match.episode.ok_or(PathError::MissingEpisode)?;
            let season = media_match.season.unwrap_or(1);
            let folder = match media_match.year {
                Some(year) => format!("{title} ({year})"),
                None => title.clone(),
            };
            let episode_tag = format!("S{season:02}E{episode:02}");
            let filename = if ext.is_empty() {
                format!("{title} - {episode_tag}")
            } else {
                format!("{title} - {episode_tag}.{ext}")
            };
            Ok(root
                .join("TV")
                .join(&folder)
                .join(format!("Season {season:02}"))
                .join(filename))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(title: &str, year: Option<u16>) -> CatalogueMatch {
        CatalogueMatch {
            tmdb_id: 1,
            title: title.to_string(),
            year,
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    fn tv(title: &str, year: Option<u16>, season: Option<u32>, episode: Option<u32>) -> CatalogueMatch {
        CatalogueMatch {
            tmdb_id: 2,
            title: title.to_string(),
            year,
            media_type: MediaType::Tv,
            season,
            episode,
        }
    }

    #[test]
    fn sanitise_strips_disallowed_characters_and_collapses_whitespace() {
        assert_eq!(sanitise_title("Se7en: Director's Cut"), "Se7en Director's Cut");
        assert_eq!(sanitise_title("  Too   Much   Space  "), "Too Much Space");
        assert_eq!(sanitise_title("...Trailing Dots..."), "Trailing Dots");
    }

    #[test]
    fn movie_layout_matches_spec_example() {
        let m = movie("Inception", Some(2010));
        let dest = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap();
        assert_eq!(
            dest,
            PathBuf::from("/t/Movies/Inception (2010)/Inception (2010).mkv")
        );
    }

    #[test]
    fn movie_layout_omits_year_and_parens_when_unknown() {
        let m = movie("Primer", None);
        let dest = generate_destination(Path::new("/t"), &m, Some("mp4")).unwrap();
        assert_eq!(dest, PathBuf::from("/t/Movies/Primer/Primer.mp4"));
    }

    #[test]
    fn tv_layout_matches_spec_example() {
        let m = tv("Chernobyl", Some(2019), Some(1), Some(2));
        let dest = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap();
        assert_eq!(
            dest,
            PathBuf::from("/t/TV/Chernobyl (2019)/Season 01/Chernobyl - S01E02.mkv")
        );
    }

    #[test]
    fn tv_layout_defaults_missing_season_to_one() {
        let m = tv("Chernobyl", Some(2019), None, Some(2));
        let dest = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap();
        assert!(dest.to_string_lossy().contains("Season 01"));
    }

    #[test]
    fn tv_layout_without_episode_is_an_error() {
        let m = tv("Chernobyl", Some(2019), Some(1), None);
        let err = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap_err();
        assert!(matches!(err, PathError::MissingEpisode));
    }

    #[test]
    fn generation_is_deterministic() {
        let m = movie("Inception", Some(2010));
        let a = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap();
        let b = generate_destination(Path::new("/t"), &m, Some("mkv")).unwrap();
        assert_eq!(a, b);
    }
}
