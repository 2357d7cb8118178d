//! Parser for JSON-lines dataset exports of the collaborator stores.
//!
//! A dataset directory holds one file per collection, one JSON object per line:
//! - movies.jsonl:    {"id", "title", "genres": [..], "rating", "creation_date"}
//! - watches.jsonl:   {"user_id", "movie_id", "complete", "timestamp"}
//! - likes.jsonl:     {"user_id", "movie_id", "rating", "timestamp"}  (rating 0-10)
//! - bookmarks.jsonl: {"user_id", "movie_id", "timestamp"}
//!
//! movies.jsonl is required. A missing interaction file is an empty
//! collection, since having no interactions yet is a normal state.

use crate::error::{DataLoadError, Result};
use crate::types::{Interaction, Movie, MovieId, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::info;

pub const MOVIES_FILE: &str = "movies.jsonl";
pub const WATCHES_FILE: &str = "watches.jsonl";
pub const LIKES_FILE: &str = "likes.jsonl";
pub const BOOKMARKS_FILE: &str = "bookmarks.jsonl";

#[derive(Debug, Deserialize)]
struct WatchRecord {
    user_id: UserId,
    movie_id: MovieId,
    complete: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LikeRecord {
    user_id: UserId,
    movie_id: MovieId,
    rating: f32,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BookmarkRecord {
    user_id: UserId,
    movie_id: MovieId,
    timestamp: DateTime<Utc>,
}

/// Everything read from a dataset directory
#[derive(Debug, Default)]
pub struct Dataset {
    pub movies: Vec<Movie>,
    pub interactions: Vec<Interaction>,
}

impl Dataset {
    /// Load all four collections, parsing the files in parallel
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        info!("Loading dataset from {:?}", data_dir);

        let movies_path = data_dir.join(MOVIES_FILE);
        let watches_path = data_dir.join(WATCHES_FILE);
        let likes_path = data_dir.join(LIKES_FILE);
        let bookmarks_path = data_dir.join(BOOKMARKS_FILE);

        let ((movies, watches), (likes, bookmarks)) = rayon::join(
            || {
                rayon::join(
                    || parse_movies(&movies_path),
                    || parse_watches(&watches_path),
                )
            },
            || {
                rayon::join(
                    || parse_likes(&likes_path),
                    || parse_bookmarks(&bookmarks_path),
                )
            },
        );

        let movies = movies?;
        let mut interactions = watches?;
        interactions.extend(likes?);
        interactions.extend(bookmarks?);

        info!(
            "Loaded {} movies and {} interactions",
            movies.len(),
            interactions.len()
        );
        Ok(Self {
            movies,
            interactions,
        })
    }
}

/// Read non-empty lines of a file together with their 1-based line numbers
fn read_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;

    Ok(content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim().to_string()))
        .filter(|(_, line)| !line.is_empty())
        .collect())
}

fn parse_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    read_lines(path)?
        .into_iter()
        .map(|(line_no, line)| {
            serde_json::from_str(&line).map_err(|e| DataLoadError::ParseError {
                file: file.clone(),
                line: line_no,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Same as `parse_jsonl` but a missing file yields no records
fn parse_optional_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    parse_jsonl(path)
}

pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    parse_jsonl(path)
}

pub fn parse_watches(path: &Path) -> Result<Vec<Interaction>> {
    let records: Vec<WatchRecord> = parse_optional_jsonl(path)?;
    Ok(records
        .into_iter()
        .map(|r| Interaction::watch(r.user_id, r.movie_id, r.complete, r.timestamp))
        .collect())
}

pub fn parse_likes(path: &Path) -> Result<Vec<Interaction>> {
    let records: Vec<LikeRecord> = parse_optional_jsonl(path)?;
    records
        .into_iter()
        .map(|r| {
            let like = Interaction::like(r.user_id, r.movie_id, r.rating, r.timestamp);
            like.validate()?;
            Ok(like)
        })
        .collect()
}

pub fn parse_bookmarks(path: &Path) -> Result<Vec<Interaction>> {
    let records: Vec<BookmarkRecord> = parse_optional_jsonl(path)?;
    Ok(records
        .into_iter()
        .map(|r| Interaction::bookmark(r.user_id, r.movie_id, r.timestamp))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractionKind;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            MOVIES_FILE,
            r#"{"id":"m1","title":"Heat","genres":["Crime","Drama"],"rating":8.3,"creation_date":"2024-01-01T00:00:00Z"}

{"id":"m2","genres":["Comedy"],"rating":6.1,"creation_date":"2024-02-01T00:00:00Z"}
"#,
        );
        write_file(
            dir.path(),
            WATCHES_FILE,
            r#"{"user_id":"u1","movie_id":"m1","complete":true,"timestamp":"2024-03-01T10:00:00Z"}"#,
        );
        write_file(
            dir.path(),
            LIKES_FILE,
            r#"{"user_id":"u1","movie_id":"m2","rating":8,"timestamp":"2024-03-02T10:00:00Z"}"#,
        );

        let dataset = Dataset::load_from_dir(dir.path()).unwrap();
        assert_eq!(dataset.movies.len(), 2);
        assert_eq!(dataset.movies[1].title, "");
        assert_eq!(dataset.interactions.len(), 2);
        assert_eq!(
            dataset.interactions[1].kind,
            InteractionKind::Like { rating: 8.0 }
        );
    }

    #[test]
    fn test_missing_movies_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Dataset::load_from_dir(dir.path());
        assert!(matches!(result, Err(DataLoadError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            WATCHES_FILE,
            "{\"user_id\":\"u1\",\"movie_id\":\"m1\",\"complete\":true,\"timestamp\":\"2024-03-01T10:00:00Z\"}\n{\"user_id\":\"u1\"}\n",
        );

        match parse_watches(&dir.path().join(WATCHES_FILE)) {
            Err(DataLoadError::ParseError { file, line, .. }) => {
                assert_eq!(file, WATCHES_FILE);
                assert_eq!(line, 2);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_like_rating_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            LIKES_FILE,
            r#"{"user_id":"u1","movie_id":"m1","rating":11,"timestamp":"2024-03-01T10:00:00Z"}"#,
        );
        let result = parse_likes(&dir.path().join(LIKES_FILE));
        assert!(matches!(result, Err(DataLoadError::InvalidValue { .. })));
    }
}
