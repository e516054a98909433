use crate::prelude::{StageError, StageResult};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Flight-line identifier, a slash-separated key such as `MIS/JKB2e/Y35a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track(String);

impl Track {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Track {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Track {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub track: Track,
    pub flight: String,
    pub season: String,
}

/// Season flight catalog: one `<track> <flight> <season>` entry per line.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load<P: AsRef<Path>>(path: P) -> StageResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| StageError::io(path, err))?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, origin: &Path) -> StageResult<Self> {
        let mut entries = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return Err(StageError::Parse {
                    path: origin.to_path_buf(),
                    line: idx + 1,
                    reason: format!("expected 3 fields, found {}", fields.len()),
                });
            }
            entries.push(CatalogEntry {
                track: Track::new(fields[0]),
                flight: fields[1].to_string(),
                season: fields[2].to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Tracks of `season` matching the shell-glob `pattern`, in catalog order.
    pub fn tracks(&self, season: &str, pattern: &str) -> StageResult<Vec<Track>> {
        let matcher = Pattern::new(pattern)
            .map_err(|err| StageError::InvalidInput(format!("track pattern {pattern}: {err}")))?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.season == season && matcher.matches(entry.track.as_str()))
            .map(|entry| entry.track.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample() -> Catalog {
        let text = "MIS/JKB2e/Y35a F12 ICP4\n\
                    MIS/JKB2e/Y37a F12 ICP4\n\
                    # comment\n\
                    DEV/JKB2t/X101a F3 ICP3\n\
                    MIS/JKB2h/R12b F14 ICP4\n";
        Catalog::parse(text, &PathBuf::from("catalog")).unwrap()
    }

    #[test]
    fn tracks_filter_by_season_and_glob() {
        let catalog = sample();
        let tracks = catalog.tracks("ICP4", "MIS/JKB2e/*").unwrap();
        assert_eq!(
            tracks,
            vec![Track::new("MIS/JKB2e/Y35a"), Track::new("MIS/JKB2e/Y37a")]
        );
    }

    #[test]
    fn star_crosses_segments_like_fnmatch() {
        let catalog = sample();
        assert_eq!(catalog.tracks("ICP4", "MIS*").unwrap().len(), 3);
        assert!(catalog.tracks("ICP4", "DEV*").unwrap().is_empty());
    }

    #[test]
    fn short_lines_are_rejected() {
        let err = Catalog::parse("MIS/JKB2e/Y35a F12\n", &PathBuf::from("c")).unwrap_err();
        assert!(matches!(err, StageError::Parse { line: 1, .. }));
    }

    #[test]
    fn entries_keep_their_flight() {
        let catalog = sample();
        let entry = catalog
            .entries
            .iter()
            .find(|entry| entry.track == Track::new("DEV/JKB2t/X101a"))
            .unwrap();
        assert_eq!(entry.flight, "F3");
    }
}
