//! MGRS tile allowlist used to filter catalog results before admission.

use crate::error::{PipelineError, PipelineResult};
use std::collections::HashSet;
use std::path::Path;

/// A loaded set of accepted MGRS tile identifiers (5-character codes, e.g.
/// `33TWN`). An empty allowlist means "accept every tile" — callers should
/// check [`TileAllowlist::is_empty`] rather than treat an empty set as
/// "reject everything".
#[derive(Debug, Clone, Default)]
pub struct TileAllowlist {
    tiles: HashSet<String>,
}

impl TileAllowlist {
    /// Load a newline-delimited list of tile codes from `path`. Blank lines
    /// and lines starting with `#` are ignored. Each remaining line must be
    /// a 5-character MGRS tile code or loading fails.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("reading allowlist {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> PipelineResult<Self> {
        let mut tiles = HashSet::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.len() != 5 {
                return Err(PipelineError::Config(format!(
                    "invalid MGRS tile code (expected 5 characters): {line}"
                )));
            }
            tiles.insert(line.to_ascii_uppercase());
        }
        Ok(Self { tiles })
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether `tile_id` passes the allowlist: always true if the allowlist
    /// is empty, otherwise true only for tiles explicitly listed.
    pub fn accepts(&self, tile_id: &str) -> bool {
        self.tiles.is_empty() || self.tiles.contains(&tile_id.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_accepts_everything() {
        let allow = TileAllowlist::default();
        assert!(allow.accepts("33TWN"));
        assert!(allow.is_empty());
    }

    #[test]
    fn parses_and_filters() {
        let allow = TileAllowlist::parse("33TWN\n# a comment\n\n10SEG\n").unwrap();
        assert_eq!(allow.len(), 2);
        assert!(allow.accepts("33twn"));
        assert!(!allow.accepts("31UDQ"));
    }

    #[test]
    fn rejects_malformed_codes() {
        let err = TileAllowlist::parse("33TW\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
