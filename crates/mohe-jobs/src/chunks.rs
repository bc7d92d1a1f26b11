//! Chunk ids for place-range batch jobs.
//!
//! A chunk covers an inclusive range of place ids and is named
//! `place_<start>-<end>`.

use std::fmt;
use std::str::FromStr;

use mohe_core::{Error, PlaceId, Result};

const CHUNK_PREFIX: &str = "place_";

/// Inclusive range of place ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkRange {
    pub start: PlaceId,
    pub end: PlaceId,
}

impl ChunkRange {
    pub fn new(start: PlaceId, end: PlaceId) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "chunk start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(chunk_id: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("invalid chunk id: {}", chunk_id));
        let range = chunk_id.strip_prefix(CHUNK_PREFIX).ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start = start.parse::<PlaceId>().map_err(|_| invalid())?;
        let end = end.parse::<PlaceId>().map_err(|_| invalid())?;
        Self::new(start, end)
    }

    pub fn chunk_id(&self) -> String {
        self.to_string()
    }

    pub fn contains(&self, place_id: PlaceId) -> bool {
        (self.start..=self.end).contains(&place_id)
    }

    /// Number of ids covered.
    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{}", CHUNK_PREFIX, self.start, self.end)
    }
}

impl FromStr for ChunkRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `[min_id, max_id]` into consecutive chunks of at most `size` ids.
pub fn plan_chunks(min_id: PlaceId, max_id: PlaceId, size: i64) -> Vec<ChunkRange> {
    if min_id > max_id {
        return Vec::new();
    }
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = min_id;
    loop {
        let end = start.saturating_add(size - 1).min(max_id);
        chunks.push(ChunkRange { start, end });
        if end >= max_id {
            break;
        }
        start = end + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let range = ChunkRange::parse("place_1-100").unwrap();
        assert_eq!(range, ChunkRange { start: 1, end: 100 });
        assert_eq!(range.chunk_id(), "place_1-100");
        assert_eq!(range.len(), 100);
        assert!(range.contains(1));
        assert!(range.contains(100));
        assert!(!range.contains(101));
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        for bad in ["chunk_1", "place_1", "place_a-b", "place_10-1", "1-10", ""] {
            assert!(
                matches!(ChunkRange::parse(bad), Err(Error::InvalidInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_plan_chunks_covers_range() {
        let chunks = plan_chunks(1, 250, 100);
        assert_eq!(
            chunks,
            vec![
                ChunkRange { start: 1, end: 100 },
                ChunkRange { start: 101, end: 200 },
                ChunkRange { start: 201, end: 250 },
            ]
        );
    }

    #[test]
    fn test_plan_chunks_edges() {
        assert_eq!(plan_chunks(5, 5, 100), vec![ChunkRange { start: 5, end: 5 }]);
        assert!(plan_chunks(10, 1, 100).is_empty());
        assert_eq!(plan_chunks(1, 3, 0).len(), 3);
    }
}
