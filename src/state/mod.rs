//! The freshness marker (`state.txt`) written next to the data file by the
//! update tooling, e.g.
//!
//! ```text
//! 1578169263
//! timestamp=2020-01-04T20\:21\:03Z
//! ```
//!
//! The first token is the sequence number; a `timestamp=` token is optional.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Sequence numbers below this are a marker in the wrong format.
pub const MIN_SEQUENCE_NUMBER: i64 = 1_000_000_000;

const TIMESTAMP_PREFIX: &str = "timestamp=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMarker {
    pub sequence: i64,
    pub timestamp: Option<String>,
}

impl StateMarker {
    /// Marker for data loaded without a state file.
    pub fn unversioned() -> Self {
        StateMarker {
            sequence: 0,
            timestamp: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split_whitespace();
        let first = tokens
            .next()
            .ok_or_else(|| Error::State("state file is empty".into()))?;
        let sequence: i64 = first
            .parse()
            .map_err(|_| Error::State(format!("sequence number {:?} is not an integer", first)))?;
        if sequence < MIN_SEQUENCE_NUMBER {
            return Err(Error::State(format!(
                "sequence number {} is below {}",
                sequence, MIN_SEQUENCE_NUMBER
            )));
        }
        let timestamp = tokens
            .find_map(|token| token.strip_prefix(TIMESTAMP_PREFIX))
            .map(|value| value.replace('\\', ""));
        Ok(StateMarker {
            sequence,
            timestamp,
        })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}
