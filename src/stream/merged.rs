// src/stream/merged.rs

//! Lockstep reader over several line streams.

use std::io;

use futures::future::try_join_all;

use super::line::BoxedLineStream;

/// Reads one line from every underlying stream per call.
///
/// Each call fans out a `next_line` request to all streams concurrently and
/// completes only once every stream has answered. Results keep the input
/// order; an exhausted stream contributes `None`.
pub struct MergedLineReader {
    streams: Vec<BoxedLineStream>,
}

impl MergedLineReader {
    pub fn new(streams: Vec<BoxedLineStream>) -> Self {
        Self { streams }
    }

    pub fn arity(&self) -> usize {
        self.streams.len()
    }

    /// Next set of lines, one slot per stream.
    ///
    /// If any stream fails the whole call fails and lines already produced
    /// by the other streams in this round are discarded.
    pub async fn next_line_set(&mut self) -> io::Result<Vec<Option<String>>> {
        try_join_all(self.streams.iter_mut().map(|s| s.next_line())).await
    }

    /// `true` once every underlying stream has reported exhaustion.
    pub fn is_exhausted(&self) -> bool {
        self.streams.iter().all(|s| s.is_exhausted())
    }
}
