// src/stream/mod.rs

//! Line-oriented readers over child-process pipes.
//!
//! - [`line`] wraps a single byte source and yields one line at a time.
//! - [`merged`] joins several [`LineStream`]s and reads them in lockstep.

pub mod line;
pub mod merged;

pub use line::{BoxedLineStream, LineStream};
pub use merged::MergedLineReader;
