//! SSE stream decoding for the Hermes chat protocol.
//!
//! The backend streams `data: <payload>` lines. This module turns raw lines
//! into typed events, decides when the stream terminates, renders tool and
//! flow lifecycle statuses, and resolves the inline content tags that route
//! status text to progress lines.
//!
//! # Module structure
//! - `events` - event taxonomy (`EventKind`, `StreamEvent`)
//! - `parser` - `data:` line parsing and stream sentinels
//! - `status` - termination rules, status templates, progress tracking
//! - `tags` - `[MCP:..]` / `[REPLACE:..]` content tag decoding

pub mod events;
pub mod parser;
pub mod status;
pub mod tags;

pub use events::{EventKind, StreamEvent};
pub use parser::parse_data_line;
pub use status::{check_termination, format_status, ProgressTracker, Termination};
pub use tags::{extract_tag, make_tag, strip_tags, TaggedChunk};
