//! Git upload-pack refs advertisement codec
//!
//! Parses the pkt-line framed advertisement returned by
//! `GET /info/refs?service=git-upload-pack` and rewrites it so that a
//! chosen tag or branch appears as `HEAD` and `refs/heads/master`.

pub mod error;
pub mod protocol;
pub mod refs;

pub use error::{Error, Result};
pub use refs::{RefType, RefsInfo};
