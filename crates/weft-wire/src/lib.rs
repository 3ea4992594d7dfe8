//! # weft-wire
//!
//! Decoded message model for the Weft overlay protocol.
//!
//! Messages on the wire are bencoded dictionaries; the codec that turns
//! bytes into dictionaries (and back) lives with the transport. This
//! crate defines what the codec produces and the router consumes:
//!
//! - [`Value`] / [`Message`] — a tagged dictionary of byte-string keys
//!   to strings, integers, lists and nested dictionaries
//! - [`keys`] — the well-known dictionary keys and verb names
//! - [`nodes`] — the bit-exact 26-byte (id ++ address) node records
//!   carried in replies
//! - [`MessageSink`] — the outbound dispatch seam, so router logic can
//!   be exercised without any networking

pub mod keys;
pub mod message;
pub mod nodes;
pub mod sink;

pub use message::{Message, Value};
pub use sink::{Envelope, MessageSink, VecSink};

/// Error types for wire-format handling.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A nodes list whose length is not a multiple of the record size.
    #[error("nodes list length {len} is not a multiple of {record}")]
    NodeListLength { len: usize, record: usize },
}

/// Convenience result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
