//! # weft-router
//!
//! Reach-weighted recursive router for the Weft overlay.
//!
//! Given a 160-bit target, the router selects the best local peers to
//! query, drives iterative parallel lookups against them, and folds reply
//! latency and distance progress back into per-peer *reach* scores so
//! future lookups favor productive peers. It also answers inbound
//! `find_node`/`get_peers` queries with the locally known peers closest
//! to the target.
//!
//! The crate is pure logic: entry points take the current monotonic time
//! in milliseconds and a [`weft_wire::MessageSink`], and run to completion
//! on the host's event loop. Nothing here touches a socket or a clock.
//!
//! - [`gmrt`] — rolling global mean response time over a 256 s window
//! - [`node_store`] — bounded peer set with reach-weighted closest-k
//! - [`search_store`] — per-search probe DAGs and transaction ids
//! - [`router`] — query/reply handlers, scoring, the search driver
//! - [`maintenance`] — periodic local and global self-training searches
//!
//! ## Key parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | Node store capacity | 16384 |
//! | K (reply size / seed fan-out) | 8 |
//! | GMRT window | 256 one-second buckets |
//! | GMRT seed sample | 100 ms |
//! | Next-probe delay | 2 x GMRT |

pub mod config;
pub mod gmrt;
pub mod maintenance;
pub mod node_store;
pub mod router;
pub mod search_store;

use weft_types::NodeId;

/// Maximum number of peers kept in the node store.
pub const NODE_STORE_SIZE: usize = 16384;

/// Peers per reply and seeds per search (K).
pub const RETURN_SIZE: usize = 8;

/// GMRT averaging window in one-second buckets.
pub const GMRT_WINDOW_SECONDS: usize = 256;

/// Synthetic sample seeding the GMRT roller, in milliseconds.
pub const GMRT_INITIAL_MILLIS: u32 = 100;

/// Default cap on the 2 x GMRT probe deadline, in milliseconds.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;

/// Default consecutive-timeout count that evicts a peer.
pub const DEFAULT_MAX_TIMEOUTS: u32 = 10;

/// Default linear reach decay per second.
///
/// Halves a saturated score in about 250 seconds.
pub const DEFAULT_REACH_DECREASE_PER_SECOND: u32 = u32::MAX / 500;

/// Default period of the local (random-target) maintenance search.
pub const DEFAULT_LOCAL_MAINTENANCE_PERIOD_SECS: u64 = 120;

/// Default period of the global (served-target) maintenance search.
pub const DEFAULT_GLOBAL_MAINTENANCE_PERIOD_SECS: u64 = 300;

/// Error types for router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A search could not be seeded: the store holds no usable peer.
    #[error("no reachable peers to seed a search for {target}")]
    NoReachablePeers {
        /// The id that was being searched for.
        target: NodeId,
    },

    /// The verb is not one the router can build a request for.
    #[error("unsupported query verb {verb:?}")]
    UnsupportedVerb {
        /// The rejected verb, lossily rendered.
        verb: String,
    },

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
