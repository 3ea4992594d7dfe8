//! Well-known dictionary keys and verb names.
//!
//! Key and verb spellings are fixed by the overlay protocol; both sides
//! of every exchange must agree on them byte for byte.

/// Transaction id echoed between a query and its reply.
pub const TRANSACTION_ID: &[u8] = b"t";

/// Message type tag: [`QUERY`] or [`REPLY`].
pub const MESSAGE_TYPE: &[u8] = b"y";

/// Query verb carried by queries.
pub const QUERY_VERB: &[u8] = b"q";

/// The sender's own node id.
pub const QUERYING_ID: &[u8] = b"id";

/// Target id key for `find_node` queries.
pub const TARGET: &[u8] = b"target";

/// Target id key for `get_peers` queries.
pub const INFO_HASH: &[u8] = b"info_hash";

/// Concatenated 26-byte node records in replies.
pub const NODES: &[u8] = b"nodes";

/// Message type value marking a query.
pub const QUERY: &[u8] = b"q";

/// Message type value marking a reply.
pub const REPLY: &[u8] = b"r";

/// Liveness check verb; carries no target.
pub const VERB_PING: &[u8] = b"ping";

/// Recursive node lookup verb.
pub const VERB_FIND_NODE: &[u8] = b"find_node";

/// Peer lookup verb; same routing semantics as `find_node`.
pub const VERB_GET_PEERS: &[u8] = b"get_peers";

/// The key a verb's target id travels under.
///
/// Returns `None` for verbs that carry no target (`ping`) and for verbs
/// this router does not serve.
pub fn target_key(verb: &[u8]) -> Option<&'static [u8]> {
    match verb {
        v if v == VERB_FIND_NODE => Some(TARGET),
        v if v == VERB_GET_PEERS => Some(INFO_HASH),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_per_verb() {
        assert_eq!(target_key(VERB_FIND_NODE), Some(TARGET));
        assert_eq!(target_key(VERB_GET_PEERS), Some(INFO_HASH));
        assert_eq!(target_key(VERB_PING), None);
        assert_eq!(target_key(b"announce"), None);
    }
}
