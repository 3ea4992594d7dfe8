//! Packed node records carried in reply `nodes` fields.
//!
//! A nodes list is the concatenation of fixed 26-byte records: a 20-byte
//! node id followed by a 6-byte endpoint handle. The format is bit-exact;
//! a list whose length is not a multiple of 26 is rejected and the reply
//! is treated by callers as a bare ping reply.

use weft_types::{NetAddress, NodeId, NET_ADDRESS_LEN, NODE_ID_LEN};

use crate::WireError;

/// Size of one packed (id ++ address) record.
pub const NODE_RECORD_LEN: usize = NODE_ID_LEN + NET_ADDRESS_LEN;

/// Pack (id, address) pairs into a concatenated record list.
pub fn pack_nodes(nodes: &[(NodeId, NetAddress)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * NODE_RECORD_LEN);
    for (id, addr) in nodes {
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(addr.as_bytes());
    }
    out
}

/// Parse a concatenated record list back into (id, address) pairs.
///
/// # Errors
///
/// Returns [`WireError::NodeListLength`] if `bytes` is not a whole number
/// of records.
pub fn parse_nodes(bytes: &[u8]) -> crate::Result<Vec<(NodeId, NetAddress)>> {
    if bytes.len() % NODE_RECORD_LEN != 0 {
        return Err(WireError::NodeListLength {
            len: bytes.len(),
            record: NODE_RECORD_LEN,
        });
    }

    let mut out = Vec::with_capacity(bytes.len() / NODE_RECORD_LEN);
    for record in bytes.chunks_exact(NODE_RECORD_LEN) {
        // Lengths are exact by construction; from_slice cannot fail here.
        let Some(id) = NodeId::from_slice(&record[..NODE_ID_LEN]) else {
            continue;
        };
        let Some(addr) = NetAddress::from_slice(&record[NODE_ID_LEN..]) else {
            continue;
        };
        out.push((id, addr));
    }
    Ok(out)
}
