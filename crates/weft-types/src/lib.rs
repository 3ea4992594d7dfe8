//! # weft-types
//!
//! Shared address arithmetic for the Weft overlay.
//!
//! Every peer is identified by a 160-bit opaque [`NodeId`]. The metric
//! between two identifiers is their bitwise XOR interpreted as a 160-bit
//! big-endian unsigned integer ([`Distance`]); for ranking on hot paths a
//! 32-bit prefix of the distance suffices and is used throughout the
//! router. Endpoints are 6-byte opaque [`NetAddress`] handles.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Length of a node identifier in bytes (160 bits).
pub const NODE_ID_LEN: usize = 20;

/// Length of a network address handle in bytes.
pub const NET_ADDRESS_LEN: usize = 6;

/// A 160-bit node identifier.
///
/// Identifiers are opaque: the router never interprets them beyond the
/// XOR metric. Ordering is big-endian numeric, so ids can key ordered
/// collections.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde_as(as = "serde_with::Bytes")] [u8; NODE_ID_LEN]);

impl NodeId {
    /// Wrap a raw 20-byte identifier.
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse an identifier from a byte slice.
    ///
    /// Returns `None` unless the slice is exactly [`NODE_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; NODE_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Borrow the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Generate a uniformly random identifier.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The XOR distance between this identifier and `other`.
    pub fn xor_distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; NODE_ID_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// The high 32 bits of the identifier, big-endian.
    pub fn prefix(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

/// A 160-bit XOR distance.
///
/// Compares as a big-endian unsigned integer; lexicographic byte order is
/// exactly numeric order for fixed-width big-endian values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; NODE_ID_LEN]);

impl Distance {
    /// The zero distance (an identifier's distance to itself).
    pub const ZERO: Distance = Distance([0u8; NODE_ID_LEN]);

    /// Borrow the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// The high 32 bits of the distance, big-endian.
    pub fn prefix(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Whether this is the zero distance.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

/// True iff `a` is strictly closer to `target` than `b` is.
pub fn closer_to_target(a: &NodeId, b: &NodeId, target: &NodeId) -> bool {
    a.xor_distance(target) < b.xor_distance(target)
}

/// A 6-byte opaque endpoint handle.
///
/// The router never inspects the contents; the transport layer owns the
/// encoding (typically packed IPv4 + port).
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetAddress(#[serde_as(as = "serde_with::Bytes")] [u8; NET_ADDRESS_LEN]);

impl NetAddress {
    /// Wrap a raw 6-byte endpoint handle.
    pub const fn from_bytes(bytes: [u8; NET_ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse an endpoint handle from a byte slice.
    ///
    /// Returns `None` unless the slice is exactly [`NET_ADDRESS_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; NET_ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Borrow the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NET_ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddress({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_with_first_byte(b: u8) -> NodeId {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[0] = b;
        NodeId::from_bytes(bytes)
    }

    #[test]
    fn test_xor_distance_symmetric() {
        let a = id_with_first_byte(0x0F);
        let b = id_with_first_byte(0xF0);
        assert_eq!(a.xor_distance(&b), b.xor_distance(&a));
        assert_eq!(a.xor_distance(&b).as_bytes()[0], 0xFF);
    }

    #[test]
    fn test_xor_distance_to_self_is_zero() {
        let a = id_with_first_byte(0x42);
        assert!(a.xor_distance(&a).is_zero());
        assert_eq!(a.xor_distance(&a), Distance::ZERO);
    }

    #[test]
    fn test_distance_orders_numerically() {
        let target = id_with_first_byte(0x00);
        let near = id_with_first_byte(0x01);
        let far = id_with_first_byte(0x80);
        assert!(near.xor_distance(&target) < far.xor_distance(&target));

        // A difference in the low bytes alone still orders correctly.
        let mut low = [0u8; NODE_ID_LEN];
        low[NODE_ID_LEN - 1] = 0x01;
        let barely = NodeId::from_bytes(low);
        assert!(barely.xor_distance(&target) < near.xor_distance(&target));
    }

    #[test]
    fn test_prefix_is_high_four_bytes() {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[0] = 0xDE;
        bytes[1] = 0xAD;
        bytes[2] = 0xBE;
        bytes[3] = 0xEF;
        bytes[4] = 0xFF; // must not affect the prefix
        let id = NodeId::from_bytes(bytes);
        assert_eq!(id.prefix(), 0xDEADBEEF);
    }

    #[test]
    fn test_distance_prefix_matches_id_prefix_xor() {
        let a = id_with_first_byte(0xC0);
        let b = id_with_first_byte(0x0C);
        assert_eq!(a.xor_distance(&b).prefix(), a.prefix() ^ b.prefix());
    }

    #[test]
    fn test_closer_to_target() {
        let target = id_with_first_byte(0xC0);
        let near = id_with_first_byte(0x80);
        let far = id_with_first_byte(0x01);
        assert!(closer_to_target(&near, &far, &target));
        assert!(!closer_to_target(&far, &near, &target));
        // Not strict when equal.
        assert!(!closer_to_target(&near, &near, &target));
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(NodeId::from_slice(&[0u8; NODE_ID_LEN]).is_some());
        assert!(NodeId::from_slice(&[0u8; NODE_ID_LEN - 1]).is_none());
        assert!(NodeId::from_slice(&[0u8; NODE_ID_LEN + 1]).is_none());
        assert!(NetAddress::from_slice(&[0u8; NET_ADDRESS_LEN]).is_some());
        assert!(NetAddress::from_slice(&[0u8; 4]).is_none());
    }

    #[test]
    fn test_random_ids_differ() {
        let mut rng = rand::thread_rng();
        let a = NodeId::random(&mut rng);
        let b = NodeId::random(&mut rng);
        // 160 random bits colliding is astronomically unlikely.
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_hex() {
        let id = id_with_first_byte(0xAB);
        let rendered = id.to_string();
        assert_eq!(rendered.len(), NODE_ID_LEN * 2);
        assert!(rendered.starts_with("ab"));
    }
}
