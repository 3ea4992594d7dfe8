//! Bounded peer store ranked by reach-weighted distance.
//!
//! The store keeps up to a configured number of peers, each carrying a
//! 32-bit *reach* score. Reach grows when a peer's replies move searches
//! toward their targets, decays linearly over time, and drops to zero on
//! timeout. Ranking for both replies and seed selection minimizes
//! `distance / reach` over the 32-bit distance prefix; a peer with zero
//! reach loses every comparison against a proven peer and is used only as
//! fallback seeding.
//!
//! ## Loop prevention
//!
//! [`NodeStore::closest_k`] never returns a peer whose XOR distance to
//! the target is not strictly below this router's own: forwarding to such
//! a peer could route a query back toward the asker.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};
use weft_types::{NetAddress, NodeId};

/// One known peer.
#[derive(Clone, Debug)]
pub struct Node {
    /// The peer's 160-bit identifier. Immutable once inserted.
    pub id: NodeId,
    /// Last observed endpoint for the peer.
    pub address: NetAddress,
    /// Reach score; 0 means unproven or timed out.
    pub reach: u32,
    /// Consecutive unanswered probes.
    pub consecutive_timeouts: u32,
}

/// Result of attempting to add a peer to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The peer was newly inserted.
    Inserted,
    /// The peer was already known; its endpoint was refreshed.
    Refreshed,
    /// The store was full; the named peer was evicted to make room.
    Evicted {
        /// The peer that was dropped.
        evicted: NodeId,
    },
    /// The id is this router's own and was ignored.
    IgnoredSelf,
}

/// Bounded set of known peers keyed by id.
pub struct NodeStore {
    local_id: NodeId,
    capacity: usize,
    max_timeouts: u32,
    reach_decrease_per_second: u32,
    nodes: HashMap<NodeId, Node>,
}

impl NodeStore {
    /// Create an empty store for the given local identity.
    pub fn new(
        local_id: NodeId,
        capacity: usize,
        max_timeouts: u32,
        reach_decrease_per_second: u32,
    ) -> Self {
        Self {
            local_id,
            capacity: capacity.max(1),
            max_timeouts: max_timeouts.max(1),
            reach_decrease_per_second,
            nodes: HashMap::new(),
        }
    }

    /// This router's own id.
    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Number of peers currently stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no peers.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a peer by id.
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Iterate over all stored peers in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add a peer or refresh a known one.
    ///
    /// A duplicate id only refreshes the endpoint; reach and the timeout
    /// counter are untouched. Inserting into a full store evicts the
    /// lowest-ranked peer (lowest reach, farthest from the local id among
    /// equals). New peers start unproven, with zero reach.
    pub fn add(&mut self, id: NodeId, address: NetAddress) -> AddOutcome {
        if id == self.local_id {
            return AddOutcome::IgnoredSelf;
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.address = address;
            return AddOutcome::Refreshed;
        }

        let mut outcome = AddOutcome::Inserted;
        if self.nodes.len() >= self.capacity {
            if let Some(evicted) = self.evict_lowest_ranked() {
                debug!(evicted = %evicted, inserted = %id, "node store full, evicting");
                outcome = AddOutcome::Evicted { evicted };
            }
        }

        self.nodes.insert(
            id,
            Node {
                id,
                address,
                reach: 0,
                consecutive_timeouts: 0,
            },
        );
        outcome
    }

    /// Drop the peer the store values least.
    fn evict_lowest_ranked(&mut self) -> Option<NodeId> {
        let local_id = self.local_id;
        let victim = self
            .nodes
            .values()
            .min_by(|a, b| {
                a.reach
                    .cmp(&b.reach)
                    // Among equals, the peer farthest from us goes first.
                    .then_with(|| {
                        b.id.xor_distance(&local_id)
                            .cmp(&a.id.xor_distance(&local_id))
                    })
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|n| n.id)?;
        self.nodes.remove(&victim);
        Some(victim)
    }

    /// The up-to-`k` best peers for `target`, ascending by reach-weighted
    /// distance.
    ///
    /// Only peers strictly closer to the target than this router are
    /// considered; the result may therefore be shorter than `k` or empty
    /// even when the store is not.
    pub fn closest_k(&self, target: &NodeId, k: usize) -> Vec<Node> {
        let own_distance = self.local_id.xor_distance(target);

        let mut candidates: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.id.xor_distance(target) < own_distance)
            .collect();

        candidates.sort_by(|a, b| weighted_cmp(target, a, b));
        candidates.into_iter().take(k).cloned().collect()
    }

    /// Decay every proven peer's reach by `elapsed_seconds` worth of the
    /// configured linear rate. Zero-reach peers are left alone.
    pub fn decay_all(&mut self, elapsed_seconds: u64) {
        if elapsed_seconds == 0 || self.reach_decrease_per_second == 0 {
            return;
        }
        let decrement = u64::from(self.reach_decrease_per_second)
            .saturating_mul(elapsed_seconds)
            .min(u64::from(u32::MAX)) as u32;
        for node in self.nodes.values_mut() {
            if node.reach > 0 {
                node.reach = node.reach.saturating_sub(decrement);
            }
        }
    }

    /// Record an unanswered probe: reach drops to zero and the timeout
    /// counter advances. The peer is removed entirely once the counter
    /// reaches the configured maximum.
    pub fn mark_timeout(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.reach = 0;
        node.consecutive_timeouts += 1;
        if node.consecutive_timeouts >= self.max_timeouts {
            warn!(peer = %id, timeouts = node.consecutive_timeouts, "dropping unresponsive peer");
            self.nodes.remove(id);
        }
    }

    /// Record a reply: credit `delta_reach` (saturating) and clear the
    /// timeout counter.
    pub fn mark_replied(&mut self, id: &NodeId, delta_reach: u32) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.reach = node.reach.saturating_add(delta_reach);
            node.consecutive_timeouts = 0;
        }
    }

    /// Zero a peer's reach without touching its timeout counter.
    ///
    /// Applied when a peer's reply sent a search backward.
    pub fn zero_reach(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.reach = 0;
        }
    }

    /// This router's opinion of its own reach: the maximum reach of any
    /// peer it knows.
    pub fn self_reach(&self) -> u32 {
        self.nodes.values().map(|n| n.reach).max().unwrap_or(0)
    }

    /// Whether this router out-ranks every stored peer for `target` under
    /// the reach-weighted ordering.
    pub fn self_is_best(&self, target: &NodeId) -> bool {
        let own = Node {
            id: self.local_id,
            address: NetAddress::from_bytes([0u8; 6]),
            reach: self.self_reach(),
            consecutive_timeouts: 0,
        };
        self.nodes
            .values()
            .all(|n| weighted_cmp(target, &own, n) != Ordering::Greater)
    }
}

/// Order two peers by reach-weighted distance to `target`.
///
/// Minimizes `prefix_distance / reach`, compared without division by
/// cross-multiplying in u64. `1/0` is treated as +infinity: an unproven
/// peer ranks after every proven one, and two unproven peers fall back to
/// plain distance. Ties break on the full 160-bit distance, then on id,
/// so the order is total.
pub fn weighted_cmp(target: &NodeId, a: &Node, b: &Node) -> Ordering {
    let dist_a = a.id.xor_distance(target);
    let dist_b = b.id.xor_distance(target);

    let primary = match (a.reach, b.reach) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::Greater,
        (_, 0) => Ordering::Less,
        (ra, rb) => {
            let left = u64::from(dist_a.prefix()) * u64::from(rb);
            let right = u64::from(dist_b.prefix()) * u64::from(ra);
            left.cmp(&right)
        }
    };

    primary
        .then_with(|| dist_a.cmp(&dist_b))
        .then_with(|| a.id.cmp(&b.id))
}
