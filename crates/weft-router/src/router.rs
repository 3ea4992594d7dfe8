//! Query/reply handling, scoring, and the recursive search driver.
//!
//! All entry points run to completion on the host's event loop: they take
//! the current monotonic time in milliseconds and a [`MessageSink`] for
//! outbound traffic, and never block or spawn. Malformed input is dropped
//! silently at the boundary; nothing in here is fatal.
//!
//! ## Scoring
//!
//! When a search terminates, the reply chain is walked leaf to root. Each
//! hop's round-trip time is folded into the GMRT through
//! [`Router::response_time_ratio`], and the hop's parent is credited
//! reach scaled by how much closer its referral moved the search
//! ([`calculate_distance`]) and how quickly the referral answered. A
//! referral that moved the search backward costs the parent its entire
//! reach score.

use std::collections::VecDeque;

use tracing::{debug, info, trace};
use weft_types::{NetAddress, NodeId};
use weft_wire::{keys, nodes as wire_nodes, Envelope, Message, MessageSink};

use crate::config::RouterConfig;
use crate::gmrt::GmrtRoller;
use crate::node_store::NodeStore;
use crate::search_store::{
    ProbeId, ReplyEvent, SearchAction, SearchCallback, SearchId, SearchStore, TransactionId,
};
use crate::{Result, RouterError};

/// Recently served inbound targets kept for global maintenance.
const SERVED_TARGETS_CAP: usize = 64;

/// The reach-weighted recursive router.
pub struct Router {
    config: RouterConfig,
    local_id: NodeId,
    node_store: NodeStore,
    search_store: SearchStore,
    gmrt: GmrtRoller,
    served_targets: VecDeque<NodeId>,
    last_decay_ms: u64,
}

impl Router {
    /// Create a router for the given identity.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(local_id: NodeId, config: RouterConfig, now: u64) -> Result<Self> {
        config.validate()?;
        let node_store = NodeStore::new(
            local_id,
            config.node_store_size,
            config.max_timeouts,
            config.reach_decrease_per_second,
        );
        let gmrt = GmrtRoller::new(config.gmrt_window_seconds, config.gmrt_initial_millis, now);
        Ok(Self {
            config,
            local_id,
            node_store,
            search_store: SearchStore::new(),
            gmrt,
            served_targets: VecDeque::new(),
            last_decay_ms: now,
        })
    }

    /// This router's own id.
    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// The peer store.
    pub fn node_store(&self) -> &NodeStore {
        &self.node_store
    }

    /// Mutable access to the peer store, for hosts that seed it.
    pub fn node_store_mut(&mut self) -> &mut NodeStore {
        &mut self.node_store
    }

    /// The in-flight search set.
    pub fn search_store(&self) -> &SearchStore {
        &self.search_store
    }

    /// Current global mean response time in milliseconds.
    pub fn gmrt(&self) -> u32 {
        self.gmrt.current()
    }

    /// Delay before a search widens its fan-out, and the reply window a
    /// probe gets before it counts as timed out: twice the GMRT, capped
    /// by the configured search timeout.
    pub fn next_probe_delay(&self) -> u64 {
        (2 * u64::from(self.gmrt.current()))
            .min(self.config.search_timeout_ms)
            .max(1)
    }

    /// Learn a peer.
    pub fn add_node(&mut self, id: NodeId, address: NetAddress) {
        self.node_store.add(id, address);
    }

    /// Process one inbound message.
    ///
    /// Queries are answered with the closest known peers; replies advance
    /// the search that requested them. Anything malformed is dropped.
    pub fn handle_message(
        &mut self,
        from: NetAddress,
        message: &Message,
        now: u64,
        sink: &mut dyn MessageSink,
    ) {
        match message.bytes(keys::MESSAGE_TYPE) {
            Some(t) if t == keys::QUERY => self.handle_query(from, message, sink),
            Some(t) if t == keys::REPLY => self.handle_reply(from, message, now, sink),
            _ => trace!("dropping message without a recognized type tag"),
        }
    }

    /// Start a recursive search for `target`.
    ///
    /// The callback sees every reply and chooses whether the search
    /// continues; on terminate, reach is attributed along the winning
    /// reply chain.
    ///
    /// # Errors
    ///
    /// [`RouterError::UnsupportedVerb`] if no request can be built for
    /// `verb`; [`RouterError::NoReachablePeers`] if the store cannot seed
    /// the search.
    pub fn begin_search(
        &mut self,
        verb: &[u8],
        target: NodeId,
        callback: SearchCallback,
        now: u64,
        sink: &mut dyn MessageSink,
    ) -> Result<SearchId> {
        if keys::target_key(verb).is_none() {
            return Err(RouterError::UnsupportedVerb {
                verb: String::from_utf8_lossy(verb).into_owned(),
            });
        }

        let seeds = self
            .node_store
            .closest_k(&target, self.config.return_size);
        if seeds.is_empty() {
            debug!(target = %target, "no reachable peers to seed search");
            return Err(RouterError::NoReachablePeers { target });
        }

        let search = self.search_store.new_search(target, verb, callback);
        let evict_after = now + self.next_probe_delay();
        for seed in &seeds {
            self.search_store
                .add_probe(search, None, seed.id, seed.address, evict_after);
        }
        info!(target = %target, seeds = seeds.len(), "beginning search");

        self.search_step(search, now, sink);
        Ok(search)
    }

    /// Drive timers: evict overdue probes, widen due searches by one
    /// probe, release exhausted ones, and run lazy reach decay.
    pub fn poll(&mut self, now: u64, sink: &mut dyn MessageSink) {
        let elapsed_secs = now.saturating_sub(self.last_decay_ms) / 1000;
        if elapsed_secs > 0 {
            self.node_store.decay_all(elapsed_secs);
            self.last_decay_ms += elapsed_secs * 1000;
        }

        for search in self.search_store.due_searches(now) {
            let cutoff = now.saturating_sub(self.next_probe_delay());
            for peer in self.search_store.take_expired_unreplied(search, cutoff) {
                debug!(peer = %peer, "probe timed out");
                self.node_store.mark_timeout(&peer);
            }

            if !self.search_step(search, now, sink) {
                if self.search_store.has_outstanding(search) {
                    // Nothing new to send; wait out the replies in flight.
                    let deadline = now + self.next_probe_delay();
                    self.search_store.set_deadline(search, Some(deadline));
                } else {
                    debug!("search ran out of candidates");
                    self.search_store.remove_search(search);
                }
            }
        }
    }

    /// Targets served to inbound queries since the last call.
    pub fn take_served_targets(&mut self) -> Vec<NodeId> {
        self.served_targets.drain(..).collect()
    }

    fn record_served_target(&mut self, target: NodeId) {
        if self.served_targets.contains(&target) {
            return;
        }
        if self.served_targets.len() >= SERVED_TARGETS_CAP {
            self.served_targets.pop_front();
        }
        self.served_targets.push_back(target);
    }

    fn handle_query(&mut self, from: NetAddress, message: &Message, sink: &mut dyn MessageSink) {
        let Some(tid) = message.bytes(keys::TRANSACTION_ID) else {
            return;
        };
        let Some(verb) = message.bytes(keys::QUERY_VERB) else {
            return;
        };
        let Some(peer_id) = message.node_id(keys::QUERYING_ID) else {
            trace!("dropping query without a well-formed querying id");
            return;
        };
        let tid = tid.to_vec();
        let verb = verb.to_vec();

        self.node_store.add(peer_id, from);

        let mut reply = Message::new();
        reply.set_bytes(keys::TRANSACTION_ID, tid);
        reply.set_bytes(keys::MESSAGE_TYPE, keys::REPLY);
        reply.set_bytes(keys::QUERYING_ID, self.local_id.as_bytes().to_vec());

        if verb == keys::VERB_PING {
            sink.dispatch(Envelope { to: from, message: reply });
            return;
        }

        let Some(target_key) = keys::target_key(&verb) else {
            trace!("dropping query with unknown verb");
            return;
        };
        let Some(target) = message.node_id(target_key) else {
            trace!("dropping query without a well-formed target");
            return;
        };

        let closest = self
            .node_store
            .closest_k(&target, self.config.return_size);
        let pairs: Vec<(NodeId, NetAddress)> =
            closest.iter().map(|n| (n.id, n.address)).collect();
        reply.set_bytes(keys::NODES, wire_nodes::pack_nodes(&pairs));

        debug!(peer = %peer_id, target = %target, returned = pairs.len(), "answering query");
        self.record_served_target(target);
        sink.dispatch(Envelope { to: from, message: reply });
    }

    fn handle_reply(
        &mut self,
        from: NetAddress,
        message: &Message,
        now: u64,
        sink: &mut dyn MessageSink,
    ) {
        let Some(tid) = message
            .bytes(keys::TRANSACTION_ID)
            .and_then(TransactionId::from_slice)
        else {
            trace!("dropping reply without a resolvable transaction id");
            return;
        };
        let Some((search, probe)) = self.search_store.lookup_tid(tid) else {
            trace!("dropping reply for an unknown transaction id");
            return;
        };

        let Some((probed_peer, already_replied)) = self
            .search_store
            .probe(search, probe)
            .map(|p| (p.peer_id, p.replied_at.is_some()))
        else {
            return;
        };
        if already_replied {
            trace!(peer = %probed_peer, "dropping duplicate reply");
            return;
        }
        self.search_store.mark_replied(search, probe, now);

        let responder = message.node_id(keys::QUERYING_ID).unwrap_or(probed_peer);
        self.node_store.add(responder, from);
        // A reply, even an empty one, clears the peer's timeout streak.
        self.node_store.mark_replied(&responder, 0);

        // A nodes list that is not a whole number of records downgrades
        // the reply to a bare ping: the sender is kept, nothing is added.
        let announced: Vec<(NodeId, NetAddress)> = match message.bytes(keys::NODES) {
            Some(bytes) => wire_nodes::parse_nodes(bytes).unwrap_or_default(),
            None => Vec::new(),
        };

        let Some(target) = self.search_store.search(search).map(|s| s.target) else {
            return;
        };
        let evict_after = now + self.next_probe_delay();
        for (id, address) in &announced {
            if *id == self.local_id {
                continue;
            }
            self.node_store.add(*id, *address);
            self.search_store
                .add_probe(search, Some(probe), *id, *address, evict_after);
        }
        debug!(
            peer = %responder,
            target = %target,
            announced = announced.len(),
            "reply advanced search"
        );

        let hop = self
            .search_store
            .back_trace(search, probe)
            .len()
            .saturating_sub(1);
        let event = ReplyEvent {
            target,
            responder,
            hop,
            responder_address: from,
            nodes: &announced,
            message,
        };
        match self.search_store.invoke_callback(search, &event) {
            SearchAction::Continue => {
                if !self.search_step(search, now, sink)
                    && !self.search_store.has_outstanding(search)
                {
                    debug!(target = %target, "search ran out of candidates");
                    self.search_store.remove_search(search);
                }
            }
            SearchAction::Terminate => self.finish_search(search, probe, now),
        }
    }

    /// Send the next-best candidate probe and re-arm the search timer.
    ///
    /// Returns whether a probe went out.
    fn search_step(&mut self, search: SearchId, now: u64, sink: &mut dyn MessageSink) -> bool {
        let Some(probe) = self.search_store.next_probe(search, now) else {
            return false;
        };
        let Some((verb, target)) = self
            .search_store
            .search(search)
            .map(|s| (s.request_type.clone(), s.target))
        else {
            return false;
        };
        let Some((to, tid)) = self
            .search_store
            .probe(search, probe)
            .and_then(|p| Some((p.peer_address, p.transaction_id?)))
        else {
            return false;
        };
        let Some(target_key) = keys::target_key(&verb) else {
            return false;
        };

        let mut request = Message::new();
        request.set_bytes(keys::TRANSACTION_ID, tid.to_bytes().to_vec());
        request.set_bytes(keys::MESSAGE_TYPE, keys::QUERY);
        request.set_bytes(keys::QUERY_VERB, verb);
        request.set_bytes(keys::QUERYING_ID, self.local_id.as_bytes().to_vec());
        request.set_bytes(target_key, target.as_bytes().to_vec());

        sink.dispatch(Envelope { to, message: request });

        let deadline = now + self.next_probe_delay();
        self.search_store.set_deadline(search, Some(deadline));
        true
    }

    /// Attribute reach along the winning reply chain, then release the
    /// search.
    fn finish_search(&mut self, search: SearchId, leaf: ProbeId, now: u64) {
        let Some(target) = self.search_store.search(search).map(|s| s.target) else {
            return;
        };
        let target_prefix = target.prefix();

        struct Hop {
            peer: NodeId,
            parent_peer: Option<NodeId>,
            rtt: u32,
        }
        let chain = self.search_store.back_trace(search, leaf);
        let hops: Vec<Hop> = chain
            .iter()
            .filter_map(|pid| {
                let p = self.search_store.probe(search, *pid)?;
                let sent = p.sent_at?;
                let replied = p.replied_at?;
                let parent_peer = p
                    .parent
                    .and_then(|parent| self.search_store.probe(search, parent))
                    .map(|parent| parent.peer_id);
                Some(Hop {
                    peer: p.peer_id,
                    parent_peer,
                    rtt: u32::try_from(replied.saturating_sub(sent)).unwrap_or(u32::MAX),
                })
            })
            .collect();

        for hop in &hops {
            // One ratio call per measured rtt, root hops included: the
            // roller learns the latency even when no parent is credited.
            let ratio = self.response_time_ratio(now, hop.rtt);
            let Some(parent) = hop.parent_peer else {
                continue;
            };
            let progress = calculate_distance(parent.prefix(), target_prefix, hop.peer.prefix());
            if progress == 0 {
                debug!(peer = %parent, "referral moved search backward, zeroing reach");
                self.node_store.zero_reach(&parent);
            } else {
                let speed = u32::MAX - ratio;
                let delta = ((u64::from(progress) * u64::from(speed)) >> 32) as u32;
                self.node_store.mark_replied(&parent, delta);
            }
        }

        info!(target = %target, hops = hops.len(), "search finished");
        self.search_store.remove_search(search);
    }

    /// Fold one measured round-trip into the GMRT and return the
    /// penalty ratio for it.
    ///
    /// Returns 0 for an instant reply, about `u32::MAX / 2` when the
    /// round-trip equals the updated mean, and saturates at `u32::MAX`
    /// once the round-trip exceeds twice the mean. Call exactly once per
    /// measured round-trip: the roller update is the point of the side
    /// effect.
    pub fn response_time_ratio(&mut self, now: u64, rtt_ms: u32) -> u32 {
        let gmrt = u64::from(self.gmrt.update(now, rtt_ms)).max(1);
        let rtt = u64::from(rtt_ms);
        if rtt > 2 * gmrt {
            return u32::MAX;
        }
        let ratio = (u64::from(u32::MAX) / 2 / gmrt) * rtt;
        u32::try_from(ratio).unwrap_or(u32::MAX)
    }
}

/// How much closer to the target a referral moved a search, in 32-bit
/// prefix space.
///
/// `node` referred the search to `child` while hunting `target`. A child
/// farther from the target than the node itself is a backpedal and scores
/// 0. A child past the target (the node overshot) scores the referral
/// span minus the remaining gap. A child between node and target scores
/// the full span.
pub fn calculate_distance(node: u32, target: u32, child: u32) -> u32 {
    let node_to_target = node ^ target;
    let child_to_target = child ^ target;
    let node_to_child = node ^ child;

    if child_to_target > node_to_target {
        0
    } else if node_to_target < node_to_child {
        node_to_child - child_to_target
    } else {
        node_to_child
    }
}
