//! In-flight search tracking.
//!
//! Each recursive lookup is a [`Search`]: a DAG of [`Probe`]s (child
//! probes point at the parent whose reply suggested them), a candidate
//! queue ordered by XOR distance to the target, and a next-probe timer
//! deadline. The store owns every search outright; removing a search
//! drops its probe arena and unregisters all of its transaction ids in
//! one step, so a late reply can no longer resolve.
//!
//! Transaction ids are unique across all live probes, store-wide. The
//! counter wraps, so fresh ids are checked against the live set.

use std::collections::{BTreeSet, HashMap};

use weft_types::{Distance, NetAddress, NodeId};
use weft_wire::Message;

/// Handle to one active search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(u64);

/// Handle to one probe within its search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(u32);

/// Token matching a reply back to the probe that elicited it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(u32);

impl TransactionId {
    /// Wire form: 4 bytes, big-endian.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parse the wire form back.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(Self(u32::from_be_bytes(arr)))
    }
}

/// The consumer's verdict on a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchAction {
    /// Keep going: fan out to the next-best candidate.
    Continue,
    /// Done: attribute reach along the reply chain and release.
    Terminate,
}

/// A reply delivered to a search's callback.
pub struct ReplyEvent<'a> {
    /// The id being searched for.
    pub target: NodeId,
    /// The peer that replied.
    pub responder: NodeId,
    /// Referrals between the seed generation and this responder:
    /// 0 for a seed's own reply, 1 for a peer a seed announced, and so
    /// on up the probe chain.
    pub hop: usize,
    /// The endpoint the reply arrived from.
    pub responder_address: NetAddress,
    /// Peers announced in the reply, already length-validated.
    pub nodes: &'a [(NodeId, NetAddress)],
    /// The full reply, for verb-specific extras the router ignores.
    pub message: &'a Message,
}

/// Chooses whether a search continues after each reply.
pub type SearchCallback = Box<dyn FnMut(&ReplyEvent<'_>) -> SearchAction + Send>;

/// One outgoing request within a search.
#[derive(Debug)]
pub struct Probe {
    /// The probe whose reply suggested this peer; `None` for the seeds
    /// taken from the node store.
    pub parent: Option<ProbeId>,
    /// The queried peer.
    pub peer_id: NodeId,
    /// Where the query is sent.
    pub peer_address: NetAddress,
    /// Assigned when the probe is sent.
    pub transaction_id: Option<TransactionId>,
    /// Monotonic ms; unset until sent.
    pub sent_at: Option<u64>,
    /// Monotonic ms; unset until a reply matched.
    pub replied_at: Option<u64>,
    /// Timeout deadline attached when the candidate was queued. A
    /// duplicate of the peer with a later deadline supersedes this one;
    /// sent probes are written off by send time, not by this stamp.
    pub evict_after: u64,
    /// Set once the probe has been written off.
    pub timed_out: bool,
}

impl Probe {
    /// Sent, unanswered, and not yet written off.
    fn is_outstanding(&self) -> bool {
        self.sent_at.is_some() && self.replied_at.is_none() && !self.timed_out
    }
}

/// One active recursive lookup.
pub struct Search {
    /// The id being searched for.
    pub target: NodeId,
    /// Query verb sent to every probed peer.
    pub request_type: Vec<u8>,
    callback: SearchCallback,
    probes: Vec<Probe>,
    /// Unsent candidates, ordered by XOR distance to the target.
    pending: BTreeSet<(Distance, ProbeId)>,
    /// Next-probe timer deadline, monotonic ms.
    deadline: Option<u64>,
}

impl Search {
    /// All probes of this search, in insertion order.
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Number of unsent candidates still queued.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn probe(&self, id: ProbeId) -> Option<&Probe> {
        self.probes.get(id.0 as usize)
    }

    fn probe_mut(&mut self, id: ProbeId) -> Option<&mut Probe> {
        self.probes.get_mut(id.0 as usize)
    }
}

/// All in-flight searches, indexed by transaction id.
#[derive(Default)]
pub struct SearchStore {
    searches: HashMap<SearchId, Search>,
    tid_index: HashMap<TransactionId, (SearchId, ProbeId)>,
    next_search_id: u64,
    next_tid: u32,
}

impl SearchStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active searches.
    pub fn len(&self) -> usize {
        self.searches.len()
    }

    /// Whether no search is active.
    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }

    /// Begin tracking a search for `target`.
    pub fn new_search(
        &mut self,
        target: NodeId,
        request_type: &[u8],
        callback: SearchCallback,
    ) -> SearchId {
        let id = SearchId(self.next_search_id);
        self.next_search_id += 1;
        self.searches.insert(
            id,
            Search {
                target,
                request_type: request_type.to_vec(),
                callback,
                probes: Vec::new(),
                pending: BTreeSet::new(),
                deadline: None,
            },
        );
        id
    }

    /// Borrow a search.
    pub fn search(&self, id: SearchId) -> Option<&Search> {
        self.searches.get(&id)
    }

    /// Borrow a probe.
    pub fn probe(&self, search: SearchId, probe: ProbeId) -> Option<&Probe> {
        self.searches.get(&search)?.probe(probe)
    }

    /// Enqueue a candidate probe.
    ///
    /// Deduplicated per peer: when the search already tracks `peer_id`
    /// with an `evict_after` at or past the new one, nothing is added.
    /// Returns whether a candidate was enqueued.
    pub fn add_probe(
        &mut self,
        search: SearchId,
        parent: Option<ProbeId>,
        peer_id: NodeId,
        peer_address: NetAddress,
        evict_after: u64,
    ) -> bool {
        let Some(s) = self.searches.get_mut(&search) else {
            return false;
        };
        if s.probes
            .iter()
            .any(|p| p.peer_id == peer_id && p.evict_after >= evict_after)
        {
            return false;
        }

        let pid = ProbeId(s.probes.len() as u32);
        let distance = peer_id.xor_distance(&s.target);
        s.probes.push(Probe {
            parent,
            peer_id,
            peer_address,
            transaction_id: None,
            sent_at: None,
            replied_at: None,
            evict_after,
            timed_out: false,
        });
        s.pending.insert((distance, pid));
        true
    }

    /// Dequeue the unsent candidate closest to the target, assign it a
    /// fresh transaction id, and stamp it sent.
    ///
    /// Returns `None` when no unsent candidate remains.
    pub fn next_probe(&mut self, search: SearchId, now: u64) -> Option<ProbeId> {
        let s = self.searches.get_mut(&search)?;
        let (key, pid) = s.pending.iter().next().copied()?;
        s.pending.remove(&(key, pid));

        let tid = self.fresh_transaction_id();
        let s = self.searches.get_mut(&search)?;
        if let Some(probe) = s.probe_mut(pid) {
            probe.transaction_id = Some(tid);
            probe.sent_at = Some(now);
        }
        self.tid_index.insert(tid, (search, pid));
        Some(pid)
    }

    /// Mint a transaction id unused by any live probe.
    fn fresh_transaction_id(&mut self) -> TransactionId {
        loop {
            let tid = TransactionId(self.next_tid);
            self.next_tid = self.next_tid.wrapping_add(1);
            if !self.tid_index.contains_key(&tid) {
                return tid;
            }
        }
    }

    /// Resolve a transaction id to its probe.
    pub fn lookup_tid(&self, tid: TransactionId) -> Option<(SearchId, ProbeId)> {
        self.tid_index.get(&tid).copied()
    }

    /// Stamp a probe replied.
    pub fn mark_replied(&mut self, search: SearchId, probe: ProbeId, now: u64) {
        if let Some(p) = self
            .searches
            .get_mut(&search)
            .and_then(|s| s.probe_mut(probe))
        {
            p.replied_at = Some(now);
        }
    }

    /// Run a search's callback against a reply.
    pub fn invoke_callback(&mut self, search: SearchId, event: &ReplyEvent<'_>) -> SearchAction {
        match self.searches.get_mut(&search) {
            Some(s) => (s.callback)(event),
            // Racing release; nothing left to continue.
            None => SearchAction::Terminate,
        }
    }

    /// Write off sent, unanswered probes whose send time is at or before
    /// `cutoff`. Their transaction ids stop resolving; the affected peers
    /// are returned so the caller can record the timeouts.
    pub fn take_expired_unreplied(&mut self, search: SearchId, cutoff: u64) -> Vec<NodeId> {
        let Some(s) = self.searches.get_mut(&search) else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        let mut stale_tids = Vec::new();
        for p in s.probes.iter_mut() {
            if p.is_outstanding() && p.sent_at.is_some_and(|t| t <= cutoff) {
                p.timed_out = true;
                expired.push(p.peer_id);
                if let Some(tid) = p.transaction_id {
                    stale_tids.push(tid);
                }
            }
        }
        for tid in stale_tids {
            self.tid_index.remove(&tid);
        }
        expired
    }

    /// Whether any sent probe is still awaiting a reply.
    pub fn has_outstanding(&self, search: SearchId) -> bool {
        self.searches
            .get(&search)
            .is_some_and(|s| s.probes.iter().any(Probe::is_outstanding))
    }

    /// The probe chain from `leaf` up to its root seed, leaf first.
    pub fn back_trace(&self, search: SearchId, leaf: ProbeId) -> Vec<ProbeId> {
        let Some(s) = self.searches.get(&search) else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut cursor = Some(leaf);
        while let Some(pid) = cursor {
            if chain.len() > s.probes.len() {
                break; // defensive bound; parents always precede children
            }
            chain.push(pid);
            cursor = s.probe(pid).and_then(|p| p.parent);
        }
        chain
    }

    /// Next-probe timer deadline for a search.
    pub fn deadline(&self, search: SearchId) -> Option<u64> {
        self.searches.get(&search).and_then(|s| s.deadline)
    }

    /// Arm or clear a search's next-probe timer.
    pub fn set_deadline(&mut self, search: SearchId, deadline: Option<u64>) {
        if let Some(s) = self.searches.get_mut(&search) {
            s.deadline = deadline;
        }
    }

    /// Searches whose timer deadline is at or before `now`.
    pub fn due_searches(&self, now: u64) -> Vec<SearchId> {
        let mut due: Vec<SearchId> = self
            .searches
            .iter()
            .filter(|(_, s)| s.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();
        due.sort_unstable();
        due
    }

    /// Release a search: its probes, queue, timer and every live
    /// transaction id registration go together.
    pub fn remove_search(&mut self, search: SearchId) -> bool {
        let Some(s) = self.searches.remove(&search) else {
            return false;
        };
        for probe in &s.probes {
            if let Some(tid) = probe.transaction_id {
                self.tid_index.remove(&tid);
            }
        }
        true
    }
}
