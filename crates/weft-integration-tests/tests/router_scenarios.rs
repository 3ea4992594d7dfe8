//! Integration test: router behavior scenarios.
//!
//! Each test sets up one router with a hand-picked store, injects
//! messages or advances the clock, and checks the externally observable
//! outcome: what goes out through the sink and how the stores change.

use weft_router::config::RouterConfig;
use weft_router::node_store::NodeStore;
use weft_router::router::Router;
use weft_router::search_store::{SearchAction, SearchCallback, TransactionId};
use weft_router::RouterError;
use weft_types::{NetAddress, NodeId};
use weft_wire::{keys, nodes as wire_nodes, Message, VecSink};

fn id(first: u8) -> NodeId {
    let mut bytes = [0u8; 20];
    bytes[0] = first;
    NodeId::from_bytes(bytes)
}

fn addr(b: u8) -> NetAddress {
    NetAddress::from_bytes([b; 6])
}

fn continue_callback() -> SearchCallback {
    Box::new(|_| SearchAction::Continue)
}

/// Scenario: an empty store cannot seed a search.
#[test]
fn begin_search_on_empty_store_reports_no_reachable_nodes() {
    let mut router = Router::new(id(0x00), RouterConfig::default(), 0).expect("valid config");
    let mut sink = VecSink::new();

    let result = router.begin_search(
        keys::VERB_FIND_NODE,
        id(0x01),
        continue_callback(),
        0,
        &mut sink,
    );
    assert!(matches!(
        result,
        Err(RouterError::NoReachablePeers { .. })
    ));
    assert!(sink.envelopes.is_empty());
}

/// Scenario: one proven peer yields one outbound `find_node` with a
/// recorded transaction id.
#[test]
fn single_peer_store_probes_that_peer() {
    let mut router = Router::new(id(0x00), RouterConfig::default(), 0).expect("valid config");
    router.add_node(id(0x80), addr(0x80));
    router.node_store_mut().mark_replied(&id(0x80), 1000);

    let mut sink = VecSink::new();
    router
        .begin_search(
            keys::VERB_FIND_NODE,
            id(0xC0),
            continue_callback(),
            0,
            &mut sink,
        )
        .expect("seeded");

    let sent = sink.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, addr(0x80));
    assert_eq!(sent[0].message.bytes(keys::QUERY_VERB), Some(keys::VERB_FIND_NODE));

    let tid = TransactionId::from_slice(
        sent[0].message.bytes(keys::TRANSACTION_ID).expect("tid"),
    )
    .expect("4-byte tid");
    assert!(router.search_store().lookup_tid(tid).is_some());
}

/// Scenario: a reply announcing two peers fans out to the closer one
/// after the callback elects to continue; the farther one stays queued.
#[test]
fn continue_fans_out_to_closer_announced_peer() {
    let mut router = Router::new(id(0x00), RouterConfig::default(), 0).expect("valid config");
    router.add_node(id(0x80), addr(0x80));
    router.node_store_mut().mark_replied(&id(0x80), 1000);

    let mut sink = VecSink::new();
    let search = router
        .begin_search(
            keys::VERB_FIND_NODE,
            id(0xC0),
            continue_callback(),
            0,
            &mut sink,
        )
        .expect("seeded");
    let request = sink.drain().remove(0).message;

    // Of the two announced peers, 0xE0 is closer to the 0xC0 target
    // (XOR distance 0x20) than 0xA0 is (0x60).
    let announced = vec![(id(0xA0), addr(0xA0)), (id(0xE0), addr(0xE0))];
    let mut reply = Message::new();
    reply.set_bytes(
        keys::TRANSACTION_ID,
        request.bytes(keys::TRANSACTION_ID).expect("tid").to_vec(),
    );
    reply.set_bytes(keys::MESSAGE_TYPE, keys::REPLY);
    reply.set_bytes(keys::QUERYING_ID, id(0x80).as_bytes().to_vec());
    reply.set_bytes(keys::NODES, wire_nodes::pack_nodes(&announced));
    router.handle_message(addr(0x80), &reply, 120, &mut sink);

    let sent = sink.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, addr(0xE0), "fan-out must pick the closer peer");

    let s = router
        .search_store()
        .search(search)
        .expect("search still running");
    assert_eq!(s.pending_len(), 1, "the farther peer stays queued");
}

/// Scenario: no reply within the delay window. The timer fires, the
/// silent peer's timeout counter advances, and the second seed is probed.
#[test]
fn timeout_advances_counter_and_probes_second_seed() {
    let mut router = Router::new(id(0x00), RouterConfig::default(), 0).expect("valid config");
    router.add_node(id(0x80), addr(0x80));
    router.add_node(id(0x90), addr(0x90));
    router.node_store_mut().mark_replied(&id(0x80), 1000);
    router.node_store_mut().mark_replied(&id(0x90), 900);

    let mut sink = VecSink::new();
    router
        .begin_search(
            keys::VERB_FIND_NODE,
            id(0xC0),
            continue_callback(),
            0,
            &mut sink,
        )
        .expect("seeded");
    let first = sink.drain();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].to, addr(0x80), "closest seed goes first");

    // GMRT seeds at 100 ms, so the probe window is 200 ms. Fire at 210.
    router.poll(210, &mut sink);
    let second = sink.drain();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].to, addr(0x90));

    let silent = router.node_store().get(&id(0x80)).expect("still stored");
    assert_eq!(silent.consecutive_timeouts, 1);
    assert_eq!(silent.reach, 0, "a timeout forfeits reach");

    // Fire again: nothing left to send, nothing outstanding within the
    // window yet, so the second probe is still awaited.
    router.poll(215, &mut sink);
    assert!(sink.envelopes.is_empty());
}

/// Scenario: an inbound query is answered only with peers strictly
/// closer to the target than the router itself, and the querier is
/// learned.
#[test]
fn query_reply_filters_peers_behind_router() {
    let mut router = Router::new(id(0x20), RouterConfig::default(), 0).expect("valid config");
    // Closer to 0x00 than we are (own distance 0x20):
    router.add_node(id(0x10), addr(0x10));
    router.add_node(id(0x08), addr(0x08));
    // Farther than we are:
    router.add_node(id(0x80), addr(0x80));
    router.add_node(id(0x31), addr(0x31));

    let mut query = Message::new();
    query.set_bytes(keys::TRANSACTION_ID, vec![0, 0, 0, 7]);
    query.set_bytes(keys::MESSAGE_TYPE, keys::QUERY);
    query.set_bytes(keys::QUERY_VERB, keys::VERB_FIND_NODE);
    query.set_bytes(keys::QUERYING_ID, id(0x99).as_bytes().to_vec());
    query.set_bytes(keys::TARGET, id(0x00).as_bytes().to_vec());

    let mut sink = VecSink::new();
    router.handle_message(addr(0x99), &query, 0, &mut sink);

    let sent = sink.drain();
    assert_eq!(sent.len(), 1);
    let nodes = wire_nodes::parse_nodes(sent[0].message.bytes(keys::NODES).expect("nodes"))
        .expect("well-formed");

    let own_distance = router.local_id().xor_distance(&id(0x00));
    for (node, _) in &nodes {
        assert!(
            node.xor_distance(&id(0x00)) < own_distance,
            "reply leaked a peer at or behind our own distance"
        );
    }
    let returned: Vec<NodeId> = nodes.iter().map(|(n, _)| *n).collect();
    assert!(returned.contains(&id(0x10)));
    assert!(returned.contains(&id(0x08)));
    assert!(!returned.contains(&id(0x80)));
    assert!(!returned.contains(&id(0x31)));

    assert!(router.node_store().get(&id(0x99)).is_some(), "querier learned");
}

/// Scenario: reach outweighs raw distance in closest-k ranking.
#[test]
fn closest_k_prefers_strong_reach_over_short_distance() {
    let mut store = NodeStore::new(id(0xFF), 16, 10, 0);
    store.add(id(0x10), addr(0x10));
    store.add(id(0x20), addr(0x20));
    store.mark_replied(&id(0x10), 100);
    store.mark_replied(&id(0x20), 500);

    let result = store.closest_k(&id(0x00), 2);
    let ids: Vec<NodeId> = result.iter().map(|n| n.id).collect();
    // dist(B)/reach(B) = 0x20/500 beats dist(A)/reach(A) = 0x10/100.
    assert_eq!(ids, vec![id(0x20), id(0x10)]);
}

/// A reply whose transaction id stopped resolving (search already over)
/// changes nothing.
#[test]
fn late_reply_after_termination_is_dropped() {
    let mut router = Router::new(id(0x00), RouterConfig::default(), 0).expect("valid config");
    router.add_node(id(0x80), addr(0x80));
    router.node_store_mut().mark_replied(&id(0x80), 1000);

    let mut sink = VecSink::new();
    let search = router
        .begin_search(
            keys::VERB_FIND_NODE,
            id(0xC0),
            continue_callback(),
            0,
            &mut sink,
        )
        .expect("seeded");
    let request = sink.drain().remove(0).message;

    // The probe times out and the search exhausts.
    router.poll(10_000, &mut sink);
    sink.drain();
    assert!(router.search_store().search(search).is_none());

    // The straggler reply now misses on transaction id lookup.
    let mut reply = Message::new();
    reply.set_bytes(
        keys::TRANSACTION_ID,
        request.bytes(keys::TRANSACTION_ID).expect("tid").to_vec(),
    );
    reply.set_bytes(keys::MESSAGE_TYPE, keys::REPLY);
    reply.set_bytes(keys::QUERYING_ID, id(0x80).as_bytes().to_vec());
    reply.set_bytes(
        keys::NODES,
        wire_nodes::pack_nodes(&[(id(0xD0), addr(0xD0))]),
    );
    router.handle_message(addr(0x80), &reply, 10_100, &mut sink);

    assert!(sink.envelopes.is_empty());
    assert!(
        router.node_store().get(&id(0xD0)).is_none(),
        "a dropped reply must not feed the store"
    );
}
