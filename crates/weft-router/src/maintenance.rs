//! Periodic self-training searches.
//!
//! Two loops keep the routing table sharp without any user traffic:
//!
//! 1. **Local maintenance** picks a random 160-bit id and, when this
//!    router believes it would be the network's best answer for it, runs
//!    a search anyway. Finding somebody better is the win: the peers on
//!    the winning reply chain earn reach. As the store fills with proven
//!    peers the self-is-best check fails more often and the probing
//!    tapers off on its own.
//! 2. **Global maintenance** re-issues a search for every target this
//!    router recently answered queries about, giving unproven peers a
//!    chance to participate and earn reach.
//!
//! Both passes are plain synchronous functions so hosts with their own
//! event loop can schedule them directly; [`run`] wires them, plus the
//! router's timer poll, onto a tokio runtime for everyone else.

use std::sync::{Arc, Mutex};

use rand::RngCore;
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, info, trace};
use weft_types::NodeId;
use weft_wire::{keys, MessageSink};

use crate::config::RouterConfig;
use crate::router::Router;
use crate::search_store::{SearchAction, SearchCallback};
use crate::RouterError;

/// How often [`run`] drives the router's timers.
const POLL_INTERVAL_MS: u64 = 50;

/// Callback for maintenance searches: terminate as soon as a referral
/// (a peer announced mid-search) answers, so the reply chain is walked
/// and the peers that helped earn reach.
pub fn maintenance_callback() -> SearchCallback {
    Box::new(|event| {
        if event.hop >= 1 {
            SearchAction::Terminate
        } else {
            SearchAction::Continue
        }
    })
}

/// One local maintenance pass.
///
/// Returns whether a search was started.
pub fn local_maintenance_tick<R: RngCore>(
    router: &mut Router,
    rng: &mut R,
    now: u64,
    sink: &mut dyn MessageSink,
) -> bool {
    let target = NodeId::random(rng);
    if !router.node_store().self_is_best(&target) {
        trace!(target = %target, "a known peer out-ranks us, skipping self-training search");
        return false;
    }

    match router.begin_search(keys::VERB_FIND_NODE, target, maintenance_callback(), now, sink) {
        Ok(_) => {
            info!(target = %target, "started self-training search");
            true
        }
        Err(RouterError::NoReachablePeers { .. }) => {
            debug!(target = %target, "no peers to seed a self-training search");
            false
        }
        Err(error) => {
            debug!(%error, "self-training search failed");
            false
        }
    }
}

/// One global maintenance pass over the recently served targets.
///
/// Returns how many searches were started.
pub fn global_maintenance_tick(
    router: &mut Router,
    now: u64,
    sink: &mut dyn MessageSink,
) -> usize {
    let mut started = 0;
    for target in router.take_served_targets() {
        match router.begin_search(keys::VERB_FIND_NODE, target, maintenance_callback(), now, sink)
        {
            Ok(_) => started += 1,
            Err(error) => trace!(target = %target, %error, "skipping served-target search"),
        }
    }
    if started > 0 {
        info!(started, "re-issued searches for recently served targets");
    }
    started
}

/// Drive the router's timers and both maintenance loops forever.
///
/// Intended to be spawned as a task; drop or abort it to stop. Hosts
/// that own an event loop can skip this and call
/// [`Router::poll`] / the tick functions themselves.
pub async fn run<S>(router: Arc<Mutex<Router>>, mut sink: S, config: &RouterConfig)
where
    S: MessageSink + Send,
{
    let origin = Instant::now();
    let now_ms = move || u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut poll_timer = interval(Duration::from_millis(POLL_INTERVAL_MS));
    let mut local_timer = interval(Duration::from_secs(
        config.local_maintenance_period_secs.max(1),
    ));
    let mut global_timer = interval(Duration::from_secs(
        config.global_maintenance_period_secs.max(1),
    ));

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                let Ok(mut router) = router.lock() else { return };
                router.poll(now_ms(), &mut sink);
            }
            _ = local_timer.tick() => {
                let Ok(mut router) = router.lock() else { return };
                local_maintenance_tick(&mut router, &mut rand::thread_rng(), now_ms(), &mut sink);
            }
            _ = global_timer.tick() => {
                let Ok(mut router) = router.lock() else { return };
                global_maintenance_tick(&mut router, now_ms(), &mut sink);
            }
        }
    }
}
