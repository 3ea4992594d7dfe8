//! Outbound dispatch seam.
//!
//! The router never touches a socket: it hands [`Envelope`]s to a
//! [`MessageSink`] and the host's message registry forwards them to the
//! transport. Tests use [`VecSink`] to capture traffic in memory.

use weft_types::NetAddress;

use crate::Message;

/// An outbound message addressed to one endpoint.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Destination endpoint handle.
    pub to: NetAddress,
    /// The decoded message; the codec serializes it on the way out.
    pub message: Message,
}

/// Receives outbound messages from the router.
pub trait MessageSink {
    /// Accept one outbound message for delivery.
    fn dispatch(&mut self, envelope: Envelope);
}

/// A sink that buffers envelopes in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    /// Captured envelopes, oldest first.
    pub envelopes: Vec<Envelope>,
}

impl VecSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take and clear the captured envelopes.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }
}

impl MessageSink for VecSink {
    fn dispatch(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }
}
