//! In-memory transport for driving clients from tests.
//!
//! `ScriptedConnector` hands every opened transport to the test as a
//! `ScriptedPeer`, which plays the remote instance: it reads what the client
//! sent and scripts replies, errors and closes.

use crate::client::transport::{Connector, Transport, TransportError, TransportEvent};
use crate::protocol::Envelope;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ScriptedConnector {
    peers_tx: async_channel::Sender<ScriptedPeer>,
    refusal: Mutex<Option<String>>,
    gate: Mutex<Option<async_channel::Receiver<()>>>,
    opened: AtomicUsize,
}

/// Keeps opens started while it is alive from completing.
pub struct OpenGate {
    _release: async_channel::Sender<()>,
}

impl OpenGate {
    /// Let held and future opens complete.
    pub fn release(self) {}
}

impl ScriptedConnector {
    /// Returns the connector and the stream of peers it opens, in order.
    pub fn new() -> (Arc<Self>, async_channel::Receiver<ScriptedPeer>) {
        let (peers_tx, peers_rx) = async_channel::unbounded();
        let connector = Arc::new(Self {
            peers_tx,
            refusal: Mutex::new(None),
            gate: Mutex::new(None),
            opened: AtomicUsize::new(0),
        });
        (connector, peers_rx)
    }

    /// Make subsequent opens fail with `reason`.
    pub fn refuse_with(&self, reason: &str) {
        *self.refusal.lock() = Some(reason.to_string());
    }

    /// Let subsequent opens succeed again.
    pub fn accept_connections(&self) {
        *self.refusal.lock() = None;
    }

    /// Hold opens until the returned gate is released or dropped. The peer
    /// is handed out right away; the client only sees the transport later.
    pub fn hold_opens(&self) -> OpenGate {
        let (release, held) = async_channel::bounded(1);
        *self.gate.lock() = Some(held);
        OpenGate { _release: release }
    }

    /// Number of transports the client asked for, refused ones included.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, host: &str, port: u16) -> BoxFuture<'static, Result<Transport, TransportError>> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.refusal.lock().clone() {
            let address = format!("{}:{}", host, port);
            return Box::pin(async move { Err(TransportError::Connect { address, reason }) });
        }

        let (out_tx, out_rx) = async_channel::unbounded();
        let (in_tx, in_rx) = async_channel::unbounded();
        let peer = ScriptedPeer {
            host: host.to_string(),
            port,
            frames: out_rx,
            events: in_tx,
        };
        let _ = self.peers_tx.try_send(peer);

        let gate = self.gate.lock().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                // Errors once the gate's sender is gone
                let _ = gate.recv().await;
            }
            Ok(Transport {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// The remote end of one scripted transport.
///
/// Dropping the peer closes the transport from the remote side.
pub struct ScriptedPeer {
    pub host: String,
    pub port: u16,
    frames: async_channel::Receiver<String>,
    events: async_channel::Sender<TransportEvent>,
}

impl ScriptedPeer {
    /// Next message the client sent, waiting for it. `None` once the client
    /// closed the transport and everything sent before was read.
    pub async fn recv(&self) -> Option<Envelope> {
        let text = self.frames.recv().await.ok()?;
        Envelope::decode(&text).ok()
    }

    pub fn try_recv(&self) -> Option<Envelope> {
        let text = self.frames.try_recv().ok()?;
        Envelope::decode(&text).ok()
    }

    /// Everything the client sent that hasn't been read yet.
    pub fn drain(&self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn reply(&self, message: Envelope) {
        self.send_raw(&message.encode());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.events.try_send(TransportEvent::Frame(text.to_string()));
    }

    pub fn accept(&self) {
        self.reply(Envelope::auth_response(true, None));
    }

    pub fn reject(&self, error: Option<&str>) {
        self.reply(Envelope::auth_response(false, error));
    }

    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .events
            .try_send(TransportEvent::Closed(reason.map(str::to_string)));
    }

    pub fn fail(&self, error: &str) {
        let _ = self.events.try_send(TransportEvent::Error(error.to_string()));
    }

    /// True once the client closed its side of the transport.
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}
