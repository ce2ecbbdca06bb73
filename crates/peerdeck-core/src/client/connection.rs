use crate::client::config::RemoteConfig;
use crate::client::transport::{Connector, TransportEvent};
use crate::client::types::{
    ClientOptions, ConnectError, ConnectionEvent, ConnectionStatus, DEFAULT_AUTH_ERROR,
};
use crate::protocol::{Envelope, Inbound, MSG_PONG};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Client for one remote instance.
///
/// Drives `Disconnected -> Connecting -> Connected -> Disconnected`. Transport
/// I/O runs on tokio tasks; every transition goes through one per-client
/// mutex, so a client's own transitions are totally ordered. Lifecycle
/// changes and inbound application messages are reported on `event_tx`.
pub struct RemoteClient {
    config: RemoteConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

/// State reachable from both the owner and the session tasks.
struct Shared {
    alias: String,
    instance: u64,
    options: ClientOptions,
    runtime: tokio::runtime::Handle,
    event_tx: async_channel::Sender<ConnectionEvent>,
    state: Mutex<ClientState>,
}

struct ClientState {
    status: ConnectionStatus,
    /// Bumped on every connect/disconnect; tasks from older attempts go quiet.
    attempt: u64,
    session: Option<Session>,
    pending: Option<oneshot::Sender<Result<(), ConnectError>>>,
}

/// Handles owned by one connection attempt.
struct Session {
    outbound: Option<async_channel::Sender<String>>,
    reader: Option<AbortHandle>,
    heartbeat: Option<AbortHandle>,
    handshake_timer: Option<AbortHandle>,
}

impl Session {
    /// Stop timers, detach the reader and close the transport.
    fn close(self) {
        if let Some(handle) = self.heartbeat {
            handle.abort();
        }
        if let Some(handle) = self.handshake_timer {
            handle.abort();
        }
        if let Some(handle) = self.reader {
            handle.abort();
        }
        if let Some(tx) = self.outbound {
            tx.close();
        }
    }
}

impl RemoteClient {
    pub fn new(
        instance: u64,
        config: RemoteConfig,
        connector: Arc<dyn Connector>,
        options: ClientOptions,
        runtime: tokio::runtime::Handle,
        event_tx: async_channel::Sender<ConnectionEvent>,
    ) -> Self {
        let shared = Arc::new(Shared {
            alias: config.alias.clone(),
            instance,
            options,
            runtime,
            event_tx,
            state: Mutex::new(ClientState {
                status: ConnectionStatus::Disconnected,
                attempt: 0,
                session: None,
                pending: None,
            }),
        });
        Self {
            config,
            connector,
            shared,
        }
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn instance(&self) -> u64 {
        self.shared.instance
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    /// Start connecting.
    ///
    /// Opens the transport and sends `auth` as soon as it is open. The
    /// returned future resolves once authenticated, and fails on rejection,
    /// on a transport error/close before authentication, or when
    /// `disconnect()` interrupts the attempt. A no-op (resolving immediately)
    /// if already connecting or connected.
    pub fn connect(&self) -> PendingConnect {
        let mut state = self.shared.state.lock();
        if state.status != ConnectionStatus::Disconnected {
            log::debug!(
                "connect() on '{}' ignored, already {}",
                self.shared.alias,
                state.status
            );
            return PendingConnect::ready(Ok(()));
        }

        state.attempt += 1;
        let attempt = state.attempt;
        state.status = ConnectionStatus::Connecting;

        let (settle_tx, settle_rx) = oneshot::channel();
        state.pending = Some(settle_tx);

        log::info!(
            "Connecting to '{}' at {}",
            self.shared.alias,
            self.config.address()
        );

        let reader = self
            .shared
            .runtime
            .spawn(run_session(
                self.shared.clone(),
                self.connector.clone(),
                self.config.clone(),
                attempt,
            ))
            .abort_handle();

        let handshake_timer = self.shared.options.handshake_timeout.map(|timeout| {
            let shared = self.shared.clone();
            self.shared
                .runtime
                .spawn(async move {
                    tokio::time::sleep(timeout).await;
                    shared.fail(attempt, ConnectError::Timeout);
                })
                .abort_handle()
        });

        state.session = Some(Session {
            outbound: None,
            reader: Some(reader),
            heartbeat: None,
            handshake_timer,
        });
        self.shared.emit(ConnectionEvent::Connecting {
            alias: self.shared.alias.clone(),
            instance: self.shared.instance,
        });

        PendingConnect::waiting(settle_rx)
    }

    /// Close the connection from any state.
    ///
    /// Always ends in `Disconnected` and always emits a `Disconnected` event
    /// without an error. An attempt still in flight fails with
    /// `ConnectError::Disconnected`.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.attempt += 1;
        log::info!("Disconnecting from '{}'", self.shared.alias);
        self.shared.teardown(&mut state, None);
    }

    /// Send an application message. Dropped silently unless connected.
    pub fn send(&self, kind: &str, payload: Map<String, Value>) {
        let state = self.shared.state.lock();
        let outbound = match (&state.status, &state.session) {
            (ConnectionStatus::Connected, Some(session)) => session.outbound.as_ref(),
            _ => None,
        };
        match outbound {
            Some(tx) => {
                if tx.try_send(Envelope::new(kind, payload).encode()).is_err() {
                    log::debug!("Outbound queue to '{}' unavailable, dropping '{}'", self.shared.alias, kind);
                }
            }
            None => {
                log::trace!("Not connected to '{}', dropping '{}'", self.shared.alias, kind);
            }
        }
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.attempt += 1;
        if let Some(session) = state.session.take() {
            session.close();
        }
    }
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::debug!("Event receiver for '{}' is gone", self.alias);
        }
    }

    /// Release every session resource and settle the pending attempt.
    ///
    /// `cause` is `None` for a voluntary disconnect. Safe to call repeatedly.
    fn teardown(&self, state: &mut ClientState, cause: Option<ConnectError>) {
        if let Some(session) = state.session.take() {
            session.close();
        }
        state.status = ConnectionStatus::Disconnected;

        let error = cause.as_ref().map(|c| c.to_string());
        if let Some(pending) = state.pending.take() {
            let _ = pending.send(Err(cause.unwrap_or(ConnectError::Disconnected)));
        }
        self.emit(ConnectionEvent::Disconnected {
            alias: self.alias.clone(),
            instance: self.instance,
            error,
        });
    }

    /// Involuntary end of an attempt (transport error/close, timeout).
    /// Ignored if the attempt has already been superseded or ended.
    fn fail(&self, attempt: u64, cause: ConnectError) {
        let mut state = self.state.lock();
        if state.attempt != attempt || state.status == ConnectionStatus::Disconnected {
            return;
        }
        if cause == ConnectError::Timeout && state.status != ConnectionStatus::Connecting {
            return;
        }
        log::warn!("Connection to '{}' lost: {}", self.alias, cause);
        self.teardown(&mut state, Some(cause));
    }

    /// React to one inbound frame. Returns `false` once the attempt is over.
    fn handle_frame(&self, attempt: u64, text: &str) -> bool {
        let inbound = match Envelope::decode(text).map(Envelope::into_inbound) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                log::debug!("Dropping incomplete message from '{}'", self.alias);
                return true;
            }
            Err(e) => {
                log::debug!("Dropping malformed frame from '{}': {}", self.alias, e);
                return true;
            }
        };

        let mut state = self.state.lock();
        if state.attempt != attempt {
            return false;
        }

        match (state.status, inbound) {
            (ConnectionStatus::Connecting, Inbound::AuthResponse { success: true, .. }) => {
                log::info!("Authenticated with '{}'", self.alias);
                state.status = ConnectionStatus::Connected;
                if let Some(session) = state.session.as_mut() {
                    if let Some(timer) = session.handshake_timer.take() {
                        timer.abort();
                    }
                    if let Some(outbound) = session.outbound.clone() {
                        session.heartbeat = Some(self.spawn_heartbeat(outbound));
                    }
                }
                if let Some(pending) = state.pending.take() {
                    let _ = pending.send(Ok(()));
                }
                self.emit(ConnectionEvent::Connected {
                    alias: self.alias.clone(),
                    instance: self.instance,
                });
                true
            }
            (ConnectionStatus::Connecting, Inbound::AuthResponse { success: false, error }) => {
                let reason = error.unwrap_or_else(|| DEFAULT_AUTH_ERROR.to_string());
                log::warn!("Authentication with '{}' rejected: {}", self.alias, reason);
                self.teardown(&mut state, Some(ConnectError::Rejected(reason)));
                false
            }
            (ConnectionStatus::Connecting, Inbound::Pong) => {
                self.protocol_violation(&mut state, MSG_PONG.to_string());
                false
            }
            (ConnectionStatus::Connecting, Inbound::Application(envelope)) => {
                self.protocol_violation(&mut state, envelope.kind);
                false
            }
            (ConnectionStatus::Connected, Inbound::Pong) => {
                log::trace!("Pong from '{}'", self.alias);
                true
            }
            (ConnectionStatus::Connected, Inbound::AuthResponse { .. }) => {
                log::debug!("Ignoring repeated auth_response from '{}'", self.alias);
                true
            }
            (ConnectionStatus::Connected, Inbound::Application(message)) => {
                self.emit(ConnectionEvent::Message {
                    alias: self.alias.clone(),
                    instance: self.instance,
                    message,
                });
                true
            }
            (ConnectionStatus::Disconnected, _) => false,
        }
    }

    fn protocol_violation(&self, state: &mut ClientState, kind: String) {
        log::warn!(
            "Protocol violation from '{}': '{}' before auth_response",
            self.alias,
            kind
        );
        self.teardown(state, Some(ConnectError::Protocol(kind)));
    }

    /// Ping on a fixed interval; the first ping goes out one interval after
    /// authentication. Pongs do not affect the schedule.
    fn spawn_heartbeat(&self, outbound: async_channel::Sender<String>) -> AbortHandle {
        let period = self.options.heartbeat_interval;
        let alias = self.alias.clone();
        self.runtime
            .spawn(async move {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if outbound.send(Envelope::ping().encode()).await.is_err() {
                        break;
                    }
                    log::trace!("Sent heartbeat to '{}'", alias);
                }
            })
            .abort_handle()
    }
}

/// One connection attempt: open, authenticate, then read until the end.
async fn run_session(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: RemoteConfig,
    attempt: u64,
) {
    let transport = match connector.open(&config.host, config.port).await {
        Ok(transport) => transport,
        Err(e) => {
            shared.fail(attempt, ConnectError::Transport(e.to_string()));
            return;
        }
    };

    {
        let mut state = shared.state.lock();
        let live = state.attempt == attempt && state.status == ConnectionStatus::Connecting;
        let session = match state.session.as_mut() {
            Some(session) if live => session,
            _ => {
                // Disconnected while the transport was opening
                transport.outbound.close();
                return;
            }
        };
        session.outbound = Some(transport.outbound.clone());
        log::debug!("Transport open to '{}', sending auth", shared.alias);
        if transport.outbound.try_send(Envelope::auth(&config.token).encode()).is_err() {
            drop(state);
            shared.fail(
                attempt,
                ConnectError::Transport("Transport closed before auth".to_string()),
            );
            return;
        }
    }

    loop {
        match transport.inbound.recv().await {
            Ok(TransportEvent::Frame(text)) => {
                if !shared.handle_frame(attempt, &text) {
                    break;
                }
            }
            Ok(TransportEvent::Error(e)) => {
                shared.fail(attempt, ConnectError::Transport(e));
                break;
            }
            Ok(TransportEvent::Closed(reason)) => {
                let reason = reason.unwrap_or_else(|| "Connection closed".to_string());
                shared.fail(attempt, ConnectError::Transport(reason));
                break;
            }
            Err(_) => {
                shared.fail(
                    attempt,
                    ConnectError::Transport("Connection closed".to_string()),
                );
                break;
            }
        }
    }
}

/// Settlement of one `connect()` call.
pub struct PendingConnect {
    state: PendingState,
}

enum PendingState {
    Ready(Option<Result<(), ConnectError>>),
    Waiting(oneshot::Receiver<Result<(), ConnectError>>),
}

impl PendingConnect {
    fn ready(result: Result<(), ConnectError>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<Result<(), ConnectError>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }
}

impl Future for PendingConnect {
    type Output = Result<(), ConnectError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(ConnectError::Disconnected)))
            }
            PendingState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // Client dropped without settling
                Poll::Ready(Err(_)) => Poll::Ready(Err(ConnectError::Disconnected)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{ScriptedConnector, ScriptedPeer};
    use crate::protocol::MSG_PING;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        client: RemoteClient,
        connector: Arc<ScriptedConnector>,
        peers: async_channel::Receiver<ScriptedPeer>,
        events: async_channel::Receiver<ConnectionEvent>,
    }

    fn fixture(options: ClientOptions) -> Fixture {
        let (connector, peers) = ScriptedConnector::new();
        let (event_tx, events) = async_channel::unbounded();
        let client = RemoteClient::new(
            7,
            RemoteConfig::new("work", "10.0.0.2", 19100, "secret"),
            connector.clone(),
            options,
            tokio::runtime::Handle::current(),
            event_tx,
        );
        Fixture {
            client,
            connector,
            peers,
            events,
        }
    }

    fn drain(events: &async_channel::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Connect and complete the handshake.
    async fn connected(f: &Fixture) -> ScriptedPeer {
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        let auth = peer.recv().await.unwrap();
        assert_eq!(auth.kind, "auth");
        peer.accept();
        pending.await.unwrap();
        peer
    }

    #[tokio::test]
    async fn connect_sends_auth_first_and_resolves_on_success() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        assert_eq!(f.client.status(), ConnectionStatus::Connecting);

        let peer = f.peers.recv().await.unwrap();
        assert_eq!((peer.host.as_str(), peer.port), ("10.0.0.2", 19100));
        let auth = peer.recv().await.unwrap();
        assert_eq!(auth.kind, "auth");
        assert_eq!(auth.field("token"), Some(&json!("secret")));

        peer.accept();
        assert_eq!(pending.await, Ok(()));
        assert_eq!(f.client.status(), ConnectionStatus::Connected);

        assert_eq!(
            drain(&f.events),
            vec![
                ConnectionEvent::Connecting { alias: "work".into(), instance: 7 },
                ConnectionEvent::Connected { alias: "work".into(), instance: 7 },
            ]
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_connecting_or_connected() {
        let f = fixture(ClientOptions::default());
        let _first = f.client.connect();
        assert_eq!(f.client.connect().await, Ok(()));
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.accept();
        settle().await;
        assert_eq!(f.client.status(), ConnectionStatus::Connected);

        assert_eq!(f.client.connect().await, Ok(()));
        settle().await;
        assert_eq!(f.connector.open_count(), 1);
        assert!(peer.try_recv().is_none(), "no second auth");
    }

    #[tokio::test]
    async fn rejected_auth_closes_transport_and_reports_reason() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.reject(Some("bad token"));

        assert_eq!(pending.await, Err(ConnectError::Rejected("bad token".into())));
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
        assert!(peer.is_closed());
        assert_eq!(
            drain(&f.events).last(),
            Some(&ConnectionEvent::Disconnected {
                alias: "work".into(),
                instance: 7,
                error: Some("bad token".into()),
            })
        );
    }

    #[tokio::test]
    async fn rejected_auth_without_reason_uses_default() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.reject(None);
        assert_eq!(
            pending.await,
            Err(ConnectError::Rejected(DEFAULT_AUTH_ERROR.into()))
        );
    }

    #[tokio::test]
    async fn unreachable_peer_fails_attempt() {
        let f = fixture(ClientOptions::default());
        f.connector.refuse_with("connection refused");
        let result = f.client.connect().await;
        match result {
            Err(ConnectError::Transport(reason)) => assert!(reason.contains("connection refused")),
            other => panic!("expected transport error, got {:?}", other),
        }
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn close_before_auth_rejects_pending_connect() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.close(Some("going away"));
        assert_eq!(pending.await, Err(ConnectError::Transport("going away".into())));
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn transport_error_after_auth_disconnects_with_reason() {
        let f = fixture(ClientOptions::default());
        let peer = connected(&f).await;
        drain(&f.events);

        peer.fail("connection reset");
        settle().await;
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            drain(&f.events),
            vec![ConnectionEvent::Disconnected {
                alias: "work".into(),
                instance: 7,
                error: Some("connection reset".into()),
            }]
        );
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn disconnect_during_handshake_fails_attempt_without_error_event() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();

        f.client.disconnect();
        assert_eq!(pending.await, Err(ConnectError::Disconnected));
        assert!(peer.is_closed());

        // A late auth_response must not revive the attempt
        peer.accept();
        settle().await;
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            drain(&f.events).last(),
            Some(&ConnectionEvent::Disconnected {
                alias: "work".into(),
                instance: 7,
                error: None,
            })
        );
    }

    #[tokio::test]
    async fn disconnect_while_transport_opening_abandons_it() {
        let f = fixture(ClientOptions::default());
        let gate = f.connector.hold_opens();
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        assert_eq!(f.client.status(), ConnectionStatus::Connecting);

        f.client.disconnect();
        assert_eq!(pending.await, Err(ConnectError::Disconnected));

        gate.release();
        settle().await;
        assert!(peer.is_closed());
        assert!(peer.try_recv().is_none(), "no auth on an abandoned transport");
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            drain(&f.events),
            vec![
                ConnectionEvent::Connecting { alias: "work".into(), instance: 7 },
                ConnectionEvent::Disconnected { alias: "work".into(), instance: 7, error: None },
            ]
        );
    }

    #[tokio::test]
    async fn disconnect_when_idle_still_emits_event() {
        let f = fixture(ClientOptions::default());
        f.client.disconnect();
        f.client.disconnect();
        assert_eq!(drain(&f.events).len(), 2);
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn first_message_other_than_auth_response_is_protocol_violation() {
        let f = fixture(ClientOptions::default());
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.reply(Envelope::new("terminal_output", Map::new()));
        assert_eq!(
            pending.await,
            Err(ConnectError::Protocol("terminal_output".into()))
        );
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn application_messages_are_forwarded_and_lifecycle_consumed() {
        let f = fixture(ClientOptions::default());
        let peer = connected(&f).await;
        drain(&f.events);

        peer.reply(Envelope::pong());
        peer.send_raw("{not json");
        peer.send_raw(r#"{"type":"auth_response"}"#);
        let mut payload = Map::new();
        payload.insert("project".into(), json!("api"));
        let message = Envelope::new("state_changed", payload);
        peer.reply(message.clone());
        settle().await;

        assert_eq!(
            drain(&f.events),
            vec![ConnectionEvent::Message {
                alias: "work".into(),
                instance: 7,
                message,
            }]
        );
        assert_eq!(f.client.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn send_only_delivers_while_connected() {
        let f = fixture(ClientOptions::default());
        f.client.send("focus", Map::new());

        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        assert_eq!(peer.recv().await.unwrap().kind, "auth");
        f.client.send("focus", Map::new());
        settle().await;
        assert!(peer.try_recv().is_none(), "dropped while connecting");

        peer.accept();
        pending.await.unwrap();
        let mut payload = Map::new();
        payload.insert("project".into(), json!("api"));
        f.client.send("focus", payload);
        let sent = peer.recv().await.unwrap();
        assert_eq!(sent.kind, "focus");
        assert_eq!(sent.field("project"), Some(&json!("api")));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_once_per_interval_until_disconnect() {
        let f = fixture(ClientOptions::default());
        let peer = connected(&f).await;

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(peer.try_recv().is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let first = peer.try_recv().expect("ping after 30s");
        assert_eq!(first.kind, MSG_PING);
        assert!(peer.try_recv().is_none());

        // pong does not reset the schedule
        peer.reply(Envelope::pong());
        tokio::time::sleep(Duration::from_secs(60)).await;
        let pings = peer.drain();
        assert_eq!(pings.len(), 2);
        assert!(pings.iter().all(|m| m.kind == MSG_PING));
        assert_ne!(pings[0].id, pings[1].id);

        f.client.disconnect();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(peer.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_ping_before_authentication() {
        let f = fixture(ClientOptions::default());
        let _pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;
        let frames = peer.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, "auth");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_cycles_do_not_stack_heartbeats() {
        let f = fixture(ClientOptions::default());
        let old_peer = connected(&f).await;
        f.client.disconnect();
        let new_peer = connected(&f).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(old_peer.drain().is_empty());
        assert_eq!(new_peer.drain().len(), 1);
        assert_eq!(f.connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_fails_silent_peer() {
        let f = fixture(ClientOptions {
            handshake_timeout: Some(Duration::from_secs(10)),
            ..ClientOptions::default()
        });
        let pending = f.client.connect();
        let peer = f.peers.recv().await.unwrap();
        assert_eq!(pending.await, Err(ConnectError::Timeout));
        assert_eq!(f.client.status(), ConnectionStatus::Disconnected);
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_does_not_fire_after_auth() {
        let f = fixture(ClientOptions {
            handshake_timeout: Some(Duration::from_secs(10)),
            ..ClientOptions::default()
        });
        let _peer = connected(&f).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(f.client.status(), ConnectionStatus::Connected);
    }
}
