//! Signaling channel: one logical control-plane connection to the relay
//!
//! Owns the credential, the pending-request table, named event handlers and
//! the reconnect/refresh loop. Media negotiation is built on [`SignalingChannel::request`].

use super::connector::{CloseReason, LinkEvent, SignalingConnector, SignalingLink};
use super::protocol::{
    InboundFrame, JoinRoomParams, JoinRoomResponse, LeaveRoomParams, ServerEvent,
    SignalingRequest,
};
use super::reconnect::ReconnectionPolicy;
use crate::auth::{is_auth_failure, AuthRefresher, Credentials};
use crate::config::SignalingConfig;
use crate::error::ConnectionError;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No link and no reconnect scheduled
    Disconnected,
    /// First connect in progress
    Connecting,
    /// Link up
    Connected,
    /// Link lost abnormally; backoff/reconnect in progress
    Reconnecting,
    /// Explicitly disconnected or credential refresh failed (terminal)
    Closed,
}

/// Events delivered to `on()` handlers
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Link established (also after a reconnect)
    Connected,
    /// Link lost or closed
    Disconnected {
        /// Close description
        reason: String,
    },
    /// Protocol-level problem (unparseable frame, orphan response)
    Error {
        /// Description
        message: String,
    },
    /// A connect attempt failed
    ConnectError {
        /// Description
        message: String,
    },
    /// A reconnect attempt is scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Credential refresh failed; the channel is closed
    AuthFailed {
        /// Description
        message: String,
    },
    /// Reconnect attempts exhausted
    ReconnectFailed {
        /// Attempts made
        attempts: u32,
    },
    /// Validated relay notification
    Server(ServerEvent),
    /// Relay notification this client does not model
    Custom {
        /// Event name
        name: String,
        /// Raw payload
        payload: Value,
    },
}

impl ChannelEvent {
    /// Lifecycle event names
    pub const CONNECT: &'static str = "connect";
    /// Emitted when the link goes away
    pub const DISCONNECT: &'static str = "disconnect";
    /// Emitted on protocol errors
    pub const ERROR: &'static str = "error";
    /// Emitted when a connect attempt fails
    pub const CONNECT_ERROR: &'static str = "connect_error";
    /// Emitted before each reconnect attempt
    pub const RECONNECTING: &'static str = "reconnecting";
    /// Emitted when credential refresh fails
    pub const AUTH_FAILED: &'static str = "auth_failed";
    /// Emitted when reconnect attempts are exhausted
    pub const RECONNECT_FAILED: &'static str = "reconnect_failed";

    /// Name handlers subscribe to
    pub fn name(&self) -> &str {
        match self {
            ChannelEvent::Connected => Self::CONNECT,
            ChannelEvent::Disconnected { .. } => Self::DISCONNECT,
            ChannelEvent::Error { .. } => Self::ERROR,
            ChannelEvent::ConnectError { .. } => Self::CONNECT_ERROR,
            ChannelEvent::Reconnecting { .. } => Self::RECONNECTING,
            ChannelEvent::AuthFailed { .. } => Self::AUTH_FAILED,
            ChannelEvent::ReconnectFailed { .. } => Self::RECONNECT_FAILED,
            ChannelEvent::Server(event) => event.name(),
            ChannelEvent::Custom { name, .. } => name,
        }
    }
}

/// Outcome of the bounded leave request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The relay acknowledged in time
    Acknowledged,
    /// No acknowledgement within the timeout; the relay reclaims on close
    TimedOut,
    /// The request could not be delivered or was rejected; treated as done
    Skipped {
        /// Why
        reason: String,
    },
}

/// Handler callback for channel events
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Identifies a registered handler for `off()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerRegistry {
    next_id: u64,
    by_name: HashMap<String, Vec<(HandlerId, EventHandler)>>,
}

type Pending = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct LinkSlot {
    credentials: Option<Credentials>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    generation: u64,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct ChannelInner {
    url: String,
    teardown_timeout: Duration,
    policy: ReconnectionPolicy,
    connector: Arc<dyn SignalingConnector>,
    refresher: Arc<dyn AuthRefresher>,
    state: watch::Sender<ChannelState>,
    link: Mutex<LinkSlot>,
    pending: Mutex<HashMap<u64, Pending>>,
    next_request_id: AtomicU64,
    handlers: Mutex<HandlerRegistry>,
    events: broadcast::Sender<ChannelEvent>,
    // Serializes connect, reconnect attempts and disconnect.
    connect_lock: tokio::sync::Mutex<()>,
}

/// Signaling channel handle (cheap to clone)
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<ChannelInner>,
}

impl SignalingChannel {
    /// Create a disconnected channel
    ///
    /// # Arguments
    ///
    /// * `config` - Relay URL, teardown timeout and reconnection policy
    /// * `connector` - Link factory (usually [`super::WebSocketConnector`])
    /// * `refresher` - Token refresh collaborator
    pub fn new(
        config: &SignalingConfig,
        connector: Arc<dyn SignalingConnector>,
        refresher: Arc<dyn AuthRefresher>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(256);

        Self {
            inner: Arc::new(ChannelInner {
                url: config.url.clone(),
                teardown_timeout: Duration::from_millis(config.teardown_timeout_ms),
                policy: config.reconnect.clone(),
                connector,
                refresher,
                state,
                link: Mutex::new(LinkSlot::default()),
                pending: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
                handlers: Mutex::new(HandlerRegistry::default()),
                events,
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Receive every channel event (in addition to `on()` handlers)
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Number of requests awaiting acknowledgement
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Connect to the relay
    ///
    /// Idempotent when already connected with the same credential. A different
    /// credential replaces the current link. With `None`, the last known
    /// credential is reused.
    pub async fn connect(&self, credentials: Option<Credentials>) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;

        if inner.current_state() == ChannelState::Closed {
            return Err(ConnectionError::Closed.into());
        }

        let credentials = match credentials.or_else(|| inner.link.lock().credentials.clone()) {
            Some(credentials) => credentials,
            None => return Err(ConnectionError::MissingCredential.into()),
        };

        if inner.current_state() == ChannelState::Connected
            && inner.link.lock().credentials.as_ref() == Some(&credentials)
        {
            debug!("Already connected with the same credential");
            return Ok(());
        }

        inner.abort_reconnect();
        inner.drop_link(ConnectionError::Lost("replaced by a new connection".to_string()));
        inner.set_state(ChannelState::Connecting);

        match inner.open_link(&credentials).await {
            Ok(link) => {
                inner.install_link(link, credentials);
                Ok(())
            }
            Err(e) if e.is_auth() => {
                info!("Credential rejected on connect, refreshing");
                let refreshed = match inner.refresh(&credentials).await {
                    Ok(refreshed) => refreshed,
                    Err(refresh_err) => {
                        inner.terminate_auth(&refresh_err);
                        return Err(refresh_err);
                    }
                };
                match inner.open_link(&refreshed).await {
                    Ok(link) => {
                        inner.install_link(link, refreshed);
                        Ok(())
                    }
                    Err(e) => {
                        if e.is_auth() {
                            inner.terminate_auth(&e);
                        } else {
                            inner.link.lock().credentials = Some(refreshed);
                            inner.set_state(ChannelState::Disconnected);
                        }
                        Err(e)
                    }
                }
            }
            Err(e) => {
                inner.link.lock().credentials = Some(credentials);
                inner.set_state(ChannelState::Disconnected);
                Err(e)
            }
        }
    }

    /// Explicitly close the channel (terminal)
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.abort_reconnect();
        let _guard = inner.connect_lock.lock().await;

        if inner.current_state() == ChannelState::Closed {
            return;
        }

        info!("Disconnecting from signaling server");
        inner.set_state(ChannelState::Closed);
        inner.drop_link(ConnectionError::Closed);
        inner.link.lock().credentials = None;
        inner.emit(ChannelEvent::Disconnected {
            reason: "client disconnect".to_string(),
        });
    }

    /// Send a correlated request and await its acknowledgement
    ///
    /// Resolves with the relay's result payload, or rejects with
    /// [`Error::Server`] when the relay answers with an error.
    pub async fn request(&self, request: SignalingRequest) -> Result<Value> {
        let method = request.method_name();
        let (id, rx) = self.inner.dispatch(&request)?;

        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Lost("request dropped".to_string()).into()),
        };

        match &result {
            Ok(_) => debug!("Request {} #{} acknowledged", method, id),
            Err(e) => debug!("Request {} #{} failed: {}", method, id, e),
        }
        result
    }

    /// Send a request and decode the acknowledgement payload
    pub async fn call<T: DeserializeOwned>(&self, request: SignalingRequest) -> Result<T> {
        let method = request.method_name();
        let value = self.request(request).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Serialization(format!("Invalid {} response: {}", method, e)))
    }

    /// Join a room
    ///
    /// Succeeds even when the room holds the user for moderator approval;
    /// check [`JoinRoomResponse::is_admitted`].
    pub async fn join_room(
        &self,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<JoinRoomResponse> {
        let response: JoinRoomResponse = self
            .call(SignalingRequest::JoinRoom(JoinRoomParams {
                room_id: room_id.into(),
                display_name: display_name.into(),
            }))
            .await?;

        if response.pending_approval {
            info!("Join pending moderator approval");
        }
        Ok(response)
    }

    /// Leave the room with a bounded wait; never fails
    pub async fn teardown(&self) -> TeardownOutcome {
        let request = SignalingRequest::LeaveRoom(LeaveRoomParams::default());
        let (id, rx) = match self.inner.dispatch(&request) {
            Ok(dispatched) => dispatched,
            Err(e) => {
                warn!("Skipping leave acknowledgement: {}", e);
                return TeardownOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        match tokio::time::timeout(self.inner.teardown_timeout, rx).await {
            Ok(Ok(Ok(_))) => TeardownOutcome::Acknowledged,
            Ok(Ok(Err(e))) => {
                warn!("Leave request rejected, continuing teardown: {}", e);
                TeardownOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Ok(Err(_)) => TeardownOutcome::Skipped {
                reason: "request dropped".to_string(),
            },
            Err(_) => {
                self.inner.pending.lock().remove(&id);
                info!(
                    "No leave acknowledgement within {:?}, assuming relay cleanup",
                    self.inner.teardown_timeout
                );
                TeardownOutcome::TimedOut
            }
        }
    }

    /// Register a handler for an event name
    ///
    /// Handlers for one name run in registration order.
    pub fn on<F>(&self, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.handlers.lock();
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        registry
            .by_name
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler, or every handler for `name` when `id` is `None`
    ///
    /// Returns the number of handlers removed.
    pub fn off(&self, name: &str, id: Option<HandlerId>) -> usize {
        let mut registry = self.inner.handlers.lock();
        match id {
            None => registry.by_name.remove(name).map(|h| h.len()).unwrap_or(0),
            Some(id) => {
                let Some(handlers) = registry.by_name.get_mut(name) else {
                    return 0;
                };
                let before = handlers.len();
                handlers.retain(|(hid, _)| *hid != id);
                let removed = before - handlers.len();
                if handlers.is_empty() {
                    registry.by_name.remove(name);
                }
                removed
            }
        }
    }
}

impl ChannelInner {
    fn current_state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn set_state(&self, new_state: ChannelState) {
        let old_state = self.state.send_replace(new_state);
        if old_state != new_state {
            debug!(
                "Signaling state transition: {:?} -> {:?}",
                old_state, new_state
            );
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .by_name
            .get(event.name())
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(&event);
        }

        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn dispatch(&self, request: &SignalingRequest) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let frame = request.to_frame(id)?;
        let (tx, rx) = oneshot::channel();

        let link = self.link.lock();
        let outbound = link.outbound.as_ref().ok_or(ConnectionError::NotConnected)?;
        self.pending.lock().insert(id, tx);
        if outbound.send(frame).is_err() {
            self.pending.lock().remove(&id);
            return Err(ConnectionError::Lost("link closed".to_string()).into());
        }
        debug!("Sent request {} #{}", request.method_name(), id);

        Ok((id, rx))
    }

    fn fail_pending(&self, error: ConnectionError) {
        let drained: Vec<Pending> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !drained.is_empty() {
            debug!("Failing {} pending requests: {}", drained.len(), error);
        }
        for tx in drained {
            let _ = tx.send(Err(error.clone().into()));
        }
    }

    fn abort_reconnect(&self) {
        if let Some(task) = self.link.lock().reconnect.take() {
            task.abort();
        }
    }

    /// Forget the current link; its reader becomes stale
    fn drop_link(&self, error: ConnectionError) {
        {
            let mut link = self.link.lock();
            link.generation += 1;
            link.outbound = None;
            if let Some(reader) = link.reader.take() {
                reader.abort();
            }
        }
        self.fail_pending(error);
    }

    async fn open_link(&self, credentials: &Credentials) -> Result<SignalingLink> {
        match self.connector.connect(&self.url, credentials).await {
            Ok(link) => Ok(link),
            Err(e) => {
                warn!("Signaling connect failed: {}", e);
                self.emit(ChannelEvent::ConnectError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn install_link(self: &Arc<Self>, link: SignalingLink, credentials: Credentials) {
        {
            let mut slot = self.link.lock();
            slot.generation += 1;
            slot.credentials = Some(credentials);
            slot.outbound = Some(link.outbound);
            let generation = slot.generation;
            let inner = Arc::clone(self);
            slot.reader = Some(tokio::spawn(async move {
                inner.read_loop(generation, link.inbound).await;
            }));
        }
        self.set_state(ChannelState::Connected);
        info!("Signaling channel connected");
        self.emit(ChannelEvent::Connected);
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let refresh_token = credentials.refresh_token.as_deref().ok_or_else(|| {
            ConnectionError::Auth("credential rejected and no refresh token available".to_string())
        })?;

        let refreshed = self.refresher.refresh(refresh_token).await.map_err(|e| {
            if e.is_auth() {
                e
            } else {
                ConnectionError::Auth(format!("token refresh failed: {}", e)).into()
            }
        })?;
        info!("Access token refreshed");

        Ok(Credentials {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .or_else(|| credentials.refresh_token.clone()),
        })
    }

    fn terminate_auth(&self, error: &Error) {
        error!("Authentication could not be recovered: {}", error);
        self.set_state(ChannelState::Closed);
        self.drop_link(ConnectionError::Auth(error.to_string()));
        self.link.lock().credentials = None;
        self.emit(ChannelEvent::AuthFailed {
            message: error.to_string(),
        });
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        let reason = loop {
            match inbound.recv().await {
                Some(LinkEvent::Frame(text)) => self.handle_frame(&text),
                Some(LinkEvent::Closed(reason)) => break reason,
                None => break CloseReason::abnormal("link dropped"),
            }
        };
        self.on_link_closed(generation, reason);
    }

    fn handle_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to handle signaling message: {}", e);
                self.emit(ChannelEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        match frame {
            InboundFrame::Response { id, outcome } => {
                let Some(tx) = self.pending.lock().remove(&id) else {
                    debug!("Response for unknown request #{}", id);
                    return;
                };
                let _ = tx.send(outcome.map_err(Error::from));
            }
            InboundFrame::Notification { method, params } => {
                match ServerEvent::parse(&method, &params) {
                    Some(Ok(event)) => {
                        debug!("Relay event {}", method);
                        self.emit(ChannelEvent::Server(event));
                    }
                    Some(Err(e)) => warn!("Dropping malformed relay event: {}", e),
                    None => self.emit(ChannelEvent::Custom {
                        name: method,
                        payload: params,
                    }),
                }
            }
        }
    }

    fn on_link_closed(self: &Arc<Self>, generation: u64, reason: CloseReason) {
        {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }
            link.outbound = None;
            link.reader = None;
        }

        info!("Signaling link closed: {}", reason.message);
        self.fail_pending(ConnectionError::Lost(reason.message.clone()));
        self.emit(ChannelEvent::Disconnected {
            reason: reason.message.clone(),
        });

        if self.current_state() == ChannelState::Closed {
            return;
        }
        // A clean close that names an auth failure still gets a refreshed retry.
        let auth_problem = is_auth_failure(&reason.message);
        if !reason.abnormal && !auth_problem {
            self.set_state(ChannelState::Disconnected);
            return;
        }

        self.set_state(ChannelState::Reconnecting);
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.reconnect_loop(auth_problem).await });
        self.link.lock().reconnect = Some(task);
    }

    async fn reconnect_loop(self: Arc<Self>, mut auth_problem: bool) {
        let mut schedule = self.policy.schedule();

        loop {
            let Some(delay) = schedule.next_delay() else {
                let attempts = schedule.attempts();
                warn!("Giving up reconnect after {} attempts", attempts);
                self.set_state(ChannelState::Disconnected);
                self.emit(ChannelEvent::ReconnectFailed { attempts });
                return;
            };

            let attempt = schedule.attempts();
            info!(
                "Reconnecting to relay (attempt {}/{}, backoff {:?})",
                attempt, self.policy.max_retries, delay
            );
            self.emit(ChannelEvent::Reconnecting { attempt });
            tokio::time::sleep(delay).await;

            let _guard = self.connect_lock.lock().await;
            if self.current_state() != ChannelState::Reconnecting {
                debug!("Reconnect superseded");
                return;
            }

            let Some(mut credentials) = self.link.lock().credentials.clone() else {
                self.set_state(ChannelState::Disconnected);
                return;
            };

            if auth_problem {
                match self.refresh(&credentials).await {
                    Ok(refreshed) => credentials = refreshed,
                    Err(e) => {
                        self.terminate_auth(&e);
                        return;
                    }
                }
            }

            match self.open_link(&credentials).await {
                Ok(link) => {
                    self.link.lock().reconnect = None;
                    self.install_link(link, credentials);
                    return;
                }
                Err(e) => {
                    auth_problem = e.is_auth();
                    // Keep a refreshed credential for the next attempt.
                    self.link.lock().credentials = Some(credentials);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoRefresh;
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl SignalingConnector for RefusingConnector {
        async fn connect(&self, _url: &str, _credentials: &Credentials) -> Result<SignalingLink> {
            Err(ConnectionError::Transient("connection refused".to_string()).into())
        }
    }

    fn channel() -> SignalingChannel {
        SignalingChannel::new(
            &SignalingConfig::default(),
            Arc::new(RefusingConnector),
            Arc::new(NoRefresh),
        )
    }

    #[tokio::test]
    async fn test_connect_without_credential_fails() {
        let err = channel().connect(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_remembers_credential() {
        let channel = channel();
        assert!(channel.connect(Some(Credentials::new("t"))).await.is_err());
        assert_eq!(channel.state(), ChannelState::Disconnected);

        // The remembered credential is used; the failure is the connector's, not a missing credential.
        let err = channel.connect(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn test_request_while_disconnected() {
        let err = channel()
            .request(SignalingRequest::LeaveRoom(LeaveRoomParams::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_teardown_while_disconnected_is_skipped() {
        let outcome = channel().teardown().await;
        assert!(matches!(outcome, TeardownOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_handlers_fire_in_registration_order() {
        let channel = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            channel.on(ChannelEvent::ERROR, move |_| seen.lock().push(tag));
        }
        channel.inner.emit(ChannelEvent::Error {
            message: "x".to_string(),
        });

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_off_removes_single_or_all() {
        let channel = channel();
        let count = Arc::new(AtomicU64::new(0));

        let c1 = count.clone();
        let first = channel.on("user-left", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        channel.on("user-left", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(channel.off("user-left", Some(first)), 1);
        channel.inner.handle_frame(&InboundFrame::notification_frame(
            "user-left",
            serde_json::json!({"userId": "u1"}),
        ));
        assert_eq!(count.load(Ordering::SeqCst), 10);

        assert_eq!(channel.off("user-left", None), 1);
        assert_eq!(channel.off("user-left", None), 0);
    }

    #[tokio::test]
    async fn test_unknown_notification_is_custom() {
        let channel = channel();
        let mut events = channel.subscribe();
        channel.inner.handle_frame(&InboundFrame::notification_frame(
            "chat-message",
            serde_json::json!({"text": "hi"}),
        ));

        match events.recv().await.unwrap() {
            ChannelEvent::Custom { name, payload } => {
                assert_eq!(name, "chat-message");
                assert_eq!(payload["text"], "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal() {
        let channel = channel();
        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Closed);

        let err = channel.connect(Some(Credentials::new("t"))).await.unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::Closed)));
    }
}
