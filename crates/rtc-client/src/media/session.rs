//! Media session: transports, producers and consumers for one room
//!
//! The session exclusively owns its transports and flows. Registries sit
//! behind a short `parking_lot` mutex that is never held across `.await`;
//! consumption is additionally serialized through a fair async mutex so two
//! concurrent requests for the same remote producer yield one consumer.

use super::engine::{validate_capabilities, FlowCounters, MediaEngine, SendOptions, TrackSource};
use super::ladder::BitrateLadder;
use super::negotiator::{Negotiator, SignalingNegotiator};
use super::owners::{FlowOwner, OwnerRegistry, OwnerResolver};
use super::transport::Transport;
use super::types::{AppData, Direction, FlowDirection, MediaKind, Track, TransportState};
use crate::config::MediaConfig;
use crate::error::{CapabilityError, ConsumeError, ProduceError};
use crate::signaling::protocol::{
    ConsumeParams, ConsumerParams, CreateTransportParams, ProducerRef, RemoteProducer,
    SignalingRequest, TransportParams,
};
use crate::signaling::{ChannelEvent, HandlerId, ServerEvent, SignalingChannel};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications for UI collaborators
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A remote track is ready to render
    TrackAdded {
        producer_id: String,
        consumer_id: String,
        user_id: Option<String>,
        kind: MediaKind,
        track: Track,
    },
    /// A remote track went away
    TrackRemoved {
        producer_id: String,
        consumer_id: String,
        user_id: Option<String>,
    },
    /// A local producer was closed
    ProducerClosed {
        producer_id: String,
        kind: MediaKind,
    },
    /// A transport changed connection state
    TransportStateChanged {
        transport_id: String,
        direction: Direction,
        state: TransportState,
    },
}

/// Per-producer options
#[derive(Debug, Clone, Default)]
pub struct ProducerProfile {
    /// Tags forwarded to consumers
    pub app_data: AppData,
    /// Overrides the configured ladder for video and screen
    pub ladder: Option<BitrateLadder>,
}

/// Result of closing the screen-share producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedProducer {
    /// Closed producer, `None` when nothing was sharing
    pub producer_id: Option<String>,
}

/// Read-only view of a producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSnapshot {
    pub id: String,
    pub kind: MediaKind,
    pub paused: bool,
    pub track_id: String,
}

/// Read-only view of a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSnapshot {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub user_id: Option<String>,
}

/// Read-only view of the whole session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub initialized: bool,
    pub send_transport: Option<TransportState>,
    pub recv_transport: Option<TransportState>,
    pub producers: Vec<ProducerSnapshot>,
    pub consumers: Vec<ConsumerSnapshot>,
}

/// A live producer or consumer, as enumerated for quality polling
#[derive(Debug, Clone)]
pub struct ActiveFlow {
    /// Producer or consumer id
    pub id: String,
    pub direction: FlowDirection,
    pub kind: MediaKind,
    /// Producer id (equal to `id` for upstream flows)
    pub producer_id: String,
    pub app_data: AppData,
    transport: Arc<Transport>,
    local_id: String,
}

impl ActiveFlow {
    /// Tags of the transport carrying this flow
    pub fn transport_app_data(&self) -> AppData {
        self.transport.app_data()
    }

    /// Read cumulative counters from the local stack
    pub async fn read_counters(&self) -> Result<FlowCounters> {
        self.transport.counters(&self.local_id).await
    }
}

struct ProducerEntry {
    id: String,
    kind: MediaKind,
    track: Track,
    paused: bool,
    app_data: AppData,
    local_id: String,
    transport: Arc<Transport>,
}

struct ConsumerEntry {
    id: String,
    producer_id: String,
    kind: MediaKind,
    track: Track,
    user_id: Option<String>,
    app_data: AppData,
    local_id: String,
    transport: Arc<Transport>,
}

#[derive(Default)]
struct SessionState {
    capabilities: Option<Value>,
    send_transport: Option<Arc<Transport>>,
    recv_transport: Option<Arc<Transport>>,
    producers: HashMap<MediaKind, ProducerEntry>,
    screen: Option<ProducerEntry>,
    // Keyed by producer id
    consumers: HashMap<String, ConsumerEntry>,
    // Consumes awaiting the relay or engine; true once the producer closed
    in_flight: HashMap<String, bool>,
}

impl SessionState {
    fn producer(&self, kind: MediaKind) -> Option<&ProducerEntry> {
        match kind {
            MediaKind::Screen => self.screen.as_ref(),
            _ => self.producers.get(&kind),
        }
    }

    fn producer_mut(&mut self, kind: MediaKind) -> Option<&mut ProducerEntry> {
        match kind {
            MediaKind::Screen => self.screen.as_mut(),
            _ => self.producers.get_mut(&kind),
        }
    }

    fn transport_slot(&mut self, direction: Direction) -> &mut Option<Arc<Transport>> {
        match direction {
            Direction::Send => &mut self.send_transport,
            Direction::Recv => &mut self.recv_transport,
        }
    }
}

struct SessionInner {
    signaling: SignalingChannel,
    engine: Arc<dyn MediaEngine>,
    tracks: Arc<dyn TrackSource>,
    negotiator: Arc<dyn Negotiator>,
    config: MediaConfig,
    state: Mutex<SessionState>,
    consume_queue: tokio::sync::Mutex<()>,
    send_create: tokio::sync::Mutex<()>,
    recv_create: tokio::sync::Mutex<()>,
    owners: OwnerRegistry,
    events: broadcast::Sender<SessionEvent>,
    handlers: Mutex<Vec<(&'static str, HandlerId)>>,
}

/// Media session handle (cheap to clone)
#[derive(Clone)]
pub struct MediaSession {
    inner: Arc<SessionInner>,
}

impl MediaSession {
    /// Create a session negotiating over `signaling`
    pub fn new(
        signaling: SignalingChannel,
        engine: Arc<dyn MediaEngine>,
        tracks: Arc<dyn TrackSource>,
        config: MediaConfig,
    ) -> Self {
        let negotiator = Arc::new(SignalingNegotiator::new(signaling.clone()));
        Self::with_negotiator(signaling, engine, tracks, negotiator, config)
    }

    /// Create a session with a custom transport negotiator
    pub fn with_negotiator(
        signaling: SignalingChannel,
        engine: Arc<dyn MediaEngine>,
        tracks: Arc<dyn TrackSource>,
        negotiator: Arc<dyn Negotiator>,
        config: MediaConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            inner: Arc::new(SessionInner {
                signaling,
                engine,
                tracks,
                negotiator,
                config,
                state: Mutex::new(SessionState::default()),
                consume_queue: tokio::sync::Mutex::new(()),
                send_create: tokio::sync::Mutex::new(()),
                recv_create: tokio::sync::Mutex::new(()),
                owners: OwnerRegistry::new(),
                events,
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Owner registry shared with quality attribution
    pub fn owners(&self) -> OwnerRegistry {
        self.inner.owners.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().capabilities.is_some()
    }

    /// Load the relay's RTP capabilities; must precede transport creation
    pub async fn initialize(&self, capabilities: &Value) -> Result<()> {
        validate_capabilities(capabilities)?;
        self.inner.engine.load(capabilities).await?;
        self.inner.state.lock().capabilities = Some(capabilities.clone());
        info!("Media session initialized with relay capabilities");
        Ok(())
    }

    /// Route relay events into this session
    ///
    /// `new-producer` consumes the announced flow, `producer-closed` and
    /// `user-left` close matching consumers. Calling twice is a no-op.
    pub fn attach(&self) {
        let mut handlers = self.inner.handlers.lock();
        if !handlers.is_empty() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let id = self.inner.signaling.on(ServerEvent::NEW_PRODUCER, {
            let weak = weak.clone();
            move |event| {
                if let ChannelEvent::Server(ServerEvent::NewProducer(announced)) = event {
                    let Some(session) = upgrade(&weak) else { return };
                    session.inner.owners.register(
                        announced.producer_id.clone(),
                        FlowOwner {
                            user_id: announced.user_id.clone(),
                            kind: announced.kind,
                        },
                    );
                    let producer_id = announced.producer_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.consume_producer(&producer_id).await {
                            warn!("Failed to consume announced producer {}: {}", producer_id, e);
                        }
                    });
                }
            }
        });
        handlers.push((ServerEvent::NEW_PRODUCER, id));

        let id = self.inner.signaling.on(ServerEvent::PRODUCER_CLOSED, {
            let weak = weak.clone();
            move |event| {
                if let ChannelEvent::Server(ServerEvent::ProducerClosed(closed)) = event {
                    if let Some(session) = upgrade(&weak) {
                        session.close_consumer(&closed.producer_id);
                        session.inner.owners.remove(&closed.producer_id);
                    }
                }
            }
        });
        handlers.push((ServerEvent::PRODUCER_CLOSED, id));

        let id = self.inner.signaling.on(ServerEvent::USER_LEFT, move |event| {
            if let ChannelEvent::Server(ServerEvent::UserLeft(left)) = event {
                if let Some(session) = upgrade(&weak) {
                    session.close_user_consumers(&left.user_id);
                }
            }
        });
        handlers.push((ServerEvent::USER_LEFT, id));

        debug!("Media session attached to signaling events");
    }

    /// Stop routing relay events into this session
    pub fn detach(&self) {
        let handlers: Vec<_> = self.inner.handlers.lock().drain(..).collect();
        for (name, id) in handlers {
            self.inner.signaling.off(name, Some(id));
        }
    }

    /// Create the send transport, or return the existing one
    pub async fn create_send_transport(&self) -> Result<Arc<Transport>> {
        self.create_transport(Direction::Send).await
    }

    /// Create the receive transport, or return the existing one
    pub async fn create_recv_transport(&self) -> Result<Arc<Transport>> {
        self.create_transport(Direction::Recv).await
    }

    async fn create_transport(&self, direction: Direction) -> Result<Arc<Transport>> {
        let create_lock = match direction {
            Direction::Send => &self.inner.send_create,
            Direction::Recv => &self.inner.recv_create,
        };
        let _creating = create_lock.lock().await;

        {
            let mut state = self.inner.state.lock();
            if state.capabilities.is_none() {
                return Err(CapabilityError::NotInitialized.into());
            }
            if let Some(existing) = state.transport_slot(direction) {
                return Ok(existing.clone());
            }
        }

        let params: TransportParams = self
            .inner
            .signaling
            .call(SignalingRequest::CreateTransport(CreateTransportParams {
                is_producer: direction == Direction::Send,
            }))
            .await?;
        let local = self.inner.engine.create_transport(direction, &params).await?;
        let transport = Arc::new(Transport::new(local, self.inner.negotiator.clone()));

        info!("Created {:?} transport {}", direction, transport.id());
        self.watch_transport(&transport);
        *self.inner.state.lock().transport_slot(direction) = Some(transport.clone());

        Ok(transport)
    }

    fn watch_transport(&self, transport: &Arc<Transport>) {
        let mut changes = transport.state_changes();
        let transport_id = transport.id().to_string();
        let direction = transport.direction();
        let events = self.inner.events.clone();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = *changes.borrow_and_update();
                match state {
                    TransportState::Failed => error!("Transport {} failed", transport_id),
                    _ => debug!("Transport {} is {:?}", transport_id, state),
                }
                let _ = events.send(SessionEvent::TransportStateChanged {
                    transport_id: transport_id.clone(),
                    direction,
                    state,
                });
                if state == TransportState::Closed {
                    break;
                }
            }
        });
    }

    /// Start an outbound flow
    ///
    /// Video and screen get their configured ladder; screen replaces any
    /// previous screen producer once the relay confirms its close. An ended
    /// track is replaced once through the track source.
    pub async fn produce(
        &self,
        kind: MediaKind,
        track: Track,
        profile: ProducerProfile,
    ) -> Result<String> {
        if track.kind() != kind.track_kind() {
            return Err(ProduceError::KindMismatch(kind).into());
        }

        match kind {
            MediaKind::Screen => {
                let previous = self.inner.state.lock().screen.take();
                if let Some(previous) = previous {
                    info!("Replacing screen share producer {}", previous.id);
                    let producer_id = self.release_producer(previous);
                    if let Err(e) = self
                        .inner
                        .signaling
                        .request(SignalingRequest::CloseProducer(ProducerRef::new(&producer_id)))
                        .await
                    {
                        warn!("Relay did not confirm close of {}: {}", producer_id, e);
                    }
                }
            }
            _ => {
                if self.inner.state.lock().producers.contains_key(&kind) {
                    return Err(ProduceError::AlreadyProducing(kind).into());
                }
            }
        }

        let transport = self.create_send_transport().await?;
        let options = self.send_options(kind, profile.ladder.as_ref());
        let mut app_data = profile.app_data;
        app_data
            .entry("kind")
            .or_insert_with(|| Value::String(kind.as_str().to_string()));

        let (produced, track) = match transport
            .produce(kind, &track, &options, app_data.clone())
            .await
        {
            Ok(produced) => (produced, track),
            Err(Error::Produce(ProduceError::TrackEnded)) => {
                warn!("{} track ended during produce, acquiring a fresh one", kind);
                let fresh = self.inner.tracks.acquire(kind).await?;
                let produced = transport
                    .produce(kind, &fresh, &options, app_data.clone())
                    .await?;
                (produced, fresh)
            }
            Err(e) => return Err(e),
        };

        let entry = ProducerEntry {
            id: produced.producer_id.clone(),
            kind,
            track,
            paused: false,
            app_data,
            local_id: produced.local_id,
            transport,
        };

        // A concurrent produce for the same kind may have won while we negotiated.
        let rejected = {
            let mut state = self.inner.state.lock();
            let slot_taken = state.producer(kind).is_some();
            if slot_taken {
                Some(entry)
            } else {
                match kind {
                    MediaKind::Screen => state.screen = Some(entry),
                    _ => {
                        state.producers.insert(kind, entry);
                    }
                }
                None
            }
        };

        if let Some(entry) = rejected {
            let producer_id = entry.id.clone();
            entry.transport.local().stop_sending(&entry.local_id);
            self.spawn_close_producer(producer_id);
            return Err(ProduceError::AlreadyProducing(kind).into());
        }

        Ok(produced.producer_id)
    }

    fn send_options(&self, kind: MediaKind, ladder: Option<&BitrateLadder>) -> SendOptions {
        match kind {
            MediaKind::Audio => SendOptions::default(),
            MediaKind::Video => SendOptions {
                encodings: ladder
                    .unwrap_or(&self.inner.config.video_ladder)
                    .encodings()
                    .to_vec(),
                start_bitrate_kbps: Some(self.inner.config.video_start_bitrate_kbps),
            },
            MediaKind::Screen => SendOptions {
                encodings: ladder
                    .unwrap_or(&self.inner.config.screen_ladder)
                    .encodings()
                    .to_vec(),
                start_bitrate_kbps: Some(self.inner.config.video_start_bitrate_kbps),
            },
        }
    }

    /// Pause a producer locally and on the relay
    ///
    /// Missing producers are logged and ignored.
    pub async fn pause_producer(&self, kind: MediaKind) -> Result<()> {
        self.set_producer_paused(kind, true).await
    }

    /// Resume a paused producer
    pub async fn resume_producer(&self, kind: MediaKind) -> Result<()> {
        self.set_producer_paused(kind, false).await
    }

    async fn set_producer_paused(&self, kind: MediaKind, paused: bool) -> Result<()> {
        let target = {
            let mut state = self.inner.state.lock();
            match state.producer_mut(kind) {
                Some(entry) if entry.paused == paused => None,
                Some(entry) => {
                    entry.paused = paused;
                    Some((entry.id.clone(), entry.local_id.clone(), entry.transport.clone()))
                }
                None => {
                    warn!("No {} producer to {}", kind, if paused { "pause" } else { "resume" });
                    return Ok(());
                }
            }
        };
        let Some((producer_id, local_id, transport)) = target else {
            return Ok(());
        };

        transport.local().set_sender_paused(&local_id, paused).await?;
        let request = if paused {
            SignalingRequest::PauseProducer(ProducerRef::new(&producer_id))
        } else {
            SignalingRequest::ResumeProducer(ProducerRef::new(&producer_id))
        };
        self.inner.signaling.request(request).await?;

        debug!(
            "{} producer {} {}",
            kind,
            producer_id,
            if paused { "paused" } else { "resumed" }
        );
        Ok(())
    }

    /// Swap the track feeding a producer and tell the relay
    pub async fn replace_track(&self, kind: MediaKind, track: Track) -> Result<()> {
        if track.kind() != kind.track_kind() {
            return Err(ProduceError::KindMismatch(kind).into());
        }

        let (producer_id, local_id, transport) = {
            let state = self.inner.state.lock();
            let entry = state.producer(kind).ok_or(ProduceError::NoProducer(kind))?;
            (entry.id.clone(), entry.local_id.clone(), entry.transport.clone())
        };

        transport.local().replace_track(&local_id, &track).await?;
        if let Some(entry) = self.inner.state.lock().producer_mut(kind) {
            if entry.id == producer_id {
                entry.track = track;
            }
        }

        self.inner
            .signaling
            .request(SignalingRequest::ReplaceTrack(ProducerRef::new(&producer_id)))
            .await?;
        info!("Replaced track of {} producer {}", kind, producer_id);
        Ok(())
    }

    /// Close a producer and await the relay's confirmation
    pub async fn close_producer(&self, kind: MediaKind) -> Result<()> {
        let entry = {
            let mut state = self.inner.state.lock();
            match kind {
                MediaKind::Screen => state.screen.take(),
                _ => state.producers.remove(&kind),
            }
        };
        let Some(entry) = entry else {
            warn!("No {} producer to close", kind);
            return Ok(());
        };

        let producer_id = self.release_producer(entry);
        self.inner
            .signaling
            .request(SignalingRequest::CloseProducer(ProducerRef::new(&producer_id)))
            .await?;
        Ok(())
    }

    /// Stop screen sharing without waiting for the relay
    ///
    /// The relay is notified in the background; a failed notification is
    /// only logged.
    pub fn close_screen_share_producer(&self) -> ClosedProducer {
        let entry = self.inner.state.lock().screen.take();
        let Some(entry) = entry else {
            return ClosedProducer { producer_id: None };
        };

        let producer_id = self.release_producer(entry);
        self.spawn_close_producer(producer_id.clone());
        ClosedProducer {
            producer_id: Some(producer_id),
        }
    }

    fn release_producer(&self, entry: ProducerEntry) -> String {
        entry.transport.local().stop_sending(&entry.local_id);
        entry.track.stop();
        let _ = self.inner.events.send(SessionEvent::ProducerClosed {
            producer_id: entry.id.clone(),
            kind: entry.kind,
        });
        entry.id
    }

    fn spawn_close_producer(&self, producer_id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to notify relay about closed producer {}", producer_id);
            return;
        };
        let signaling = self.inner.signaling.clone();
        runtime.spawn(async move {
            if let Err(e) = signaling
                .request(SignalingRequest::CloseProducer(ProducerRef::new(&producer_id)))
                .await
            {
                warn!("Relay close of producer {} failed: {}", producer_id, e);
            }
        });
    }

    /// Consume a remote producer, returning its track
    ///
    /// Idempotent: a second call for the same producer returns the same track.
    pub async fn consume_producer(&self, producer_id: &str) -> Result<Track> {
        let _turn = self.inner.consume_queue.lock().await;

        {
            let mut state = self.inner.state.lock();
            if let Some(existing) = state.consumers.get(producer_id) {
                debug!("Producer {} already consumed", producer_id);
                return Ok(existing.track.clone());
            }
            state.in_flight.insert(producer_id.to_string(), false);
        }

        let result = self.consume_with_retry(producer_id).await;
        if result.is_err() {
            self.inner.state.lock().in_flight.remove(producer_id);
        }
        result
    }

    async fn consume_with_retry(&self, producer_id: &str) -> Result<Track> {
        let transport = self.create_recv_transport().await?;
        match self.consume_on(&transport, producer_id).await {
            Err(e) if e.is_transport_missing() => {
                warn!(
                    "Relay lost receive transport {}, recreating: {}",
                    transport.id(),
                    e
                );
                self.discard_transport(Direction::Recv, &transport);
                let transport = self.create_recv_transport().await?;
                self.consume_on(&transport, producer_id).await
            }
            result => result,
        }
    }

    async fn consume_on(&self, transport: &Arc<Transport>, producer_id: &str) -> Result<Track> {
        let rtp_capabilities = self
            .inner
            .engine
            .rtp_capabilities()
            .ok_or(CapabilityError::NotInitialized)?;

        let params: ConsumerParams = self
            .inner
            .signaling
            .call(SignalingRequest::Consume(ConsumeParams {
                transport_id: transport.id().to_string(),
                producer_id: producer_id.to_string(),
                rtp_capabilities,
            }))
            .await?;

        if params.producer_id != producer_id {
            return Err(ConsumeError::InvalidParameters(format!(
                "asked for producer {}, relay answered for {}",
                producer_id, params.producer_id
            ))
            .into());
        }

        let receiver = transport.consume(&params).await?;

        let owner = self.inner.owners.resolve_owner(producer_id);
        let user_id = owner.as_ref().map(|o| o.user_id.clone()).or_else(|| {
            params
                .app_data
                .get("userId")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        if let Some(user_id) = &user_id {
            self.inner.owners.register(
                params.id.clone(),
                FlowOwner {
                    user_id: user_id.clone(),
                    kind: owner.map(|o| o.kind).unwrap_or(params.kind),
                },
            );
        }

        let track = receiver.track.clone();
        {
            let mut state = self.inner.state.lock();
            // Missing means cleanup ran while the consume was pending.
            if state.in_flight.remove(producer_id) != Some(false) {
                drop(state);
                transport.local().stop_receiving(&receiver.local_id);
                track.stop();
                self.inner.owners.remove(&params.id);
                info!("Producer {} closed before consumer {} was ready", producer_id, params.id);
                return Err(ConsumeError::ProducerClosed(producer_id.to_string()).into());
            }
            state.consumers.insert(
                producer_id.to_string(),
                ConsumerEntry {
                    id: params.id.clone(),
                    producer_id: producer_id.to_string(),
                    kind: params.kind,
                    track: track.clone(),
                    user_id: user_id.clone(),
                    app_data: params.app_data,
                    local_id: receiver.local_id,
                    transport: transport.clone(),
                },
            );
        }

        info!("Consuming producer {} as {}", producer_id, params.id);
        let _ = self.inner.events.send(SessionEvent::TrackAdded {
            producer_id: producer_id.to_string(),
            consumer_id: params.id,
            user_id,
            kind: params.kind,
            track: track.clone(),
        });

        Ok(track)
    }

    /// Consume producers that already existed when the room was joined
    ///
    /// Failures are logged; returns how many producers are now consumed.
    pub async fn consume_existing(&self, producers: &[RemoteProducer]) -> usize {
        let mut consumed = 0;
        for producer in producers {
            self.inner.owners.register(
                producer.producer_id.clone(),
                FlowOwner {
                    user_id: producer.user_id.clone(),
                    kind: producer.kind,
                },
            );
            match self.consume_producer(&producer.producer_id).await {
                Ok(_) => consumed += 1,
                Err(e) => warn!(
                    "Failed to consume existing producer {}: {}",
                    producer.producer_id, e
                ),
            }
        }
        consumed
    }

    fn discard_transport(&self, direction: Direction, transport: &Arc<Transport>) {
        let removed = {
            let mut state = self.inner.state.lock();
            let slot = state.transport_slot(direction);
            let is_current = slot
                .as_ref()
                .map(|current| Arc::ptr_eq(current, transport))
                .unwrap_or(false);
            if is_current {
                slot.take()
            } else {
                None
            }
        };
        if let Some(transport) = removed {
            transport.close();
        }
    }

    /// Close the consumer of a remote producer; returns whether one existed
    ///
    /// A consume of the same producer still in flight is abandoned when it
    /// completes.
    pub fn close_consumer(&self, producer_id: &str) -> bool {
        let entry = {
            let mut state = self.inner.state.lock();
            if let Some(closed) = state.in_flight.get_mut(producer_id) {
                *closed = true;
            }
            state.consumers.remove(producer_id)
        };
        let Some(entry) = entry else {
            return false;
        };

        entry.transport.local().stop_receiving(&entry.local_id);
        entry.track.stop();
        self.inner.owners.remove(&entry.id);

        info!("Closed consumer {} of producer {}", entry.id, entry.producer_id);
        let _ = self.inner.events.send(SessionEvent::TrackRemoved {
            producer_id: entry.producer_id,
            consumer_id: entry.id,
            user_id: entry.user_id,
        });
        true
    }

    fn close_user_consumers(&self, user_id: &str) {
        let owned = self.inner.owners.remove_user(user_id);
        let producer_ids: Vec<String> = self
            .inner
            .state
            .lock()
            .consumers
            .values()
            .filter(|c| c.user_id.as_deref() == Some(user_id) || owned.contains(&c.producer_id))
            .map(|c| c.producer_id.clone())
            .collect();

        for producer_id in &producer_ids {
            self.close_consumer(producer_id);
        }
        info!("User {} left, closed {} consumers", user_id, producer_ids.len());
    }

    /// Close everything and release the capability handle; idempotent
    pub fn cleanup(&self) {
        let state = std::mem::take(&mut *self.inner.state.lock());
        let SessionState {
            capabilities,
            send_transport,
            recv_transport,
            producers,
            screen,
            consumers,
            in_flight: _,
        } = state;

        for entry in producers.into_values().chain(screen) {
            entry.transport.local().stop_sending(&entry.local_id);
            entry.track.stop();
        }
        for entry in consumers.into_values() {
            entry.transport.local().stop_receiving(&entry.local_id);
            entry.track.stop();
        }
        for transport in send_transport.into_iter().chain(recv_transport) {
            transport.close();
        }
        self.inner.owners.clear();

        if capabilities.is_some() {
            self.inner.engine.unload();
            info!("Media session cleaned up");
        }
    }

    /// Read-only view of current state
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();

        let mut producers: Vec<ProducerSnapshot> = state
            .producers
            .values()
            .chain(state.screen.as_ref())
            .map(|p| ProducerSnapshot {
                id: p.id.clone(),
                kind: p.kind,
                paused: p.paused,
                track_id: p.track.id().to_string(),
            })
            .collect();
        producers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut consumers: Vec<ConsumerSnapshot> = state
            .consumers
            .values()
            .map(|c| ConsumerSnapshot {
                id: c.id.clone(),
                producer_id: c.producer_id.clone(),
                kind: c.kind,
                user_id: c.user_id.clone(),
            })
            .collect();
        consumers.sort_by(|a, b| a.id.cmp(&b.id));

        SessionSnapshot {
            initialized: state.capabilities.is_some(),
            send_transport: state.send_transport.as_ref().map(|t| t.state()),
            recv_transport: state.recv_transport.as_ref().map(|t| t.state()),
            producers,
            consumers,
        }
    }

    /// Every live producer and consumer
    pub fn active_flows(&self) -> Vec<ActiveFlow> {
        let state = self.inner.state.lock();

        let upstream = state
            .producers
            .values()
            .chain(state.screen.as_ref())
            .map(|p| ActiveFlow {
                id: p.id.clone(),
                direction: FlowDirection::Upstream,
                kind: p.kind,
                producer_id: p.id.clone(),
                app_data: p.app_data.clone(),
                transport: p.transport.clone(),
                local_id: p.local_id.clone(),
            });

        let downstream = state.consumers.values().map(|c| ActiveFlow {
            id: c.id.clone(),
            direction: FlowDirection::Downstream,
            kind: c.kind,
            producer_id: c.producer_id.clone(),
            app_data: c.app_data.clone(),
            transport: c.transport.clone(),
            local_id: c.local_id.clone(),
        });

        upstream.chain(downstream).collect()
    }
}

fn upgrade(weak: &Weak<SessionInner>) -> Option<MediaSession> {
    weak.upgrade().map(|inner| MediaSession { inner })
}
