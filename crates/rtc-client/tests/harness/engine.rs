//! Fake local media stack

use async_trait::async_trait;
use huddle_rtc_client::media::{
    AppData, Direction, Encoding, FlowCounters, LocalReceiver, LocalSender, LocalTransport,
    MediaEngine, SendOptions, TrackSource, TransportState,
};
use huddle_rtc_client::signaling::protocol::{ConsumerParams, TransportParams};
use huddle_rtc_client::{Error, MediaKind, ProduceError, Result, Track};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct EngineState {
    loaded: Option<Value>,
    unloads: usize,
    transports: Vec<Arc<FakeTransport>>,
}

/// Media engine that builds [`FakeTransport`]s
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded.is_some()
    }

    pub fn unload_count(&self) -> usize {
        self.state.lock().unloads
    }

    pub fn transports(&self) -> Vec<Arc<FakeTransport>> {
        self.state.lock().transports.clone()
    }

    /// Most recently created transport for `direction`
    pub fn transport(&self, direction: Direction) -> Option<Arc<FakeTransport>> {
        self.state
            .lock()
            .transports
            .iter()
            .rev()
            .find(|t| t.direction == direction)
            .cloned()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load(&self, capabilities: &Value) -> Result<()> {
        self.state.lock().loaded = Some(capabilities.clone());
        Ok(())
    }

    fn rtp_capabilities(&self) -> Option<Value> {
        self.state
            .lock()
            .loaded
            .as_ref()
            .map(|caps| json!({"codecs": caps["codecs"].clone()}))
    }

    async fn create_transport(
        &self,
        direction: Direction,
        params: &TransportParams,
    ) -> Result<Arc<dyn LocalTransport>> {
        let transport = Arc::new(FakeTransport::new(&params.id, direction));
        self.state.lock().transports.push(transport.clone());
        Ok(transport)
    }

    fn unload(&self) {
        let mut state = self.state.lock();
        state.loaded = None;
        state.unloads += 1;
    }
}

/// A sender on a fake transport
#[derive(Debug, Clone)]
pub struct FakeSender {
    pub track: Track,
    pub paused: bool,
    pub encodings: Vec<Encoding>,
}

#[derive(Default)]
struct TransportFlows {
    senders: HashMap<String, FakeSender>,
    receivers: HashMap<String, Track>,
    counters: HashMap<String, FlowCounters>,
    counters_delay: Option<Duration>,
    closed: bool,
}

pub struct FakeTransport {
    id: String,
    direction: Direction,
    state: watch::Sender<TransportState>,
    app_data: Mutex<AppData>,
    flows: Mutex<TransportFlows>,
    next_local: AtomicU64,
    dtls_requests: AtomicUsize,
}

impl FakeTransport {
    fn new(id: &str, direction: Direction) -> Self {
        let (state, _) = watch::channel(TransportState::New);
        Self {
            id: id.to_string(),
            direction,
            state,
            app_data: Mutex::new(AppData::new()),
            flows: Mutex::new(TransportFlows::default()),
            next_local: AtomicU64::new(1),
            dtls_requests: AtomicUsize::new(0),
        }
    }

    pub fn transport_id(&self) -> &str {
        &self.id
    }

    pub fn set_state(&self, state: TransportState) {
        self.state.send_replace(state);
    }

    pub fn set_app_data(&self, app_data: AppData) {
        *self.app_data.lock() = app_data;
    }

    pub fn senders(&self) -> Vec<FakeSender> {
        self.flows.lock().senders.values().cloned().collect()
    }

    pub fn sender_ids(&self) -> Vec<String> {
        self.flows.lock().senders.keys().cloned().collect()
    }

    pub fn receiver_ids(&self) -> Vec<String> {
        self.flows.lock().receivers.keys().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.flows.lock().closed
    }

    pub fn dtls_requests(&self) -> usize {
        self.dtls_requests.load(Ordering::SeqCst)
    }

    pub fn set_counters(&self, local_id: &str, counters: FlowCounters) {
        self.flows.lock().counters.insert(local_id.to_string(), counters);
    }

    /// Set the same counters on every sender and receiver
    pub fn set_all_counters(&self, counters: FlowCounters) {
        let mut flows = self.flows.lock();
        let ids: Vec<String> = flows
            .senders
            .keys()
            .chain(flows.receivers.keys())
            .cloned()
            .collect();
        for id in ids {
            flows.counters.insert(id, counters);
        }
    }

    /// Make counters reads for `local_id` fail until set again
    pub fn clear_counters(&self, local_id: &str) {
        self.flows.lock().counters.remove(local_id);
    }

    /// Make every counters read take `delay`
    pub fn set_counters_delay(&self, delay: Duration) {
        self.flows.lock().counters_delay = Some(delay);
    }

    fn next_local_id(&self, prefix: &str) -> String {
        format!(
            "{}-{}-{}",
            self.id,
            prefix,
            self.next_local.fetch_add(1, Ordering::SeqCst)
        )
    }
}

#[async_trait]
impl LocalTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    fn app_data(&self) -> AppData {
        self.app_data.lock().clone()
    }

    async fn dtls_parameters(&self) -> Result<Value> {
        self.dtls_requests.fetch_add(1, Ordering::SeqCst);
        self.set_state(TransportState::Connecting);
        Ok(json!({"role": "client", "fingerprints": []}))
    }

    async fn start_sending(&self, track: &Track, options: &SendOptions) -> Result<LocalSender> {
        if track.is_ended() {
            return Err(ProduceError::TrackEnded.into());
        }
        let local_id = self.next_local_id("sender");
        self.flows.lock().senders.insert(
            local_id.clone(),
            FakeSender {
                track: track.clone(),
                paused: false,
                encodings: options.encodings.clone(),
            },
        );
        Ok(LocalSender {
            local_id,
            rtp_parameters: json!({"encodings": options.encodings.len()}),
        })
    }

    async fn set_sender_paused(&self, local_id: &str, paused: bool) -> Result<()> {
        let mut flows = self.flows.lock();
        let sender = flows
            .senders
            .get_mut(local_id)
            .ok_or_else(|| Error::Engine(format!("no sender {}", local_id)))?;
        sender.paused = paused;
        Ok(())
    }

    async fn replace_track(&self, local_id: &str, track: &Track) -> Result<()> {
        let mut flows = self.flows.lock();
        let sender = flows
            .senders
            .get_mut(local_id)
            .ok_or_else(|| Error::Engine(format!("no sender {}", local_id)))?;
        sender.track = track.clone();
        Ok(())
    }

    fn stop_sending(&self, local_id: &str) {
        self.flows.lock().senders.remove(local_id);
    }

    async fn start_receiving(&self, params: &ConsumerParams) -> Result<LocalReceiver> {
        let local_id = self.next_local_id("receiver");
        let track = Track::new(
            format!("track-{}", params.id),
            params.kind.track_kind(),
            format!("remote {}", params.producer_id),
        );
        self.flows
            .lock()
            .receivers
            .insert(local_id.clone(), track.clone());
        self.set_state(TransportState::Connected);
        Ok(LocalReceiver { local_id, track })
    }

    fn stop_receiving(&self, local_id: &str) {
        self.flows.lock().receivers.remove(local_id);
    }

    async fn counters(&self, local_id: &str) -> Result<FlowCounters> {
        let delay = self.flows.lock().counters_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.flows
            .lock()
            .counters
            .get(local_id)
            .copied()
            .ok_or_else(|| Error::Engine(format!("no stats for {}", local_id)))
    }

    fn close(&self) {
        {
            let mut flows = self.flows.lock();
            flows.closed = true;
            flows.senders.clear();
            flows.receivers.clear();
        }
        self.set_state(TransportState::Closed);
    }
}

/// Track source handing out fresh tracks
#[derive(Default)]
pub struct FakeTrackSource {
    acquired: AtomicUsize,
}

impl FakeTrackSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackSource for FakeTrackSource {
    async fn acquire(&self, kind: MediaKind) -> Result<Track> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Track::new(
            format!("fresh-{}-{}", kind, n),
            kind.track_kind(),
            "fake capture",
        ))
    }
}

/// Live local track of the right kind for `kind`
pub fn local_track(id: &str, kind: MediaKind) -> Track {
    Track::new(id, kind.track_kind(), "fake capture")
}
