//! In-memory relay
//!
//! Implements [`SignalingConnector`] so a [`SignalingChannel`] can be driven
//! without a network. Requests are recorded and answered with canned
//! responses; tests can script replies, delays, link drops and pushes.
//!
//! [`SignalingChannel`]: huddle_rtc_client::SignalingChannel

use async_trait::async_trait;
use huddle_rtc_client::auth::Credentials;
use huddle_rtc_client::error::ConnectionError;
use huddle_rtc_client::signaling::protocol::{InboundFrame, SignalingRequest};
use huddle_rtc_client::signaling::{CloseReason, LinkEvent, SignalingConnector, SignalingLink};
use huddle_rtc_client::{MediaKind, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted answer to one request
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Err { code: i32, message: String },
    Silent,
}

/// A request the relay received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub params: Value,
}

struct RemoteOwner {
    user_id: String,
    kind: MediaKind,
}

struct RelayState {
    tokens_seen: Vec<String>,
    rejected_tokens: HashSet<String>,
    transient_failures: usize,
    link: Option<mpsc::UnboundedSender<LinkEvent>>,
    link_generation: u64,
    requests: Vec<RecordedRequest>,
    scripted: HashMap<String, VecDeque<Reply>>,
    delays: HashMap<String, Duration>,
    join_reply: Value,
    remote_producers: HashMap<String, RemoteOwner>,
    next_id: u64,
}

/// In-memory relay (cheap to clone)
#[derive(Clone)]
pub struct MockRelay {
    state: Arc<Mutex<RelayState>>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                tokens_seen: Vec::new(),
                rejected_tokens: HashSet::new(),
                transient_failures: 0,
                link: None,
                link_generation: 0,
                requests: Vec::new(),
                scripted: HashMap::new(),
                delays: HashMap::new(),
                join_reply: json!({
                    "admitted": true,
                    "pendingApproval": false,
                    "rtpCapabilities": Self::capabilities(),
                    "producers": []
                }),
                remote_producers: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Router capabilities the relay advertises
    pub fn capabilities() -> Value {
        json!({
            "codecs": [
                {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
                {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
            ],
            "headerExtensions": []
        })
    }

    /// Refuse connects presenting this access token
    pub fn reject_token(&self, token: &str) {
        self.state.lock().rejected_tokens.insert(token.to_string());
    }

    /// Fail the next `count` connects with a network error
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().transient_failures = count;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().tokens_seen.len()
    }

    /// Access tokens presented, in order
    pub fn tokens_seen(&self) -> Vec<String> {
        self.state.lock().tokens_seen.clone()
    }

    pub fn is_linked(&self) -> bool {
        self.state.lock().link.is_some()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Params of every request with this method
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .map(|r| r.params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests_for(method).len()
    }

    /// Answer the next request of `method` with `reply`
    pub fn reply_once(&self, method: &str, reply: Reply) {
        self.state
            .lock()
            .scripted
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Delay every answer to `method`
    pub fn set_delay(&self, method: &str, delay: Duration) {
        self.state.lock().delays.insert(method.to_string(), delay);
    }

    pub fn set_join_reply(&self, reply: Value) {
        self.state.lock().join_reply = reply;
    }

    /// Push a notification on the current link
    pub fn notify(&self, method: &str, params: Value) {
        let state = self.state.lock();
        if let Some(link) = &state.link {
            let _ = link.send(LinkEvent::Frame(InboundFrame::notification_frame(method, params)));
        }
    }

    /// Push raw text on the current link
    pub fn send_raw(&self, text: &str) {
        if let Some(link) = &self.state.lock().link {
            let _ = link.send(LinkEvent::Frame(text.to_string()));
        }
    }

    /// Announce a remote producer (remembered for later consume answers)
    pub fn announce_producer(&self, producer_id: &str, user_id: &str, kind: MediaKind) {
        self.state.lock().remote_producers.insert(
            producer_id.to_string(),
            RemoteOwner {
                user_id: user_id.to_string(),
                kind,
            },
        );
        self.notify(
            "new-producer",
            json!({"producerId": producer_id, "userId": user_id, "kind": kind}),
        );
    }

    /// Drop the link abnormally with `reason`
    pub fn drop_link(&self, reason: &str) {
        self.close_link(CloseReason::abnormal(reason));
    }

    /// Close the link in an orderly way
    pub fn close_link_normally(&self) {
        self.close_link(CloseReason::normal("server shutting down"));
    }

    /// Close the link in an orderly way with the given reason
    pub fn close_link_normally_with(&self, reason: &str) {
        self.close_link(CloseReason::normal(reason));
    }

    fn close_link(&self, reason: CloseReason) {
        let mut state = self.state.lock();
        state.link_generation += 1;
        if let Some(link) = state.link.take() {
            let _ = link.send(LinkEvent::Closed(reason));
        }
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id
    }

    fn default_reply(&self, method: &str, params: &Value) -> Reply {
        match method {
            "joinRoom" => Reply::Ok(self.state.lock().join_reply.clone()),
            "createTransport" => {
                let side = if params["isProducer"].as_bool().unwrap_or(false) {
                    "send"
                } else {
                    "recv"
                };
                Reply::Ok(json!({
                    "id": format!("{}-transport-{}", side, self.next_id()),
                    "iceParameters": {"usernameFragment": "frag", "password": "pw"},
                    "iceCandidates": [],
                    "dtlsParameters": {"role": "auto", "fingerprints": []}
                }))
            }
            "produce" => Reply::Ok(json!({"id": format!("producer-{}", self.next_id())})),
            "consume" => {
                let producer_id = params["producerId"].as_str().unwrap_or_default().to_string();
                let consumer_id = format!("consumer-{}", self.next_id());
                let state = self.state.lock();
                let (kind, app_data) = match state.remote_producers.get(&producer_id) {
                    Some(owner) => (owner.kind, json!({"userId": owner.user_id})),
                    None => (MediaKind::Video, json!({})),
                };
                Reply::Ok(json!({
                    "id": consumer_id,
                    "producerId": producer_id,
                    "kind": kind,
                    "rtpParameters": {"codecs": []},
                    "appData": app_data
                }))
            }
            _ => Reply::Ok(json!({})),
        }
    }
}

#[async_trait]
impl SignalingConnector for MockRelay {
    async fn connect(&self, _url: &str, credentials: &Credentials) -> Result<SignalingLink> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let generation = {
            let mut state = self.state.lock();
            state.tokens_seen.push(credentials.access_token.clone());

            if state.rejected_tokens.contains(&credentials.access_token) {
                return Err(ConnectionError::Auth("401 Unauthorized".to_string()).into());
            }
            if state.transient_failures > 0 {
                state.transient_failures -= 1;
                return Err(ConnectionError::Transient("connection refused".to_string()).into());
            }

            state.link_generation += 1;
            state.link = Some(in_tx.clone());
            state.link_generation
        };

        tokio::spawn(self.clone().serve(generation, out_rx, in_tx));

        Ok(SignalingLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

impl MockRelay {
    async fn serve(
        self,
        generation: u64,
        mut requests: mpsc::UnboundedReceiver<String>,
        responses: mpsc::UnboundedSender<LinkEvent>,
    ) {
        while let Some(text) = requests.recv().await {
            let Ok((id, request)) = SignalingRequest::from_frame(&text) else {
                continue;
            };
            let encoded = serde_json::to_value(&request).unwrap_or_default();
            let method = request.method_name().to_string();
            let params = encoded.get("params").cloned().unwrap_or(Value::Null);

            let (scripted, delay) = {
                let mut state = self.state.lock();
                if state.link_generation != generation {
                    continue;
                }
                state.requests.push(RecordedRequest {
                    method: method.clone(),
                    params: params.clone(),
                });
                let scripted = state.scripted.get_mut(&method).and_then(VecDeque::pop_front);
                (scripted, state.delays.get(&method).copied())
            };

            let reply = scripted.unwrap_or_else(|| self.default_reply(&method, &params));
            let frame = match reply {
                Reply::Ok(result) => InboundFrame::response_frame(id, result),
                Reply::Err { code, message } => InboundFrame::error_frame(id, code, &message),
                Reply::Silent => continue,
            };

            let relay = self.clone();
            let responses = responses.clone();
            tokio::spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if relay.state.lock().link_generation == generation {
                    let _ = responses.send(LinkEvent::Frame(frame));
                }
            });
        }
    }
}
