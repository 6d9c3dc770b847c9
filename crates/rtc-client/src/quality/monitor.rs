//! Network quality monitor
//!
//! Polls every active producer and consumer on a self-rescheduling loop,
//! turns cumulative counters into rates, classifies them and hands one batch
//! per cycle to a [`SampleSink`]. The monitor only reads session state.

use super::level::QualityLevel;
use super::sink::SampleSink;
use super::stats::{compute_delta, StatsSnapshot};
use crate::media::{ActiveFlow, AppData, FlowDirection, MediaKind, MediaSession, OwnerResolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One flow's quality for one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSample {
    pub user_id: String,
    pub direction: FlowDirection,
    pub kind: MediaKind,
    pub bitrate_kbps: f64,
    /// Percent
    pub packet_loss: f64,
    pub jitter_ms: f64,
    pub rtt_ms: f64,
    pub quality_level: QualityLevel,
    pub timestamp_ms: u64,
}

/// Enumerates the flows to poll
pub trait FlowSource: Send + Sync {
    fn active_flows(&self) -> Vec<ActiveFlow>;
}

impl FlowSource for MediaSession {
    fn active_flows(&self) -> Vec<ActiveFlow> {
        MediaSession::active_flows(self)
    }
}

#[derive(Default)]
struct SnapshotCache {
    // Bumped by start/stop; polls from an older generation are discarded.
    generation: u64,
    snapshots: HashMap<String, StatsSnapshot>,
}

#[derive(Default)]
struct RunState {
    task: Option<JoinHandle<()>>,
    stop: Option<Arc<Notify>>,
}

struct MonitorInner {
    flows: Arc<dyn FlowSource>,
    owners: Arc<dyn OwnerResolver>,
    sink: Arc<dyn SampleSink>,
    local_user_id: String,
    cache: Mutex<SnapshotCache>,
    run: Mutex<RunState>,
}

/// Periodic per-flow quality estimator
#[derive(Clone)]
pub struct NetworkQualityMonitor {
    inner: Arc<MonitorInner>,
}

impl NetworkQualityMonitor {
    /// Create a stopped monitor
    ///
    /// # Arguments
    ///
    /// * `flows` - Live producers and consumers (usually the [`MediaSession`])
    /// * `owners` - Flow owner lookup for attribution
    /// * `sink` - Receives one batch per cycle
    /// * `local_user_id` - Attributed to upstream flows without tags
    pub fn new(
        flows: Arc<dyn FlowSource>,
        owners: Arc<dyn OwnerResolver>,
        sink: Arc<dyn SampleSink>,
        local_user_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                flows,
                owners,
                sink,
                local_user_id: local_user_id.into(),
                cache: Mutex::new(SnapshotCache::default()),
                run: Mutex::new(RunState::default()),
            }),
        }
    }

    /// Monitor a media session using its own owner registry
    pub fn for_session(
        session: &MediaSession,
        sink: Arc<dyn SampleSink>,
        local_user_id: impl Into<String>,
    ) -> Self {
        Self::new(
            Arc::new(session.clone()),
            Arc::new(session.owners()),
            sink,
            local_user_id,
        )
    }

    pub fn is_running(&self) -> bool {
        self.inner.run.lock().task.is_some()
    }

    /// Start polling every `interval`; restarts if already running
    pub fn start(&self, interval: Duration) {
        self.stop();

        let generation = self.inner.cache.lock().generation;
        let stop = Arc::new(Notify::new());
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_loop(inner, generation, interval, stop.clone()));

        let mut run = self.inner.run.lock();
        run.task = Some(task);
        run.stop = Some(stop);
        info!("Network quality monitor started ({:?} interval)", interval);
    }

    /// Stop polling and drop every snapshot
    ///
    /// A poll already in flight completes but its samples are discarded.
    pub fn stop(&self) {
        let (task, stop) = {
            let mut run = self.inner.run.lock();
            (run.task.take(), run.stop.take())
        };

        {
            let mut cache = self.inner.cache.lock();
            cache.generation += 1;
            cache.snapshots.clear();
        }

        if let Some(stop) = stop {
            stop.notify_one();
        }
        if task.is_some() {
            info!("Network quality monitor stopped");
        }
    }

    /// Number of flows with a retained snapshot
    pub fn tracked_flows(&self) -> usize {
        self.inner.cache.lock().snapshots.len()
    }

    /// Run one poll cycle now and return its samples without emitting them
    ///
    /// On a running monitor the samples are computed against the cached
    /// snapshots but the cache is left to the poll loop.
    pub async fn poll_once(&self) -> Vec<NetworkSample> {
        let commit = !self.is_running();
        let generation = self.inner.cache.lock().generation;
        self.inner.poll(generation, commit).await.unwrap_or_default()
    }
}

async fn run_loop(
    inner: Arc<MonitorInner>,
    generation: u64,
    interval: Duration,
    stop: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.notified() => break,
        }

        let Some(samples) = inner.poll(generation, true).await else {
            debug!("Discarding samples from a stopped monitor");
            break;
        };

        if samples.is_empty() {
            continue;
        }
        debug!("Emitting {} network samples", samples.len());
        if let Err(e) = inner.sink.on_samples(samples) {
            warn!("Sample sink rejected batch: {}", e);
        }
    }
}

impl MonitorInner {
    /// `None` when the monitor was stopped or restarted meanwhile
    async fn poll(&self, generation: u64, commit: bool) -> Option<Vec<NetworkSample>> {
        let flows = self.flows.active_flows();

        let mut readings = Vec::with_capacity(flows.len());
        let mut unread = Vec::new();
        for flow in flows {
            match flow.read_counters().await {
                Ok(counters) => readings.push((flow, counters)),
                Err(e) => {
                    debug!("No stats for flow {}: {}", flow.id, e);
                    unread.push(flow.id);
                }
            }
        }

        let mut cache = self.cache.lock();
        if cache.generation != generation {
            return None;
        }

        let mut samples = Vec::with_capacity(readings.len());
        let mut retained = HashMap::with_capacity(readings.len());

        for (flow, counters) in readings {
            let delta = compute_delta(cache.snapshots.get(&flow.id), &counters);
            let quality_level = QualityLevel::classify(
                delta.packet_loss_pct,
                counters.jitter_ms,
                counters.rtt_ms,
                delta.classified_bitrate(),
            );
            let (user_id, kind) = self.attribute(&flow);

            samples.push(NetworkSample {
                user_id,
                direction: flow.direction,
                kind,
                bitrate_kbps: delta.bitrate_kbps,
                packet_loss: delta.packet_loss_pct,
                jitter_ms: counters.jitter_ms,
                rtt_ms: counters.rtt_ms,
                quality_level,
                timestamp_ms: counters.timestamp_ms,
            });
            retained.insert(flow.id, counters);
        }

        if !commit {
            return Some(samples);
        }

        // A live flow with a failed read keeps its baseline; flows that went
        // away lose theirs.
        for id in unread {
            if let Some(previous) = cache.snapshots.remove(&id) {
                retained.insert(id, previous);
            }
        }
        cache.snapshots = retained;
        Some(samples)
    }

    /// Owner registry, then flow tags, then transport tags, then fallback
    fn attribute(&self, flow: &ActiveFlow) -> (String, MediaKind) {
        let registered = self.owners.resolve_owner(&flow.id).or_else(|| {
            (flow.direction == FlowDirection::Downstream)
                .then(|| self.owners.resolve_owner(&flow.producer_id))
                .flatten()
        });
        if let Some(owner) = registered {
            return (owner.user_id, owner.kind);
        }

        if let Some(tagged) = tagged_owner(&flow.app_data, flow.kind)
            .or_else(|| tagged_owner(&flow.transport_app_data(), flow.kind))
        {
            return tagged;
        }

        match flow.direction {
            FlowDirection::Upstream => (self.local_user_id.clone(), flow.kind),
            FlowDirection::Downstream => (flow.producer_id.clone(), flow.kind),
        }
    }
}

fn tagged_owner(app_data: &AppData, default_kind: MediaKind) -> Option<(String, MediaKind)> {
    let user_id = app_data.get("userId").and_then(Value::as_str)?;
    let kind = app_data
        .get("kind")
        .and_then(Value::as_str)
        .and_then(MediaKind::parse)
        .unwrap_or(default_kind);
    Some((user_id.to_string(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_owner() {
        let mut tags = AppData::new();
        assert_eq!(tagged_owner(&tags, MediaKind::Audio), None);

        tags.insert("userId".to_string(), json!("dana"));
        assert_eq!(
            tagged_owner(&tags, MediaKind::Audio),
            Some(("dana".to_string(), MediaKind::Audio))
        );

        tags.insert("kind".to_string(), json!("screen"));
        assert_eq!(
            tagged_owner(&tags, MediaKind::Video),
            Some(("dana".to_string(), MediaKind::Screen))
        );
    }

    #[test]
    fn test_sample_wire_shape() {
        let sample = NetworkSample {
            user_id: "u".to_string(),
            direction: FlowDirection::Upstream,
            kind: MediaKind::Audio,
            bitrate_kbps: 32.0,
            packet_loss: 0.5,
            jitter_ms: 3.0,
            rtt_ms: 20.0,
            quality_level: QualityLevel::Fair,
            timestamp_ms: 99,
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["direction"], "upstream");
        assert_eq!(value["bitrateKbps"], 32.0);
        assert_eq!(value["qualityLevel"], "fair");
    }
}
