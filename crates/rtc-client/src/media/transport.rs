//! Negotiated media transport
//!
//! A [`Transport`] is built in two phases: the relay issues parameters, the
//! engine constructs the local half, then a [`Negotiator`] is bound. The
//! DTLS connect runs once, on first use.

use super::engine::{FlowCounters, LocalReceiver, LocalTransport, SendOptions};
use super::negotiator::Negotiator;
use super::types::{AppData, Direction, MediaKind, Track, TransportState};
use crate::error::ProduceError;
use crate::signaling::protocol::ConsumerParams;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

/// Result of a successful produce on a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedFlow {
    /// Relay-assigned producer id
    pub producer_id: String,
    /// Engine-local sender handle
    pub local_id: String,
}

pub struct Transport {
    local: Arc<dyn LocalTransport>,
    negotiator: Arc<dyn Negotiator>,
    connected: OnceCell<()>,
}

impl Transport {
    pub fn new(local: Arc<dyn LocalTransport>, negotiator: Arc<dyn Negotiator>) -> Self {
        Self {
            local,
            negotiator,
            connected: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.local.id()
    }

    pub fn direction(&self) -> Direction {
        self.local.direction()
    }

    pub fn state(&self) -> TransportState {
        *self.local.state_changes().borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.local.state_changes()
    }

    pub fn app_data(&self) -> AppData {
        self.local.app_data()
    }

    pub(crate) fn local(&self) -> &Arc<dyn LocalTransport> {
        &self.local
    }

    /// Run the DTLS connect exactly once
    async fn ensure_connected(&self) -> Result<()> {
        self.connected
            .get_or_try_init(|| async {
                let dtls = self.local.dtls_parameters().await?;
                self.negotiator.connect_transport(self.local.id(), dtls).await?;
                debug!("Transport {} connected to relay", self.local.id());
                Ok::<(), crate::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Start a sender and announce it to the relay
    ///
    /// The local sender is stopped again if the relay refuses it.
    pub async fn produce(
        &self,
        kind: MediaKind,
        track: &Track,
        options: &SendOptions,
        app_data: AppData,
    ) -> Result<ProducedFlow> {
        if track.is_ended() {
            return Err(ProduceError::TrackEnded.into());
        }

        self.ensure_connected().await?;
        let sender = self.local.start_sending(track, options).await?;

        match self
            .negotiator
            .produce(self.local.id(), kind, sender.rtp_parameters, app_data)
            .await
        {
            Ok(producer_id) => {
                info!(
                    "Producing {} on transport {} as {}",
                    kind,
                    self.local.id(),
                    producer_id
                );
                Ok(ProducedFlow {
                    producer_id,
                    local_id: sender.local_id,
                })
            }
            Err(e) => {
                warn!("Relay refused {} producer: {}", kind, e);
                self.local.stop_sending(&sender.local_id);
                Err(e)
            }
        }
    }

    /// Start a receiver for relay-issued consumer parameters
    pub async fn consume(&self, params: &ConsumerParams) -> Result<LocalReceiver> {
        self.ensure_connected().await?;
        self.local.start_receiving(params).await
    }

    pub async fn counters(&self, local_id: &str) -> Result<FlowCounters> {
        self.local.counters(local_id).await
    }

    pub fn close(&self) {
        debug!("Closing transport {}", self.local.id());
        self.local.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.local.id())
            .field("direction", &self.local.direction())
            .field("state", &self.state())
            .finish()
    }
}
