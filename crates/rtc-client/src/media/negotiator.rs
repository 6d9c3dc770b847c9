//! Transport negotiation strategy

use super::types::{AppData, MediaKind};
use crate::signaling::protocol::{
    ConnectTransportParams, ProduceParams, ProduceResponse, SignalingRequest,
};
use crate::signaling::SignalingChannel;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Relay-side half of transport setup
///
/// Bound to a transport at construction; invoked when the transport first
/// needs connecting and for every new producer.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Hand the local DTLS parameters to the relay
    async fn connect_transport(&self, transport_id: &str, dtls_parameters: Value) -> Result<()>;

    /// Announce a new producer; returns the relay-assigned id
    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<String>;
}

/// Negotiates over the signaling channel
#[derive(Clone)]
pub struct SignalingNegotiator {
    channel: SignalingChannel,
}

impl SignalingNegotiator {
    pub fn new(channel: SignalingChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Negotiator for SignalingNegotiator {
    async fn connect_transport(&self, transport_id: &str, dtls_parameters: Value) -> Result<()> {
        self.channel
            .request(SignalingRequest::ConnectTransport(ConnectTransportParams {
                transport_id: transport_id.to_string(),
                dtls_parameters,
            }))
            .await?;
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<String> {
        let response: ProduceResponse = self
            .channel
            .call(SignalingRequest::Produce(ProduceParams {
                transport_id: transport_id.to_string(),
                kind,
                rtp_parameters,
                app_data,
            }))
            .await?;
        Ok(response.id)
    }
}
