//! Sample sinks
//!
//! A [`SampleSink`] receives one batch of samples per poll cycle.

use super::monitor::NetworkSample;
use parking_lot::Mutex;
use std::io::Write;
use tokio::sync::broadcast;

/// Error type for sample delivery
#[derive(Debug, thiserror::Error)]
pub enum SampleSinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel send error: {0}")]
    Channel(String),
}

/// Receiver of sample batches
pub trait SampleSink: Send + Sync {
    /// Deliver one non-empty batch
    fn on_samples(&self, samples: Vec<NetworkSample>) -> Result<(), SampleSinkError>;
}

impl<F> SampleSink for F
where
    F: Fn(Vec<NetworkSample>) + Send + Sync,
{
    fn on_samples(&self, samples: Vec<NetworkSample>) -> Result<(), SampleSinkError> {
        self(samples);
        Ok(())
    }
}

/// Broadcast channel sink
pub struct ChannelSampleSink {
    sender: broadcast::Sender<Vec<NetworkSample>>,
}

impl ChannelSampleSink {
    /// Create a sink with the given capacity (in batches)
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Vec<NetworkSample>>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<NetworkSample>> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl SampleSink for ChannelSampleSink {
    fn on_samples(&self, samples: Vec<NetworkSample>) -> Result<(), SampleSinkError> {
        self.sender
            .send(samples)
            .map_err(|e| SampleSinkError::Channel(e.to_string()))?;
        Ok(())
    }
}

/// Newline-delimited JSON sink, one sample per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> SampleSink for JsonLinesSink<W> {
    fn on_samples(&self, samples: Vec<NetworkSample>) -> Result<(), SampleSinkError> {
        let mut writer = self.writer.lock();
        for sample in &samples {
            let line = serde_json::to_string(sample)
                .map_err(|e| SampleSinkError::Serialization(e.to_string()))?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }
}
