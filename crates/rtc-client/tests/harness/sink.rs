//! Collecting sample sink

use huddle_rtc_client::quality::{NetworkSample, SampleSink, SampleSinkError};
use parking_lot::Mutex;

/// Keeps every batch it receives
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<NetworkSample>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<NetworkSample>> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }
}

impl SampleSink for CollectingSink {
    fn on_samples(&self, samples: Vec<NetworkSample>) -> Result<(), SampleSinkError> {
        self.batches.lock().push(samples);
        Ok(())
    }
}
