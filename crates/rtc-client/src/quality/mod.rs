//! Network quality estimation from periodic per-flow statistics

mod level;
mod monitor;
mod sink;
mod stats;

pub use level::QualityLevel;
pub use monitor::{FlowSource, NetworkQualityMonitor, NetworkSample};
pub use sink::{ChannelSampleSink, JsonLinesSink, SampleSink, SampleSinkError};
pub use stats::{compute_delta, FlowDelta, StatsSnapshot};
