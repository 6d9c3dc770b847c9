//! Per-flow deltas between consecutive counter snapshots

use crate::media::FlowCounters;

/// Counters retained per flow id between polls
pub type StatsSnapshot = FlowCounters;

/// Rates derived from two snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowDelta {
    /// Bits per millisecond, i.e. kbps
    pub bitrate_kbps: f64,
    /// Lost packets as a percentage of packets in the interval
    pub packet_loss_pct: f64,
    /// false for a baseline (no previous snapshot or no elapsed time)
    pub measured: bool,
}

impl FlowDelta {
    fn baseline() -> Self {
        Self {
            bitrate_kbps: 0.0,
            packet_loss_pct: 0.0,
            measured: false,
        }
    }

    /// Bitrate to classify on; `None` for a baseline
    pub fn classified_bitrate(&self) -> Option<f64> {
        self.measured.then_some(self.bitrate_kbps)
    }
}

/// Compute rates from the previous snapshot to `current`
///
/// Counter resets clamp every delta to zero.
pub fn compute_delta(previous: Option<&StatsSnapshot>, current: &StatsSnapshot) -> FlowDelta {
    let Some(previous) = previous else {
        return FlowDelta::baseline();
    };

    let elapsed_ms = current.timestamp_ms.saturating_sub(previous.timestamp_ms);
    if elapsed_ms == 0 {
        return FlowDelta::baseline();
    }

    let bytes = current.bytes.saturating_sub(previous.bytes);
    let packets = current.packets.saturating_sub(previous.packets);
    let lost = current.packets_lost.saturating_sub(previous.packets_lost);

    let packet_loss_pct = if packets > 0 {
        lost as f64 / packets as f64 * 100.0
    } else {
        0.0
    };

    FlowDelta {
        bitrate_kbps: bytes as f64 * 8.0 / elapsed_ms as f64,
        packet_loss_pct,
        measured: true,
    }
}
