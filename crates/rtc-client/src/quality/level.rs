//! Quality classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse quality of one flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Poor,
    Fair,
    Good,
    Excellent,
    Unknown,
}

impl QualityLevel {
    /// Classify from loss %, jitter ms, rtt ms and bitrate kbps
    ///
    /// Thresholds are checked worst first. `bitrate_kbps` is `None` for a
    /// baseline sample, which is then judged on loss, jitter and rtt only.
    pub fn classify(
        packet_loss_pct: f64,
        jitter_ms: f64,
        rtt_ms: f64,
        bitrate_kbps: Option<f64>,
    ) -> Self {
        let below = |limit: f64| bitrate_kbps.is_some_and(|b| b < limit);

        if packet_loss_pct > 5.0 || jitter_ms > 50.0 || rtt_ms > 400.0 {
            QualityLevel::Poor
        } else if packet_loss_pct > 2.0 || jitter_ms > 30.0 || rtt_ms > 250.0 || below(200.0) {
            QualityLevel::Fair
        } else if packet_loss_pct > 1.0 || jitter_ms > 15.0 || rtt_ms > 150.0 || below(500.0) {
            QualityLevel::Good
        } else if bitrate_kbps.map_or(true, f64::is_finite) {
            QualityLevel::Excellent
        } else {
            QualityLevel::Unknown
        }
    }

    /// Ordering key, higher is better; `None` for unknown
    pub fn rank(&self) -> Option<u8> {
        match self {
            QualityLevel::Poor => Some(0),
            QualityLevel::Fair => Some(1),
            QualityLevel::Good => Some(2),
            QualityLevel::Excellent => Some(3),
            QualityLevel::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Poor => "poor",
            QualityLevel::Fair => "fair",
            QualityLevel::Good => "good",
            QualityLevel::Excellent => "excellent",
            QualityLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
