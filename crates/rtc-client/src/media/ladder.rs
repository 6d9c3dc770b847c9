//! Simulcast bitrate ladders

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One independently capped encoding of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encoding {
    /// Simulcast layer id
    pub rid: String,
    /// Resolution divisor (1.0 = full resolution)
    pub scale_resolution_down_by: f64,
    /// Bitrate cap in bits per second
    pub max_bitrate_bps: u32,
}

impl Encoding {
    fn new(rid: &str, scale: f64, max_kbps: u32) -> Self {
        Self {
            rid: rid.to_string(),
            scale_resolution_down_by: scale,
            max_bitrate_bps: max_kbps * 1000,
        }
    }
}

/// Ordered encodings, lowest layer first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitrateLadder(Vec<Encoding>);

impl BitrateLadder {
    /// Build a ladder from explicit encodings
    pub fn new(encodings: Vec<Encoding>) -> Self {
        Self(encodings)
    }

    /// Camera ladder: quarter, half and full resolution
    pub fn camera() -> Self {
        Self(vec![
            Encoding::new("q", 4.0, 150),
            Encoding::new("h", 2.0, 500),
            Encoding::new("f", 1.0, 1200),
        ])
    }

    /// Screen share ladder: half and full resolution at higher caps
    pub fn screen() -> Self {
        Self(vec![Encoding::new("h", 2.0, 1500), Encoding::new("f", 1.0, 4000)])
    }

    /// Encodings, lowest layer first
    pub fn encodings(&self) -> &[Encoding] {
        &self.0
    }

    /// Highest bitrate cap in bps
    pub fn max_bitrate_bps(&self) -> u32 {
        self.0.iter().map(|e| e.max_bitrate_bps).max().unwrap_or(0)
    }

    /// Reject empty ladders and degenerate tiers
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidConfig(format!("{} has no encodings", name)));
        }
        for encoding in &self.0 {
            if encoding.max_bitrate_bps == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} tier '{}' has a zero bitrate",
                    name, encoding.rid
                )));
            }
            if encoding.scale_resolution_down_by < 1.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} tier '{}' scales up ({})",
                    name, encoding.rid, encoding.scale_resolution_down_by
                )));
            }
        }
        Ok(())
    }
}
