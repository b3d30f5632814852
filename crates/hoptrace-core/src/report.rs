//! Report types for trace output.
//!
//! These are the JSON-facing shapes consumed by the presentation layer.

use crate::{RouteEntry, TraceOutcome};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A single hop in the discovered path, optionally annotated with a
/// geolocation string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopRecord {
    /// Hop limit at which this responder was observed.
    pub hop: u8,
    /// Responder address.
    pub ip_address: Ipv4Addr,
    /// Human-readable location, when geolocation was requested and resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl From<RouteEntry> for HopRecord {
    fn from(entry: RouteEntry) -> Self {
        Self {
            hop: entry.hop,
            ip_address: entry.ip,
            location: None,
        }
    }
}

/// Complete output of one trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Target as given by the caller.
    pub target: String,
    /// Resolved target address.
    pub target_ip: Ipv4Addr,
    /// Interface the trace ran on.
    pub interface: String,
    /// How the trace terminated.
    pub outcome: TraceOutcome,
    /// The discovered path, one record per responding hop, hop ascending.
    pub hops: Vec<HopRecord>,
}

impl TraceReport {
    /// Serializes the report to JSON with indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serializes the report to compact JSON.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
