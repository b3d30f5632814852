//! Core types for path-discovery operations.

use pnet_base::MacAddr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// An encoded link-layer frame, ready for injection.
///
/// Constructed fresh per probe hop and immutable once built. The header
/// fields are kept alongside the wire bytes for logging and inspection.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source hardware address.
    pub src_mac: MacAddr,
    /// Destination hardware address (the gateway).
    pub dst_mac: MacAddr,
    /// Protocol-type tag (EtherType).
    pub ethertype: u16,
    /// Complete frame bytes, headers included.
    bytes: Vec<u8>,
}

impl Frame {
    /// Wraps pre-encoded frame bytes with their header metadata.
    pub fn new(src_mac: MacAddr, dst_mac: MacAddr, ethertype: u16, bytes: Vec<u8>) -> Self {
        Self {
            src_mac,
            dst_mac,
            ethertype,
            bytes,
        }
    }

    /// The complete wire representation of the frame.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Link-layer addressing for outbound probes: the local device and the
/// gateway the frames are handed to.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Hardware address of the local interface.
    pub src_mac: MacAddr,
    /// Hardware address of the gateway.
    pub gateway_mac: MacAddr,
    /// IPv4 address of the local interface.
    pub src_ip: Ipv4Addr,
}

/// ICMP message classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoRequest,
    EchoReply,
    TimeExceeded,
    DestUnreachable,
}

/// A decoded ICMP message.
///
/// The kind determines which fields are semantically meaningful: a
/// `TimeExceeded` carries the *responder's* address in `source` (not the
/// probe target's), and its `ident`/`seq` are recovered from the echo
/// request quoted inside the control message.
#[derive(Debug, Clone)]
pub struct IcmpMessage {
    /// Message classification.
    pub kind: IcmpKind,
    /// Echo identifier (direct for echo messages, quoted for control ones).
    pub ident: u16,
    /// Echo sequence number (direct or quoted, as above).
    pub seq: u16,
    /// TTL of the IP header carrying this message; for control messages,
    /// the TTL quoted from the embedded probe.
    pub hop_limit: u8,
    /// Source address of the outer IP header (the responding host).
    pub source: Ipv4Addr,
    /// Destination address of the outer IP header.
    pub destination: Ipv4Addr,
    /// Original probe target quoted inside a control message, if any.
    pub probe_target: Option<Ipv4Addr>,
    /// Opaque inner payload.
    pub payload: Vec<u8>,
}

/// Parameters for a single trace.
#[derive(Debug, Clone)]
pub struct TraceParams {
    /// Hop limit of the first probe.
    pub first_hop: u8,
    /// Hop limit cap; reaching it without a reply terminates the trace.
    pub max_hops: u8,
    /// Wait window for each receive step.
    pub timeout: Duration,
    /// Number of identical probes per burst.
    pub batch_size: usize,
    /// Ceiling on receive-loop iterations. The resend-on-timeout loop is
    /// otherwise unbounded, so this is what guarantees termination.
    pub max_iterations: usize,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            first_hop: 1,
            max_hops: 64,
            timeout: Duration::from_millis(5000),
            batch_size: 3,
            max_iterations: 256,
        }
    }
}

impl TraceParams {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), crate::TraceError> {
        if self.first_hop == 0 || self.first_hop > self.max_hops {
            return Err(crate::TraceError::InvalidHopRange {
                first_hop: self.first_hop,
                max_hops: self.max_hops,
            });
        }
        if self.batch_size == 0 {
            return Err(crate::TraceError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}

/// A single observed hop: the responder address and the hop limit at which
/// it was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Responder address.
    pub ip: Ipv4Addr,
    /// Hop limit at which this responder was observed.
    pub hop: u8,
}

/// Why a trace ended in `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The cancellation signal was set.
    Cancelled,
    /// The iteration ceiling was reached.
    IterationLimit,
    /// A raw send/receive failure; not retried.
    Io(String),
}

/// Terminal state of a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    /// The target itself replied.
    ReachedTarget,
    /// A destination-unreachable message ended the trace.
    Unreachable,
    /// The hop limit cap was reached without a reply.
    HopLimitExhausted,
    /// The trace was stopped externally.
    Aborted(AbortReason),
}

impl TraceOutcome {
    /// True when the target host itself responded.
    pub fn success(&self) -> bool {
        matches!(self, TraceOutcome::ReachedTarget)
    }
}

/// The result of one trace: how it terminated plus the discovered path,
/// ordered by hop limit ascending.
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub outcome: TraceOutcome,
    pub entries: Vec<RouteEntry>,
}

/// Mutable state of one in-flight trace.
///
/// Created at trace start, mutated once per received/timeout event, and
/// consumed into an ordered route list at termination.
#[derive(Debug)]
pub struct ProbeState {
    /// Current hop limit. Starts at `first_hop`, monotonically non-decreasing.
    pub hop: u8,
    /// Sequence counter; increments per newly issued probe, not per resend.
    pub seq: u16,
    /// Route map built so far, keyed by responder address.
    route: HashMap<Ipv4Addr, u8>,
}

impl ProbeState {
    pub fn new(first_hop: u8) -> Self {
        Self {
            hop: first_hop,
            seq: 1,
            route: HashMap::new(),
        }
    }

    /// Records a responder at the current hop limit. First observation wins:
    /// duplicate burst replies from the same responder leave the existing
    /// entry untouched. Returns true when the address was newly recorded.
    pub fn record(&mut self, ip: Ipv4Addr) -> bool {
        if self.route.contains_key(&ip) {
            return false;
        }
        self.route.insert(ip, self.hop);
        true
    }

    /// Advances to the next hop limit and issues a fresh sequence number.
    pub fn advance(&mut self) {
        self.hop += 1;
        self.seq += 1;
    }

    /// Number of distinct responders recorded so far.
    pub fn len(&self) -> usize {
        self.route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }

    /// Consumes the state into an ordered route, sorted by hop limit
    /// ascending (ties broken by address for determinism).
    pub fn into_entries(self) -> Vec<RouteEntry> {
        let mut entries: Vec<RouteEntry> = self
            .route
            .into_iter()
            .map(|(ip, hop)| RouteEntry { ip, hop })
            .collect();
        entries.sort_by_key(|e| (e.hop, e.ip));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validate() {
        assert!(TraceParams::default().validate().is_ok());

        let bad_range = TraceParams {
            first_hop: 65,
            max_hops: 64,
            ..Default::default()
        };
        assert!(bad_range.validate().is_err());

        let zero_first = TraceParams {
            first_hop: 0,
            ..Default::default()
        };
        assert!(zero_first.validate().is_err());

        let zero_batch = TraceParams {
            batch_size: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());
    }

    #[test]
    fn test_first_observation_wins() {
        let mut state = ProbeState::new(1);
        let hop1: Ipv4Addr = "10.0.0.1".parse().unwrap();

        assert!(state.record(hop1));
        state.advance();
        // Late duplicate from the hop-1 burst arrives after advancing.
        assert!(!state.record(hop1));

        let entries = state.into_entries();
        assert_eq!(entries, vec![RouteEntry { ip: hop1, hop: 1 }]);
    }

    #[test]
    fn test_entries_sorted_by_hop() {
        let mut state = ProbeState::new(1);
        let a: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let b: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let c: Ipv4Addr = "10.0.0.3".parse().unwrap();

        state.record(a);
        state.advance();
        state.record(b);
        state.advance();
        state.record(c);

        let hops: Vec<u8> = state.into_entries().iter().map(|e| e.hop).collect();
        assert_eq!(hops, vec![1, 2, 3]);
    }
}
