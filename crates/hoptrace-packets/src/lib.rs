//! Packet construction and parsing for hoptrace.
//!
//! The codec builds the two-layer probe frame (Ethernet II wrapping an
//! IPv4/ICMP echo request) and parses captured response frames back into
//! [`hoptrace_core::IcmpMessage`] values.

pub mod codec;
pub mod parser;

pub use codec::{encode_probe, PROBE_PAYLOAD};
pub use parser::decode;
