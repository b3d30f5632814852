//! Capability traits for raw frame I/O.
//!
//! The path tracer never owns the capture/injection handle; it borrows
//! implementations of these traits for the duration of one trace.

use crate::{Frame, TraceError};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Capture filter: ICMP traffic destined for this host.
///
/// Demultiplexing between concurrent traces is the caller's responsibility;
/// each trace must be given a source scoped to one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    /// Local address responses are addressed to.
    pub local_ip: Ipv4Addr,
}

/// Trait for raw frame injection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one encoded frame to the wire.
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TraceError>;
}

/// Trait for raw frame capture.
#[async_trait]
pub trait FrameSource: Send {
    /// Installs the capture filter for subsequent reads.
    fn set_filter(&mut self, spec: FilterSpec) -> Result<(), TraceError>;

    /// Reads the next frame matching the filter.
    ///
    /// Returns `Ok(None)` if nothing arrived within the wait window.
    /// Returns `Err` only for fatal capture failures.
    async fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TraceError>;
}
