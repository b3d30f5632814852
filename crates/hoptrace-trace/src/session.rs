//! Probe burst transmission.

use hoptrace_core::{Frame, FrameSink, TraceError};
use tracing::trace;

/// Default number of identical probes per burst.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Stateless helper that transmits one probe burst.
///
/// A single probe is frequently lost in transit; a small burst of identical
/// frames raises the odds that at least one reaches the hop and triggers a
/// control message. Duplicate replies produced by the burst are collapsed by
/// the route map's first-observation rule.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSession {
    count: usize,
}

impl Default for ProbeSession {
    fn default() -> Self {
        Self {
            count: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ProbeSession {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Transmits the same encoded frame `count` times in immediate
    /// succession.
    pub async fn send_batch(
        &self,
        sink: &mut dyn FrameSink,
        frame: &Frame,
    ) -> Result<(), TraceError> {
        for attempt in 0..self.count {
            trace!(attempt, len = frame.len(), "Sending probe frame");
            sink.send_frame(frame).await?;
        }
        Ok(())
    }
}
