//! The hop-by-hop path-discovery state machine.

use crate::session::ProbeSession;
use hoptrace_core::{
    AbortReason, FilterSpec, Frame, FrameSink, FrameSource, IcmpKind, IcmpMessage, LinkConfig,
    ProbeState, TraceError, TraceOutcome, TraceParams, TraceRun,
};
use hoptrace_packets::{decode, encode_probe};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Global echo identifier counter so concurrent traces demultiplex cleanly.
static IDENT_COUNTER: AtomicU16 = AtomicU16::new(1);

/// Gets the next unique echo identifier.
fn next_ident() -> u16 {
    IDENT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Drives one trace against one target.
///
/// The tracer borrows the send/receive capabilities for the duration of the
/// trace; it never owns the handle lifecycle. Exactly one probe batch is
/// outstanding at any time: the next batch is only sent after the current
/// receive step resolves, so responses cannot be misattributed between hops.
pub struct PathTracer<'a> {
    link: LinkConfig,
    target_ip: Ipv4Addr,
    ident: u16,
    params: TraceParams,
    session: ProbeSession,
    sink: &'a mut dyn FrameSink,
    source: &'a mut dyn FrameSource,
    cancel: CancellationToken,
}

impl<'a> PathTracer<'a> {
    pub fn new(
        link: LinkConfig,
        target_ip: Ipv4Addr,
        params: TraceParams,
        sink: &'a mut dyn FrameSink,
        source: &'a mut dyn FrameSource,
        cancel: CancellationToken,
    ) -> Self {
        let session = ProbeSession::new(params.batch_size);
        Self {
            link,
            target_ip,
            ident: next_ident(),
            params,
            session,
            sink,
            source,
            cancel,
        }
    }

    /// Overrides the echo identifier for this trace.
    pub fn with_ident(mut self, ident: u16) -> Self {
        self.ident = ident;
        self
    }

    pub fn ident(&self) -> u16 {
        self.ident
    }

    /// Runs the trace to a terminal state.
    ///
    /// IO failures and the iteration/cancellation caps terminate as
    /// `Aborted` with the route recorded so far; `Err` is reserved for
    /// setup problems that prevent the trace from starting.
    pub async fn run(self) -> Result<TraceRun, TraceError> {
        let Self {
            link,
            target_ip,
            ident,
            params,
            session,
            sink,
            source,
            cancel,
        } = self;

        params.validate()?;
        source.set_filter(FilterSpec {
            local_ip: link.src_ip,
        })?;

        let mut state = ProbeState::new(params.first_hop);
        let encode = |state: &ProbeState| -> Result<Frame, TraceError> {
            encode_probe(
                link.src_mac,
                link.gateway_mac,
                link.src_ip,
                target_ip,
                state.hop,
                ident,
                state.seq,
            )
        };

        debug!(target = %target_ip, ident, hop = state.hop, "Starting trace");

        let mut frame = encode(&state)?;
        if let Err(e) = session.send_batch(sink, &frame).await {
            warn!(error = %e, "Probe send failed");
            return Ok(aborted(state, AbortReason::Io(e.to_string())));
        }

        let mut iterations = 0usize;
        loop {
            if cancel.is_cancelled() {
                debug!("Cancellation signal set, aborting trace");
                return Ok(aborted(state, AbortReason::Cancelled));
            }

            iterations += 1;
            if iterations > params.max_iterations {
                warn!(iterations, "Iteration ceiling reached, aborting trace");
                return Ok(aborted(state, AbortReason::IterationLimit));
            }

            let received = match source.recv_frame(params.timeout).await {
                Ok(r) => r,
                Err(e) if e.is_retryable() => {
                    trace!(error = %e, "Retryable receive error, continuing");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Capture failed");
                    return Ok(aborted(state, AbortReason::Io(e.to_string())));
                }
            };

            let Some(bytes) = received else {
                // Best-effort recovery from packet loss: same hop, same
                // frame, fresh burst.
                trace!(hop = state.hop, "Receive timeout, resending probe batch");
                if let Err(e) = session.send_batch(sink, &frame).await {
                    warn!(error = %e, "Probe resend failed");
                    return Ok(aborted(state, AbortReason::Io(e.to_string())));
                }
                continue;
            };

            let msg = match decode(&bytes) {
                Ok(msg) => msg,
                Err(e) => {
                    // Capture noise, never fatal.
                    trace!(error = %e, "Ignoring undecodable packet");
                    continue;
                }
            };

            if !matches_trace(&msg, ident, target_ip) {
                trace!(ident = msg.ident, "Ignoring packet from another conversation");
                continue;
            }

            match msg.kind {
                IcmpKind::TimeExceeded => {
                    let fresh = state.record(msg.source);
                    debug!(
                        hop = state.hop,
                        responder = %msg.source,
                        fresh,
                        "Hop reported itself"
                    );

                    if state.hop >= params.max_hops {
                        debug!(max_hops = params.max_hops, "Hop limit cap reached");
                        return Ok(TraceRun {
                            outcome: TraceOutcome::HopLimitExhausted,
                            entries: state.into_entries(),
                        });
                    }

                    state.advance();
                    frame = encode(&state)?;
                    if let Err(e) = session.send_batch(sink, &frame).await {
                        warn!(error = %e, "Probe send failed");
                        return Ok(aborted(state, AbortReason::Io(e.to_string())));
                    }
                }
                IcmpKind::DestUnreachable => {
                    state.record(msg.source);
                    debug!(hop = state.hop, responder = %msg.source, "Destination unreachable");
                    return Ok(TraceRun {
                        outcome: TraceOutcome::Unreachable,
                        entries: state.into_entries(),
                    });
                }
                IcmpKind::EchoReply => {
                    state.record(msg.source);
                    debug!(hop = state.hop, responder = %msg.source, "Target replied");
                    return Ok(TraceRun {
                        outcome: TraceOutcome::ReachedTarget,
                        entries: state.into_entries(),
                    });
                }
                IcmpKind::EchoRequest => {
                    // Someone else's outbound probe; not a response.
                    trace!("Ignoring captured echo request");
                }
            }
        }
    }
}

fn aborted(state: ProbeState, reason: AbortReason) -> TraceRun {
    TraceRun {
        outcome: TraceOutcome::Aborted(reason),
        entries: state.into_entries(),
    }
}

/// True when the message belongs to this trace: control messages must quote
/// a probe carrying our identifier and target, and an echo reply must come
/// from the target with our identifier.
fn matches_trace(msg: &IcmpMessage, ident: u16, target_ip: Ipv4Addr) -> bool {
    match msg.kind {
        IcmpKind::TimeExceeded | IcmpKind::DestUnreachable => {
            msg.ident == ident && msg.probe_target == Some(target_ip)
        }
        IcmpKind::EchoReply => msg.ident == ident && msg.source == target_ip,
        IcmpKind::EchoRequest => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_uniqueness() {
        let a = next_ident();
        let b = next_ident();
        let c = next_ident();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    fn message(kind: IcmpKind, ident: u16, source: &str, probe_target: Option<&str>) -> IcmpMessage {
        IcmpMessage {
            kind,
            ident,
            seq: 1,
            hop_limit: 1,
            source: source.parse().unwrap(),
            destination: "192.168.1.10".parse().unwrap(),
            probe_target: probe_target.map(|t| t.parse().unwrap()),
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_matches_trace() {
        let target: Ipv4Addr = "8.8.8.8".parse().unwrap();

        let exceeded = message(IcmpKind::TimeExceeded, 7, "10.0.0.1", Some("8.8.8.8"));
        assert!(matches_trace(&exceeded, 7, target));
        // Wrong identifier.
        assert!(!matches_trace(&exceeded, 8, target));

        // Control message quoting a probe for somebody else's target.
        let foreign = message(IcmpKind::TimeExceeded, 7, "10.0.0.1", Some("1.1.1.1"));
        assert!(!matches_trace(&foreign, 7, target));

        let reply = message(IcmpKind::EchoReply, 7, "8.8.8.8", None);
        assert!(matches_trace(&reply, 7, target));

        // Echo reply from a host that is not the target.
        let stranger = message(IcmpKind::EchoReply, 7, "9.9.9.9", None);
        assert!(!matches_trace(&stranger, 7, target));

        // Outbound probes are never responses.
        let request = message(IcmpKind::EchoRequest, 7, "192.168.1.10", None);
        assert!(!matches_trace(&request, 7, target));
    }
}
