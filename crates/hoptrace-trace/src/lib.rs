//! The hop-probing state machine for hoptrace.
//!
//! [`ProbeSession`] transmits probe bursts; [`PathTracer`] drives the
//! hop-by-hop loop of send, wait-with-timeout, decode, transition.

pub mod session;
pub mod tracer;

pub use session::ProbeSession;
pub use tracer::PathTracer;
