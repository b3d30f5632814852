//! Core types, traits, and error handling for hoptrace.
//!
//! This crate provides the fundamental abstractions used throughout the
//! path-discovery implementation:
//!
//! - [`FrameSink`] and [`FrameSource`] capability traits for raw frame I/O
//! - [`IcmpMessage`], [`ProbeState`] and other core types
//! - [`TraceError`] for error handling
//! - Report types for trace output

pub mod error;
pub mod report;
pub mod traits;
pub mod types;

pub use error::{TraceError, TraceResult};
pub use report::{HopRecord, TraceReport};
pub use traits::{FilterSpec, FrameSink, FrameSource};
pub use types::{
    AbortReason, Frame, IcmpKind, IcmpMessage, LinkConfig, ProbeState, RouteEntry, TraceOutcome,
    TraceParams, TraceRun,
};
