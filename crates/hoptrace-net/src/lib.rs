//! Concrete capability implementations for hoptrace.
//!
//! Resolves the local device and gateway, and implements the frame sink and
//! source over a pnet datalink channel. The core borrows these handles; this
//! crate owns their lifecycle.

pub mod arp;
pub mod channel;
pub mod link;

pub use arp::resolve_gateway_mac;
pub use channel::{open_channel, DatalinkSink, DatalinkSource};
pub use link::{guess_gateway_ip, resolve_local, LocalLink};
