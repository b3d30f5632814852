//! Response frame parsing using pnet.

use hoptrace_core::{IcmpKind, IcmpMessage, TraceError};
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::icmp::destination_unreachable::DestinationUnreachablePacket;
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::EchoRequestPacket;
use pnet_packet::icmp::time_exceeded::TimeExceededPacket;
use pnet_packet::icmp::{IcmpPacket, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;
use tracing::trace;

/// Parses a captured link-layer frame into an [`IcmpMessage`].
///
/// Fails with a retryable error for anything that should be ignored by the
/// receive loop: truncated or malformed input, non-ICMP traffic, and ICMP
/// types outside {echo request, echo reply, time exceeded, destination
/// unreachable}.
pub fn decode(bytes: &[u8]) -> Result<IcmpMessage, TraceError> {
    let eth = EthernetPacket::new(bytes).ok_or(TraceError::PacketTooShort {
        expected: 14,
        actual: bytes.len(),
    })?;

    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return Err(TraceError::PacketMismatch);
    }

    let ip = Ipv4Packet::new(eth.payload())
        .ok_or_else(|| TraceError::MalformedPacket("Truncated IP header".to_string()))?;

    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return Err(TraceError::PacketMismatch);
    }

    let icmp = IcmpPacket::new(ip.payload())
        .ok_or_else(|| TraceError::MalformedPacket("Truncated ICMP header".to_string()))?;

    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let reply = EchoReplyPacket::new(ip.payload())
                .ok_or_else(|| TraceError::MalformedPacket("Truncated echo reply".to_string()))?;
            Ok(IcmpMessage {
                kind: IcmpKind::EchoReply,
                ident: reply.get_identifier(),
                seq: reply.get_sequence_number(),
                hop_limit: ip.get_ttl(),
                source: ip.get_source(),
                destination: ip.get_destination(),
                probe_target: None,
                payload: reply.payload().to_vec(),
            })
        }
        IcmpTypes::EchoRequest => {
            let request = EchoRequestPacket::new(ip.payload())
                .ok_or_else(|| TraceError::MalformedPacket("Truncated echo request".to_string()))?;
            Ok(IcmpMessage {
                kind: IcmpKind::EchoRequest,
                ident: request.get_identifier(),
                seq: request.get_sequence_number(),
                hop_limit: ip.get_ttl(),
                source: ip.get_source(),
                destination: ip.get_destination(),
                probe_target: None,
                payload: request.payload().to_vec(),
            })
        }
        IcmpTypes::TimeExceeded => {
            let exceeded = TimeExceededPacket::new(ip.payload())
                .ok_or_else(|| TraceError::MalformedPacket("Truncated time exceeded".to_string()))?;
            decode_control(IcmpKind::TimeExceeded, &ip, exceeded.payload())
        }
        IcmpTypes::DestinationUnreachable => {
            let unreachable = DestinationUnreachablePacket::new(ip.payload()).ok_or_else(|| {
                TraceError::MalformedPacket("Truncated destination unreachable".to_string())
            })?;
            decode_control(IcmpKind::DestUnreachable, &ip, unreachable.payload())
        }
        other => {
            trace!(icmp_type = other.0, "Skipping unsupported ICMP type");
            Err(TraceError::UnsupportedPacket(other.0))
        }
    }
}

/// Decodes a control message by digging the original echo request out of the
/// quoted IP datagram. The responder's address is the outer source; the
/// probe identifiers come from the quoted packet.
fn decode_control(
    kind: IcmpKind,
    outer: &Ipv4Packet<'_>,
    quoted: &[u8],
) -> Result<IcmpMessage, TraceError> {
    let inner_ip = Ipv4Packet::new(quoted)
        .ok_or_else(|| TraceError::MalformedPacket("Truncated quoted IP header".to_string()))?;

    // The quoted packet must be one of our ICMP probes.
    if inner_ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return Err(TraceError::PacketMismatch);
    }

    let inner_icmp = IcmpPacket::new(inner_ip.payload())
        .ok_or_else(|| TraceError::MalformedPacket("Truncated quoted ICMP header".to_string()))?;
    if inner_icmp.get_icmp_type() != IcmpTypes::EchoRequest {
        return Err(TraceError::PacketMismatch);
    }

    let echo = EchoRequestPacket::new(inner_ip.payload())
        .ok_or_else(|| TraceError::MalformedPacket("Truncated quoted echo request".to_string()))?;

    Ok(IcmpMessage {
        kind,
        ident: echo.get_identifier(),
        seq: echo.get_sequence_number(),
        hop_limit: inner_ip.get_ttl(),
        source: outer.get_source(),
        destination: outer.get_destination(),
        probe_target: Some(inner_ip.get_destination()),
        payload: echo.payload().to_vec(),
    })
}
