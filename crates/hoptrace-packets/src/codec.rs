//! Probe frame construction using pnet.

use hoptrace_core::{Frame, TraceError};
use pnet_base::MacAddr;
use pnet_packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{Ipv4Flags, MutableIpv4Packet};
use std::net::Ipv4Addr;

/// Fixed echo payload carried by every probe.
pub const PROBE_PAYLOAD: [u8; 8] = *b"hoptrace";

const ETH_HEADER_LEN: usize = 14;
const IP_HEADER_LEN: usize = 20;
const ICMP_HEADER_LEN: usize = 8;

/// Builds a link-layer frame wrapping an ICMP echo request probe.
///
/// The IP time-to-live carries the hop limit, the echo identifier scopes the
/// probe to one trace, and the sequence number identifies the probe within
/// it. Deterministic given its inputs; no side effects.
pub fn encode_probe(
    src_mac: MacAddr,
    gateway_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    hop_limit: u8,
    ident: u16,
    seq: u16,
) -> Result<Frame, TraceError> {
    let icmp_len = ICMP_HEADER_LEN + PROBE_PAYLOAD.len();
    let ip_len = IP_HEADER_LEN + icmp_len;
    let frame_len = ETH_HEADER_LEN + ip_len;

    let mut buffer = vec![0u8; frame_len];

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer)
            .ok_or_else(|| TraceError::Internal("Failed to create Ethernet frame".to_string()))?;
        eth.set_destination(gateway_mac);
        eth.set_source(src_mac);
        eth.set_ethertype(EtherTypes::Ipv4);
    }

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer[ETH_HEADER_LEN..])
            .ok_or_else(|| TraceError::Internal("Failed to create IP packet".to_string()))?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(ip_len as u16);
        ip.set_identification(ident);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_ttl(hop_limit);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(src_ip);
        ip.set_destination(dst_ip);

        let ip_checksum = pnet_packet::ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(ip_checksum);
    }

    let icmp_start = ETH_HEADER_LEN + IP_HEADER_LEN;
    {
        let mut icmp = MutableEchoRequestPacket::new(&mut buffer[icmp_start..])
            .ok_or_else(|| TraceError::Internal("Failed to create ICMP packet".to_string()))?;
        icmp.set_icmp_type(IcmpTypes::EchoRequest);
        icmp.set_icmp_code(IcmpCode::new(0));
        icmp.set_identifier(ident);
        icmp.set_sequence_number(seq);
        icmp.set_payload(&PROBE_PAYLOAD);
    }

    // Checksum over the finished ICMP message, written back by hand since
    // the mutable view is gone.
    {
        let icmp_view = IcmpPacket::new(&buffer[icmp_start..])
            .ok_or_else(|| TraceError::Internal("Failed to create ICMP view".to_string()))?;
        let icmp_checksum = pnet_packet::icmp::checksum(&icmp_view);
        buffer[icmp_start + 2] = (icmp_checksum >> 8) as u8;
        buffer[icmp_start + 3] = (icmp_checksum & 0xff) as u8;
    }

    Ok(Frame::new(src_mac, gateway_mac, EtherTypes::Ipv4.0, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(hop_limit: u8, ident: u16, seq: u16) -> Frame {
        encode_probe(
            MacAddr::new(0x02, 0, 0, 0, 0, 1),
            MacAddr::new(0x02, 0, 0, 0, 0, 2),
            "192.168.1.10".parse().unwrap(),
            "8.8.8.8".parse().unwrap(),
            hop_limit,
            ident,
            seq,
        )
        .unwrap()
    }

    #[test]
    fn test_encode_probe_layout() {
        let frame = test_frame(5, 0xABCD, 7);
        let bytes = frame.bytes();

        // 14 Ethernet + 20 IP + 8 ICMP header + 8 payload
        assert_eq!(bytes.len(), 50);

        // EtherType IPv4
        assert_eq!(&bytes[12..14], &[0x08, 0x00]);

        // IP version, TTL, protocol (ICMP = 1)
        assert_eq!(bytes[14] >> 4, 4);
        assert_eq!(bytes[22], 5);
        assert_eq!(bytes[23], 1);

        // ICMP type 8 (echo request), code 0
        assert_eq!(bytes[34], 8);
        assert_eq!(bytes[35], 0);
    }

    #[test]
    fn test_encode_probe_ident_and_seq() {
        let frame = test_frame(10, 0x1234, 42);
        let bytes = frame.bytes();

        let ident = u16::from_be_bytes([bytes[38], bytes[39]]);
        let seq = u16::from_be_bytes([bytes[40], bytes[41]]);
        assert_eq!(ident, 0x1234);
        assert_eq!(seq, 42);

        // Fixed payload rides at the tail of the frame.
        assert_eq!(&bytes[42..], &PROBE_PAYLOAD);
    }

    #[test]
    fn test_encode_probe_deterministic() {
        let a = test_frame(3, 9, 9);
        let b = test_frame(3, 9, 9);
        assert_eq!(a.bytes(), b.bytes());
    }
}
