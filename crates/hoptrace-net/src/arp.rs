//! ARP-based gateway hardware-address discovery.

use crate::channel::{DatalinkSink, DatalinkSource};
use hoptrace_core::TraceError;
use pnet_base::MacAddr;
use pnet_packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet_packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet_packet::Packet;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const ETH_HEADER_LEN: usize = 14;
const ARP_LEN: usize = 28;

/// Broadcasts an ARP request for `gateway_ip` and waits for the matching
/// reply within the startup window. Failure here is fatal: without the
/// gateway's hardware address no probe can be framed.
pub fn resolve_gateway_mac(
    sink: &mut DatalinkSink,
    source: &mut DatalinkSource,
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
    window: Duration,
) -> Result<MacAddr, TraceError> {
    let request = build_arp_request(local_mac, local_ip, gateway_ip)?;

    match sink.tx.send_to(&request, None) {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(TraceError::SendFailed(e)),
        None => {
            return Err(TraceError::Internal(
                "datalink sender refused the ARP request".to_string(),
            ))
        }
    }

    let deadline = Instant::now() + window;
    loop {
        match source.rx.next() {
            Ok(bytes) => {
                if let Some(mac) = match_arp_reply(bytes, gateway_ip) {
                    debug!(gateway = %gateway_ip, mac = %mac, "Resolved gateway hardware address");
                    return Ok(mac);
                }
                trace!("Frame is not the awaited ARP reply");
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(TraceError::ReceiveFailed(e)),
        }

        if Instant::now() >= deadline {
            return Err(TraceError::Resolution {
                what: "gateway hardware address",
                reason: format!("no ARP reply from {} within {:?}", gateway_ip, window),
            });
        }
    }
}

fn build_arp_request(
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
) -> Result<Vec<u8>, TraceError> {
    let mut buffer = vec![0u8; ETH_HEADER_LEN + ARP_LEN];

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer)
            .ok_or_else(|| TraceError::Internal("Failed to create Ethernet frame".to_string()))?;
        eth.set_destination(MacAddr::broadcast());
        eth.set_source(local_mac);
        eth.set_ethertype(EtherTypes::Arp);
    }

    {
        let mut arp = MutableArpPacket::new(&mut buffer[ETH_HEADER_LEN..])
            .ok_or_else(|| TraceError::Internal("Failed to create ARP packet".to_string()))?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Request);
        arp.set_sender_hw_addr(local_mac);
        arp.set_sender_proto_addr(local_ip);
        arp.set_target_hw_addr(MacAddr::zero());
        arp.set_target_proto_addr(gateway_ip);
    }

    Ok(buffer)
}

/// Returns the sender hardware address when the frame is an ARP reply from
/// the awaited gateway.
fn match_arp_reply(bytes: &[u8], gateway_ip: Ipv4Addr) -> Option<MacAddr> {
    let eth = EthernetPacket::new(bytes)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    if arp.get_sender_proto_addr() != gateway_ip {
        return None;
    }
    Some(arp.get_sender_hw_addr())
}
