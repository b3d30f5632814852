//! Frame sink/source over a pnet datalink channel.

use async_trait::async_trait;
use hoptrace_core::{FilterSpec, Frame, FrameSink, FrameSource, TraceError};
use pnet_datalink::{Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;
use std::time::{Duration, Instant};
use tracing::trace;

/// Poll granularity of the underlying blocking read.
const READ_POLL: Duration = Duration::from_millis(100);

/// Frame injection over a datalink channel.
pub struct DatalinkSink {
    pub(crate) tx: Box<dyn DataLinkSender>,
}

/// Frame capture over a datalink channel, with a software filter for "ICMP
/// destined for this host".
pub struct DatalinkSource {
    pub(crate) rx: Box<dyn DataLinkReceiver>,
    filter: Option<FilterSpec>,
}

/// Opens an Ethernet channel on the interface and splits it into the two
/// capability handles.
pub fn open_channel(iface: &NetworkInterface) -> Result<(DatalinkSink, DatalinkSource), TraceError> {
    let config = pnet_datalink::Config {
        read_timeout: Some(READ_POLL),
        ..Default::default()
    };

    match pnet_datalink::channel(iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => Ok((
            DatalinkSink { tx },
            DatalinkSource { rx, filter: None },
        )),
        Ok(_) => Err(TraceError::Internal(
            "datalink channel is not Ethernet".to_string(),
        )),
        Err(e) => Err(TraceError::ChannelCreation(e)),
    }
}

#[async_trait]
impl FrameSink for DatalinkSink {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TraceError> {
        match self.tx.send_to(frame.bytes(), None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(TraceError::SendFailed(e)),
            None => Err(TraceError::Internal(
                "datalink sender refused the frame".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FrameSource for DatalinkSource {
    fn set_filter(&mut self, spec: FilterSpec) -> Result<(), TraceError> {
        self.filter = Some(spec);
        Ok(())
    }

    async fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TraceError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.next() {
                Ok(bytes) => {
                    if passes_filter(bytes, self.filter.as_ref()) {
                        return Ok(Some(bytes.to_vec()));
                    }
                    trace!(len = bytes.len(), "Dropping frame outside capture filter");
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(TraceError::ReceiveFailed(e)),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}

/// Software capture filter: IPv4 ICMP addressed to the local host. With no
/// filter installed every frame passes.
fn passes_filter(bytes: &[u8], filter: Option<&FilterSpec>) -> bool {
    let Some(spec) = filter else {
        return true;
    };
    let Some(eth) = EthernetPacket::new(bytes) else {
        return false;
    };
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return false;
    }
    let Some(ip) = Ipv4Packet::new(eth.payload()) else {
        return false;
    };
    ip.get_next_level_protocol() == IpNextHeaderProtocols::Icmp
        && ip.get_destination() == spec.local_ip
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_base::MacAddr;
    use std::net::Ipv4Addr;

    fn icmp_frame(src: &str, dst: &str) -> Vec<u8> {
        hoptrace_packets::encode_probe(
            MacAddr(0x02, 0, 0, 0, 0, 1),
            MacAddr(0x02, 0, 0, 0, 0, 2),
            src.parse().unwrap(),
            dst.parse().unwrap(),
            4,
            1,
            1,
        )
        .unwrap()
        .bytes()
        .to_vec()
    }

    #[test]
    fn test_filter_accepts_icmp_to_local_host() {
        let local: Ipv4Addr = "192.168.1.10".parse().unwrap();
        let spec = FilterSpec { local_ip: local };

        let inbound = icmp_frame("10.0.0.1", "192.168.1.10");
        assert!(passes_filter(&inbound, Some(&spec)));

        let outbound = icmp_frame("192.168.1.10", "8.8.8.8");
        assert!(!passes_filter(&outbound, Some(&spec)));
    }

    #[test]
    fn test_filter_rejects_noise() {
        let spec = FilterSpec {
            local_ip: "192.168.1.10".parse().unwrap(),
        };
        assert!(!passes_filter(&[0xde, 0xad], Some(&spec)));

        // No filter installed: everything passes.
        assert!(passes_filter(&[0xde, 0xad], None));
    }
}
