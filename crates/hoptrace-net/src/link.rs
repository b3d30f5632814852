//! Local interface resolution.

use hoptrace_core::TraceError;
use pnet_base::MacAddr;
use pnet_datalink::NetworkInterface;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// The local device's addressing.
#[derive(Debug, Clone, Copy)]
pub struct LocalLink {
    /// Hardware address of the interface.
    pub mac: MacAddr,
    /// First IPv4 address assigned to the interface.
    pub ip: Ipv4Addr,
}

/// Looks up the named interface and its hardware/IPv4 addresses.
pub fn resolve_local(name: &str) -> Result<(NetworkInterface, LocalLink), TraceError> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| TraceError::NoSuchInterface(name.to_string()))?;

    let mac = iface.mac.ok_or_else(|| TraceError::Resolution {
        what: "local hardware address",
        reason: format!("interface {} has no MAC", name),
    })?;

    let ip = iface
        .ips
        .iter()
        .find_map(|net| match net.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| TraceError::Resolution {
            what: "local IPv4 address",
            reason: format!("interface {} has no IPv4 address", name),
        })?;

    debug!(interface = name, mac = %mac, ip = %ip, "Resolved local device");
    Ok((iface, LocalLink { mac, ip }))
}

/// Guesses the gateway address as the .1 host of the local /24.
///
/// Used only when the caller does not supply a gateway explicitly; wrong on
/// networks with a different gateway convention, in which case the ARP
/// resolution window expires and the trace refuses to start.
pub fn guess_gateway_ip(local: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = local.octets();
    Ipv4Addr::new(a, b, c, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_gateway_ip() {
        let local: Ipv4Addr = "192.168.7.34".parse().unwrap();
        assert_eq!(guess_gateway_ip(local), "192.168.7.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_resolve_unknown_interface() {
        let err = resolve_local("definitely-not-a-device0").unwrap_err();
        assert!(matches!(err, TraceError::NoSuchInterface(_)));
    }
}
