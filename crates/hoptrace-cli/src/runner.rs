//! Orchestration of one full trace: resolution, capability setup, the
//! path-discovery loop, and report assembly.

use hickory_resolver::TokioAsyncResolver;
use hoptrace_core::{HopRecord, LinkConfig, TraceError, TraceParams, TraceReport};
use hoptrace_geo::{locate_all, GeoEntry, GeoProvider, IpApiProvider, DEFAULT_PARALLELISM};
use hoptrace_net::{guess_gateway_ip, open_channel, resolve_gateway_mac, resolve_local};
use hoptrace_trace::PathTracer;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the runner needs for one trace.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target hostname or IPv4 literal.
    pub target: String,
    /// Interface to probe from.
    pub interface: String,
    /// Gateway address; guessed from the local /24 when absent.
    pub gateway: Option<Ipv4Addr>,
    /// Trace parameters.
    pub params: TraceParams,
    /// Whether to geolocate the discovered route.
    pub geolocate: bool,
    /// Startup window for gateway hardware-address discovery.
    pub arp_window: Duration,
}

/// Resolves a hostname or literal to an IPv4 address.
pub async fn resolve_target(host: &str) -> Result<Ipv4Addr, TraceError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    if host.parse::<IpAddr>().is_ok() {
        return Err(TraceError::Resolution {
            what: "target address",
            reason: "only IPv4 targets are supported".to_string(),
        });
    }

    let resolver =
        TokioAsyncResolver::tokio_from_system_conf().map_err(|e| TraceError::Resolution {
            what: "DNS resolver",
            reason: e.to_string(),
        })?;

    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| TraceError::Resolution {
            what: "target address",
            reason: format!("failed to resolve '{}': {}", host, e),
        })?;

    lookup
        .iter()
        .find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| TraceError::Resolution {
            what: "target address",
            reason: format!("no IPv4 address found for '{}'", host),
        })
}

/// Annotates hop records with locations, re-associating by address.
fn attach_locations(hops: &mut [HopRecord], entries: &[GeoEntry]) {
    for hop in hops.iter_mut() {
        if let Some(entry) = entries.iter().find(|e| e.ip == hop.ip_address) {
            hop.location = Some(entry.label());
        }
    }
}

/// Runs one trace end to end and assembles the report.
pub async fn run_trace(
    opts: RunOptions,
    cancel: CancellationToken,
) -> Result<TraceReport, TraceError> {
    let target_ip = resolve_target(&opts.target).await?;
    debug!(target = %opts.target, ip = %target_ip, "Resolved target");

    let (iface, local) = resolve_local(&opts.interface)?;
    let (mut sink, mut source) = open_channel(&iface)?;

    let gateway_ip = match opts.gateway {
        Some(ip) => ip,
        None => {
            let guessed = guess_gateway_ip(local.ip);
            warn!(gateway = %guessed, "No gateway given, guessing the local .1 host");
            guessed
        }
    };
    let gateway_mac = resolve_gateway_mac(
        &mut sink,
        &mut source,
        local.mac,
        local.ip,
        gateway_ip,
        opts.arp_window,
    )?;

    let link = LinkConfig {
        src_mac: local.mac,
        gateway_mac,
        src_ip: local.ip,
    };

    info!(target = %target_ip, interface = %opts.interface, "Starting trace");
    let run = PathTracer::new(
        link,
        target_ip,
        opts.params.clone(),
        &mut sink,
        &mut source,
        cancel,
    )
    .run()
    .await?;

    let mut hops: Vec<HopRecord> = run.entries.iter().copied().map(HopRecord::from).collect();

    if opts.geolocate && !hops.is_empty() {
        let provider: Arc<dyn GeoProvider> = Arc::new(IpApiProvider::new());
        let addrs: Vec<Ipv4Addr> = run.entries.iter().map(|e| e.ip).collect();
        let entries = locate_all(provider, &addrs, DEFAULT_PARALLELISM).await;
        attach_locations(&mut hops, &entries);
    }

    Ok(TraceReport {
        run_id: Uuid::new_v4().to_string(),
        target: opts.target,
        target_ip,
        interface: opts.interface,
        outcome: run.outcome,
        hops,
    })
}
