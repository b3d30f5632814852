//! Geolocation lookup stage for hoptrace.
//!
//! Invoked once after trace completion: fans lookups out with bounded
//! parallelism and fans results back in. Individual lookup failures degrade
//! to an "unknown" placeholder rather than failing the batch; result
//! ordering need not match input ordering, callers re-associate by address.

use async_trait::async_trait;
use hoptrace_core::TraceError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Placeholder for fields a lookup could not resolve.
pub const UNKNOWN: &str = "unknown";

/// Default number of lookups in flight at once.
pub const DEFAULT_PARALLELISM: usize = 8;

/// Location of one responder address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoEntry {
    pub ip: Ipv4Addr,
    pub country: String,
    pub city: String,
}

impl GeoEntry {
    /// The degraded entry used when a lookup fails.
    pub fn unknown(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            country: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
        }
    }

    /// Human-readable "City, Country" string.
    pub fn label(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

/// External lookup service returning a location for an address.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn locate(&self, ip: Ipv4Addr) -> Result<GeoEntry, TraceError>;
}

/// Provider backed by the ip-api.com JSON endpoint.
pub struct IpApiProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

impl IpApiProvider {
    pub fn new() -> Self {
        Self::with_base_url("http://ip-api.com")
    }

    /// Points the provider at a different endpoint (used by tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for IpApiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn locate(&self, ip: Ipv4Addr) -> Result<GeoEntry, TraceError> {
        let url = format!("{}/json/{}?fields=status,country,city", self.base_url, ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraceError::Resolution {
                what: "geolocation",
                reason: e.to_string(),
            })?;

        let body: IpApiResponse =
            response.json().await.map_err(|e| TraceError::Resolution {
                what: "geolocation",
                reason: e.to_string(),
            })?;

        if body.status != "success" {
            return Err(TraceError::Resolution {
                what: "geolocation",
                reason: format!("lookup for {} returned status {}", ip, body.status),
            });
        }

        Ok(GeoEntry {
            ip,
            country: if body.country.is_empty() {
                UNKNOWN.to_string()
            } else {
                body.country
            },
            city: if body.city.is_empty() {
                UNKNOWN.to_string()
            } else {
                body.city
            },
        })
    }
}

/// Looks up every distinct address with at most `parallelism` lookups in
/// flight. Per-address failures become [`GeoEntry::unknown`] entries.
pub async fn locate_all(
    provider: Arc<dyn GeoProvider>,
    addrs: &[Ipv4Addr],
    parallelism: usize,
) -> Vec<GeoEntry> {
    let mut distinct: Vec<Ipv4Addr> = Vec::new();
    for &ip in addrs {
        if !distinct.contains(&ip) {
            distinct.push(ip);
        }
    }

    debug!(
        addresses = distinct.len(),
        parallelism, "Starting geolocation fan-out"
    );

    let mut queue = distinct.into_iter();
    let mut set: JoinSet<GeoEntry> = JoinSet::new();
    let mut entries = Vec::new();

    loop {
        while set.len() < parallelism.max(1) {
            let Some(ip) = queue.next() else { break };
            let provider = Arc::clone(&provider);
            set.spawn(async move {
                match provider.locate(ip).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(ip = %ip, error = %e, "Geolocation lookup failed");
                        GeoEntry::unknown(ip)
                    }
                }
            });
        }

        match set.join_next().await {
            Some(Ok(entry)) => entries.push(entry),
            Some(Err(e)) => warn!(error = %e, "Geolocation task failed"),
            None => break,
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapProvider {
        known: HashMap<Ipv4Addr, (&'static str, &'static str)>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl GeoProvider for MapProvider {
        async fn locate(&self, ip: Ipv4Addr) -> Result<GeoEntry, TraceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            match self.known.get(&ip) {
                Some((country, city)) => Ok(GeoEntry {
                    ip,
                    country: country.to_string(),
                    city: city.to_string(),
                }),
                None => Err(TraceError::Resolution {
                    what: "geolocation",
                    reason: "not in fixture".to_string(),
                }),
            }
        }
    }

    fn fixture() -> Arc<MapProvider> {
        let mut known = HashMap::new();
        known.insert("8.8.8.8".parse().unwrap(), ("United States", "Mountain View"));
        known.insert("1.1.1.1".parse().unwrap(), ("Australia", "Sydney"));
        Arc::new(MapProvider {
            known,
            lookups: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_locate_all_degrades_to_unknown() {
        let provider = fixture();
        let addrs: Vec<Ipv4Addr> = vec![
            "8.8.8.8".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
            "1.1.1.1".parse().unwrap(),
        ];

        let mut entries = locate_all(provider, &addrs, 2).await;
        entries.sort_by_key(|e| e.ip);

        assert_eq!(entries.len(), 3);
        let private: &GeoEntry = entries
            .iter()
            .find(|e| e.ip == "10.0.0.1".parse::<Ipv4Addr>().unwrap())
            .unwrap();
        assert_eq!(private.country, UNKNOWN);
        assert_eq!(private.city, UNKNOWN);

        let dns = entries
            .iter()
            .find(|e| e.ip == "8.8.8.8".parse::<Ipv4Addr>().unwrap())
            .unwrap();
        assert_eq!(dns.label(), "Mountain View, United States");
    }

    #[tokio::test]
    async fn test_locate_all_deduplicates_addresses() {
        let provider = fixture();
        let ip: Ipv4Addr = "8.8.8.8".parse().unwrap();

        let entries = locate_all(Arc::clone(&provider) as Arc<dyn GeoProvider>, &[ip, ip, ip], 4)
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_locate_all_empty_input() {
        let entries = locate_all(fixture(), &[], 4).await;
        assert!(entries.is_empty());
    }
}
