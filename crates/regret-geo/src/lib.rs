//! Best-effort geolocation. Resolution never fails: coordinates supplied by the
//! caller win, then each configured address lookup in order, then a uniformly
//! random point labelled "Unknown".

pub mod probe;
pub mod remote;
pub mod table;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use regret_types::models::GeoPoint;

pub use remote::RemoteLookup;
pub use table::GeoIpTable;

pub const UNKNOWN: &str = "Unknown";

/// Default bound on a single lookup step.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationSource {
    /// Browser-reported position
    Coordinates { latitude: f64, longitude: f64 },
    /// Client network address
    Address(IpAddr),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub country: String,
}

impl ResolvedLocation {
    /// Uniformly random point, labelled unknown.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self {
            latitude: rng.random_range(-90.0..=90.0),
            longitude: rng.random_range(-180.0..=180.0),
            city: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
        }
    }

    fn from_record(record: GeoRecord) -> Self {
        Self {
            latitude: record.latitude,
            longitude: record.longitude,
            city: record.city.unwrap_or_else(|| UNKNOWN.to_string()),
            country: record.country.unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// What an address lookup source knows about one address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A source of address-to-location data. `Ok(None)` is a miss.
pub trait IpLookup: Send + Sync {
    fn name(&self) -> &'static str;

    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>>;
}

pub struct GeoResolver {
    lookups: Vec<Box<dyn IpLookup>>,
    timeout: Duration,
}

impl GeoResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            lookups: Vec::new(),
            timeout,
        }
    }

    /// Append a lookup step. Steps run in insertion order.
    pub fn with_lookup(mut self, lookup: impl IpLookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    pub async fn resolve(&self, source: LocationSource) -> ResolvedLocation {
        match source {
            LocationSource::Coordinates {
                latitude,
                longitude,
            } => match GeoPoint::new(longitude, latitude) {
                Some(point) => ResolvedLocation {
                    latitude: round4(point.latitude),
                    longitude: round4(point.longitude),
                    city: UNKNOWN.to_string(),
                    country: UNKNOWN.to_string(),
                },
                None => {
                    debug!("Discarding out-of-range coordinates ({}, {})", latitude, longitude);
                    ResolvedLocation::random()
                }
            },
            LocationSource::Address(ip) => self.resolve_address(normalize_ip(ip)).await,
            LocationSource::Unknown => ResolvedLocation::random(),
        }
    }

    async fn resolve_address(&self, ip: IpAddr) -> ResolvedLocation {
        for lookup in &self.lookups {
            match tokio::time::timeout(self.timeout, lookup.lookup(ip)).await {
                Ok(Ok(Some(record))) => {
                    if GeoPoint::new(record.longitude, record.latitude).is_none() {
                        warn!("{} returned out-of-range coordinates for {}", lookup.name(), ip);
                        continue;
                    }
                    debug!("{} resolved {}", lookup.name(), ip);
                    return ResolvedLocation::from_record(record);
                }
                Ok(Ok(None)) => debug!("{} has no entry for {}", lookup.name(), ip),
                Ok(Err(e)) => warn!("{} lookup failed for {}: {}", lookup.name(), ip, e),
                Err(_) => warn!(
                    "{} lookup for {} timed out after {:?}",
                    lookup.name(),
                    ip,
                    self.timeout
                ),
            }
        }

        debug!("No location for {}, using random point", ip);
        ResolvedLocation::random()
    }
}

/// Strips the IPv4-mapped IPv6 prefix (`::ffff:a.b.c.d`).
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// Parse an address as it appears in `X-Forwarded-For` or a peer address,
/// with or without a port.
pub fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|sa| sa.ip()))
        .ok()
        .map(normalize_ip)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::net::Ipv4Addr;

    struct Fixed(Option<GeoRecord>);

    impl IpLookup for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn lookup(&self, _ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>> {
            futures_util::future::ready(Ok(self.0.clone())).boxed()
        }
    }

    struct Failing;

    impl IpLookup for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn lookup(&self, _ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>> {
            futures_util::future::ready(Err(anyhow::anyhow!("boom"))).boxed()
        }
    }

    struct Hanging;

    impl IpLookup for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }

        fn lookup(&self, _ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>> {
            futures_util::future::pending().boxed()
        }
    }

    fn oslo() -> GeoRecord {
        GeoRecord {
            latitude: 59.9139,
            longitude: 10.7522,
            city: Some("Oslo".into()),
            country: Some("NO".into()),
        }
    }

    fn assert_unknown_in_bounds(loc: &ResolvedLocation) {
        assert_eq!(loc.city, UNKNOWN);
        assert_eq!(loc.country, UNKNOWN);
        assert!((-90.0..=90.0).contains(&loc.latitude));
        assert!((-180.0..=180.0).contains(&loc.longitude));
    }

    #[tokio::test]
    async fn coordinates_are_rounded_to_four_places() {
        let resolver = GeoResolver::new(DEFAULT_LOOKUP_TIMEOUT);
        let loc = resolver
            .resolve(LocationSource::Coordinates {
                latitude: 40.748_441_7,
                longitude: -73.985_664_3,
            })
            .await;
        assert_eq!(loc.latitude, 40.7484);
        assert_eq!(loc.longitude, -73.9857);
    }

    #[tokio::test]
    async fn invalid_coordinates_fall_back_to_random() {
        let resolver = GeoResolver::new(DEFAULT_LOOKUP_TIMEOUT);
        let loc = resolver
            .resolve(LocationSource::Coordinates {
                latitude: 123.0,
                longitude: 0.0,
            })
            .await;
        assert_unknown_in_bounds(&loc);
    }

    #[tokio::test]
    async fn first_hit_wins_after_failures() {
        let resolver = GeoResolver::new(DEFAULT_LOOKUP_TIMEOUT)
            .with_lookup(Failing)
            .with_lookup(Fixed(None))
            .with_lookup(Fixed(Some(oslo())))
            .with_lookup(Fixed(Some(GeoRecord {
                city: Some("Elsewhere".into()),
                ..oslo()
            })));

        let loc = resolver
            .resolve(LocationSource::Address(IpAddr::V4(Ipv4Addr::new(81, 0, 0, 1))))
            .await;
        assert_eq!(loc.city, "Oslo");
        assert_eq!(loc.country, "NO");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_lookup_times_out_and_falls_through() {
        let resolver = GeoResolver::new(Duration::from_secs(2)).with_lookup(Hanging);
        let loc = resolver
            .resolve(LocationSource::Address(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))))
            .await;
        assert_unknown_in_bounds(&loc);
    }

    #[tokio::test]
    async fn missing_labels_become_unknown() {
        let resolver = GeoResolver::new(DEFAULT_LOOKUP_TIMEOUT).with_lookup(Fixed(Some(GeoRecord {
            city: None,
            country: None,
            ..oslo()
        })));
        let loc = resolver
            .resolve(LocationSource::Address(IpAddr::V4(Ipv4Addr::LOCALHOST)))
            .await;
        assert_eq!(loc.latitude, 59.9139);
        assert_eq!(loc.city, UNKNOWN);
    }

    #[tokio::test]
    async fn no_source_is_random() {
        let resolver = GeoResolver::new(DEFAULT_LOOKUP_TIMEOUT);
        assert_unknown_in_bounds(&resolver.resolve(LocationSource::Unknown).await);
    }

    #[test]
    fn mapped_ipv6_is_reduced_to_ipv4() {
        let ip = parse_client_ip("::ffff:192.0.2.7").unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)));

        assert_eq!(
            parse_client_ip(" 203.0.113.9:51234 "),
            Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
        );
        assert!(parse_client_ip("2001:db8::1").unwrap().is_ipv6());
        assert!(parse_client_ip("not-an-ip").is_none());
    }
}
