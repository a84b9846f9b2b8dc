//! Offline geo-IP table.
//!
//! Text format, one range per line:
//!
//! ```text
//! # start_ip,end_ip,latitude,longitude,city,country
//! 81.0.0.0,81.0.255.255,59.9139,10.7522,Oslo,NO
//! 2001:db8::,2001:db8::ffff,52.52,13.405,Berlin,DE
//! ```
//!
//! Blank lines and `#` comments are ignored. City and country may be empty.
//! Fields cannot contain commas.

use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::info;

use crate::{GeoRecord, IpLookup};

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("geo-ip table line {line}: {reason}")]
pub struct TableError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
struct Entry<T> {
    start: T,
    end: T,
    record: GeoRecord,
}

#[derive(Debug)]
pub struct GeoIpTable {
    v4: Vec<Entry<u32>>,
    v6: Vec<Entry<u128>>,
}

impl GeoIpTable {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading geo-ip table {}", path.display()))?;
        let table = Self::parse(&text)?;
        info!(
            "Geo-ip table loaded from {} ({} IPv4 + {} IPv6 ranges)",
            path.display(),
            table.v4.len(),
            table.v6.len()
        );
        Ok(table)
    }

    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let err = |reason: String| TableError {
                line: idx + 1,
                reason,
            };

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 6 {
                return Err(err(format!("expected 6 fields, found {}", fields.len())));
            }

            let start: IpAddr = fields[0]
                .parse()
                .map_err(|_| err(format!("bad start address '{}'", fields[0])))?;
            let end: IpAddr = fields[1]
                .parse()
                .map_err(|_| err(format!("bad end address '{}'", fields[1])))?;
            let latitude: f64 = fields[2]
                .parse()
                .map_err(|_| err(format!("bad latitude '{}'", fields[2])))?;
            let longitude: f64 = fields[3]
                .parse()
                .map_err(|_| err(format!("bad longitude '{}'", fields[3])))?;

            if regret_types::models::GeoPoint::new(longitude, latitude).is_none() {
                return Err(err("coordinates out of range".into()));
            }

            let label = |s: &str| (!s.is_empty()).then(|| s.to_string());
            let record = GeoRecord {
                latitude,
                longitude,
                city: label(fields[4]),
                country: label(fields[5]),
            };

            match (start, end) {
                (IpAddr::V4(s), IpAddr::V4(e)) => {
                    let (start, end) = (u32::from(s), u32::from(e));
                    if start > end {
                        return Err(err("start address after end address".into()));
                    }
                    v4.push(Entry { start, end, record });
                }
                (IpAddr::V6(s), IpAddr::V6(e)) => {
                    let (start, end) = (u128::from(s), u128::from(e));
                    if start > end {
                        return Err(err("start address after end address".into()));
                    }
                    v6.push(Entry { start, end, record });
                }
                _ => return Err(err("range mixes IPv4 and IPv6".into())),
            }
        }

        v4.sort_by_key(|e| e.start);
        v6.sort_by_key(|e| e.start);

        Ok(Self { v4, v6 })
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, ip: IpAddr) -> Option<&GeoRecord> {
        match crate::normalize_ip(ip) {
            IpAddr::V4(v4) => find(&self.v4, u32::from(v4)),
            IpAddr::V6(v6) => find(&self.v6, u128::from(v6)),
        }
    }
}

/// Last range starting at or before `key`, if it also ends at or after it.
fn find<T: Ord + Copy>(entries: &[Entry<T>], key: T) -> Option<&GeoRecord> {
    let idx = entries.partition_point(|e| e.start <= key);
    let entry = entries.get(idx.checked_sub(1)?)?;
    (key <= entry.end).then_some(&entry.record)
}

impl IpLookup for GeoIpTable {
    fn name(&self) -> &'static str {
        "geo-ip table"
    }

    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>> {
        futures_util::future::ready(Ok(self.get(ip).cloned())).boxed()
    }
}
