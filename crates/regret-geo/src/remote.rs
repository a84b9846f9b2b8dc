use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, bail};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::{GeoRecord, IpLookup};

/// Placeholder replaced with the address in the URL template.
const IP_PLACEHOLDER: &str = "{ip}";

/// HTTP geo-ip service, e.g. `http://ip-api.com/json/{ip}`.
pub struct RemoteLookup {
    client: reqwest::Client,
    url_template: String,
}

/// Accepts the common field spellings of public geo-ip services.
#[derive(Debug, Deserialize)]
struct RemoteRecord {
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lon")]
    longitude: Option<f64>,
    city: Option<String>,
    #[serde(alias = "country_name")]
    country: Option<String>,
}

impl RemoteLookup {
    pub fn new(url_template: &str, timeout: Duration) -> anyhow::Result<Self> {
        if !url_template.contains(IP_PLACEHOLDER) {
            bail!("geo-ip URL template must contain {}", IP_PLACEHOLDER);
        }
        reqwest::Url::parse(&url_template.replace(IP_PLACEHOLDER, "127.0.0.1"))
            .with_context(|| format!("invalid geo-ip URL template '{}'", url_template))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    /// Host and port of the service, for reachability probes.
    pub fn endpoint(&self) -> Option<(String, u16)> {
        let url = reqwest::Url::parse(&self.url_template.replace(IP_PLACEHOLDER, "127.0.0.1")).ok()?;
        Some((url.host_str()?.to_string(), url.port_or_known_default()?))
    }

    async fn fetch(&self, ip: IpAddr) -> anyhow::Result<Option<GeoRecord>> {
        let url = self.url_template.replace(IP_PLACEHOLDER, &ip.to_string());
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: RemoteRecord = response.json().await?;
        let record = match (body.latitude, body.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoRecord {
                latitude,
                longitude,
                city: body.city.filter(|c| !c.is_empty()),
                country: body.country.filter(|c| !c.is_empty()),
            }),
            _ => None,
        };
        Ok(record)
    }
}

impl IpLookup for RemoteLookup {
    fn name(&self) -> &'static str {
        "remote geo-ip"
    }

    fn lookup(&self, ip: IpAddr) -> BoxFuture<'_, anyhow::Result<Option<GeoRecord>>> {
        self.fetch(ip).boxed()
    }
}
