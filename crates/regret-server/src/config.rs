use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub cors_origins: CorsOrigins,
    pub rate_limit_max: u64,
    pub rate_limit_window_minutes: u32,
    pub jwt_secret: String,
    pub geoip_path: Option<PathBuf>,
    pub geoip_remote_url: Option<String>,
    pub geo_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("REGRET_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("REGRET_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let rate_limit_window_minutes: u32 = parse_or(&get, "REGRET_RATE_LIMIT_WINDOW_MINUTES", 60)?;
        if rate_limit_window_minutes == 0 {
            bail!("REGRET_RATE_LIMIT_WINDOW_MINUTES must be at least 1");
        }

        let geo_timeout_ms: u64 = parse_or(&get, "REGRET_GEO_TIMEOUT_MS", 3000)?;
        if geo_timeout_ms == 0 {
            bail!("REGRET_GEO_TIMEOUT_MS must be at least 1");
        }

        let geoip_remote_url = get("REGRET_GEOIP_REMOTE_URL");
        if let Some(url) = &geoip_remote_url {
            if !url.contains("{ip}") {
                bail!("REGRET_GEOIP_REMOTE_URL must contain an {{ip}} placeholder");
            }
        }

        Ok(Self {
            db_path: get("REGRET_DB_PATH").unwrap_or_else(|| "regret.db".into()).into(),
            host: get("REGRET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "REGRET_PORT", 5000)?,
            cors_origins: parse_cors(get("REGRET_CORS_ORIGINS").as_deref().unwrap_or(DEFAULT_CORS_ORIGINS)),
            rate_limit_max: parse_or(&get, "REGRET_RATE_LIMIT_MAX", 50)?,
            rate_limit_window_minutes,
            jwt_secret,
            geoip_path: get("REGRET_GEOIP_PATH").map(PathBuf::from),
            geoip_remote_url,
            geo_timeout: Duration::from_millis(geo_timeout_ms),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_cors(raw: &str) -> CorsOrigins {
    if raw.trim() == "*" {
        return CorsOrigins::Any;
    }
    CorsOrigins::List(
        raw.split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect(),
    )
}
