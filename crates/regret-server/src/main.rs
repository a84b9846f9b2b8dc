mod config;

use std::net::SocketAddr;

use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use chrono::TimeDelta;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use regret_api::{AppState, RateLimiter, router};
use regret_db::Database;
use regret_geo::{GeoIpTable, GeoResolver, RemoteLookup, probe};

use crate::config::{Config, CorsOrigins};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "regret=debug,regret_api=debug,regret_gateway=debug,regret_geo=debug,regret_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;

    let geo = build_resolver(&config)?;
    let limiter = RateLimiter::new(
        config.rate_limit_max,
        TimeDelta::minutes(config.rate_limit_window_minutes as i64),
    );
    info!(
        "Rate limit: {} confessions per {} minutes",
        limiter.max(),
        config.rate_limit_window_minutes
    );

    let state = AppState::new(db, geo, limiter, &config.jwt_secret);
    let dispatcher = state.dispatcher.clone();
    let app = router(state, cors_layer(&config.cors_origins)?);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Regret Journal server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Close live sockets so the HTTP drain can finish
        dispatcher.shutdown();
    })
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Offline table first, then the remote service. Both are optional.
fn build_resolver(config: &Config) -> anyhow::Result<GeoResolver> {
    let mut resolver = GeoResolver::new(config.geo_timeout);

    if let Some(path) = &config.geoip_path {
        resolver = resolver.with_lookup(GeoIpTable::load(path)?);
    }

    if let Some(template) = &config.geoip_remote_url {
        let remote = RemoteLookup::new(template, config.geo_timeout)?;
        if let Some((host, port)) = remote.endpoint() {
            let limit = config.geo_timeout;
            tokio::spawn(async move {
                let report = probe::probe(&host, port, limit).await;
                if report.is_reachable() {
                    info!("Geo lookup service {}:{} reachable: {}", report.host, report.port, report.outcome);
                } else {
                    warn!(
                        "Geo lookup service {}:{} unreachable ({} addresses resolved): {}",
                        report.host,
                        report.port,
                        report.resolved.len(),
                        report.outcome
                    );
                }
            });
        }
        resolver = resolver.with_lookup(remote);
    }

    if resolver.lookup_count() == 0 {
        info!("No geo-ip sources configured; address lookups fall back to random points");
    }
    Ok(resolver)
}

fn cors_layer(origins: &CorsOrigins) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .map(|o| o.parse::<HeaderValue>())
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
