use std::net::{IpAddr, SocketAddr};

use axum::{
    Json,
    extract::{ConnectInfo, Query, Request, State, rejection::QueryRejection},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;

use regret_geo::{LocationSource, normalize_ip, parse_client_ip};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LocateParams {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Best-effort position of the caller. Never fails: coordinates in the query
/// win, then the caller's address, then a random point.
pub async fn locate(
    State(state): State<AppState>,
    params: Result<Query<LocateParams>, QueryRejection>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let source = match (params.latitude, params.longitude) {
        (Some(latitude), Some(longitude)) => LocationSource::Coordinates {
            latitude,
            longitude,
        },
        _ => match client_address(req.headers(), peer) {
            Some(ip) => LocationSource::Address(ip),
            None => LocationSource::Unknown,
        },
    };

    Ok(Json(state.geo.resolve(source).await))
}

/// First `X-Forwarded-For` entry when present and parseable, else the socket peer.
fn client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(parse_client_ip)
        .or(peer.map(normalize_ip))
}
