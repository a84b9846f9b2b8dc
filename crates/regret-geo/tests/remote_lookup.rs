//! Resolver chain against a local stand-in for a remote geo-ip service.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::{Json, Router, extract::Path, http::StatusCode, response::IntoResponse, routing::get};
use regret_geo::{GeoIpTable, GeoResolver, LocationSource, RemoteLookup, UNKNOWN};
use serde_json::json;

async fn fake_service(Path(ip): Path<String>) -> impl IntoResponse {
    match ip.as_str() {
        // ip-api style
        "198.51.100.7" => (
            StatusCode::OK,
            Json(json!({ "status": "success", "lat": -33.8688, "lon": 151.2093, "city": "Sydney", "country": "Australia" })),
        )
            .into_response(),
        // ipapi.co style
        "198.51.100.8" => (
            StatusCode::OK,
            Json(json!({ "latitude": 35.6895, "longitude": 139.6917, "city": "Tokyo", "country_name": "Japan" })),
        )
            .into_response(),
        "198.51.100.9" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_service() -> SocketAddr {
    let app = Router::new().route("/json/{ip}", get(fake_service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn resolver(addr: SocketAddr, timeout: Duration) -> GeoResolver {
    let table = GeoIpTable::parse("81.0.0.0,81.0.255.255,59.9139,10.7522,Oslo,NO").unwrap();
    let remote = RemoteLookup::new(&format!("http://{}/json/{{ip}}", addr), timeout).unwrap();
    GeoResolver::new(timeout).with_lookup(table).with_lookup(remote)
}

#[tokio::test]
async fn table_is_consulted_before_remote() {
    let addr = spawn_service().await;
    let loc = resolver(addr, Duration::from_secs(2))
        .resolve(LocationSource::Address(ip("81.0.0.5")))
        .await;
    assert_eq!(loc.city, "Oslo");
}

#[tokio::test]
async fn remote_fills_table_misses() {
    let addr = spawn_service().await;
    let resolver = resolver(addr, Duration::from_secs(2));

    let sydney = resolver.resolve(LocationSource::Address(ip("198.51.100.7"))).await;
    assert_eq!(sydney.city, "Sydney");
    assert_eq!(sydney.latitude, -33.8688);

    let tokyo = resolver.resolve(LocationSource::Address(ip("::ffff:198.51.100.8"))).await;
    assert_eq!(tokyo.country, "Japan");
}

#[tokio::test]
async fn remote_miss_falls_back_to_random() {
    let addr = spawn_service().await;
    let loc = resolver(addr, Duration::from_secs(2))
        .resolve(LocationSource::Address(ip("192.0.2.1")))
        .await;
    assert_eq!(loc.city, UNKNOWN);
    assert_eq!(loc.country, UNKNOWN);
    assert!((-90.0..=90.0).contains(&loc.latitude));
    assert!((-180.0..=180.0).contains(&loc.longitude));
}

#[tokio::test]
async fn slow_remote_is_cut_off() {
    let addr = spawn_service().await;
    let started = std::time::Instant::now();
    let loc = resolver(addr, Duration::from_millis(300))
        .resolve(LocationSource::Address(ip("198.51.100.9")))
        .await;
    assert_eq!(loc.city, UNKNOWN);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn template_without_placeholder_is_rejected() {
    assert!(RemoteLookup::new("http://example.com/json/", Duration::from_secs(1)).is_err());

    let remote = RemoteLookup::new("https://geo.example.com/json/{ip}", Duration::from_secs(1)).unwrap();
    assert_eq!(remote.endpoint(), Some(("geo.example.com".to_string(), 443)));
}
