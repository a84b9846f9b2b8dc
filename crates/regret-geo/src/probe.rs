//! DNS + TCP reachability check with every stage bounded by a timeout.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Connected(SocketAddr),
    ResolveFailed(String),
    NoAddresses,
    ConnectFailed(String),
    TimedOut(&'static str),
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(addr) => write!(f, "connected to {}", addr),
            Self::ResolveFailed(e) => write!(f, "DNS resolution failed: {}", e),
            Self::NoAddresses => f.write_str("DNS returned no addresses"),
            Self::ConnectFailed(e) => write!(f, "TCP connect failed: {}", e),
            Self::TimedOut(stage) => write!(f, "{} timed out", stage),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub host: String,
    pub port: u16,
    pub resolved: Vec<SocketAddr>,
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    pub fn is_reachable(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Connected(_))
    }
}

/// Resolve `host` and try each address in turn until one accepts a TCP connection.
pub async fn probe(host: &str, port: u16, limit: Duration) -> ProbeReport {
    let mut report = ProbeReport {
        host: host.to_string(),
        port,
        resolved: Vec::new(),
        outcome: ProbeOutcome::NoAddresses,
    };

    match timeout(limit, lookup_host((host, port))).await {
        Err(_) => {
            report.outcome = ProbeOutcome::TimedOut("DNS resolution");
            return report;
        }
        Ok(Err(e)) => {
            report.outcome = ProbeOutcome::ResolveFailed(e.to_string());
            return report;
        }
        Ok(Ok(addrs)) => report.resolved = addrs.collect(),
    }

    for addr in report.resolved.clone() {
        report.outcome = match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Connected(addr),
            Ok(Err(e)) => ProbeOutcome::ConnectFailed(e.to_string()),
            Err(_) => ProbeOutcome::TimedOut("TCP connect"),
        };
        if report.is_reachable() {
            break;
        }
    }

    report
}
