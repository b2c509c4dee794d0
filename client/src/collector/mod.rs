//! Server info collector (UDP)
//!
//! Sends the status query to every candidate, then gathers replies until no
//! datagram has arrived for a full quiet period. The quiet period is measured
//! from the last receipt, so a slow server still gets in as long as replies
//! keep trickling; a completely silent socket gives up after one period.

mod socket;

pub use socket::{open_socket, DatagramSocket};

use crate::config::CollectorConfig;
use protocol::packets::ServerAddress;
use protocol::MAX_DATAGRAM_SIZE;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// An address to query, tagged with the variant that listed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: ServerAddress,
    pub tag: String,
}

/// A raw reply, correlated back to its candidate when possible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    pub source: SocketAddr,
    /// `None` when the reply came from an address we never queried
    pub tag: Option<String>,
    pub payload: Vec<u8>,
}

/// Query `candidates` over a fresh socket and collect the replies
///
/// The socket lives only for the duration of this call.
pub fn collect(config: &CollectorConfig, candidates: &[Candidate]) -> Vec<InfoResponse> {
    if candidates.is_empty() {
        debug!("No candidates to query");
        return Vec::new();
    }

    let socket = match open_socket(config) {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Failed to open query socket: {:#}", e);
            return Vec::new();
        }
    };

    let responses = collect_with(&socket, candidates, config.query.as_bytes(), config.quiet_period());
    info!(
        "Collected {} responses from {} candidates",
        responses.len(),
        candidates.len()
    );
    responses
}

/// Run [`collect`] on the blocking pool
pub async fn collect_async(config: CollectorConfig, candidates: Vec<Candidate>) -> Vec<InfoResponse> {
    match tokio::task::spawn_blocking(move || collect(&config, &candidates)).await {
        Ok(responses) => responses,
        Err(e) => {
            error!("Collector task did not complete: {}", e);
            Vec::new()
        }
    }
}

/// Query and collect over an already configured socket
///
/// The socket's own receive timeout bounds each `recv_from`; `quiet_period`
/// bounds the whole collection.
pub fn collect_with<S: DatagramSocket>(
    socket: &S,
    candidates: &[Candidate],
    query: &[u8],
    quiet_period: Duration,
) -> Vec<InfoResponse> {
    let lookup: HashMap<SocketAddr, &str> = candidates
        .iter()
        .map(|c| (c.address.socket_addr(), c.tag.as_str()))
        .collect();

    for candidate in candidates {
        if let Err(e) = socket.send_to(query, candidate.address.socket_addr()) {
            debug!("Failed to query {}: {}", candidate.address, e);
        }
    }

    let mut responses = Vec::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut last_receipt = Instant::now();

    while last_receipt.elapsed() <= quiet_period {
        match socket.recv_from(&mut buf) {
            Ok((len, source)) => {
                last_receipt = Instant::now();
                let tag = lookup.get(&source).map(|t| t.to_string());
                if tag.is_none() {
                    debug!("Reply from unqueried address {}", source);
                }
                responses.push(InfoResponse {
                    source,
                    tag,
                    payload: buf[..len].to_vec(),
                });
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                warn!("Query socket error, ending collection early: {}", e);
                break;
            }
        }
    }

    responses
}
