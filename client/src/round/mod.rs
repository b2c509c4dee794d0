//! One refresh round: master lists -> UDP status queries -> parsed records

use crate::collector::{self, Candidate, InfoResponse};
use crate::config::Config;
use crate::master;
use chrono::{DateTime, Utc};
use protocol::{info::ParsedInfo, packets::ServerAddress, ProtocolError};
use serde::Serialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use tracing::{error, info, warn};

/// One server that answered the status query
#[derive(Debug, Clone, Serialize)]
pub struct ServerRecord {
    pub address: String,
    pub port: u16,
    pub tag: Option<String>,
    pub info: ParsedInfo,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct RoundCount {
    pub players: i64,
    pub servers: usize,
}

/// Result of a round
///
/// An empty `servers` list means nothing could be gathered; callers keep
/// their previous state instead of clearing it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
    pub count: RoundCount,
    pub updated_at: String,
    pub servers: Vec<ServerRecord>,
}

impl RoundReport {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Run a full round for the given variant codes
///
/// Master queries for different variants run concurrently; the UDP
/// collection then covers every address they returned in one pass.
pub async fn run_round(config: &Config, codes: &[String]) -> RoundReport {
    let mut tasks = Vec::new();
    for code in codes {
        match config.game(code) {
            Some(game) => {
                let task = tokio::spawn(master::fetch_server_list_async(config.master.clone(), game.clone()));
                tasks.push((code.clone(), task));
            }
            None => warn!("{}", ProtocolError::UnknownVariant(code.clone())),
        }
    }

    let mut lists = Vec::with_capacity(tasks.len());
    for (code, task) in tasks {
        match task.await {
            Ok(servers) => lists.push((code, servers)),
            Err(e) => error!("Master query for {} did not complete: {}", code, e),
        }
    }

    let candidates = build_candidates(lists);
    info!("Querying {} unique game servers", candidates.len());

    let responses = collector::collect_async(config.collector.clone(), candidates).await;
    summarize(responses, Utc::now())
}

/// Flatten per-variant lists into unique candidates, first variant wins
pub fn build_candidates(lists: Vec<(String, Vec<ServerAddress>)>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for (tag, servers) in lists {
        for address in servers {
            if seen.insert(address) {
                candidates.push(Candidate {
                    address,
                    tag: tag.clone(),
                });
            }
        }
    }
    candidates
}

/// Parse collected replies into a report
///
/// A server answering more than once is counted from its first reply.
pub fn summarize(responses: Vec<InfoResponse>, now: DateTime<Utc>) -> RoundReport {
    let mut seen: HashSet<SocketAddr> = HashSet::new();
    let mut servers = Vec::new();
    let mut players = 0i64;

    for response in responses {
        if !seen.insert(response.source) {
            continue;
        }

        let info = protocol::info::parse(&response.payload);
        if let Some(count) = info.player_count() {
            players = players.saturating_add(count);
        }

        servers.push(ServerRecord {
            address: response.source.ip().to_string(),
            port: response.source.port(),
            tag: response.tag,
            info,
        });
    }

    RoundReport {
        count: RoundCount {
            players,
            servers: servers.len(),
        },
        updated_at: http_date(now),
        servers,
    }
}

/// RFC 1123 date, as used in HTTP headers
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
