//! Master server list client
//!
//! One TCP round-trip per game variant: send a list request carrying a fresh
//! validation token, read until the master closes the connection, decrypt the
//! blob with the game key and that same token, then decode the address list.

use crate::config::{GameConfig, MasterConfig};
use anyhow::{Context, Result};
use protocol::{
    crypto::{self, ValidationToken},
    packets::{ListRequest, MasterResponse, ServerAddress},
};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

/// Fetch the server list for one variant
///
/// Every failure (connect, timeout, short read, decrypt, decode) is logged
/// and turned into an empty list for this variant only.
pub fn fetch_server_list(config: &MasterConfig, game: &GameConfig) -> Vec<ServerAddress> {
    match query_master(config, game) {
        Ok(response) => {
            info!(
                "Master {}:{} listed {} servers for {}",
                config.host,
                config.port,
                response.servers.len(),
                game.code
            );
            response.servers
        }
        Err(e) => {
            warn!("Master query for {} failed: {:#}", game.code, e);
            Vec::new()
        }
    }
}

/// Run [`fetch_server_list`] on the blocking pool
pub async fn fetch_server_list_async(config: MasterConfig, game: GameConfig) -> Vec<ServerAddress> {
    let code = game.code.clone();
    match tokio::task::spawn_blocking(move || fetch_server_list(&config, &game)).await {
        Ok(servers) => servers,
        Err(e) => {
            error!("Master query task for {} did not complete: {}", code, e);
            Vec::new()
        }
    }
}

/// Perform one master round-trip
pub fn query_master(config: &MasterConfig, game: &GameConfig) -> Result<MasterResponse> {
    let token = ValidationToken::generate();
    let request = ListRequest::new(game.gamename.as_str(), token)
        .to_bytes()
        .context("Failed to encode list request")?;

    let addr = resolve(&config.host, config.port)?;
    let mut stream = TcpStream::connect_timeout(&addr, config.connect_timeout())
        .with_context(|| format!("Failed to connect to master {}", addr))?;

    stream
        .set_read_timeout(Some(config.read_timeout()))
        .context("Failed to set master read timeout")?;
    stream
        .set_write_timeout(Some(config.read_timeout()))
        .context("Failed to set master write timeout")?;

    stream
        .write_all(&request)
        .context("Failed to send list request")?;

    debug!("Sent list request for {} (token {}) to {}", game.gamename, token, addr);

    let blob = read_response(&mut stream, config.max_response_bytes)?;
    debug!("Received {} byte master response for {}", blob.len(), game.code);

    let payload = crypto::try_decrypt(game.key.as_bytes(), &token, &blob)
        .context("Failed to decrypt master response")?;

    let response = MasterResponse::decode(&payload)
        .context("Invalid master response")?;

    Ok(response)
}

/// Read until the master closes the stream, at most `max_bytes`
fn read_response<R: Read>(stream: R, max_bytes: usize) -> Result<Vec<u8>> {
    let mut blob = Vec::new();
    stream
        .take(max_bytes as u64)
        .read_to_end(&mut blob)
        .context("Failed to read master response")?;

    if blob.is_empty() {
        anyhow::bail!("Master closed the connection without data");
    }
    if blob.len() == max_bytes {
        warn!("Master response reached the {} byte limit and may be truncated", max_bytes);
    }

    Ok(blob)
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve master host {}", host))?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow::anyhow!("No IPv4 address found for {}", host))
}
