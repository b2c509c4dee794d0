//! Master-list request/response packet structures

use crate::constants::{
    FLAG_EXTRA_BYTES, LIST_PROTOCOL_BLOCK, LIST_REQUEST_TRAILER, NO_DATA_PORT,
};
use crate::crypto::ValidationToken;
use crate::ADDRESS_BLOCK_SIZE;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;

/// Packet errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet too short: expected at least {expected}, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Request too large: {0} bytes")]
    RequestTooLarge(usize),

    #[error("Game name must not contain NUL bytes")]
    InvalidGameName,
}

/// IPv4 address + port as carried in 6-byte wire blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ServerAddress {
    pub const SIZE: usize = ADDRESS_BLOCK_SIZE;

    /// End-of-list sentinel address
    pub const BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;

    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.ip.octets());
        bytes[4..6].copy_from_slice(&self.port.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < Self::SIZE {
            return Err(PacketError::TooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        Ok(Self { ip, port })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for ServerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl Serialize for ServerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Server list request sent over TCP
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// Game name registered with the master server
    pub gamename: String,
    /// Token the response will be keyed with
    pub token: ValidationToken,
}

impl ListRequest {
    /// Reserved leading bytes; bytes 0..2 receive the total length
    pub const RESERVED: usize = 3;

    pub fn new(gamename: impl Into<String>, token: ValidationToken) -> Self {
        Self {
            gamename: gamename.into(),
            token,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PacketError> {
        if self.gamename.as_bytes().contains(&0) {
            return Err(PacketError::InvalidGameName);
        }

        let mut bytes = vec![0u8; Self::RESERVED];
        bytes.extend_from_slice(&LIST_PROTOCOL_BLOCK);
        for field in [self.gamename.as_bytes(), self.gamename.as_bytes(), self.token.as_bytes()] {
            bytes.extend_from_slice(field);
            bytes.push(0);
        }
        bytes.extend_from_slice(&LIST_REQUEST_TRAILER);

        let len = u16::try_from(bytes.len()).map_err(|_| PacketError::RequestTooLarge(bytes.len()))?;
        bytes[0..2].copy_from_slice(&len.to_be_bytes());

        Ok(bytes)
    }
}

/// Decoded master-list response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterResponse {
    /// Address the master saw the request coming from
    pub request_ip: Option<ServerAddress>,
    /// Servers in the order the master listed them
    pub servers: Vec<ServerAddress>,
}

impl MasterResponse {
    /// Decode a decrypted response payload
    ///
    /// Only a missing header is an error. A `0xFFFF` header port is the
    /// "no data" marker; anything truncated after the header ends the list
    /// with the records read so far.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let request_ip = ServerAddress::from_bytes(bytes)?;
        let mut response = Self {
            request_ip: Some(request_ip),
            servers: Vec::new(),
        };
        if request_ip.port == NO_DATA_PORT {
            return Ok(response);
        }

        let mut reader = Reader::new(&bytes[ServerAddress::SIZE..]);
        for _ in 0..2 {
            if reader.skip_pascal_string().is_none() {
                return Ok(response);
            }
        }

        while let Some(flags) = reader.read_u8() {
            let extra = extra_bytes(flags);
            let Some(block) = reader.take(ServerAddress::SIZE) else {
                break;
            };
            let address = ServerAddress::from_bytes(block)?;
            if flags == 0 && address.ip == ServerAddress::BROADCAST {
                break;
            }
            response.servers.push(address);
            reader.skip(extra);
        }

        Ok(response)
    }

    /// Encode a payload the way a master server lays it out
    ///
    /// Records are written with a zero flag byte and the list is closed
    /// with the sentinel record.
    pub fn encode(&self) -> Vec<u8> {
        let header = self
            .request_ip
            .unwrap_or(ServerAddress::new(Ipv4Addr::UNSPECIFIED, 0));

        let mut bytes = Vec::with_capacity(ServerAddress::SIZE + 2 + (self.servers.len() + 1) * 7);
        bytes.extend_from_slice(&header.to_bytes());
        if header.port == NO_DATA_PORT {
            return bytes;
        }

        // two empty length-prefixed strings
        bytes.extend_from_slice(&[0, 0]);
        for server in &self.servers {
            bytes.push(0);
            bytes.extend_from_slice(&server.to_bytes());
        }
        bytes.push(0);
        bytes.extend_from_slice(&ServerAddress::new(ServerAddress::BROADCAST, NO_DATA_PORT).to_bytes());
        bytes
    }
}

/// Bytes following the address block for a record with `flags`
pub fn extra_bytes(flags: u8) -> usize {
    FLAG_EXTRA_BYTES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, len)| len)
        .sum()
}

/// Bounds-checked cursor over an untrusted payload
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn skip(&mut self, len: usize) {
        self.pos = self.pos.saturating_add(len).min(self.bytes.len());
    }

    fn skip_pascal_string(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u8()? as usize;
        self.take(len)
    }
}
