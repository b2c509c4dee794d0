//! halostat Protocol Library
//!
//! Wire-level pieces of the legacy master-server directory protocol:
//! the master-list stream cipher, the TCP list request/response codec and
//! the backslash-delimited server info parser. Nothing in this crate does I/O.

pub mod constants;
pub mod error;
pub mod packets;
pub mod crypto;
pub mod info;

pub use constants::*;
pub use error::ProtocolError;

/// Size of an address:port block on the wire (4 address bytes + 2 port bytes)
pub const ADDRESS_BLOCK_SIZE: usize = 6;

/// Maximum UDP datagram we will accept from a game server
pub const MAX_DATAGRAM_SIZE: usize = 65535;
