//! Protocol constants and the game variant table

/// A game variant served by the master server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameVariant {
    /// Short code used by callers ("ce", "pc")
    pub code: &'static str,

    /// Game name sent in the list request
    pub gamename: &'static str,

    /// Per-game secret key seeding the list cipher
    pub key: &'static str,
}

/// Known game variants
pub const GAME_VARIANTS: &[GameVariant] = &[
    GameVariant {
        code: "ce",
        gamename: "halom",
        key: "e4Rd9J",
    },
    GameVariant {
        code: "pc",
        gamename: "halor",
        key: "QW88cv",
    },
];

/// Default master server host
pub const DEFAULT_MASTER_HOST: &str = "s1.master.hosthpc.com";

/// Default master server list port
pub const DEFAULT_MASTER_PORT: u16 = 28910;

/// Challenge datagram sent to every game server
pub const DEFAULT_STATUS_QUERY: &str = "\\status\\";

/// Protocol-version block following the reserved request bytes
pub const LIST_PROTOCOL_BLOCK: [u8; 6] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x00];

/// Zero bytes closing a list request
pub const LIST_REQUEST_TRAILER: [u8; 5] = [0x00; 5];

/// Port value in the response header meaning "no data"
pub const NO_DATA_PORT: u16 = 0xFFFF;

/// Server record flag bits and the bytes they append after the address block
pub const FLAG_EXTRA_BYTES: [(u8, usize); 4] = [
    (0x02, 3),
    (0x08, 4),
    (0x10, 2),
    (0x20, 2),
];

/// Info key holding the current player count
pub const PLAYER_COUNT_KEY: &str = "numplayers";

