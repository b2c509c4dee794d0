//! Master-list stream cipher
//!
//! Master servers obfuscate list responses with a byte-oriented stream cipher
//! keyed by the per-game secret and the validation token sent in the request.
//! A response blob starts with a small header whose bytes re-seed the cipher,
//! followed by the ciphertext proper.

use crate::error::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Cipher working state size: 256-entry permutation + 5 cursor registers
pub const STATE_SIZE: usize = 261;

/// Validation token length (8 hex characters)
pub const TOKEN_SIZE: usize = 8;

/// Header offset mask applied to the first blob byte
const HEADER_OFFSET_MASK: u8 = 0xEC;

/// Header length mask applied to the byte before the salt
const HEADER_LENGTH_MASK: u8 = 0xEA;

/// Derivations tried before falling back to a modulo reduction
const MAX_MASKED_DERIVATIONS: u32 = 11;

// Cursor register slots
const R0: usize = 256;
const R1: usize = 257;
const R2: usize = 258;
const R3: usize = 259;
const R4: usize = 260;

/// Crypto errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Empty blob")]
    EmptyBlob,

    #[error("Empty game key")]
    EmptyKey,

    #[error("Blob too short for its header (needs {needed} bytes, got {got})")]
    Truncated { needed: usize, got: usize },

    #[error("Header salt too long ({0} bytes, maximum 255)")]
    SaltTooLong(usize),
}

/// Per-round validation token
///
/// Sent in the list request and mixed into the response cipher, so a
/// response only decodes for the round that asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidationToken([u8; TOKEN_SIZE]);

impl ValidationToken {
    /// Token for the current wall clock time
    pub fn generate() -> Self {
        Self::from_millis(chrono::Utc::now().timestamp_millis() as u64)
    }

    /// Token derived from a millisecond timestamp (low 32 bits, lowercase hex)
    pub fn from_millis(millis: u64) -> Self {
        let text = format!("{:08x}", millis & 0xFFFF_FFFF);
        let mut bytes = [0u8; TOKEN_SIZE];
        bytes.copy_from_slice(text.as_bytes());
        Self(bytes)
    }

    /// Parse an existing token, e.g. one echoed in a captured request
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let valid = text.len() == TOKEN_SIZE
            && text.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(ProtocolError::InvalidToken(text.to_string()));
        }

        let mut bytes = [0u8; TOKEN_SIZE];
        bytes.copy_from_slice(text.as_bytes());
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Always ASCII hex, see constructors
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keystream state machine
///
/// The register shuffle in [`CipherState::step`] has no structure beyond
/// the exact order of its loads and stores; reordering any of them changes
/// the output and breaks compatibility with real master servers.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherState {
    table: [u8; STATE_SIZE],
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState")
            .field("registers", &&self.table[R0..])
            .finish_non_exhaustive()
    }
}

impl CipherState {
    /// Run the key schedule over `key`
    ///
    /// Returns `None` for an empty key, which has no defined schedule.
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.is_empty() {
            return None;
        }

        let mut table = [0u8; STATE_SIZE];
        for (i, slot) in table.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        let mut n1: u8 = 0;
        let mut n2: usize = 0;
        for i in (0..256).rev() {
            let target = select_index(&table, i, key, &mut n1, &mut n2);
            table.swap(i, target);
        }

        table[R0] = table[1];
        table[R1] = table[3];
        table[R2] = table[5];
        table[R3] = table[7];
        table[R4] = table[n1 as usize];

        Some(Self { table })
    }

    /// Raw state bytes (permutation followed by the five registers)
    pub fn as_bytes(&self) -> &[u8; STATE_SIZE] {
        &self.table
    }

    /// Decode one ciphertext byte
    pub fn decode_byte(&mut self, input: u8) -> u8 {
        let output = self.step(input);
        self.table[R4] = input;
        self.table[R3] = output;
        output
    }

    /// Encode one plaintext byte (server direction)
    pub fn encode_byte(&mut self, input: u8) -> u8 {
        let output = self.step(input);
        self.table[R3] = input;
        self.table[R4] = output;
        output
    }

    /// Decode a buffer in place
    pub fn decode(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.decode_byte(*byte);
        }
    }

    /// Encode a buffer in place
    pub fn encode(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.encode_byte(*byte);
        }
    }

    fn step(&mut self, input: u8) -> u8 {
        let k = &mut self.table;

        let mut a = k[R0];
        let mut b = k[R1];
        let mut c = k[a as usize];
        k[R0] = a.wrapping_add(1);
        k[R1] = b.wrapping_add(c);
        a = k[R4];
        b = k[R1];
        b = k[b as usize];
        c = k[a as usize];
        k[a as usize] = b;
        a = k[R3];
        b = k[R1];
        a = k[a as usize];
        k[b as usize] = a;
        a = k[R0];
        b = k[R3];
        a = k[a as usize];
        k[b as usize] = a;
        a = k[R0];
        k[a as usize] = c;
        b = k[R2];
        a = k[c as usize];
        c = k[R3];
        b = b.wrapping_add(a);
        k[R2] = b;
        a = b;
        c = k[c as usize];
        b = k[R1];
        b = k[b as usize];
        a = k[a as usize];
        c = c.wrapping_add(b);
        b = k[R4];
        b = k[b as usize];
        c = c.wrapping_add(b);
        b = k[c as usize];
        c = k[R0];
        c = k[c as usize];
        a = a.wrapping_add(c);
        c = k[b as usize];
        b = k[a as usize];

        c ^ b ^ input
    }
}

/// Pick the swap target for position `count` of the key schedule
fn select_index(table: &[u8; STATE_SIZE], count: usize, key: &[u8], n1: &mut u8, n2: &mut usize) -> usize {
    if count == 0 {
        return 0;
    }

    let mut mask: usize = 1;
    while mask < count {
        mask = (mask << 1) + 1;
    }

    let mut derivations = 0;
    loop {
        *n1 = table[*n1 as usize].wrapping_add(key[*n2]);
        *n2 += 1;
        if *n2 >= key.len() {
            *n2 = 0;
            *n1 = n1.wrapping_add(key.len() as u8);
        }

        let mut candidate = *n1 as usize & mask;
        derivations += 1;
        if derivations > MAX_MASKED_DERIVATIONS {
            candidate %= count;
        }
        if candidate <= count {
            return candidate;
        }
    }
}

/// Fold the header salt into the validation token, producing the 8-byte
/// key for the payload cipher
fn derive_session_key(game_key: &[u8], token: &ValidationToken, salt: &[u8]) -> [u8; TOKEN_SIZE] {
    let mut buf = *token.as_bytes();
    for (i, &byte) in salt.iter().enumerate() {
        let key_byte = game_key[i % game_key.len()] as usize;
        let dst = key_byte.wrapping_mul(i) & 7;
        buf[dst] ^= buf[i & 7] ^ byte;
    }
    buf
}

/// Decrypt a master-list response blob
///
/// # Arguments
/// * `game_key` - Per-game secret key
/// * `token` - Validation token sent with the request
/// * `blob` - Raw bytes received from the master server
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded payload (everything after the header)
/// * `Err(CryptoError)` - Header offsets do not fit inside the blob
pub fn try_decrypt(game_key: &[u8], token: &ValidationToken, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if game_key.is_empty() {
        return Err(CryptoError::EmptyKey);
    }
    let first = *blob.first().ok_or(CryptoError::EmptyBlob)?;

    let offset = (first ^ HEADER_OFFSET_MASK) as usize + 2;
    if blob.len() < offset {
        return Err(CryptoError::Truncated { needed: offset, got: blob.len() });
    }

    let salt_len = (blob[offset - 1] ^ HEADER_LENGTH_MASK) as usize;
    let payload_start = offset + salt_len;
    if blob.len() < payload_start {
        return Err(CryptoError::Truncated { needed: payload_start, got: blob.len() });
    }

    let session_key = derive_session_key(game_key, token, &blob[offset..payload_start]);
    let mut state = CipherState::from_key(&session_key).ok_or(CryptoError::EmptyKey)?;

    let mut payload = blob[payload_start..].to_vec();
    state.decode(&mut payload);
    Ok(payload)
}

/// Decrypt a master-list response blob, `None` on any header violation
pub fn decrypt(game_key: &[u8], token: &ValidationToken, blob: &[u8]) -> Option<Vec<u8>> {
    try_decrypt(game_key, token, blob).ok()
}

/// Build a response blob the way a master server does
///
/// Uses the shortest header (offset 2) followed by `salt`.
pub fn encrypt(
    game_key: &[u8],
    token: &ValidationToken,
    salt: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if game_key.is_empty() {
        return Err(CryptoError::EmptyKey);
    }
    let salt_len = u8::try_from(salt.len()).map_err(|_| CryptoError::SaltTooLong(salt.len()))?;

    let session_key = derive_session_key(game_key, token, salt);
    let mut state = CipherState::from_key(&session_key).ok_or(CryptoError::EmptyKey)?;

    let mut blob = Vec::with_capacity(2 + salt.len() + plaintext.len());
    blob.push(HEADER_OFFSET_MASK);
    blob.push(salt_len ^ HEADER_LENGTH_MASK);
    blob.extend_from_slice(salt);

    let mut body = plaintext.to_vec();
    state.encode(&mut body);
    blob.extend_from_slice(&body);

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn token() -> ValidationToken {
        ValidationToken::parse("5f3a09c1").unwrap()
    }

    fn hex(text: &str) -> Vec<u8> {
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_key_schedule_known_answer() {
        let expected = hex(&[
            "401448c25d46f0e32be4f1069cef78fac7b1fd64ea87d5f97d9fcf1ceea624bb",
            "86773cc14cffa1a872b06fcd7510bfb3a4e80e9e7af376d270b694aeaf95d4ac",
            "2e71dcfcc8925eb4cbd15cdbdf74e7967b6c587e42a32862e0aa68ccb56a0c19",
            "60c48c34e5b2305a0d7cde906bc9b954258356ad36846ec0f6e2abc35181a04e",
            "6963d857d73ab788d0bd1893028a08f4be52a566e1809891ebbc89c699ce8d04",
            "ed01078f0a82baf7b86dda67129d139bc58edd8b1a79ca731ea91fa7229ae997",
            "d385d67f2a1600d9a2f5e605312003fbec0b3726093bf2113d2c0f41f8174332",
            "1547fe1d49381b4d39234f3e21533f2955442759452f5b4a2d5f4b3561503365",
            "14c246e368",
        ]
        .concat());

        let state = CipherState::from_key(b"e4Rd9J").unwrap();
        assert_eq!(state.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_decrypt_known_answer() {
        let mut blob: Vec<u8> = (0..40usize).map(|i| (i * 37 + 11) as u8).collect();
        blob[0] = HEADER_OFFSET_MASK ^ 3;
        blob[4] = HEADER_LENGTH_MASK ^ 6;

        let plain = decrypt(b"e4Rd9J", &token(), &blob).unwrap();
        assert_eq!(plain, hex("cf09dfbc47ee1506d238621d3e44cb984a0e7e61ebea10476733424baa"));
    }

    #[test]
    fn test_key_schedule_is_deterministic() {
        let first = CipherState::from_key(b"5f3a09c1").unwrap();
        let second = CipherState::from_key(b"5f3a09c1").unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.as_bytes().len(), STATE_SIZE);
    }

    #[test]
    fn test_key_schedule_produces_permutation() {
        for key in [&b"e4Rd9J"[..], b"QW88cv", b"x", b"\x00\x00\x00\x00\x00\x00\x00\x00"] {
            let state = CipherState::from_key(key).unwrap();
            let mut seen = [false; 256];
            for &b in &state.as_bytes()[..256] {
                assert!(!seen[b as usize], "duplicate entry {b} for key {key:?}");
                seen[b as usize] = true;
            }
        }
    }

    #[test]
    fn test_key_schedule_registers_seeded_from_table() {
        let state = CipherState::from_key(b"QW88cv").unwrap();
        let t = state.as_bytes();
        assert_eq!(t[R0], t[1]);
        assert_eq!(t[R1], t[3]);
        assert_eq!(t[R2], t[5]);
        assert_eq!(t[R3], t[7]);
    }

    #[test]
    fn test_different_keys_differ() {
        let a = CipherState::from_key(b"e4Rd9J").unwrap();
        let b = CipherState::from_key(b"QW88cv").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_key_has_no_schedule() {
        assert!(CipherState::from_key(b"").is_none());
        assert_eq!(try_decrypt(b"", &token(), &[0xEC, 0xEA]), Err(CryptoError::EmptyKey));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let plaintext = b"\x7f\x00\x00\x01\x6d\x5e\x00\x00\x00\xff\xff\xff\xff\xff\xff";
        let blob = encrypt(b"e4Rd9J", &token(), b"0123456789ab", plaintext).unwrap();
        assert_ne!(&blob[14..], &plaintext[..]);

        let decrypted = decrypt(b"e4Rd9J", &token(), &blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_token_garbles() {
        let plaintext = b"a fairly long plaintext so a collision is not plausible";
        let blob = encrypt(b"QW88cv", &token(), b"salt", plaintext).unwrap();

        let other = ValidationToken::parse("00000000").unwrap();
        let decrypted = decrypt(b"QW88cv", &other, &blob).unwrap();
        assert_ne!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_header_only_yields_empty_payload() {
        // offset 2, no salt, no ciphertext
        assert_eq!(decrypt(b"e4Rd9J", &token(), &[0xEC, 0xEA]), Some(Vec::new()));
    }

    #[test]
    fn test_decrypt_short_blobs_are_absent() {
        let key = b"e4Rd9J";
        assert_eq!(try_decrypt(key, &token(), &[]), Err(CryptoError::EmptyBlob));

        // offset = (0x00 ^ 0xEC) + 2 = 238 > 4
        assert_eq!(
            try_decrypt(key, &token(), &[0x00, 1, 2, 3]),
            Err(CryptoError::Truncated { needed: 238, got: 4 })
        );

        // offset 2, salt length (0x00 ^ 0xEA) = 234 > remaining
        assert_eq!(
            try_decrypt(key, &token(), &[0xEC, 0x00, 1, 2]),
            Err(CryptoError::Truncated { needed: 236, got: 4 })
        );

        assert!(decrypt(key, &token(), &[0xEC]).is_none());
    }

    #[test]
    fn test_decrypt_random_blobs_never_panics() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let len = rng.gen_range(0..600);
            let mut blob = vec![0u8; len];
            rng.fill(&mut blob[..]);
            if let Some(payload) = decrypt(b"e4Rd9J", &token(), &blob) {
                assert!(payload.len() < blob.len());
            }
        }
    }

    #[test]
    fn test_encrypt_rejects_long_salt() {
        let salt = [0u8; 256];
        assert_eq!(
            encrypt(b"e4Rd9J", &token(), &salt, b"x"),
            Err(CryptoError::SaltTooLong(256))
        );
    }

    #[test]
    fn test_token_from_millis() {
        let token = ValidationToken::from_millis(0x1_2345_6789);
        assert_eq!(token.as_str(), "23456789");
        assert_eq!(ValidationToken::from_millis(0xab).to_string(), "000000ab");
    }

    #[test]
    fn test_token_generate_is_lowercase_hex() {
        let token = ValidationToken::generate();
        assert!(ValidationToken::parse(token.as_str()).is_ok());
    }

    #[test]
    fn test_parse_invalid_token() {
        assert!(ValidationToken::parse("abcd").is_err());
        assert!(ValidationToken::parse("ABCDEF01").is_err());
        assert!(ValidationToken::parse("zzzzzzzz").is_err());
        assert!(ValidationToken::parse("0123456789").is_err());
    }
}
