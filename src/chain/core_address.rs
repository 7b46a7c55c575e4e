//! CIP-37 base32 addresses used by the core space RPC

use crate::error::{BridgeError, BridgeResult};

use ethers::types::Address;
use std::iter;

const ALPHABET: &[u8; 32] = b"abcdefghjkmnprstuvwxyz0123456789";
const CHECKSUM_WORDS: usize = 8;
/// 21 payload bytes (version + hash) as 5-bit words
const PAYLOAD_WORDS: usize = 34;

const MAINNET_ID: u64 = 1029;
const TESTNET_ID: u64 = 1;

/// A decoded core address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub address: Address,
    pub network_id: u64,
}

/// Network prefix for a network id
pub fn network_prefix(network_id: u64) -> String {
    match network_id {
        MAINNET_ID => "cfx".to_string(),
        TESTNET_ID => "cfxtest".to_string(),
        id => format!("net{}", id),
    }
}

fn network_id_from_prefix(prefix: &str) -> Option<u64> {
    match prefix {
        "cfx" => Some(MAINNET_ID),
        "cfxtest" => Some(TESTNET_ID),
        other => other.strip_prefix("net")?.parse().ok(),
    }
}

/// Core-space account address controlled by the same key as an EVM address.
///
/// User accounts have their top nibble forced to `0x1`.
pub fn user_address(evm_address: Address) -> Address {
    let mut bytes = evm_address.0;
    bytes[0] = (bytes[0] & 0x0f) | 0x10;
    Address::from(bytes)
}

/// Encode an address for `network_id`
pub fn encode(address: &Address, network_id: u64) -> String {
    let prefix = network_prefix(network_id);

    let mut payload = Vec::with_capacity(21);
    payload.push(0u8);
    payload.extend_from_slice(address.as_bytes());

    // 8 -> 5 bit conversion with padding cannot fail
    let words = convert_bits(&payload, 8, 5, true).unwrap_or_default();
    let checksum = checksum(&prefix, &words);

    let mut encoded = String::with_capacity(prefix.len() + 1 + words.len() + CHECKSUM_WORDS);
    encoded.push_str(&prefix);
    encoded.push(':');
    for word in words.iter().chain(checksum.iter()) {
        encoded.push(ALPHABET[*word as usize] as char);
    }
    encoded
}

/// Decode a base32 address, accepting the verbose `prefix:type.x:payload` form
pub fn decode(input: &str) -> BridgeResult<DecodedAddress> {
    let invalid = |message: &str| BridgeError::Address {
        input: input.to_string(),
        message: message.to_string(),
    };

    let lowered = input.to_ascii_lowercase();
    let parts: Vec<&str> = lowered.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(invalid("expected prefix:payload"));
    }
    if parts.len() == 3 && !parts[1].starts_with("type.") {
        return Err(invalid("unexpected optional segment"));
    }

    let prefix = parts[0];
    let network_id = network_id_from_prefix(prefix).ok_or_else(|| invalid("unknown network prefix"))?;

    let body = parts[parts.len() - 1];
    if body.len() != PAYLOAD_WORDS + CHECKSUM_WORDS {
        return Err(invalid("wrong payload length"));
    }

    let words = body
        .bytes()
        .map(|c| ALPHABET.iter().position(|a| *a == c).map(|p| p as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| invalid("character outside base32 alphabet"))?;

    if polymod(expand_prefix(prefix).chain(words.iter().copied())) != 0 {
        return Err(invalid("checksum mismatch"));
    }

    let payload = convert_bits(&words[..PAYLOAD_WORDS], 5, 8, false)
        .ok_or_else(|| invalid("non-zero padding"))?;
    if payload.len() != 21 || payload[0] != 0 {
        return Err(invalid("unsupported version byte"));
    }

    Ok(DecodedAddress {
        address: Address::from_slice(&payload[1..]),
        network_id,
    })
}

fn expand_prefix(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1f).chain(iter::once(0))
}

fn checksum(prefix: &str, words: &[u8]) -> [u8; CHECKSUM_WORDS] {
    let values = expand_prefix(prefix)
        .chain(words.iter().copied())
        .chain(iter::repeat(0).take(CHECKSUM_WORDS));
    let modulus = polymod(values);

    let mut out = [0u8; CHECKSUM_WORDS];
    for (i, word) in out.iter_mut().enumerate() {
        *word = ((modulus >> (5 * (CHECKSUM_WORDS - 1 - i))) & 0x1f) as u8;
    }
    out
}

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut c: u64 = 1;
    for value in values {
        let high = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(value);
        if high & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if high & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if high & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if high & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if high & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        let value = u32::from(value);
        if value >> from != 0 {
            return None;
        }
        acc = ((acc << from) | value) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return None;
    }

    Some(out)
}
