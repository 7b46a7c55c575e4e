//! Function selectors, call encoding and return-value decoding

use crate::error::{BridgeError, BridgeResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use sha3::{Digest, Keccak256};

/// First four bytes of the keccak hash of a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Selector followed by the ABI-encoded arguments
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

fn decode_single(output: &[u8], kind: ParamType) -> BridgeResult<Token> {
    let mut tokens =
        abi::decode(&[kind.clone()], output).map_err(|e| BridgeError::Abi(e.to_string()))?;
    tokens
        .pop()
        .ok_or_else(|| BridgeError::Abi(format!("empty output for {:?}", kind)))
}

pub fn decode_address(output: &[u8]) -> BridgeResult<Address> {
    match decode_single(output, ParamType::Address)? {
        Token::Address(address) => Ok(address),
        other => Err(BridgeError::Abi(format!("expected address, got {:?}", other))),
    }
}

pub fn decode_uint(output: &[u8]) -> BridgeResult<U256> {
    match decode_single(output, ParamType::Uint(256))? {
        Token::Uint(value) => Ok(value),
        other => Err(BridgeError::Abi(format!("expected uint256, got {:?}", other))),
    }
}

pub fn decode_address_array(output: &[u8]) -> BridgeResult<Vec<Address>> {
    match decode_single(output, ParamType::Array(Box::new(ParamType::Address)))? {
        Token::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Token::Address(address) => Ok(address),
                other => Err(BridgeError::Abi(format!("expected address, got {:?}", other))),
            })
            .collect(),
        other => Err(BridgeError::Abi(format!("expected address[], got {:?}", other))),
    }
}
