//! Call builders for the bridge sides, tokens, beacons and the gateway

use super::abi::encode_call;
use super::DEFAULT_ADMIN_ROLE;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};

// Bridge sides

pub fn register_metadata(token: Address) -> Bytes {
    encode_call("registerMetadata(address)", &[Token::Address(token)])
}

pub fn create_mapped_token(native: Address) -> Bytes {
    encode_call("createMappedToken(address)", &[Token::Address(native)])
}

/// Mirror of `native` on the side being queried, zero when absent
pub fn mapped_tokens(native: Address) -> Bytes {
    encode_call("mappedTokens(address)", &[Token::Address(native)])
}

pub fn get_tokens(cursor: U256) -> Bytes {
    encode_call("getTokens(uint256)", &[Token::Uint(cursor)])
}

fn transfer_call(signature: &str, token: Address, account: Address, amount: U256) -> Bytes {
    encode_call(
        signature,
        &[
            Token::Address(token),
            Token::Address(account),
            Token::Uint(amount),
        ],
    )
}

pub fn cross_to_evm(token: Address, evm_recipient: Address, amount: U256) -> Bytes {
    transfer_call("crossToEvm(address,address,uint256)", token, evm_recipient, amount)
}

pub fn cross_from_evm(token: Address, evm_owner: Address, amount: U256) -> Bytes {
    transfer_call("crossFromEvm(address,address,uint256)", token, evm_owner, amount)
}

pub fn lock_token(token: Address, core_recipient: Address, amount: U256) -> Bytes {
    transfer_call("lockToken(address,address,uint256)", token, core_recipient, amount)
}

pub fn lock_mapped_token(mirror: Address, core_recipient: Address, amount: U256) -> Bytes {
    transfer_call(
        "lockMappedToken(address,address,uint256)",
        mirror,
        core_recipient,
        amount,
    )
}

pub fn withdraw_from_evm(token: Address, evm_owner: Address, amount: U256) -> Bytes {
    transfer_call("withdrawFromEvm(address,address,uint256)", token, evm_owner, amount)
}

pub fn withdraw_to_evm(token: Address, evm_recipient: Address, amount: U256) -> Bytes {
    transfer_call("withdrawToEvm(address,address,uint256)", token, evm_recipient, amount)
}

pub fn initialize(token_beacon: Address) -> Bytes {
    encode_call("initialize(address)", &[Token::Address(token_beacon)])
}

pub fn set_evm_side(evm_side: Address) -> Bytes {
    encode_call("setEvmSide(address)", &[Token::Address(evm_side)])
}

pub fn evm_side() -> Bytes {
    encode_call("evmSide()", &[])
}

pub fn cfx_side() -> Bytes {
    encode_call("cfxSide()", &[])
}

// Access control

pub fn transfer_ownership(new_owner: Address) -> Bytes {
    encode_call("transferOwnership(address)", &[Token::Address(new_owner)])
}

fn admin_role() -> Token {
    Token::FixedBytes(DEFAULT_ADMIN_ROLE.to_vec())
}

pub fn grant_admin(account: Address) -> Bytes {
    encode_call("grantRole(bytes32,address)", &[admin_role(), Token::Address(account)])
}

pub fn renounce_admin(account: Address) -> Bytes {
    encode_call("renounceRole(bytes32,address)", &[admin_role(), Token::Address(account)])
}

pub fn admin_member(index: U256) -> Bytes {
    encode_call("getRoleMember(bytes32,uint256)", &[admin_role(), Token::Uint(index)])
}

pub fn admin_member_count() -> Bytes {
    encode_call("getRoleMemberCount(bytes32)", &[admin_role()])
}

// Tokens

pub fn approve(spender: Address, amount: U256) -> Bytes {
    encode_call(
        "approve(address,uint256)",
        &[Token::Address(spender), Token::Uint(amount)],
    )
}

pub fn mint(to: Address, amount: U256) -> Bytes {
    encode_call("mint(address,uint256)", &[Token::Address(to), Token::Uint(amount)])
}

pub fn balance_of(account: Address) -> Bytes {
    encode_call("balanceOf(address)", &[Token::Address(account)])
}

/// `FaucetToken(string name, string symbol, uint8 decimals)` constructor arguments
pub fn faucet_token_args(name: &str, symbol: &str, decimals: u8) -> Vec<Token> {
    vec![
        Token::String(name.to_string()),
        Token::String(symbol.to_string()),
        Token::Uint(U256::from(decimals)),
    ]
}

// Beacon

pub fn upgrade_to(implementation: Address) -> Bytes {
    encode_call("upgradeTo(address)", &[Token::Address(implementation)])
}

pub fn implementation() -> Bytes {
    encode_call("implementation()", &[])
}

// Gateway

/// `transferEVM(bytes20)`, credits `recipient` in the EVM space with the call value
pub fn transfer_evm(recipient: Address) -> Bytes {
    encode_call(
        "transferEVM(bytes20)",
        &[Token::FixedBytes(recipient.as_bytes().to_vec())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::abi::selector;

    #[test]
    fn test_transfer_evm_left_aligns_recipient() {
        let recipient = Address::repeat_byte(0xaa);
        let data = transfer_evm(recipient);
        assert_eq!(&data[..4], &selector("transferEVM(bytes20)"));
        // bytesN is left aligned in its word
        assert_eq!(&data[4..24], recipient.as_bytes());
        assert!(data[24..36].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_role_calls_use_default_admin_role() {
        let data = grant_admin(Address::repeat_byte(3));
        assert_eq!(&data[4..36], &[0u8; 32]);
        assert_eq!(&data[48..68], Address::repeat_byte(3).as_bytes());
    }

    #[test]
    fn test_transfer_calls_share_layout() {
        let data = cross_to_evm(Address::repeat_byte(1), Address::repeat_byte(2), 5.into());
        assert_eq!(data.len(), 4 + 96);
        assert_eq!(&data[..4], &selector("crossToEvm(address,address,uint256)"));
        assert_eq!(data[99], 5);
    }
}
