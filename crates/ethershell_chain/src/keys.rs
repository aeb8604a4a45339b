//! Key material: private-key parsing, random key generation and BIP-39/BIP-32
//! derivation along the standard Ethereum path.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use bip39::{Language, Mnemonic};
use tiny_hderive::bip32::ExtendedPrivKey;

use crate::error::{ChainError, Result};

/// BIP-44 account-level path for Ethereum; children are `<base>/{i}`.
pub const HD_BASE_PATH: &str = "m/44'/60'/0'/0";
/// Depth of a `m/44'/60'/0'/0/{i}` node.
pub const HD_DEPTH: u32 = 5;

const MNEMONIC_ENTROPY_BYTES: usize = 16;

/// A child key derived from a mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub private_key: String,
    pub address: Address,
    pub path: String,
    pub depth: u32,
}

/// Canonical `0x`-prefixed lowercase form of a 32-byte hex secret.
pub fn normalize_private_key(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChainError::Validation("private key is empty".into()));
    }
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::Key(
            "private key must be 32 bytes of hex".to_string(),
        ));
    }
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// Whether `raw` looks like a private key (32 bytes of hex, prefix optional).
pub fn is_private_key(raw: &str) -> bool {
    normalize_private_key(raw).is_ok()
}

/// Build a local signer from a private key string.
pub fn signer_from_key(raw: &str) -> Result<PrivateKeySigner> {
    let normalized = normalize_private_key(raw)?;
    let bytes: B256 = normalized
        .parse()
        .map_err(|e| ChainError::Key(format!("invalid private key: {e}")))?;
    PrivateKeySigner::from_bytes(&bytes).map_err(|e| ChainError::Key(e.to_string()))
}

/// Address controlled by a private key.
pub fn address_of(raw: &str) -> Result<Address> {
    Ok(signer_from_key(raw)?.address())
}

/// Fresh random key pair as `(private key hex, address)`.
pub fn random_key() -> (String, Address) {
    loop {
        let bytes = B256::from(rand::random::<[u8; 32]>());
        // Zero or >= curve order is rejected by the signer; retry.
        if let Ok(signer) = PrivateKeySigner::from_bytes(&bytes) {
            return (format!("0x{}", hex::encode(bytes)), signer.address());
        }
    }
}

/// A new 12-word English mnemonic.
pub fn generate_mnemonic() -> Result<String> {
    let entropy: [u8; MNEMONIC_ENTROPY_BYTES] = rand::random();
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| ChainError::Key(format!("failed to create mnemonic: {e}")))?;
    Ok(mnemonic.to_string())
}

/// Parse and normalize a phrase (single spaces, lowercase words).
pub fn normalize_mnemonic(phrase: &str) -> Result<String> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| ChainError::Key(format!("invalid mnemonic: {e}")))?;
    Ok(mnemonic.to_string())
}

pub fn is_mnemonic(phrase: &str) -> bool {
    phrase.split_whitespace().count() >= 12 && normalize_mnemonic(phrase).is_ok()
}

/// Derive children `first..first + count` of `phrase` along [`HD_BASE_PATH`].
pub fn derive_children(phrase: &str, first: u32, count: u32) -> Result<Vec<DerivedKey>> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| ChainError::Key(format!("invalid mnemonic: {e}")))?;
    let seed = mnemonic.to_seed("");

    (first..first + count)
        .map(|i| {
            let path = format!("{HD_BASE_PATH}/{i}");
            let ext = ExtendedPrivKey::derive(&seed, path.as_str())
                .map_err(|e| ChainError::Key(format!("derivation of {path} failed: {e:?}")))?;
            let private_key = format!("0x{}", hex::encode(ext.secret()));
            let address = address_of(&private_key)?;
            Ok(DerivedKey {
                private_key,
                address,
                path,
                depth: HD_DEPTH,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hardhat / Anvil default development mnemonic.
    const TEST_PHRASE: &str =
        "test test test test test test test test test test test junk";

    #[test]
    fn normalizes_prefix_and_case() {
        let k = "AC0974BEC39A17E36BA4A6B4D238FF944BACB478CBED5EFCAE784D7BF4F2FF80";
        let n = normalize_private_key(k).unwrap();
        assert_eq!(
            n,
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert_eq!(normalize_private_key(&n).unwrap(), n);
    }

    #[test]
    fn rejects_empty_and_short_keys() {
        assert!(matches!(normalize_private_key("  "), Err(ChainError::Validation(_))));
        assert!(matches!(normalize_private_key("0x1234"), Err(ChainError::Key(_))));
        assert!(!is_private_key("0xzz"));
    }

    #[test]
    fn known_key_maps_to_known_address() {
        let addr = address_of("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
            .unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(addr, expected);
    }

    #[test]
    fn derivation_matches_standard_path() {
        let children = derive_children(TEST_PHRASE, 0, 2).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].path, "m/44'/60'/0'/0/0");
        assert_eq!(children[1].path, "m/44'/60'/0'/0/1");
        assert_eq!(children[0].depth, HD_DEPTH);

        let first: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        let second: Address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap();
        assert_eq!(children[0].address, first);
        assert_eq!(children[1].address, second);
    }

    #[test]
    fn generated_mnemonic_is_valid_and_derivable() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(is_mnemonic(&phrase));
        assert_eq!(derive_children(&phrase, 0, 3).unwrap().len(), 3);
    }

    #[test]
    fn random_keys_differ() {
        let (k1, a1) = random_key();
        let (k2, a2) = random_key();
        assert_ne!(k1, k2);
        assert_ne!(a1, a2);
        assert_eq!(address_of(&k1).unwrap(), a1);
    }

    #[test]
    fn mnemonic_whitespace_is_normalized() {
        let messy = format!("  {}  ", TEST_PHRASE.replace(' ', "   "));
        assert_eq!(normalize_mnemonic(&messy).unwrap(), TEST_PHRASE);
        assert!(!is_mnemonic("not a mnemonic at all"));
    }
}
