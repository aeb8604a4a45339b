use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::keys;
use crate::serialize::{decimal, decimal_opt};

/// Printed alongside every account listing and creation.
pub const UNSAFE_WARNING: &str =
    "!WARNING! The generated accounts are NOT safe. Do NOT use them on main net!";

/// Where an account's signing capability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    UserImported,
    UserGenerated,
    /// The key lives in the node; transactions go through `eth_sendTransaction`.
    NodeManaged,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccountType::UserImported => "user-imported",
            AccountType::UserGenerated => "user-generated",
            AccountType::NodeManaged => "node-managed",
        })
    }
}

/// A contract deployed or attached through an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRef {
    pub address: Address,
    pub deployed_on: String,
    #[serde(with = "decimal")]
    pub chain_id: u64,
}

/// One managed signing identity plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub index: usize,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(rename = "type")]
    pub kind: AccountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, with = "decimal_opt", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, with = "decimal_opt", skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    #[serde(default)]
    pub contracts: Vec<ContractRef>,
}

impl AccountRecord {
    pub fn imported(index: usize, address: Address, private_key: String) -> Self {
        Self::flat(index, address, private_key, AccountType::UserImported)
    }

    pub fn generated(index: usize, address: Address, private_key: String) -> Self {
        Self::flat(index, address, private_key, AccountType::UserGenerated)
    }

    fn flat(index: usize, address: Address, private_key: String, kind: AccountType) -> Self {
        Self {
            index,
            address,
            private_key: Some(private_key),
            kind,
            phrase: None,
            path: None,
            depth: None,
            nonce: None,
            balance: None,
            contracts: Vec::new(),
        }
    }

    pub fn hd(index: usize, phrase: String, key: keys::DerivedKey, kind: AccountType) -> Self {
        Self {
            index,
            address: key.address,
            private_key: Some(key.private_key),
            kind,
            phrase: Some(phrase),
            path: Some(key.path),
            depth: Some(key.depth),
            nonce: None,
            balance: None,
            contracts: Vec::new(),
        }
    }

    pub fn node_managed(index: usize, address: Address) -> Self {
        Self {
            index,
            address,
            private_key: None,
            kind: AccountType::NodeManaged,
            phrase: None,
            path: None,
            depth: None,
            nonce: None,
            balance: None,
            contracts: Vec::new(),
        }
    }

    pub fn is_hd(&self) -> bool {
        self.phrase.is_some()
    }

    pub fn is_node_managed(&self) -> bool {
        self.kind == AccountType::NodeManaged
    }
}

/// Which partition of the registry to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountView {
    #[default]
    All,
    /// Imported, generated and node-managed accounts.
    Flat,
    /// Mnemonic-derived accounts.
    Hd,
}

/// Ways a command can point at one or more accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSelector {
    All,
    Index(usize),
    Indices(Vec<usize>),
    Address(Address),
    Phrase(String),
    PrivateKey(String),
}

impl From<usize> for AccountSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Vec<usize>> for AccountSelector {
    fn from(indices: Vec<usize>) -> Self {
        Self::Indices(indices)
    }
}

impl From<Address> for AccountSelector {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl fmt::Display for AccountSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all accounts"),
            Self::Index(i) => write!(f, "index {i}"),
            Self::Indices(list) => write!(f, "indices {list:?}"),
            Self::Address(a) => write!(f, "address {a}"),
            Self::Phrase(_) => f.write_str("mnemonic phrase"),
            Self::PrivateKey(_) => f.write_str("private key"),
        }
    }
}

pub fn is_address(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) else {
        return false;
    };
    rest.len() == 40 && rest.chars().all(|ch| ch.is_ascii_hexdigit())
}

impl FromStr for AccountSelector {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChainError::Validation("Empty input is NOT valid".into()));
        }
        if let Ok(index) = s.parse::<usize>() {
            return Ok(Self::Index(index));
        }
        if s.starts_with('[') {
            let indices: Vec<usize> = serde_json::from_str(s).map_err(|_| {
                ChainError::Validation(format!("`{s}` is not a list of account indices"))
            })?;
            return Ok(Self::Indices(indices));
        }
        if is_address(s) {
            let address = s
                .parse()
                .map_err(|e| ChainError::Validation(format!("invalid address {s}: {e}")))?;
            return Ok(Self::Address(address));
        }
        if keys::is_private_key(s) {
            return Ok(Self::PrivateKey(s.to_string()));
        }
        if keys::is_mnemonic(s) {
            return Ok(Self::Phrase(s.to_string()));
        }
        Err(ChainError::Validation(format!(
            "`{s}` is not an index, address, index list, private key or mnemonic"
        )))
    }
}
