use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use tracing::{info, warn};

use crate::account::is_address;
use crate::error::{ChainError, Result};
use crate::proxy::{ContractHandle, ContractSummary};

/// How a command names a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractLookup {
    Index(usize),
    Address(Address),
    Name(String),
}

impl FromStr for ContractLookup {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChainError::EmptyName);
        }
        if let Ok(index) = s.parse::<usize>() {
            return Ok(Self::Index(index));
        }
        if is_address(s) {
            let address = s
                .parse()
                .map_err(|e| ChainError::Validation(format!("invalid address {s}: {e}")))?;
            return Ok(Self::Address(address));
        }
        Ok(Self::Name(s.to_string()))
    }
}

impl fmt::Display for ContractLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "contract #{i}"),
            Self::Address(a) => write!(f, "contract at {a}"),
            Self::Name(n) => write!(f, "contract `{n}`"),
        }
    }
}

/// Runtime registry of contract handles, keyed by name.
///
/// Indices follow creation order and are never reused, even when a name is
/// rebound.
#[derive(Default)]
pub struct ContractTable {
    handles: HashMap<String, ContractHandle>,
    next_index: usize,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Bind `handle` under its name, returning the handle it replaced.
    pub fn insert(&mut self, handle: ContractHandle) -> Option<ContractHandle> {
        let name = handle.name.clone();
        info!(index = handle.index, name = %name, address = %handle.address, "contract registered");
        let previous = self.handles.insert(name, handle);
        if let Some(old) = &previous {
            warn!(name = %old.name, old_index = old.index, "contract name rebound");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&ContractHandle> {
        self.handles.get(name)
    }

    pub fn find(&self, lookup: &ContractLookup) -> Option<&ContractHandle> {
        match lookup {
            ContractLookup::Name(name) => self.handles.get(name),
            ContractLookup::Index(index) => self.handles.values().find(|h| h.index == *index),
            ContractLookup::Address(address) => {
                self.handles.values().find(|h| h.address == *address)
            }
        }
    }

    /// Like [`find`](Self::find) but a miss is an error.
    pub fn require(&self, lookup: &ContractLookup) -> Result<&ContractHandle> {
        self.find(lookup)
            .ok_or_else(|| ChainError::NotFound(lookup.to_string()))
    }

    /// Handles ordered by index.
    pub fn handles(&self) -> Vec<&ContractHandle> {
        let mut handles: Vec<&ContractHandle> = self.handles.values().collect();
        handles.sort_by_key(|h| h.index);
        handles
    }

    /// Summaries ordered by index, each with its live balance.
    pub async fn summaries(&self) -> Result<Vec<ContractSummary>> {
        let mut summaries = Vec::with_capacity(self.handles.len());
        for handle in self.handles() {
            let mut summary = handle.summary();
            summary.balance = Some(handle.balance().await?);
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::U256;

    use super::*;
    use crate::abi::MethodTable;
    use crate::proxy::DeployType;
    use crate::rpc::mock::MockProvider;
    use crate::signer::{Signer, WaitConfig};

    fn handle(table: &mut ContractTable, name: &str, address: Address, mock: &Arc<MockProvider>) -> ContractHandle {
        ContractHandle {
            index: table.allocate_index(),
            name: name.into(),
            address,
            chain: "unknown".into(),
            chain_id: 1337,
            deploy_type: DeployType::Deployed,
            provider: mock.clone(),
            signer: Signer::Node(Address::ZERO),
            methods: MethodTable::default(),
            wait: WaitConfig::default(),
        }
    }

    #[test]
    fn lookup_parsing() {
        assert_eq!("3".parse::<ContractLookup>().unwrap(), ContractLookup::Index(3));
        assert!(matches!(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse::<ContractLookup>(),
            Ok(ContractLookup::Address(_))
        ));
        assert_eq!(
            "Token".parse::<ContractLookup>().unwrap(),
            ContractLookup::Name("Token".into())
        );
        assert!(matches!("  ".parse::<ContractLookup>(), Err(ChainError::EmptyName)));
    }

    #[test]
    fn rebinding_a_name_keeps_indices_monotonic() {
        let mock = Arc::new(MockProvider::new(1337));
        let mut table = ContractTable::new();
        let first = handle(&mut table, "Token", Address::repeat_byte(1), &mock);
        table.insert(first);
        let second = handle(&mut table, "Token", Address::repeat_byte(2), &mock);
        let replaced = table.insert(second).unwrap();

        assert_eq!(replaced.index, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Token").unwrap().index, 1);
        assert!(table.find(&ContractLookup::Index(0)).is_none());
        assert!(table
            .find(&ContractLookup::Address(Address::repeat_byte(2)))
            .is_some());
        assert!(matches!(
            table.require(&ContractLookup::Name("Vault".into())),
            Err(ChainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn summaries_are_ordered_with_balances() {
        let mock = Arc::new(MockProvider::new(1337));
        mock.state().balances.insert(Address::repeat_byte(2), U256::from(9));
        let mut table = ContractTable::new();
        let a = handle(&mut table, "B", Address::repeat_byte(1), &mock);
        let b = handle(&mut table, "A", Address::repeat_byte(2), &mock);
        table.insert(b);
        table.insert(a);

        let summaries = table.summaries().await.unwrap();
        assert_eq!(summaries[0].name, "B");
        assert_eq!(summaries[1].name, "A");
        assert_eq!(summaries[1].balance, Some(U256::from(9)));
    }
}
