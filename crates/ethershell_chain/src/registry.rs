//! The account registry: one ordered arena of [`AccountRecord`]s whose
//! position is the account index, plus the default-account snapshot.
//!
//! Every mutation rewrites `wallets.json` and the `defaultWallet` entry of
//! `config.json` before returning.

use std::collections::HashSet;

use alloy::primitives::Address;
use tracing::{debug, info, warn};

use crate::account::{
    AccountRecord, AccountSelector, AccountType, AccountView, ContractRef, UNSAFE_WARNING,
};
use crate::error::{ChainError, Result};
use crate::keys;
use crate::rpc::RpcProvider;
use crate::signer::Signer;
use crate::store::RegistryStore;

/// Default number of children derived from a mnemonic.
pub const DEFAULT_HD_COUNT: u32 = 10;

/// A view of the registry together with the development-only warning.
#[derive(Debug, Clone)]
pub struct AccountListing {
    pub warning: &'static str,
    pub accounts: Vec<AccountRecord>,
}

pub struct AccountRegistry {
    accounts: Vec<AccountRecord>,
    default: Option<AccountRecord>,
    store: RegistryStore,
    strict_selectors: bool,
}

impl AccountRegistry {
    /// Load accounts and the default pointer from `store`.
    ///
    /// A stored default that no longer matches any account is dropped; when
    /// there is no default and accounts exist, account 0 becomes the default.
    pub fn open(store: RegistryStore) -> Result<Self> {
        let accounts = store.load_accounts()?;
        let config = store.load_config()?;
        let mut registry = Self {
            accounts,
            default: config.default_wallet,
            store,
            strict_selectors: config.strict_selectors,
        };
        let stored_default = registry.default.as_ref().map(|d| d.address);
        registry.refresh_default();
        registry.ensure_default();
        if registry.default.as_ref().map(|d| d.address) != stored_default {
            registry.commit()?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AccountRecord> {
        self.accounts.get(index)
    }

    pub fn accounts(&self) -> &[AccountRecord] {
        &self.accounts
    }

    pub fn strict_selectors(&self) -> bool {
        self.strict_selectors
    }

    pub fn set_strict_selectors(&mut self, strict: bool) {
        self.strict_selectors = strict;
    }

    pub fn find_by_address(&self, address: Address) -> Option<&AccountRecord> {
        self.accounts.iter().find(|a| a.address == address)
    }

    fn position_of_key(&self, normalized: &str) -> Option<usize> {
        self.accounts
            .iter()
            .position(|a| a.private_key.as_deref() == Some(normalized))
    }

    fn position_of_address(&self, address: Address) -> Option<usize> {
        self.accounts.iter().position(|a| a.address == address)
    }

    fn position_of_phrase(&self, normalized: &str) -> Option<usize> {
        self.accounts
            .iter()
            .position(|a| a.phrase.as_deref() == Some(normalized))
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    pub fn add_from_key(&mut self, key: &str) -> Result<AccountRecord> {
        let mut added = self.add_from_keys(&[key])?;
        added
            .pop()
            .ok_or_else(|| ChainError::Validation("no private key given".into()))
    }

    /// Import a batch of private keys. Nothing is inserted unless every key
    /// is valid and new.
    pub fn add_from_keys<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<Vec<AccountRecord>> {
        if keys.is_empty() {
            return Err(ChainError::Validation("no private keys given".into()));
        }

        let base = self.accounts.len();
        let mut seen: Vec<String> = Vec::with_capacity(keys.len());
        let mut records = Vec::with_capacity(keys.len());
        for raw in keys {
            let key = keys::normalize_private_key(raw.as_ref())?;
            if let Some(index) = self.position_of_key(&key) {
                return Err(ChainError::DuplicateKey { index });
            }
            if let Some(offset) = seen.iter().position(|k| *k == key) {
                return Err(ChainError::DuplicateKey {
                    index: base + offset,
                });
            }
            let address = keys::address_of(&key)?;
            // A node-managed record may already hold this address.
            if let Some(index) = self.position_of_address(address) {
                return Err(ChainError::DuplicateKey { index });
            }
            records.push(AccountRecord::imported(base + seen.len(), address, key.clone()));
            seen.push(key);
        }

        self.append(records)
    }

    /// Import `count` children of `phrase` along `m/44'/60'/0'/0/{i}`.
    pub fn add_from_mnemonic(&mut self, phrase: &str, count: u32) -> Result<Vec<AccountRecord>> {
        if phrase.trim().is_empty() {
            return Err(ChainError::Validation("mnemonic phrase is empty".into()));
        }
        let phrase = keys::normalize_mnemonic(phrase)?;
        if let Some(index) = self.position_of_phrase(&phrase) {
            return Err(ChainError::DuplicatePhrase { index });
        }
        let records = self.derive_records(&phrase, count, AccountType::UserImported)?;
        self.append(records)
    }

    /// `count` fresh random keys.
    pub fn create_random(&mut self, count: u32) -> Result<Vec<AccountRecord>> {
        check_count(count)?;
        let base = self.accounts.len();
        let records = (0..count as usize)
            .map(|offset| {
                let (key, address) = keys::random_key();
                AccountRecord::generated(base + offset, address, key)
            })
            .collect();
        self.append(records)
    }

    /// A fresh 12-word mnemonic and `count` of its children.
    pub fn create_random_hd(&mut self, count: u32) -> Result<Vec<AccountRecord>> {
        let phrase = keys::generate_mnemonic()?;
        let records = self.derive_records(&phrase, count, AccountType::UserGenerated)?;
        self.append(records)
    }

    /// Register every node-held account that is not already known.
    pub async fn connect_node_accounts(
        &mut self,
        provider: &dyn RpcProvider,
    ) -> Result<Vec<AccountRecord>> {
        let remote = provider.list_accounts().await?;
        let base = self.accounts.len();
        let mut records: Vec<AccountRecord> = Vec::new();
        for address in remote {
            if self.find_by_address(address).is_some()
                || records.iter().any(|r| r.address == address)
            {
                continue;
            }
            records.push(AccountRecord::node_managed(base + records.len(), address));
        }
        if records.is_empty() {
            info!(url = provider.url(), "no new node accounts");
            return Ok(records);
        }
        self.append(records)
    }

    fn derive_records(
        &self,
        phrase: &str,
        count: u32,
        kind: AccountType,
    ) -> Result<Vec<AccountRecord>> {
        check_count(count)?;
        let base = self.accounts.len();
        keys::derive_children(phrase, 0, count)?
            .into_iter()
            .enumerate()
            .map(|(offset, key)| {
                if let Some(index) = self
                    .position_of_key(&key.private_key)
                    .or_else(|| self.position_of_address(key.address))
                {
                    return Err(ChainError::DuplicateKey { index });
                }
                Ok(AccountRecord::hd(base + offset, phrase.to_string(), key, kind))
            })
            .collect()
    }

    fn append(&mut self, records: Vec<AccountRecord>) -> Result<Vec<AccountRecord>> {
        self.accounts.extend(records.iter().cloned());
        self.ensure_default();
        self.commit()?;
        for record in &records {
            info!(index = record.index, address = %record.address, kind = %record.kind, "account added");
        }
        warn!("{UNSAFE_WARNING}");
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn list(&self, view: AccountView) -> AccountListing {
        let accounts = self
            .accounts
            .iter()
            .filter(|a| match view {
                AccountView::All => true,
                AccountView::Flat => !a.is_hd(),
                AccountView::Hd => a.is_hd(),
            })
            .cloned()
            .collect();
        warn!("{UNSAFE_WARNING}");
        AccountListing {
            warning: UNSAFE_WARNING,
            accounts,
        }
    }

    /// Refresh cached nonce and balance from the node for the selected
    /// accounts.
    pub async fn info(
        &mut self,
        selector: &AccountSelector,
        provider: &dyn RpcProvider,
    ) -> Result<Vec<AccountRecord>> {
        if *selector == AccountSelector::All {
            return Err(ChainError::Validation(
                "select an index, address or mnemonic to inspect".into(),
            ));
        }
        let indices = self.select(selector)?;
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut refreshed = Vec::with_capacity(indices.len());
        for index in indices {
            let address = self.accounts[index].address;
            let nonce = provider.get_transaction_count(address).await?;
            let balance = provider.get_balance(address).await?;
            let record = &mut self.accounts[index];
            record.nonce = Some(nonce);
            record.balance = Some(balance);
            debug!(index, %address, nonce, %balance, "account refreshed");
            refreshed.push(record.clone());
        }
        self.commit()?;
        Ok(refreshed)
    }

    pub fn default_account(&self) -> Option<&AccountRecord> {
        self.default.as_ref()
    }

    /// Point the default at an index, an address or a private key. An
    /// unregistered key is imported first; a registered one is a
    /// `DuplicateKey`, select it by index or address instead.
    pub fn set_default(&mut self, selector: &AccountSelector) -> Result<Option<AccountRecord>> {
        let index = match selector {
            AccountSelector::Index(_) | AccountSelector::Address(_) => {
                match self.select(selector)?.first() {
                    Some(&index) => index,
                    None => return Ok(None),
                }
            }
            AccountSelector::PrivateKey(raw) => {
                let key = keys::normalize_private_key(raw)?;
                if let Some(index) = self.position_of_key(&key) {
                    return Err(ChainError::DuplicateKey { index });
                }
                self.add_from_key(&key)?.index
            }
            other => {
                return Err(ChainError::Validation(format!(
                    "the default account must be an index, address or private key, not {other}"
                )));
            }
        };

        self.default = Some(self.accounts[index].clone());
        self.commit()?;
        info!(index, address = %self.accounts[index].address, "default account changed");
        Ok(self.default.clone())
    }

    /// The account a command acts as: the selected one, or the default.
    pub fn resolve_account(&self, selector: Option<&AccountSelector>) -> Result<&AccountRecord> {
        let Some(selector) = selector else {
            return self.default.as_ref().ok_or_else(|| {
                ChainError::Validation("no default account; add a wallet or pass an account".into())
            });
        };
        let index = match selector {
            AccountSelector::Index(index) => {
                if *index >= self.accounts.len() {
                    return Err(ChainError::IndexOutOfRange {
                        index: *index,
                        len: self.accounts.len(),
                    });
                }
                *index
            }
            AccountSelector::Address(address) => self
                .find_by_address(*address)
                .map(|a| a.index)
                .ok_or_else(|| ChainError::UnknownSigner(address.to_string()))?,
            AccountSelector::PrivateKey(raw) => {
                let key = keys::normalize_private_key(raw)?;
                self.position_of_key(&key)
                    .ok_or_else(|| ChainError::UnknownSigner("given private key".into()))?
            }
            other => {
                return Err(ChainError::Validation(format!(
                    "a single account is required, not {other}"
                )));
            }
        };
        Ok(&self.accounts[index])
    }

    /// Per-call signer for a `from` override. Only accounts with a local key
    /// qualify.
    pub fn signer_for(&self, from: Address) -> Result<Signer> {
        let record = self
            .find_by_address(from)
            .ok_or_else(|| ChainError::UnknownSigner(from.to_string()))?;
        match &record.private_key {
            Some(key) => Ok(Signer::Local(keys::signer_from_key(key)?)),
            None => Err(ChainError::SignerNotAvailable(from.to_string())),
        }
    }

    /// Record a deployed or attached contract on an account.
    pub fn push_contract(&mut self, index: usize, contract: ContractRef) -> Result<()> {
        let len = self.accounts.len();
        let record = self
            .accounts
            .get_mut(index)
            .ok_or(ChainError::IndexOutOfRange { index, len })?;
        record.contracts.push(contract);
        self.commit()
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the selected accounts and return them in removal order
    /// (highest index first). Remaining accounts are re-indexed densely.
    pub fn remove(&mut self, selector: &AccountSelector) -> Result<Vec<AccountRecord>> {
        if *selector == AccountSelector::All {
            let removed: Vec<AccountRecord> = self.accounts.drain(..).rev().collect();
            self.default = None;
            self.commit()?;
            info!(count = removed.len(), "all accounts removed");
            return Ok(removed);
        }

        let mut indices = self.select(selector)?;
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let removed: Vec<AccountRecord> = indices
            .into_iter()
            .map(|index| self.accounts.remove(index))
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        self.reindex();
        self.commit()?;
        for record in &removed {
            info!(index = record.index, address = %record.address, "account removed");
        }
        Ok(removed)
    }

    /// Rewrite both documents from memory.
    pub fn flush(&mut self) -> Result<()> {
        self.commit()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Resolve a selector to existing indices, ascending and unique. Misses
    /// are logged and skipped, or rejected in strict mode.
    fn select(&self, selector: &AccountSelector) -> Result<Vec<usize>> {
        let found: Vec<usize> = match selector {
            AccountSelector::All => (0..self.accounts.len()).collect(),
            AccountSelector::Index(index) => {
                if *index < self.accounts.len() {
                    vec![*index]
                } else {
                    self.miss(selector)?;
                    Vec::new()
                }
            }
            AccountSelector::Indices(list) => {
                if list.is_empty() {
                    return Err(ChainError::Validation("empty list of account indices".into()));
                }
                let mut unique = HashSet::new();
                let mut found = Vec::new();
                for &index in list {
                    if index >= self.accounts.len() {
                        self.miss(&AccountSelector::Index(index))?;
                    } else if unique.insert(index) {
                        found.push(index);
                    }
                }
                found.sort_unstable();
                found
            }
            AccountSelector::Address(address) => match self.find_by_address(*address) {
                Some(record) => vec![record.index],
                None => {
                    self.miss(selector)?;
                    Vec::new()
                }
            },
            AccountSelector::Phrase(raw) => {
                let phrase = keys::normalize_mnemonic(raw)?;
                let found: Vec<usize> = self
                    .accounts
                    .iter()
                    .filter(|a| a.phrase.as_deref() == Some(phrase.as_str()))
                    .map(|a| a.index)
                    .collect();
                if found.is_empty() {
                    self.miss(selector)?;
                }
                found
            }
            AccountSelector::PrivateKey(raw) => {
                let key = keys::normalize_private_key(raw)?;
                match self.position_of_key(&key) {
                    Some(index) => vec![index],
                    None => {
                        self.miss(selector)?;
                        Vec::new()
                    }
                }
            }
        };
        Ok(found)
    }

    fn miss(&self, selector: &AccountSelector) -> Result<()> {
        if self.strict_selectors {
            return Err(ChainError::NotFound(selector.to_string()));
        }
        debug!(%selector, "selector matched no account");
        Ok(())
    }

    fn reindex(&mut self) {
        for (position, record) in self.accounts.iter_mut().enumerate() {
            record.index = position;
        }
    }

    /// Re-point the default snapshot at the live record with the same
    /// address, or clear it if that account is gone.
    fn refresh_default(&mut self) {
        if let Some(current) = &self.default {
            let address = current.address;
            self.default = self.find_by_address(address).cloned();
            if self.default.is_none() {
                info!(%address, "default account cleared");
            }
        }
    }

    fn ensure_default(&mut self) {
        if self.default.is_none() {
            self.default = self.accounts.first().cloned();
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.refresh_default();
        self.store.save_accounts(&self.accounts)?;
        self.store.save_default(self.default.as_ref())
    }
}

fn check_count(count: u32) -> Result<()> {
    if count == 0 {
        return Err(ChainError::Validation("count must be at least 1".into()));
    }
    Ok(())
}
