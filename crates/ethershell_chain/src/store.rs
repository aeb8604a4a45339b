use std::path::{Path, PathBuf};

use ethershell_core::{
    CompilerConfig, DEFAULT_PROVIDER_URL, NetworkSettings, ShellHome, read_json, write_json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::account::AccountRecord;
use crate::error::Result;

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigDocument {
    pub provider_endpoint: String,
    /// Full snapshot of the default account; `{}` on disk when unset.
    #[serde(with = "default_wallet")]
    pub default_wallet: Option<AccountRecord>,
    pub compiler: CompilerConfig,
    pub network: NetworkSettings,
    /// Turn selector misses into `NotFound` errors instead of no-ops.
    pub strict_selectors: bool,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            provider_endpoint: DEFAULT_PROVIDER_URL.into(),
            default_wallet: None,
            compiler: CompilerConfig::default(),
            network: NetworkSettings::default(),
            strict_selectors: false,
        }
    }
}

mod default_wallet {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::account::AccountRecord;

    pub fn serialize<S: Serializer>(value: &Option<AccountRecord>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(record) => record.serialize(s),
            None => serde_json::Map::new().serialize(s),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AccountRecord>, D::Error> {
        let raw = serde_json::Value::deserialize(d)?;
        match &raw {
            serde_json::Value::Object(map) if map.contains_key("address") => {
                serde_json::from_value(raw).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

/// Durable home of the account list and the default-account pointer.
///
/// Both documents are rewritten in full on every change.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    wallets_path: PathBuf,
    config_path: PathBuf,
}

impl RegistryStore {
    pub fn new(home: &ShellHome) -> Self {
        Self::with_paths(home.wallets_path(), home.config_path())
    }

    pub fn with_paths(wallets_path: PathBuf, config_path: PathBuf) -> Self {
        Self {
            wallets_path,
            config_path,
        }
    }

    pub fn wallets_path(&self) -> &Path {
        &self.wallets_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the account list. A missing file yields an empty registry; stored
    /// indices are replaced by positions so the list is always dense.
    pub fn load_accounts(&self) -> Result<Vec<AccountRecord>> {
        let Some(mut accounts) = read_json::<Vec<AccountRecord>>(&self.wallets_path)? else {
            info!(path = %self.wallets_path.display(), "wallet store not found, starting empty");
            return Ok(Vec::new());
        };
        for (position, record) in accounts.iter_mut().enumerate() {
            if record.index != position {
                warn!(stored = record.index, position, "re-indexing stored account");
                record.index = position;
            }
        }
        info!(path = %self.wallets_path.display(), count = accounts.len(), "wallet store loaded");
        Ok(accounts)
    }

    pub fn save_accounts(&self, accounts: &[AccountRecord]) -> Result<()> {
        write_json(&self.wallets_path, &accounts, true)?;
        info!(count = accounts.len(), "wallet store saved");
        Ok(())
    }

    /// Load `config.json`, falling back to defaults when it does not exist.
    pub fn load_config(&self) -> Result<ConfigDocument> {
        Ok(read_json(&self.config_path)?.unwrap_or_default())
    }

    pub fn save_config(&self, config: &ConfigDocument) -> Result<()> {
        write_json(&self.config_path, config, true)?;
        Ok(())
    }

    /// Read-modify-write of the config document.
    pub fn update_config<F>(&self, apply: F) -> Result<ConfigDocument>
    where
        F: FnOnce(&mut ConfigDocument),
    {
        let mut config = self.load_config()?;
        apply(&mut config);
        self.save_config(&config)?;
        Ok(config)
    }

    pub fn save_default(&self, default: Option<&AccountRecord>) -> Result<()> {
        self.update_config(|config| config.default_wallet = default.cloned())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::keys;

    fn store_in(dir: &Path) -> RegistryStore {
        RegistryStore::with_paths(dir.join("wallets.json"), dir.join("config.json"))
    }

    #[test]
    fn missing_files_give_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        assert!(store.load_accounts().unwrap().is_empty());
        let config = store.load_config().unwrap();
        assert_eq!(config.provider_endpoint, DEFAULT_PROVIDER_URL);
        assert!(config.default_wallet.is_none());
    }

    #[test]
    fn empty_default_is_written_as_empty_object() {
        let json = serde_json::to_value(ConfigDocument::default()).unwrap();
        assert_eq!(json["defaultWallet"], serde_json::json!({}));
        assert_eq!(json["providerEndpoint"], DEFAULT_PROVIDER_URL);
        assert_eq!(json["compiler"]["optimizerRuns"], 200);
    }

    #[test]
    fn config_without_newer_sections_still_loads() {
        let raw = r#"{ "providerEndpoint": "http://localhost:7545", "defaultWallet": {}, "compiler": { "version": "0.8.26" } }"#;
        let config: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(config.provider_endpoint, "http://localhost:7545");
        assert_eq!(config.compiler.version, "0.8.26");
        assert_eq!(config.network, NetworkSettings::default());
        assert!(!config.strict_selectors);
    }

    #[test]
    fn accounts_round_trip_preserves_secrets_and_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let (k0, a0) = keys::random_key();
        let (k1, a1) = keys::random_key();
        let accounts = vec![
            AccountRecord::imported(0, a0, k0.clone()),
            AccountRecord::generated(1, a1, k1.clone()),
            AccountRecord::node_managed(2, alloy::primitives::Address::repeat_byte(7)),
        ];
        store.save_accounts(&accounts).unwrap();

        let loaded = store.load_accounts().unwrap();
        assert_eq!(loaded, accounts);
        assert_eq!(loaded[0].private_key.as_deref(), Some(k0.as_str()));
        assert_eq!(loaded[1].kind, AccountType::UserGenerated);
        assert_eq!(loaded[2].kind, AccountType::NodeManaged);
    }

    #[test]
    fn load_repairs_sparse_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let (k, a) = keys::random_key();
        store
            .save_accounts(&[AccountRecord::imported(5, a, k)])
            .unwrap();
        assert_eq!(store.load_accounts().unwrap()[0].index, 0);
    }

    #[test]
    fn save_default_keeps_other_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store
            .update_config(|c| c.provider_endpoint = "http://10.0.0.2:8545".into())
            .unwrap();

        let (k, a) = keys::random_key();
        let record = AccountRecord::imported(0, a, k);
        store.save_default(Some(&record)).unwrap();

        let config = store.load_config().unwrap();
        assert_eq!(config.provider_endpoint, "http://10.0.0.2:8545");
        assert_eq!(config.default_wallet, Some(record));

        store.save_default(None).unwrap();
        assert!(store.load_config().unwrap().default_wallet.is_none());
    }
}
