//! Deploying new contracts and attaching to existing ones.

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{Address, TxKind};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use ethershell_core::NetworkSettings;
use serde_json::Value;
use tracing::info;

use crate::abi::MethodTable;
use crate::account::{AccountSelector, ContractRef};
use crate::artifacts::{ArtifactIndex, load_abi, load_bytecode};
use crate::contracts::ContractTable;
use crate::error::{ChainError, Result};
use crate::proxy::{ContractHandle, ContractSummary, DeployType};
use crate::registry::AccountRegistry;
use crate::rpc::{Connector, RpcProvider};
use crate::signer::{Signer, WaitConfig};

#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub name: String,
    pub constructor_args: Vec<Value>,
    /// Deploying account; the default account when absent.
    pub account: Option<AccountSelector>,
    pub rpc_url: Option<String>,
    pub abi_path: Option<PathBuf>,
    pub bytecode_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct AttachRequest {
    pub name: String,
    pub address: String,
    pub account: Option<AccountSelector>,
    pub abi_path: Option<PathBuf>,
    pub rpc_url: Option<String>,
}

/// Borrowed view of the session state a deployment touches.
pub struct Orchestrator<'a> {
    pub registry: &'a mut AccountRegistry,
    pub contracts: &'a mut ContractTable,
    pub artifacts: &'a ArtifactIndex,
    pub provider: Arc<dyn RpcProvider>,
    pub connector: &'a dyn Connector,
    pub settings: &'a NetworkSettings,
}

/// Account index and signer chosen for a deploy or attach.
struct Binding {
    index: usize,
    signer: Signer,
    provider: Arc<dyn RpcProvider>,
}

impl Orchestrator<'_> {
    pub async fn deploy(&mut self, request: DeployRequest) -> Result<ContractSummary> {
        let name = checked_name(&request.name)?;
        let binding = self.bind(request.account.as_ref(), request.rpc_url.as_deref())?;

        let abi_path = self.artifact_path(name, request.abi_path, |p| &p.abi);
        let abi_path = abi_path.ok_or_else(|| ChainError::MissingAbi(name.to_string()))?;
        let bytecode_path = self.artifact_path(name, request.bytecode_path, |p| &p.bytecode);
        let bytecode_path =
            bytecode_path.ok_or_else(|| ChainError::MissingBytecode(name.to_string()))?;

        let methods = MethodTable::from_abi(&load_abi(&abi_path)?);
        let code = methods.encode_deploy(&load_bytecode(&bytecode_path)?, &request.constructor_args)?;
        let network = binding.provider.get_network().await?;

        let tx = TransactionRequest {
            to: Some(TxKind::Create),
            input: TransactionInput::both(code),
            ..Default::default()
        };
        let pending = binding
            .signer
            .send_transaction(&binding.provider, tx, WaitConfig::from(self.settings))
            .await?;
        let tx_hash = pending.hash();
        let receipt = pending.wait().await?;
        let address = receipt.contract_address.ok_or_else(|| {
            ChainError::Network(format!("receipt for {tx_hash} carries no contract address"))
        })?;
        let transaction = binding.provider.get_transaction(tx_hash).await?;

        info!(name, %address, %tx_hash, chain_id = network.chain_id, "contract deployed");
        let mut summary = self.register(
            name,
            address,
            DeployType::Deployed,
            binding,
            methods,
            network.name,
            network.chain_id,
        )?;
        summary.tx_hash = Some(tx_hash);
        summary.transaction = transaction;
        Ok(summary)
    }

    pub async fn attach(&mut self, request: AttachRequest) -> Result<ContractSummary> {
        let name = checked_name(&request.name)?;
        let raw_address = request.address.trim();
        if raw_address.is_empty() {
            return Err(ChainError::MissingAddress);
        }
        let address: Address = raw_address
            .parse()
            .map_err(|_| ChainError::Validation(format!("`{raw_address}` is not an address")))?;
        let binding = self.bind(request.account.as_ref(), request.rpc_url.as_deref())?;

        let abi_path = self
            .artifact_path(name, request.abi_path, |p| &p.abi)
            .ok_or_else(|| ChainError::MissingAbi(name.to_string()))?;
        let methods = MethodTable::from_abi(&load_abi(&abi_path)?);
        let network = binding.provider.get_network().await?;

        info!(name, %address, chain_id = network.chain_id, "contract attached");
        self.register(
            name,
            address,
            DeployType::PreDeployed,
            binding,
            methods,
            network.name,
            network.chain_id,
        )
    }

    fn bind(&self, account: Option<&AccountSelector>, rpc_url: Option<&str>) -> Result<Binding> {
        let record = self.registry.resolve_account(account)?;
        let provider = match rpc_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => self.connector.connect(url, self.settings)?,
            None => Arc::clone(&self.provider),
        };
        Ok(Binding {
            index: record.index,
            signer: Signer::from_record(record)?,
            provider,
        })
    }

    fn artifact_path(
        &self,
        name: &str,
        explicit: Option<PathBuf>,
        pick: impl Fn(&crate::artifacts::ArtifactPaths) -> &PathBuf,
    ) -> Option<PathBuf> {
        explicit.or_else(|| self.artifacts.get(name).map(|paths| pick(paths).clone()))
    }

    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        name: &str,
        address: Address,
        deploy_type: DeployType,
        binding: Binding,
        methods: MethodTable,
        chain: String,
        chain_id: u64,
    ) -> Result<ContractSummary> {
        self.registry.push_contract(
            binding.index,
            ContractRef {
                address,
                deployed_on: chain.clone(),
                chain_id,
            },
        )?;
        let handle = ContractHandle {
            index: self.contracts.allocate_index(),
            name: name.to_string(),
            address,
            chain,
            chain_id,
            deploy_type,
            provider: binding.provider,
            signer: binding.signer,
            methods,
            wait: WaitConfig::from(self.settings),
        };
        let summary = handle.summary();
        self.contracts.insert(handle);
        Ok(summary)
    }
}

fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChainError::EmptyName);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::artifacts::ArtifactPaths;
    use crate::rpc::mock::MockProvider;
    use crate::store::RegistryStore;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"supply","type":"uint256"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
    ]"#;

    struct MockConnector(Arc<MockProvider>);

    impl Connector for MockConnector {
        fn connect(&self, _url: &str, _settings: &NetworkSettings) -> Result<Arc<dyn RpcProvider>> {
            Ok(self.0.clone())
        }
    }

    struct Env {
        tmp: tempfile::TempDir,
        registry: AccountRegistry,
        contracts: ContractTable,
        artifacts: ArtifactIndex,
        mock: Arc<MockProvider>,
        other: Arc<MockProvider>,
        settings: NetworkSettings,
    }

    impl Env {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let dir = tmp.path();
            let registry = AccountRegistry::open(RegistryStore::with_paths(
                dir.join("wallets.json"),
                dir.join("config.json"),
            ))
            .unwrap();
            fs::write(dir.join("Token.abi.json"), ABI).unwrap();
            fs::write(dir.join("Token.bin"), "0x6080").unwrap();
            let mut artifacts = ArtifactIndex::open(dir.join("artifacts.json")).unwrap();
            artifacts
                .register(
                    "Token",
                    ArtifactPaths {
                        abi: dir.join("Token.abi.json"),
                        bytecode: dir.join("Token.bin"),
                        metadata: None,
                    },
                )
                .unwrap();
            Self {
                tmp,
                registry,
                contracts: ContractTable::new(),
                artifacts,
                mock: Arc::new(MockProvider::new(31337)),
                other: Arc::new(MockProvider::new(11155111)),
                settings: NetworkSettings {
                    confirmation_timeout_secs: 1,
                    poll_interval_ms: 10,
                    ..NetworkSettings::default()
                },
            }
        }

        fn dir(&self) -> &Path {
            self.tmp.path()
        }

        async fn deploy(&mut self, request: DeployRequest) -> Result<ContractSummary> {
            let connector = MockConnector(self.other.clone());
            Orchestrator {
                registry: &mut self.registry,
                contracts: &mut self.contracts,
                artifacts: &self.artifacts,
                provider: self.mock.clone(),
                connector: &connector,
                settings: &self.settings,
            }
            .deploy(request)
            .await
        }

        async fn attach(&mut self, request: AttachRequest) -> Result<ContractSummary> {
            let connector = MockConnector(self.other.clone());
            Orchestrator {
                registry: &mut self.registry,
                contracts: &mut self.contracts,
                artifacts: &self.artifacts,
                provider: self.mock.clone(),
                connector: &connector,
                settings: &self.settings,
            }
            .attach(request)
            .await
        }
    }

    fn token(args: Vec<Value>) -> DeployRequest {
        DeployRequest {
            name: "Token".into(),
            constructor_args: args,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deploy_registers_handle_and_contract_ref() {
        let mut env = Env::new();
        let account = env.registry.add_from_key(KEY).unwrap();

        let summary = env.deploy(token(vec![serde_json::json!(1000)])).await.unwrap();
        assert_eq!(summary.index, 0);
        assert_eq!(summary.deploy_type, DeployType::Deployed);
        assert_eq!(summary.from, account.address);
        assert_eq!(summary.address, account.address.create(0));
        assert_eq!(summary.chain_id, 31337);
        assert!(summary.tx_hash.is_some());
        assert!(summary.transaction.is_some());

        let refs = &env.registry.get(0).unwrap().contracts;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].address, summary.address);
        assert!(env.contracts.get("Token").is_some());

        let estimate = &env.mock.state().estimates[0];
        assert_eq!(estimate.to, Some(TxKind::Create));
        assert_eq!(estimate.input.input().unwrap().len(), 2 + 32);
    }

    #[tokio::test]
    async fn deploy_preconditions() {
        let mut env = Env::new();
        env.registry.add_from_key(KEY).unwrap();

        let mut request = token(vec![]);
        request.name = " ".into();
        assert!(matches!(env.deploy(request).await, Err(ChainError::EmptyName)));

        let mut request = token(vec![serde_json::json!(1)]);
        request.account = Some(AccountSelector::Index(4));
        assert!(matches!(
            env.deploy(request).await,
            Err(ChainError::IndexOutOfRange { index: 4, len: 1 })
        ));

        let mut request = token(vec![]);
        request.name = "Vault".into();
        assert!(matches!(env.deploy(request).await, Err(ChainError::MissingAbi(_))));

        let mut request = token(vec![]);
        request.name = "Vault".into();
        request.abi_path = Some(env.dir().join("Token.abi.json"));
        assert!(matches!(
            env.deploy(request).await,
            Err(ChainError::MissingBytecode(_))
        ));
        assert!(env.contracts.is_empty());
    }

    #[tokio::test]
    async fn deploy_override_url_uses_other_network() {
        let mut env = Env::new();
        env.registry.add_from_key(KEY).unwrap();
        let mut request = token(vec![serde_json::json!(1)]);
        request.rpc_url = Some("http://sepolia.example".into());

        let summary = env.deploy(request).await.unwrap();
        assert_eq!(summary.chain, "sepolia");
        assert_eq!(env.other.state().raw_transactions.len(), 1);
        assert!(env.mock.state().raw_transactions.is_empty());
    }

    #[tokio::test]
    async fn attach_registers_pre_deployed() {
        let mut env = Env::new();
        env.registry.add_from_key(KEY).unwrap();

        let missing = AttachRequest {
            name: "Token".into(),
            ..Default::default()
        };
        assert!(matches!(env.attach(missing).await, Err(ChainError::MissingAddress)));

        let target = Address::repeat_byte(0xab);
        let first = env
            .attach(AttachRequest {
                name: "Token".into(),
                address: target.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = env
            .attach(AttachRequest {
                name: "Token".into(),
                address: target.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(first.deploy_type, DeployType::PreDeployed);
        assert_eq!(second.index, 1);
        assert_eq!(env.contracts.len(), 1);
        assert_eq!(env.registry.get(0).unwrap().contracts.len(), 2);
    }
}
