//! The shell session: owns the registry, the contract table, the artifact
//! index and the current provider, and hands them to the orchestrator and
//! the proxy one command at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethershell_core::{CompilerConfig, DEFAULT_PROVIDER_URL, ShellHome, validate_url};
use serde_json::Value;
use tracing::{info, warn};

use crate::account::{AccountRecord, AccountSelector};
use crate::artifacts::{ArtifactIndex, Compiler};
use crate::contracts::{ContractLookup, ContractTable};
use crate::deploy::{AttachRequest, DeployRequest, Orchestrator};
use crate::error::{ChainError, Result};
use crate::proxy::{CallOutcome, ContractSummary};
use crate::registry::AccountRegistry;
use crate::rpc::{Connector, NetworkInfo, RpcProvider};
use crate::store::{ConfigDocument, RegistryStore};

pub struct Shell {
    store: RegistryStore,
    registry: AccountRegistry,
    contracts: ContractTable,
    artifacts: ArtifactIndex,
    connector: Arc<dyn Connector>,
    provider: Arc<dyn RpcProvider>,
    config: ConfigDocument,
}

impl Shell {
    /// Load persisted state under `home` and connect to the configured
    /// endpoint. No network round-trip happens here.
    pub fn open(home: &ShellHome, connector: Arc<dyn Connector>) -> Result<Self> {
        home.ensure_dirs()?;
        let store = RegistryStore::new(home);
        let mut config = store.load_config()?;
        if !store.config_path().exists() {
            store.save_config(&config)?;
        }

        let provider = match connector.connect(&config.provider_endpoint, &config.network) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(
                    endpoint = %config.provider_endpoint,
                    error = %e,
                    "stored provider endpoint unusable, falling back to default"
                );
                config.provider_endpoint = DEFAULT_PROVIDER_URL.to_string();
                connector.connect(DEFAULT_PROVIDER_URL, &config.network)?
            }
        };

        let registry = AccountRegistry::open(store.clone())?;
        let artifacts = ArtifactIndex::open(home.artifacts_path())?;
        info!(
            home = %home.base_dir().display(),
            accounts = registry.len(),
            artifacts = artifacts.len(),
            endpoint = provider.url(),
            "shell opened"
        );
        Ok(Self {
            store,
            registry,
            contracts: ContractTable::new(),
            artifacts,
            connector,
            provider,
            config,
        })
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AccountRegistry {
        &mut self.registry
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    pub fn artifacts(&self) -> &ArtifactIndex {
        &self.artifacts
    }

    pub fn provider(&self) -> &Arc<dyn RpcProvider> {
        &self.provider
    }

    pub fn default_provider_url() -> &'static str {
        DEFAULT_PROVIDER_URL
    }

    /// Switch to `url` once the node there answers, and persist it.
    pub async fn set_provider(&mut self, url: &str) -> Result<NetworkInfo> {
        let url = url.trim();
        if !validate_url(url) {
            return Err(ChainError::Validation(format!(
                "`{url}` is not a valid http(s) endpoint"
            )));
        }
        let provider = self.connector.connect(url, &self.config.network)?;
        let network = provider.get_network().await?;

        self.provider = provider;
        self.config = self
            .store
            .update_config(|config| config.provider_endpoint = url.to_string())?;
        info!(url, chain_id = network.chain_id, name = %network.name, "provider changed");
        Ok(network)
    }

    pub async fn network_info(&self) -> Result<NetworkInfo> {
        self.provider.get_network().await
    }

    /// The config document as stored, including the current default account.
    pub fn config_info(&self) -> Result<ConfigDocument> {
        self.store.load_config()
    }

    pub async fn connect_node_accounts(&mut self) -> Result<Vec<AccountRecord>> {
        self.registry
            .connect_node_accounts(self.provider.as_ref())
            .await
    }

    pub async fn account_info(&mut self, selector: &AccountSelector) -> Result<Vec<AccountRecord>> {
        self.registry.info(selector, self.provider.as_ref()).await
    }

    fn orchestrator(&mut self) -> Orchestrator<'_> {
        Orchestrator {
            registry: &mut self.registry,
            contracts: &mut self.contracts,
            artifacts: &self.artifacts,
            provider: Arc::clone(&self.provider),
            connector: self.connector.as_ref(),
            settings: &self.config.network,
        }
    }

    pub async fn deploy(&mut self, request: DeployRequest) -> Result<ContractSummary> {
        self.orchestrator().deploy(request).await
    }

    pub async fn attach(&mut self, request: AttachRequest) -> Result<ContractSummary> {
        self.orchestrator().attach(request).await
    }

    pub async fn invoke(
        &self,
        contract: &ContractLookup,
        method: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome> {
        self.contracts
            .require(contract)?
            .invoke(&self.registry, method, args)
            .await
    }

    pub async fn contract_summaries(&self) -> Result<Vec<ContractSummary>> {
        self.contracts.summaries().await
    }

    /// Compile `source` and record the produced artifacts.
    pub async fn compile(
        &mut self,
        compiler: &dyn Compiler,
        source: &Path,
        names: &[String],
    ) -> Result<Vec<String>> {
        let build_dir = PathBuf::from(&self.config.compiler.compile_path);
        let artifacts = compiler
            .compile(source, &build_dir, names, &self.config.compiler)
            .await?;
        let compiled = artifacts.iter().map(|a| a.name.clone()).collect();
        self.artifacts.record_compilation(artifacts)?;
        Ok(compiled)
    }

    pub fn compiler_config(&self) -> &CompilerConfig {
        &self.config.compiler
    }

    /// Change optimizer and IR settings for later compilations, and persist
    /// them.
    pub fn set_compiler_options(
        &mut self,
        optimizer: bool,
        via_ir: bool,
        optimizer_runs: u32,
    ) -> Result<CompilerConfig> {
        if optimizer_runs == 0 {
            return Err(ChainError::Validation(
                "optimizer runs must be a positive number".into(),
            ));
        }
        self.config = self.store.update_config(|config| {
            config.compiler.optimizer = optimizer;
            config.compiler.via_ir = via_ir;
            config.compiler.optimizer_runs = optimizer_runs;
        })?;
        info!(optimizer, via_ir, optimizer_runs, "compiler options updated");
        Ok(self.config.compiler.clone())
    }

    /// Register artifacts found in `dir`, or in the configured compile path.
    pub fn scan_build_dir(&mut self, dir: Option<&Path>) -> Result<Vec<String>> {
        let dir = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.config.compiler.compile_path));
        self.artifacts.scan_build_dir(&dir)
    }

    /// Write registry state to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.registry.flush()
    }
}
