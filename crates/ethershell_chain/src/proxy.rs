//! Contract handles and the shared call pipeline behind every method
//! invocation.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::abi::{CallDescriptor, DecodedLog, MethodTable, outputs_to_json};
use crate::error::Result;
use crate::options::split_options;
use crate::registry::AccountRegistry;
use crate::rpc::{Receipt, RpcProvider};
use crate::serialize::decimal_opt;
use crate::signer::{PendingTransaction, Signer, WaitConfig};

/// How a contract entered the contract table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployType {
    Deployed,
    PreDeployed,
}

impl fmt::Display for DeployType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployType::Deployed => "deployed",
            DeployType::PreDeployed => "pre-deployed",
        })
    }
}

/// What the shell prints about a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub index: usize,
    pub name: String,
    pub address: Address,
    pub chain: String,
    pub chain_id: u64,
    pub deploy_type: DeployType,
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Value>,
    #[serde(default, with = "decimal_opt", skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
}

/// Result of one proxied call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Decoded outputs of a `view`/`pure` call.
    Returned(Vec<DynSolValue>),
    /// Receipt of a mined state-changing call, with the logs the contract
    /// ABI could decode.
    Receipt {
        receipt: Receipt,
        events: Vec<DecodedLog>,
    },
}

impl CallOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            CallOutcome::Returned(values) => outputs_to_json(values),
            CallOutcome::Receipt { receipt, events } => {
                let mut json = serde_json::to_value(receipt).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut json {
                    map.insert(
                        "events".into(),
                        serde_json::to_value(events).unwrap_or_default(),
                    );
                }
                json
            }
        }
    }
}

/// Either an immediate value or a transaction still to be mined.
enum Dispatch {
    Resolved(Vec<DynSolValue>),
    Pending(PendingTransaction),
}

impl Dispatch {
    async fn settle(self, methods: &MethodTable) -> Result<CallOutcome> {
        match self {
            Dispatch::Resolved(values) => Ok(CallOutcome::Returned(values)),
            Dispatch::Pending(pending) => {
                let receipt = pending.wait().await?;
                let events = methods.decode_logs(&receipt.logs);
                Ok(CallOutcome::Receipt { receipt, events })
            }
        }
    }
}

/// A deployed or attached contract bound to a provider and a signer.
pub struct ContractHandle {
    pub index: usize,
    pub name: String,
    pub address: Address,
    pub chain: String,
    pub chain_id: u64,
    pub deploy_type: DeployType,
    pub(crate) provider: Arc<dyn RpcProvider>,
    pub(crate) signer: Signer,
    pub(crate) methods: MethodTable,
    pub(crate) wait: WaitConfig,
}

impl ContractHandle {
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn provider(&self) -> &Arc<dyn RpcProvider> {
        &self.provider
    }

    pub fn summary(&self) -> ContractSummary {
        ContractSummary {
            index: self.index,
            name: self.name.clone(),
            address: self.address,
            chain: self.chain.clone(),
            chain_id: self.chain_id,
            deploy_type: self.deploy_type,
            from: self.signer.address(),
            tx_hash: None,
            transaction: None,
            balance: None,
        }
    }

    pub async fn balance(&self) -> Result<U256> {
        self.provider.get_balance(self.address).await
    }

    /// Call `method` with `args`.
    ///
    /// A trailing option bag is split off first; its `from` picks a signer
    /// from `registry` for this call only. Read-only methods return decoded
    /// outputs, everything else is signed, sent and waited on.
    pub async fn invoke(
        &self,
        registry: &AccountRegistry,
        method: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome> {
        let (args, options) = split_options(args)?;
        let signer = match options.from {
            Some(from) => Cow::Owned(registry.signer_for(from)?),
            None => Cow::Borrowed(&self.signer),
        };
        let descriptor = self.methods.resolve(method, args.len())?;
        let mut tx = TransactionRequest {
            to: Some(TxKind::Call(self.address)),
            input: TransactionInput::both(descriptor.encode_call(&args)?),
            ..Default::default()
        };
        options.apply(&mut tx);

        self.dispatch(descriptor, signer.as_ref(), tx)
            .await?
            .settle(&self.methods)
            .await
    }

    async fn dispatch(
        &self,
        descriptor: &CallDescriptor,
        signer: &Signer,
        mut tx: TransactionRequest,
    ) -> Result<Dispatch> {
        if descriptor.is_read_only() {
            tx.from = Some(signer.address());
            let output = self.provider.call(&tx).await?;
            debug!(contract = %self.name, method = descriptor.signature(), "read call");
            return Ok(Dispatch::Resolved(descriptor.decode_output(&output)?));
        }

        let pending = signer.send_transaction(&self.provider, tx, self.wait).await?;
        info!(
            contract = %self.name,
            method = descriptor.signature(),
            hash = %pending.hash(),
            "transaction sent"
        );
        Ok(Dispatch::Pending(pending))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::Bytes;
    use serde_json::json;

    use super::*;
    use crate::abi::parse_abi;
    use crate::error::ChainError;
    use crate::keys;
    use crate::rpc::ReceiptLog;
    use crate::rpc::mock::MockProvider;
    use crate::store::RegistryStore;

    const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const ABI: &str = r#"[
        {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"event","name":"Transfer","anonymous":false,"inputs":[{"name":"from","type":"address","indexed":true},{"name":"to","type":"address","indexed":true},{"name":"value","type":"uint256","indexed":false}]}
    ]"#;

    struct Fixture {
        _tmp: tempfile::TempDir,
        registry: AccountRegistry,
        mock: Arc<MockProvider>,
        handle: ContractHandle,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = AccountRegistry::open(RegistryStore::with_paths(
            tmp.path().join("wallets.json"),
            tmp.path().join("config.json"),
        ))
        .unwrap();
        registry.add_from_keys(&[KEY_A, KEY_B]).unwrap();

        let mock = Arc::new(MockProvider::new(31337));
        let handle = ContractHandle {
            index: 0,
            name: "Token".into(),
            address: Address::repeat_byte(0xcc),
            chain: "unknown".into(),
            chain_id: 31337,
            deploy_type: DeployType::PreDeployed,
            provider: mock.clone(),
            signer: Signer::Local(keys::signer_from_key(KEY_A).unwrap()),
            methods: MethodTable::from_abi(&parse_abi(ABI).unwrap()),
            wait: WaitConfig {
                timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
            },
        };
        Fixture {
            _tmp: tmp,
            registry,
            mock,
            handle,
        }
    }

    #[tokio::test]
    async fn view_call_returns_decoded_value() {
        let f = fixture();
        f.mock
            .state()
            .call_results
            .push_back(Bytes::from(U256::from(500).to_be_bytes::<32>().to_vec()));

        let outcome = f
            .handle
            .invoke(&f.registry, "balanceOf", vec![json!(Address::ZERO.to_string())])
            .await
            .unwrap();
        assert_eq!(outcome.to_json(), json!("500"));

        let state = f.mock.state();
        assert!(state.raw_transactions.is_empty());
        assert_eq!(state.calls.len(), 1);
    }

    #[tokio::test]
    async fn state_changing_call_returns_receipt() {
        let f = fixture();
        let to = keys::address_of(KEY_B).unwrap();
        let outcome = f
            .handle
            .invoke(&f.registry, "transfer", vec![json!(to.to_string()), json!(10)])
            .await
            .unwrap();
        let CallOutcome::Receipt { receipt, .. } = outcome else {
            panic!("expected a receipt");
        };
        assert_eq!(receipt.from, f.handle.signer_address());
        assert_eq!(receipt.to, Some(f.handle.address));
        assert_eq!(f.mock.state().raw_transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_receipt_carries_decoded_transfer_event() {
        let f = fixture();
        let from = f.handle.signer_address();
        let to = keys::address_of(KEY_B).unwrap();
        f.mock.state().next_logs = vec![ReceiptLog {
            address: f.handle.address,
            topics: vec![
                alloy::primitives::keccak256("Transfer(address,address,uint256)"),
                from.into_word(),
                to.into_word(),
            ],
            data: Bytes::from(U256::from(10).to_be_bytes::<32>().to_vec()),
            log_index: Some(alloy::primitives::U64::ZERO),
        }];

        let outcome = f
            .handle
            .invoke(&f.registry, "transfer", vec![json!(to.to_string()), json!(10)])
            .await
            .unwrap();
        let CallOutcome::Receipt { receipt, events } = &outcome else {
            panic!("expected a receipt");
        };
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Transfer");

        let json = outcome.to_json();
        assert_eq!(json["events"][0]["name"], "Transfer");
        assert_eq!(json["events"][0]["values"]["to"], json!(to.to_checksum(None)));
        assert_eq!(json["events"][0]["values"]["value"], json!("10"));
        assert_eq!(json["logs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn from_option_signs_with_that_account() {
        let f = fixture();
        let b = keys::address_of(KEY_B).unwrap();
        let outcome = f
            .handle
            .invoke(
                &f.registry,
                "transfer",
                vec![
                    json!(Address::ZERO.to_string()),
                    json!(1),
                    json!({ "from": b.to_string().to_lowercase(), "gasLimit": 60000 }),
                ],
            )
            .await
            .unwrap();

        assert!(matches!(outcome, CallOutcome::Receipt { .. }));
        let state = f.mock.state();
        assert_eq!(state.nonce_queries, vec![b]);
        assert!(state.estimates.is_empty());
        // The handle keeps its own signer.
        assert_ne!(f.handle.signer_address(), b);
    }

    #[tokio::test]
    async fn unknown_from_fails_only_that_call() {
        let f = fixture();
        let err = f
            .handle
            .invoke(
                &f.registry,
                "transfer",
                vec![
                    json!(Address::ZERO.to_string()),
                    json!(1),
                    json!({ "from": Address::repeat_byte(7).to_string() }),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::UnknownSigner(_)));

        f.mock
            .state()
            .call_results
            .push_back(Bytes::from(vec![0u8; 32]));
        assert!(f
            .handle
            .invoke(&f.registry, "balanceOf", vec![json!(Address::ZERO.to_string())])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_method_is_an_abi_error() {
        let f = fixture();
        assert!(matches!(
            f.handle.invoke(&f.registry, "burn", vec![]).await,
            Err(ChainError::Abi(_))
        ));
    }

    #[test]
    fn summary_serializes_deploy_type() {
        let f = fixture();
        let json = serde_json::to_value(f.handle.summary()).unwrap();
        assert_eq!(json["deployType"], "pre-deployed");
        assert_eq!(json["chainId"], 31337);
        assert!(json.get("txHash").is_none());
    }
}
