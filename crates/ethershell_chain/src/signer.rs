//! Turning a registry account into something that can submit transactions.

use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use ethershell_core::NetworkSettings;
use tracing::{debug, info};

use crate::account::AccountRecord;
use crate::error::{ChainError, Result};
use crate::keys;
use crate::rpc::{Receipt, RpcProvider};

/// Signing capability bound to one account.
#[derive(Debug, Clone)]
pub enum Signer {
    /// Key held locally; transactions are signed here and sent raw.
    Local(PrivateKeySigner),
    /// Key held by the node; transactions go through `eth_sendTransaction`.
    Node(Address),
}

impl Signer {
    pub fn from_record(record: &AccountRecord) -> Result<Self> {
        match &record.private_key {
            Some(key) => Ok(Self::Local(keys::signer_from_key(key)?)),
            None if record.is_node_managed() => Ok(Self::Node(record.address)),
            None => Err(ChainError::SignerNotAvailable(record.address.to_string())),
        }
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Node(address) => *address,
        }
    }

    /// Fill, sign and submit `tx`.
    pub async fn send_transaction(
        &self,
        provider: &Arc<dyn RpcProvider>,
        tx: TransactionRequest,
        wait: WaitConfig,
    ) -> Result<PendingTransaction> {
        let hash = match self {
            Self::Local(signer) => {
                let tx = fill_transaction(provider.as_ref(), signer.address(), tx).await?;
                let wallet = EthereumWallet::from(signer.clone());
                let envelope = tx
                    .build(&wallet)
                    .await
                    .map_err(|e| ChainError::Key(format!("failed to sign transaction: {e}")))?;
                provider.send_raw_transaction(&envelope.encoded_2718()).await?
            }
            Self::Node(address) => {
                let mut tx = tx;
                tx.from = Some(*address);
                provider.send_transaction(&tx).await?
            }
        };
        info!(%hash, from = %self.address(), "transaction submitted");
        Ok(PendingTransaction {
            hash,
            provider: Arc::clone(provider),
            wait,
        })
    }
}

/// Populate sender, chain id, nonce, gas limit and fees on `tx`.
///
/// Fields already set by the caller are left alone. EIP-1559 fees are used
/// unless the caller asked for a gas price or the node does not support
/// `eth_maxPriorityFeePerGas`.
pub async fn fill_transaction(
    provider: &dyn RpcProvider,
    from: Address,
    mut tx: TransactionRequest,
) -> Result<TransactionRequest> {
    tx.from = Some(from);
    if tx.chain_id.is_none() {
        tx.chain_id = Some(provider.chain_id().await?);
    }
    if tx.nonce.is_none() {
        tx.nonce = Some(provider.get_transaction_count(from).await?);
    }
    if tx.gas.is_none() {
        tx.gas = Some(provider.estimate_gas(&tx).await?);
    }

    let wants_legacy = tx.gas_price.is_some() || matches!(tx.transaction_type, Some(0 | 1));
    if wants_legacy {
        if tx.gas_price.is_none() {
            tx.gas_price = Some(provider.gas_price().await?);
        }
        return Ok(tx);
    }

    let tip = match tx.max_priority_fee_per_gas {
        Some(tip) => tip,
        None => match provider.max_priority_fee_per_gas().await {
            Ok(tip) => tip,
            Err(ChainError::Rpc { code, message }) if tx.max_fee_per_gas.is_none() => {
                debug!(code, %message, "node has no EIP-1559 fee oracle, using legacy gas price");
                tx.gas_price = Some(provider.gas_price().await?);
                return Ok(tx);
            }
            Err(e) => return Err(e),
        },
    };
    if tx.max_fee_per_gas.is_none() {
        let base = provider.gas_price().await?;
        tx.max_fee_per_gas = Some(base.saturating_mul(2).saturating_add(tip));
    }
    let max_fee = tx.max_fee_per_gas.unwrap_or(tip);
    tx.max_priority_fee_per_gas = Some(tip.min(max_fee));
    Ok(tx)
}

/// Bounds for receipt polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&NetworkSettings> for WaitConfig {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            timeout: settings.confirmation_timeout(),
            poll_interval: settings.poll_interval(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}

/// A submitted transaction whose receipt has not been seen yet.
pub struct PendingTransaction {
    hash: B256,
    provider: Arc<dyn RpcProvider>,
    wait: WaitConfig,
}

impl PendingTransaction {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Poll until mined. A receipt with status 0 is a [`ChainError::Reverted`].
    pub async fn wait(self) -> Result<Receipt> {
        let limit = self.wait.timeout;
        let receipt = tokio::time::timeout(limit, self.poll())
            .await
            .map_err(|_| ChainError::Timeout(limit))??;
        if !receipt.succeeded() {
            return Err(ChainError::Reverted(self.hash));
        }
        debug!(hash = %self.hash, block = ?receipt.block_number, "transaction mined");
        Ok(receipt)
    }

    async fn poll(&self) -> Result<Receipt> {
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(self.hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.wait.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{TxKind, U256};

    use super::*;
    use crate::rpc::mock::MockProvider;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn quick_wait() -> WaitConfig {
        WaitConfig {
            timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn transfer(to: Address) -> TransactionRequest {
        TransactionRequest {
            to: Some(TxKind::Call(to)),
            value: Some(U256::from(1u64)),
            ..Default::default()
        }
    }

    #[test]
    fn record_without_key_needs_node_type() {
        let address = keys::address_of(KEY).unwrap();
        let mut record = AccountRecord::imported(0, address, KEY.into());
        assert!(matches!(Signer::from_record(&record), Ok(Signer::Local(_))));

        record.private_key = None;
        assert!(matches!(
            Signer::from_record(&record),
            Err(ChainError::SignerNotAvailable(_))
        ));

        let node = AccountRecord::node_managed(1, address);
        assert!(matches!(Signer::from_record(&node), Ok(Signer::Node(a)) if a == address));
    }

    #[tokio::test]
    async fn fill_uses_eip1559_when_supported() {
        let provider = MockProvider::new(31337);
        let from = keys::address_of(KEY).unwrap();
        let tx = fill_transaction(&provider, from, transfer(Address::ZERO))
            .await
            .unwrap();
        assert_eq!(tx.from, Some(from));
        assert_eq!(tx.chain_id, Some(31337));
        assert_eq!(tx.nonce, Some(0));
        assert_eq!(tx.gas, Some(50_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(100_000_000));
        assert_eq!(tx.max_fee_per_gas, Some(2_100_000_000));
        assert!(tx.gas_price.is_none());
    }

    #[tokio::test]
    async fn fill_falls_back_to_legacy() {
        let provider = MockProvider::new(1337);
        provider.state().legacy_only = true;
        let tx = fill_transaction(&provider, Address::ZERO, transfer(Address::ZERO))
            .await
            .unwrap();
        assert_eq!(tx.gas_price, Some(1_000_000_000));
        assert!(tx.max_fee_per_gas.is_none());
    }

    #[tokio::test]
    async fn caller_fields_are_kept() {
        let provider = MockProvider::new(1);
        let mut request = transfer(Address::ZERO);
        request.gas = Some(90_000);
        request.nonce = Some(7);
        request.gas_price = Some(5);
        let tx = fill_transaction(&provider, Address::ZERO, request).await.unwrap();
        assert_eq!(tx.gas, Some(90_000));
        assert_eq!(tx.nonce, Some(7));
        assert_eq!(tx.gas_price, Some(5));
        assert!(provider.state().estimates.is_empty());
    }

    #[tokio::test]
    async fn local_signer_sends_raw_and_waits() {
        let mock = Arc::new(MockProvider::new(31337));
        let provider: Arc<dyn RpcProvider> = mock.clone();
        let signer = Signer::Local(keys::signer_from_key(KEY).unwrap());

        let pending = signer
            .send_transaction(&provider, transfer(Address::repeat_byte(1)), quick_wait())
            .await
            .unwrap();
        let hash = pending.hash();
        let receipt = pending.wait().await.unwrap();

        assert_eq!(receipt.transaction_hash, hash);
        assert_eq!(receipt.from, signer.address());
        assert_eq!(mock.state().raw_transactions.len(), 1);
    }

    #[tokio::test]
    async fn node_signer_uses_send_transaction() {
        let mock = Arc::new(MockProvider::new(1337));
        let provider: Arc<dyn RpcProvider> = mock.clone();
        let node = Address::repeat_byte(9);

        Signer::Node(node)
            .send_transaction(&provider, transfer(Address::ZERO), quick_wait())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        let state = mock.state();
        assert!(state.raw_transactions.is_empty());
        assert_eq!(state.node_transactions[0].from, Some(node));
    }

    #[tokio::test]
    async fn reverted_receipt_is_an_error() {
        let mock = Arc::new(MockProvider::new(31337));
        mock.state().revert = true;
        let provider: Arc<dyn RpcProvider> = mock.clone();
        let signer = Signer::Local(keys::signer_from_key(KEY).unwrap());

        let pending = signer
            .send_transaction(&provider, transfer(Address::ZERO), quick_wait())
            .await
            .unwrap();
        assert!(matches!(pending.wait().await, Err(ChainError::Reverted(_))));
    }

    #[tokio::test]
    async fn unmined_transaction_times_out() {
        let mock = Arc::new(MockProvider::new(31337));
        mock.state().never_mine = true;
        let provider: Arc<dyn RpcProvider> = mock.clone();
        let signer = Signer::Local(keys::signer_from_key(KEY).unwrap());

        let pending = signer
            .send_transaction(&provider, transfer(Address::ZERO), quick_wait())
            .await
            .unwrap();
        assert!(matches!(pending.wait().await, Err(ChainError::Timeout(_))));
    }
}
