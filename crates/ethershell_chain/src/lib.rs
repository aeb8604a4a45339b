pub mod abi;
pub mod account;
pub mod artifacts;
pub mod compiler;
pub mod contracts;
pub mod deploy;
pub mod error;
pub mod keys;
pub mod options;
pub mod proxy;
pub mod registry;
pub mod rpc;
pub mod serialize;
pub mod session;
pub mod signer;
pub mod store;

pub use abi::{CallDescriptor, DecodedLog, MethodTable};
pub use account::{
    AccountRecord, AccountSelector, AccountType, AccountView, ContractRef, UNSAFE_WARNING,
};
pub use artifacts::{ArtifactIndex, ArtifactPaths, CompiledArtifact, Compiler};
pub use compiler::SolcCompiler;
pub use contracts::{ContractLookup, ContractTable};
pub use deploy::{AttachRequest, DeployRequest, Orchestrator};
pub use error::{ChainError, ErrorKind, Result};
pub use options::TxOptions;
pub use proxy::{CallOutcome, ContractHandle, ContractSummary, DeployType};
pub use registry::{AccountListing, AccountRegistry, DEFAULT_HD_COUNT};
pub use rpc::{Connector, HttpConnector, JsonRpcProvider, NetworkInfo, Receipt, ReceiptLog, RpcProvider};
pub use session::Shell;
pub use signer::{PendingTransaction, Signer, WaitConfig};
pub use store::{ConfigDocument, RegistryStore};
