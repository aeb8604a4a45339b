//! ABI-derived method tables and conversion between shell JSON values and
//! Solidity values.

use std::collections::{BTreeMap, HashMap};

use alloy::dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::{Constructor, Event, Function, JsonAbi, Param, StateMutability};
use alloy::primitives::{Address, B256, Bytes, Selector};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::rpc::ReceiptLog;

/// Parse an ABI document: either a bare JSON array or a compiler artifact
/// object with an `abi` field.
pub fn parse_abi(text: &str) -> Result<JsonAbi> {
    let value: Value = serde_json::from_str(text)?;
    let abi = match value {
        Value::Object(mut map) if map.contains_key("abi") => map.remove("abi").unwrap_or_default(),
        other => other,
    };
    serde_json::from_value(abi).map_err(|e| ChainError::Abi(format!("invalid ABI: {e}")))
}

/// One callable entry of a contract ABI.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    function: Function,
    signature: String,
}

impl CallDescriptor {
    fn new(function: Function) -> Self {
        let signature = function.signature();
        Self {
            function,
            signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Canonical signature such as `transfer(address,uint256)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn selector(&self) -> Selector {
        self.function.selector()
    }

    pub fn arity(&self) -> usize {
        self.function.inputs.len()
    }

    /// `view` and `pure` functions are executed with `eth_call`.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.function.state_mutability,
            StateMutability::View | StateMutability::Pure
        )
    }

    pub fn is_payable(&self) -> bool {
        self.function.state_mutability == StateMutability::Payable
    }

    /// Selector plus ABI-encoded arguments.
    pub fn encode_call(&self, args: &[Value]) -> Result<Bytes> {
        let values = coerce_params(&self.function.inputs, args, &self.signature)?;
        self.function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ChainError::Abi(format!("cannot encode {}: {e}", self.signature)))
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        self.function
            .abi_decode_output(data)
            .map_err(|e| ChainError::Abi(format!("cannot decode {} output: {e}", self.signature)))
    }
}

/// A receipt log decoded against the contract's events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedLog {
    pub name: String,
    pub signature: String,
    pub address: Address,
    /// Parameter name, or position for unnamed parameters, to value.
    pub values: Map<String, Value>,
}

/// Name → overloads, built once per contract handle.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Vec<CallDescriptor>>,
    constructor: Option<Constructor>,
    events: HashMap<B256, Event>,
}

impl MethodTable {
    pub fn from_abi(abi: &JsonAbi) -> Self {
        let methods = abi
            .functions
            .iter()
            .map(|(name, overloads)| {
                let descriptors = overloads.iter().cloned().map(CallDescriptor::new).collect();
                (name.clone(), descriptors)
            })
            .collect();
        let events = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();
        Self {
            methods,
            constructor: abi.constructor.clone(),
            events,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Find the entry for `method` called with `arity` arguments.
    ///
    /// `method` may be a bare name or a full signature; a full signature is the
    /// only way to pick between overloads of equal arity.
    pub fn resolve(&self, method: &str, arity: usize) -> Result<&CallDescriptor> {
        let method = method.trim();
        if method.is_empty() {
            return Err(ChainError::Validation("method name is empty".into()));
        }

        if method.contains('(') {
            let wanted: String = method.chars().filter(|c| !c.is_whitespace()).collect();
            return self
                .methods
                .values()
                .flatten()
                .find(|d| d.signature == wanted)
                .ok_or_else(|| ChainError::Abi(format!("contract has no function `{wanted}`")));
        }

        let overloads = self
            .methods
            .get(method)
            .ok_or_else(|| ChainError::Abi(format!("contract has no function `{method}`")))?;
        let mut matching = overloads.iter().filter(|d| d.arity() == arity);
        match (matching.next(), matching.next()) {
            (Some(found), None) => Ok(found),
            (None, _) => Err(ChainError::Abi(format!(
                "`{method}` takes {} argument(s), got {arity}",
                describe_arities(overloads)
            ))),
            (Some(_), Some(_)) => Err(ChainError::Abi(format!(
                "`{method}` is overloaded; call it by signature: {}",
                overloads
                    .iter()
                    .map(CallDescriptor::signature)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Decode the logs this contract's ABI knows about. Logs from other
    /// contracts or with unknown topics are skipped.
    pub fn decode_logs(&self, logs: &[ReceiptLog]) -> Vec<DecodedLog> {
        logs.iter()
            .filter_map(|log| {
                let event = self.events.get(log.topics.first()?)?;
                match event.decode_log_parts(log.topics.iter().copied(), &log.data) {
                    Ok(decoded) => {
                        let mut indexed = decoded.indexed.iter();
                        let mut body = decoded.body.iter();
                        let values = event
                            .inputs
                            .iter()
                            .enumerate()
                            .filter_map(|(position, param)| {
                                let value = match param.indexed {
                                    true => indexed.next(),
                                    false => body.next(),
                                }?;
                                let key = if param.name.is_empty() {
                                    position.to_string()
                                } else {
                                    param.name.clone()
                                };
                                Some((key, value_to_json(value)))
                            })
                            .collect();
                        Some(DecodedLog {
                            name: event.name.clone(),
                            signature: event.signature(),
                            address: log.address,
                            values,
                        })
                    }
                    Err(e) => {
                        debug!(event = %event.name, error = %e, "log does not match its event");
                        None
                    }
                }
            })
            .collect()
    }

    /// Creation code: `bytecode` followed by the encoded constructor arguments.
    pub fn encode_deploy(&self, bytecode: &[u8], args: &[Value]) -> Result<Bytes> {
        let encoded_args = match &self.constructor {
            Some(constructor) => {
                let values = coerce_params(&constructor.inputs, args, "constructor")?;
                constructor
                    .abi_encode_input(&values)
                    .map_err(|e| ChainError::Abi(format!("cannot encode constructor: {e}")))?
            }
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(ChainError::Abi(format!(
                    "contract has no constructor but {} argument(s) were given",
                    args.len()
                )));
            }
        };
        let mut code = Vec::with_capacity(bytecode.len() + encoded_args.len());
        code.extend_from_slice(bytecode);
        code.extend_from_slice(&encoded_args);
        Ok(code.into())
    }
}

fn describe_arities(overloads: &[CallDescriptor]) -> String {
    let mut arities: Vec<usize> = overloads.iter().map(CallDescriptor::arity).collect();
    arities.sort_unstable();
    arities.dedup();
    arities
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

fn coerce_params(params: &[Param], args: &[Value], what: &str) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        return Err(ChainError::Abi(format!(
            "{what} expects {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| ChainError::Abi(format!("unsupported type {}: {e}", param.ty)))?;
            coerce_value(&ty, arg).map_err(|e| match e {
                ChainError::Abi(msg) if !param.name.is_empty() => {
                    ChainError::Abi(format!("argument `{}`: {msg}", param.name))
                }
                other => other,
            })
        })
        .collect()
}

/// Convert a shell value into a value of Solidity type `ty`.
///
/// Strings go through alloy's coercion rules, so `"1.5 ether"`, hex and
/// decimal numbers are all accepted for integer types.
pub fn coerce_value(ty: &DynSolType, value: &Value) -> Result<DynSolValue> {
    let nested = |inner: &DynSolType, items: &[Value]| -> Result<Vec<DynSolValue>> {
        items.iter().map(|item| coerce_value(inner, item)).collect()
    };
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => {
            Ok(DynSolValue::Array(nested(inner, items)?))
        }
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(ChainError::Abi(format!(
                    "{ty} needs {len} element(s), got {}",
                    items.len()
                )));
            }
            Ok(DynSolValue::FixedArray(nested(inner, items)?))
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(ChainError::Abi(format!(
                    "{ty} needs {} field(s), got {}",
                    types.len(),
                    items.len()
                )));
            }
            types
                .iter()
                .zip(items)
                .map(|(inner, item)| coerce_value(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
        (_, Value::String(text)) => coerce_text(ty, text),
        (_, Value::Bool(flag)) => coerce_text(ty, if *flag { "true" } else { "false" }),
        (_, Value::Number(number)) if number.is_u64() || number.is_i64() => {
            coerce_text(ty, &number.to_string())
        }
        (_, Value::Number(number)) => Err(ChainError::Abi(format!(
            "{number} is not an exact integer for {ty}; pass wide or fractional amounts as strings"
        ))),
        (_, other) => coerce_text(ty, &other.to_string()),
    }
}

fn coerce_text(ty: &DynSolType, text: &str) -> Result<DynSolValue> {
    ty.coerce_str(text)
        .map_err(|e| ChainError::Abi(format!("`{text}` is not a valid {ty}: {e}")))
}

/// Render a decoded value for the shell. Integers become decimal strings so
/// 256-bit values survive JSON; addresses are checksummed.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(flag) => Value::Bool(*flag),
        DynSolValue::Int(n, _) => Value::String(n.to_string()),
        DynSolValue::Uint(n, _) => Value::String(n.to_string()),
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..(*size).min(32)])))
        }
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(text) => Value::String(text.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => match other.as_word() {
            Some(word) => Value::String(word.to_string()),
            None => Value::String(format!("{other:?}")),
        },
    }
}

/// Shell rendering of a whole return list: a single value is unwrapped.
pub fn outputs_to_json(values: &[DynSolValue]) -> Value {
    match values {
        [] => Value::Null,
        [single] => value_to_json(single),
        many => Value::Array(many.iter().map(value_to_json).collect()),
    }
}
