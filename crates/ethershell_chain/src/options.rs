//! Trailing transaction-option bags on contract calls.

use alloy::eips::eip2930::AccessList;
use alloy::primitives::utils::parse_units;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionRequest;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ChainError, Result};
use crate::serialize::parse_wide;

/// Keys that mark a trailing JSON object as an option bag rather than a
/// struct argument.
pub const RECOGNIZED_OPTION_KEYS: [&str; 12] = [
    "value",
    "nonce",
    "gasLimit",
    "gas",
    "gasPrice",
    "maxFeePerGas",
    "maxPriorityFeePerGas",
    "chainId",
    "accessList",
    "type",
    "customData",
    "from",
];

/// Normalized per-call transaction overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxOptions {
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub chain_id: Option<u64>,
    pub access_list: Option<AccessList>,
    pub tx_type: Option<u8>,
    /// zkSync-style extras; carried but never sent.
    pub custom_data: Option<Value>,
}

pub fn is_option_bag(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| RECOGNIZED_OPTION_KEYS.iter().any(|key| map.contains_key(*key)))
}

/// Pop a trailing option bag off `args`, if there is one.
pub fn split_options(mut args: Vec<Value>) -> Result<(Vec<Value>, TxOptions)> {
    if !args.last().is_some_and(is_option_bag) {
        return Ok((args, TxOptions::default()));
    }
    let options = match args.pop() {
        Some(Value::Object(map)) => TxOptions::from_map(&map)?,
        _ => TxOptions::default(),
    };
    Ok((args, options))
}

impl TxOptions {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        if map.contains_key("data") {
            warn!("`data` in transaction options is ignored; calldata comes from the method arguments");
        }
        for key in map.keys() {
            if key != "data" && !RECOGNIZED_OPTION_KEYS.contains(&key.as_str()) {
                debug!(key, "dropping unrecognized transaction option");
            }
        }

        let from = match map.get("from") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(raw.trim().parse::<Address>().map_err(|_| {
                ChainError::Validation(format!("`from` is not an address: {raw}"))
            })?),
            Some(other) => {
                return Err(ChainError::Validation(format!(
                    "`from` must be an address string, got {other}"
                )));
            }
        };

        // `gasLimit` wins when both are given.
        let gas_limit = match map.get("gasLimit").filter(|v| !v.is_null()) {
            Some(value) => Some(narrow(value, "gasLimit")?),
            None => optional(map, "gas", narrow)?,
        };

        let access_list = match map.get("accessList").filter(|v| !v.is_null()) {
            Some(raw) => Some(serde_json::from_value(raw.clone()).map_err(|e| {
                ChainError::Validation(format!("`accessList` is malformed: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            from,
            value: optional(map, "value", |v, key| parse_quantity(v, key))?,
            nonce: optional(map, "nonce", narrow)?,
            gas_limit,
            gas_price: optional(map, "gasPrice", narrow)?,
            max_fee_per_gas: optional(map, "maxFeePerGas", narrow)?,
            max_priority_fee_per_gas: optional(map, "maxPriorityFeePerGas", narrow)?,
            chain_id: optional(map, "chainId", narrow)?,
            access_list,
            tx_type: optional(map, "type", narrow)?,
            custom_data: map.get("customData").filter(|v| !v.is_null()).cloned(),
        })
    }

    /// Copy every override except `from` onto `tx`.
    pub fn apply(&self, tx: &mut TransactionRequest) {
        if let Some(value) = self.value {
            tx.value = Some(value);
        }
        if let Some(nonce) = self.nonce {
            tx.nonce = Some(nonce);
        }
        if let Some(gas) = self.gas_limit {
            tx.gas = Some(gas);
        }
        if let Some(price) = self.gas_price {
            tx.gas_price = Some(price);
        }
        if let Some(fee) = self.max_fee_per_gas {
            tx.max_fee_per_gas = Some(fee);
        }
        if let Some(tip) = self.max_priority_fee_per_gas {
            tx.max_priority_fee_per_gas = Some(tip);
        }
        if let Some(chain_id) = self.chain_id {
            tx.chain_id = Some(chain_id);
        }
        if let Some(list) = &self.access_list {
            tx.access_list = Some(list.clone());
        }
        if let Some(kind) = self.tx_type {
            tx.transaction_type = Some(kind);
        }
        if self.custom_data.is_some() {
            warn!("`customData` is not applicable on Ethereum-style networks; ignored");
        }
    }
}

fn optional<T>(
    map: &Map<String, Value>,
    key: &str,
    parse: impl Fn(&Value, &str) -> Result<T>,
) -> Result<Option<T>> {
    map.get(key)
        .filter(|v| !v.is_null())
        .map(|v| parse(v, key))
        .transpose()
}

fn narrow<T: TryFrom<U256>>(value: &Value, key: &str) -> Result<T> {
    let wide = parse_quantity(value, key)?;
    T::try_from(wide).map_err(|_| ChainError::Validation(format!("`{key}` is too large: {wide}")))
}

/// A non-negative integer given as a JSON number, a decimal or hex string,
/// or an amount with a unit such as `"1.5 ether"` or `"2gwei"`.
pub fn parse_quantity(value: &Value, key: &str) -> Result<U256> {
    let invalid = || ChainError::Validation(format!("`{key}` is not a valid quantity: {value}"));
    match value {
        // Anything past u64 has already been rounded through f64.
        Value::Number(number) => number.as_u64().map(U256::from).ok_or_else(invalid),
        Value::String(text) => parse_wide(text)
            .or_else(|| parse_with_unit(text))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_with_unit(text: &str) -> Option<U256> {
    let text = text.trim();
    let split = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (amount, unit) = text.split_at(split);
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return None;
    }
    parse_units(amount, unit.trim().to_ascii_lowercase().as_str())
        .ok()
        .map(|parsed| parsed.get_absolute())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::TxKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn trailing_bag_is_popped() {
        let args = vec![json!("0x01"), json!(5), json!({ "value": "1 ether", "gas": 21000 })];
        let (args, options) = split_options(args).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(options.value, Some(U256::from(10u64).pow(U256::from(18u64))));
        assert_eq!(options.gas_limit, Some(21_000));
    }

    #[test]
    fn struct_arguments_are_not_bags() {
        let args = vec![json!({ "owner": "0x01", "amount": 3 })];
        let (args, options) = split_options(args).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(options, TxOptions::default());
    }

    #[test]
    fn gas_limit_wins_over_gas() {
        let map = json!({ "gas": 1, "gasLimit": "0x10", "bogus": true });
        let options = TxOptions::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(options.gas_limit, Some(16));
    }

    #[test]
    fn from_must_be_an_address() {
        let map = json!({ "from": "alice" });
        assert!(matches!(
            TxOptions::from_map(map.as_object().unwrap()),
            Err(ChainError::Validation(_))
        ));
        let map = json!({ "from": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8" });
        let options = TxOptions::from_map(map.as_object().unwrap()).unwrap();
        assert!(options.from.is_some());
    }

    #[test]
    fn quantities_accept_several_forms() {
        assert_eq!(parse_quantity(&json!(7), "v").unwrap(), U256::from(7));
        assert_eq!(parse_quantity(&json!("0x1f"), "v").unwrap(), U256::from(31));
        assert_eq!(
            parse_quantity(&json!("2 gwei"), "v").unwrap(),
            U256::from(2_000_000_000u64)
        );
        assert_eq!(
            parse_quantity(&json!("1.5ether"), "v").unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert!(parse_quantity(&json!(-1), "v").is_err());
        assert!(parse_quantity(&json!("-1 ether"), "v").is_err());
        assert!(parse_quantity(&json!(1.5), "v").is_err());
        assert!(parse_quantity(&json!("lots"), "v").is_err());
    }

    #[test]
    fn test_rounded_wide_numbers_are_not_quantities() {
        let rounded: Value = serde_json::from_str("123456789012345678901234567").unwrap();
        assert!(parse_quantity(&rounded, "value").is_err());
        assert_eq!(
            parse_quantity(&json!("123456789012345678901234567"), "value").unwrap(),
            "123456789012345678901234567".parse::<U256>().unwrap()
        );
    }

    #[test]
    fn apply_leaves_from_and_target_alone() {
        let map = json!({
            "from": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
            "nonce": 3,
            "maxFeePerGas": "30 gwei",
            "type": 2,
            "chainId": 31337,
            "accessList": [],
            "customData": { "paymaster": "0x00" }
        });
        let options = TxOptions::from_map(map.as_object().unwrap()).unwrap();
        let mut tx = TransactionRequest {
            to: Some(TxKind::Call(Address::ZERO)),
            ..Default::default()
        };
        options.apply(&mut tx);
        assert_eq!(tx.from, None);
        assert_eq!(tx.to, Some(TxKind::Call(Address::ZERO)));
        assert_eq!(tx.nonce, Some(3));
        assert_eq!(tx.max_fee_per_gas, Some(30_000_000_000));
        assert_eq!(tx.transaction_type, Some(2));
        assert_eq!(tx.chain_id, Some(31337));
        assert!(tx.access_list.is_some());
        assert!(options.custom_data.is_some());
    }
}
