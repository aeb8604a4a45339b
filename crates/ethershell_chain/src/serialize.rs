//! Wide integers (balances, nonces, chain ids) are persisted as canonical
//! decimal strings so the JSON documents never lose precision. Readers accept
//! decimal strings, `0x` hex strings and plain JSON numbers.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum WideRepr {
    Unsigned(u64),
    Text(String),
}

/// Parse a decimal or `0x`-prefixed hex integer.
pub fn parse_wide(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        U256::from_str_radix(hex, 16).ok()
    } else {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        U256::from_str_radix(raw, 10).ok()
    }
}

fn from_repr<T, E>(repr: WideRepr) -> Result<T, E>
where
    T: TryFrom<U256>,
    E: serde::de::Error,
{
    let wide = match repr {
        WideRepr::Unsigned(n) => U256::from(n),
        WideRepr::Text(s) => {
            parse_wide(&s).ok_or_else(|| E::custom(format!("`{s}` is not an integer")))?
        }
    };
    T::try_from(wide).map_err(|_| E::custom(format!("{wide} is out of range")))
}

/// `#[serde(with = "decimal")]` for `U256`, `u64` and friends.
pub mod decimal {
    use std::fmt::Display;

    use super::*;
    use serde::Serializer;

    pub fn serialize<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<T, D::Error>
    where
        T: TryFrom<U256>,
        D: Deserializer<'de>,
    {
        from_repr(WideRepr::deserialize(d)?)
    }
}

/// `#[serde(with = "decimal_opt")]` for optional wide integers.
pub mod decimal_opt {
    use std::fmt::Display;

    use super::*;
    use serde::Serializer;

    pub fn serialize<T: Display, S: Serializer>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.collect_str(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<Option<T>, D::Error>
    where
        T: TryFrom<U256>,
        D: Deserializer<'de>,
    {
        Option::<WideRepr>::deserialize(d)?
            .map(from_repr::<T, D::Error>)
            .transpose()
    }
}
