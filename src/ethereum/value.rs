//! Closed value type for contract arguments and results.
//!
//! Values are shaped after the parameter type descriptors of the interface and
//! converted to [`DynSolValue`] only at encode time, against the resolved
//! [`DynSolType`], so a mismatch is reported per argument instead of at the
//! encoder.

use alloy::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy::json_abi::Param;
use alloy::primitives::{Address, B256, I256, U256};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Int(I256),
    Address(Address),
    Bool(bool),
    /// Both dynamic `bytes` and fixed `bytesN`.
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl From<U256> for AbiValue {
    fn from(value: U256) -> Self {
        AbiValue::Uint(value)
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        AbiValue::Uint(U256::from(value))
    }
}

impl From<I256> for AbiValue {
    fn from(value: I256) -> Self {
        AbiValue::Int(value)
    }
}

impl From<Address> for AbiValue {
    fn from(value: Address) -> Self {
        AbiValue::Address(value)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        AbiValue::Bool(value)
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        AbiValue::String(value.to_string())
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        AbiValue::String(value)
    }
}

impl From<Vec<u8>> for AbiValue {
    fn from(value: Vec<u8>) -> Self {
        AbiValue::Bytes(value)
    }
}

impl AbiValue {
    fn variant_name(&self) -> &'static str {
        match self {
            AbiValue::Uint(_) => "uint",
            AbiValue::Int(_) => "int",
            AbiValue::Address(_) => "address",
            AbiValue::Bool(_) => "bool",
            AbiValue::Bytes(_) => "bytes",
            AbiValue::String(_) => "string",
            AbiValue::Array(_) => "array",
            AbiValue::Tuple(_) => "tuple",
        }
    }

    /// Convert to the encoder's representation, checking the shape against `ty`.
    pub fn to_dyn(&self, ty: &DynSolType) -> Result<DynSolValue, String> {
        match (self, ty) {
            (AbiValue::Uint(v), DynSolType::Uint(bits)) => {
                if *bits < 256 && v.bit_len() > *bits {
                    return Err(format!("{} does not fit in uint{}", v, bits));
                }
                Ok(DynSolValue::Uint(*v, *bits))
            }
            (AbiValue::Int(v), DynSolType::Int(bits)) => {
                check_int_width(*v, *bits)?;
                Ok(DynSolValue::Int(*v, *bits))
            }
            (AbiValue::Uint(v), DynSolType::Int(bits)) => {
                let signed = I256::try_from(*v)
                    .map_err(|_| format!("{} does not fit in int{}", v, bits))?;
                check_int_width(signed, *bits)?;
                Ok(DynSolValue::Int(signed, *bits))
            }
            (AbiValue::Address(a), DynSolType::Address) => Ok(DynSolValue::Address(*a)),
            (AbiValue::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),
            (AbiValue::Bytes(b), DynSolType::Bytes) => Ok(DynSolValue::Bytes(b.clone())),
            (AbiValue::Bytes(b), DynSolType::FixedBytes(size)) => {
                if b.len() > *size {
                    return Err(format!("{} bytes do not fit in bytes{}", b.len(), size));
                }
                let mut word = B256::ZERO;
                word[..b.len()].copy_from_slice(b);
                Ok(DynSolValue::FixedBytes(word, *size))
            }
            (AbiValue::String(s), DynSolType::String) => Ok(DynSolValue::String(s.clone())),
            (AbiValue::Array(items), DynSolType::Array(inner)) => items
                .iter()
                .map(|item| item.to_dyn(inner))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Array),
            (AbiValue::Array(items), DynSolType::FixedArray(inner, len)) => {
                if items.len() != *len {
                    return Err(format!("expected {} elements, got {}", len, items.len()));
                }
                items
                    .iter()
                    .map(|item| item.to_dyn(inner))
                    .collect::<Result<Vec<_>, _>>()
                    .map(DynSolValue::FixedArray)
            }
            (AbiValue::Tuple(items), DynSolType::Tuple(types)) => {
                if items.len() != types.len() {
                    return Err(format!(
                        "expected tuple of {} fields, got {}",
                        types.len(),
                        items.len()
                    ));
                }
                items
                    .iter()
                    .zip(types)
                    .map(|(item, ty)| item.to_dyn(ty))
                    .collect::<Result<Vec<_>, _>>()
                    .map(DynSolValue::Tuple)
            }
            (value, ty) => Err(format!(
                "cannot use a {} value for type '{}'",
                value.variant_name(),
                ty.sol_type_name()
            )),
        }
    }

    pub fn from_dyn(value: DynSolValue) -> Self {
        match value {
            DynSolValue::Bool(b) => AbiValue::Bool(b),
            DynSolValue::Int(v, _) => AbiValue::Int(v),
            DynSolValue::Uint(v, _) => AbiValue::Uint(v),
            DynSolValue::FixedBytes(word, size) => AbiValue::Bytes(word[..size].to_vec()),
            DynSolValue::Address(a) => AbiValue::Address(a),
            DynSolValue::Bytes(b) => AbiValue::Bytes(b),
            DynSolValue::String(s) => AbiValue::String(s),
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
                AbiValue::Array(items.into_iter().map(AbiValue::from_dyn).collect())
            }
            DynSolValue::Tuple(items) => {
                AbiValue::Tuple(items.into_iter().map(AbiValue::from_dyn).collect())
            }
            other => AbiValue::Bytes(other.abi_encode()),
        }
    }

    /// Build a value from JSON input, guided by the expected type.
    pub fn from_json(value: &Value, ty: &DynSolType) -> Result<Self, String> {
        match ty {
            DynSolType::Address => {
                let s = value.as_str().ok_or("address must be a hex string")?;
                Address::from_str(s)
                    .map(AbiValue::Address)
                    .map_err(|e| format!("invalid address '{}': {}", s, e))
            }
            DynSolType::Uint(_) => parse_uint(value).map(AbiValue::Uint),
            DynSolType::Int(_) => parse_int(value).map(AbiValue::Int),
            DynSolType::Bool => value
                .as_bool()
                .map(AbiValue::Bool)
                .ok_or_else(|| "bool parameter must be true or false".to_string()),
            DynSolType::String => value
                .as_str()
                .map(|s| AbiValue::String(s.to_string()))
                .ok_or_else(|| "string parameter must be a string".to_string()),
            DynSolType::Bytes | DynSolType::FixedBytes(_) => {
                let s = value.as_str().ok_or("bytes must be a hex string")?;
                hex::decode(s.trim_start_matches("0x"))
                    .map(AbiValue::Bytes)
                    .map_err(|_| format!("invalid hex string: {}", s))
            }
            DynSolType::Array(inner) | DynSolType::FixedArray(inner, _) => {
                let items = value.as_array().ok_or("array parameter must be an array")?;
                items
                    .iter()
                    .map(|item| AbiValue::from_json(item, inner))
                    .collect::<Result<Vec<_>, _>>()
                    .map(AbiValue::Array)
            }
            DynSolType::Tuple(types) => {
                let items = value.as_array().ok_or("tuple parameter must be an array")?;
                if items.len() != types.len() {
                    return Err(format!(
                        "expected tuple of {} fields, got {}",
                        types.len(),
                        items.len()
                    ));
                }
                items
                    .iter()
                    .zip(types)
                    .map(|(item, ty)| AbiValue::from_json(item, ty))
                    .collect::<Result<Vec<_>, _>>()
                    .map(AbiValue::Tuple)
            }
            other => Err(format!("unsupported type: {}", other.sol_type_name())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AbiValue::Uint(v) => Value::String(v.to_string()),
            AbiValue::Int(v) => Value::String(v.to_string()),
            AbiValue::Address(a) => Value::String(a.to_string()),
            AbiValue::Bool(b) => Value::Bool(*b),
            AbiValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
            AbiValue::String(s) => Value::String(s.clone()),
            AbiValue::Array(items) | AbiValue::Tuple(items) => {
                Value::Array(items.iter().map(AbiValue::to_json).collect())
            }
        }
    }
}

/// `value` must lie in [-2^(bits-1), 2^(bits-1) - 1].
fn check_int_width(value: I256, bits: usize) -> Result<(), String> {
    if bits == 0 || bits >= 256 {
        return Ok(());
    }
    let shift = 256 - bits;
    if value > I256::MAX.asr(shift) || value < I256::MIN.asr(shift) {
        return Err(format!("{} does not fit in int{}", value, bits));
    }
    Ok(())
}

fn parse_uint(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("invalid uint value: {}", n)),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex_part) => U256::from_str_radix(hex_part, 16),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map_err(|_| format!("invalid uint string: {}", s))
        }
        _ => Err("uint must be a number or string".to_string()),
    }
}

fn parse_int(value: &Value) -> Result<I256, String> {
    let text = match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err("int must be an integer number or string".to_string()),
    };
    let parsed = if text.trim_start_matches('-').starts_with("0x") {
        I256::from_hex_str(&text)
    } else {
        I256::from_dec_str(&text)
    };
    parsed.map_err(|_| format!("invalid int value: {}", text))
}

fn resolve(param: &Param) -> Result<DynSolType, String> {
    param
        .resolve()
        .map_err(|e| format!("unsupported type '{}': {}", param.selector_type(), e))
}

/// Parse positional JSON arguments against `params`.
pub fn args_from_json(params: &[Param], args: &Value) -> Result<Vec<AbiValue>, String> {
    let items = match args {
        Value::Array(items) => items.as_slice(),
        Value::Null => &[],
        other => {
            return Err(format!(
                "arguments must be a JSON array, got: {}",
                serde_json::to_string(other).unwrap_or_else(|_| "invalid JSON".to_string())
            ))
        }
    };

    if items.len() != params.len() {
        let expected: Vec<String> = params
            .iter()
            .map(|p| format!("{} {}", p.selector_type(), p.name))
            .collect();
        return Err(format!(
            "expected {} arguments, got {}. Expected: [{}]",
            params.len(),
            items.len(),
            expected.join(", ")
        ));
    }

    params
        .iter()
        .zip(items)
        .enumerate()
        .map(|(i, (param, item))| {
            let ty = resolve(param)?;
            AbiValue::from_json(item, &ty).map_err(|e| {
                format!(
                    "invalid argument #{} ('{}' of type '{}'): {}",
                    i + 1,
                    param.name,
                    param.selector_type(),
                    e
                )
            })
        })
        .collect()
}

pub fn values_to_json(values: &[AbiValue]) -> Value {
    Value::Array(values.iter().map(AbiValue::to_json).collect())
}

/// Converts `values` for the encoder, one per parameter, checking each against
/// its declared type.
pub(crate) fn to_dyn_values(params: &[Param], values: &[AbiValue]) -> Result<Vec<DynSolValue>, String> {
    if params.len() != values.len() {
        return Err(format!(
            "expected {} arguments, got {}",
            params.len(),
            values.len()
        ));
    }

    params
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (param, value))| {
            let ty = resolve(param)?;
            value
                .to_dyn(&ty)
                .map_err(|e| format!("argument #{} ('{}'): {}", i + 1, param.name, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(types: &[&str]) -> Vec<Param> {
        types.iter().map(|ty| Param::parse(ty).unwrap()).collect()
    }

    #[test]
    fn test_uint_from_json_forms() {
        let ty = DynSolType::Uint(256);
        assert_eq!(AbiValue::from_json(&json!(10), &ty).unwrap(), AbiValue::from(10u64));
        assert_eq!(AbiValue::from_json(&json!("10"), &ty).unwrap(), AbiValue::from(10u64));
        assert_eq!(AbiValue::from_json(&json!("0x10"), &ty).unwrap(), AbiValue::from(16u64));
        assert!(AbiValue::from_json(&json!(-1), &ty).is_err());
        assert!(AbiValue::from_json(&json!(true), &ty).is_err());
    }

    #[test]
    fn test_int_from_json() {
        let ty = DynSolType::Int(256);
        let value = AbiValue::from_json(&json!(-5), &ty).unwrap();
        assert_eq!(value, AbiValue::Int(I256::from_dec_str("-5").unwrap()));
        assert_eq!(value.to_json(), json!("-5"));
    }

    #[test]
    fn test_uint_width_is_enforced() {
        let too_big = AbiValue::from(256u64);
        assert!(too_big.to_dyn(&DynSolType::Uint(8)).is_err());
        assert!(AbiValue::from(255u64).to_dyn(&DynSolType::Uint(8)).is_ok());
    }

    #[test]
    fn test_int_width_is_enforced() {
        let int = |s: &str| AbiValue::Int(I256::from_dec_str(s).unwrap());
        let int8 = DynSolType::Int(8);

        assert!(int("127").to_dyn(&int8).is_ok());
        assert!(int("-128").to_dyn(&int8).is_ok());
        for out_of_range in ["128", "-129", "1000"] {
            let err = int(out_of_range).to_dyn(&int8).unwrap_err();
            assert!(err.contains("int8"), "{}", err);
        }
        assert!(int("-1000").to_dyn(&DynSolType::Int(16)).is_ok());
        assert!(int("-57896044618658097711785492504343953926634992332820282019728792003956564819968")
            .to_dyn(&DynSolType::Int(256))
            .is_ok());
    }

    #[test]
    fn test_uint_value_for_int_parameter_is_range_checked() {
        let int8 = DynSolType::Int(8);
        assert!(AbiValue::from(127u64).to_dyn(&int8).is_ok());
        assert!(AbiValue::from(200u64).to_dyn(&int8).is_err());
        assert!(AbiValue::Uint(U256::MAX).to_dyn(&DynSolType::Int(256)).is_err());
    }

    #[test]
    fn test_out_of_range_int_argument_is_rejected() {
        let thousand = AbiValue::Int(I256::from_dec_str("1000").unwrap());
        let err = to_dyn_values(&params(&["int8"]), &[thousand]).unwrap_err();
        assert!(err.starts_with("argument #1"), "{}", err);
        assert!(err.contains("does not fit in int8"), "{}", err);
    }

    #[test]
    fn test_fixed_bytes_are_left_aligned() {
        let value = AbiValue::Bytes(vec![0xde, 0xad]);
        let dyn_value = value.to_dyn(&DynSolType::FixedBytes(4)).unwrap();
        match &dyn_value {
            DynSolValue::FixedBytes(word, 4) => assert_eq!(&word[..4], &[0xde, 0xad, 0, 0]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            AbiValue::from_dyn(dyn_value),
            AbiValue::Bytes(vec![0xde, 0xad, 0, 0])
        );
        assert!(AbiValue::Bytes(vec![0; 5])
            .to_dyn(&DynSolType::FixedBytes(4))
            .is_err());
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let err = AbiValue::Bool(true)
            .to_dyn(&DynSolType::Address)
            .unwrap_err();
        assert!(err.contains("bool"));
        assert!(err.contains("address"));
    }

    #[test]
    fn test_args_from_json_with_tuple() {
        let order: Param = serde_json::from_value(json!({
            "name": "order",
            "type": "tuple",
            "components": [
                {"name": "maker", "type": "address"},
                {"name": "amounts", "type": "uint256[]"}
            ]
        }))
        .unwrap();
        let args = json!([
            ["0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e", [1, "2"]]
        ]);
        let values = args_from_json(&[order], &args).unwrap();
        assert_eq!(values.len(), 1);
        match &values[0] {
            AbiValue::Tuple(fields) => {
                assert!(matches!(fields[0], AbiValue::Address(_)));
                assert_eq!(
                    fields[1],
                    AbiValue::Array(vec![AbiValue::from(1u64), AbiValue::from(2u64)])
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_args_from_json_count_mismatch() {
        let err = args_from_json(&params(&["uint256", "uint256"]), &json!([1])).unwrap_err();
        assert!(err.contains("expected 2 arguments, got 1"));
        assert!(err.contains("uint256"));
        assert!(args_from_json(&[], &Value::Null).unwrap().is_empty());
        assert!(args_from_json(&[], &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_to_dyn_values_checks_each_argument() {
        let types = params(&["address", "string", "bool", "bytes"]);
        let values = vec![
            AbiValue::Address(Address::repeat_byte(0x11)),
            AbiValue::from("hello"),
            AbiValue::Bool(true),
            AbiValue::Bytes(vec![1, 2, 3]),
        ];
        let converted = to_dyn_values(&types, &values).unwrap();
        assert_eq!(converted[1], DynSolValue::String("hello".to_string()));
        assert_eq!(
            converted.into_iter().map(AbiValue::from_dyn).collect::<Vec<_>>(),
            values
        );

        let err = to_dyn_values(&types, &values[..2]).unwrap_err();
        assert!(err.contains("expected 4 arguments, got 2"));

        let mut swapped = values.clone();
        swapped.swap(1, 2);
        let err = to_dyn_values(&types, &swapped).unwrap_err();
        assert!(err.starts_with("argument #2"), "{}", err);
    }

    #[test]
    fn test_to_json_rendering() {
        let values = vec![
            AbiValue::from(30u64),
            AbiValue::Address(Address::ZERO),
            AbiValue::Bytes(vec![0xab]),
            AbiValue::Tuple(vec![AbiValue::Bool(false)]),
        ];
        assert_eq!(
            values_to_json(&values),
            json!([
                "30",
                "0x0000000000000000000000000000000000000000",
                "0xab",
                [false]
            ])
        );
    }
}
