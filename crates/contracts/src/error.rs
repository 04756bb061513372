use ethers::{
    abi::AbiDecode,
    providers::{JsonRpcError, Middleware, MiddlewareError, ProviderError},
    types::{Bytes, U256},
};
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

/// Errors surfaced by the chain service. `Revert` carries decoded data when
/// the node returned any; everything else is environmental.
#[derive(Debug, Error, Clone)]
pub enum ChainError {
    /// The call reverted
    #[error("execution reverted: {reason}")]
    Revert {
        reason: String,
        /// Raw revert payload when the node returned one
        data: Option<Bytes>,
    },

    /// Provider / network error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },

    /// Data decoding error
    #[error("decode error: {inner}")]
    Decode {
        /// The inner error message
        inner: String,
    },

    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

// EntryPoint v0.6 revert selectors. simulateValidation reverts on both the
// success and the failure path; the selector tells them apart.
pub const VALIDATION_RESULT_SELECTOR: [u8; 4] = [0xe0, 0xcf, 0xf0, 0x5f];
pub const VALIDATION_RESULT_WITH_AGGREGATION_SELECTOR: [u8; 4] = [0xfa, 0xec, 0xb4, 0xe4];
pub const FAILED_OP_SELECTOR: [u8; 4] = [0x22, 0x02, 0x66, 0xb6];
// `require(cond, "reason")` / `revert("reason")` → Error(string)
pub const REVERT_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// A decoded EntryPoint revert payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryPointRevert {
    /// Successful simulation (`ValidationResult`)
    ValidationResult,
    /// Successful simulation with an aggregator
    ValidationResultWithAggregation,
    /// Rejected operation (`FailedOp(opIndex, reason)`)
    FailedOp { op_index: U256, reason: String },
    /// Plain solidity revert string
    RevertString(String),
    /// Selector not recognized
    Unknown(Bytes),
}

/// Decodes EntryPoint revert data by selector.
pub fn decode_entry_point_revert(data: &Bytes) -> EntryPointRevert {
    if data.len() < 4 {
        return EntryPointRevert::Unknown(data.clone());
    }
    let selector: [u8; 4] = data[0..4].try_into().expect("length checked");
    match selector {
        VALIDATION_RESULT_SELECTOR => EntryPointRevert::ValidationResult,
        VALIDATION_RESULT_WITH_AGGREGATION_SELECTOR => {
            EntryPointRevert::ValidationResultWithAggregation
        }
        FAILED_OP_SELECTOR => match <(U256, String) as AbiDecode>::decode(&data[4..]) {
            Ok((op_index, reason)) => EntryPointRevert::FailedOp { op_index, reason },
            Err(_) => EntryPointRevert::Unknown(data.clone()),
        },
        REVERT_STRING_SELECTOR => match <String as AbiDecode>::decode(&data[4..]) {
            Ok(reason) => EntryPointRevert::RevertString(reason),
            Err(_) => EntryPointRevert::Unknown(data.clone()),
        },
        _ => EntryPointRevert::Unknown(data.clone()),
    }
}

/// Pulls the raw revert payload out of a JSON-RPC error, if any. Nodes either
/// put the hex blob in `data` directly or embed it in a message string.
pub fn json_rpc_revert_data(err: &JsonRpcError) -> Option<Bytes> {
    if let Some(data) = err.as_revert_data() {
        return Some(data);
    }

    if let Some(serde_json::Value::String(data)) = err.data.as_ref() {
        let re = Regex::new(r"0x[0-9a-fA-F]+").expect("regex rules valid");
        let hex = re.find(data)?;
        return Bytes::from_str(hex.as_str()).ok();
    }

    None
}

pub fn provider_revert_data(err: &ProviderError) -> Option<Bytes> {
    match err {
        ProviderError::JsonRpcClientError(err) => {
            err.as_error_response().and_then(json_rpc_revert_data)
        }
        _ => None,
    }
}

pub fn middleware_revert_data<M: Middleware>(err: &M::Error) -> Option<Bytes> {
    if let Some(err) = err.as_error_response() {
        return json_rpc_revert_data(err);
    }
    if let Some(err) = err.as_provider_error() {
        return provider_revert_data(err);
    }
    None
}

impl ChainError {
    pub fn provider(inner: impl std::fmt::Display) -> Self {
        ChainError::Provider { inner: inner.to_string() }
    }

    /// A revert error with a human-readable reason recovered from the payload.
    pub fn from_revert_data(data: Bytes) -> Self {
        let reason = match decode_entry_point_revert(&data) {
            EntryPointRevert::FailedOp { reason, .. } => reason,
            EntryPointRevert::RevertString(reason) => reason,
            _ => format!("{data}"),
        };
        ChainError::Revert { reason, data: Some(data) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failed_op() {
        let data = Bytes::from_str("0x220266b600000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000001e41413430206f76657220766572696669636174696f6e4761734c696d69740000").unwrap();
        match decode_entry_point_revert(&data) {
            EntryPointRevert::FailedOp { op_index, reason } => {
                assert_eq!(op_index, U256::zero());
                assert_eq!(reason, "AA40 over verificationGasLimit");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decode_revert_string() {
        let data = Bytes::from_str("0x08c379a00000000000000000000000000000000000000000000000000000000000000020000000000000000000000000000000000000000000000000000000000000001841413934206761732076616c756573206f766572666c6f770000000000000000").unwrap();
        match decode_entry_point_revert(&data) {
            EntryPointRevert::RevertString(reason) => {
                assert_eq!(reason, "AA94 gas values overflow");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decode_validation_result_selector() {
        let data = Bytes::from_str("0xe0cff05f").unwrap();
        assert_eq!(decode_entry_point_revert(&data), EntryPointRevert::ValidationResult);
    }

    #[test]
    fn short_payload_is_unknown() {
        let data = Bytes::from_str("0x22").unwrap();
        assert!(matches!(decode_entry_point_revert(&data), EntryPointRevert::Unknown(_)));
    }
}
