use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use pylon_mempool::{MempoolError, StoreError, UoPoolError, ValidationError};
use pylon_primitives::constants::rpc_error_codes::{BUNDLER, INTERNAL_ERROR, INVALID_PARAMS};
use serde_json::json;

/// A wrapper for the [ErrorObjectOwned](ErrorObjectOwned) type. The RPC layer
/// is the single translator from component errors to wire codes: format
/// faults map to `-32602`, policy and simulation rejections to `-32500` with
/// a stable `data.reason`, environmental failures to `-32603`.
pub struct JsonRpcError(pub ErrorObjectOwned);

impl From<JsonRpcError> for ErrorObjectOwned {
    fn from(err: JsonRpcError) -> Self {
        err.0
    }
}

fn bundler_error(message: String, reason: &str) -> ErrorObjectOwned {
    ErrorObject::owned(BUNDLER, message, Some(json!({ "reason": reason })))
}

fn internal_error(message: String) -> ErrorObjectOwned {
    ErrorObject::owned(INTERNAL_ERROR, message, None::<bool>)
}

impl From<ValidationError> for JsonRpcError {
    fn from(err: ValidationError) -> Self {
        JsonRpcError(match &err {
            ValidationError::InvalidField { .. } => ErrorObject::owned(
                INVALID_PARAMS,
                err.to_string(),
                Some(json!({ "reason": err.to_string() })),
            ),
            ValidationError::NonceTooLow { .. } => bundler_error(err.to_string(), "nonce-too-low"),
            ValidationError::Simulation { data, .. } => ErrorObject::owned(
                BUNDLER,
                err.to_string(),
                Some(json!({
                    "reason": "simulation-failed",
                    "revertData": data.as_ref().map(|d| d.to_string()),
                })),
            ),
            ValidationError::Chain(inner) => internal_error(inner.to_string()),
        })
    }
}

impl From<MempoolError> for JsonRpcError {
    fn from(err: MempoolError) -> Self {
        JsonRpcError(match &err {
            MempoolError::DuplicateInMempool { .. } => {
                bundler_error(err.to_string(), "duplicate-in-mempool")
            }
            MempoolError::NonceReused { .. } => bundler_error(err.to_string(), "nonce-reused"),
            MempoolError::Store(StoreError::DuplicateHash) => {
                bundler_error(err.to_string(), "duplicate-hash")
            }
            MempoolError::Store(inner) => internal_error(inner.to_string()),
        })
    }
}

impl From<UoPoolError> for JsonRpcError {
    fn from(err: UoPoolError) -> Self {
        match err {
            UoPoolError::UnsupportedEntryPoint { .. } => {
                JsonRpcError(bundler_error(err.to_string(), "unsupported-entrypoint"))
            }
            UoPoolError::Validation(inner) => inner.into(),
            UoPoolError::Mempool(inner) => inner.into(),
            UoPoolError::Store(inner) => JsonRpcError(internal_error(inner.to_string())),
        }
    }
}
