use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use super::UserOperation;

/// User operation as it arrives over the RPC wire: every field is optional so
/// that presence can be checked explicitly before admission. `initCode` and
/// `paymasterAndData` default to empty bytes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRequest {
    pub sender: Option<Address>,
    pub nonce: Option<U256>,
    pub init_code: Option<Bytes>,
    pub call_data: Option<Bytes>,
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub paymaster_and_data: Option<Bytes>,
    pub signature: Option<Bytes>,
}

impl From<UserOperation> for UserOperationRequest {
    fn from(uo: UserOperation) -> Self {
        Self {
            sender: Some(uo.sender),
            nonce: Some(uo.nonce),
            init_code: Some(uo.init_code),
            call_data: Some(uo.call_data),
            call_gas_limit: Some(uo.call_gas_limit),
            verification_gas_limit: Some(uo.verification_gas_limit),
            pre_verification_gas: Some(uo.pre_verification_gas),
            max_fee_per_gas: Some(uo.max_fee_per_gas),
            max_priority_fee_per_gas: Some(uo.max_priority_fee_per_gas),
            paymaster_and_data: Some(uo.paymaster_and_data),
            signature: Some(uo.signature),
        }
    }
}
