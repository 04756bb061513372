use ethers::types::U256;
use pylon_primitives::{constants::gas, UserOperation, UserOperationGasEstimation};

/// Conservative gas defaults for when simulation cannot yield exact values:
/// calldata priced at the non-zero byte rate on top of the base transaction
/// cost, with a 20% margin (integer math, rounded toward zero).
pub fn estimate_user_op_gas(uo: &UserOperation) -> UserOperationGasEstimation {
    let call_data_gas = U256::from(uo.call_data.len() as u64) * U256::from(gas::CALL_DATA_BYTE_GAS);
    let pre_verification_gas = (U256::from(gas::TX_BASE_GAS) + call_data_gas)
        * U256::from(gas::ESTIMATE_MARGIN_PERCENT)
        / U256::from(100);

    UserOperationGasEstimation {
        pre_verification_gas,
        verification_gas_limit: pre_verification_gas * 2,
        call_gas_limit: U256::from(gas::DEFAULT_CALL_GAS_LIMIT),
    }
}
