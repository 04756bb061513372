//! Generated EntryPoint v0.6 binding (functions the bundler actually calls).

use ethers::prelude::abigen;
use pylon_primitives::UserOperation;

abigen!(
    EntryPointAPI,
    r#"[
        struct PackedUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; uint256 callGasLimit; uint256 verificationGasLimit; uint256 preVerificationGas; uint256 maxFeePerGas; uint256 maxPriorityFeePerGas; bytes paymasterAndData; bytes signature; }
        function handleOps(PackedUserOperation[] calldata ops, address payable beneficiary)
        function simulateValidation(PackedUserOperation calldata userOp)
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
        function getUserOpHash(PackedUserOperation calldata userOp) external view returns (bytes32)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

pub use entry_point_api::PackedUserOperation;

impl From<UserOperation> for PackedUserOperation {
    fn from(uo: UserOperation) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: uo.call_gas_limit,
            verification_gas_limit: uo.verification_gas_limit,
            pre_verification_gas: uo.pre_verification_gas,
            max_fee_per_gas: uo.max_fee_per_gas,
            max_priority_fee_per_gas: uo.max_priority_fee_per_gas,
            paymaster_and_data: uo.paymaster_and_data,
            signature: uo.signature,
        }
    }
}

impl From<&UserOperation> for PackedUserOperation {
    fn from(uo: &UserOperation) -> Self {
        uo.clone().into()
    }
}
