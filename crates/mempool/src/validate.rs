use crate::ValidationError;
use ethers::types::U256;
use pylon_contracts::{ChainService, SimulationOutcome};
use pylon_primitives::{UserOperation, UserOperationHash, UserOperationRequest};
use std::sync::Arc;
use tracing::debug;

/// Admission pipeline: format check, hash, nonce freshness, on-chain
/// simulation. Stages run in order and the first failure wins.
pub struct UserOpValidator {
    chain: Arc<dyn ChainService>,
}

impl UserOpValidator {
    pub fn new(chain: Arc<dyn ChainService>) -> Self {
        Self { chain }
    }

    /// Checks field presence and well-formedness and produces the canonical
    /// typed operation. `initCode` and `paymasterAndData` default to empty;
    /// every other field is required. Errors carry the wire name of the
    /// offending field.
    pub fn check_format(request: &UserOperationRequest) -> Result<UserOperation, ValidationError> {
        let sender = request
            .sender
            .ok_or(ValidationError::InvalidField { field: "sender" })?;
        let nonce = request
            .nonce
            .ok_or(ValidationError::InvalidField { field: "nonce" })?;
        let call_data = request
            .call_data
            .clone()
            .ok_or(ValidationError::InvalidField { field: "callData" })?;
        let call_gas_limit = request
            .call_gas_limit
            .ok_or(ValidationError::InvalidField { field: "callGasLimit" })?;
        let verification_gas_limit = request
            .verification_gas_limit
            .ok_or(ValidationError::InvalidField { field: "verificationGasLimit" })?;
        let pre_verification_gas = request
            .pre_verification_gas
            .ok_or(ValidationError::InvalidField { field: "preVerificationGas" })?;
        let max_fee_per_gas = request
            .max_fee_per_gas
            .ok_or(ValidationError::InvalidField { field: "maxFeePerGas" })?;
        let max_priority_fee_per_gas = request
            .max_priority_fee_per_gas
            .ok_or(ValidationError::InvalidField { field: "maxPriorityFeePerGas" })?;
        let signature = request
            .signature
            .clone()
            .ok_or(ValidationError::InvalidField { field: "signature" })?;

        let init_code = request.init_code.clone().unwrap_or_default();
        let paymaster_and_data = request.paymaster_and_data.clone().unwrap_or_default();
        // a non-empty paymaster field must start with a full address
        if !paymaster_and_data.is_empty() && paymaster_and_data.len() < 20 {
            return Err(ValidationError::InvalidField { field: "paymasterAndData" });
        }

        Ok(UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data,
            signature,
        })
    }

    /// Runs the full pipeline and returns the canonical operation together
    /// with its EntryPoint hash.
    pub async fn validate(
        &self,
        request: &UserOperationRequest,
    ) -> Result<(UserOperation, UserOperationHash), ValidationError> {
        let uo = Self::check_format(request)?;

        let hash = self.chain.compute_user_op_hash(&uo).await?;

        let current = self.chain.get_nonce(&uo.sender, U256::zero()).await?;
        // gaps above the current nonce are fine, future nonces may queue
        if uo.nonce < current {
            return Err(ValidationError::NonceTooLow { nonce: uo.nonce, current });
        }

        match self.chain.simulate_validation(&uo).await? {
            SimulationOutcome::Valid => {
                debug!("{hash} passed validation");
                Ok((uo, hash))
            }
            SimulationOutcome::Rejected { reason, data } => {
                Err(ValidationError::Simulation { reason, data })
            }
        }
    }
}
