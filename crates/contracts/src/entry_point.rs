use crate::{
    error::{middleware_revert_data, provider_revert_data},
    gen::{EntryPointAPI, PackedUserOperation},
    ChainError, EntryPointRevert, SimulationOutcome,
};
use ethers::{
    prelude::ContractError,
    providers::Middleware,
    types::{transaction::eip2718::TypedTransaction, Address, H256, U256},
};
use pylon_primitives::UserOperation;
use std::sync::Arc;

/// Thin wrapper over the EntryPoint contract binding that turns the
/// revert-as-protocol calling convention into structured results.
#[derive(Clone)]
pub struct EntryPoint<M: Middleware + 'static> {
    eth_client: Arc<M>,
    address: Address,
    api: EntryPointAPI<M>,
}

impl<M: Middleware + 'static> EntryPoint<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let api = EntryPointAPI::new(address, eth_client.clone());
        Self { eth_client, address, api }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn eth_client(&self) -> Arc<M> {
        self.eth_client.clone()
    }

    /// Current next-nonce for the account under the given key.
    pub async fn get_nonce(&self, sender: &Address, key: U256) -> Result<U256, ChainError> {
        self.api
            .get_nonce(*sender, key)
            .call()
            .await
            .map_err(Self::contract_error)
    }

    /// The operation hash as the EntryPoint computes it.
    pub async fn get_user_op_hash(&self, uo: &UserOperation) -> Result<H256, ChainError> {
        self.api
            .get_user_op_hash(uo.into())
            .call()
            .await
            .map(H256::from)
            .map_err(Self::contract_error)
    }

    /// Runs `simulateValidation` as a static call. The contract reverts on
    /// both paths; only the `ValidationResult*` selectors mean success.
    pub async fn simulate_validation(
        &self,
        uo: &UserOperation,
    ) -> Result<SimulationOutcome, ChainError> {
        match self.api.simulate_validation(uo.into()).call().await {
            Ok(()) => Err(ChainError::Other {
                inner: "simulateValidation should revert".into(),
            }),
            Err(err) => match Self::revert_data(&err) {
                Some(data) => match crate::decode_entry_point_revert(&data) {
                    EntryPointRevert::ValidationResult
                    | EntryPointRevert::ValidationResultWithAggregation => {
                        Ok(SimulationOutcome::Valid)
                    }
                    EntryPointRevert::FailedOp { reason, .. } => {
                        Ok(SimulationOutcome::Rejected { reason, data: Some(data) })
                    }
                    EntryPointRevert::RevertString(reason) => {
                        Ok(SimulationOutcome::Rejected { reason, data: Some(data) })
                    }
                    EntryPointRevert::Unknown(_) => Ok(SimulationOutcome::Rejected {
                        reason: "unrecognized simulation revert".into(),
                        data: Some(data),
                    }),
                },
                None => Err(Self::contract_error(err)),
            },
        }
    }

    /// Builds the `handleOps` transaction; the caller sets gas and fees.
    pub fn handle_ops_tx(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
    ) -> TypedTransaction {
        let ops: Vec<PackedUserOperation> = uos.iter().map(Into::into).collect();
        self.api.handle_ops(ops, beneficiary).tx
    }

    fn revert_data(err: &ContractError<M>) -> Option<ethers::types::Bytes> {
        match err {
            ContractError::Revert(data) => Some(data.clone()),
            ContractError::MiddlewareError { e } => middleware_revert_data::<M>(e),
            ContractError::ProviderError { e } => provider_revert_data(e),
            _ => None,
        }
    }

    fn contract_error(err: ContractError<M>) -> ChainError {
        match Self::revert_data(&err) {
            Some(data) => ChainError::from_revert_data(data),
            None => ChainError::Provider { inner: err.to_string() },
        }
    }
}
