use crate::{error::JsonRpcError, eth_api::EthApiServer};
use async_trait::async_trait;
use ethers::types::{Address, U64};
use jsonrpsee::{core::RpcResult, types::ErrorObjectOwned};
use pylon_mempool::UoPool;
use pylon_primitives::{
    constants::rpc_error_codes::INVALID_PARAMS, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt, UserOperationRecord, UserOperationRequest,
};
use std::{str::FromStr, sync::Arc};

pub struct EthApiServerImpl {
    pub uopool: Arc<UoPool>,
}

fn invalid_hash_error() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INVALID_PARAMS, "Missing/invalid userOpHash".to_string(), None::<bool>)
}

#[async_trait]
impl EthApiServer for EthApiServerImpl {
    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(self.uopool.chain_id().into())
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<String>> {
        Ok(self.uopool.supported_entry_points())
    }

    async fn send_user_operation(
        &self,
        user_operation: UserOperationRequest,
        entry_point: Address,
    ) -> RpcResult<UserOperationHash> {
        self.uopool
            .add_user_operation(user_operation, entry_point)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationRequest,
        entry_point: Address,
    ) -> RpcResult<UserOperationGasEstimation> {
        self.uopool
            .estimate_user_operation_gas(user_operation, entry_point)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: String,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        let hash = UserOperationHash::from_str(&user_operation_hash)
            .map_err(|_| invalid_hash_error())?;
        self.uopool
            .get_user_operation_receipt(&hash)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn get_user_operation_by_hash(
        &self,
        user_operation_hash: String,
    ) -> RpcResult<Option<UserOperationRecord>> {
        let hash = UserOperationHash::from_str(&user_operation_hash)
            .map_err(|_| invalid_hash_error())?;
        self.uopool
            .get_user_operation_by_hash(&hash)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }
}
