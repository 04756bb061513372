use crate::cli::Opts;
use ethers::providers::{Http, Middleware, Provider};
use pylon_bundler::{BundleExecutor, ExecutorConfig};
use pylon_contracts::{ChainService, EthereumChain};
use pylon_mempool::{Mempool, Store, UoPool};
use pylon_primitives::Wallet;
use pylon_rpc::{
    eth_api::EthApiServer, net_api::NetApiServer, web3_api::Web3ApiServer, EthApiServerImpl,
    JsonRpcServer, NetApiServerImpl, OperatorLayer, Web3ApiServerImpl,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::info;

/// Wires the components together and runs until SIGINT/SIGTERM.
pub async fn launch(opts: Opts) -> eyre::Result<()> {
    info!("Starting Pylon ERC-4337 bundler");

    let eth_client = Arc::new(Provider::<Http>::try_from(opts.eth_client_address.clone())?);

    // the chain id must come from the node and match the configuration
    let node_chain_id = eth_client.get_chainid().await?.as_u64();
    if node_chain_id != opts.chain_id {
        eyre::bail!(
            "chain id mismatch: execution client reports {node_chain_id}, configured {}",
            opts.chain_id
        );
    }
    let client_version = eth_client.client_version().await?;
    info!("connected to execution client {client_version} on chain {node_chain_id}");

    let wallet = Wallet::from_key(&opts.private_key, opts.chain_id)?;
    let beneficiary = opts.beneficiary.unwrap_or_else(|| wallet.address());
    info!("bundler signer {:?}, beneficiary {:?}", wallet.address(), beneficiary);

    let chain = Arc::new(EthereumChain::new(eth_client, opts.entry_point, wallet).await?)
        as Arc<dyn ChainService>;

    let store = Store::connect(&opts.database_path).await?;
    let mempool = Mempool::new(store.clone());
    let reloaded = mempool.reload().await?;
    info!("restored {reloaded} pending user operations from {:?}", opts.database_path);

    let uopool = Arc::new(UoPool::new(chain.clone(), mempool.clone(), store.clone()));

    let executor = Arc::new(BundleExecutor::new(
        chain,
        mempool,
        store,
        ExecutorConfig {
            beneficiary,
            bundle_interval: Duration::from_millis(opts.bundle_interval_ms),
            max_bundle_size: opts.max_bundle_size,
            max_fee_multiplier_percent: (opts.max_fee_multiplier * 100.0) as u64,
            receipt_grace_ticks: opts.receipt_grace_ticks,
            receipt_timeout_policy: opts.receipt_timeout_policy,
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor_task = executor.spawn(shutdown_rx);

    let mut server = JsonRpcServer::new(opts.http_addr, opts.http_port)
        .with_cors(&opts.http_corsdomain)
        .with_operator(OperatorLayer::new(uopool.clone()));
    server.add_methods(EthApiServerImpl { uopool: uopool.clone() }.into_rpc())?;
    server.add_methods(NetApiServerImpl { chain_id: opts.chain_id }.into_rpc())?;
    server.add_methods(Web3ApiServerImpl {}.into_rpc())?;
    let (addr, server_handle) = server.start().await?;
    info!("JSON-RPC server listening on {addr}");

    shutdown_signal().await;
    info!("shutdown signal received, stopping bundle executor");
    let _ = shutdown_tx.send(true);
    let _ = executor_task.await;
    let _ = server_handle.stop();

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
