//! Claim client entry point.
//!
//! Wires the coordinator to the JSON-RPC node, the eligibility service and
//! the wallet endpoint, starts the claim journal in the background and serves
//! the operator API.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use claimer::api::{self, ApiState};
use claimer::balances::StakedBalances;
use claimer::config::Config;
use claimer::eligibility::EligibilityClient;
use claimer::journal;
use claimer::rpc::{RpcClient, RpcConfirmations, RpcDistributor, RpcSigner, RpcStaking};
use claimer::{ClaimCoordinator, ContractBindings, CoordinatorContext, Tranche};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = journal::init_pool(&config.database_url).await?;

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let node = RpcClient::new(client.clone(), config.rpc_url.clone());
    let wallet = RpcClient::new(client.clone(), config.wallet_rpc_url.clone());

    let staking = Arc::new(RpcStaking::new(node.clone(), config.staking_contract));
    let balances = Arc::new(StakedBalances::new(staking.clone(), config.account));

    // ─── Claim journal ────────────────────────────────────
    let (events, events_rx) = broadcast::channel(256);
    let shutdown = CancellationToken::new();
    let journal_task = tokio::spawn(journal::run(pool.clone(), events_rx, shutdown.clone()));

    // ─── Coordinator ──────────────────────────────────────
    let coordinator = Arc::new(ClaimCoordinator::new(CoordinatorContext {
        eligibility: Arc::new(EligibilityClient::new(client, config.eligibility_url.clone())),
        confirmations: Arc::new(RpcConfirmations::new(
            node.clone(),
            config.confirmation_poll,
            config.confirmation_timeout,
        )),
        refresher: balances.clone(),
        events,
        simulate_latency: config.simulate_latency,
    }));

    coordinator
        .set_contracts(Some(ContractBindings {
            optional: Arc::new(RpcDistributor::new(
                node.clone(),
                config.optional_distributor,
                Tranche::Optional,
            )),
            mandatory: Arc::new(RpcDistributor::new(
                node,
                config.mandatory_distributor,
                Tranche::Mandatory,
            )),
            staking,
        }))
        .await;
    coordinator
        .set_signer(Some(Arc::new(RpcSigner::new(wallet))))
        .await;
    coordinator.set_account(Some(config.account)).await;

    let view = coordinator.view().await;
    info!(
        "Claims for {}: optional={} mandatory={} (loaded={})",
        config.account, view.optional.state, view.mandatory.state, view.loaded
    );

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(ApiState {
        coordinator,
        balances,
        pool,
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = journal_task.await {
        error!("Claim journal task failed: {e}");
    }
    Ok(())
}
