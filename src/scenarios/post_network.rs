use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ethers::{providers::Middleware, types::Address};
use serde::Serialize;
use tracing::info;

use crate::blockchain::NodeClient;
use crate::config::{Config, TestCoinConfig};
use crate::dex::UniswapV2;
use crate::storage::{ContractRegistry, INITIAL_SNAPSHOT};
use crate::utils::u256_from_e_notation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostNetworkReport {
    pub accounts: usize,
    pub coins_sent: usize,
    pub initial_snapshot: String,
}

/// 노드 기동 직후 1회: 테스트 코인 지급 → `initial` 스냅샷 → 배포 기록 초기화
pub async fn post_network<M: Middleware + 'static>(
    config: &Config,
    node: &NodeClient<M>,
    registry: &ContractRegistry,
    max_attempts: Option<u32>,
) -> Result<PostNetworkReport> {
    let delay = Duration::from_secs(config.network.node_retry_delay_secs);
    let accounts = node.wait_until_up(delay, max_attempts).await?;
    info!("🚀 post process started!");

    let coins_sent = if config.test_coins.enabled {
        let sent = fund_test_coins(config, node.provider(), &accounts).await?;
        info!("💰 test coins sent! ({}건)", sent);
        sent
    } else {
        info!("💤 test coins disabled!");
        0
    };

    let id = node.snapshot_id().await?;
    let mut ids = BTreeMap::new();
    ids.insert(INITIAL_SNAPSHOT.to_string(), id.clone());
    node.snapshots().replace_all(&ids).await?;
    info!("📸 snapshot taken {}", id);

    registry.clear().await?;

    Ok(PostNetworkReport { accounts: accounts.len(), coins_sent, initial_snapshot: id })
}

/// 수신자 × 코인 조합마다 Uniswap으로 매수
async fn fund_test_coins<M: Middleware + 'static>(config: &Config, client: Arc<M>, accounts: &[Address]) -> Result<usize> {
    let plan = test_coin_plan(&config.test_coins)?;
    let sender = *accounts.get(config.test_coins.signer_index).ok_or_else(|| {
        anyhow!(
            "test coin signer #{} 없음 (노드 계정 {}개)",
            config.test_coins.signer_index,
            accounts.len()
        )
    })?;

    let uniswap = UniswapV2::new(client, config.addresses.uniswap_v2_router, config.addresses.weth);
    for recipient in &config.test_coins.recipients {
        for (coin, amount) in &plan {
            uniswap.buy_erc20_with_eth(*coin, *amount, *recipient, sender).await?;
        }
    }
    Ok(config.test_coins.recipients.len() * plan.len())
}

/// 코인별 지급량 (지수 표기 해석)
pub fn test_coin_plan(test_coins: &TestCoinConfig) -> Result<Vec<(Address, ethers::types::U256)>> {
    if test_coins.coins.len() != test_coins.amounts.len() {
        return Err(anyhow!(
            "test coin 수({})와 금액 수({})가 다름",
            test_coins.coins.len(),
            test_coins.amounts.len()
        ));
    }

    test_coins
        .coins
        .iter()
        .zip(&test_coins.amounts)
        .map(|(coin, amount)| Ok((*coin, u256_from_e_notation(amount)?)))
        .collect()
}
