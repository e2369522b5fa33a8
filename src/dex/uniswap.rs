use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::Middleware,
    types::{Address, U256},
};
use tracing::{debug, info};

use crate::blockchain::abi::{human_abi, send_call};
use crate::constants::SLIPPAGE_FLOOR_BPS;

fn router_abi() -> Result<Abi> {
    human_abi(&[
        "function getAmountsIn(uint256 amountOut, address[] path) view returns (uint256[] amounts)",
        "function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) payable returns (uint256[] amounts)",
    ])
}

fn weth_abi() -> Result<Abi> {
    human_abi(&[
        "function deposit() payable",
        "function transfer(address to, uint256 amount) returns (bool)",
    ])
}

/// 최소 수령량 (5% 슬리피지 하한)
///
/// 곱셈이 넘치는 큰 금액은 먼저 나눈다.
pub fn min_amount_out(amount_out: U256) -> U256 {
    let floor = U256::from(SLIPPAGE_FLOOR_BPS);
    let denominator = U256::from(10_000u64);
    match amount_out.checked_mul(floor) {
        Some(scaled) => scaled / denominator,
        None => amount_out / denominator * floor,
    }
}

/// 스왑 만료 시각: 기준 시각 + 1일 (unix seconds)
pub fn swap_deadline(now: DateTime<Utc>) -> U256 {
    let tomorrow = now + Duration::days(1);
    U256::from(tomorrow.timestamp().max(0) as u64)
}

/// Uniswap V2 Router02로 ETH → ERC-20 매수
pub struct UniswapV2<M> {
    client: Arc<M>,
    router: Address,
    weth: Address,
}

impl<M: Middleware + 'static> UniswapV2<M> {
    pub fn new(client: Arc<M>, router: Address, weth: Address) -> Self {
        Self { client, router, weth }
    }

    pub fn router(&self) -> Address {
        self.router
    }

    /// 필요한 ETH 투입량 (`getAmountsIn(amountOut, [WETH, token])[0]`)
    pub async fn amount_in(&self, token: Address, amount_out: U256) -> Result<U256> {
        let router = Contract::new(self.router, router_abi()?, Arc::clone(&self.client));
        let amounts = router
            .method::<_, Vec<U256>>("getAmountsIn", (amount_out, vec![self.weth, token]))?
            .call()
            .await?;
        amounts
            .first()
            .copied()
            .ok_or_else(|| anyhow!("getAmountsIn: 빈 결과 ({:?})", token))
    }

    /// `amount_out`만큼의 `token`을 `recipient`에게 전달
    ///
    /// WETH는 deposit 후 transfer, 나머지는 WETH 경로로 swapExactETHForTokens.
    pub async fn buy_erc20_with_eth(&self, token: Address, amount_out: U256, recipient: Address, from: Address) -> Result<()> {
        if token == self.weth {
            let weth = Contract::new(self.weth, weth_abi()?, Arc::clone(&self.client));
            let deposit = weth.method::<_, ()>("deposit", ())?.from(from).value(amount_out);
            send_call(deposit, "weth.deposit").await?;

            let transfer = weth.method::<_, bool>("transfer", (recipient, amount_out))?.from(from);
            send_call(transfer, "weth.transfer").await?;

            info!("💧 WETH {} → {:?}", amount_out, recipient);
            return Ok(());
        }

        let amount_in = self.amount_in(token, amount_out).await?;
        let amount_out_min = min_amount_out(amount_out);
        let deadline = swap_deadline(Utc::now());
        debug!("🔄 swap {} ETH → min {} of {:?} (deadline {})", amount_in, amount_out_min, token, deadline);

        let router = Contract::new(self.router, router_abi()?, Arc::clone(&self.client));
        let swap = router
            .method::<_, Vec<U256>>(
                "swapExactETHForTokens",
                (amount_out_min, vec![self.weth, token], recipient, deadline),
            )?
            .from(from)
            .value(amount_in);
        send_call(swap, "uniswap.swapExactETHForTokens").await?;

        info!("💱 {:?} {} → {:?}", token, amount_out, recipient);
        Ok(())
    }
}
